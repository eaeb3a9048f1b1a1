//! # Adjustment Validator
//!
//! When purchases diverge from what was bid, the run enters the adjusting stage
//! and bidders reconcile their bids against what was actually bought:
//!
//! - **Shortage** (bought less): bids may only shrink, never below
//!   `current - shortage`, and cannot be retracted.
//! - **Surplus** (bought more): bids may only grow, up to `current + surplus`,
//!   and cannot be retracted.
//!
//! Shortage and surplus are measured against the live committed total, so every
//! accepted change moves the product towards balance and never past it. Once a
//! product is balanced its bids are frozen.
//!
//! Requests outside these bounds are rejected, never clamped.

use crate::error::RunError;
use crate::ledger::BidLedger;
use crate::model::{ParticipationId, ProductId, Quantity, RunAggregate};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A purchased product whose committed total differs from what was bought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub product_id: ProductId,
    pub requested: Quantity,
    pub purchased: Quantity,
}

impl Mismatch {
    /// `purchased - requested`: negative for a shortage, positive for a surplus.
    pub fn delta(&self) -> Quantity {
        self.purchased - self.requested
    }

    pub fn is_shortage(&self) -> bool {
        self.delta().is_negative()
    }
}

impl Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let delta = self.delta();
        let direction = if delta.is_negative() { "short" } else { "over" };
        write!(
            f,
            "{} {direction} by {} (requested {}, purchased {})",
            self.product_id,
            delta.abs(),
            self.requested,
            self.purchased
        )
    }
}

pub struct AdjustmentValidator;

impl AdjustmentValidator {
    /// Purchased items whose bought quantity differs from the shopping-list
    /// request. Decides between adjusting and distributing when shopping ends.
    pub fn shopping_mismatches(run: &RunAggregate) -> Vec<Mismatch> {
        run.items
            .iter()
            .filter_map(|item| {
                let purchased = item.bought()?;
                (purchased != item.requested_quantity).then(|| Mismatch {
                    product_id: item.product_id,
                    requested: item.requested_quantity,
                    purchased,
                })
            })
            .collect()
    }

    /// Purchased items whose current committed total is still out of balance.
    pub fn mismatches(run: &RunAggregate) -> Vec<Mismatch> {
        run.items
            .iter()
            .filter_map(|item| {
                let purchased = item.bought()?;
                let requested = BidLedger::aggregate_total(run, item.product_id);
                (purchased != requested).then_some(Mismatch {
                    product_id: item.product_id,
                    requested,
                    purchased,
                })
            })
            .collect()
    }

    /// Fails with [`RunError::Conflict`] unless every purchased product balances.
    pub fn verify_balanced(run: &RunAggregate) -> Result<(), RunError> {
        let remaining = Self::mismatches(run);
        if remaining.is_empty() {
            Ok(())
        } else {
            Err(RunError::Conflict { remaining })
        }
    }

    /// Checks a bid update made while adjusting.
    pub fn check_bid_change(
        run: &RunAggregate,
        participation: ParticipationId,
        product: ProductId,
        quantity: Quantity,
        interested_only: bool,
    ) -> Result<(), RunError> {
        let purchased = Self::purchased(run, product)?;
        let current = run.bid_of(participation, product).ok_or_else(|| {
            RunError::Validation(format!(
                "no new bids on {product} while the run is adjusting"
            ))
        })?;

        if current.interested_only != interested_only {
            return Err(RunError::Validation(
                "interest-only flag cannot change while the run is adjusting".to_string(),
            ));
        }
        if current.interested_only || quantity == current.quantity {
            return Ok(());
        }

        let delta = purchased - BidLedger::aggregate_total(run, product);
        if delta.is_negative() {
            let shortage = delta.abs();
            let floor = (current.quantity - shortage).max(Quantity::ZERO);
            if quantity > current.quantity {
                return Err(RunError::Validation(format!(
                    "{product} is short by {shortage}; bids can only be reduced"
                )));
            }
            if quantity < floor {
                return Err(RunError::Validation(format!(
                    "{product} is short by {shortage}; this bid cannot go below {floor}"
                )));
            }
        } else if delta.is_positive() {
            let ceiling = current.quantity + delta;
            if quantity < current.quantity {
                return Err(RunError::Validation(format!(
                    "{product} has a surplus of {delta}; bids can only be increased"
                )));
            }
            if quantity > ceiling {
                return Err(RunError::Validation(format!(
                    "{product} has a surplus of {delta}; this bid cannot exceed {ceiling}"
                )));
            }
        } else {
            return Err(RunError::Validation(format!(
                "{product} is already balanced; its bids are fixed"
            )));
        }
        Ok(())
    }

    /// Committed bids cannot be retracted while adjusting; reduce to the floor
    /// instead.
    pub fn check_retraction(
        run: &RunAggregate,
        participation: ParticipationId,
        product: ProductId,
    ) -> Result<(), RunError> {
        let bid = run
            .bid_of(participation, product)
            .ok_or_else(|| RunError::not_found("bid", format!("{participation}/{product}")))?;
        if bid.interested_only {
            return Ok(());
        }
        let reason = match run.item_for(product).and_then(|item| item.bought()) {
            Some(purchased) => {
                let delta = purchased - BidLedger::aggregate_total(run, product);
                if delta.is_negative() {
                    "it would deepen the shortage; reduce the bid instead"
                } else if delta.is_positive() {
                    "the surplus must be absorbed; increase the bid instead"
                } else {
                    "the product is already balanced"
                }
            }
            None => "bids are fixed while the run is adjusting",
        };
        Err(RunError::Validation(format!(
            "cannot retract bid on {product}: {reason}"
        )))
    }

    fn purchased(run: &RunAggregate, product: ProductId) -> Result<Quantity, RunError> {
        let item = run.item_for(product).ok_or_else(|| {
            RunError::Validation(format!("{product} is not on the shopping list"))
        })?;
        item.bought().ok_or_else(|| {
            RunError::Validation(format!("{product} was not purchased; its bids are fixed"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::ledger::tests::{request, run_with_members};
    use crate::model::IdAllocator;
    use crate::shopping_list::ShoppingListGenerator;
    use chrono::Utc;

    /// Three bids of 2 on product 10, purchased as `purchased`.
    fn adjusting_run(purchased: Quantity) -> RunAggregate {
        let ledger = BidLedger::new(&RunConfig::default());
        let ids = IdAllocator::new();
        let mut run = run_with_members(4);
        let now = Utc::now();
        for participant in 2..=4 {
            ledger
                .place_bid(&mut run, &ids, request(participant, 10, Quantity::units(2)), now)
                .unwrap();
        }
        ShoppingListGenerator::generate(&mut run, &ids).unwrap();
        let item = run.item_for_mut(ProductId(10)).unwrap();
        item.purchased_quantity = Some(purchased);
        item.is_purchased = true;
        run
    }

    fn set_quantity(run: &mut RunAggregate, participation: u64, quantity: Quantity) {
        let bid = run
            .bids
            .iter_mut()
            .find(|b| b.participation_id == ParticipationId(participation))
            .unwrap();
        bid.quantity = quantity;
    }

    #[test]
    fn shortage_allows_reduction_to_zero_but_never_increase() {
        let run = adjusting_run(Quantity::units(3));
        let change = |quantity| {
            AdjustmentValidator::check_bid_change(
                &run,
                ParticipationId(2),
                ProductId(10),
                quantity,
                false,
            )
        };

        assert!(change(Quantity::ZERO).is_ok());
        assert!(change(Quantity::units(1)).is_ok());
        assert!(matches!(
            change(Quantity::units(3)),
            Err(RunError::Validation(_))
        ));
    }

    #[test]
    fn shortage_floor_tracks_remaining_shortage() {
        let mut run = adjusting_run(Quantity::units(3));
        // First bidder absorbs two of the three missing units.
        set_quantity(&mut run, 2, Quantity::ZERO);

        let product = ProductId(10);
        let err = AdjustmentValidator::check_bid_change(
            &run,
            ParticipationId(3),
            product,
            Quantity::ZERO,
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot go below 1.00"), "{err}");
        assert!(AdjustmentValidator::check_bid_change(
            &run,
            ParticipationId(3),
            product,
            Quantity::units(1),
            false
        )
        .is_ok());
    }

    #[test]
    fn surplus_allows_growth_up_to_ceiling_only() {
        let run = adjusting_run(Quantity::units(8));
        let change = |quantity| {
            AdjustmentValidator::check_bid_change(
                &run,
                ParticipationId(3),
                ProductId(10),
                quantity,
                false,
            )
        };

        assert!(change(Quantity::units(4)).is_ok());
        assert!(matches!(
            change(Quantity::from_hundredths(401)),
            Err(RunError::Validation(_))
        ));
        assert!(matches!(
            change(Quantity::units(1)),
            Err(RunError::Validation(_))
        ));
    }

    #[test]
    fn retraction_is_forbidden_for_committed_bids() {
        let shortage = adjusting_run(Quantity::units(3));
        let surplus = adjusting_run(Quantity::units(9));
        for run in [&shortage, &surplus] {
            assert!(matches!(
                AdjustmentValidator::check_retraction(run, ParticipationId(2), ProductId(10)),
                Err(RunError::Validation(_))
            ));
        }
    }

    #[test]
    fn new_bids_and_unlisted_products_are_rejected() {
        let run = adjusting_run(Quantity::units(3));
        // The leader has no bid on the product.
        assert!(matches!(
            AdjustmentValidator::check_bid_change(
                &run,
                ParticipationId(1),
                ProductId(10),
                Quantity::units(1),
                false
            ),
            Err(RunError::Validation(_))
        ));
        assert!(matches!(
            AdjustmentValidator::check_bid_change(
                &run,
                ParticipationId(2),
                ProductId(77),
                Quantity::units(1),
                false
            ),
            Err(RunError::Validation(_))
        ));
    }

    #[test]
    fn verification_passes_only_when_balanced() {
        let mut run = adjusting_run(Quantity::units(3));
        assert_eq!(AdjustmentValidator::shopping_mismatches(&run).len(), 1);

        let err = AdjustmentValidator::verify_balanced(&run).unwrap_err();
        match err {
            RunError::Conflict { remaining } => {
                assert_eq!(remaining.len(), 1);
                assert_eq!(remaining[0].delta(), -Quantity::units(3));
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        set_quantity(&mut run, 2, Quantity::ZERO);
        set_quantity(&mut run, 3, Quantity::units(1));
        assert!(AdjustmentValidator::verify_balanced(&run).is_ok());
    }
}
