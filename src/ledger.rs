//! # Bid Ledger
//!
//! Stores and aggregates the bids of one run. The ledger enforces the rules that
//! hold in every state (valid quantities, one bid per participation and product,
//! the per-run product cap); the extra rules of the adjusting stage live in
//! [`crate::adjustment`].

use crate::config::RunConfig;
use crate::error::RunError;
use crate::model::{
    Bid, IdAllocator, ParticipationId, ProductId, Quantity, RunAggregate, RunState,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

/// A bid as submitted by a participant.
#[derive(Debug, Clone, PartialEq)]
pub struct BidRequest {
    pub participation_id: ParticipationId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub interested_only: bool,
    pub comment: Option<String>,
}

/// What `place_bid` did.
#[derive(Debug, Clone, PartialEq)]
pub enum BidChange {
    Created(Bid),
    Updated { previous: Bid, current: Bid },
}

impl BidChange {
    pub fn bid(&self) -> &Bid {
        match self {
            BidChange::Created(bid) => bid,
            BidChange::Updated { current, .. } => current,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BidLedger {
    max_products: usize,
    max_quantity: Quantity,
}

impl BidLedger {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            max_products: config.max_products_per_run,
            max_quantity: config.max_bid_quantity,
        }
    }

    /// Bids can only change while the run is planning, active or adjusting.
    pub fn ensure_open(state: RunState, operation: &'static str) -> Result<(), RunError> {
        match state {
            RunState::Planning | RunState::Active | RunState::Adjusting => Ok(()),
            _ => Err(RunError::InvalidState { operation, state }),
        }
    }

    /// Converts a submitted amount, rejecting negatives, sub-cent precision and
    /// anything above the per-bid cap.
    pub fn parse_quantity(&self, raw: f64) -> Result<Quantity, RunError> {
        let quantity = Quantity::from_f64(raw)?;
        self.check_quantity(quantity)?;
        Ok(quantity)
    }

    fn check_quantity(&self, quantity: Quantity) -> Result<(), RunError> {
        if quantity.is_negative() {
            return Err(RunError::Validation(format!(
                "quantity must not be negative, got {quantity}"
            )));
        }
        if quantity > self.max_quantity {
            return Err(RunError::Validation(format!(
                "quantity {quantity} exceeds the maximum of {}",
                self.max_quantity
            )));
        }
        Ok(())
    }

    /// Inserts or replaces the bid of `request.participation_id` on
    /// `request.product_id`.
    pub fn place_bid(
        &self,
        run: &mut RunAggregate,
        ids: &IdAllocator,
        request: BidRequest,
        now: DateTime<Utc>,
    ) -> Result<BidChange, RunError> {
        self.check_quantity(request.quantity)?;

        let existing = run
            .bids
            .iter_mut()
            .find(|b| {
                b.participation_id == request.participation_id
                    && b.product_id == request.product_id
            });

        if let Some(bid) = existing {
            let previous = bid.clone();
            bid.quantity = request.quantity;
            bid.interested_only = request.interested_only;
            bid.comment = request.comment;
            bid.updated_at = now;
            debug!(bid_id = %bid.id, quantity = %bid.quantity, "Bid updated");
            return Ok(BidChange::Updated {
                previous,
                current: bid.clone(),
            });
        }

        let products = run.products();
        if !products.contains(&request.product_id) && products.len() >= self.max_products {
            return Err(RunError::Validation(format!(
                "run already has bids on {} products (limit {})",
                products.len(),
                self.max_products
            )));
        }

        let bid = Bid {
            id: ids.bid(),
            participation_id: request.participation_id,
            product_id: request.product_id,
            quantity: request.quantity,
            interested_only: request.interested_only,
            comment: request.comment,
            distributed_quantity: None,
            distributed_price_per_unit: None,
            is_picked_up: false,
            updated_at: now,
        };
        debug!(bid_id = %bid.id, quantity = %bid.quantity, "Bid created");
        run.bids.push(bid.clone());
        Ok(BidChange::Created(bid))
    }

    /// Removes the bid and returns it.
    pub fn retract_bid(
        &self,
        run: &mut RunAggregate,
        product: ProductId,
        participation: ParticipationId,
    ) -> Result<Bid, RunError> {
        let index = run
            .bids
            .iter()
            .position(|b| b.participation_id == participation && b.product_id == product)
            .ok_or_else(|| RunError::not_found("bid", format!("{participation}/{product}")))?;
        Ok(run.bids.remove(index))
    }

    /// Sum of committed (not interested-only) quantities for `product`.
    pub fn aggregate_total(run: &RunAggregate, product: ProductId) -> Quantity {
        run.bids_for(product)
            .filter(|b| b.is_committed())
            .map(|b| b.quantity)
            .sum()
    }

    /// Committed totals for every product that has bids.
    pub fn product_totals(run: &RunAggregate) -> BTreeMap<ProductId, Quantity> {
        let mut totals = BTreeMap::new();
        for bid in &run.bids {
            let total = totals.entry(bid.product_id).or_insert(Quantity::ZERO);
            if bid.is_committed() {
                *total += bid.quantity;
            }
        }
        totals
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{GroupId, Participation, Run, RunId, StoreId, UserId};

    pub(crate) fn run_with_members(members: u64) -> RunAggregate {
        let now = Utc::now();
        let run = Run::new(RunId(1), GroupId(1), StoreId(1), now);
        let leader = Participation::new(ParticipationId(1), RunId(1), UserId(1), true, now);
        let mut aggregate = RunAggregate::new(run, leader);
        for n in 2..=members {
            aggregate.participations.push(Participation::new(
                ParticipationId(n),
                RunId(1),
                UserId(n),
                false,
                now,
            ));
        }
        aggregate
    }

    pub(crate) fn request(participation: u64, product: u64, quantity: Quantity) -> BidRequest {
        BidRequest {
            participation_id: ParticipationId(participation),
            product_id: ProductId(product),
            quantity,
            interested_only: false,
            comment: None,
        }
    }

    fn ledger() -> BidLedger {
        BidLedger::new(&RunConfig::default())
    }

    #[test]
    fn parse_rejects_negative_and_fine_grained_amounts() {
        let ledger = ledger();
        assert!(matches!(ledger.parse_quantity(-1.0), Err(RunError::Validation(_))));
        assert!(matches!(ledger.parse_quantity(0.125), Err(RunError::Validation(_))));
        assert!(matches!(ledger.parse_quantity(10_000.0), Err(RunError::Validation(_))));
        assert_eq!(ledger.parse_quantity(2.5).unwrap(), Quantity::from_hundredths(250));
    }

    #[test]
    fn place_bid_upserts_by_participation_and_product() {
        let ledger = ledger();
        let ids = IdAllocator::new();
        let mut run = run_with_members(2);
        let now = Utc::now();

        let first = ledger
            .place_bid(&mut run, &ids, request(2, 10, Quantity::units(2)), now)
            .unwrap();
        assert!(matches!(first, BidChange::Created(_)));

        let second = ledger
            .place_bid(&mut run, &ids, request(2, 10, Quantity::units(5)), now)
            .unwrap();
        match second {
            BidChange::Updated { previous, current } => {
                assert_eq!(previous.quantity, Quantity::units(2));
                assert_eq!(current.quantity, Quantity::units(5));
                assert_eq!(previous.id, current.id);
            }
            other => panic!("expected update, got {other:?}"),
        }
        assert_eq!(run.bids.len(), 1);
    }

    #[test]
    fn aggregate_ignores_interested_only_bids() {
        let ledger = ledger();
        let ids = IdAllocator::new();
        let mut run = run_with_members(4);
        let now = Utc::now();

        ledger.place_bid(&mut run, &ids, request(1, 10, Quantity::units(1)), now).unwrap();
        ledger
            .place_bid(&mut run, &ids, request(2, 10, Quantity::from_hundredths(250)), now)
            .unwrap();
        let mut interested = request(3, 10, Quantity::units(7));
        interested.interested_only = true;
        ledger.place_bid(&mut run, &ids, interested, now).unwrap();
        ledger.place_bid(&mut run, &ids, request(4, 11, Quantity::units(4)), now).unwrap();

        assert_eq!(
            BidLedger::aggregate_total(&run, ProductId(10)),
            Quantity::from_hundredths(350)
        );
        let totals = BidLedger::product_totals(&run);
        assert_eq!(totals[&ProductId(10)], Quantity::from_hundredths(350));
        assert_eq!(totals[&ProductId(11)], Quantity::units(4));
        assert_eq!(BidLedger::aggregate_total(&run, ProductId(99)), Quantity::ZERO);
    }

    #[test]
    fn product_cap_applies_to_new_products_only() {
        let config = RunConfig {
            max_products_per_run: 2,
            ..RunConfig::default()
        };
        let ledger = BidLedger::new(&config);
        let ids = IdAllocator::new();
        let mut run = run_with_members(2);
        let now = Utc::now();

        ledger.place_bid(&mut run, &ids, request(1, 10, Quantity::units(1)), now).unwrap();
        ledger.place_bid(&mut run, &ids, request(1, 11, Quantity::units(1)), now).unwrap();

        let err = ledger
            .place_bid(&mut run, &ids, request(2, 12, Quantity::units(1)), now)
            .unwrap_err();
        assert!(matches!(err, RunError::Validation(_)));

        // An existing product stays open to other participants.
        ledger.place_bid(&mut run, &ids, request(2, 11, Quantity::units(3)), now).unwrap();
        assert_eq!(run.bids.len(), 3);
    }

    #[test]
    fn retract_removes_only_the_matching_bid() {
        let ledger = ledger();
        let ids = IdAllocator::new();
        let mut run = run_with_members(2);
        let now = Utc::now();
        ledger.place_bid(&mut run, &ids, request(1, 10, Quantity::units(1)), now).unwrap();
        ledger.place_bid(&mut run, &ids, request(2, 10, Quantity::units(2)), now).unwrap();

        let removed = ledger
            .retract_bid(&mut run, ProductId(10), ParticipationId(2))
            .unwrap();
        assert_eq!(removed.quantity, Quantity::units(2));
        assert_eq!(run.bids.len(), 1);

        let missing = ledger.retract_bid(&mut run, ProductId(10), ParticipationId(2));
        assert!(matches!(missing, Err(RunError::NotFound { entity: "bid", .. })));
    }

    #[test]
    fn bids_close_outside_planning_active_and_adjusting() {
        assert!(BidLedger::ensure_open(RunState::Planning, "place_bid").is_ok());
        assert!(BidLedger::ensure_open(RunState::Adjusting, "place_bid").is_ok());
        assert_eq!(
            BidLedger::ensure_open(RunState::Shopping, "place_bid"),
            Err(RunError::InvalidState {
                operation: "place_bid",
                state: RunState::Shopping
            })
        );
    }
}
