//! # Distribution Engine
//!
//! Splits what was bought among the bids once the run enters distribution.
//! For each purchased item, with `requested` the committed total:
//!
//! - **Exact** (`requested == purchased`): every bid gets its own quantity.
//! - **Surplus** (`requested < purchased`): every bid gets its own quantity and
//!   the leftover goes to the run leader, whose bid is grown or created.
//! - **Prorated** (`requested > purchased`): every bid but the last gets its
//!   quantity scaled by `purchased / requested`, rounded to two decimals; the
//!   last gets whatever remains so the sum is exactly `purchased`.
//!
//! Every distributed line is priced at the item's purchase price. Interest-only
//! bids and items that were not bought are left untouched.

use crate::error::RunError;
use crate::ledger::BidLedger;
use crate::model::{
    Bid, BidId, IdAllocator, Money, ParticipationId, ProductId, Quantity, RunAggregate, UserId,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// How one product was split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AllocationKind {
    Exact,
    /// The leader's bid absorbed `to_leader`.
    Surplus { to_leader: Quantity },
    Prorated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub product_id: ProductId,
    pub requested: Quantity,
    pub purchased: Quantity,
    pub kind: AllocationKind,
}

pub struct DistributionEngine;

impl DistributionEngine {
    /// Writes `distributed_quantity` and `distributed_price_per_unit` on every
    /// committed bid of every purchased item.
    pub fn distribute(
        run: &mut RunAggregate,
        ids: &IdAllocator,
        now: DateTime<Utc>,
    ) -> Result<Vec<Allocation>, RunError> {
        let leader = run
            .leader()
            .map(|p| p.id)
            .ok_or_else(|| RunError::not_found("leader participation", run.run.id))?;

        let purchased: Vec<(ProductId, Quantity, Money)> = run
            .items
            .iter()
            .filter_map(|item| {
                let quantity = item.bought().filter(|q| q.is_positive())?;
                Some((
                    item.product_id,
                    quantity,
                    item.purchased_price_per_unit.unwrap_or_default(),
                ))
            })
            .collect();

        let mut allocations = Vec::with_capacity(purchased.len());
        for (product, quantity, price) in purchased {
            let requested = BidLedger::aggregate_total(run, product);

            let kind = if requested > quantity {
                prorate(run, product, quantity, requested, price);
                if let Some(item) = run.item_for_mut(product) {
                    item.requested_quantity = requested;
                }
                AllocationKind::Prorated
            } else {
                let surplus = quantity - requested;
                if surplus.is_positive() {
                    grant_to_leader(run, ids, leader, product, surplus, now);
                    if let Some(item) = run.item_for_mut(product) {
                        item.requested_quantity = quantity;
                    }
                }
                for bid in committed_bids_mut(run, product) {
                    bid.distributed_quantity = Some(bid.quantity);
                    bid.distributed_price_per_unit = Some(price);
                }
                if surplus.is_positive() {
                    AllocationKind::Surplus { to_leader: surplus }
                } else {
                    AllocationKind::Exact
                }
            };

            debug!(
                product_id = %product,
                %requested,
                purchased = %quantity,
                ?kind,
                "Product distributed"
            );
            allocations.push(Allocation {
                product_id: product,
                requested,
                purchased: quantity,
                kind,
            });
        }

        info!(run_id = %run.run.id, products = allocations.len(), "Distribution computed");
        Ok(allocations)
    }

    /// Bids still holding goods that nobody has collected.
    pub fn outstanding_pickups(run: &RunAggregate) -> usize {
        run.bids.iter().filter(|b| b.awaits_pickup()).count()
    }

    /// Groups distributed bids per user.
    ///
    /// Users who still have something to collect come first, then everyone in
    /// alphabetical order of display name. Unknown names fall back to the id.
    pub fn view(
        run: &RunAggregate,
        names: &DisplayNames,
    ) -> Result<Vec<UserDistribution>, RunError> {
        let mut by_user: BTreeMap<UserId, Vec<DistributedLine>> = BTreeMap::new();
        for bid in run.bids.iter().filter(|b| b.is_committed()) {
            let (Some(quantity), Some(user)) = (bid.distributed_quantity, run.bidder(bid)) else {
                continue;
            };
            let price = bid.distributed_price_per_unit.unwrap_or_default();
            by_user.entry(user).or_default().push(DistributedLine {
                bid_id: bid.id,
                product_id: bid.product_id,
                product_name: names.product(bid.product_id),
                requested_quantity: bid.quantity,
                distributed_quantity: quantity,
                price_per_unit: price,
                subtotal: price.times(quantity)?,
                is_picked_up: bid.is_picked_up,
            });
        }

        let mut users: Vec<UserDistribution> = by_user
            .into_iter()
            .map(|(user_id, mut lines)| {
                lines.sort_by(|a, b| a.product_name.cmp(&b.product_name));
                UserDistribution {
                    user_id,
                    user_name: names.user(user_id),
                    total: lines.iter().map(|l| l.subtotal).sum(),
                    all_picked_up: lines.iter().all(|l| l.is_picked_up),
                    lines,
                }
            })
            .collect();
        users.sort_by(|a, b| {
            a.all_picked_up
                .cmp(&b.all_picked_up)
                .then_with(|| a.user_name.cmp(&b.user_name))
        });
        Ok(users)
    }
}

fn committed_bids_mut(
    run: &mut RunAggregate,
    product: ProductId,
) -> impl Iterator<Item = &mut Bid> {
    run.bids
        .iter_mut()
        .filter(move |b| b.product_id == product && b.is_committed())
}

fn prorate(
    run: &mut RunAggregate,
    product: ProductId,
    purchased: Quantity,
    requested: Quantity,
    price: Money,
) {
    let mut remaining = purchased;
    let mut bids: Vec<&mut Bid> = committed_bids_mut(run, product).collect();
    let count = bids.len();
    for (index, bid) in bids.iter_mut().enumerate() {
        let share = if index + 1 == count {
            remaining
        } else {
            bid.quantity.scale(purchased, requested).min(remaining)
        };
        remaining -= share;
        bid.distributed_quantity = Some(share);
        bid.distributed_price_per_unit = Some(price);
    }
}

/// Adds `surplus` to the leader's bid on `product`, creating it if needed. An
/// interest-only leader bid becomes a committed bid for the surplus.
fn grant_to_leader(
    run: &mut RunAggregate,
    ids: &IdAllocator,
    leader: ParticipationId,
    product: ProductId,
    surplus: Quantity,
    now: DateTime<Utc>,
) {
    let existing = run
        .bids
        .iter_mut()
        .find(|b| b.participation_id == leader && b.product_id == product);
    match existing {
        Some(bid) if bid.interested_only => {
            bid.interested_only = false;
            bid.quantity = surplus;
            bid.updated_at = now;
        }
        Some(bid) => {
            bid.quantity += surplus;
            bid.updated_at = now;
        }
        None => run.bids.push(Bid {
            id: ids.bid(),
            participation_id: leader,
            product_id: product,
            quantity: surplus,
            interested_only: false,
            comment: None,
            distributed_quantity: None,
            distributed_price_per_unit: None,
            is_picked_up: false,
            updated_at: now,
        }),
    }
}

/// Names looked up from the catalog before building a view.
#[derive(Debug, Clone, Default)]
pub struct DisplayNames {
    pub users: HashMap<UserId, String>,
    pub products: HashMap<ProductId, String>,
}

impl DisplayNames {
    fn user(&self, id: UserId) -> String {
        self.users.get(&id).cloned().unwrap_or_else(|| id.to_string())
    }

    fn product(&self, id: ProductId) -> String {
        self.products.get(&id).cloned().unwrap_or_else(|| id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributedLine {
    pub bid_id: BidId,
    pub product_id: ProductId,
    pub product_name: String,
    pub requested_quantity: Quantity,
    pub distributed_quantity: Quantity,
    pub price_per_unit: Money,
    pub subtotal: Money,
    pub is_picked_up: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserDistribution {
    pub user_id: UserId,
    pub user_name: String,
    pub lines: Vec<DistributedLine>,
    pub total: Money,
    pub all_picked_up: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::ledger::tests::{request, run_with_members};
    use crate::shopping_list::ShoppingListGenerator;

    fn bought(run: &mut RunAggregate, product: u64, quantity: Quantity, price: Money) {
        let item = run.item_for_mut(ProductId(product)).unwrap();
        item.purchased_quantity = Some(quantity);
        item.purchased_price_per_unit = Some(price);
        item.purchased_total = Some(price.times(quantity).unwrap());
        item.is_purchased = true;
    }

    /// Bids `(participation, quantity)` on product 10, list generated.
    fn run_with_bids(members: u64, bids: &[(u64, Quantity)]) -> (RunAggregate, IdAllocator) {
        let ledger = BidLedger::new(&RunConfig::default());
        let ids = IdAllocator::new();
        let mut run = run_with_members(members);
        for (participation, quantity) in bids {
            ledger
                .place_bid(&mut run, &ids, request(*participation, 10, *quantity), Utc::now())
                .unwrap();
        }
        ShoppingListGenerator::generate(&mut run, &ids).unwrap();
        (run, ids)
    }

    fn distributed(run: &RunAggregate, participation: u64) -> Option<Quantity> {
        run.bid_of(ParticipationId(participation), ProductId(10))
            .and_then(|b| b.distributed_quantity)
    }

    #[test]
    fn exact_purchase_gives_every_bid_its_quantity() {
        let (mut run, ids) = run_with_bids(3, &[(2, Quantity::units(2)), (3, Quantity::units(1))]);
        bought(&mut run, 10, Quantity::units(3), Money::from_cents(250));

        let allocations = DistributionEngine::distribute(&mut run, &ids, Utc::now()).unwrap();

        assert_eq!(allocations[0].kind, AllocationKind::Exact);
        assert_eq!(distributed(&run, 2), Some(Quantity::units(2)));
        assert_eq!(distributed(&run, 3), Some(Quantity::units(1)));
        let bid = run.bid_of(ParticipationId(2), ProductId(10)).unwrap();
        assert_eq!(bid.distributed_price_per_unit, Some(Money::from_cents(250)));
    }

    #[test]
    fn surplus_is_added_to_a_new_leader_bid() {
        let (mut run, ids) = run_with_bids(3, &[(2, Quantity::units(2)), (3, Quantity::units(1))]);
        bought(&mut run, 10, Quantity::units(5), Money::from_cents(100));

        let allocations = DistributionEngine::distribute(&mut run, &ids, Utc::now()).unwrap();

        assert_eq!(
            allocations[0].kind,
            AllocationKind::Surplus {
                to_leader: Quantity::units(2)
            }
        );
        assert_eq!(distributed(&run, 1), Some(Quantity::units(2)));
        assert_eq!(distributed(&run, 2), Some(Quantity::units(2)));
        assert_eq!(distributed(&run, 3), Some(Quantity::units(1)));
        assert_eq!(
            run.item_for(ProductId(10)).unwrap().requested_quantity,
            Quantity::units(5)
        );
    }

    #[test]
    fn surplus_grows_an_existing_leader_bid() {
        let (mut run, ids) = run_with_bids(2, &[(1, Quantity::units(1)), (2, Quantity::units(2))]);
        bought(&mut run, 10, Quantity::units(4), Money::from_cents(100));

        DistributionEngine::distribute(&mut run, &ids, Utc::now()).unwrap();

        let leader_bid = run.bid_of(ParticipationId(1), ProductId(10)).unwrap();
        assert_eq!(leader_bid.quantity, Quantity::units(2));
        assert_eq!(leader_bid.distributed_quantity, Some(Quantity::units(2)));
        assert_eq!(run.bids.len(), 2);
    }

    #[test]
    fn shortfall_is_prorated_with_remainder_to_last_bid() {
        let (mut run, ids) = run_with_bids(3, &[(2, Quantity::units(6)), (3, Quantity::units(4))]);
        bought(&mut run, 10, Quantity::units(5), Money::from_cents(300));

        let allocations = DistributionEngine::distribute(&mut run, &ids, Utc::now()).unwrap();

        assert_eq!(allocations[0].kind, AllocationKind::Prorated);
        assert_eq!(distributed(&run, 2), Some(Quantity::units(3)));
        assert_eq!(distributed(&run, 3), Some(Quantity::units(2)));
        assert_eq!(
            run.item_for(ProductId(10)).unwrap().requested_quantity,
            Quantity::units(10)
        );
    }

    #[test]
    fn rounding_never_loses_or_creates_quantity() {
        let (mut run, ids) = run_with_bids(
            4,
            &[
                (2, Quantity::units(1)),
                (3, Quantity::units(1)),
                (4, Quantity::units(1)),
            ],
        );
        bought(&mut run, 10, Quantity::units(2), Money::from_cents(100));

        DistributionEngine::distribute(&mut run, &ids, Utc::now()).unwrap();

        assert_eq!(distributed(&run, 2), Some(Quantity::from_hundredths(67)));
        assert_eq!(distributed(&run, 3), Some(Quantity::from_hundredths(67)));
        assert_eq!(distributed(&run, 4), Some(Quantity::from_hundredths(66)));
    }

    #[test]
    fn unpurchased_items_and_interest_only_bids_are_skipped() {
        let ledger = BidLedger::new(&RunConfig::default());
        let ids = IdAllocator::new();
        let mut run = run_with_members(3);
        let now = Utc::now();
        ledger.place_bid(&mut run, &ids, request(2, 10, Quantity::units(2)), now).unwrap();
        ledger.place_bid(&mut run, &ids, request(2, 11, Quantity::units(1)), now).unwrap();
        let mut interest = request(3, 10, Quantity::units(5));
        interest.interested_only = true;
        ledger.place_bid(&mut run, &ids, interest, now).unwrap();
        ShoppingListGenerator::generate(&mut run, &ids).unwrap();
        bought(&mut run, 10, Quantity::units(2), Money::from_cents(100));

        DistributionEngine::distribute(&mut run, &ids, now).unwrap();

        assert_eq!(distributed(&run, 2), Some(Quantity::units(2)));
        assert_eq!(distributed(&run, 3), None);
        let unbought = run.bid_of(ParticipationId(2), ProductId(11)).unwrap();
        assert_eq!(unbought.distributed_quantity, None);
    }

    #[test]
    fn view_lists_outstanding_users_first_then_by_name() {
        let (mut run, ids) = run_with_bids(3, &[(2, Quantity::units(2)), (3, Quantity::units(1))]);
        bought(&mut run, 10, Quantity::units(3), Money::from_cents(150));
        DistributionEngine::distribute(&mut run, &ids, Utc::now()).unwrap();
        // Zed has collected, Amy has not.
        let zed_bid = run.bid_of(ParticipationId(2), ProductId(10)).unwrap().id;
        run.bid_mut(zed_bid).unwrap().is_picked_up = true;

        let names = DisplayNames {
            users: HashMap::from([(UserId(2), "Zed".to_string()), (UserId(3), "Amy".to_string())]),
            products: HashMap::from([(ProductId(10), "Rice".to_string())]),
        };
        let view = DistributionEngine::view(&run, &names).unwrap();

        assert_eq!(view.len(), 2);
        assert_eq!(view[0].user_name, "Amy");
        assert!(!view[0].all_picked_up);
        assert_eq!(view[0].total, Money::from_cents(150));
        assert_eq!(view[1].user_name, "Zed");
        assert_eq!(view[1].lines[0].product_name, "Rice");
        assert_eq!(view[1].lines[0].subtotal, Money::from_cents(300));
        assert_eq!(DistributionEngine::outstanding_pickups(&run), 1);
    }
}
