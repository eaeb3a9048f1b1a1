//! # Shopping List Generator
//!
//! Turns the committed bid totals into purchase targets when the leader starts
//! shopping. Runs exactly once per run.

use crate::error::RunError;
use crate::ledger::BidLedger;
use crate::model::{IdAllocator, RunAggregate, ShoppingListItem};
use tracing::info;

pub struct ShoppingListGenerator;

impl ShoppingListGenerator {
    /// Creates one item per product with a non-zero committed total.
    ///
    /// A second call for the same run is a caller bug and fails with
    /// [`RunError::ShoppingListExists`]; nothing is duplicated.
    pub fn generate(
        run: &mut RunAggregate,
        ids: &IdAllocator,
    ) -> Result<Vec<ShoppingListItem>, RunError> {
        if !run.items.is_empty() {
            return Err(RunError::ShoppingListExists(run.run.id));
        }

        let items: Vec<ShoppingListItem> = BidLedger::product_totals(run)
            .into_iter()
            .filter(|(_, total)| total.is_positive())
            .map(|(product, total)| ShoppingListItem::new(ids.item(), run.run.id, product, total))
            .collect();

        info!(run_id = %run.run.id, items = items.len(), "Shopping list generated");
        run.items = items.clone();
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::ledger::tests::{request, run_with_members};
    use crate::model::{ProductId, Quantity};
    use chrono::Utc;

    #[test]
    fn one_item_per_product_with_committed_total() {
        let ledger = BidLedger::new(&RunConfig::default());
        let ids = IdAllocator::new();
        let mut run = run_with_members(3);
        let now = Utc::now();
        ledger.place_bid(&mut run, &ids, request(2, 10, Quantity::units(2)), now).unwrap();
        ledger.place_bid(&mut run, &ids, request(3, 10, Quantity::units(1)), now).unwrap();
        ledger.place_bid(&mut run, &ids, request(2, 11, Quantity::ZERO), now).unwrap();
        let mut interest = request(3, 12, Quantity::units(4));
        interest.interested_only = true;
        ledger.place_bid(&mut run, &ids, interest, now).unwrap();

        let items = ShoppingListGenerator::generate(&mut run, &ids).unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id, ProductId(10));
        assert_eq!(items[0].requested_quantity, Quantity::units(3));
        assert!(!items[0].is_purchased);
        assert_eq!(run.items, items);
    }

    #[test]
    fn second_generation_is_rejected() {
        let ledger = BidLedger::new(&RunConfig::default());
        let ids = IdAllocator::new();
        let mut run = run_with_members(2);
        ledger
            .place_bid(&mut run, &ids, request(2, 10, Quantity::units(2)), Utc::now())
            .unwrap();

        ShoppingListGenerator::generate(&mut run, &ids).unwrap();
        let err = ShoppingListGenerator::generate(&mut run, &ids).unwrap_err();

        assert_eq!(err, RunError::ShoppingListExists(run.run.id));
        assert_eq!(run.items.len(), 1);
    }
}
