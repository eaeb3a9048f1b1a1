use crate::model::{ItemId, Money, ProductId, Quantity, RunId};
use serde::{Deserialize, Serialize};

/// One line of a run's shopping list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingListItem {
    pub id: ItemId,
    pub run_id: RunId,
    pub product_id: ProductId,
    /// Aggregated bids when the list was generated; later rewritten for audit
    /// by distribution.
    pub requested_quantity: Quantity,
    pub purchased_quantity: Option<Quantity>,
    pub purchased_price_per_unit: Option<Money>,
    pub purchased_total: Option<Money>,
    pub is_purchased: bool,
    /// Position in the order purchases were recorded.
    pub purchase_order: Option<u32>,
}

impl ShoppingListItem {
    pub fn new(id: ItemId, run_id: RunId, product_id: ProductId, requested: Quantity) -> Self {
        Self {
            id,
            run_id,
            product_id,
            requested_quantity: requested,
            purchased_quantity: None,
            purchased_price_per_unit: None,
            purchased_total: None,
            is_purchased: false,
            purchase_order: None,
        }
    }

    /// Purchased quantity for items that were actually bought.
    pub fn bought(&self) -> Option<Quantity> {
        if self.is_purchased {
            self.purchased_quantity
        } else {
            None
        }
    }

    pub(crate) fn clear_purchase(&mut self) {
        self.purchased_quantity = None;
        self.purchased_price_per_unit = None;
        self.purchased_total = None;
        self.is_purchased = false;
        self.purchase_order = None;
    }
}
