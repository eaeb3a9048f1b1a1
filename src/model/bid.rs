use crate::model::{BidId, Money, ParticipationId, ProductId, Quantity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A participant's requested quantity of one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub participation_id: ParticipationId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    /// Interest without commitment; never counted in totals.
    pub interested_only: bool,
    pub comment: Option<String>,
    /// Set once, when the run enters distribution.
    pub distributed_quantity: Option<Quantity>,
    pub distributed_price_per_unit: Option<Money>,
    pub is_picked_up: bool,
    pub updated_at: DateTime<Utc>,
}

impl Bid {
    /// Whether this bid counts towards the product total.
    pub fn is_committed(&self) -> bool {
        !self.interested_only
    }

    /// True for bids that still have goods waiting to be collected.
    pub fn awaits_pickup(&self) -> bool {
        self.is_committed()
            && !self.is_picked_up
            && self
                .distributed_quantity
                .is_some_and(|quantity| quantity.is_positive())
    }
}
