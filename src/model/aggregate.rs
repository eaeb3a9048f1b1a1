use crate::model::{
    Bid, BidId, Participation, ParticipationId, ProductId, Run, ShoppingListItem, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A run together with everything it owns.
///
/// This is the unit of persistence: the repository loads and commits it as a
/// whole, which is what makes a state change and all of its derived writes
/// land together or not at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAggregate {
    pub run: Run,
    pub participations: Vec<Participation>,
    /// Kept in creation order; distribution depends on it.
    pub bids: Vec<Bid>,
    pub items: Vec<ShoppingListItem>,
}

impl RunAggregate {
    pub fn new(run: Run, leader: Participation) -> Self {
        Self {
            run,
            participations: vec![leader],
            bids: Vec::new(),
            items: Vec::new(),
        }
    }

    pub fn leader(&self) -> Option<&Participation> {
        self.participations
            .iter()
            .find(|p| p.is_leader && !p.is_removed)
    }

    /// The active participation of `user`, ignoring removed ones.
    pub fn participation_of(&self, user: UserId) -> Option<&Participation> {
        self.participations
            .iter()
            .find(|p| p.user_id == user && !p.is_removed)
    }

    pub fn participation(&self, id: ParticipationId) -> Option<&Participation> {
        self.participations.iter().find(|p| p.id == id)
    }

    pub fn participation_mut(&mut self, id: ParticipationId) -> Option<&mut Participation> {
        self.participations.iter_mut().find(|p| p.id == id)
    }

    pub fn active_participations(&self) -> impl Iterator<Item = &Participation> {
        self.participations.iter().filter(|p| !p.is_removed)
    }

    pub fn bid_mut(&mut self, id: BidId) -> Option<&mut Bid> {
        self.bids.iter_mut().find(|b| b.id == id)
    }

    pub fn bid_of(&self, participation: ParticipationId, product: ProductId) -> Option<&Bid> {
        self.bids
            .iter()
            .find(|b| b.participation_id == participation && b.product_id == product)
    }

    pub fn bids_for(&self, product: ProductId) -> impl Iterator<Item = &Bid> {
        self.bids.iter().filter(move |b| b.product_id == product)
    }

    /// Products with at least one bid, committed or not.
    pub fn products(&self) -> BTreeSet<ProductId> {
        self.bids.iter().map(|b| b.product_id).collect()
    }

    pub fn item_for(&self, product: ProductId) -> Option<&ShoppingListItem> {
        self.items.iter().find(|i| i.product_id == product)
    }

    pub fn item_for_mut(&mut self, product: ProductId) -> Option<&mut ShoppingListItem> {
        self.items.iter_mut().find(|i| i.product_id == product)
    }

    /// Owner of a bid, resolved through its participation.
    pub fn bidder(&self, bid: &Bid) -> Option<UserId> {
        self.participation(bid.participation_id).map(|p| p.user_id)
    }
}
