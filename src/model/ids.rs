//! Type-safe identifiers.
//!
//! Every entity gets its own newtype so a `ProductId` can never be passed where a
//! `UserId` is expected. Identifiers owned by this crate (runs, participations,
//! bids, shopping-list items) are handed out by [`IdAllocator`]; the rest
//! (groups, stores, products, users) come from the catalog and are opaque here.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Identifier of a group run.
    RunId,
    "run"
);
define_id!(
    /// Identifier of a user's participation in one run.
    ParticipationId,
    "participation"
);
define_id!(
    /// Identifier of a bid.
    BidId,
    "bid"
);
define_id!(
    /// Identifier of a shopping-list item.
    ItemId,
    "item"
);
define_id!(
    /// Identifier of a group (catalog owned).
    GroupId,
    "group"
);
define_id!(
    /// Identifier of a store (catalog owned).
    StoreId,
    "store"
);
define_id!(
    /// Identifier of a product (catalog owned).
    ProductId,
    "product"
);
define_id!(
    /// Identifier of a user (catalog owned).
    UserId,
    "user"
);

/// Highest identifiers a repository already holds, per entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdWatermark {
    pub run: u64,
    pub participation: u64,
    pub bid: u64,
    pub item: u64,
}

/// Sequential id source shared by every run actor.
///
/// Cheap to clone; all clones draw from the same counters, so ids stay unique
/// across runs without any coordination between actors. Over a repository that
/// already holds runs, start from [`IdAllocator::starting_after`].
#[derive(Debug, Clone)]
pub struct IdAllocator {
    counters: Arc<[AtomicU64; 4]>,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::starting_after(IdWatermark::default())
    }

    /// Counters that continue after the ids in `watermark`.
    pub fn starting_after(watermark: IdWatermark) -> Self {
        Self {
            counters: Arc::new([
                AtomicU64::new(watermark.run + 1),
                AtomicU64::new(watermark.participation + 1),
                AtomicU64::new(watermark.bid + 1),
                AtomicU64::new(watermark.item + 1),
            ]),
        }
    }

    fn next(&self, slot: usize) -> u64 {
        self.counters[slot].fetch_add(1, Ordering::SeqCst)
    }

    pub fn run(&self) -> RunId {
        RunId(self.next(0))
    }

    pub fn participation(&self) -> ParticipationId {
        ParticipationId(self.next(1))
    }

    pub fn bid(&self) -> BidId {
        BidId(self.next(2))
    }

    pub fn item(&self) -> ItemId {
        ItemId(self.next(3))
    }
}
