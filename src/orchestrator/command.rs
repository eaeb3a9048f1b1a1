//! Commands accepted by a run's actor and their typed results.
//!
//! Each [`RunCommand`] variant has exactly one [`RunCommandResult`] variant; the
//! façade relies on that pairing when it unwraps replies.

use crate::adjustment::Mismatch;
use crate::distribution::Allocation;
use crate::model::{
    Bid, BidId, Participation, ProductId, Run, RunState, ShoppingListItem, UserId,
};

#[derive(Debug, Clone)]
pub enum RunCommand {
    PlaceBid {
        user: UserId,
        product: ProductId,
        quantity: f64,
        interested_only: bool,
        comment: Option<String>,
    },
    RetractBid {
        user: UserId,
        product: ProductId,
    },
    ToggleReady {
        user: UserId,
    },
    SetHelper {
        user: UserId,
        helper: UserId,
        is_helper: bool,
    },
    ForceConfirm {
        user: UserId,
    },
    StartShopping {
        user: UserId,
    },
    RecordPurchase {
        user: UserId,
        product: ProductId,
        quantity: f64,
        price_per_unit: f64,
        total: Option<f64>,
    },
    UndoPurchase {
        user: UserId,
        product: ProductId,
    },
    CompleteShopping {
        user: UserId,
    },
    FinishAdjusting {
        user: UserId,
        force: bool,
    },
    MarkPickedUp {
        user: UserId,
        bid: BidId,
    },
    CompleteDistribution {
        user: UserId,
    },
    CancelRun {
        user: UserId,
    },
}

impl RunCommand {
    /// The user issuing the command.
    pub fn user(&self) -> UserId {
        match self {
            RunCommand::PlaceBid { user, .. }
            | RunCommand::RetractBid { user, .. }
            | RunCommand::ToggleReady { user }
            | RunCommand::SetHelper { user, .. }
            | RunCommand::ForceConfirm { user }
            | RunCommand::StartShopping { user }
            | RunCommand::RecordPurchase { user, .. }
            | RunCommand::UndoPurchase { user, .. }
            | RunCommand::CompleteShopping { user }
            | RunCommand::FinishAdjusting { user, .. }
            | RunCommand::MarkPickedUp { user, .. }
            | RunCommand::CompleteDistribution { user }
            | RunCommand::CancelRun { user } => *user,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RunCommand::PlaceBid { .. } => "place_bid",
            RunCommand::RetractBid { .. } => "retract_bid",
            RunCommand::ToggleReady { .. } => "toggle_ready",
            RunCommand::SetHelper { .. } => "set_helper",
            RunCommand::ForceConfirm { .. } => "force_confirm",
            RunCommand::StartShopping { .. } => "start_shopping",
            RunCommand::RecordPurchase { .. } => "record_purchase",
            RunCommand::UndoPurchase { .. } => "undo_purchase",
            RunCommand::CompleteShopping { .. } => "complete_shopping",
            RunCommand::FinishAdjusting { .. } => "finish_adjusting",
            RunCommand::MarkPickedUp { .. } => "mark_picked_up",
            RunCommand::CompleteDistribution { .. } => "complete_distribution",
            RunCommand::CancelRun { .. } => "cancel_run",
        }
    }
}

/// Result of [`RunCommand::PlaceBid`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedBid {
    pub bid: Bid,
    /// False when an existing bid was updated.
    pub created: bool,
    /// State of the run after the bid; a first bid moves a planning run to active.
    pub state: RunState,
}

/// Result of [`RunCommand::ToggleReady`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readiness {
    pub is_ready: bool,
    pub state: RunState,
}

/// Result of [`RunCommand::CompleteShopping`].
#[derive(Debug, Clone, PartialEq)]
pub struct ShoppingOutcome {
    /// `Adjusting` when `mismatches` is non-empty, `Distributing` otherwise.
    pub state: RunState,
    pub mismatches: Vec<Mismatch>,
    pub allocations: Vec<Allocation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunCommandResult {
    BidPlaced(PlacedBid),
    BidRetracted { bid: Bid, state: RunState },
    ReadyToggled(Readiness),
    HelperSet(Participation),
    Confirmed(Run),
    ShoppingStarted(Vec<ShoppingListItem>),
    PurchaseRecorded(ShoppingListItem),
    PurchaseUndone(ShoppingListItem),
    ShoppingCompleted(ShoppingOutcome),
    AdjustingFinished(Vec<Allocation>),
    PickedUp(Bid),
    Completed(Run),
    Cancelled(Run),
}

impl RunCommandResult {
    /// Whether the run ended with this command.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunCommandResult::Completed(_) | RunCommandResult::Cancelled(_))
    }
}
