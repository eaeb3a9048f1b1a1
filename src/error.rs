//! Error taxonomy for run operations.
//!
//! One enum covers every run operation; clients match on the variant instead of
//! parsing messages. Lower layers keep their own error types
//! ([`StoreError`], [`FrameworkError`]) and convert through `#[from]`.

use crate::adjustment::Mismatch;
use crate::framework::FrameworkError;
use crate::model::{AmountError, RunId, RunState};
use crate::store::StoreError;
use thiserror::Error;

/// Errors returned by run operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RunError {
    /// Run, participation, bid, product or shopping-list item is absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Caller is not a group member, or not the leader for a leader-only operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The state machine rejected a transition.
    #[error("cannot move run from {from} to {to} (allowed: {})", list_states(.allowed))]
    InvalidStateTransition {
        from: RunState,
        to: RunState,
        allowed: Vec<RunState>,
    },

    /// The operation is not a transition but is not permitted in the current state.
    #[error("{operation} is not allowed while the run is {state}")]
    InvalidState {
        operation: &'static str,
        state: RunState,
    },

    /// Bad quantity or price, or a per-run limit was hit.
    #[error("validation error: {0}")]
    Validation(String),

    /// Quantities are still out of balance after adjusting.
    #[error("adjustment incomplete: {}", list_mismatches(.remaining))]
    Conflict { remaining: Vec<Mismatch> },

    /// Cancel or complete attempted on a finished run.
    #[error("run is already {0}")]
    AlreadyInTerminalState(RunState),

    /// Distribution cannot complete while goods are waiting to be collected.
    #[error("{outstanding} distributed bid(s) not picked up yet")]
    PickupPending { outstanding: usize },

    #[error("shopping list for {0} was already generated")]
    ShoppingListExists(RunId),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("run actor error: {0}")]
    Actor(#[from] FrameworkError),
}

impl RunError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        RunError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<AmountError> for RunError {
    fn from(e: AmountError) -> Self {
        RunError::Validation(e.to_string())
    }
}

fn list_states(states: &[RunState]) -> String {
    if states.is_empty() {
        return "none".to_string();
    }
    states
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn list_mismatches(remaining: &[Mismatch]) -> String {
    remaining
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProductId, Quantity};

    #[test]
    fn transition_error_lists_allowed_targets() {
        let err = RunError::InvalidStateTransition {
            from: RunState::Planning,
            to: RunState::Shopping,
            allowed: vec![RunState::Active, RunState::Cancelled],
        };
        assert_eq!(
            err.to_string(),
            "cannot move run from planning to shopping (allowed: active, cancelled)"
        );
    }

    #[test]
    fn conflict_reports_remaining_delta() {
        let err = RunError::Conflict {
            remaining: vec![Mismatch {
                product_id: ProductId(4),
                requested: Quantity::units(6),
                purchased: Quantity::units(3),
            }],
        };
        assert_eq!(
            err.to_string(),
            "adjustment incomplete: product_4 short by 3.00 (requested 6.00, purchased 3.00)"
        );
    }
}
