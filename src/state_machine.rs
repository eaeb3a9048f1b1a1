//! # Run State Machine
//!
//! The single source of truth for which [`RunState`] moves are legal.
//!
//! ```text
//! PLANNING ──► ACTIVE ──► CONFIRMED ──► SHOPPING ──► DISTRIBUTING ──► COMPLETED
//!    ▲           │  ▲          │            │             ▲
//!    └───────────┘  └──────────┘            └─► ADJUSTING ┘
//!
//! every non-terminal state ──► CANCELLED
//! ```
//!
//! Nothing else in the crate compares states to decide whether a change is
//! allowed; callers ask [`validate_transition`] and act on the answer.

use crate::error::RunError;
use crate::model::RunState;

/// Targets reachable from `from`, in a fixed order.
pub fn allowed_transitions(from: RunState) -> &'static [RunState] {
    use RunState::*;
    match from {
        Planning => &[Active, Cancelled],
        Active => &[Confirmed, Planning, Cancelled],
        Confirmed => &[Shopping, Active, Cancelled],
        Shopping => &[Adjusting, Distributing, Cancelled],
        Adjusting => &[Distributing, Cancelled],
        Distributing => &[Completed, Cancelled],
        Completed | Cancelled => &[],
    }
}

pub fn can_transition(from: RunState, to: RunState) -> bool {
    allowed_transitions(from).contains(&to)
}

/// Fails with [`RunError::InvalidStateTransition`] unless `from → to` is in the table.
pub fn validate_transition(from: RunState, to: RunState) -> Result<(), RunError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(RunError::InvalidStateTransition {
            from,
            to,
            allowed: allowed_transitions(from).to_vec(),
        })
    }
}

/// No transition leaves a terminal state.
pub fn is_terminal(state: RunState) -> bool {
    allowed_transitions(state).is_empty()
}

pub fn can_cancel(state: RunState) -> bool {
    can_transition(state, RunState::Cancelled)
}
