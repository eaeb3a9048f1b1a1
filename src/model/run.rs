use crate::model::{GroupId, RunId, StoreId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Lifecycle state of a run.
///
/// Legal moves between states live in [`crate::state_machine`]; nothing else
/// decides whether a state change is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Planning,
    Active,
    Confirmed,
    Shopping,
    Adjusting,
    Distributing,
    Completed,
    Cancelled,
}

impl RunState {
    pub const ALL: [RunState; 8] = [
        RunState::Planning,
        RunState::Active,
        RunState::Confirmed,
        RunState::Shopping,
        RunState::Adjusting,
        RunState::Distributing,
        RunState::Completed,
        RunState::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Planning => "planning",
            RunState::Active => "active",
            RunState::Confirmed => "confirmed",
            RunState::Shopping => "shopping",
            RunState::Adjusting => "adjusting",
            RunState::Distributing => "distributing",
            RunState::Completed => "completed",
            RunState::Cancelled => "cancelled",
        }
    }
}

impl Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a run's state history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub state: RunState,
    pub entered_at: DateTime<Utc>,
}

/// A group shopping trip to one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub group_id: GroupId,
    pub store_id: StoreId,
    pub state: RunState,
    /// Every state the run entered, oldest first.
    pub history: Vec<StateEntry>,
    /// Bumped on every committed change.
    pub version: u64,
}

impl Run {
    /// A fresh run in [`RunState::Planning`].
    pub fn new(id: RunId, group_id: GroupId, store_id: StoreId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            group_id,
            store_id,
            state: RunState::Planning,
            history: vec![StateEntry {
                state: RunState::Planning,
                entered_at: now,
            }],
            version: 0,
        }
    }

    /// Latest time the run entered `state`, if it ever did.
    pub fn entered_at(&self, state: RunState) -> Option<DateTime<Utc>> {
        self.history
            .iter()
            .rev()
            .find(|entry| entry.state == state)
            .map(|entry| entry.entered_at)
    }

    /// Records the state change. Callers validate the move first.
    pub(crate) fn enter(&mut self, state: RunState, now: DateTime<Utc>) {
        self.state = state;
        self.history.push(StateEntry {
            state,
            entered_at: now,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn history_keeps_entry_order() {
        let start = Utc::now();
        let mut run = Run::new(RunId(1), GroupId(1), StoreId(1), start);
        run.enter(RunState::Active, start + Duration::seconds(1));
        run.enter(RunState::Planning, start + Duration::seconds(2));

        let states: Vec<_> = run.history.iter().map(|e| e.state).collect();
        assert_eq!(
            states,
            vec![RunState::Planning, RunState::Active, RunState::Planning]
        );
        assert_eq!(
            run.entered_at(RunState::Planning),
            Some(start + Duration::seconds(2))
        );
        assert_eq!(run.entered_at(RunState::Shopping), None);
    }
}
