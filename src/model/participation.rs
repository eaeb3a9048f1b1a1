use crate::model::{ParticipationId, RunId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's membership in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participation {
    pub id: ParticipationId,
    pub run_id: RunId,
    pub user_id: UserId,
    pub is_leader: bool,
    pub is_ready: bool,
    pub is_removed: bool,
    /// Helpers may record purchases and hand out items alongside the leader.
    pub is_helper: bool,
    pub joined_at: DateTime<Utc>,
}

impl Participation {
    pub fn new(
        id: ParticipationId,
        run_id: RunId,
        user_id: UserId,
        is_leader: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            run_id,
            user_id,
            is_leader,
            is_ready: false,
            is_removed: false,
            is_helper: false,
            joined_at: now,
        }
    }

    /// Leader or helper.
    pub fn can_shop(&self) -> bool {
        !self.is_removed && (self.is_leader || self.is_helper)
    }
}
