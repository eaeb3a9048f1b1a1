//! # Run Repository
//!
//! The persistence port the engine writes through, plus an in-memory
//! implementation backed by its own actor.
//!
//! Every write is all-or-nothing: a commit replaces the whole [`RunAggregate`]
//! only if the stored version and state still match what the writer loaded.

mod actor;
mod memory;

pub use actor::StoreActor;
pub use memory::MemoryRepository;

use crate::model::{GroupId, IdWatermark, Run, RunAggregate, RunId, RunState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("run {0} not found")]
    NotFound(RunId),
    #[error("run {0} already exists")]
    AlreadyExists(RunId),
    #[error("stale write: expected version {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },
    #[error("stale write: expected state {expected}, found {actual}")]
    StateMismatch { expected: RunState, actual: RunState },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RunRepository: Send + Sync + 'static {
    async fn insert_run(&self, run: RunAggregate) -> Result<(), StoreError>;

    async fn load_run(&self, id: RunId) -> Result<RunAggregate, StoreError>;

    /// Replaces the stored aggregate if it is still at `expected_version` and
    /// `expected_state`.
    async fn commit_run(
        &self,
        run: RunAggregate,
        expected_version: u64,
        expected_state: RunState,
    ) -> Result<(), StoreError>;

    /// Moves the run from `expected` to `new`, recording the entry time and
    /// bumping the version. Returns the updated run.
    async fn update_state_if(
        &self,
        id: RunId,
        expected: RunState,
        new: RunState,
        at: DateTime<Utc>,
    ) -> Result<Run, StoreError>;

    async fn list_runs_for_group(&self, group: GroupId) -> Result<Vec<Run>, StoreError>;

    /// Highest ids across every stored aggregate, so a new allocator never
    /// hands out one that is already taken.
    async fn id_watermark(&self) -> Result<IdWatermark, StoreError>;
}

/// Creates the in-memory store: spawn `actor.run()`, hand out the repository.
pub fn in_memory(buffer_size: usize) -> (StoreActor, MemoryRepository) {
    StoreActor::new(buffer_size)
}
