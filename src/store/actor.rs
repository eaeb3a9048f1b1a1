//! # Store Actor
//!
//! Owns every run aggregate in a plain `HashMap` and applies requests one at a
//! time, which is what makes each compare-and-swap atomic without locks.

use crate::model::{GroupId, IdWatermark, Run, RunAggregate, RunId, RunState};
use crate::store::{MemoryRepository, StoreError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

pub(crate) type Response<T> = oneshot::Sender<Result<T, StoreError>>;

#[derive(Debug)]
pub(crate) enum StoreRequest {
    Insert {
        run: Box<RunAggregate>,
        respond_to: Response<()>,
    },
    Load {
        id: RunId,
        respond_to: Response<RunAggregate>,
    },
    Commit {
        run: Box<RunAggregate>,
        expected_version: u64,
        expected_state: RunState,
        respond_to: Response<()>,
    },
    UpdateState {
        id: RunId,
        expected: RunState,
        new: RunState,
        at: DateTime<Utc>,
        respond_to: Response<Run>,
    },
    ListForGroup {
        group: GroupId,
        respond_to: Response<Vec<Run>>,
    },
    Watermark {
        respond_to: Response<IdWatermark>,
    },
}

pub struct StoreActor {
    receiver: mpsc::Receiver<StoreRequest>,
    runs: HashMap<RunId, RunAggregate>,
}

impl StoreActor {
    /// Creates the actor and the repository client that talks to it.
    pub fn new(buffer_size: usize) -> (Self, MemoryRepository) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            runs: HashMap::new(),
        };
        (actor, MemoryRepository::new(sender))
    }

    /// Processes requests until every repository clone has been dropped.
    pub async fn run(mut self) {
        info!(entity_type = "RunAggregate", "Actor started");

        while let Some(request) = self.receiver.recv().await {
            match request {
                StoreRequest::Insert { run, respond_to } => {
                    let _ = respond_to.send(self.insert(*run));
                }
                StoreRequest::Load { id, respond_to } => {
                    let found = self.runs.get(&id).cloned();
                    debug!(run_id = %id, found = found.is_some(), "Load");
                    let _ = respond_to.send(found.ok_or(StoreError::NotFound(id)));
                }
                StoreRequest::Commit {
                    run,
                    expected_version,
                    expected_state,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.commit(*run, expected_version, expected_state));
                }
                StoreRequest::UpdateState {
                    id,
                    expected,
                    new,
                    at,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.update_state(id, expected, new, at));
                }
                StoreRequest::ListForGroup { group, respond_to } => {
                    let mut runs: Vec<Run> = self
                        .runs
                        .values()
                        .filter(|agg| agg.run.group_id == group)
                        .map(|agg| agg.run.clone())
                        .collect();
                    runs.sort_by_key(|run| run.id);
                    debug!(group_id = %group, count = runs.len(), "List");
                    let _ = respond_to.send(Ok(runs));
                }
                StoreRequest::Watermark { respond_to } => {
                    let watermark = self.watermark();
                    debug!(?watermark, "Watermark");
                    let _ = respond_to.send(Ok(watermark));
                }
            }
        }

        info!(entity_type = "RunAggregate", size = self.runs.len(), "Shutdown");
    }

    fn insert(&mut self, run: RunAggregate) -> Result<(), StoreError> {
        let id = run.run.id;
        if self.runs.contains_key(&id) {
            warn!(run_id = %id, "Insert rejected, id taken");
            return Err(StoreError::AlreadyExists(id));
        }
        self.runs.insert(id, run);
        info!(run_id = %id, size = self.runs.len(), "Created");
        Ok(())
    }

    fn watermark(&self) -> IdWatermark {
        let mut mark = IdWatermark::default();
        for agg in self.runs.values() {
            mark.run = mark.run.max(agg.run.id.0);
            let participations = agg.participations.iter().map(|p| p.id.0);
            mark.participation = participations.fold(mark.participation, u64::max);
            mark.bid = agg.bids.iter().map(|b| b.id.0).fold(mark.bid, u64::max);
            mark.item = agg.items.iter().map(|i| i.id.0).fold(mark.item, u64::max);
        }
        mark
    }

    fn commit(
        &mut self,
        mut run: RunAggregate,
        expected_version: u64,
        expected_state: RunState,
    ) -> Result<(), StoreError> {
        let id = run.run.id;
        let stored = self.runs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        check_current(&stored.run, expected_version, expected_state).inspect_err(|e| {
            warn!(run_id = %id, error = %e, "Commit rejected");
        })?;

        run.run.version = expected_version + 1;
        debug!(run_id = %id, version = run.run.version, state = %run.run.state, "Committed");
        *stored = run;
        Ok(())
    }

    fn update_state(
        &mut self,
        id: RunId,
        expected: RunState,
        new: RunState,
        at: DateTime<Utc>,
    ) -> Result<Run, StoreError> {
        let stored = self.runs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if stored.run.state != expected {
            warn!(run_id = %id, %expected, actual = %stored.run.state, "State update rejected");
            return Err(StoreError::StateMismatch {
                expected,
                actual: stored.run.state,
            });
        }
        stored.run.enter(new, at);
        stored.run.version += 1;
        debug!(run_id = %id, version = stored.run.version, state = %new, "State updated");
        Ok(stored.run.clone())
    }
}

fn check_current(run: &Run, version: u64, state: RunState) -> Result<(), StoreError> {
    if run.version != version {
        return Err(StoreError::VersionConflict {
            expected: version,
            actual: run.version,
        });
    }
    if run.state != state {
        return Err(StoreError::StateMismatch {
            expected: state,
            actual: run.state,
        });
    }
    Ok(())
}
