//! Repository client for the in-memory [`StoreActor`](super::StoreActor).

use crate::model::{GroupId, IdWatermark, Run, RunAggregate, RunId, RunState};
use crate::store::actor::StoreRequest;
use crate::store::{RunRepository, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

#[derive(Clone)]
pub struct MemoryRepository {
    sender: mpsc::Sender<StoreRequest>,
}

impl MemoryRepository {
    pub(crate) fn new(sender: mpsc::Sender<StoreRequest>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, StoreError>>) -> StoreRequest,
    ) -> Result<T, StoreError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| StoreError::Unavailable("store actor closed".to_string()))?;
        response
            .await
            .map_err(|_| StoreError::Unavailable("store actor dropped response".to_string()))?
    }
}

#[async_trait]
impl RunRepository for MemoryRepository {
    async fn insert_run(&self, run: RunAggregate) -> Result<(), StoreError> {
        self.request(|respond_to| StoreRequest::Insert {
            run: Box::new(run),
            respond_to,
        })
        .await
    }

    async fn load_run(&self, id: RunId) -> Result<RunAggregate, StoreError> {
        self.request(|respond_to| StoreRequest::Load { id, respond_to })
            .await
    }

    async fn commit_run(
        &self,
        run: RunAggregate,
        expected_version: u64,
        expected_state: RunState,
    ) -> Result<(), StoreError> {
        self.request(|respond_to| StoreRequest::Commit {
            run: Box::new(run),
            expected_version,
            expected_state,
            respond_to,
        })
        .await
    }

    async fn update_state_if(
        &self,
        id: RunId,
        expected: RunState,
        new: RunState,
        at: DateTime<Utc>,
    ) -> Result<Run, StoreError> {
        self.request(|respond_to| StoreRequest::UpdateState {
            id,
            expected,
            new,
            at,
            respond_to,
        })
        .await
    }

    async fn list_runs_for_group(&self, group: GroupId) -> Result<Vec<Run>, StoreError> {
        self.request(|respond_to| StoreRequest::ListForGroup { group, respond_to })
            .await
    }

    async fn id_watermark(&self) -> Result<IdWatermark, StoreError> {
        self.request(|respond_to| StoreRequest::Watermark { respond_to })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ItemId, Participation, ParticipationId, ProductId, Quantity, ShoppingListItem, StoreId,
        UserId,
    };

    fn aggregate(id: u64, group: u64) -> RunAggregate {
        let now = Utc::now();
        let run = Run::new(RunId(id), GroupId(group), StoreId(1), now);
        let leader = Participation::new(ParticipationId(id), RunId(id), UserId(1), true, now);
        RunAggregate::new(run, leader)
    }

    fn spawn_store() -> MemoryRepository {
        let (actor, repo) = crate::store::in_memory(8);
        tokio::spawn(actor.run());
        repo
    }

    #[tokio::test]
    async fn insert_load_and_list() {
        let repo = spawn_store();
        repo.insert_run(aggregate(1, 10)).await.unwrap();
        repo.insert_run(aggregate(2, 10)).await.unwrap();
        repo.insert_run(aggregate(3, 11)).await.unwrap();

        assert_eq!(
            repo.insert_run(aggregate(1, 10)).await,
            Err(StoreError::AlreadyExists(RunId(1)))
        );
        assert_eq!(repo.load_run(RunId(2)).await.unwrap().run.group_id, GroupId(10));
        assert_eq!(
            repo.load_run(RunId(9)).await,
            Err(StoreError::NotFound(RunId(9)))
        );

        let listed = repo.list_runs_for_group(GroupId(10)).await.unwrap();
        let ids: Vec<RunId> = listed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![RunId(1), RunId(2)]);
    }

    #[tokio::test]
    async fn commit_is_compare_and_swap() {
        let repo = spawn_store();
        repo.insert_run(aggregate(1, 10)).await.unwrap();

        let mut first = repo.load_run(RunId(1)).await.unwrap();
        let second = first.clone();
        first.run.enter(RunState::Active, Utc::now());
        repo.commit_run(first, 0, RunState::Planning).await.unwrap();

        // The second writer loaded the same version and loses.
        assert_eq!(
            repo.commit_run(second, 0, RunState::Planning).await,
            Err(StoreError::VersionConflict {
                expected: 0,
                actual: 1
            })
        );

        let stored = repo.load_run(RunId(1)).await.unwrap();
        assert_eq!(stored.run.state, RunState::Active);
        assert_eq!(stored.run.version, 1);
    }

    #[tokio::test]
    async fn update_state_if_checks_expected_state() {
        let repo = spawn_store();
        repo.insert_run(aggregate(1, 10)).await.unwrap();

        assert_eq!(
            repo.update_state_if(RunId(1), RunState::Active, RunState::Confirmed, Utc::now())
                .await,
            Err(StoreError::StateMismatch {
                expected: RunState::Active,
                actual: RunState::Planning
            })
        );

        let run = repo
            .update_state_if(RunId(1), RunState::Planning, RunState::Cancelled, Utc::now())
            .await
            .unwrap();
        assert_eq!(run.state, RunState::Cancelled);
        assert_eq!(run.version, 1);
        assert!(run.entered_at(RunState::Cancelled).is_some());
    }

    #[tokio::test]
    async fn watermark_covers_every_stored_id() {
        let repo = spawn_store();
        assert_eq!(repo.id_watermark().await.unwrap(), IdWatermark::default());

        repo.insert_run(aggregate(3, 10)).await.unwrap();
        let mut agg = aggregate(5, 11);
        agg.items.push(ShoppingListItem::new(
            ItemId(12),
            RunId(5),
            ProductId(1),
            Quantity::units(1),
        ));
        repo.insert_run(agg).await.unwrap();

        assert_eq!(
            repo.id_watermark().await.unwrap(),
            IdWatermark {
                run: 5,
                participation: 5,
                bid: 0,
                item: 12
            }
        );
    }

    #[tokio::test]
    async fn closed_store_reports_unavailable() {
        let (actor, repo) = crate::store::in_memory(1);
        drop(actor);
        assert!(matches!(
            repo.load_run(RunId(1)).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
