//! A failed write must leave the run exactly as it was: no state change, no
//! distributed quantities, no events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use group_run::catalog::StaticCatalog;
use group_run::config::RunConfig;
use group_run::events::{ChannelEventHandler, EventBus, EventKind, RunEvent};
use group_run::model::{
    GroupId, IdWatermark, ProductId, Run, RunAggregate, RunId, RunState, StoreId, UserId,
};
use group_run::orchestrator::Orchestrator;
use group_run::store::{self, MemoryRepository, RunRepository, StoreError};
use group_run::RunError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

const GROUP: GroupId = GroupId(7);
const STORE: StoreId = StoreId(3);
const FLOUR: ProductId = ProductId(11);
const LEADER: UserId = UserId(1);
const MEMBER: UserId = UserId(2);

/// Delegates to the in-memory store until told to fail writes.
struct FlakyRepository {
    inner: MemoryRepository,
    fail_writes: AtomicBool,
}

impl FlakyRepository {
    fn check(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("disk full".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RunRepository for FlakyRepository {
    async fn insert_run(&self, run: RunAggregate) -> Result<(), StoreError> {
        self.inner.insert_run(run).await
    }

    async fn load_run(&self, id: RunId) -> Result<RunAggregate, StoreError> {
        self.inner.load_run(id).await
    }

    async fn commit_run(
        &self,
        run: RunAggregate,
        expected_version: u64,
        expected_state: RunState,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner.commit_run(run, expected_version, expected_state).await
    }

    async fn update_state_if(
        &self,
        id: RunId,
        expected: RunState,
        new: RunState,
        at: DateTime<Utc>,
    ) -> Result<Run, StoreError> {
        self.check()?;
        self.inner.update_state_if(id, expected, new, at).await
    }

    async fn list_runs_for_group(&self, group: GroupId) -> Result<Vec<Run>, StoreError> {
        self.inner.list_runs_for_group(group).await
    }

    async fn id_watermark(&self) -> Result<IdWatermark, StoreError> {
        self.inner.id_watermark().await
    }
}

struct Harness {
    orch: Orchestrator,
    repo: Arc<FlakyRepository>,
    events: UnboundedReceiver<RunEvent>,
}

impl Harness {
    fn start() -> Self {
        let (actor, inner) = store::in_memory(16);
        tokio::spawn(actor.run());
        let repo = Arc::new(FlakyRepository {
            inner,
            fail_writes: AtomicBool::new(false),
        });
        let catalog = StaticCatalog::new()
            .with_store(STORE, "Metro")
            .with_member(GROUP, LEADER)
            .with_member(GROUP, MEMBER);
        let (channel, events) = ChannelEventHandler::new();
        let orch = Orchestrator::new(
            repo.clone(),
            Arc::new(catalog),
            EventBus::new().with_handler(channel),
            RunConfig::default(),
        );
        Self { orch, repo, events }
    }

    fn fail_writes(&self, fail: bool) {
        self.repo.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Waits for in-flight deliveries, then returns whatever arrived.
    async fn drain(&mut self) -> Vec<RunEvent> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    /// A run in shopping where the member asked for 4 flour and 3 were bought.
    async fn shopping_with_shortage(&self) -> RunId {
        let run = self.orch.create_run(GROUP, STORE, LEADER).await.unwrap().run.id;
        self.orch
            .place_bid(run, MEMBER, FLOUR, 4.0, false, None)
            .await
            .unwrap();
        self.orch.force_confirm(run, LEADER).await.unwrap();
        self.orch.start_shopping(run, LEADER).await.unwrap();
        self.orch
            .record_purchase(run, LEADER, FLOUR, 3.0, 1.5, None)
            .await
            .unwrap();
        run
    }
}

fn assert_storage_failure<T: std::fmt::Debug>(result: Result<T, RunError>) {
    match result {
        Err(RunError::Storage(StoreError::Unavailable(reason))) => assert_eq!(reason, "disk full"),
        other => panic!("expected storage failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_distribution_write_leaves_run_untouched() {
    let mut h = Harness::start();
    let run = h.shopping_with_shortage().await;
    h.orch.complete_shopping(run, LEADER).await.unwrap();
    h.drain().await;

    h.fail_writes(true);
    assert_storage_failure(h.orch.finish_adjusting(run, LEADER, true).await);

    let snapshot = h.orch.snapshot(run, LEADER).await.unwrap();
    assert_eq!(snapshot.run.state, RunState::Adjusting);
    assert!(snapshot.bids.iter().all(|b| b.distributed_quantity.is_none()));
    assert!(h.drain().await.is_empty());

    // The actor is still serving the run and the retry goes through.
    h.fail_writes(false);
    h.orch.finish_adjusting(run, LEADER, true).await.unwrap();
    let snapshot = h.orch.snapshot(run, LEADER).await.unwrap();
    assert_eq!(snapshot.run.state, RunState::Distributing);
    assert!(snapshot.bids.iter().all(|b| b.distributed_quantity.is_some()));

    let events = h.drain().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::StateChanged);
    assert_eq!(events[0].new_state, Some(RunState::Distributing));
    assert_eq!(events[0].store_name.as_deref(), Some("Metro"));
}

#[tokio::test]
async fn test_failed_shopping_completion_keeps_run_in_shopping() {
    let mut h = Harness::start();
    let run = h.shopping_with_shortage().await;
    let before = h.orch.snapshot(run, LEADER).await.unwrap();
    h.drain().await;

    h.fail_writes(true);
    assert_storage_failure(h.orch.complete_shopping(run, LEADER).await);

    let after = h.orch.snapshot(run, LEADER).await.unwrap();
    assert_eq!(after, before);
    assert!(h.drain().await.is_empty());
}

#[tokio::test]
async fn test_failed_state_only_write_is_not_applied() {
    let mut h = Harness::start();
    let run = h.orch.create_run(GROUP, STORE, LEADER).await.unwrap().run.id;
    h.orch
        .place_bid(run, MEMBER, FLOUR, 1.0, false, None)
        .await
        .unwrap();
    h.drain().await;

    h.fail_writes(true);
    assert_storage_failure(h.orch.force_confirm(run, LEADER).await);
    assert_storage_failure(h.orch.cancel_run(run, LEADER).await);

    let snapshot = h.orch.snapshot(run, LEADER).await.unwrap();
    assert_eq!(snapshot.run.state, RunState::Active);
    assert_eq!(snapshot.run.history.len(), 2);
    assert!(h.drain().await.is_empty());
    assert_eq!(h.orch.active_runs().await, 1);
}
