//! # Run Lifecycle Orchestrator
//!
//! The public face of the engine. Every state-mutating operation is routed to
//! the actor owning that run, so operations on one run happen one after the
//! other while different runs proceed in parallel. Reads go straight to the
//! repository; they observe every write whose reply has been received.

pub mod command;
pub mod engine;

pub use command::{PlacedBid, Readiness, RunCommand, RunCommandResult, ShoppingOutcome};
pub use engine::RunEngine;

use crate::catalog::Catalog;
use crate::config::RunConfig;
use crate::distribution::{Allocation, DisplayNames, DistributionEngine, UserDistribution};
use crate::error::RunError;
use crate::events::{EventBus, EventKind, RunEvent};
use crate::framework::{ActorClient, ActorRegistry, FrameworkError};
use crate::model::{
    Bid, BidId, GroupId, IdAllocator, Participation, ProductId, Run, RunAggregate, RunId,
    RunState, ShoppingListItem, StoreId, UserId,
};
use crate::store::RunRepository;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Unwraps the reply variant paired with the command that was sent.
macro_rules! expect_reply {
    ($reply:expr, $variant:path) => {
        match $reply {
            $variant(value) => Ok(value),
            other => unreachable!("mismatched reply: {other:?}"),
        }
    };
}

#[derive(Clone)]
pub struct Orchestrator {
    registry: ActorRegistry<RunEngine>,
}

impl ActorClient<RunEngine> for Orchestrator {
    fn registry(&self) -> &ActorRegistry<RunEngine> {
        &self.registry
    }
}

impl Orchestrator {
    /// Orchestrator over an empty repository.
    pub fn new(
        repo: Arc<dyn RunRepository>,
        catalog: Arc<dyn Catalog>,
        bus: EventBus,
        config: RunConfig,
    ) -> Self {
        Self::with_ids(repo, catalog, bus, config, IdAllocator::new())
    }

    /// Orchestrator over a repository that may already hold runs. New ids
    /// continue after the highest ones stored.
    pub async fn resume(
        repo: Arc<dyn RunRepository>,
        catalog: Arc<dyn Catalog>,
        bus: EventBus,
        config: RunConfig,
    ) -> Result<Self, RunError> {
        let watermark = repo.id_watermark().await?;
        info!(?watermark, "Resuming id allocation");
        let ids = IdAllocator::starting_after(watermark);
        Ok(Self::with_ids(repo, catalog, bus, config, ids))
    }

    fn with_ids(
        repo: Arc<dyn RunRepository>,
        catalog: Arc<dyn Catalog>,
        bus: EventBus,
        config: RunConfig,
        ids: IdAllocator,
    ) -> Self {
        let mailbox_size = config.mailbox_size;
        let engine = RunEngine::new(repo, catalog, bus, config, ids);
        Self {
            registry: ActorRegistry::new(Arc::new(engine), mailbox_size),
        }
    }

    fn engine(&self) -> &RunEngine {
        self.registry.handler()
    }

    /// Starts a run in planning with `leader` as its only participant.
    #[instrument(skip(self))]
    pub async fn create_run(
        &self,
        group: GroupId,
        store: StoreId,
        leader: UserId,
    ) -> Result<RunAggregate, RunError> {
        let engine = self.engine();
        if !engine.catalog().is_member(group, leader).await {
            return Err(RunError::Forbidden(format!(
                "{leader} is not a member of {group}"
            )));
        }
        let store_name = engine
            .catalog()
            .store_name(store)
            .await
            .ok_or_else(|| RunError::not_found("store", store))?;

        let now = Utc::now();
        let ids = engine.ids();
        let run = Run::new(ids.run(), group, store, now);
        let participation = Participation::new(ids.participation(), run.id, leader, true, now);
        let agg = RunAggregate::new(run, participation);
        engine.repository().insert_run(agg.clone()).await?;
        info!(run_id = %agg.run.id, store = %store_name, "Run created");

        let mut event = RunEvent::new(EventKind::RunCreated, &agg.run, now).by(leader);
        event.store_name = Some(store_name);
        event.new_state = Some(RunState::Planning);
        engine.bus().emit(event);
        Ok(agg)
    }

    /// Creates or updates `user`'s bid. A user without a participation joins
    /// the run.
    #[instrument(skip(self, comment))]
    pub async fn place_bid(
        &self,
        run: RunId,
        user: UserId,
        product: ProductId,
        quantity: f64,
        interested_only: bool,
        comment: Option<String>,
    ) -> Result<PlacedBid, RunError> {
        let reply = self
            .dispatch(
                run,
                RunCommand::PlaceBid {
                    user,
                    product,
                    quantity,
                    interested_only,
                    comment,
                },
            )
            .await?;
        expect_reply!(reply, RunCommandResult::BidPlaced)
    }

    /// Returns the removed bid and the run's state afterwards.
    #[instrument(skip(self))]
    pub async fn retract_bid(
        &self,
        run: RunId,
        user: UserId,
        product: ProductId,
    ) -> Result<(Bid, RunState), RunError> {
        match self.dispatch(run, RunCommand::RetractBid { user, product }).await? {
            RunCommandResult::BidRetracted { bid, state } => Ok((bid, state)),
            other => unreachable!("mismatched reply: {other:?}"),
        }
    }

    #[instrument(skip(self))]
    pub async fn toggle_ready(&self, run: RunId, user: UserId) -> Result<Readiness, RunError> {
        let reply = self.dispatch(run, RunCommand::ToggleReady { user }).await?;
        expect_reply!(reply, RunCommandResult::ReadyToggled)
    }

    /// Grants or revokes helper rights (recording purchases, handing out).
    #[instrument(skip(self))]
    pub async fn set_helper(
        &self,
        run: RunId,
        user: UserId,
        helper: UserId,
        is_helper: bool,
    ) -> Result<Participation, RunError> {
        let reply = self
            .dispatch(
                run,
                RunCommand::SetHelper {
                    user,
                    helper,
                    is_helper,
                },
            )
            .await?;
        expect_reply!(reply, RunCommandResult::HelperSet)
    }

    #[instrument(skip(self))]
    pub async fn force_confirm(&self, run: RunId, user: UserId) -> Result<Run, RunError> {
        let reply = self.dispatch(run, RunCommand::ForceConfirm { user }).await?;
        expect_reply!(reply, RunCommandResult::Confirmed)
    }

    #[instrument(skip(self))]
    pub async fn start_shopping(
        &self,
        run: RunId,
        user: UserId,
    ) -> Result<Vec<ShoppingListItem>, RunError> {
        let reply = self.dispatch(run, RunCommand::StartShopping { user }).await?;
        expect_reply!(reply, RunCommandResult::ShoppingStarted)
    }

    /// Records what was bought. `total` defaults to `price_per_unit * quantity`.
    #[instrument(skip(self))]
    pub async fn record_purchase(
        &self,
        run: RunId,
        user: UserId,
        product: ProductId,
        quantity: f64,
        price_per_unit: f64,
        total: Option<f64>,
    ) -> Result<ShoppingListItem, RunError> {
        let reply = self
            .dispatch(
                run,
                RunCommand::RecordPurchase {
                    user,
                    product,
                    quantity,
                    price_per_unit,
                    total,
                },
            )
            .await?;
        expect_reply!(reply, RunCommandResult::PurchaseRecorded)
    }

    #[instrument(skip(self))]
    pub async fn undo_purchase(
        &self,
        run: RunId,
        user: UserId,
        product: ProductId,
    ) -> Result<ShoppingListItem, RunError> {
        let reply = self
            .dispatch(run, RunCommand::UndoPurchase { user, product })
            .await?;
        expect_reply!(reply, RunCommandResult::PurchaseUndone)
    }

    #[instrument(skip(self))]
    pub async fn complete_shopping(
        &self,
        run: RunId,
        user: UserId,
    ) -> Result<ShoppingOutcome, RunError> {
        let reply = self
            .dispatch(run, RunCommand::CompleteShopping { user })
            .await?;
        expect_reply!(reply, RunCommandResult::ShoppingCompleted)
    }

    #[instrument(skip(self))]
    pub async fn finish_adjusting(
        &self,
        run: RunId,
        user: UserId,
        force: bool,
    ) -> Result<Vec<Allocation>, RunError> {
        let reply = self
            .dispatch(run, RunCommand::FinishAdjusting { user, force })
            .await?;
        expect_reply!(reply, RunCommandResult::AdjustingFinished)
    }

    #[instrument(skip(self))]
    pub async fn mark_picked_up(
        &self,
        run: RunId,
        user: UserId,
        bid: BidId,
    ) -> Result<Bid, RunError> {
        let reply = self
            .dispatch(run, RunCommand::MarkPickedUp { user, bid })
            .await?;
        expect_reply!(reply, RunCommandResult::PickedUp)
    }

    #[instrument(skip(self))]
    pub async fn complete_distribution(&self, run: RunId, user: UserId) -> Result<Run, RunError> {
        let reply = self
            .dispatch(run, RunCommand::CompleteDistribution { user })
            .await?;
        expect_reply!(reply, RunCommandResult::Completed)
    }

    #[instrument(skip(self))]
    pub async fn cancel_run(&self, run: RunId, user: UserId) -> Result<Run, RunError> {
        let reply = self.dispatch(run, RunCommand::CancelRun { user }).await?;
        expect_reply!(reply, RunCommandResult::Cancelled)
    }

    /// The whole run as currently stored.
    #[instrument(skip(self))]
    pub async fn snapshot(&self, run: RunId, user: UserId) -> Result<RunAggregate, RunError> {
        self.engine().load_for(run, user).await
    }

    /// Who gets what, per user.
    #[instrument(skip(self))]
    pub async fn distribution_view(
        &self,
        run: RunId,
        user: UserId,
    ) -> Result<Vec<UserDistribution>, RunError> {
        let agg = self.engine().load_for(run, user).await?;
        let catalog = self.engine().catalog();

        let mut names = DisplayNames::default();
        for bid in agg.bids.iter().filter(|b| b.distributed_quantity.is_some()) {
            if let Some(owner) = agg.bidder(bid) {
                if !names.users.contains_key(&owner) {
                    if let Some(name) = catalog.user_name(owner).await {
                        names.users.insert(owner, name);
                    }
                }
            }
            if !names.products.contains_key(&bid.product_id) {
                if let Some(name) = catalog.product_name(bid.product_id).await {
                    names.products.insert(bid.product_id, name);
                }
            }
        }
        debug!(users = names.users.len(), products = names.products.len(), "Names resolved");
        DistributionEngine::view(&agg, &names)
    }

    /// Runs of `group`, oldest first.
    #[instrument(skip(self))]
    pub async fn list_runs(&self, group: GroupId, user: UserId) -> Result<Vec<Run>, RunError> {
        if !self.engine().catalog().is_member(group, user).await {
            return Err(RunError::Forbidden(format!(
                "{user} is not a member of {group}"
            )));
        }
        Ok(self.engine().repository().list_runs_for_group(group).await?)
    }

    /// Number of runs with a live actor.
    pub async fn active_runs(&self) -> usize {
        self.registry.active().await
    }

    /// Stops every run actor after its queued commands finish.
    pub async fn shutdown(&self) -> Result<(), FrameworkError> {
        self.registry.shutdown().await
    }
}
