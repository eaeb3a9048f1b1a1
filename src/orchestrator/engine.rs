//! # Run Engine
//!
//! The work done inside a run's actor. Every command follows the same path:
//!
//! 1. Load the run aggregate and check the caller belongs to the run's group.
//! 2. Apply the command to a working copy, asking the state machine before any
//!    state change and delegating to the ledger, shopping-list generator,
//!    adjustment validator and distribution engine.
//! 3. Commit the working copy in one compare-and-swap write.
//! 4. Emit the collected events.
//!
//! Any failure before step 3 drops the working copy, so nothing partial is
//! ever stored and no event goes out for a change that did not happen.

use crate::adjustment::AdjustmentValidator;
use crate::catalog::Catalog;
use crate::config::RunConfig;
use crate::distribution::DistributionEngine;
use crate::error::RunError;
use crate::events::{EventBus, EventKind, RunEvent};
use crate::framework::KeyedHandler;
use crate::ledger::{BidChange, BidLedger, BidRequest};
use crate::model::{
    BidId, IdAllocator, Money, Participation, ParticipationId, ProductId, Quantity, RunAggregate,
    RunId, RunState, StoreId, UserId,
};
use crate::orchestrator::command::{
    PlacedBid, Readiness, RunCommand, RunCommandResult, ShoppingOutcome,
};
use crate::shopping_list::ShoppingListGenerator;
use crate::state_machine;
use crate::store::{RunRepository, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Working state of one command.
struct Txn {
    agg: RunAggregate,
    version: u64,
    state: RunState,
    dirty: bool,
    events: Vec<RunEvent>,
    now: DateTime<Utc>,
}

impl Txn {
    fn begin(agg: RunAggregate, now: DateTime<Utc>) -> Self {
        Self {
            version: agg.run.version,
            state: agg.run.state,
            agg,
            dirty: false,
            events: Vec::new(),
            now,
        }
    }

    fn state(&self) -> RunState {
        self.agg.run.state
    }

    fn check(&self, to: RunState) -> Result<(), RunError> {
        state_machine::validate_transition(self.state(), to)
    }

    fn transition(&mut self, to: RunState) -> Result<(), RunError> {
        let from = self.state();
        state_machine::validate_transition(from, to)?;
        self.agg.run.enter(to, self.now);
        self.agg.run.version = self.version + 1;
        info!(run_id = %self.agg.run.id, %from, %to, "Run state changed");
        self.events
            .push(RunEvent::state_changed(&self.agg.run, from, to, None, self.now));
        Ok(())
    }

    /// Marks the aggregate as changed beyond its state.
    fn touch(&mut self) {
        self.dirty = true;
        self.agg.run.version = self.version + 1;
    }

    fn record(&mut self, kind: EventKind, user: UserId, product: Option<ProductId>) {
        let event = RunEvent::new(kind, &self.agg.run, self.now).by(user);
        self.events.push(match product {
            Some(product) => event.on(product),
            None => event,
        });
    }

    fn participation(&self, user: UserId) -> Result<&Participation, RunError> {
        self.agg
            .participation_of(user)
            .ok_or_else(|| RunError::not_found("participation", user))
    }

    fn require_leader(&self, user: UserId, operation: &str) -> Result<(), RunError> {
        match self.agg.leader() {
            Some(leader) if leader.user_id == user => Ok(()),
            _ => Err(RunError::Forbidden(format!(
                "only the run leader can {operation}"
            ))),
        }
    }

    /// Leader or helper.
    fn require_shopper(&self, user: UserId, operation: &str) -> Result<(), RunError> {
        match self.agg.participation_of(user) {
            Some(p) if p.can_shop() => Ok(()),
            _ => Err(RunError::Forbidden(format!(
                "only the leader or a helper can {operation}"
            ))),
        }
    }

    fn require_state(&self, expected: RunState, operation: &'static str) -> Result<(), RunError> {
        if self.state() == expected {
            Ok(())
        } else {
            Err(RunError::InvalidState {
                operation,
                state: self.state(),
            })
        }
    }

    fn require_live(&self) -> Result<(), RunError> {
        if state_machine::is_terminal(self.state()) {
            Err(RunError::AlreadyInTerminalState(self.state()))
        } else {
            Ok(())
        }
    }
}

/// Shared by every run actor; holds only ports and stateless components.
pub struct RunEngine {
    repo: Arc<dyn RunRepository>,
    catalog: Arc<dyn Catalog>,
    bus: EventBus,
    ledger: BidLedger,
    config: RunConfig,
    ids: IdAllocator,
}

impl RunEngine {
    pub fn new(
        repo: Arc<dyn RunRepository>,
        catalog: Arc<dyn Catalog>,
        bus: EventBus,
        config: RunConfig,
        ids: IdAllocator,
    ) -> Self {
        Self {
            repo,
            catalog,
            bus,
            ledger: BidLedger::new(&config),
            config,
            ids,
        }
    }

    pub fn repository(&self) -> &Arc<dyn RunRepository> {
        &self.repo
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    /// Loads a run the caller is allowed to see.
    pub async fn load_for(&self, run_id: RunId, user: UserId) -> Result<RunAggregate, RunError> {
        let agg = self.repo.load_run(run_id).await.map_err(|e| match e {
            StoreError::NotFound(id) => RunError::not_found("run", id),
            other => other.into(),
        })?;
        if !self.catalog.is_member(agg.run.group_id, user).await {
            return Err(RunError::Forbidden(format!(
                "{user} is not a member of {}",
                agg.run.group_id
            )));
        }
        Ok(agg)
    }

    fn execute(&self, txn: &mut Txn, command: RunCommand) -> Result<RunCommandResult, RunError> {
        match command {
            RunCommand::PlaceBid {
                user,
                product,
                quantity,
                interested_only,
                comment,
            } => self.place_bid(txn, user, product, quantity, interested_only, comment),
            RunCommand::RetractBid { user, product } => self.retract_bid(txn, user, product),
            RunCommand::ToggleReady { user } => self.toggle_ready(txn, user),
            RunCommand::SetHelper {
                user,
                helper,
                is_helper,
            } => self.set_helper(txn, user, helper, is_helper),
            RunCommand::ForceConfirm { user } => {
                txn.require_leader(user, "force confirmation")?;
                txn.transition(RunState::Confirmed)?;
                Ok(RunCommandResult::Confirmed(txn.agg.run.clone()))
            }
            RunCommand::StartShopping { user } => self.start_shopping(txn, user),
            RunCommand::RecordPurchase {
                user,
                product,
                quantity,
                price_per_unit,
                total,
            } => self.record_purchase(txn, user, product, quantity, price_per_unit, total),
            RunCommand::UndoPurchase { user, product } => self.undo_purchase(txn, user, product),
            RunCommand::CompleteShopping { user } => self.complete_shopping(txn, user),
            RunCommand::FinishAdjusting { user, force } => self.finish_adjusting(txn, user, force),
            RunCommand::MarkPickedUp { user, bid } => self.mark_picked_up(txn, user, bid),
            RunCommand::CompleteDistribution { user } => self.complete_distribution(txn, user),
            RunCommand::CancelRun { user } => {
                txn.require_leader(user, "cancel the run")?;
                txn.require_live()?;
                txn.transition(RunState::Cancelled)?;
                Ok(RunCommandResult::Cancelled(txn.agg.run.clone()))
            }
        }
    }

    fn place_bid(
        &self,
        txn: &mut Txn,
        user: UserId,
        product: ProductId,
        quantity: f64,
        interested_only: bool,
        comment: Option<String>,
    ) -> Result<RunCommandResult, RunError> {
        let state = txn.state();
        BidLedger::ensure_open(state, "place_bid")?;
        let quantity = self.ledger.parse_quantity(quantity)?;

        let existing = txn.agg.participation_of(user).map(|p| p.id);
        let participation = match existing {
            Some(id) => id,
            None => self.join(txn, user)?,
        };
        if state == RunState::Adjusting {
            AdjustmentValidator::check_bid_change(
                &txn.agg,
                participation,
                product,
                quantity,
                interested_only,
            )?;
        }

        let change = self.ledger.place_bid(
            &mut txn.agg,
            &self.ids,
            BidRequest {
                participation_id: participation,
                product_id: product,
                quantity,
                interested_only,
                comment,
            },
            txn.now,
        )?;
        txn.touch();
        txn.record(EventKind::BidPlaced, user, Some(product));

        let is_leader = txn
            .agg
            .participation(participation)
            .is_some_and(|p| p.is_leader);
        if state == RunState::Planning && !is_leader {
            txn.transition(RunState::Active)?;
        }

        Ok(RunCommandResult::BidPlaced(PlacedBid {
            created: matches!(change, BidChange::Created(_)),
            bid: change.bid().clone(),
            state: txn.state(),
        }))
    }

    /// Adds `user` to the run as a regular participant.
    fn join(&self, txn: &mut Txn, user: UserId) -> Result<ParticipationId, RunError> {
        if txn.state() == RunState::Adjusting {
            return Err(RunError::Validation(
                "no new participants while the run is adjusting".to_string(),
            ));
        }
        let members = txn.agg.active_participations().count();
        if members >= self.config.max_members_per_run {
            return Err(RunError::Validation(format!(
                "run already has {members} participants (limit {})",
                self.config.max_members_per_run
            )));
        }
        let participation =
            Participation::new(self.ids.participation(), txn.agg.run.id, user, false, txn.now);
        let id = participation.id;
        debug!(run_id = %txn.agg.run.id, %user, participation_id = %id, "Participant joined");
        txn.agg.participations.push(participation);
        Ok(id)
    }

    fn retract_bid(
        &self,
        txn: &mut Txn,
        user: UserId,
        product: ProductId,
    ) -> Result<RunCommandResult, RunError> {
        let state = txn.state();
        BidLedger::ensure_open(state, "retract_bid")?;
        let participation = txn.participation(user)?.id;
        if state == RunState::Adjusting {
            AdjustmentValidator::check_retraction(&txn.agg, participation, product)?;
        }

        let bid = self.ledger.retract_bid(&mut txn.agg, product, participation)?;
        txn.touch();
        txn.record(EventKind::BidRetracted, user, Some(product));

        if state == RunState::Active && !has_member_bids(&txn.agg) {
            txn.transition(RunState::Planning)?;
        }
        Ok(RunCommandResult::BidRetracted {
            bid,
            state: txn.state(),
        })
    }

    fn toggle_ready(&self, txn: &mut Txn, user: UserId) -> Result<RunCommandResult, RunError> {
        txn.require_state(RunState::Active, "toggle_ready")?;
        let id = txn.participation(user)?.id;
        let is_ready = match txn.agg.participation_mut(id) {
            Some(p) => {
                p.is_ready = !p.is_ready;
                p.is_ready
            }
            None => return Err(RunError::not_found("participation", id)),
        };
        txn.touch();
        txn.record(EventKind::ReadyToggled, user, None);

        if txn.agg.active_participations().all(|p| p.is_ready) {
            txn.transition(RunState::Confirmed)?;
        }
        Ok(RunCommandResult::ReadyToggled(Readiness {
            is_ready,
            state: txn.state(),
        }))
    }

    fn set_helper(
        &self,
        txn: &mut Txn,
        user: UserId,
        helper: UserId,
        is_helper: bool,
    ) -> Result<RunCommandResult, RunError> {
        txn.require_leader(user, "assign helpers")?;
        txn.require_live()?;
        let id = txn.participation(helper)?.id;
        let participation = match txn.agg.participation_mut(id) {
            Some(p) => {
                p.is_helper = is_helper;
                p.clone()
            }
            None => return Err(RunError::not_found("participation", id)),
        };
        txn.touch();
        txn.record(EventKind::HelperChanged, helper, None);
        Ok(RunCommandResult::HelperSet(participation))
    }

    fn start_shopping(&self, txn: &mut Txn, user: UserId) -> Result<RunCommandResult, RunError> {
        txn.require_leader(user, "start shopping")?;
        txn.check(RunState::Shopping)?;
        let items = ShoppingListGenerator::generate(&mut txn.agg, &self.ids)?;
        txn.touch();
        txn.transition(RunState::Shopping)?;
        Ok(RunCommandResult::ShoppingStarted(items))
    }

    fn record_purchase(
        &self,
        txn: &mut Txn,
        user: UserId,
        product: ProductId,
        quantity: f64,
        price_per_unit: f64,
        total: Option<f64>,
    ) -> Result<RunCommandResult, RunError> {
        txn.require_state(RunState::Shopping, "record_purchase")?;
        txn.require_shopper(user, "record purchases")?;

        let (quantity, price, total) = self.parse_purchase(quantity, price_per_unit, total)?;

        let next_order = txn
            .agg
            .items
            .iter()
            .filter_map(|i| i.purchase_order)
            .max()
            .map_or(1, |order| order + 1);
        let item = txn
            .agg
            .item_for_mut(product)
            .ok_or_else(|| RunError::not_found("shopping list item", product))?;
        item.purchased_quantity = Some(quantity);
        item.purchased_price_per_unit = Some(price);
        item.purchased_total = Some(total);
        item.is_purchased = true;
        item.purchase_order = item.purchase_order.or(Some(next_order));
        let item = item.clone();

        txn.touch();
        txn.record(EventKind::PurchaseRecorded, user, Some(product));
        Ok(RunCommandResult::PurchaseRecorded(item))
    }

    /// Converts and bounds purchase inputs. The total defaults to
    /// `price * quantity`.
    fn parse_purchase(
        &self,
        quantity: f64,
        price_per_unit: f64,
        total: Option<f64>,
    ) -> Result<(Quantity, Money, Money), RunError> {
        let quantity = Quantity::from_f64(quantity)?;
        let price = Money::from_f64(price_per_unit)?;
        if quantity.is_negative() || price.is_negative() {
            return Err(RunError::Validation(
                "purchase amounts must not be negative".to_string(),
            ));
        }
        if quantity > self.config.max_purchase_quantity {
            return Err(RunError::Validation(format!(
                "purchased quantity {quantity} exceeds the limit of {}",
                self.config.max_purchase_quantity
            )));
        }
        if price > self.config.max_price_per_unit {
            return Err(RunError::Validation(format!(
                "price {price} exceeds the limit of {}",
                self.config.max_price_per_unit
            )));
        }

        let total = match total {
            Some(total) => Money::from_f64(total)?,
            None => price.times(quantity)?,
        };
        let max_total = self
            .config
            .max_price_per_unit
            .times(self.config.max_purchase_quantity)?;
        if total.is_negative() || total > max_total {
            return Err(RunError::Validation(format!(
                "purchase total {total} must be between 0.00 and {max_total}"
            )));
        }
        Ok((quantity, price, total))
    }

    fn undo_purchase(
        &self,
        txn: &mut Txn,
        user: UserId,
        product: ProductId,
    ) -> Result<RunCommandResult, RunError> {
        txn.require_state(RunState::Shopping, "undo_purchase")?;
        txn.require_shopper(user, "undo purchases")?;

        let item = txn
            .agg
            .item_for_mut(product)
            .ok_or_else(|| RunError::not_found("shopping list item", product))?;
        if !item.is_purchased {
            return Err(RunError::Validation(format!("{product} has not been purchased")));
        }
        item.clear_purchase();
        let item = item.clone();

        txn.touch();
        txn.record(EventKind::PurchaseUndone, user, Some(product));
        Ok(RunCommandResult::PurchaseUndone(item))
    }

    fn complete_shopping(&self, txn: &mut Txn, user: UserId) -> Result<RunCommandResult, RunError> {
        txn.require_leader(user, "complete shopping")?;
        // Validate against the table before doing any work.
        txn.check(RunState::Distributing)?;

        let mismatches = AdjustmentValidator::shopping_mismatches(&txn.agg);
        if !mismatches.is_empty() {
            info!(
                run_id = %txn.agg.run.id,
                mismatches = mismatches.len(),
                "Purchases differ from bids"
            );
            txn.transition(RunState::Adjusting)?;
            return Ok(RunCommandResult::ShoppingCompleted(ShoppingOutcome {
                state: txn.state(),
                mismatches,
                allocations: Vec::new(),
            }));
        }

        let allocations = DistributionEngine::distribute(&mut txn.agg, &self.ids, txn.now)?;
        txn.touch();
        txn.transition(RunState::Distributing)?;
        Ok(RunCommandResult::ShoppingCompleted(ShoppingOutcome {
            state: txn.state(),
            mismatches,
            allocations,
        }))
    }

    fn finish_adjusting(
        &self,
        txn: &mut Txn,
        user: UserId,
        force: bool,
    ) -> Result<RunCommandResult, RunError> {
        txn.require_leader(user, "finish adjusting")?;
        txn.check(RunState::Distributing)?;
        txn.require_state(RunState::Adjusting, "finish_adjusting")?;
        if force {
            info!(run_id = %txn.agg.run.id, "Adjustment forced, skipping verification");
        } else {
            AdjustmentValidator::verify_balanced(&txn.agg)?;
        }

        let allocations = DistributionEngine::distribute(&mut txn.agg, &self.ids, txn.now)?;
        txn.touch();
        txn.transition(RunState::Distributing)?;
        Ok(RunCommandResult::AdjustingFinished(allocations))
    }

    fn mark_picked_up(
        &self,
        txn: &mut Txn,
        user: UserId,
        bid: BidId,
    ) -> Result<RunCommandResult, RunError> {
        txn.require_state(RunState::Distributing, "mark_picked_up")?;
        txn.require_shopper(user, "hand out items")?;

        let target = txn
            .agg
            .bid_mut(bid)
            .ok_or_else(|| RunError::not_found("bid", bid))?;
        if target.distributed_quantity.is_none() {
            return Err(RunError::Validation(format!("{bid} has nothing to pick up")));
        }
        target.is_picked_up = true;
        let product = target.product_id;
        let picked = target.clone();

        txn.touch();
        txn.record(EventKind::BidPickedUp, user, Some(product));
        Ok(RunCommandResult::PickedUp(picked))
    }

    fn complete_distribution(
        &self,
        txn: &mut Txn,
        user: UserId,
    ) -> Result<RunCommandResult, RunError> {
        txn.require_leader(user, "complete distribution")?;
        txn.require_live()?;
        txn.check(RunState::Completed)?;

        let outstanding = DistributionEngine::outstanding_pickups(&txn.agg);
        if outstanding > 0 {
            return Err(RunError::PickupPending { outstanding });
        }
        txn.transition(RunState::Completed)?;
        Ok(RunCommandResult::Completed(txn.agg.run.clone()))
    }

    /// Writes the working copy. A state-only change goes through the narrower
    /// conditional state update.
    async fn commit(&self, txn: Txn) -> Result<Vec<RunEvent>, RunError> {
        let run_id = txn.agg.run.id;
        let new_state = txn.agg.run.state;
        if txn.dirty {
            self.repo.commit_run(txn.agg, txn.version, txn.state).await?;
        } else if new_state != txn.state {
            self.repo
                .update_state_if(run_id, txn.state, new_state, txn.now)
                .await?;
        }
        Ok(txn.events)
    }

    async fn publish(&self, mut events: Vec<RunEvent>, store: StoreId) {
        if events.iter().any(|e| e.kind == EventKind::StateChanged) {
            let name = self.catalog.store_name(store).await;
            for event in events.iter_mut().filter(|e| e.kind == EventKind::StateChanged) {
                event.store_name = name.clone();
            }
        }
        for event in events {
            self.bus.emit(event);
        }
    }
}

/// Whether anyone besides the leader still holds a bid.
fn has_member_bids(agg: &RunAggregate) -> bool {
    agg.bids.iter().any(|bid| {
        agg.participation(bid.participation_id)
            .is_some_and(|p| !p.is_leader && !p.is_removed)
    })
}

#[async_trait]
impl KeyedHandler for RunEngine {
    type Key = RunId;
    type Command = RunCommand;
    type Reply = RunCommandResult;
    type Error = RunError;

    async fn handle(
        &self,
        run_id: RunId,
        command: RunCommand,
    ) -> Result<RunCommandResult, RunError> {
        let operation = command.name();
        let agg = self.load_for(run_id, command.user()).await?;
        let store = agg.run.store_id;

        let mut txn = Txn::begin(agg, Utc::now());
        let result = self.execute(&mut txn, command)?;
        let events = self.commit(txn).await?;
        debug!(%run_id, operation, events = events.len(), "Committed");

        self.publish(events, store).await;
        Ok(result)
    }

    fn is_final(&self, reply: &RunCommandResult) -> bool {
        reply.is_terminal()
    }

    /// Completed, cancelled and unknown runs need no actor.
    async fn is_retired(&self, run_id: RunId) -> bool {
        match self.repo.load_run(run_id).await {
            Ok(agg) => state_machine::is_terminal(agg.run.state),
            Err(StoreError::NotFound(_)) => true,
            Err(_) => false,
        }
    }
}
