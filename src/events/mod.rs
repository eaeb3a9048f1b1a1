//! # Run Events
//!
//! Notifications published after a run change has been committed. Delivery is
//! fire-and-forget: [`EventBus::emit`] spawns one task per handler and returns
//! immediately, and a supervising task logs any handler failure or panic. A
//! broken handler can never fail or delay the operation that emitted the event.

use crate::model::{GroupId, ProductId, Run, RunId, RunState, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RunCreated,
    StateChanged,
    BidPlaced,
    BidRetracted,
    ReadyToggled,
    HelperChanged,
    PurchaseRecorded,
    PurchaseUndone,
    BidPickedUp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunEvent {
    pub kind: EventKind,
    pub run_id: RunId,
    pub group_id: GroupId,
    pub store_name: Option<String>,
    pub old_state: Option<RunState>,
    pub new_state: Option<RunState>,
    pub user_id: Option<UserId>,
    pub product_id: Option<ProductId>,
    pub occurred_at: DateTime<Utc>,
}

impl RunEvent {
    pub fn new(kind: EventKind, run: &Run, occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            run_id: run.id,
            group_id: run.group_id,
            store_name: None,
            old_state: None,
            new_state: None,
            user_id: None,
            product_id: None,
            occurred_at,
        }
    }

    pub fn state_changed(
        run: &Run,
        from: RunState,
        to: RunState,
        store_name: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            store_name,
            old_state: Some(from),
            new_state: Some(to),
            ..Self::new(EventKind::StateChanged, run, occurred_at)
        }
    }

    pub fn by(mut self, user: UserId) -> Self {
        self.user_id = Some(user);
        self
    }

    pub fn on(mut self, product: ProductId) -> Self {
        self.product_id = Some(product);
        self
    }
}

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Shown in failure logs.
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &RunEvent) -> Result<(), HandlerError>;
}

/// Fans events out to every registered handler.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, handler: impl EventHandler) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Hands `event` to every handler in its own task. Never fails.
    pub fn emit(&self, event: RunEvent) {
        debug!(kind = ?event.kind, run_id = %event.run_id, "Emitting event");
        let event = Arc::new(event);
        for handler in &self.handlers {
            let handler = Arc::clone(handler);
            let event = Arc::clone(&event);
            tokio::spawn(async move {
                let name = handler.name();
                let kind = event.kind;
                let run_id = event.run_id;
                let delivery = tokio::spawn(async move { handler.handle(&event).await });
                match delivery.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(handler = name, ?kind, %run_id, error = %e, "Event handler failed")
                    }
                    Err(e) => {
                        warn!(handler = name, ?kind, %run_id, error = %e, "Event handler panicked")
                    }
                }
            });
        }
    }
}

/// Writes every event to the log.
pub struct LogEventHandler;

#[async_trait]
impl EventHandler for LogEventHandler {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn handle(&self, event: &RunEvent) -> Result<(), HandlerError> {
        match (event.old_state, event.new_state) {
            (Some(from), Some(to)) => info!(
                run_id = %event.run_id,
                store = event.store_name.as_deref().unwrap_or("-"),
                %from,
                %to,
                "Run state changed"
            ),
            _ => info!(run_id = %event.run_id, kind = ?event.kind, "Run event"),
        }
        Ok(())
    }
}

/// Forwards events into a channel, for consumers living in another task.
pub struct ChannelEventHandler {
    sender: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelEventHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventHandler for ChannelEventHandler {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn handle(&self, event: &RunEvent) -> Result<(), HandlerError> {
        self.sender.send(event.clone())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StoreId;
    use std::time::Duration;

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn handle(&self, _event: &RunEvent) -> Result<(), HandlerError> {
            Err("subscriber offline".into())
        }
    }

    struct Panicking;

    #[async_trait]
    impl EventHandler for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn handle(&self, _event: &RunEvent) -> Result<(), HandlerError> {
            panic!("handler bug");
        }
    }

    #[tokio::test]
    async fn failing_handlers_do_not_stop_delivery() {
        let (channel, mut events) = ChannelEventHandler::new();
        let bus = EventBus::new()
            .with_handler(Failing)
            .with_handler(Panicking)
            .with_handler(channel);
        let run = Run::new(RunId(1), GroupId(2), StoreId(3), Utc::now());

        bus.emit(RunEvent::state_changed(
            &run,
            RunState::Planning,
            RunState::Active,
            Some("Costco".to_string()),
            Utc::now(),
        ));

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, EventKind::StateChanged);
        assert_eq!(event.group_id, GroupId(2));
        assert_eq!(event.new_state, Some(RunState::Active));
        assert_eq!(event.store_name.as_deref(), Some("Costco"));
    }
}
