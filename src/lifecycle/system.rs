use crate::catalog::Catalog;
use crate::config::RunConfig;
use crate::events::EventBus;
use crate::framework::FrameworkError;
use crate::orchestrator::Orchestrator;
use crate::store;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// The running engine: an in-memory store actor plus the orchestrator that
/// owns one actor per active run.
///
/// # Example
///
/// ```ignore
/// let system = RunSystem::new(catalog, EventBus::new().with_handler(LogEventHandler));
///
/// let run = system.orchestrator.create_run(group, store, leader).await?;
/// system.orchestrator.place_bid(run.run.id, member, product, 2.0, false, None).await?;
///
/// system.shutdown().await?;
/// ```
pub struct RunSystem {
    pub orchestrator: Orchestrator,

    /// Task running the store actor (used for graceful shutdown)
    store_handle: JoinHandle<()>,
}

impl RunSystem {
    /// Starts the system with limits read from the environment.
    pub fn new(catalog: impl Catalog, bus: EventBus) -> Self {
        Self::with_config(catalog, bus, RunConfig::from_env())
    }

    pub fn with_config(catalog: impl Catalog, bus: EventBus, config: RunConfig) -> Self {
        let (store_actor, repo) = store::in_memory(config.mailbox_size);
        let store_handle = tokio::spawn(store_actor.run());
        info!(?config, handlers = bus.handler_count(), "Starting run system");

        let orchestrator = Orchestrator::new(Arc::new(repo), Arc::new(catalog), bus, config);
        Self {
            orchestrator,
            store_handle,
        }
    }

    /// Gracefully shuts down the system.
    ///
    /// Run actors finish their queued commands first; the store stops once the
    /// last repository handle is gone, so every clone of the orchestrator must
    /// have been dropped by then.
    pub async fn shutdown(self) -> Result<(), FrameworkError> {
        info!("Shutting down system...");

        self.orchestrator.shutdown().await?;
        drop(self.orchestrator);

        if let Err(e) = self.store_handle.await {
            error!("Store task failed: {:?}", e);
            return Err(FrameworkError::TaskFailed(e.to_string()));
        }

        info!("System shutdown complete.");
        Ok(())
    }
}
