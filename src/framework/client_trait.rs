//! # ActorClient Trait
//!
//! Gives resource-specific façades a traced `dispatch` on top of an
//! [`ActorRegistry`], so each façade only has to say which registry it uses.

use crate::framework::{ActorRegistry, KeyedHandler};
use async_trait::async_trait;

#[async_trait]
pub trait ActorClient<H: KeyedHandler>: Send + Sync {
    fn registry(&self) -> &ActorRegistry<H>;

    /// Sends a command to the actor owning `key`.
    #[tracing::instrument(skip(self, command))]
    async fn dispatch(&self, key: H::Key, command: H::Command) -> Result<H::Reply, H::Error> {
        tracing::debug!(?command, "Sending request");
        self.registry().dispatch(key, command).await
    }
}
