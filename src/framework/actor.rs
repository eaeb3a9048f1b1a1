//! # Keyed Actor
//!
//! The server half: one Tokio task per key, draining its mailbox sequentially.
//! Because a key's commands all flow through one task, the handler never sees
//! two commands for the same key at once, and needs no locks of its own.
//!
//! When the handler marks a reply as final, or reports the key as retired after
//! a failure, the actor removes itself from the registry, closes its mailbox,
//! finishes whatever was already queued and exits. A later command for the same
//! key spawns a fresh actor.

use crate::framework::registry::ActorTable;
use crate::framework::{KeyedHandler, KeyedRequest};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct KeyedActor<H: KeyedHandler> {
    key: H::Key,
    generation: u64,
    receiver: mpsc::Receiver<KeyedRequest<H>>,
    handler: Arc<H>,
    table: ActorTable<H>,
    handled: u64,
}

impl<H: KeyedHandler> KeyedActor<H> {
    pub(crate) fn new(
        key: H::Key,
        generation: u64,
        receiver: mpsc::Receiver<KeyedRequest<H>>,
        handler: Arc<H>,
        table: ActorTable<H>,
    ) -> Self {
        Self {
            key,
            generation,
            receiver,
            handler,
            table,
            handled: 0,
        }
    }

    /// Runs the event loop until the mailbox closes or the key is retired.
    pub async fn run(mut self) {
        info!(key = %self.key, "Actor started");

        while let Some(request) = self.receiver.recv().await {
            if self.process(request).await {
                self.drain().await;
                break;
            }
        }

        info!(key = %self.key, handled = self.handled, "Actor stopped");
    }

    /// Handles one request; returns whether the key is finished.
    ///
    /// A finished actor leaves the registry before replying, so by the time the
    /// caller sees the reply the next command for the key spawns a fresh actor.
    async fn process(&mut self, request: KeyedRequest<H>) -> bool {
        debug!(key = %self.key, command = ?request.command, "Command");
        let result = self.handler.handle(self.key, request.command).await;
        self.handled += 1;

        let finished = match &result {
            Ok(reply) => {
                debug!(key = %self.key, ?reply, "Command ok");
                self.handler.is_final(reply)
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Command failed");
                self.handler.is_retired(self.key).await
            }
        };
        if finished {
            self.unregister().await;
        }
        let _ = request.respond_to.send(result);
        finished
    }

    async fn unregister(&mut self) {
        let mut table = self.table.lock().await;
        if table
            .get(&self.key)
            .is_some_and(|entry| entry.generation == self.generation)
        {
            table.remove(&self.key);
        }
        self.receiver.close();
    }

    /// Finishes commands that were queued before the mailbox closed.
    async fn drain(&mut self) {
        while let Some(request) = self.receiver.recv().await {
            self.process(request).await;
        }
        info!(key = %self.key, "Actor retired");
    }
}
