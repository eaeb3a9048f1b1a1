//! # Actor Registry
//!
//! Maps keys to live actors, spawning one the first time a key is addressed.
//! Commands for different keys run in parallel; commands for one key queue up
//! in that key's mailbox.

use crate::framework::{FrameworkError, KeyedActor, KeyedClient, KeyedHandler};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub(crate) struct Entry<H: KeyedHandler> {
    pub(crate) generation: u64,
    client: KeyedClient<H>,
    handle: JoinHandle<()>,
}

pub(crate) type ActorTable<H> = Arc<Mutex<HashMap<<H as KeyedHandler>::Key, Entry<H>>>>;

pub struct ActorRegistry<H: KeyedHandler> {
    handler: Arc<H>,
    mailbox_size: usize,
    table: ActorTable<H>,
    next_generation: Arc<AtomicU64>,
}

impl<H: KeyedHandler> Clone for ActorRegistry<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            mailbox_size: self.mailbox_size,
            table: Arc::clone(&self.table),
            next_generation: Arc::clone(&self.next_generation),
        }
    }
}

impl<H: KeyedHandler> ActorRegistry<H> {
    pub fn new(handler: Arc<H>, mailbox_size: usize) -> Self {
        Self {
            handler,
            mailbox_size: mailbox_size.max(1),
            table: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Routes `command` to the actor for `key`, spawning it if needed.
    ///
    /// If the actor retired between lookup and delivery the command goes to a
    /// freshly spawned one instead.
    pub async fn dispatch(&self, key: H::Key, command: H::Command) -> Result<H::Reply, H::Error> {
        let mut command = command;
        for _ in 0..2 {
            let client = self.client(key).await;
            match client.deliver(command).await {
                Ok(response) => {
                    return response.await.map_err(|_| FrameworkError::ActorDropped)?;
                }
                Err(returned) => {
                    debug!(%key, "Mailbox closed, respawning");
                    self.evict(&client).await;
                    command = returned;
                }
            }
        }
        Err(FrameworkError::ActorClosed.into())
    }

    /// Number of live actors.
    pub async fn active(&self) -> usize {
        self.table.lock().await.len()
    }

    /// Closes every mailbox and waits for the actors to drain and exit.
    pub async fn shutdown(&self) -> Result<(), FrameworkError> {
        let entries: Vec<Entry<H>> = {
            let mut table = self.table.lock().await;
            table.drain().map(|(_, entry)| entry).collect()
        };
        info!(actors = entries.len(), "Stopping keyed actors");

        let mut failure = None;
        for entry in entries {
            drop(entry.client);
            if let Err(e) = entry.handle.await {
                error!("Actor task failed: {:?}", e);
                failure = Some(FrameworkError::TaskFailed(e.to_string()));
            }
        }
        failure.map_or(Ok(()), Err)
    }

    async fn client(&self, key: H::Key) -> KeyedClient<H> {
        let mut table = self.table.lock().await;
        if let Some(entry) = table.get(&key) {
            return entry.client.clone();
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.mailbox_size);
        let client = KeyedClient::new(key, generation, sender);
        let actor = KeyedActor::new(
            key,
            generation,
            receiver,
            Arc::clone(&self.handler),
            Arc::clone(&self.table),
        );
        let handle = tokio::spawn(actor.run());
        table.insert(
            key,
            Entry {
                generation,
                client: client.clone(),
                handle,
            },
        );
        client
    }

    async fn evict(&self, client: &KeyedClient<H>) {
        let mut table = self.table.lock().await;
        if table
            .get(&client.key())
            .is_some_and(|entry| entry.generation == client.generation())
        {
            table.remove(&client.key());
        }
    }
}
