//! # Keyed Client
//!
//! The sending half of one keyed actor. Cheap to clone; holds only the mailbox
//! sender and the key it talks to.

use crate::framework::{FrameworkError, KeyedHandler, KeyedRequest};
use tokio::sync::{mpsc, oneshot};

pub struct KeyedClient<H: KeyedHandler> {
    key: H::Key,
    generation: u64,
    sender: mpsc::Sender<KeyedRequest<H>>,
}

impl<H: KeyedHandler> Clone for KeyedClient<H> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            generation: self.generation,
            sender: self.sender.clone(),
        }
    }
}

impl<H: KeyedHandler> KeyedClient<H> {
    pub(crate) fn new(key: H::Key, generation: u64, sender: mpsc::Sender<KeyedRequest<H>>) -> Self {
        Self {
            key,
            generation,
            sender,
        }
    }

    pub fn key(&self) -> H::Key {
        self.key
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Sends `command` and waits for the reply.
    pub async fn send(&self, command: H::Command) -> Result<H::Reply, H::Error> {
        let response = self
            .deliver(command)
            .await
            .map_err(|_| FrameworkError::ActorClosed)?;
        response.await.map_err(|_| FrameworkError::ActorDropped)?
    }

    /// Queues `command`, handing it back if the actor has stopped accepting
    /// work so the caller can route it elsewhere.
    pub(crate) async fn deliver(
        &self,
        command: H::Command,
    ) -> Result<oneshot::Receiver<Result<H::Reply, H::Error>>, H::Command> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(KeyedRequest {
                command,
                respond_to,
            })
            .await
            .map_err(|rejected| rejected.0.command)?;
        Ok(response)
    }
}
