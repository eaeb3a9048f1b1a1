//! # Mailbox Messages
//!
//! What travels from a [`KeyedClient`](crate::framework::KeyedClient) to its
//! [`KeyedActor`](crate::framework::KeyedActor): the command and a one-shot
//! channel for the reply.

use crate::framework::KeyedHandler;
use tokio::sync::oneshot;

/// Type alias for the one-shot response channel used by actors.
pub type Response<H> = oneshot::Sender<
    Result<<H as KeyedHandler>::Reply, <H as KeyedHandler>::Error>,
>;

#[derive(Debug)]
pub struct KeyedRequest<H: KeyedHandler> {
    pub command: H::Command,
    pub respond_to: Response<H>,
}
