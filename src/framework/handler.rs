//! # KeyedHandler Trait
//!
//! The contract between the keyed actor runtime and the code that does the
//! work. One handler instance is shared by every actor; each actor calls it with
//! its own key and processes commands for that key strictly one at a time.

use crate::framework::FrameworkError;
use async_trait::async_trait;
use std::fmt::{Debug, Display};
use std::hash::Hash;

#[async_trait]
pub trait KeyedHandler: Send + Sync + 'static {
    /// Identifies the resource an actor serializes access to.
    type Key: Copy + Eq + Hash + Display + Debug + Send + Sync + 'static;

    type Command: Debug + Send + 'static;

    type Reply: Debug + Send + 'static;

    /// Must absorb framework failures so callers only ever see one error type.
    type Error: std::error::Error + From<FrameworkError> + Send + Sync + 'static;

    async fn handle(&self, key: Self::Key, command: Self::Command)
        -> Result<Self::Reply, Self::Error>;

    /// Whether the actor for this key may stop after sending `reply`.
    ///
    /// Commands still queued when it stops are processed before the task exits.
    fn is_final(&self, _reply: &Self::Reply) -> bool {
        false
    }

    /// Whether `key` has nothing left to serve, e.g. it finished earlier or
    /// never existed. Asked after a command fails; a retired key's actor stops
    /// the same way it does after a final reply.
    async fn is_retired(&self, _key: Self::Key) -> bool {
        false
    }
}
