//! Keyed actor runtime.
//!
//! One actor per key, spawned on demand, processing that key's commands one at
//! a time. Different keys proceed in parallel.
//!
//! # Main Components
//!
//! - [`KeyedHandler`] - The work done for each command, shared by all actors
//! - [`KeyedActor`] - The per-key task draining a mailbox
//! - [`KeyedClient`] - Sending half of one actor's mailbox
//! - [`ActorRegistry`] - Spawns, finds and retires actors by key
//! - [`ActorClient`] - Traced dispatch for façades built on a registry
//! - [`FrameworkError`] - Plumbing failures

pub mod actor;
pub mod client;
pub mod client_trait;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;

pub use actor::KeyedActor;
pub use client::KeyedClient;
pub use client_trait::ActorClient;
pub use error::FrameworkError;
pub use handler::KeyedHandler;
pub use message::{KeyedRequest, Response};
pub use registry::ActorRegistry;
