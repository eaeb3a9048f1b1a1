//! Runtime wiring and shutdown.
//!
//! - [`RunSystem`] - Starts the store actor and the orchestrator, and stops them
//!   in order
//! - [`setup_tracing`] - Initializes the tracing/logging infrastructure

pub mod system;
pub mod tracing;

pub use self::system::*;
pub use self::tracing::*;
