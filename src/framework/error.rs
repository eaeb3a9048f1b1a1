//! # Framework Errors
//!
//! Failures of the actor plumbing itself, independent of what the actors do.
//! Handler errors convert from these through `From<FrameworkError>`, so callers
//! see a single error type per handler.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FrameworkError {
    #[error("Actor closed")]
    ActorClosed,
    #[error("Actor dropped response channel")]
    ActorDropped,
    #[error("Actor task failed: {0}")]
    TaskFailed(String),
}
