//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter filtered
//! by `RUST_LOG`. The crate/module prefix is hidden (`with_target(false)`); log
//! lines carry structured fields such as `run_id`, `key` and `state` instead.
//!
//! ## What Gets Traced
//!
//! - **Actor lifecycle**: run actors and the store actor starting, retiring and
//!   shutting down
//! - **Commands**: every orchestrator call opens a span with its arguments;
//!   failures are logged at `warn` with the error
//! - **State changes**: one `info` line per transition with `from` and `to`
//! - **Events**: handler failures and panics, at `warn`
//!
//! ## Usage Examples
//!
//! ```bash
//! # Compact logs
//! RUST_LOG=info cargo run
//!
//! # Commands and replies with full payloads
//! RUST_LOG=debug cargo run
//!
//! # Only the engine, verbose
//! RUST_LOG=group_run::orchestrator=debug cargo run
//! ```
//!
//! With `RUST_LOG=info` a run moving to shopping looks like this; the first
//! state line comes from the run actor, the second from the logging event
//! handler once the change is committed:
//!
//! ```text
//! INFO Actor started key=run_1
//! INFO Shopping list generated run_id=run_1 items=2
//! INFO Run state changed run_id=run_1 from=confirmed to=shopping
//! INFO Run state changed run_id=run_1 store="Costco" from=confirmed to=shopping
//! ```
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false) // Structured fields identify the source
        .compact() // Compact format shows spans inline
        .init();
}
