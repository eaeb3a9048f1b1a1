//! # Group Run
//!
//! > **Coordinated bulk buying, one shopping trip at a time.**
//!
//! A leader plans a trip to a store, group members bid quantities on products,
//! the leader shops and records what was actually bought, and the goods are
//! reconciled against the bids and handed out. This crate is the engine behind
//! that flow: a lifecycle state machine plus the bid aggregation, adjustment and
//! proportional distribution logic that keeps quantities and money consistent
//! when purchases fall short of, or exceed, what was asked for.
//!
//! ## 🏗️ Design
//!
//! ### One actor per run
//! Every state-mutating operation is routed to a Tokio task owning that run
//! (see [`framework`]). Commands for one run are processed one at a time;
//! different runs proceed in parallel. Actors are spawned on first use and
//! retired when their run completes or is cancelled.
//!
//! ### All-or-nothing writes
//! A command works on a copy of the [`RunAggregate`](model::RunAggregate) and
//! commits it through the [`RunRepository`](store::RunRepository) port with a
//! compare-and-swap on version and state. A failing command leaves nothing
//! behind, and events are only emitted after a successful commit.
//!
//! ### Exact amounts
//! Quantities and prices are fixed-point ([`Quantity`](model::Quantity),
//! [`Money`](model::Money)), so "distributed total equals purchased" holds to the
//! last hundredth.
//!
//! ### Type-safe errors
//! Every operation returns [`RunError`], whose variants callers can match on
//! (not found, forbidden, invalid transition, validation, adjustment conflict,
//! terminal run, ...).
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The rules
//! - [`state_machine`] - Which state moves are legal.
//! - [`ledger`] - Bids and per-product totals.
//! - [`shopping_list`] - Purchase targets from committed totals.
//! - [`adjustment`] - Shrink/grow rules while reconciling.
//! - [`distribution`] - Who gets what, and the per-user view.
//!
//! ### 2. The orchestration ([`orchestrator`])
//! [`Orchestrator`](orchestrator::Orchestrator) is the public API; each call
//! becomes a [`RunCommand`](orchestrator::RunCommand) handled by the
//! [`RunEngine`](orchestrator::RunEngine) inside the run's actor.
//!
//! ### 3. The ports
//! - [`store`] - Persistence, with an actor-backed in-memory implementation.
//! - [`catalog`] - Group membership and display names.
//! - [`events`] - Fire-and-forget notifications.
//!
//! ### 4. The runtime ([`lifecycle`], [`framework`], [`config`])
//! [`RunSystem`](lifecycle::RunSystem) wires everything together and shuts it
//! down in order; [`setup_tracing`](lifecycle::setup_tracing) installs logging.
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! # Run the demo with info logs
//! RUST_LOG=info cargo run
//!
//! # Run the tests
//! cargo test
//! ```

pub mod adjustment;
pub mod catalog;
pub mod config;
pub mod distribution;
pub mod error;
pub mod events;
pub mod framework;
pub mod ledger;
pub mod lifecycle;
pub mod model;
pub mod orchestrator;
pub mod shopping_list;
pub mod state_machine;
pub mod store;

pub use error::RunError;
