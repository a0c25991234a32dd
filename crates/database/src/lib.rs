//! # Hindsight Database Crate
//!
//! This crate is the system's "permanent archive" for signal outcomes and for
//! the scheduling bookkeeping that lets the engine survive a restart.
//!
//! ## Architectural Principles
//!
//! - **Trait seams:** The engine and the aggregator only see `OutcomeStore`,
//!   `CheckStore`, `FallbackQueue` and `PersistenceSink`. Postgres and the
//!   in-memory store are interchangeable behind them.
//! - **Idempotent writes:** Outcomes are upserted on `(signal_id, check_interval)`;
//!   re-inserting a known signal is a no-op.
//! - **Degraded mode:** `FailoverSink` diverts records to an append-only JSON lines
//!   file when the primary store errors or times out.
//!
//! ## Public API
//!
//! - `connect` / `run_migrations`: pool creation and embedded schema migrations.
//! - `DbRepository`: the Postgres implementation of both store traits.
//! - `InMemoryStore`: a process-local implementation for tests and dry runs.
//! - `FileFallbackQueue`, `FailoverSink`: the degraded persistence path.
//! - `DbError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod fallback;
pub mod memory;
pub mod repository;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use fallback::{FailoverSink, FileFallbackQueue};
pub use memory::InMemoryStore;
pub use repository::DbRepository;
pub use store::{
    CheckStore, FallbackQueue, OutcomeFilter, OutcomeStore, PersistedTo, PersistenceSink,
};
