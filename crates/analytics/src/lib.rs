//! # Hindsight Analytics Engine
//!
//! This crate turns evaluated outcome records into win-rate statistics. It acts
//! as the "unbiased judge" of the signal generators.
//!
//! ## Architectural Principles
//!
//! - **Pure logic:** It has no knowledge of external systems and depends only on
//!   `core-types`.
//! - **Stateless Calculation:** The `StatisticsEngine` takes a slice of
//!   `OutcomeRecord`s and produces aggregates, groupings, rankings and
//!   recommendations. Nothing is cached between calls.
//!
//! ## Public API
//!
//! - `StatisticsEngine`: the calculation logic.
//! - `AggregateStats`, `TopPerformers`, `Recommendation`, `StatisticsReport`: the outputs.
//! - `StatsDimension`: the grouping axes.
//! - `AnalyticsError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod engine;
pub mod error;
pub mod report;

// Re-export the key components to create a clean, public-facing API.
pub use engine::StatisticsEngine;
pub use error::AnalyticsError;
pub use report::{
    AggregateStats, Recommendation, Severity, StatisticsReport, StatsDimension, SymbolStats,
    TopPerformers, UNKNOWN_GROUP,
};
