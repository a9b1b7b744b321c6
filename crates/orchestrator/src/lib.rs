//! Multi-session run orchestration.
//!
//! One run partitions the configured targets across browser sessions, runs
//! an independent collector per session, isolates per-partition failures,
//! and merges the results into one globally deduplicated record set.

pub mod partition;
pub mod progress;
pub mod run;

pub use {
    partition::partition,
    run::{Orchestrator, OrchestratorError},
};
