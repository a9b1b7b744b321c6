//! Shared data model used across all gleaner crates.

pub mod types;

pub use types::{
    CollectionReport, DedupKey, ParsingStats, Record, RunResult, ScrollMode, ScrollTier,
    SessionStatus, Target, TargetKind, TargetOutcome, TerminationReason, default_scroll_tiers,
};
