//! Incremental feed collection: one collector per browser session, driving
//! an adaptive scroll loop that extracts, deduplicates, and checkpoints
//! records until a target limit, attempt budget, or stagnation stops it.

pub mod checkpoint;
pub mod collector;
pub mod dedup;
pub mod extract;
pub mod state;

pub use {
    checkpoint::CheckpointWriter,
    collector::{CollectorOutcome, CountersSnapshot, IncrementalCollector, LiveCounters},
    dedup::{DedupIndex, content_hash, normalize_text, stable_id_from_permalink},
    extract::{ContentExtractor, ExtractError, FeedExtractor, RawCandidate},
    state::{ScrollPlan, ScrollState},
};
