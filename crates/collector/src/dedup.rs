//! Record deduplication.
//!
//! Every record deduplicates under one key: a stable id parsed from a
//! permalink-shaped link when one exists, otherwise a hash of the
//! normalized text. The index only ever grows during a target's harvest.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use gleaner_common::{DedupKey, Record};

/// Membership set of everything a collector has already seen.
#[derive(Debug, Default)]
pub struct DedupIndex {
    seen: HashSet<DedupKey>,
}

impl DedupIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a key was seen. Returns `true` when it was new.
    pub fn insert(&mut self, key: DedupKey) -> bool {
        self.seen.insert(key)
    }

    /// Whether a record would be considered a duplicate.
    #[must_use]
    pub fn contains(&self, record: &Record) -> bool {
        self.seen.contains(&record.dedup_key())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Parse a stable item id out of a permalink-shaped href.
///
/// Feed permalinks look like `/<handle>/status/<digits>`; the digits are the
/// item's canonical id and survive re-rendering, truncation, and edits.
#[must_use]
pub fn stable_id_from_permalink(href: &str) -> Option<String> {
    let (_, rest) = href.split_once("/status/")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    Some(digits)
}

/// Normalize text for content hashing: lowercase, trim, and collapse
/// whitespace runs.
///
/// Feed markup pads text with newlines and nbsp-style spacing that differ
/// between renders of the same item.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hex-encoded SHA-256 of the normalized text.
#[must_use]
pub fn content_hash(text: &str) -> String {
    let normalized = normalize_text(text);
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)
}
