//! Core data model: targets, records, reports, and the scroll tier table.

use std::{collections::BTreeMap, fmt, time::Duration};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// What a harvesting target identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// A user/account feed.
    User,
    /// A keyword search feed.
    Keyword,
    /// A keyword search scoped to one user.
    UserKeyword,
}

/// One harvesting target, assigned to exactly one collector for one run.
///
/// Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub kind: TargetKind,
    /// The user handle or the keyword, depending on `kind`.
    pub identifier: String,
    /// The keyword for `UserKeyword` targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier2: Option<String>,
}

impl Target {
    #[must_use]
    pub fn user(handle: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::User,
            identifier: handle.into(),
            identifier2: None,
        }
    }

    #[must_use]
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Keyword,
            identifier: keyword.into(),
            identifier2: None,
        }
    }

    #[must_use]
    pub fn user_keyword(handle: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::UserKeyword,
            identifier: handle.into(),
            identifier2: Some(keyword.into()),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TargetKind::User => write!(f, "@{}", self.identifier),
            TargetKind::Keyword => write!(f, "\"{}\"", self.identifier),
            TargetKind::UserKeyword => write!(
                f,
                "@{} \"{}\"",
                self.identifier,
                self.identifier2.as_deref().unwrap_or_default()
            ),
        }
    }
}

/// Lifecycle state of a pooled browser session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Starting,
    Ready,
    Unhealthy,
    Stopped,
}

/// Key under which a record is deduplicated.
///
/// A stable id parsed from a permalink wins; the hash of normalized text is
/// the fallback for records without one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Stable(String),
    Content(String),
}

/// One harvested item, already normalized by the content extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Id derived from a permalink-shaped field, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_id: Option<String>,
    /// Hash of the normalized text; dedup fallback when `stable_id` is absent.
    pub content_hash: String,
    /// Extracted fields (text, links, author, engagement counts, ...).
    pub fields: BTreeMap<String, serde_json::Value>,
    pub collected_at: DateTime<Utc>,
    pub source_target: Target,
}

impl Record {
    /// The key this record deduplicates under.
    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        match &self.stable_id {
            Some(id) => DedupKey::Stable(id.clone()),
            None => DedupKey::Content(self.content_hash.clone()),
        }
    }
}

/// Why a collector (or one of its targets) stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    /// The per-target record count was reached.
    TargetReached,
    /// The scroll attempt budget ran out.
    AttemptsExhausted,
    /// Stagnation persisted through the refresh budget.
    Stagnated,
    /// A run-level cancellation was observed.
    Cancelled,
    /// An unrecoverable session error.
    Failed,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TargetReached => "target-reached",
            Self::AttemptsExhausted => "attempts-exhausted",
            Self::Stagnated => "stagnated",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Loop counters for one collector, mirrored into checkpoints and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsingStats {
    pub scrolls: u64,
    pub parsed: u64,
    pub duplicates_skipped: u64,
    pub errors: u64,
}

/// Outcome of harvesting a single target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub target: Target,
    pub records_collected: u64,
    pub scroll_attempts: u64,
    pub reason: TerminationReason,
}

/// Produced once per collector on completion, consumed by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionReport {
    pub session_id: String,
    pub targets_assigned: usize,
    pub records_collected: u64,
    pub scroll_attempts: u64,
    pub termination_reason: TerminationReason,
    pub stats: ParsingStats,
    pub per_target: Vec<TargetOutcome>,
    pub errors: Vec<String>,
}

impl CollectionReport {
    /// A report for a partition whose collector never got off the ground.
    #[must_use]
    pub fn failed(session_id: impl Into<String>, targets_assigned: usize, error: String) -> Self {
        Self {
            session_id: session_id.into(),
            targets_assigned,
            records_collected: 0,
            scroll_attempts: 0,
            termination_reason: TerminationReason::Failed,
            stats: ParsingStats::default(),
            per_target: Vec::new(),
            errors: vec![error],
        }
    }

    /// Harvest efficiency: records emitted per scroll or reload issued.
    #[must_use]
    pub fn records_per_scroll(&self) -> f64 {
        if self.scroll_attempts == 0 {
            0.0
        } else {
            self.records_collected as f64 / self.scroll_attempts as f64
        }
    }
}

/// Aggregate of all collection reports plus the globally deduplicated record
/// set. Lives only for the duration of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub reports: Vec<CollectionReport>,
    pub records: Vec<Record>,
    /// Records dropped by the run-level merge because two sessions observed
    /// the same item.
    pub cross_session_duplicates: u64,
}

impl RunResult {
    #[must_use]
    pub fn total_collected(&self) -> u64 {
        self.reports.iter().map(|r| r.records_collected).sum()
    }

    #[must_use]
    pub fn failed_partitions(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.termination_reason == TerminationReason::Failed)
            .count()
    }
}

/// Escalation mode for one scroll tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollMode {
    Normal,
    Aggressive,
    SuperAggressive,
    Refresh,
}

impl fmt::Display for ScrollMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Normal => "normal",
            Self::Aggressive => "aggressive",
            Self::SuperAggressive => "super-aggressive",
            Self::Refresh => "refresh",
        };
        f.write_str(s)
    }
}

/// One row of the stagnation tier table.
///
/// A tier applies when `stagnant_rounds >= min_stagnant_rounds`; the highest
/// applicable row wins. Multipliers scale the collector's base scroll
/// distance and base wait time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollTier {
    pub min_stagnant_rounds: u32,
    pub mode: ScrollMode,
    pub distance_multiplier: f64,
    pub wait_multiplier: f64,
}

impl ScrollTier {
    /// Scale a base wait by this tier's wait multiplier.
    ///
    /// The multiplier is clamped to non-negative so a hand-built tier table
    /// cannot panic the loop; `max` also maps NaN to zero.
    #[must_use]
    pub fn scaled_wait(&self, base: Duration) -> Duration {
        base.mul_f64(self.wait_multiplier.max(0.0))
    }

    /// Scale a base scroll distance by this tier's distance multiplier.
    #[must_use]
    pub fn scaled_distance(&self, base: i64) -> i64 {
        (base as f64 * self.distance_multiplier.max(0.0)).round() as i64
    }
}

/// The default tier table:
///
/// | stagnant rounds | mode             | distance | wait |
/// |-----------------|------------------|----------|------|
/// | 0–2             | normal           | 1x       | 1x   |
/// | 3–5             | aggressive       | 2x       | 0.7x |
/// | 6–7             | super-aggressive | 3x       | 0.5x |
/// | >=8             | refresh          | —        | —    |
#[must_use]
pub fn default_scroll_tiers() -> Vec<ScrollTier> {
    vec![
        ScrollTier {
            min_stagnant_rounds: 0,
            mode: ScrollMode::Normal,
            distance_multiplier: 1.0,
            wait_multiplier: 1.0,
        },
        ScrollTier {
            min_stagnant_rounds: 3,
            mode: ScrollMode::Aggressive,
            distance_multiplier: 2.0,
            wait_multiplier: 0.7,
        },
        ScrollTier {
            min_stagnant_rounds: 6,
            mode: ScrollMode::SuperAggressive,
            distance_multiplier: 3.0,
            wait_multiplier: 0.5,
        },
        ScrollTier {
            min_stagnant_rounds: 8,
            mode: ScrollMode::Refresh,
            distance_multiplier: 0.0,
            wait_multiplier: 0.0,
        },
    ]
}
