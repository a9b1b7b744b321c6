//! Config schema types (session pool, collector loop, run shape, targets).

use std::path::PathBuf;

use {
    gleaner_common::{ScrollTier, Target, default_scroll_tiers},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GleanerConfig {
    pub session: SessionConfig,
    pub collector: CollectorConfig,
    pub run: RunConfig,
    pub targets: Vec<TargetEntry>,
}

/// Session pool and managed browser-automation app settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Base URL of the managed app's local HTTP API.
    pub api_url: String,
    /// Browser profile ids usable for sessions; one session per profile.
    pub profile_ids: Vec<String>,
    /// Bounded retries when starting a profile.
    pub start_retries: u32,
    /// Delay before the first retry.
    pub retry_short_delay_ms: u64,
    /// Delay before subsequent retries.
    pub retry_long_delay_ms: u64,
    /// How long to poll for a started browser to report active.
    pub ready_timeout_secs: u64,
    /// Timeout applied to every browser control round-trip.
    pub control_timeout_ms: u64,
    /// Process name substring identifying the managed app and its workers.
    pub managed_process_name: String,
    /// Command used to relaunch the managed app when it is not running.
    pub launch_command: Option<String>,
    /// CPU usage above this is reported as a resource violation.
    pub cpu_limit_percent: f32,
    /// Memory usage above this is reported as a resource violation.
    pub mem_limit_percent: f32,
    /// Free disk below this is reported as a resource violation.
    pub min_disk_free_gb: f64,
    /// A worker process above this CPU share is considered runaway.
    pub runaway_cpu_percent: f32,
    /// Grace period between graceful terminate and force kill.
    pub kill_grace_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:50325".into(),
            profile_ids: Vec::new(),
            start_retries: 3,
            retry_short_delay_ms: 1_000,
            retry_long_delay_ms: 5_000,
            ready_timeout_secs: 30,
            control_timeout_ms: 15_000,
            managed_process_name: "adspower".into(),
            launch_command: None,
            cpu_limit_percent: 85.0,
            mem_limit_percent: 85.0,
            min_disk_free_gb: 2.0,
            runaway_cpu_percent: 50.0,
            kill_grace_ms: 1_500,
        }
    }
}

/// Incremental collector loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Stop harvesting a target once this many records were emitted for it.
    pub per_target_limit: u32,
    /// Hard bound on scroll/reload actions per target.
    pub max_scroll_attempts: u32,
    /// Flush a checkpoint every this many emitted records.
    pub checkpoint_interval: usize,
    /// Directory for per-collector checkpoint files.
    pub checkpoint_dir: PathBuf,
    /// Scroll distance at the normal tier, in pixels.
    pub base_scroll_distance: i64,
    /// Wait after a scroll at the normal tier.
    pub base_wait_ms: u64,
    /// Page reloads allowed per target before giving up on stagnation.
    pub max_refreshes: u32,
    /// CSS selector matching one feed item. Opaque to the core loop.
    pub item_selector: String,
    /// Feed site base URL targets are resolved against.
    pub base_url: String,
    /// Stagnation tier table; defaults to the built-in escalation ladder.
    pub tiers: Vec<ScrollTier>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            per_target_limit: 30,
            max_scroll_attempts: 60,
            checkpoint_interval: 10,
            checkpoint_dir: PathBuf::from("checkpoints"),
            base_scroll_distance: 800,
            base_wait_ms: 1_500,
            max_refreshes: 2,
            item_selector: "article".into(),
            base_url: "https://x.com".into(),
            tiers: default_scroll_tiers(),
        }
    }
}

/// Run shape: how many sessions and how progress is surfaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Desired concurrent sessions. Silently clamped to the number of
    /// profiles and targets available.
    pub session_count: usize,
    /// Interval between aggregate progress log lines.
    pub progress_interval_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            session_count: 2,
            progress_interval_secs: 5,
        }
    }
}

/// One configured harvesting target.
///
/// `user` alone targets an account feed, `keyword` alone a search feed, and
/// both together a search scoped to the account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetEntry {
    pub user: Option<String>,
    pub keyword: Option<String>,
}

impl TargetEntry {
    /// Resolve into a [`Target`], or `None` when both fields are empty.
    #[must_use]
    pub fn to_target(&self) -> Option<Target> {
        let user = self.user.as_deref().filter(|s| !s.is_empty());
        let keyword = self.keyword.as_deref().filter(|s| !s.is_empty());
        match (user, keyword) {
            (Some(u), Some(k)) => Some(Target::user_keyword(u, k)),
            (Some(u), None) => Some(Target::user(u)),
            (None, Some(k)) => Some(Target::keyword(k)),
            (None, None) => None,
        }
    }
}

impl GleanerConfig {
    /// All valid targets, in config order.
    #[must_use]
    pub fn resolved_targets(&self) -> Vec<Target> {
        self.targets.iter().filter_map(TargetEntry::to_target).collect()
    }
}
