//! The incremental collection loop.
//!
//! One collector drives one browser session through its assigned targets:
//! navigate, parse what is visible, scroll, wait, parse again. Rounds that
//! yield nothing new escalate through the tier table until the page is
//! refreshed or the target is written off as stagnated.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    chrono::Utc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
    url::Url,
};

use {
    crate::{
        checkpoint::CheckpointWriter,
        dedup::{self, DedupIndex},
        extract::{ContentExtractor, RawCandidate},
        state::ScrollState,
    },
    gleaner_common::{
        CollectionReport, ParsingStats, Record, ScrollMode, Target, TargetKind, TargetOutcome,
        TerminationReason,
    },
    gleaner_config::CollectorConfig,
    gleaner_session::{BrowserControl, NodeHandle, SessionError},
};

/// Shared counters a progress reporter can poll while collectors run.
#[derive(Debug, Default)]
pub struct LiveCounters {
    pub records: AtomicU64,
    pub scrolls: AtomicU64,
    pub duplicates: AtomicU64,
    pub errors: AtomicU64,
}

/// Point-in-time copy of [`LiveCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub records: u64,
    pub scrolls: u64,
    pub duplicates: u64,
    pub errors: u64,
}

impl LiveCounters {
    #[must_use]
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            records: self.records.load(Ordering::Relaxed),
            scrolls: self.scrolls.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Everything a finished collector hands back to the orchestrator.
#[derive(Debug)]
pub struct CollectorOutcome {
    pub report: CollectionReport,
    pub records: Vec<Record>,
}

/// Harvests a partition of targets through one browser session.
pub struct IncrementalCollector<E> {
    session_id: String,
    control: Arc<dyn BrowserControl>,
    cfg: CollectorConfig,
    extractor: E,
    counters: Arc<LiveCounters>,
    cancel: CancellationToken,
}

impl<E: ContentExtractor> IncrementalCollector<E> {
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        control: Arc<dyn BrowserControl>,
        cfg: CollectorConfig,
        extractor: E,
        counters: Arc<LiveCounters>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            control,
            cfg,
            extractor,
            counters,
            cancel,
        }
    }

    /// Harvest all assigned targets in order.
    ///
    /// Always produces a report: target-level failures are recorded and the
    /// next target proceeds; only a lost session aborts the remainder.
    pub async fn run(self, targets: Vec<Target>) -> CollectorOutcome {
        let targets_assigned = targets.len();
        let mut records = Vec::new();
        let mut per_target = Vec::new();
        let mut stats = ParsingStats::default();
        let mut errors = Vec::new();
        let mut index = DedupIndex::new();
        let mut fatal = false;

        let mut checkpoint = match CheckpointWriter::create(
            &self.cfg.checkpoint_dir,
            &self.session_id,
            self.cfg.checkpoint_interval,
        ) {
            Ok(writer) => Some(writer),
            Err(e) => {
                warn!(session_id = self.session_id, error = %e, "checkpointing disabled");
                errors.push(format!("checkpointing disabled: {e}"));
                None
            },
        };

        for target in targets {
            if self.cancel.is_cancelled() {
                per_target.push(TargetOutcome {
                    target,
                    records_collected: 0,
                    scroll_attempts: 0,
                    reason: TerminationReason::Cancelled,
                });
                continue;
            }

            match self
                .harvest_target(
                    &target,
                    &mut index,
                    &mut checkpoint,
                    &mut stats,
                    &mut records,
                    &mut errors,
                )
                .await
            {
                Ok(outcome) => {
                    info!(
                        session_id = self.session_id,
                        target = %outcome.target,
                        records = outcome.records_collected,
                        attempts = outcome.scroll_attempts,
                        reason = %outcome.reason,
                        "target finished"
                    );
                    per_target.push(outcome);
                },
                Err(e) => {
                    warn!(
                        session_id = self.session_id,
                        target = %target,
                        error = %e,
                        "session lost, aborting remaining targets"
                    );
                    errors.push(format!("{target}: {e}"));
                    per_target.push(TargetOutcome {
                        target,
                        records_collected: 0,
                        scroll_attempts: 0,
                        reason: TerminationReason::Failed,
                    });
                    fatal = true;
                    break;
                },
            }
        }

        if let Some(writer) = checkpoint.as_mut()
            && let Err(e) = writer.flush(&stats)
        {
            warn!(session_id = self.session_id, error = %e, "final checkpoint flush failed");
            errors.push(format!("final checkpoint flush failed: {e}"));
        }

        let termination_reason = if fatal {
            TerminationReason::Failed
        } else if self.cancel.is_cancelled() {
            TerminationReason::Cancelled
        } else {
            TerminationReason::TargetReached
        };

        let report = CollectionReport {
            session_id: self.session_id.clone(),
            targets_assigned,
            records_collected: records.len() as u64,
            scroll_attempts: stats.scrolls,
            termination_reason,
            stats,
            per_target,
            errors,
        };
        CollectorOutcome { report, records }
    }

    /// Run the scroll loop for one target.
    ///
    /// `Err` means the session itself is gone; any error the loop can absorb
    /// ends up in the outcome instead.
    async fn harvest_target(
        &self,
        target: &Target,
        index: &mut DedupIndex,
        checkpoint: &mut Option<CheckpointWriter>,
        stats: &mut ParsingStats,
        records: &mut Vec<Record>,
        errors: &mut Vec<String>,
    ) -> Result<TargetOutcome, SessionError> {
        let limit = u64::from(self.cfg.per_target_limit);
        let outcome = |collected, attempts: u32, reason| TargetOutcome {
            target: target.clone(),
            records_collected: collected,
            scroll_attempts: u64::from(attempts),
            reason,
        };

        if limit == 0 {
            return Ok(outcome(0, 0, TerminationReason::TargetReached));
        }
        if self.cfg.max_scroll_attempts == 0 {
            return Ok(outcome(0, 0, TerminationReason::AttemptsExhausted));
        }

        let Some(url) = target_url(&self.cfg.base_url, target) else {
            errors.push(format!("{target}: invalid base url {}", self.cfg.base_url));
            return Ok(outcome(0, 0, TerminationReason::Failed));
        };

        if let Err(e) = self.navigate_with_retry(&url).await {
            if !e.is_transient() {
                return Err(e);
            }
            errors.push(format!("{target}: navigation failed: {e}"));
            stats.errors += 1;
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            return Ok(outcome(0, 0, TerminationReason::Failed));
        }

        let base_wait = Duration::from_millis(self.cfg.base_wait_ms);
        let mut state = ScrollState::new(self.cfg.tiers.clone());
        let mut collected = 0u64;

        // Let the initial render settle before the first scan.
        self.wait(base_wait).await;

        // Each iteration: scan and emit what is visible, account for
        // stagnation, then act (scroll or reload) and wait. Termination is
        // checked after the action, so the limit can be overshot by one
        // round's worth of records.
        let reason = loop {
            if self.cancel.is_cancelled() {
                break TerminationReason::Cancelled;
            }

            let new = self
                .parse_round(target, index, checkpoint, stats, records)
                .await?;
            collected += new;
            if new > 0 {
                state.record_progress();
            } else {
                state.record_stagnant();
            }

            if self.cancel.is_cancelled() {
                break TerminationReason::Cancelled;
            }

            let plan = state.plan(self.cfg.base_scroll_distance, base_wait);
            if plan.mode == ScrollMode::Refresh {
                if state.refreshes_used >= self.cfg.max_refreshes {
                    break TerminationReason::Stagnated;
                }
                info!(
                    session_id = self.session_id,
                    target = %target,
                    stagnant_rounds = state.stagnant_rounds,
                    "stagnated through every tier, refreshing page"
                );
                state.attempts += 1;
                stats.scrolls += 1;
                self.counters.scrolls.fetch_add(1, Ordering::Relaxed);
                match self.control.reload().await {
                    Ok(()) => state.record_refresh(),
                    Err(e) if e.is_transient() => {
                        stats.errors += 1;
                        self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    },
                    Err(e) => return Err(e),
                }
            } else {
                debug!(
                    target = %target,
                    mode = %plan.mode,
                    distance = plan.distance,
                    stagnant_rounds = state.stagnant_rounds,
                    "scrolling"
                );
                state.attempts += 1;
                stats.scrolls += 1;
                self.counters.scrolls.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self.scroll_with_retry(plan.distance).await {
                    if !e.is_transient() {
                        return Err(e);
                    }
                    stats.errors += 1;
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                }
            }

            self.wait(plan.wait).await;

            if collected >= limit {
                break TerminationReason::TargetReached;
            }
            if state.attempts >= self.cfg.max_scroll_attempts {
                break TerminationReason::AttemptsExhausted;
            }
        };

        Ok(outcome(collected, state.attempts, reason))
    }

    /// Query visible items, extract, dedupe, and emit.
    ///
    /// Returns how many new records were emitted this round. A query that
    /// fails transiently twice counts as an empty (stagnant) round.
    async fn parse_round(
        &self,
        target: &Target,
        index: &mut DedupIndex,
        checkpoint: &mut Option<CheckpointWriter>,
        stats: &mut ParsingStats,
        records: &mut Vec<Record>,
    ) -> Result<u64, SessionError> {
        let Some(nodes) = self.query_with_retry().await? else {
            stats.errors += 1;
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            return Ok(0);
        };

        let mut new = 0u64;
        for node in &nodes {
            let candidate = match self.extractor.extract(node) {
                Ok(candidate) => candidate,
                Err(e) => {
                    debug!(node_ref = node.node_ref, error = %e, "skipping unparseable node");
                    stats.errors += 1;
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    continue;
                },
            };
            stats.parsed += 1;

            let record = build_record(candidate, target);
            if !index.insert(record.dedup_key()) {
                stats.duplicates_skipped += 1;
                self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            new += 1;
            self.counters.records.fetch_add(1, Ordering::Relaxed);
            if let Some(writer) = checkpoint.as_mut() {
                let snapshot = *stats;
                if let Err(e) = writer.push(record.clone(), &snapshot) {
                    warn!(error = %e, "checkpoint write failed");
                }
            }
            records.push(record);
        }
        Ok(new)
    }

    async fn navigate_with_retry(&self, url: &str) -> Result<(), SessionError> {
        match self.control.navigate(url).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transient() => {
                warn!(url, error = %e, "navigation failed, retrying once");
                self.control.navigate(url).await
            },
            Err(e) => Err(e),
        }
    }

    async fn scroll_with_retry(&self, distance: i64) -> Result<(), SessionError> {
        match self.control.scroll_by(distance).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transient() => {
                debug!(error = %e, "scroll failed, retrying once");
                self.control.scroll_by(distance).await
            },
            Err(e) => Err(e),
        }
    }

    /// `Ok(None)` means the round is written off as stagnant.
    async fn query_with_retry(&self) -> Result<Option<Vec<NodeHandle>>, SessionError> {
        match self.control.query_all(&self.cfg.item_selector).await {
            Ok(nodes) => Ok(Some(nodes)),
            Err(e) if e.is_transient() => {
                debug!(error = %e, "query failed, retrying once");
                match self.control.query_all(&self.cfg.item_selector).await {
                    Ok(nodes) => Ok(Some(nodes)),
                    Err(e) if e.is_transient() => {
                        warn!(error = %e, "query failed twice, treating round as stagnant");
                        Ok(None)
                    },
                    Err(e) => Err(e),
                }
            },
            Err(e) => Err(e),
        }
    }

    /// Sleep that wakes early on cancellation.
    async fn wait(&self, duration: Duration) {
        tokio::select! {
            () = self.cancel.cancelled() => {},
            () = tokio::time::sleep(duration) => {},
        }
    }
}

fn build_record(candidate: RawCandidate, target: &Target) -> Record {
    Record {
        content_hash: dedup::content_hash(&candidate.text),
        stable_id: candidate.stable_id,
        fields: candidate.fields,
        collected_at: Utc::now(),
        source_target: target.clone(),
    }
}

/// Resolve a target into a feed URL on the configured site.
fn target_url(base: &str, target: &Target) -> Option<String> {
    let mut url = Url::parse(base).ok()?;
    match target.kind {
        TargetKind::User => {
            url.set_path(target.identifier.trim_start_matches('@'));
        },
        TargetKind::Keyword => {
            url.set_path("search");
            url.query_pairs_mut()
                .append_pair("q", &target.identifier)
                .append_pair("f", "live");
        },
        TargetKind::UserKeyword => {
            let query = format!(
                "from:{} {}",
                target.identifier.trim_start_matches('@'),
                target.identifier2.as_deref().unwrap_or_default()
            );
            url.set_path("search");
            url.query_pairs_mut()
                .append_pair("q", &query)
                .append_pair("f", "live");
        },
    }
    Some(url.into())
}
