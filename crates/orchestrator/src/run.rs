//! Run orchestration: acquire sessions, run collectors in parallel, merge.

use std::{sync::Arc, time::Duration};

use {
    thiserror::Error,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use {
    crate::{partition::partition, progress},
    gleaner_collector::{CollectorOutcome, DedupIndex, FeedExtractor, IncrementalCollector, LiveCounters},
    gleaner_common::{CollectionReport, RunResult},
    gleaner_config::GleanerConfig,
    gleaner_session::{SessionSource, SessionSpec},
};

/// Run-level failures. Everything below this level is isolated into a
/// partition's [`CollectionReport`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Not a single session could be acquired, so no partition could run.
    #[error("no usable sessions: {0}")]
    NoUsableSessions(String),
}

/// Drives one harvest run end to end.
pub struct Orchestrator<S> {
    source: Arc<S>,
    cfg: GleanerConfig,
    counters: Arc<LiveCounters>,
    cancel: CancellationToken,
}

impl<S: SessionSource + 'static> Orchestrator<S> {
    #[must_use]
    pub fn new(source: Arc<S>, cfg: GleanerConfig, cancel: CancellationToken) -> Self {
        Self {
            source,
            cfg,
            counters: Arc::new(LiveCounters::default()),
            cancel,
        }
    }

    /// Counters the collectors update while the run is in flight.
    #[must_use]
    pub fn counters(&self) -> Arc<LiveCounters> {
        Arc::clone(&self.counters)
    }

    /// Execute the full run: partition targets, run one collector per
    /// session in parallel, and merge the results.
    ///
    /// A partition whose session dies yields a failed report; the run only
    /// errors when no session at all could be acquired.
    pub async fn run(&self) -> Result<RunResult, OrchestratorError> {
        let targets = self.cfg.resolved_targets();
        if targets.is_empty() {
            return Ok(RunResult {
                reports: Vec::new(),
                records: Vec::new(),
                cross_session_duplicates: 0,
            });
        }

        let profiles = &self.cfg.session.profile_ids;
        let workers = self
            .cfg
            .run
            .session_count
            .min(profiles.len())
            .min(targets.len());
        if workers == 0 {
            return Err(OrchestratorError::NoUsableSessions(
                "no browser profiles configured".into(),
            ));
        }

        let partitions = partition(targets, workers);
        info!(
            workers,
            targets = partitions.iter().map(Vec::len).sum::<usize>(),
            "starting harvest run"
        );

        let stop_progress = CancellationToken::new();
        let reporter = progress::spawn_reporter(
            self.counters(),
            Duration::from_secs(self.cfg.run.progress_interval_secs.max(1)),
            stop_progress.clone(),
        );

        let sizes: Vec<usize> = partitions.iter().map(Vec::len).collect();
        let mut handles = Vec::with_capacity(partitions.len());
        for (i, targets) in partitions.into_iter().enumerate() {
            let profile_id = profiles[i].clone();
            let source = Arc::clone(&self.source);
            let collector_cfg = self.cfg.collector.clone();
            let counters = self.counters();
            let cancel = self.cancel.clone();

            handles.push(tokio::spawn(async move {
                let assigned = targets.len();
                match source.acquire(SessionSpec::new(profile_id.clone())).await {
                    Ok(session) => {
                        let collector = IncrementalCollector::new(
                            session.session_id(),
                            session.control(),
                            collector_cfg,
                            FeedExtractor,
                            counters,
                            cancel,
                        );
                        let outcome = collector.run(targets).await;
                        source.release(session).await;
                        (i, true, outcome)
                    },
                    Err(e) => {
                        warn!(partition = i, profile_id, error = %e, "session acquisition failed");
                        let report =
                            CollectionReport::failed(format!("partition-{i}"), assigned, e.to_string());
                        (i, false, CollectorOutcome {
                            report,
                            records: Vec::new(),
                        })
                    },
                }
            }));
        }

        // Collect in completion order, then restore partition order so the
        // merge below is deterministic.
        let mut outcomes: Vec<Option<(bool, CollectorOutcome)>> =
            (0..sizes.len()).map(|_| None).collect();
        for handle in handles {
            match handle.await {
                Ok((i, acquired, outcome)) => outcomes[i] = Some((acquired, outcome)),
                Err(e) => warn!(error = %e, "collector task panicked"),
            }
        }

        stop_progress.cancel();
        let _ = reporter.await;

        let mut acquired_any = false;
        let mut reports = Vec::with_capacity(sizes.len());
        let mut records = Vec::new();
        let mut merged = DedupIndex::new();
        let mut cross_session_duplicates = 0u64;

        for (i, slot) in outcomes.into_iter().enumerate() {
            let Some((acquired, outcome)) = slot else {
                reports.push(CollectionReport::failed(
                    format!("partition-{i}"),
                    sizes[i],
                    "collector task panicked".into(),
                ));
                continue;
            };
            acquired_any |= acquired;

            // First writer wins: the earlier partition keeps the record.
            for record in outcome.records {
                if merged.insert(record.dedup_key()) {
                    records.push(record);
                } else {
                    cross_session_duplicates += 1;
                }
            }
            reports.push(outcome.report);
        }

        if !acquired_any {
            let detail = reports
                .iter()
                .flat_map(|r| r.errors.iter())
                .next()
                .cloned()
                .unwrap_or_else(|| "all session acquisitions failed".into());
            return Err(OrchestratorError::NoUsableSessions(detail));
        }

        let result = RunResult {
            reports,
            records,
            cross_session_duplicates,
        };
        info!(
            records = result.records.len(),
            cross_session_duplicates = result.cross_session_duplicates,
            failed_partitions = result.failed_partitions(),
            "harvest run complete"
        );
        Ok(result)
    }
}
