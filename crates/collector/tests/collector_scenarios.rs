//! End-to-end collector loop scenarios against a scripted browser control.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use {async_trait::async_trait, tokio_util::sync::CancellationToken};

use {
    gleaner_collector::{FeedExtractor, IncrementalCollector, LiveCounters},
    gleaner_common::{Target, TerminationReason},
    gleaner_config::CollectorConfig,
    gleaner_session::{BrowserControl, NodeHandle, SessionError},
};

type QueryFn =
    dyn Fn(u64, u64) -> Result<Vec<NodeHandle>, SessionError> + Send + Sync;

/// Browser control whose query results are driven by a script.
struct ScriptedControl {
    /// Called with (query index, reloads so far).
    query: Box<QueryFn>,
    queries: AtomicU64,
    reloads: AtomicU64,
    scroll_distances: Mutex<Vec<i64>>,
}

impl ScriptedControl {
    fn new(
        query: impl Fn(u64, u64) -> Result<Vec<NodeHandle>, SessionError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            query: Box::new(query),
            queries: AtomicU64::new(0),
            reloads: AtomicU64::new(0),
            scroll_distances: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl BrowserControl for ScriptedControl {
    async fn navigate(&self, _url: &str) -> Result<(), SessionError> {
        Ok(())
    }

    async fn query_all(&self, _selector: &str) -> Result<Vec<NodeHandle>, SessionError> {
        let index = self.queries.fetch_add(1, Ordering::SeqCst);
        (self.query)(index, self.reloads.load(Ordering::SeqCst))
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value, SessionError> {
        Ok(serde_json::Value::Null)
    }

    async fn scroll_by(&self, delta_y: i64) -> Result<(), SessionError> {
        self.scroll_distances.lock().unwrap().push(delta_y);
        Ok(())
    }

    async fn reload(&self) -> Result<(), SessionError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn item(id: u64) -> NodeHandle {
    NodeHandle {
        node_ref: id as u32,
        payload: serde_json::json!({
            "ref": id,
            "text": format!("post number {id}"),
            "links": [format!("/feed/status/{id}")],
        }),
    }
}

fn items(range: std::ops::RangeInclusive<u64>) -> Vec<NodeHandle> {
    range.map(item).collect()
}

fn fast_config(checkpoint_dir: &std::path::Path) -> CollectorConfig {
    let mut cfg = CollectorConfig::default();
    cfg.base_wait_ms = 0;
    cfg.checkpoint_dir = checkpoint_dir.to_path_buf();
    cfg
}

fn collector(
    control: Arc<ScriptedControl>,
    cfg: CollectorConfig,
    cancel: CancellationToken,
) -> IncrementalCollector<FeedExtractor> {
    IncrementalCollector::new(
        "test-session",
        control,
        cfg,
        FeedExtractor,
        Arc::new(LiveCounters::default()),
        cancel,
    )
}

#[tokio::test]
async fn reaches_target_limit_after_fourth_scroll() {
    let dir = tempfile::tempdir().unwrap();
    // Each round reveals three more items, with overlap from the last round.
    let control = ScriptedControl::new(|index, _| {
        Ok(match index {
            0 => items(1..=3),
            1 => items(1..=6),
            2 => items(4..=9),
            _ => items(7..=12),
        })
    });
    let mut cfg = fast_config(dir.path());
    cfg.per_target_limit = 10;

    let outcome = collector(Arc::clone(&control), cfg, CancellationToken::new())
        .run(vec![Target::user("alice")])
        .await;

    // The fourth round emitted three records at once, overshooting ten.
    assert_eq!(outcome.records.len(), 12);
    assert_eq!(outcome.report.records_collected, 12);
    assert_eq!(outcome.report.per_target.len(), 1);
    assert_eq!(
        outcome.report.per_target[0].reason,
        TerminationReason::TargetReached
    );
    assert_eq!(outcome.report.per_target[0].scroll_attempts, 4);
    // Overlapping windows were deduplicated, never double-emitted.
    assert!(outcome.report.stats.duplicates_skipped > 0);
    let ids: Vec<_> = outcome
        .records
        .iter()
        .map(|r| r.stable_id.clone().unwrap())
        .collect();
    assert_eq!(ids.len(), 12);
    assert_eq!(ids[0], "1");

    // Checkpoint file captured the run.
    let checkpoint = dir.path().join("test-session.ndjson");
    assert!(checkpoint.exists());
    let raw = std::fs::read_to_string(checkpoint).unwrap();
    assert!(raw.lines().count() >= 1);
}

#[tokio::test]
async fn escalates_through_tiers_and_refreshes() {
    let dir = tempfile::tempdir().unwrap();
    // The feed renders nothing until a refresh finally reveals two items.
    let control = ScriptedControl::new(|_, reloads| {
        Ok(if reloads == 0 { Vec::new() } else { items(1..=2) })
    });
    let mut cfg = fast_config(dir.path());
    cfg.per_target_limit = 100;
    cfg.max_scroll_attempts = 12;
    cfg.max_refreshes = 1;

    let outcome = collector(Arc::clone(&control), cfg, CancellationToken::new())
        .run(vec![Target::keyword("rust")])
        .await;

    // Two normal scrolls, three aggressive, two super-aggressive, then the
    // refresh, then the ladder restarts until the attempt budget ran out.
    let distances = control.scroll_distances.lock().unwrap().clone();
    assert_eq!(
        distances,
        vec![800, 800, 1600, 1600, 1600, 2400, 2400, 800, 800, 800, 1600]
    );
    assert_eq!(control.reloads.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(
        outcome.report.per_target[0].reason,
        TerminationReason::AttemptsExhausted
    );
    assert_eq!(outcome.report.per_target[0].scroll_attempts, 12);
}

#[tokio::test]
async fn stagnation_through_refresh_budget_terminates() {
    let dir = tempfile::tempdir().unwrap();
    // A feed that never renders anything, before or after the refresh.
    let control = ScriptedControl::new(|_, _| Ok(Vec::new()));
    let mut cfg = fast_config(dir.path());
    cfg.per_target_limit = 100;
    cfg.max_refreshes = 1;

    let outcome = collector(Arc::clone(&control), cfg, CancellationToken::new())
        .run(vec![Target::user("bob")])
        .await;

    assert_eq!(control.reloads.load(Ordering::SeqCst), 1);
    assert!(outcome.records.is_empty());
    assert_eq!(
        outcome.report.per_target[0].reason,
        TerminationReason::Stagnated
    );
}

#[tokio::test]
async fn dedup_spans_targets_within_a_collector() {
    let dir = tempfile::tempdir().unwrap();
    // Both targets surface the same three items.
    let control = ScriptedControl::new(|_, _| Ok(items(1..=3)));
    let mut cfg = fast_config(dir.path());
    cfg.per_target_limit = 3;
    cfg.max_scroll_attempts = 5;
    cfg.max_refreshes = 0;

    let outcome = collector(control, cfg, CancellationToken::new())
        .run(vec![Target::user("alice"), Target::keyword("rust")])
        .await;

    assert_eq!(outcome.records.len(), 3);
    assert_eq!(
        outcome.report.per_target[0].reason,
        TerminationReason::TargetReached
    );
    // The second target saw only duplicates and never reached its limit.
    assert_eq!(outcome.report.per_target[1].records_collected, 0);
    assert!(outcome.report.stats.duplicates_skipped >= 3);
}

#[tokio::test]
async fn pre_cancelled_run_emits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let control = ScriptedControl::new(|_, _| Ok(items(1..=3)));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = collector(control, fast_config(dir.path()), cancel)
        .run(vec![Target::user("alice"), Target::user("bob")])
        .await;

    assert!(outcome.records.is_empty());
    assert_eq!(
        outcome.report.termination_reason,
        TerminationReason::Cancelled
    );
    assert_eq!(outcome.report.per_target.len(), 2);
    assert!(
        outcome
            .report
            .per_target
            .iter()
            .all(|t| t.reason == TerminationReason::Cancelled)
    );
}

#[tokio::test]
async fn transient_query_failures_count_as_stagnant_rounds() {
    let dir = tempfile::tempdir().unwrap();
    let control =
        ScriptedControl::new(|_, _| Err(SessionError::Timeout("query stalled".into())));
    let mut cfg = fast_config(dir.path());
    cfg.per_target_limit = 5;
    cfg.max_scroll_attempts = 2;
    cfg.max_refreshes = 0;

    let outcome = collector(control, cfg, CancellationToken::new())
        .run(vec![Target::user("alice")])
        .await;

    assert!(outcome.records.is_empty());
    assert_eq!(
        outcome.report.per_target[0].reason,
        TerminationReason::AttemptsExhausted
    );
    // One failed round per scroll attempt.
    assert_eq!(outcome.report.stats.errors, 2);
}

#[tokio::test]
async fn lost_session_fails_the_collector() {
    let dir = tempfile::tempdir().unwrap();
    let control =
        ScriptedControl::new(|_, _| Err(SessionError::Unavailable("browser gone".into())));

    let outcome = collector(control, fast_config(dir.path()), CancellationToken::new())
        .run(vec![Target::user("alice"), Target::user("bob")])
        .await;

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.report.termination_reason, TerminationReason::Failed);
    assert_eq!(outcome.report.per_target[0].reason, TerminationReason::Failed);
    // The second target was never attempted.
    assert_eq!(outcome.report.per_target.len(), 1);
    assert!(!outcome.report.errors.is_empty());
}

#[tokio::test]
async fn zero_limits_terminate_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let control = ScriptedControl::new(|_, _| Ok(items(1..=3)));

    let mut cfg = fast_config(dir.path());
    cfg.per_target_limit = 0;
    let outcome = collector(Arc::clone(&control), cfg, CancellationToken::new())
        .run(vec![Target::user("alice")])
        .await;
    assert_eq!(
        outcome.report.per_target[0].reason,
        TerminationReason::TargetReached
    );
    assert_eq!(control.queries.load(Ordering::SeqCst), 0);

    let mut cfg = fast_config(dir.path());
    cfg.max_scroll_attempts = 0;
    let outcome = collector(Arc::clone(&control), cfg, CancellationToken::new())
        .run(vec![Target::user("alice")])
        .await;
    assert_eq!(
        outcome.report.per_target[0].reason,
        TerminationReason::AttemptsExhausted
    );
    assert_eq!(control.queries.load(Ordering::SeqCst), 0);
}
