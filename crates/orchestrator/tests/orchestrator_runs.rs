//! Whole-run orchestration scenarios against a fake session source.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use {async_trait::async_trait, tokio_util::sync::CancellationToken};

use {
    gleaner_common::TerminationReason,
    gleaner_config::{GleanerConfig, TargetEntry},
    gleaner_orchestrator::{Orchestrator, OrchestratorError},
    gleaner_session::{
        BrowserControl, NodeHandle, PooledSession, SessionError, SessionSource, SessionSpec,
    },
};

/// Control whose feed never changes: every query sees the same items.
struct StaticControl {
    nodes: Vec<NodeHandle>,
}

#[async_trait]
impl BrowserControl for StaticControl {
    async fn navigate(&self, _url: &str) -> Result<(), SessionError> {
        Ok(())
    }

    async fn query_all(&self, _selector: &str) -> Result<Vec<NodeHandle>, SessionError> {
        Ok(self.nodes.clone())
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value, SessionError> {
        Ok(serde_json::Value::Null)
    }

    async fn scroll_by(&self, _delta_y: i64) -> Result<(), SessionError> {
        Ok(())
    }

    async fn reload(&self) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Session source with a fixed feed per profile; some profiles fail to start.
struct FakeSource {
    feeds: HashMap<String, Vec<NodeHandle>>,
    failing: HashSet<String>,
    released: Mutex<Vec<String>>,
}

impl FakeSource {
    fn new(feeds: HashMap<String, Vec<NodeHandle>>, failing: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            feeds,
            failing: failing.iter().map(|s| s.to_string()).collect(),
            released: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SessionSource for FakeSource {
    async fn acquire(&self, spec: SessionSpec) -> Result<PooledSession, SessionError> {
        if self.failing.contains(&spec.profile_id) {
            return Err(SessionError::Unavailable(format!(
                "profile {} is locked",
                spec.profile_id
            )));
        }
        let nodes = self.feeds.get(&spec.profile_id).cloned().unwrap_or_default();
        Ok(PooledSession::new(
            format!("sess-{}", spec.profile_id),
            spec.profile_id,
            Arc::new(StaticControl { nodes }),
        ))
    }

    async fn release(&self, session: PooledSession) {
        self.released
            .lock()
            .unwrap()
            .push(session.profile_id().to_string());
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

fn user(handle: &str) -> TargetEntry {
    TargetEntry {
        user: Some(handle.into()),
        keyword: None,
    }
}

fn config(dir: &std::path::Path, profiles: &[&str], targets: &[TargetEntry]) -> GleanerConfig {
    let mut cfg = GleanerConfig::default();
    cfg.session.profile_ids = profiles.iter().map(|s| s.to_string()).collect();
    cfg.run.session_count = profiles.len();
    cfg.run.progress_interval_secs = 3600;
    cfg.targets = targets.to_vec();
    cfg.collector.per_target_limit = 2;
    cfg.collector.max_scroll_attempts = 2;
    cfg.collector.max_refreshes = 0;
    cfg.collector.base_wait_ms = 0;
    cfg.collector.checkpoint_dir = dir.to_path_buf();
    cfg
}

#[tokio::test]
async fn merges_sessions_first_writer_wins() {
    let dir = tempfile::tempdir().unwrap();
    let source = FakeSource::new(
        HashMap::from([
            ("p1".to_string(), vec![item(1), item(2)]),
            // Item 2 is visible from both sessions.
            ("p2".to_string(), vec![item(2), item(3)]),
        ]),
        &[],
    );
    let cfg = config(
        dir.path(),
        &["p1", "p2"],
        &[user("a"), user("b"), user("c"), user("d")],
    );

    let result = Orchestrator::new(Arc::clone(&source), cfg, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(result.reports.len(), 2);
    let ids: Vec<_> = result
        .records
        .iter()
        .map(|r| r.stable_id.clone().unwrap())
        .collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert_eq!(result.cross_session_duplicates, 1);
    assert_eq!(result.failed_partitions(), 0);

    let mut released = source.released.lock().unwrap().clone();
    released.sort();
    assert_eq!(released, vec!["p1", "p2"]);
}

#[tokio::test]
async fn failed_partition_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    // The middle profile of three fails to start; its neighbours finish.
    let source = FakeSource::new(
        HashMap::from([
            ("p1".to_string(), vec![item(1), item(2)]),
            ("p3".to_string(), vec![item(3), item(4)]),
        ]),
        &["p2"],
    );
    let cfg = config(
        dir.path(),
        &["p1", "p2", "p3"],
        &[user("a"), user("b"), user("c"), user("d"), user("e"), user("f")],
    );

    let result = Orchestrator::new(Arc::clone(&source), cfg, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(result.reports.len(), 3);
    assert_eq!(result.failed_partitions(), 1);
    assert_eq!(
        result.reports[1].termination_reason,
        TerminationReason::Failed
    );
    assert_eq!(result.reports[1].targets_assigned, 2);
    assert!(result.reports[1].errors[0].contains("locked"));
    // The healthy partitions still produced their records.
    assert_eq!(result.records.len(), 4);
    // Only the acquired sessions were released.
    let mut released = source.released.lock().unwrap().clone();
    released.sort();
    assert_eq!(released, vec!["p1", "p3"]);
}

#[tokio::test]
async fn run_fails_when_no_session_acquires() {
    let dir = tempfile::tempdir().unwrap();
    let source = FakeSource::new(HashMap::new(), &["p1", "p2"]);
    let cfg = config(dir.path(), &["p1", "p2"], &[user("a"), user("b")]);

    let err = Orchestrator::new(source, cfg, CancellationToken::new())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NoUsableSessions(_)));
}

#[tokio::test]
async fn session_count_clamps_to_profiles_and_targets() {
    let dir = tempfile::tempdir().unwrap();
    let source = FakeSource::new(
        HashMap::from([("p1".to_string(), vec![item(1)])]),
        &[],
    );
    let mut cfg = config(
        dir.path(),
        &["p1"],
        &[user("a"), user("b"), user("c")],
    );
    cfg.run.session_count = 4;

    let result = Orchestrator::new(source, cfg, CancellationToken::new())
        .run()
        .await
        .unwrap();

    // One profile means one partition carrying every target.
    assert_eq!(result.reports.len(), 1);
    assert_eq!(result.reports[0].targets_assigned, 3);
    assert_eq!(result.reports[0].per_target.len(), 3);
}

#[tokio::test]
async fn empty_target_list_is_an_empty_run() {
    let dir = tempfile::tempdir().unwrap();
    let source = FakeSource::new(HashMap::new(), &[]);
    let cfg = config(dir.path(), &["p1"], &[]);

    let result = Orchestrator::new(source, cfg, CancellationToken::new())
        .run()
        .await
        .unwrap();
    assert!(result.reports.is_empty());
    assert!(result.records.is_empty());
}
