//! Browser session pool.
//!
//! Acquiring a session runs a health precheck, starts a browser profile
//! through the managed app's API, waits for it to report active, and
//! connects CDP control to the reported endpoint. Releasing stops the
//! profile best-effort and drops the control connection.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    tokio::sync::{Mutex, RwLock},
    tracing::{info, warn},
};

use {
    crate::{
        control::{BrowserControl, CdpControl},
        error::SessionError,
        health::{HealthMonitor, HealthReport},
        launcher::LauncherClient,
    },
    gleaner_common::SessionStatus,
    gleaner_config::SessionConfig,
};

/// Request for one session, bound to a browser profile.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub profile_id: String,
}

impl SessionSpec {
    #[must_use]
    pub fn new(profile_id: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
        }
    }
}

/// A live session handed out by the pool.
pub struct PooledSession {
    session_id: String,
    profile_id: String,
    control: Arc<dyn BrowserControl>,
}

impl PooledSession {
    /// Assemble a session from its parts. Production sessions come from
    /// [`SessionPool::acquire`]; this exists so harnesses can wire in a
    /// scripted control.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        profile_id: impl Into<String>,
        control: Arc<dyn BrowserControl>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            profile_id: profile_id.into(),
            control,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    #[must_use]
    pub fn control(&self) -> Arc<dyn BrowserControl> {
        Arc::clone(&self.control)
    }
}

impl std::fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("session_id", &self.session_id)
            .field("profile_id", &self.profile_id)
            .finish_non_exhaustive()
    }
}

/// Source of browser sessions. The orchestrator depends on this seam rather
/// than on the concrete pool.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn acquire(&self, spec: SessionSpec) -> Result<PooledSession, SessionError>;

    async fn release(&self, session: PooledSession);
}

/// Pool of browser sessions backed by the managed automation app.
pub struct SessionPool {
    cfg: SessionConfig,
    launcher: LauncherClient,
    monitor: Mutex<HealthMonitor>,
    active: RwLock<HashMap<String, SessionStatus>>,
}

impl SessionPool {
    #[must_use]
    pub fn new(cfg: SessionConfig) -> Self {
        let launcher = LauncherClient::new(&cfg);
        let monitor = Mutex::new(HealthMonitor::new(cfg.clone()));
        Self {
            cfg,
            launcher,
            monitor,
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Take a health snapshot of the host and managed app.
    pub async fn health_check(&self) -> HealthReport {
        self.monitor.lock().await.report().await
    }

    /// Remediate what a health report flagged.
    pub async fn remediate(&self, report: &HealthReport) -> Result<(), SessionError> {
        self.monitor.lock().await.remediate(report).await
    }

    /// Number of sessions currently handed out.
    pub async fn active_count(&self) -> usize {
        let active = self.active.read().await;
        active
            .values()
            .filter(|s| **s == SessionStatus::Ready)
            .count()
    }

    async fn precheck(&self) -> Result<(), SessionError> {
        let report = self.health_check().await;

        // Resource pressure is reported, not fatal.
        for violation in report.resource_violations(&self.cfg) {
            warn!(%violation, "resource threshold exceeded");
        }

        if report.needs_remediation() {
            warn!(
                app_running = report.managed_process_running,
                runaways = report.runaway_worker_pids.len(),
                "managed app needs remediation before acquiring a session"
            );
            self.remediate(&report).await.map_err(|e| {
                SessionError::Unavailable(format!("remediation failed: {e}"))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl SessionSource for SessionPool {
    async fn acquire(&self, spec: SessionSpec) -> Result<PooledSession, SessionError> {
        let session_id = generate_session_id();
        {
            let mut active = self.active.write().await;
            active.insert(session_id.clone(), SessionStatus::Starting);
        }

        let result = async {
            self.precheck().await?;

            let started = self.launcher.start_profile(&spec.profile_id).await?;
            self.launcher
                .wait_until_ready(
                    &spec.profile_id,
                    Duration::from_secs(self.cfg.ready_timeout_secs),
                )
                .await?;

            let endpoint = started.control_endpoint().ok_or_else(|| {
                SessionError::Unavailable(format!(
                    "profile {} reported no debug endpoint",
                    spec.profile_id
                ))
            })?;

            let control =
                CdpControl::connect(endpoint, Duration::from_millis(self.cfg.control_timeout_ms))
                    .await?;

            Ok::<_, SessionError>(Arc::new(control) as Arc<dyn BrowserControl>)
        }
        .await;

        match result {
            Ok(control) => {
                {
                    let mut active = self.active.write().await;
                    active.insert(session_id.clone(), SessionStatus::Ready);
                }
                info!(session_id, profile_id = spec.profile_id, "session acquired");
                Ok(PooledSession::new(session_id, spec.profile_id, control))
            },
            Err(e) => {
                {
                    let mut active = self.active.write().await;
                    active.remove(&session_id);
                }
                // The profile may have started before a later step failed.
                let _ = self.launcher.stop_profile(&spec.profile_id).await;
                Err(e)
            },
        }
    }

    async fn release(&self, session: PooledSession) {
        let stopped = self.launcher.stop_profile(session.profile_id()).await;
        {
            let mut active = self.active.write().await;
            active.insert(session.session_id().to_string(), SessionStatus::Stopped);
        }
        info!(
            session_id = session.session_id(),
            profile_id = session.profile_id(),
            stopped,
            "session released"
        );
        // Dropping the session tears down the CDP connection.
        drop(session);
    }
}

/// Generate a random session ID.
fn generate_session_id() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let id: u64 = rng.random();
    format!("session-{:016x}", id)
}
