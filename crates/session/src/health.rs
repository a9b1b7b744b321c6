//! Host health monitoring for the managed browser-automation app.
//!
//! Watches system CPU, memory, and disk, verifies the managed app process is
//! alive, and flags runaway worker processes. Remediation kills runaways with
//! a grace period and relaunches the app when it has died.

use std::time::Duration;

use {
    sysinfo::{Disks, ProcessesToUpdate, Signal, System},
    tracing::{debug, info, warn},
};

use {crate::error::SessionError, gleaner_config::SessionConfig};

/// Poll interval while verifying a relaunched app came up.
const RELAUNCH_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Snapshot of host health relevant to browser sessions.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub cpu_percent: f32,
    pub mem_percent: f32,
    pub disk_free_gb: f64,
    /// Whether any process matching the managed app name is running.
    pub managed_process_running: bool,
    /// Worker processes of the managed app exceeding the runaway CPU share.
    pub runaway_worker_pids: Vec<u32>,
}

impl HealthReport {
    /// Resource threshold violations as human-readable strings.
    ///
    /// These are reported and logged but never abort a run on their own.
    #[must_use]
    pub fn resource_violations(&self, cfg: &SessionConfig) -> Vec<String> {
        let mut violations = Vec::new();
        if self.cpu_percent > cfg.cpu_limit_percent {
            violations.push(format!(
                "cpu {:.1}% above limit {:.1}%",
                self.cpu_percent, cfg.cpu_limit_percent
            ));
        }
        if self.mem_percent > cfg.mem_limit_percent {
            violations.push(format!(
                "memory {:.1}% above limit {:.1}%",
                self.mem_percent, cfg.mem_limit_percent
            ));
        }
        if self.disk_free_gb < cfg.min_disk_free_gb {
            violations.push(format!(
                "disk free {:.1} GB below minimum {:.1} GB",
                self.disk_free_gb, cfg.min_disk_free_gb
            ));
        }
        violations
    }

    /// Whether the managed app needs process-level remediation.
    #[must_use]
    pub fn needs_remediation(&self) -> bool {
        !self.managed_process_running || !self.runaway_worker_pids.is_empty()
    }
}

/// Samples host state and remediates the managed app process.
pub struct HealthMonitor {
    cfg: SessionConfig,
    sys: System,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(cfg: SessionConfig) -> Self {
        Self {
            cfg,
            sys: System::new(),
        }
    }

    /// Take a fresh health snapshot.
    ///
    /// CPU usage needs two samples separated by the minimum update interval,
    /// so this awaits briefly between refreshes.
    pub async fn report(&mut self) -> HealthReport {
        self.sys.refresh_cpu_usage();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();
        self.sys.refresh_processes(ProcessesToUpdate::All, true);

        let cpu_percent = self.sys.global_cpu_usage();
        let total = self.sys.total_memory();
        let mem_percent = if total == 0 {
            0.0
        } else {
            self.sys.used_memory() as f32 / total as f32 * 100.0
        };

        let mut managed_process_running = false;
        let mut runaway_worker_pids = Vec::new();
        for (pid, proc_) in self.sys.processes() {
            if !self.matches_managed_app(proc_) {
                continue;
            }
            managed_process_running = true;
            if proc_.cpu_usage() > self.cfg.runaway_cpu_percent {
                runaway_worker_pids.push(pid.as_u32());
            }
        }
        runaway_worker_pids.sort_unstable();

        let report = HealthReport {
            cpu_percent,
            mem_percent,
            disk_free_gb: root_disk_free_gb(),
            managed_process_running,
            runaway_worker_pids,
        };
        debug!(
            cpu = report.cpu_percent,
            mem = report.mem_percent,
            disk_free_gb = report.disk_free_gb,
            app_running = report.managed_process_running,
            runaways = report.runaway_worker_pids.len(),
            "health snapshot"
        );
        report
    }

    /// Fix what a health report flagged: kill runaway workers (graceful
    /// terminate, grace period, then force kill) and relaunch the managed
    /// app if it is not running.
    pub async fn remediate(&mut self, report: &HealthReport) -> Result<(), SessionError> {
        if !report.runaway_worker_pids.is_empty() {
            self.kill_runaways(&report.runaway_worker_pids).await;
        }

        if !report.managed_process_running {
            self.relaunch_managed_app().await?;
        }

        Ok(())
    }

    async fn kill_runaways(&mut self, pids: &[u32]) {
        for &pid in pids {
            let pid = sysinfo::Pid::from_u32(pid);
            if let Some(proc_) = self.sys.process(pid) {
                warn!(
                    pid = pid.as_u32(),
                    cpu = proc_.cpu_usage(),
                    "terminating runaway worker"
                );
                // kill_with returns None on platforms without signal support.
                if proc_.kill_with(Signal::Term).is_none() {
                    proc_.kill();
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(self.cfg.kill_grace_ms)).await;

        // Force kill anything that survived the grace period.
        self.sys.refresh_processes(ProcessesToUpdate::All, true);
        for &pid in pids {
            let pid = sysinfo::Pid::from_u32(pid);
            if let Some(proc_) = self.sys.process(pid) {
                warn!(pid = pid.as_u32(), "worker survived grace period, force killing");
                proc_.kill();
            }
        }
    }

    async fn relaunch_managed_app(&mut self) -> Result<(), SessionError> {
        let command = self.cfg.launch_command.clone().ok_or_else(|| {
            SessionError::Unhealthy(format!(
                "{} is not running and no launch command is configured",
                self.cfg.managed_process_name
            ))
        })?;

        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            SessionError::Unhealthy("launch command is empty".to_string())
        })?;

        info!(command = %command, "relaunching managed app");
        tokio::process::Command::new(program)
            .args(parts)
            .spawn()
            .map_err(|e| {
                SessionError::Unhealthy(format!("failed to spawn launch command: {e}"))
            })?;

        // Verify the app actually came up within the ready window.
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.cfg.ready_timeout_secs);
        loop {
            tokio::time::sleep(RELAUNCH_POLL_INTERVAL).await;
            self.sys.refresh_processes(ProcessesToUpdate::All, true);
            if self
                .sys
                .processes()
                .values()
                .any(|p| self.matches_managed_app(p))
            {
                info!(app = %self.cfg.managed_process_name, "managed app relaunched");
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SessionError::Unhealthy(format!(
                    "{} did not come up within {}s after relaunch",
                    self.cfg.managed_process_name, self.cfg.ready_timeout_secs
                )));
            }
        }
    }

    fn matches_managed_app(&self, proc_: &sysinfo::Process) -> bool {
        let needle = self.cfg.managed_process_name.to_lowercase();
        if needle.is_empty() {
            return false;
        }
        if proc_
            .name()
            .to_string_lossy()
            .to_lowercase()
            .contains(&needle)
        {
            return true;
        }
        proc_
            .cmd()
            .iter()
            .any(|arg| arg.to_string_lossy().to_lowercase().contains(&needle))
    }
}

/// Free space on the root filesystem in gigabytes.
fn root_disk_free_gb() -> f64 {
    let disks = Disks::new_with_refreshed_list();
    let root = disks
        .iter()
        .find(|d| d.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.iter().next());
    match root {
        Some(disk) => disk.available_space() as f64 / 1_073_741_824.0,
        None => 0.0,
    }
}
