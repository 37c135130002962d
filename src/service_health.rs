//! Service Health Probing Module
//!
//! Point-in-time up/down evaluation for locally managed services, and the
//! gate deciding whether dependents should be notified about a service at
//! all. Results are plain booleans computed fresh on every call; nothing is
//! cached and no error is surfaced to callers; every failure to probe
//! resolves to "unhealthy". Diagnostic detail goes to `tracing` instead.
//!
//! Two techniques are used, because the cluster control tool's exit-status
//! semantics differ across node roles:
//!
//! - generic services: exit status of `<ctl> status <service>`;
//! - the storage engine: presence of its postmaster PID file, checked
//!   directly on disk.
//!
//! # The follower caveat
//! On a node that defines no services at all (a follower that only hosts
//! the replicated storage engine), the control tool reports success for any
//! service name. [`HealthProber::check_status`] therefore cannot confirm
//! true health there. This is longstanding fleet behavior that downstream
//! callers rely on, and it is documented rather than fixed. The node's
//! [`NodeRole`] is an explicit input so call sites can consult
//! [`HealthProber::status_is_conclusive`] before trusting a `true`.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Name of the PID-marker file the storage engine's postmaster writes under
/// its data directory.
const STORAGE_ENGINE_PID_FILE: &str = "postmaster.pid";

/// Poll interval while waiting for the control tool to exit.
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Cluster role of the local node.
///
/// Followers define no services of their own, which makes the control
/// tool's exit status inconclusive there (see module docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Bootstrap,
    Follower,
}

/// The narrow seam over the cluster control tool: one question, one answer.
///
/// The production implementation shells out ([`CtlStatusSource`]); tests
/// and environments with an in-process supervisor API substitute their own.
pub trait StatusSource: Send + Sync {
    /// Run a status query for `service` and return the tool's exit code.
    ///
    /// An `Err` means the query could not be run at all (tool missing,
    /// permission denied, timeout); the prober maps both outcomes to
    /// unhealthy.
    fn query_status(&self, service: &str) -> Result<i32>;
}

/// [`StatusSource`] that invokes `<ctl> status <service>` as a child
/// process.
///
/// Output streams are discarded; only the exit status carries meaning.
/// The child is polled against a deadline; on expiry it is killed and the
/// query fails, which the prober resolves to unhealthy.
pub struct CtlStatusSource {
    ctl_path: PathBuf,
    timeout: Duration,
}

impl CtlStatusSource {
    pub fn new(ctl_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ctl_path: ctl_path.into(),
            timeout,
        }
    }
}

impl StatusSource for CtlStatusSource {
    fn query_status(&self, service: &str) -> Result<i32> {
        let mut child = Command::new(&self.ctl_path)
            .arg("status")
            .arg(service)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to run {}", self.ctl_path.display()))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child
                .try_wait()
                .context("Failed to poll control tool status")?
            {
                // Death by signal has no exit code; report it as a distinct
                // non-zero value.
                return Ok(status.code().unwrap_or(-1));
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow!(
                    "status query for '{}' exceeded {:?}",
                    service,
                    self.timeout
                ));
            }
            std::thread::sleep(STATUS_POLL_INTERVAL);
        }
    }
}

/// Point-in-time probe result, serializable for operator tooling.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub service: String,
    /// The per-service marker symlink exists.
    pub enabled: bool,
    /// The control tool reported exit 0.
    pub healthy: bool,
    /// Whether `healthy == true` actually confirms health on this node
    /// (false on followers; see module docs).
    pub conclusive: bool,
}

/// Decides notification eligibility and current status for named services.
///
/// Stateless request/response over configuration supplied at construction.
/// Safe to share across threads; each probe is independent.
pub struct HealthProber {
    service_dir: PathBuf,
    storage_engine_data_dir: PathBuf,
    role: NodeRole,
    status_source: Box<dyn StatusSource>,
}

impl HealthProber {
    /// # Arguments
    /// * `service_dir` - directory holding one marker symlink per enabled
    ///   service
    /// * `storage_engine_data_dir` - the storage engine's data directory
    /// * `role` - this node's cluster role
    /// * `status_source` - the control-tool seam
    pub fn new(
        service_dir: impl Into<PathBuf>,
        storage_engine_data_dir: impl Into<PathBuf>,
        role: NodeRole,
        status_source: Box<dyn StatusSource>,
    ) -> Self {
        Self {
            service_dir: service_dir.into(),
            storage_engine_data_dir: storage_engine_data_dir.into(),
            role,
            status_source,
        }
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Whether a `true` from [`check_status`](Self::check_status) confirms
    /// health on this node. On followers the control tool exits 0 with no
    /// services defined, so the answer is no.
    pub fn status_is_conclusive(&self) -> bool {
        matches!(self.role, NodeRole::Bootstrap)
    }

    /// Should dependents be notified about `service`'s state?
    ///
    /// True only if the service's marker symlink exists under the service
    /// directory AND [`check_status`](Self::check_status) reports healthy.
    /// Any error stat-ing the marker (including permission denied) is
    /// treated as "marker absent": conservatively, no notification.
    pub fn should_notify(&self, service: &str) -> bool {
        self.marker_symlink_exists(service) && self.check_status(service)
    }

    /// Is `service` currently up, according to the control tool?
    ///
    /// Returns exactly `exit status == 0`. A non-zero exit, a query that
    /// could not run, a timeout, and death by signal are all reported as
    /// `false`; "service down" and "probe broken" are deliberately not
    /// distinguished. See the module docs for why the answer is
    /// inconclusive on followers.
    pub fn check_status(&self, service: &str) -> bool {
        match self.status_source.query_status(service) {
            Ok(code) => {
                debug!(service, code, "status query finished");
                code == 0
            }
            Err(e) => {
                warn!(error = %e, service, "status query failed; reporting unhealthy");
                false
            }
        }
    }

    /// Is the storage engine up on this machine?
    ///
    /// Checks for the postmaster PID file under the data directory instead
    /// of asking the control tool, because the control tool's answer is
    /// meaningless on followers (see module docs). Presence-only: the PID
    /// inside is not read and the process is not confirmed alive, so a
    /// stale file left by an unclean crash yields a false positive.
    pub fn storage_engine_up(&self) -> bool {
        self.storage_engine_data_dir
            .join(STORAGE_ENGINE_PID_FILE)
            .exists()
    }

    /// One-shot probe of a service, bundled for operator tooling.
    pub fn probe(&self, service: &str) -> ProbeReport {
        ProbeReport {
            service: service.to_string(),
            enabled: self.marker_symlink_exists(service),
            healthy: self.check_status(service),
            conclusive: self.status_is_conclusive(),
        }
    }

    fn marker_symlink_exists(&self, service: &str) -> bool {
        let marker = self.service_dir.join(service);
        match std::fs::symlink_metadata(&marker) {
            Ok(meta) => meta.file_type().is_symlink(),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!(error = %e, marker = %marker.display(), "marker stat failed; treating as absent");
                }
                false
            }
        }
    }

    /// Path of the PID file consulted by
    /// [`storage_engine_up`](Self::storage_engine_up).
    pub fn storage_engine_pid_path(&self) -> PathBuf {
        self.storage_engine_data_dir.join(STORAGE_ENGINE_PID_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::os::unix::fs::{symlink, PermissionsExt};
    use tempfile::TempDir;

    /// Canned status source for exercising the prober without a real
    /// control tool.
    struct FixedStatus(Result<i32, &'static str>);

    impl StatusSource for FixedStatus {
        fn query_status(&self, _service: &str) -> Result<i32> {
            self.0.map_err(|m| anyhow!(m))
        }
    }

    fn write_ctl_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("nimbus-ctl");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn prober_with(source: Box<dyn StatusSource>, tmp: &TempDir) -> HealthProber {
        HealthProber::new(
            tmp.path().join("service"),
            tmp.path().join("data"),
            NodeRole::Bootstrap,
            source,
        )
    }

    #[test]
    fn test_check_status_true_only_on_exit_zero() {
        let tmp = TempDir::new().unwrap();
        assert!(prober_with(Box::new(FixedStatus(Ok(0))), &tmp).check_status("rabbitmq"));
        assert!(!prober_with(Box::new(FixedStatus(Ok(1))), &tmp).check_status("rabbitmq"));
        assert!(!prober_with(Box::new(FixedStatus(Ok(3))), &tmp).check_status("rabbitmq"));
        assert!(!prober_with(Box::new(FixedStatus(Ok(-1))), &tmp).check_status("rabbitmq"));
        assert!(!prober_with(Box::new(FixedStatus(Err("boom"))), &tmp).check_status("rabbitmq"));
    }

    #[test]
    fn test_ctl_source_reports_real_exit_codes() {
        let tmp = TempDir::new().unwrap();
        let ok_ctl = write_ctl_script(tmp.path(), "exit 0");
        let source = CtlStatusSource::new(&ok_ctl, Duration::from_secs(5));
        assert_eq!(source.query_status("foo").unwrap(), 0);

        let failing = tmp.path().join("failing-ctl");
        fs::write(&failing, "#!/bin/sh\nexit 3\n").unwrap();
        let mut perms = fs::metadata(&failing).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&failing, perms).unwrap();
        let source = CtlStatusSource::new(&failing, Duration::from_secs(5));
        assert_eq!(source.query_status("foo").unwrap(), 3);
    }

    #[test]
    fn test_missing_control_tool_is_unhealthy_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let source = CtlStatusSource::new(tmp.path().join("no-such-ctl"), Duration::from_secs(1));
        let prober = HealthProber::new(
            tmp.path().join("service"),
            tmp.path().join("data"),
            NodeRole::Bootstrap,
            Box::new(source),
        );
        assert!(!prober.check_status("anything"));
    }

    #[test]
    fn test_status_timeout_is_unhealthy() {
        let tmp = TempDir::new().unwrap();
        let slow_ctl = write_ctl_script(tmp.path(), "sleep 30");
        let source = CtlStatusSource::new(&slow_ctl, Duration::from_millis(200));
        let started = Instant::now();
        assert!(source.query_status("slow").is_err());
        // The child must have been reaped well before its sleep finished.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_should_notify_requires_marker_symlink() {
        let tmp = TempDir::new().unwrap();
        let service_dir = tmp.path().join("service");
        fs::create_dir_all(&service_dir).unwrap();

        // Healthy per the control tool, but no marker: never notify.
        let prober = prober_with(Box::new(FixedStatus(Ok(0))), &tmp);
        assert!(!prober.should_notify("rabbitmq"));

        // A plain file is not a marker; only a symlink counts.
        fs::write(service_dir.join("rabbitmq"), b"").unwrap();
        assert!(!prober.should_notify("rabbitmq"));

        let target = tmp.path().join("sv").join("postgres");
        fs::create_dir_all(&target).unwrap();
        symlink(&target, service_dir.join("postgres")).unwrap();
        assert!(prober.should_notify("postgres"));

        // Marker present but unhealthy: still no notification.
        let down = prober_with(Box::new(FixedStatus(Ok(1))), &tmp);
        assert!(!down.should_notify("postgres"));
    }

    #[test]
    fn test_storage_engine_pid_toggle() {
        let tmp = TempDir::new().unwrap();
        let data_dir = tmp.path().join("data");
        fs::create_dir_all(&data_dir).unwrap();

        let prober = prober_with(Box::new(FixedStatus(Ok(1))), &tmp);
        assert!(!prober.storage_engine_up());

        let pid_file = data_dir.join("postmaster.pid");
        fs::write(&pid_file, b"4242\n").unwrap();
        assert!(prober.storage_engine_up());

        // The contents are never validated; any file flips the answer.
        fs::write(&pid_file, b"not a pid").unwrap();
        assert!(prober.storage_engine_up());

        fs::remove_file(&pid_file).unwrap();
        assert!(!prober.storage_engine_up());
    }

    #[test]
    fn test_conclusiveness_follows_role() {
        let tmp = TempDir::new().unwrap();
        let bootstrap = prober_with(Box::new(FixedStatus(Ok(0))), &tmp);
        assert!(bootstrap.status_is_conclusive());

        let follower = HealthProber::new(
            tmp.path().join("service"),
            tmp.path().join("data"),
            NodeRole::Follower,
            Box::new(FixedStatus(Ok(0))),
        );
        assert!(!follower.status_is_conclusive());
        // The boolean itself is unchanged by role; only its weight differs.
        assert!(follower.check_status("anything"));
        let report = follower.probe("anything");
        assert!(report.healthy);
        assert!(!report.conclusive);
    }

    #[test]
    fn test_probe_report_serializes() {
        let tmp = TempDir::new().unwrap();
        let prober = prober_with(Box::new(FixedStatus(Ok(0))), &tmp);
        let report = prober.probe("opensearch");
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"service\":\"opensearch\""));
        assert!(json.contains("\"conclusive\":true"));
    }
}
