//! Windows Update client detect/remediate pair.
//!
//! Detection counts recent update-client error events. Remediation runs
//! the classic reset sequence: stop the update services, rename the
//! download caches, re-register the servicing DLLs, reset winsock, restart
//! the services, and trigger a fresh scan. Each action is audited before
//! and after it happens so a partial failure is diagnosable from the log.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;

use crate::audit::AuditLog;
use crate::config::UpdateConfig;
use crate::engine::{ComplianceResult, CorrectionOutcome, Corrector, FailurePolicy, Probe};
use crate::host::{wait_for, HostError, ProcessRunner, ServiceManager, ServiceState, WaitOutcome};

/// Servicing DLLs re-registered during the reset, in the order the classic
/// sequence registers them.
const SERVICING_DLLS: &[&str] = &[
    "atl.dll",
    "urlmon.dll",
    "mshtml.dll",
    "jscript.dll",
    "vbscript.dll",
    "msxml3.dll",
    "wuapi.dll",
    "wuaueng.dll",
    "wups.dll",
    "wups2.dll",
    "wucltux.dll",
    "qmgr.dll",
];

const SERVICE_POLL: Duration = Duration::from_millis(500);

pub struct UpdateHealthProbe {
    window_days: u32,
    runner: Arc<dyn ProcessRunner>,
}

impl UpdateHealthProbe {
    pub fn new(config: &UpdateConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            window_days: config.error_window_days,
            runner,
        }
    }
}

impl Probe for UpdateHealthProbe {
    fn name(&self) -> &str {
        "windows-update-health"
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::FailClosed
    }

    fn evaluate(&self) -> ComplianceResult {
        let script = format!(
            "(Get-WinEvent -FilterHashtable @{{LogName='System'; ProviderName='Microsoft-Windows-WindowsUpdateClient'; Level=2; StartTime=(Get-Date).AddDays(-{})}} -ErrorAction SilentlyContinue | Measure-Object).Count",
            self.window_days
        );

        let out = match self.runner.run("powershell", &["-NoProfile", "-Command", &script]) {
            Ok(out) if out.success() => out,
            Ok(out) => {
                return ComplianceResult::read_failure(
                    self.policy(),
                    format!("event query exited {}: {}", out.exit_code, out.stderr.trim()),
                )
            }
            Err(err) => return ComplianceResult::read_failure(self.policy(), err),
        };

        let count: u32 = match out.stdout.trim().parse() {
            Ok(n) => n,
            Err(_) => {
                return ComplianceResult::read_failure(
                    self.policy(),
                    format!("unparseable event count: {:?}", out.stdout.trim()),
                )
            }
        };

        let detail = format!(
            "{} update client error(s) in the last {} day(s)",
            count, self.window_days
        );
        if count == 0 {
            ComplianceResult::compliant(detail)
        } else {
            ComplianceResult::non_compliant(detail)
        }
    }
}

pub struct UpdateResetCorrector {
    services: Vec<String>,
    software_distribution: PathBuf,
    catroot2: PathBuf,
    service_wait: Duration,
    service_mgr: Arc<dyn ServiceManager>,
    runner: Arc<dyn ProcessRunner>,
    audit: Arc<AuditLog>,
}

impl UpdateResetCorrector {
    pub fn new(
        config: &UpdateConfig,
        service_mgr: Arc<dyn ServiceManager>,
        runner: Arc<dyn ProcessRunner>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            services: config.services.clone(),
            software_distribution: config.software_distribution.clone(),
            catroot2: config.catroot2.clone(),
            service_wait: Duration::from_secs(config.service_wait_secs),
            service_mgr,
            runner,
            audit,
        }
    }

    /// Wait for `service` to reach `target`. Timing out is not an error:
    /// the reset proceeds best-effort and the re-probe judges the result.
    fn await_state(&self, service: &str, target: ServiceState) {
        let outcome = wait_for(self.service_wait, SERVICE_POLL, || {
            self.service_mgr
                .status(service)
                .map(|s| s == target)
                .unwrap_or(false)
        });
        if outcome == WaitOutcome::TimedOut {
            self.audit.record(&format!(
                "service '{}' did not reach {:?} within {}s, continuing best-effort",
                service,
                target,
                self.service_wait.as_secs()
            ));
        }
    }

    fn rename_cache(&self, path: &Path, errors: &mut Vec<String>) {
        if !path.exists() {
            self.audit
                .record(&format!("{} not present, nothing to rename", path.display()));
            return;
        }
        match rename_with_backup(path) {
            Ok(backup) => self.audit.record(&format!(
                "renamed {} -> {}",
                path.display(),
                backup.display()
            )),
            Err(err) => {
                self.audit
                    .record(&format!("failed to rename {}: {}", path.display(), err));
                errors.push(format!("{}: {}", path.display(), err));
            }
        }
    }
}

impl Corrector for UpdateResetCorrector {
    fn name(&self) -> &str {
        "update-client-reset"
    }

    fn apply(&self) -> CorrectionOutcome {
        let mut errors: Vec<String> = Vec::new();

        for service in &self.services {
            self.audit.record(&format!("stopping service '{}'", service));
            match self.service_mgr.stop(service) {
                Ok(()) => {
                    self.await_state(service, ServiceState::Stopped);
                    self.audit.record(&format!("service '{}' stop requested", service));
                }
                Err(err) => {
                    self.audit
                        .record(&format!("failed to stop service '{}': {}", service, err));
                    errors.push(format!("stop {}: {}", service, err));
                }
            }
        }

        self.rename_cache(&self.software_distribution, &mut errors);
        self.rename_cache(&self.catroot2, &mut errors);

        // Re-registration is best-effort: some DLLs are absent on modern
        // builds and regsvr32 failing on them is expected.
        let mut registered = 0;
        for dll in SERVICING_DLLS {
            if let Ok(out) = self.runner.run("regsvr32", &["/s", dll]) {
                if out.success() {
                    registered += 1;
                }
            }
        }
        self.audit.record(&format!(
            "re-registered {}/{} servicing DLLs",
            registered,
            SERVICING_DLLS.len()
        ));

        self.audit.record("resetting winsock catalog");
        match self.runner.run("netsh", &["winsock", "reset"]) {
            Ok(out) => self
                .audit
                .record(&format!("netsh winsock reset exited {}", out.exit_code)),
            Err(err) => {
                self.audit.record(&format!("winsock reset failed: {}", err));
                errors.push(format!("winsock reset: {}", err));
            }
        }

        for service in self.services.iter().rev() {
            self.audit.record(&format!("starting service '{}'", service));
            match self.service_mgr.start(service) {
                Ok(()) => {
                    self.await_state(service, ServiceState::Running);
                    self.audit.record(&format!("service '{}' start requested", service));
                }
                Err(err) => {
                    self.audit
                        .record(&format!("failed to start service '{}': {}", service, err));
                    errors.push(format!("start {}: {}", service, err));
                }
            }
        }

        self.audit.record("triggering update scan");
        let uso_failed = match self.runner.run("UsoClient", &["StartScan"]) {
            Ok(out) if out.success() => false,
            Ok(out) => {
                self.audit
                    .record(&format!("UsoClient StartScan exited {}", out.exit_code));
                true
            }
            Err(err) => {
                self.audit.record(&format!("UsoClient unavailable: {}", err));
                true
            }
        };
        if uso_failed {
            // Older builds use wuauclt instead; the scan stays best-effort
            // either way since the next probe judges the outcome.
            match self.runner.run("wuauclt", &["/resetauthorization", "/detectnow"]) {
                Ok(out) => self
                    .audit
                    .record(&format!("wuauclt detectnow exited {}", out.exit_code)),
                Err(err) => self.audit.record(&format!("scan trigger failed: {}", err)),
            }
        }

        if errors.is_empty() {
            CorrectionOutcome::success("update client caches reset and services restarted")
        } else {
            CorrectionOutcome::failure(
                format!("reset completed with {} error(s)", errors.len()),
                errors.join("; "),
            )
        }
    }
}

/// Rename `path` to `<path>.bak-<timestamp>` so the OS rebuilds it fresh
/// while the old contents stay available for diagnosis.
fn rename_with_backup(path: &Path) -> Result<PathBuf, HostError> {
    let stamp = Local::now().format("%Y%m%d%H%M%S");
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| HostError::new(format!("invalid path: {}", path.display())))?;
    let backup = path.with_file_name(format!("{}.bak-{}", file_name, stamp));
    std::fs::rename(path, &backup)?;
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::{MemoryServices, ScriptedRunner};
    use tempfile::tempdir;

    fn config_with(dir: &Path) -> UpdateConfig {
        UpdateConfig {
            software_distribution: dir.join("SoftwareDistribution"),
            catroot2: dir.join("catroot2"),
            service_wait_secs: 1,
            ..UpdateConfig::default()
        }
    }

    #[test]
    fn zero_errors_is_compliant() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("powershell", 0, "0\n");
        let probe = UpdateHealthProbe::new(&UpdateConfig::default(), runner);
        assert!(probe.evaluate().compliant);
    }

    #[test]
    fn recent_errors_are_non_compliant() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("powershell", 0, "3\n");
        let probe = UpdateHealthProbe::new(&UpdateConfig::default(), runner);
        let result = probe.evaluate();
        assert!(!result.compliant);
        assert!(result.detail.contains("3 update client error(s)"));
    }

    #[test]
    fn unreadable_event_log_fails_closed() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("powershell", 1, "");
        let probe = UpdateHealthProbe::new(&UpdateConfig::default(), runner);
        let result = probe.evaluate();
        assert!(!result.compliant);
        assert!(result.error.is_some());
    }

    #[test]
    fn reset_bounces_services_and_renames_caches() {
        let dir = tempdir().unwrap();
        let config = config_with(dir.path());
        std::fs::create_dir(&config.software_distribution).unwrap();
        std::fs::write(config.software_distribution.join("wu.log"), "x").unwrap();

        let services = Arc::new(MemoryServices::with_running(&[
            "wuauserv", "bits", "cryptsvc",
        ]));
        let runner = Arc::new(ScriptedRunner::new());
        let corrector = UpdateResetCorrector::new(
            &config,
            services.clone(),
            runner.clone(),
            Arc::new(AuditLog::stdout()),
        );

        let outcome = corrector.apply();
        assert!(outcome.succeeded, "{:?}", outcome);

        // Cache renamed out of the way, services left running again.
        assert!(!config.software_distribution.exists());
        assert!(dir
            .path()
            .read_dir()
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with("SoftwareDistribution.bak-")));
        assert_eq!(
            services.status("wuauserv").unwrap(),
            ServiceState::Running
        );
        assert!(runner
            .invocations()
            .iter()
            .any(|line| line == "netsh winsock reset"));
    }

    #[test]
    fn failed_uso_scan_falls_back_to_wuauclt() {
        let dir = tempdir().unwrap();
        let config = config_with(dir.path());
        let services = Arc::new(MemoryServices::with_running(&[
            "wuauserv", "bits", "cryptsvc",
        ]));
        let runner = Arc::new(ScriptedRunner::new());
        // UsoClient exists but reports failure; wuauclt must still be tried.
        runner.respond("UsoClient", 1, "");
        let corrector = UpdateResetCorrector::new(
            &config,
            services,
            runner.clone(),
            Arc::new(AuditLog::stdout()),
        );

        assert!(corrector.apply().succeeded);
        assert!(runner
            .invocations()
            .iter()
            .any(|line| line == "wuauclt /resetauthorization /detectnow"));
    }

    #[test]
    fn missing_caches_are_not_an_error() {
        let dir = tempdir().unwrap();
        let config = config_with(dir.path());
        let services = Arc::new(MemoryServices::with_running(&[
            "wuauserv", "bits", "cryptsvc",
        ]));
        let corrector = UpdateResetCorrector::new(
            &config,
            services,
            Arc::new(ScriptedRunner::new()),
            Arc::new(AuditLog::stdout()),
        );
        assert!(corrector.apply().succeeded);
    }
}
