//! Disk-space detect/remediate pair.
//!
//! Detection compares free space on the system drive against a threshold.
//! Remediation enables the volume-cache cleanup handlers for a sageset
//! profile, purges aged temp files, then launches `cleanmgr` against that
//! profile. The probe is fail-open: a host whose disk cannot be queried is
//! assumed compliant rather than subjected to a cleanup it may not need.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::audit::AuditLog;
use crate::config::DiskConfig;
use crate::engine::{ComplianceResult, CorrectionOutcome, Corrector, FailurePolicy, Probe};
use crate::host::{DiskUsage, ProcessRunner, RegValue, Registry};

const VOLUME_CACHES_KEY: &str =
    r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Explorer\VolumeCaches";

pub struct FreeSpaceProbe {
    drive: String,
    min_free_percent: f64,
    disk: Arc<dyn DiskUsage>,
}

impl FreeSpaceProbe {
    pub fn new(config: &DiskConfig, disk: Arc<dyn DiskUsage>) -> Self {
        Self {
            drive: config.drive.clone(),
            min_free_percent: config.min_free_percent,
            disk,
        }
    }
}

impl Probe for FreeSpaceProbe {
    fn name(&self) -> &str {
        "disk-free-space"
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::FailOpen
    }

    fn evaluate(&self) -> ComplianceResult {
        let (total, free) = match self.disk.query(&self.drive) {
            Ok(usage) => usage,
            Err(err) => return ComplianceResult::read_failure(self.policy(), err),
        };
        if total == 0 {
            return ComplianceResult::read_failure(
                self.policy(),
                format!("{} reports zero total size", self.drive),
            );
        }

        let percent = free as f64 / total as f64 * 100.0;
        let detail = format!(
            "{} has {:.1}% free (threshold {:.1}%)",
            self.drive, percent, self.min_free_percent
        );
        if percent >= self.min_free_percent {
            ComplianceResult::compliant(detail)
        } else {
            ComplianceResult::non_compliant(detail)
        }
    }
}

pub struct DiskCleanupCorrector {
    sage_set: u32,
    volume_caches: Vec<String>,
    temp_paths: Vec<std::path::PathBuf>,
    temp_age_days: u32,
    registry: Arc<dyn Registry>,
    runner: Arc<dyn ProcessRunner>,
    audit: Arc<AuditLog>,
}

impl DiskCleanupCorrector {
    pub fn new(
        config: &DiskConfig,
        registry: Arc<dyn Registry>,
        runner: Arc<dyn ProcessRunner>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            sage_set: config.sage_set,
            volume_caches: config.volume_caches.clone(),
            temp_paths: config.temp_paths.clone(),
            temp_age_days: config.temp_age_days,
            registry,
            runner,
            audit,
        }
    }

    fn state_flags_name(&self) -> String {
        format!("StateFlags{:04}", self.sage_set)
    }
}

impl Corrector for DiskCleanupCorrector {
    fn name(&self) -> &str {
        "disk-cleanup"
    }

    fn apply(&self) -> CorrectionOutcome {
        let mut errors: Vec<String> = Vec::new();

        // Select the cache handlers for the cleanup profile before cleanmgr
        // runs; cleanmgr only honors handlers flagged for its sageset.
        let flags_name = self.state_flags_name();
        for cache in &self.volume_caches {
            let path = format!(r"{}\{}", VOLUME_CACHES_KEY, cache);
            self.audit
                .record(&format!("setting {}\\{} = 2", path, flags_name));
            match self.registry.write_value(&path, &flags_name, RegValue::Dword(2)) {
                Ok(()) => self.audit.record(&format!("enabled cache handler '{}'", cache)),
                Err(err) => {
                    self.audit
                        .record(&format!("failed to enable cache handler '{}': {}", cache, err));
                    errors.push(format!("{}: {}", cache, err));
                }
            }
        }

        let cutoff = SystemTime::now()
            - std::time::Duration::from_secs(u64::from(self.temp_age_days) * 86_400);
        for path in &self.temp_paths {
            if !path.exists() {
                continue;
            }
            self.audit
                .record(&format!("purging files older than {} days from {}", self.temp_age_days, path.display()));
            let (removed, failed) = purge_old_files(path, cutoff);
            self.audit.record(&format!(
                "purged {} files from {} ({} could not be removed)",
                removed,
                path.display(),
                failed
            ));
        }

        let sagerun = format!("/sagerun:{}", self.sage_set);
        self.audit.record(&format!("launching cleanmgr {}", sagerun));
        match self.runner.run("cleanmgr", &[&sagerun]) {
            Ok(out) if out.success() => self.audit.record("cleanmgr exited with code 0"),
            Ok(out) => {
                self.audit
                    .record(&format!("cleanmgr exited with code {}", out.exit_code));
                errors.push(format!("cleanmgr exited {}", out.exit_code));
            }
            Err(err) => {
                self.audit.record(&format!("cleanmgr failed to start: {}", err));
                errors.push(format!("cleanmgr: {}", err));
            }
        }

        if errors.is_empty() {
            CorrectionOutcome::success("cleanup profile configured and cleanmgr launched")
        } else {
            CorrectionOutcome::failure(
                format!("cleanup completed with {} error(s)", errors.len()),
                errors.join("; "),
            )
        }
    }
}

/// Delete regular files under `root` last modified at or before `cutoff`.
/// Locked or vanishing files are counted, not fatal. Directories are left
/// in place.
fn purge_old_files(root: &Path, cutoff: SystemTime) -> (usize, usize) {
    let mut removed = 0;
    let mut failed = 0;

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let old_enough = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .is_some_and(|modified| modified <= cutoff);
        if !old_enough {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(_) => failed += 1,
        }
    }

    (removed, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::{FixedDiskUsage, MemoryRegistry, ScriptedRunner};
    use std::time::Duration;
    use tempfile::tempdir;

    fn probe(total: u64, free: u64, threshold: f64) -> FreeSpaceProbe {
        let config = DiskConfig {
            min_free_percent: threshold,
            ..DiskConfig::default()
        };
        FreeSpaceProbe::new(&config, Arc::new(FixedDiskUsage::new(total, free)))
    }

    #[test]
    fn plenty_of_space_is_compliant() {
        let result = probe(1000, 400, 10.0).evaluate();
        assert!(result.compliant);
        assert!(result.error.is_none());
    }

    #[test]
    fn low_space_is_non_compliant() {
        let result = probe(1000, 50, 10.0).evaluate();
        assert!(!result.compliant);
    }

    #[test]
    fn read_failure_fails_open() {
        let config = DiskConfig::default();
        let probe = FreeSpaceProbe::new(&config, Arc::new(FixedDiskUsage::failing("WMI down")));
        let result = probe.evaluate();
        assert!(result.compliant);
        assert!(result.error.as_deref().unwrap().contains("WMI down"));
    }

    #[test]
    fn corrector_sets_state_flags_and_runs_cleanmgr() {
        let registry = Arc::new(MemoryRegistry::new());
        let runner = Arc::new(ScriptedRunner::new());
        let config = DiskConfig {
            temp_paths: Vec::new(),
            ..DiskConfig::default()
        };
        let corrector = DiskCleanupCorrector::new(
            &config,
            registry.clone(),
            runner.clone(),
            Arc::new(AuditLog::stdout()),
        );

        let outcome = corrector.apply();
        assert!(outcome.succeeded, "{:?}", outcome);

        let value = registry
            .read_value(
                &format!(r"{}\Temporary Files", VOLUME_CACHES_KEY),
                "StateFlags0112",
            )
            .unwrap();
        assert_eq!(value, Some(RegValue::Dword(2)));
        assert!(runner
            .invocations()
            .iter()
            .any(|line| line == "cleanmgr /sagerun:112"));
    }

    #[test]
    fn failed_cleanmgr_marks_the_attempt_failed() {
        let registry = Arc::new(MemoryRegistry::new());
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("cleanmgr", 1, "");
        let config = DiskConfig {
            temp_paths: Vec::new(),
            ..DiskConfig::default()
        };
        let corrector = DiskCleanupCorrector::new(
            &config,
            registry,
            runner,
            Arc::new(AuditLog::stdout()),
        );

        let outcome = corrector.apply();
        assert!(!outcome.succeeded);
        assert!(outcome.error.as_deref().unwrap().contains("cleanmgr exited 1"));
    }

    #[test]
    fn purge_removes_only_aged_files() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("stale.tmp");
        fs::write(&old, "x").unwrap();
        let nested = dir.path().join("sub");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("also-stale.tmp"), "y").unwrap();

        // Everything on disk is older than a cutoff in the future.
        let cutoff = SystemTime::now() + Duration::from_secs(60);
        let (removed, failed) = purge_old_files(dir.path(), cutoff);
        assert_eq!((removed, failed), (2, 0));
        assert!(!old.exists());
        assert!(nested.exists());

        // And nothing is older than a cutoff in the past.
        fs::write(dir.path().join("fresh.tmp"), "z").unwrap();
        let cutoff = SystemTime::now() - Duration::from_secs(3600);
        let (removed, _) = purge_old_files(dir.path(), cutoff);
        assert_eq!(removed, 0);
    }
}
