//! The built-in check packs: one detect/remediate pair per domain.
//!
//! Each pack contributes one [`ReconciliationStep`] built from typed
//! configuration and the narrow host traits, so the same code runs against
//! the live host and against the in-memory fakes in tests.

pub mod bios;
pub mod disk;
pub mod update;
pub mod wsus;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditLog;
use crate::config::RemedyConfig;
use crate::engine::ReconciliationStep;
use crate::error::{RemedyError, Result};
use crate::host::system::{PsDiskUsage, RegTool, ScTool, SystemRunner};
use crate::host::{DiskUsage, ProcessRunner, Registry, ServiceManager};

/// The four built-in checks, in the order they are always evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Disk,
    Update,
    Wsus,
    Bios,
}

impl CheckKind {
    pub fn all() -> [CheckKind; 4] {
        [
            CheckKind::Disk,
            CheckKind::Update,
            CheckKind::Wsus,
            CheckKind::Bios,
        ]
    }

    pub fn label(self) -> &'static str {
        match self {
            CheckKind::Disk => "disk",
            CheckKind::Update => "update",
            CheckKind::Wsus => "wsus",
            CheckKind::Bios => "bios",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            CheckKind::Disk => "free disk space with volume-cache cleanup",
            CheckKind::Update => "Windows Update client health and cache reset",
            CheckKind::Wsus => "stale WSUS/WUfB policy registry cleanup",
            CheckKind::Bios => "Lenovo BIOS Secure Boot enforcement",
        }
    }
}

impl FromStr for CheckKind {
    type Err = RemedyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disk" => Ok(CheckKind::Disk),
            "update" => Ok(CheckKind::Update),
            "wsus" => Ok(CheckKind::Wsus),
            "bios" => Ok(CheckKind::Bios),
            other => Err(RemedyError::UnknownCheck(other.to_string())),
        }
    }
}

/// The host surfaces a check pack talks through. Bundled so command code
/// can swap the whole set for fakes in one move.
pub struct Hosts {
    pub registry: Arc<dyn Registry>,
    pub services: Arc<dyn ServiceManager>,
    pub runner: Arc<dyn ProcessRunner>,
    pub disk: Arc<dyn DiskUsage>,
}

impl Hosts {
    /// Live implementations shelling out to stock OS utilities.
    pub fn system() -> Self {
        let runner = Arc::new(SystemRunner);
        Self {
            registry: Arc::new(RegTool::new(runner.clone())),
            services: Arc::new(ScTool::new(runner.clone())),
            disk: Arc::new(PsDiskUsage::new(runner.clone())),
            runner,
        }
    }
}

/// Build the selected checks into engine steps, in canonical order.
pub fn build_steps(
    selection: &[CheckKind],
    config: &RemedyConfig,
    hosts: &Hosts,
    audit: &Arc<AuditLog>,
) -> Result<Vec<ReconciliationStep>> {
    let mut steps = Vec::new();

    for kind in CheckKind::all() {
        if !selection.contains(&kind) {
            continue;
        }
        let step = match kind {
            CheckKind::Disk => ReconciliationStep::new(
                Box::new(disk::FreeSpaceProbe::new(&config.disk, hosts.disk.clone())),
                Box::new(disk::DiskCleanupCorrector::new(
                    &config.disk,
                    hosts.registry.clone(),
                    hosts.runner.clone(),
                    audit.clone(),
                )),
                config.disk.max_attempts,
            )?,
            CheckKind::Update => ReconciliationStep::new(
                Box::new(update::UpdateHealthProbe::new(
                    &config.update,
                    hosts.runner.clone(),
                )),
                Box::new(update::UpdateResetCorrector::new(
                    &config.update,
                    hosts.services.clone(),
                    hosts.runner.clone(),
                    audit.clone(),
                )),
                config.update.max_attempts,
            )?,
            CheckKind::Wsus => ReconciliationStep::new(
                Box::new(wsus::WsusPolicyProbe::new(
                    config.wsus.settings.clone(),
                    hosts.registry.clone(),
                )),
                Box::new(wsus::WsusCleanupCorrector::new(
                    &config.wsus,
                    hosts.registry.clone(),
                    hosts.services.clone(),
                    audit.clone(),
                    Duration::from_secs(config.update.service_wait_secs),
                )),
                config.wsus.max_attempts,
            )?,
            CheckKind::Bios => {
                let password = std::env::var(&config.bios.password_env).ok();
                ReconciliationStep::new(
                    Box::new(bios::SecureBootProbe::new(hosts.runner.clone())),
                    Box::new(bios::SecureBootCorrector::new(
                        hosts.runner.clone(),
                        password,
                        audit.clone(),
                    )),
                    config.bios.max_attempts,
                )?
                // Two failed supervisor-password attempts can lock the
                // firmware; this cap overrides any configured budget.
                .with_lockout_cap(bios::PASSWORD_LOCKOUT_CAP)
            }
        };
        steps.push(step);
    }

    Ok(steps)
}

/// Parse a comma-separated `--check` selection. Omitting the flag means all
/// checks; passing it with no names is a usage error, never a vacuous pass.
pub fn parse_selection(raw: Option<&str>) -> Result<Vec<CheckKind>> {
    match raw {
        None => Ok(CheckKind::all().to_vec()),
        Some(list) => {
            let kinds: Vec<CheckKind> = list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(CheckKind::from_str)
                .collect::<Result<_>>()?;
            if kinds.is_empty() {
                return Err(RemedyError::ConfigError(
                    "--check was given but names no checks".into(),
                ));
            }
            Ok(kinds)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_defaults_to_all_checks() {
        assert_eq!(parse_selection(None).unwrap().len(), 4);
    }

    #[test]
    fn selection_parses_names() {
        let kinds = parse_selection(Some("wsus, disk")).unwrap();
        assert_eq!(kinds, vec![CheckKind::Wsus, CheckKind::Disk]);
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!(parse_selection(Some("defrag")).is_err());
    }

    #[test]
    fn explicitly_empty_selection_is_rejected() {
        assert!(parse_selection(Some("")).is_err());
        assert!(parse_selection(Some(",")).is_err());
        assert!(parse_selection(Some(" , ")).is_err());
    }

    #[test]
    fn steps_follow_canonical_order_regardless_of_selection_order() {
        use crate::host::memory::{FixedDiskUsage, MemoryRegistry, MemoryServices, ScriptedRunner};

        let hosts = Hosts {
            registry: Arc::new(MemoryRegistry::new()),
            services: Arc::new(MemoryServices::new()),
            runner: Arc::new(ScriptedRunner::new()),
            disk: Arc::new(FixedDiskUsage::new(100, 50)),
        };
        let audit = Arc::new(AuditLog::stdout());
        let config = RemedyConfig::default();

        let steps = build_steps(
            &[CheckKind::Bios, CheckKind::Disk],
            &config,
            &hosts,
            &audit,
        )
        .unwrap();
        let names: Vec<&str> = steps.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["disk-free-space", "secure-boot"]);
    }

    #[test]
    fn bios_step_is_lockout_capped() {
        use crate::host::memory::{FixedDiskUsage, MemoryRegistry, MemoryServices, ScriptedRunner};

        let hosts = Hosts {
            registry: Arc::new(MemoryRegistry::new()),
            services: Arc::new(MemoryServices::new()),
            runner: Arc::new(ScriptedRunner::new()),
            disk: Arc::new(FixedDiskUsage::new(100, 50)),
        };
        let audit = Arc::new(AuditLog::stdout());
        let mut config = RemedyConfig::default();
        config.bios.max_attempts = 9;

        let steps = build_steps(&[CheckKind::Bios], &config, &hosts, &audit).unwrap();
        assert_eq!(steps[0].lockout_cap(), Some(bios::PASSWORD_LOCKOUT_CAP));
    }
}
