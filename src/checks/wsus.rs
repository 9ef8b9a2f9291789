//! WSUS / WUfB policy hygiene detect/remediate pair.
//!
//! Hosts migrated from on-prem WSUS to cloud update management keep stale
//! `WUServer`-style policy values that silently point the update client at
//! a server that no longer exists. Detection walks the typed registry table
//! and reports any value out of expectation; remediation enforces the table
//! and bounces the update service so the client re-reads policy.

use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditLog;
use crate::config::{RegistryExpectation, RegistrySetting, WsusConfig};
use crate::engine::{ComplianceResult, CorrectionOutcome, Corrector, FailurePolicy, Probe};
use crate::host::{wait_for, RegValue, Registry, ServiceManager, ServiceState, WaitOutcome};

const SERVICE_POLL: Duration = Duration::from_millis(500);

fn expectation_met(expected: &RegistryExpectation, actual: Option<&RegValue>) -> bool {
    match (expected, actual) {
        (RegistryExpectation::Absent, None) => true,
        (RegistryExpectation::Absent, Some(_)) => false,
        (RegistryExpectation::Dword(want), Some(RegValue::Dword(got))) => want == got,
        (RegistryExpectation::Sz(want), Some(RegValue::Sz(got))) => want == got,
        _ => false,
    }
}

pub struct WsusPolicyProbe {
    settings: Vec<RegistrySetting>,
    registry: Arc<dyn Registry>,
}

impl WsusPolicyProbe {
    pub fn new(settings: Vec<RegistrySetting>, registry: Arc<dyn Registry>) -> Self {
        Self { settings, registry }
    }
}

impl Probe for WsusPolicyProbe {
    fn name(&self) -> &str {
        "wsus-policy"
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::FailClosed
    }

    fn evaluate(&self) -> ComplianceResult {
        let mut violations = Vec::new();
        for setting in &self.settings {
            let actual = match self.registry.read_value(&setting.path, &setting.value_name) {
                Ok(v) => v,
                Err(err) => return ComplianceResult::read_failure(self.policy(), err),
            };
            if !expectation_met(&setting.expected, actual.as_ref()) {
                violations.push(setting.name.clone());
            }
        }

        if violations.is_empty() {
            ComplianceResult::compliant(format!(
                "{} policy value(s) match expectations",
                self.settings.len()
            ))
        } else {
            ComplianceResult::non_compliant(format!(
                "policy drift: {}",
                violations.join(", ")
            ))
        }
    }
}

pub struct WsusCleanupCorrector {
    settings: Vec<RegistrySetting>,
    restart_service: String,
    service_wait: Duration,
    registry: Arc<dyn Registry>,
    services: Arc<dyn ServiceManager>,
    audit: Arc<AuditLog>,
}

impl WsusCleanupCorrector {
    pub fn new(
        config: &WsusConfig,
        registry: Arc<dyn Registry>,
        services: Arc<dyn ServiceManager>,
        audit: Arc<AuditLog>,
        service_wait: Duration,
    ) -> Self {
        Self {
            settings: config.settings.clone(),
            restart_service: config.restart_service.clone(),
            service_wait,
            registry,
            services,
            audit,
        }
    }

    fn enforce(&self, setting: &RegistrySetting, errors: &mut Vec<String>) {
        match &setting.expected {
            RegistryExpectation::Absent => {
                self.audit.record(&format!(
                    "deleting {}\\{} ('{}')",
                    setting.path, setting.value_name, setting.name
                ));
                match self.registry.delete_value(&setting.path, &setting.value_name) {
                    Ok(true) => self.audit.record(&format!("deleted '{}'", setting.name)),
                    Ok(false) => self
                        .audit
                        .record(&format!("'{}' already absent", setting.name)),
                    Err(err) => {
                        self.audit
                            .record(&format!("failed to delete '{}': {}", setting.name, err));
                        errors.push(format!("{}: {}", setting.name, err));
                    }
                }
            }
            expected @ (RegistryExpectation::Dword(_) | RegistryExpectation::Sz(_)) => {
                let value = match expected {
                    RegistryExpectation::Dword(v) => RegValue::Dword(*v),
                    RegistryExpectation::Sz(s) => RegValue::Sz(s.clone()),
                    RegistryExpectation::Absent => unreachable!(),
                };
                self.audit.record(&format!(
                    "setting {}\\{} = {} ('{}')",
                    setting.path, setting.value_name, value, setting.name
                ));
                match self
                    .registry
                    .write_value(&setting.path, &setting.value_name, value)
                {
                    Ok(()) => self.audit.record(&format!("set '{}'", setting.name)),
                    Err(err) => {
                        self.audit
                            .record(&format!("failed to set '{}': {}", setting.name, err));
                        errors.push(format!("{}: {}", setting.name, err));
                    }
                }
            }
        }
    }
}

impl Corrector for WsusCleanupCorrector {
    fn name(&self) -> &str {
        "wsus-policy-cleanup"
    }

    fn apply(&self) -> CorrectionOutcome {
        let mut errors: Vec<String> = Vec::new();

        for setting in &self.settings {
            self.enforce(setting, &mut errors);
        }

        // Bounce the update service so the client drops the cached policy.
        let service = &self.restart_service;
        self.audit.record(&format!("restarting service '{}'", service));
        match self.services.stop(service) {
            Ok(()) => {
                let outcome = wait_for(self.service_wait, SERVICE_POLL, || {
                    self.services
                        .status(service)
                        .map(|s| s == ServiceState::Stopped)
                        .unwrap_or(false)
                });
                if outcome == WaitOutcome::TimedOut {
                    self.audit.record(&format!(
                        "service '{}' slow to stop, starting anyway",
                        service
                    ));
                }
                if let Err(err) = self.services.start(service) {
                    self.audit
                        .record(&format!("failed to start '{}': {}", service, err));
                    errors.push(format!("start {}: {}", service, err));
                } else {
                    self.audit.record(&format!("service '{}' restarted", service));
                }
            }
            Err(err) => {
                self.audit
                    .record(&format!("failed to stop '{}': {}", service, err));
                errors.push(format!("stop {}: {}", service, err));
            }
        }

        if errors.is_empty() {
            CorrectionOutcome::success("policy table enforced and update service restarted")
        } else {
            CorrectionOutcome::failure(
                format!("cleanup completed with {} error(s)", errors.len()),
                errors.join("; "),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::{MemoryRegistry, MemoryServices};

    fn stale_host() -> (Arc<MemoryRegistry>, WsusConfig) {
        let registry = Arc::new(MemoryRegistry::new());
        let config = WsusConfig::default();
        registry.set(
            &config.settings[0].path,
            &config.settings[0].value_name,
            RegValue::Sz("http://wsus.corp.local:8530".into()),
        );
        registry.set(
            &config.settings[5].path,
            &config.settings[5].value_name,
            RegValue::Dword(1),
        );
        (registry, config)
    }

    #[test]
    fn clean_host_is_compliant() {
        let registry = Arc::new(MemoryRegistry::new());
        let probe = WsusPolicyProbe::new(WsusConfig::default().settings, registry);
        assert!(probe.evaluate().compliant);
    }

    #[test]
    fn stale_values_are_reported_by_name() {
        let (registry, config) = stale_host();
        let probe = WsusPolicyProbe::new(config.settings, registry);
        let result = probe.evaluate();
        assert!(!result.compliant);
        assert!(result.detail.contains("wsus-server"));
        assert!(result.detail.contains("wsus-use-wuserver"));
    }

    #[test]
    fn denied_registry_read_fails_closed_through_the_live_adapter() {
        use crate::host::memory::ScriptedRunner;
        use crate::host::system::RegTool;

        // reg.exe's access-denied shape: exit 1, empty stdout, error on
        // stderr. The probe must report non-compliant, not "value absent".
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_failure("reg", 1, "ERROR: Access is denied.\r\n");

        let probe = WsusPolicyProbe::new(
            WsusConfig::default().settings,
            Arc::new(RegTool::new(runner)),
        );
        let result = probe.evaluate();
        assert!(!result.compliant);
        assert!(result.error.as_deref().unwrap().contains("Access is denied"));
    }

    #[test]
    fn registry_failure_fails_closed() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.fail_all("access denied");
        let probe = WsusPolicyProbe::new(WsusConfig::default().settings, registry);
        let result = probe.evaluate();
        assert!(!result.compliant);
        assert!(result.error.as_deref().unwrap().contains("access denied"));
    }

    #[test]
    fn cleanup_converges_to_compliance() {
        let (registry, config) = stale_host();
        let services = Arc::new(MemoryServices::with_running(&["wuauserv"]));
        let corrector = WsusCleanupCorrector::new(
            &config,
            registry.clone(),
            services,
            Arc::new(AuditLog::stdout()),
            Duration::from_secs(1),
        );

        let outcome = corrector.apply();
        assert!(outcome.succeeded, "{:?}", outcome);

        let probe = WsusPolicyProbe::new(config.settings, registry);
        assert!(probe.evaluate().compliant);
    }

    #[test]
    fn cleanup_is_idempotent() {
        let (registry, config) = stale_host();
        let services = Arc::new(MemoryServices::with_running(&["wuauserv"]));
        let corrector = WsusCleanupCorrector::new(
            &config,
            registry.clone(),
            services,
            Arc::new(AuditLog::stdout()),
            Duration::from_secs(1),
        );

        assert!(corrector.apply().succeeded);
        // Second pass from an already-clean state must not regress.
        assert!(corrector.apply().succeeded);
        let probe = WsusPolicyProbe::new(config.settings, registry);
        assert!(probe.evaluate().compliant);
    }
}
