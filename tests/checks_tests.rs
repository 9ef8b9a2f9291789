//! Full-stack tests: the built-in check packs wired through the engine
//! against in-memory host fakes.

use std::sync::Arc;

use remedyctl::audit::AuditLog;
use remedyctl::checks::{build_steps, CheckKind, Hosts};
use remedyctl::config::RemedyConfig;
use remedyctl::engine::{ReconciliationEngine, StepState};
use remedyctl::host::memory::{FixedDiskUsage, MemoryRegistry, MemoryServices, ScriptedRunner};
use remedyctl::host::{RegValue, Registry};

fn memory_hosts(disk: FixedDiskUsage) -> (Hosts, Arc<MemoryRegistry>, Arc<ScriptedRunner>) {
    let registry = Arc::new(MemoryRegistry::new());
    let runner = Arc::new(ScriptedRunner::new());
    let hosts = Hosts {
        registry: registry.clone(),
        services: Arc::new(MemoryServices::with_running(&[
            "wuauserv", "bits", "cryptsvc",
        ])),
        runner: runner.clone(),
        disk: Arc::new(disk),
    };
    (hosts, registry, runner)
}

fn engine_for(
    selection: &[CheckKind],
    config: &RemedyConfig,
    hosts: &Hosts,
    audit: &Arc<AuditLog>,
) -> ReconciliationEngine {
    let mut engine = ReconciliationEngine::new();
    for step in build_steps(selection, config, hosts, audit).unwrap() {
        engine.register(step).unwrap();
    }
    engine
}

#[test]
fn wsus_check_converges_on_a_stale_host() {
    let (hosts, registry, _) = memory_hosts(FixedDiskUsage::new(1000, 500));
    let config = RemedyConfig::default();

    let policy = &config.wsus.settings[0];
    registry.set(
        &policy.path,
        &policy.value_name,
        RegValue::Sz("http://wsus.corp.local:8530".into()),
    );

    let audit = Arc::new(AuditLog::stdout());
    let engine = engine_for(&[CheckKind::Wsus], &config, &hosts, &audit);

    // Detect sees the drift without touching it...
    let detected = engine.detect(&audit);
    assert_eq!(detected.exit_code(), 1);
    assert!(registry
        .read_value(&policy.path, &policy.value_name)
        .unwrap()
        .is_some());

    // ...and remediation deletes the value and converges on one attempt.
    let report = engine.run(&audit);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.steps[0].attempts, 1);
    assert!(registry
        .read_value(&policy.path, &policy.value_name)
        .unwrap()
        .is_none());
}

#[test]
fn exhausted_disk_check_does_not_block_wsus_cleanup() {
    // Free space stays below threshold no matter what the corrector does,
    // so the disk step exhausts; the wsus step must still run and converge.
    let (hosts, registry, _) = memory_hosts(FixedDiskUsage::new(1000, 10));
    let config = RemedyConfig::default();

    let policy = &config.wsus.settings[1];
    registry.set(&policy.path, &policy.value_name, RegValue::Sz("stale".into()));

    let audit = Arc::new(AuditLog::stdout());
    let engine = engine_for(&[CheckKind::Disk, CheckKind::Wsus], &config, &hosts, &audit);

    let report = engine.run(&audit);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.steps.len(), 2);

    assert_eq!(report.steps[0].step_name, "disk-free-space");
    assert_eq!(report.steps[0].state, StepState::Exhausted);
    assert_eq!(report.steps[0].attempts, config.disk.max_attempts);

    assert_eq!(report.steps[1].step_name, "wsus-policy");
    assert!(report.steps[1].final_compliant);
    assert!(registry
        .read_value(&policy.path, &policy.value_name)
        .unwrap()
        .is_none());
}

#[test]
fn unreadable_disk_fails_open_and_skips_cleanup() {
    let (hosts, _, runner) = memory_hosts(FixedDiskUsage::failing("CIM query failed"));
    let config = RemedyConfig::default();

    let audit = Arc::new(AuditLog::stdout());
    let engine = engine_for(&[CheckKind::Disk], &config, &hosts, &audit);

    let report = engine.run(&audit);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.steps[0].attempts, 0);
    // Fail-open means cleanmgr was never launched.
    assert!(runner.invocations().is_empty());
}

#[test]
fn bios_check_without_password_exhausts_at_lockout_cap() {
    let (hosts, _, runner) = memory_hosts(FixedDiskUsage::new(1000, 500));
    // Firmware reports Secure Boot disabled.
    runner.respond("powershell", 0, "SecureBoot,Disable\n");

    let mut config = RemedyConfig::default();
    config.bios.max_attempts = 5;
    // Point at a variable that is certainly unset.
    config.bios.password_env = "REMEDYCTL_TEST_NO_SUCH_PASSWORD".into();

    let audit = Arc::new(AuditLog::stdout());
    let engine = engine_for(&[CheckKind::Bios], &config, &hosts, &audit);

    let report = engine.run(&audit);
    assert_eq!(report.exit_code(), 1);
    // Lockout cap wins over the configured budget of 5.
    assert_eq!(report.steps[0].attempts, 2);
    assert_eq!(report.steps[0].state, StepState::Exhausted);
}

#[test]
fn full_selection_reports_steps_in_canonical_order() {
    let (hosts, _, runner) = memory_hosts(FixedDiskUsage::new(1000, 500));
    runner.respond("powershell", 0, "0\n");

    let config = RemedyConfig::default();
    let audit = Arc::new(AuditLog::stdout());
    let engine = engine_for(&CheckKind::all(), &config, &hosts, &audit);

    let report = engine.detect(&audit);
    let names: Vec<&str> = report.steps.iter().map(|s| s.step_name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "disk-free-space",
            "windows-update-health",
            "wsus-policy",
            "secure-boot"
        ]
    );
}
