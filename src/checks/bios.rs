//! Lenovo BIOS Secure-Boot detect/remediate pair.
//!
//! Firmware state is reached through the Lenovo WMI classes, invoked as
//! opaque PowerShell calls. The corrector authenticates with the BIOS
//! supervisor password; repeated failed attempts lock the firmware, so the
//! step carries a hard lockout cap on top of the configured retry budget.

use std::sync::Arc;

use crate::audit::AuditLog;
use crate::engine::{ComplianceResult, CorrectionOutcome, Corrector, FailurePolicy, Probe};
use crate::host::ProcessRunner;

/// Hard ceiling on supervisor-password attempts per run. Lenovo firmware
/// locks the supervisor password after repeated failures, which bricks
/// remote remediation entirely; this cap always wins over `max_attempts`.
pub const PASSWORD_LOCKOUT_CAP: u32 = 2;

const WMI_NAMESPACE: &str = r"root\wmi";

pub struct SecureBootProbe {
    runner: Arc<dyn ProcessRunner>,
}

impl SecureBootProbe {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

impl Probe for SecureBootProbe {
    fn name(&self) -> &str {
        "secure-boot"
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::FailClosed
    }

    fn evaluate(&self) -> ComplianceResult {
        let script = format!(
            "(Get-CimInstance -Namespace {} -ClassName Lenovo_BiosSetting | Where-Object {{ $_.CurrentSetting -like 'SecureBoot,*' }}).CurrentSetting",
            WMI_NAMESPACE
        );
        let out = match self.runner.run("powershell", &["-NoProfile", "-Command", &script]) {
            Ok(out) if out.success() => out,
            Ok(out) => {
                return ComplianceResult::read_failure(
                    self.policy(),
                    format!("WMI query exited {}: {}", out.exit_code, out.stderr.trim()),
                )
            }
            Err(err) => return ComplianceResult::read_failure(self.policy(), err),
        };

        // The setting reads `SecureBoot,Enable` or `SecureBoot,Disable`.
        let setting = out.stdout.trim();
        if setting.is_empty() {
            return ComplianceResult::read_failure(
                self.policy(),
                "no SecureBoot setting reported (not a Lenovo BIOS?)",
            );
        }
        let state = setting.split(',').nth(1).unwrap_or("").trim();
        match state {
            "Enable" | "Enabled" => {
                ComplianceResult::compliant("Secure Boot is enabled in firmware")
            }
            "Disable" | "Disabled" => {
                ComplianceResult::non_compliant("Secure Boot is disabled in firmware")
            }
            other => ComplianceResult::read_failure(
                self.policy(),
                format!("unrecognized SecureBoot state: {:?}", other),
            ),
        }
    }
}

pub struct SecureBootCorrector {
    runner: Arc<dyn ProcessRunner>,
    password: Option<String>,
    audit: Arc<AuditLog>,
}

impl SecureBootCorrector {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        password: Option<String>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            runner,
            password,
            audit,
        }
    }

    fn invoke(&self, class: &str, method: &str, parameter: &str) -> Result<String, String> {
        let script = format!(
            "(Get-CimInstance -Namespace {} -ClassName {} | Invoke-CimMethod -MethodName {} -Arguments @{{ parameter = '{}' }}).return",
            WMI_NAMESPACE, class, method, parameter
        );
        match self.runner.run("powershell", &["-NoProfile", "-Command", &script]) {
            Ok(out) if out.success() => Ok(out.stdout.trim().to_string()),
            Ok(out) => Err(format!(
                "{} exited {}: {}",
                method,
                out.exit_code,
                out.stderr.trim()
            )),
            Err(err) => Err(err.to_string()),
        }
    }
}

impl Corrector for SecureBootCorrector {
    fn name(&self) -> &str {
        "secure-boot-enable"
    }

    fn apply(&self) -> CorrectionOutcome {
        let password = match &self.password {
            Some(p) if !p.is_empty() => p,
            _ => {
                // Without credentials an attempt would still count against
                // the firmware lockout, so refuse outright.
                self.audit
                    .record("secure boot correction skipped: no supervisor password available");
                return CorrectionOutcome::failure(
                    "supervisor password not available",
                    "set the configured password environment variable",
                );
            }
        };

        // The password itself never reaches the audit log.
        self.audit
            .record("setting firmware SecureBoot=Enable (supervisor password redacted)");
        if let Err(err) = self.invoke(
            "Lenovo_SetBiosSetting",
            "SetBiosSetting",
            &format!("SecureBoot,Enable,{},ascii,us", password),
        ) {
            self.audit.record(&format!("SetBiosSetting failed: {}", err));
            return CorrectionOutcome::failure("failed to stage SecureBoot setting", err);
        }
        self.audit.record("SecureBoot setting staged");

        self.audit.record("saving BIOS settings");
        match self.invoke(
            "Lenovo_SaveBiosSettings",
            "SaveBiosSettings",
            &format!("{},ascii,us", password),
        ) {
            Ok(ret) if ret == "Success" => {
                self.audit
                    .record("BIOS settings saved; change takes effect at next boot");
                CorrectionOutcome::success("Secure Boot enabled, pending reboot")
            }
            Ok(ret) => {
                self.audit
                    .record(&format!("SaveBiosSettings returned {:?}", ret));
                CorrectionOutcome::failure("firmware rejected the save", ret)
            }
            Err(err) => {
                self.audit.record(&format!("SaveBiosSettings failed: {}", err));
                CorrectionOutcome::failure("failed to save BIOS settings", err)
            }
        }
    }
}
