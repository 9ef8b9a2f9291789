use serde::{Deserialize, Serialize};

/// Default verdict assumed when a probe's underlying read fails.
///
/// The source fleet was inconsistent about this (disk-space checks assumed
/// compliant on a failed read, everything else assumed non-compliant), so
/// the policy is an explicit, named property of every probe rather than an
/// accidental default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// A failed read counts as compliant; remediation is skipped.
    FailOpen,
    /// A failed read counts as non-compliant; remediation is triggered.
    FailClosed,
}

impl FailurePolicy {
    pub fn verdict(self) -> bool {
        matches!(self, FailurePolicy::FailOpen)
    }

    pub fn label(self) -> &'static str {
        match self {
            FailurePolicy::FailOpen => "fail-open",
            FailurePolicy::FailClosed => "fail-closed",
        }
    }
}

/// Verdict of one probe evaluation. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceResult {
    pub compliant: bool,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComplianceResult {
    pub fn compliant(detail: impl Into<String>) -> Self {
        Self {
            compliant: true,
            detail: detail.into(),
            error: None,
        }
    }

    pub fn non_compliant(detail: impl Into<String>) -> Self {
        Self {
            compliant: false,
            detail: detail.into(),
            error: None,
        }
    }

    /// The underlying read failed; resolve the verdict through the probe's
    /// failure policy and keep the error for the audit trail.
    pub fn read_failure(policy: FailurePolicy, error: impl ToString) -> Self {
        Self {
            compliant: policy.verdict(),
            detail: format!("read failed, {} policy applied", policy.label()),
            error: Some(error.to_string()),
        }
    }
}

/// A named, idempotent, read-only inspection of one piece of host state.
///
/// `evaluate` must not panic for expected failure modes (missing registry
/// key, stopped service, unreadable counter); those resolve through
/// [`ComplianceResult::read_failure`] with the probe's policy. The engine
/// still contains a genuine panic at the step boundary as a last resort.
pub trait Probe {
    /// Unique within an engine run; doubles as the step name.
    fn name(&self) -> &str;

    fn policy(&self) -> FailurePolicy;

    fn evaluate(&self) -> ComplianceResult;
}
