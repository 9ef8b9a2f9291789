use serde::Serialize;

/// Result of one correction attempt. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionOutcome {
    pub succeeded: bool,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CorrectionOutcome {
    pub fn success(detail: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            detail: detail.into(),
            error: None,
        }
    }

    pub fn failure(detail: impl Into<String>, error: impl ToString) -> Self {
        Self {
            succeeded: false,
            detail: detail.into(),
            error: Some(error.to_string()),
        }
    }
}

/// A named, state-mutating remediation action.
///
/// One call is one attempt from the host's *current* state; retries belong
/// to the engine, never to the corrector. A corrector must audit every
/// externally visible action (file renamed, value deleted, service stopped)
/// before and after performing it, so a partial failure mid-sequence is
/// still diagnosable from the log alone.
pub trait Corrector {
    fn name(&self) -> &str;

    fn apply(&self) -> CorrectionOutcome;
}
