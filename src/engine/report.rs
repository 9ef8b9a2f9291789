use chrono::{DateTime, Utc};
use serde::Serialize;

use super::corrector::CorrectionOutcome;

/// Where a step ended up. The full machine is
/// `NotStarted -> Probing -> {Compliant | NonCompliant} -> Correcting ->
/// Reprobing -> {Compliant | Exhausted}`; only the terminal states appear
/// in reports, the transient ones show up as audit lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepState {
    /// Probe passed, either initially or after correction.
    Compliant,
    /// Non-compliant and the retry budget is spent.
    Exhausted,
    /// Probe-only run found the step non-compliant; nothing was corrected.
    NonCompliant,
    /// The run was cancelled before this step started.
    Skipped,
}

impl StepState {
    pub fn label(self) -> &'static str {
        match self {
            StepState::Compliant => "compliant",
            StepState::Exhausted => "exhausted",
            StepState::NonCompliant => "non-compliant",
            StepState::Skipped => "skipped",
        }
    }
}

/// Outcome of one step within one engine run. Created fresh per run,
/// immutable once the step finishes.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step_name: String,
    pub initial_compliant: bool,
    /// Corrector invocations actually made; bounded by the step budget.
    pub attempts: u32,
    pub final_compliant: bool,
    pub state: StepState,
    pub outcomes: Vec<CorrectionOutcome>,
}

impl StepResult {
    pub(crate) fn skipped(step_name: &str) -> Self {
        Self {
            step_name: step_name.to_string(),
            initial_compliant: false,
            attempts: 0,
            final_compliant: false,
            state: StepState::Skipped,
            outcomes: Vec::new(),
        }
    }
}

/// Everything one engine run produced, in registration order. Owned by the
/// caller once the run returns; the engine keeps nothing between runs.
#[derive(Debug, Serialize)]
pub struct EngineReport {
    pub steps: Vec<StepResult>,
    pub overall_compliant: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl EngineReport {
    /// The detect/remediate contract the calling agent consumes:
    /// 0 = compliant, 1 = non-compliant or unverified.
    pub fn exit_code(&self) -> i32 {
        if self.overall_compliant {
            0
        } else {
            1
        }
    }

    pub fn compliant_count(&self) -> usize {
        self.steps.iter().filter(|s| s.final_compliant).count()
    }
}
