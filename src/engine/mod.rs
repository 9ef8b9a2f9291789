//! The detect/remediate reconciliation engine.
//!
//! One engine run walks an ordered list of steps. Each step probes one
//! piece of host state; if it is out of policy the step's corrector is
//! invoked up to the step's retry budget, re-probing after every attempt.
//! Steps are independent: exhausting one never blocks the next, and the
//! aggregate verdict is the AND over all step verdicts.
//!
//! Execution is strictly sequential and single-threaded. Correctors mutate
//! shared host resources (registry keys, services, files), so running two
//! steps concurrently could corrupt state; sequencing is a correctness
//! requirement here, not a simplification.

mod corrector;
mod probe;
mod report;

pub use corrector::{CorrectionOutcome, Corrector};
pub use probe::{ComplianceResult, FailurePolicy, Probe};
pub use report::{EngineReport, StepResult, StepState};

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::audit::AuditLog;
use crate::error::{RemedyError, Result};

/// One probe paired with the corrector that fixes it, plus the retry policy.
/// Configured once at startup and never mutated afterwards.
pub struct ReconciliationStep {
    probe: Box<dyn Probe>,
    corrector: Box<dyn Corrector>,
    max_attempts: u32,
    lockout_cap: Option<u32>,
}

impl ReconciliationStep {
    pub fn new(
        probe: Box<dyn Probe>,
        corrector: Box<dyn Corrector>,
        max_attempts: u32,
    ) -> Result<Self> {
        if max_attempts == 0 {
            return Err(RemedyError::InvalidCheck(format!(
                "step '{}': max_attempts must be at least 1",
                probe.name()
            )));
        }
        Ok(Self {
            probe,
            corrector,
            max_attempts,
            lockout_cap: None,
        })
    }

    /// A stricter safety cap layered on top of the generic retry budget,
    /// for correctors where excess attempts are dangerous in themselves
    /// (a BIOS supervisor password locks out after repeated failures).
    /// The cap can only lower the effective budget, never raise it.
    pub fn with_lockout_cap(mut self, cap: u32) -> Self {
        self.lockout_cap = Some(cap.max(1));
        self
    }

    /// The step is named after its probe.
    pub fn name(&self) -> &str {
        self.probe.name()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn lockout_cap(&self) -> Option<u32> {
        self.lockout_cap
    }

    pub fn policy(&self) -> FailurePolicy {
        self.probe.policy()
    }

    fn budget(&self) -> u32 {
        match self.lockout_cap {
            Some(cap) => self.max_attempts.min(cap),
            None => self.max_attempts,
        }
    }
}

/// Cooperative cancellation, checked between steps only. A corrector in
/// progress always completes or fails on its own terms first, so the host
/// is never left half-mutated by an early stop.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Orchestrates an ordered list of [`ReconciliationStep`]s.
#[derive(Default)]
pub struct ReconciliationEngine {
    steps: Vec<ReconciliationStep>,
    cancel: Option<CancelFlag>,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Register a step. Order matters and is preserved exactly; names must
    /// be unique within the engine.
    pub fn register(&mut self, step: ReconciliationStep) -> Result<()> {
        if self.steps.iter().any(|s| s.name() == step.name()) {
            return Err(RemedyError::InvalidCheck(format!(
                "duplicate check name '{}'",
                step.name()
            )));
        }
        self.steps.push(step);
        Ok(())
    }

    pub fn steps(&self) -> &[ReconciliationStep] {
        &self.steps
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }

    /// Probe-only pass: the "detect" half of a detect/remediate pair.
    /// No corrector is ever invoked.
    pub fn detect(&self, audit: &AuditLog) -> EngineReport {
        let started_at = Utc::now();
        audit.record(&format!("detect run started ({} checks)", self.steps.len()));

        let mut results = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            if self.cancelled() {
                audit.record(&format!("run cancelled, skipping '{}'", step.name()));
                results.push(StepResult::skipped(step.name()));
                continue;
            }

            let verdict = self.probe_guarded(step, audit);
            let state = if verdict.compliant {
                StepState::Compliant
            } else {
                StepState::NonCompliant
            };
            results.push(StepResult {
                step_name: step.name().to_string(),
                initial_compliant: verdict.compliant,
                attempts: 0,
                final_compliant: verdict.compliant,
                state,
                outcomes: Vec::new(),
            });
        }

        self.finish(results, started_at, audit, "detect")
    }

    /// Full reconciliation pass: probe, correct up to the budget, re-probe.
    pub fn run(&self, audit: &AuditLog) -> EngineReport {
        let started_at = Utc::now();
        audit.record(&format!(
            "remediation run started ({} checks)",
            self.steps.len()
        ));

        let mut results = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            if self.cancelled() {
                audit.record(&format!("run cancelled, skipping '{}'", step.name()));
                results.push(StepResult::skipped(step.name()));
                continue;
            }
            results.push(self.run_step(step, audit));
        }

        self.finish(results, started_at, audit, "remediation")
    }

    fn finish(
        &self,
        steps: Vec<StepResult>,
        started_at: chrono::DateTime<Utc>,
        audit: &AuditLog,
        kind: &str,
    ) -> EngineReport {
        let overall_compliant = steps.iter().all(|s| s.final_compliant);
        audit.record(&format!(
            "{} run finished: {}/{} compliant, exit code {}",
            kind,
            steps.iter().filter(|s| s.final_compliant).count(),
            steps.len(),
            if overall_compliant { 0 } else { 1 }
        ));
        EngineReport {
            steps,
            overall_compliant,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn run_step(&self, step: &ReconciliationStep, audit: &AuditLog) -> StepResult {
        let initial = self.probe_guarded(step, audit);
        if initial.compliant {
            return StepResult {
                step_name: step.name().to_string(),
                initial_compliant: true,
                attempts: 0,
                final_compliant: true,
                state: StepState::Compliant,
                outcomes: Vec::new(),
            };
        }

        let budget = step.budget();
        let mut attempts = 0;
        let mut outcomes = Vec::new();
        let mut final_compliant = false;

        while attempts < budget {
            attempts += 1;
            audit.record(&format!(
                "'{}': correction attempt {}/{}",
                step.name(),
                attempts,
                budget
            ));

            let outcome = self.correct_guarded(step, audit);
            outcomes.push(outcome);

            let reprobe = self.probe_guarded(step, audit);
            if reprobe.compliant {
                final_compliant = true;
                break;
            }
        }

        if !final_compliant {
            audit.record(&format!(
                "'{}': retry budget exhausted after {} attempts, still non-compliant",
                step.name(),
                attempts
            ));
        }

        StepResult {
            step_name: step.name().to_string(),
            initial_compliant: false,
            attempts,
            final_compliant,
            state: if final_compliant {
                StepState::Compliant
            } else {
                StepState::Exhausted
            },
            outcomes,
        }
    }

    /// Evaluate the probe, containing any panic at the step boundary. A
    /// panicking probe resolves through its own failure policy instead of
    /// taking the run down.
    fn probe_guarded(&self, step: &ReconciliationStep, audit: &AuditLog) -> ComplianceResult {
        let result = panic::catch_unwind(AssertUnwindSafe(|| step.probe.evaluate()))
            .unwrap_or_else(|payload| {
                let msg = panic_message(payload);
                audit.record(&format!(
                    "'{}': internal error during probe: {}",
                    step.name(),
                    msg
                ));
                ComplianceResult::read_failure(step.probe.policy(), msg)
            });

        match &result.error {
            Some(err) => audit.record(&format!(
                "'{}': probe {} ({}) [{}]",
                step.name(),
                if result.compliant {
                    "compliant"
                } else {
                    "non-compliant"
                },
                result.detail,
                err
            )),
            None => audit.record(&format!(
                "'{}': probe {} ({})",
                step.name(),
                if result.compliant {
                    "compliant"
                } else {
                    "non-compliant"
                },
                result.detail
            )),
        }
        result
    }

    /// Apply the corrector, containing any panic as a failed attempt.
    fn correct_guarded(&self, step: &ReconciliationStep, audit: &AuditLog) -> CorrectionOutcome {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| step.corrector.apply()))
            .unwrap_or_else(|payload| {
                let msg = panic_message(payload);
                audit.record(&format!(
                    "'{}': internal error during correction: {}",
                    step.name(),
                    msg
                ));
                CorrectionOutcome::failure("correction attempt aborted", msg)
            });

        audit.record(&format!(
            "'{}': correction {} ({})",
            step.name(),
            if outcome.succeeded { "succeeded" } else { "failed" },
            outcome.detail
        ));
        outcome
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
