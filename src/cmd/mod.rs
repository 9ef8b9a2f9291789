pub mod checks;
pub mod config;
pub mod detect;
pub mod progress;
pub mod remediate;

use colored::Colorize;
use remedyctl::engine::{EngineReport, StepState};
use remedyctl::error::Result;

/// Render a finished report as a table or JSON.
pub fn render_report(report: &EngineReport, format: &str) -> Result<()> {
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        _ => {
            println!();
            for step in &report.steps {
                let marker = if step.final_compliant {
                    "✓".green()
                } else {
                    "✗".red()
                };
                let state = match step.state {
                    StepState::Compliant => step.state.label().green(),
                    StepState::Skipped => step.state.label().yellow(),
                    _ => step.state.label().red(),
                };
                println!(
                    "  {} {:<24} {:<14} attempts: {}",
                    marker,
                    step.step_name.bold(),
                    state,
                    step.attempts
                );
                for outcome in &step.outcomes {
                    let detail = match &outcome.error {
                        Some(err) => format!("{} ({})", outcome.detail, err),
                        None => outcome.detail.clone(),
                    };
                    println!("      - {}", detail.dimmed());
                }
            }
            println!();
            let verdict = if report.overall_compliant {
                "COMPLIANT".green().bold()
            } else {
                "NON-COMPLIANT".red().bold()
            };
            println!(
                "  {} ({}/{} checks, exit code {})",
                verdict,
                report.compliant_count(),
                report.steps.len(),
                report.exit_code()
            );
        }
    }
    Ok(())
}
