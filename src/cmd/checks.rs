use std::sync::Arc;

use colored::Colorize;

use remedyctl::audit::AuditLog;
use remedyctl::checks::{self, CheckKind, Hosts};
use remedyctl::config::ConfigManager;
use remedyctl::error::Result;

/// List the registered checks with their failure policies and budgets.
pub fn list() -> Result<i32> {
    let manager = ConfigManager::load()?;
    let config = manager.load_config()?;

    let hosts = Hosts::system();
    let audit = Arc::new(AuditLog::stdout());
    let steps = checks::build_steps(&CheckKind::all(), &config, &hosts, &audit)?;

    println!("{}", "Registered checks:".bold());
    println!();
    for (kind, step) in CheckKind::all().iter().zip(&steps) {
        let budget = match step.lockout_cap() {
            Some(cap) if cap < step.max_attempts() => {
                format!("{} (lockout-capped from {})", cap, step.max_attempts())
            }
            _ => step.max_attempts().to_string(),
        };
        println!(
            "  {:<8} {:<24} policy: {:<12} attempts: {}",
            kind.label().cyan().bold(),
            step.name(),
            step.policy().label(),
            budget
        );
        println!("           {}", kind.description().dimmed());
    }
    Ok(0)
}
