use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use colored::Colorize;

use remedyctl::audit::AuditLog;
use remedyctl::checks::{self, Hosts};
use remedyctl::config::ConfigManager;
use remedyctl::engine::ReconciliationEngine;
use remedyctl::error::Result;

#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Checks to run (comma-separated: disk,update,wsus,bios). Default: all
    #[arg(long)]
    pub check: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Audit log path (default: well-known ProgramData location)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Probe-only compliance pass: the "detect" half of the Intune pair.
/// Exits 0 when every selected check is compliant, 1 otherwise.
pub fn detect(args: DetectArgs) -> Result<i32> {
    let manager = ConfigManager::load()?;
    let config = manager.load_config()?;

    let selection = checks::parse_selection(args.check.as_deref())?;
    let log_path = args
        .log_file
        .or_else(|| config.log_file.clone())
        .unwrap_or_else(|| manager.default_log_path());
    let audit = Arc::new(AuditLog::open(&log_path));

    if args.format != "json" {
        println!(
            "{} {} check(s)...",
            "Detecting".cyan().bold(),
            selection.len()
        );
    }

    let hosts = Hosts::system();
    let mut engine = ReconciliationEngine::new();
    for step in checks::build_steps(&selection, &config, &hosts, &audit)? {
        engine.register(step)?;
    }

    let report = engine.detect(&audit);
    super::render_report(&report, &args.format)?;
    Ok(report.exit_code())
}
