use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use colored::Colorize;
use dialoguer::Confirm;

use remedyctl::audit::AuditLog;
use remedyctl::checks::{self, Hosts};
use remedyctl::config::ConfigManager;
use remedyctl::engine::ReconciliationEngine;
use remedyctl::error::Result;

use super::progress;

#[derive(Args, Debug)]
pub struct RemediateArgs {
    /// Checks to run (comma-separated: disk,update,wsus,bios). Default: all
    #[arg(long)]
    pub check: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Probe only and report what would be corrected; mutate nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Audit log path (default: well-known ProgramData location)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Full reconciliation pass: probe, correct within each step's budget,
/// re-probe. Exits 0 when the host converged, 1 otherwise.
pub fn remediate(args: RemediateArgs) -> Result<i32> {
    let manager = ConfigManager::load()?;
    let config = manager.load_config()?;

    let selection = checks::parse_selection(args.check.as_deref())?;
    let log_path = args
        .log_file
        .or_else(|| config.log_file.clone())
        .unwrap_or_else(|| manager.default_log_path());

    // Dry runs keep the real log clean and echo everything to the console.
    let audit = if args.dry_run {
        Arc::new(AuditLog::stdout())
    } else {
        Arc::new(AuditLog::open(&log_path))
    };

    let hosts = Hosts::system();
    let mut engine = ReconciliationEngine::new();
    for step in checks::build_steps(&selection, &config, &hosts, &audit)? {
        engine.register(step)?;
    }

    if args.dry_run {
        println!(
            "{} probing {} check(s), no changes will be made",
            "Dry run:".yellow().bold(),
            engine.steps().len()
        );
        let report = engine.detect(&audit);
        super::render_report(&report, &args.format)?;
        return Ok(report.exit_code());
    }

    if !args.yes && args.format != "json" {
        let proceed = Confirm::new()
            .with_prompt(format!(
                "Remediate {} check(s) on this host? This mutates registry keys, services, and files",
                engine.steps().len()
            ))
            .default(false)
            .interact()?;
        if !proceed {
            println!("{}", "Aborted, nothing changed".yellow());
            return Ok(1);
        }
    }

    let interactive = args.format != "json";
    let spinner = interactive.then(|| progress::create_spinner("Reconciling host state..."));

    let report = engine.run(&audit);

    if let Some(spinner) = spinner {
        if report.overall_compliant {
            progress::finish_spinner_success(&spinner, "Host is compliant");
        } else {
            progress::finish_spinner_error(&spinner, "Host is still non-compliant");
        }
    }

    super::render_report(&report, &args.format)?;
    if interactive {
        if let Some(path) = audit.path() {
            println!("  Audit log: {}", path.display().to_string().dimmed());
        }
    }
    Ok(report.exit_code())
}
