mod cmd;

use clap::{Parser, Subcommand};
use colored::Colorize;

#[derive(Parser, Debug)]
#[command(
    name = "remedyctl",
    about = "Detect and remediate Windows endpoint compliance",
    version,
    long_about = "Detect/remediate automation for Windows endpoints\n\n\
                  Runs the disk-space, Windows Update, WSUS policy, and BIOS Secure Boot\n\
                  checks as a single sequential reconciliation pass, reporting the 0/1\n\
                  exit-code contract consumed by Intune-style remediation scripts."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Probe compliance without changing anything (exit 0 = compliant)
    Detect(cmd::detect::DetectArgs),

    /// Probe and correct drift within each check's retry budget
    Remediate(cmd::remediate::RemediateArgs),

    /// List the available checks, their policies, and retry budgets
    Checks,

    /// Inspect or initialize the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write the default configuration file
    Init(cmd::config::InitArgs),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Detect(args) => cmd::detect::detect(args),
        Commands::Remediate(args) => cmd::remediate::remediate(args),
        Commands::Checks => cmd::checks::list(),
        Commands::Config(ConfigCommands::Show) => cmd::config::show(),
        Commands::Config(ConfigCommands::Init(args)) => cmd::config::init(args),
    };

    // 0/1 are the compliance contract; 2 is reserved for usage and
    // configuration failures so the agent can tell them apart.
    let code = match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {}", "Error:".red().bold(), err);
            2
        }
    };
    std::process::exit(code);
}
