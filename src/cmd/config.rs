use clap::Args;
use colored::Colorize;

use remedyctl::config::{ConfigManager, RemedyConfig};
use remedyctl::error::{RemedyError, Result};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

/// Print the effective configuration and where it came from.
pub fn show() -> Result<i32> {
    let manager = ConfigManager::load()?;
    let config = manager.load_config()?;

    let path = manager.config_file();
    if path.exists() {
        println!("{} {}", "Config file:".bold(), path.display());
    } else {
        println!(
            "{} {} (not present, showing defaults)",
            "Config file:".bold(),
            path.display()
        );
    }
    println!("{} {}", "Audit log:".bold(), manager.default_log_path().display());
    println!();

    let rendered = toml::to_string_pretty(&config)
        .map_err(|e| RemedyError::ConfigError(format!("Failed to render config: {}", e)))?;
    println!("{}", rendered);
    Ok(0)
}

/// Write the default configuration file for editing.
pub fn init(args: InitArgs) -> Result<i32> {
    let manager = ConfigManager::load()?;
    let path = manager.config_file();

    if path.exists() && !args.force {
        return Err(RemedyError::ConfigError(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    manager.save_config(&RemedyConfig::default())?;
    println!("{} {}", "Wrote".green().bold(), path.display());
    Ok(0)
}
