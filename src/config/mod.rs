use crate::error::{RemedyError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

/// What a registry value is expected to look like on a compliant host.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "value")]
pub enum RegistryExpectation {
    /// The value must not exist (stale policy cleanup).
    Absent,
    Dword(u32),
    Sz(String),
}

/// One entry of the typed registry table a check pack operates on.
/// Validated at startup; no loose property bags.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegistrySetting {
    pub name: String,
    pub path: String,
    pub value_name: String,
    pub expected: RegistryExpectation,
}

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RemedyConfig {
    /// Audit log destination. Defaults to the well-known ProgramData path.
    pub log_file: Option<PathBuf>,

    pub disk: DiskConfig,
    pub update: UpdateConfig,
    pub wsus: WsusConfig,
    pub bios: BiosConfig,
}

impl Default for RemedyConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            disk: DiskConfig::default(),
            update: UpdateConfig::default(),
            wsus: WsusConfig::default(),
            bios: BiosConfig::default(),
        }
    }
}

/// Disk-space check settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DiskConfig {
    pub drive: String,
    /// Below this free-space percentage the host is non-compliant.
    pub min_free_percent: f64,
    /// Sageset profile number shared by the StateFlags values and cleanmgr.
    pub sage_set: u32,
    /// Volume-cache handlers enabled for the cleanup profile.
    pub volume_caches: Vec<String>,
    /// Temp directories purged before cleanmgr runs.
    pub temp_paths: Vec<PathBuf>,
    /// Only files untouched for this many days are purged.
    pub temp_age_days: u32,
    pub max_attempts: u32,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            drive: "C:".to_string(),
            min_free_percent: 10.0,
            sage_set: 112,
            volume_caches: vec![
                "Temporary Files".to_string(),
                "Recycle Bin".to_string(),
                "Update Cleanup".to_string(),
                "Windows Error Reporting Files".to_string(),
                "Delivery Optimization Files".to_string(),
                "Thumbnail Cache".to_string(),
                "Internet Cache Files".to_string(),
            ],
            temp_paths: vec![
                PathBuf::from(r"C:\Windows\Temp"),
                PathBuf::from(r"C:\Windows\SoftwareDistribution\Download"),
            ],
            temp_age_days: 7,
            max_attempts: 1,
        }
    }
}

/// Windows Update client repair settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct UpdateConfig {
    /// Services bounced around the cache rename, in stop order.
    pub services: Vec<String>,
    pub software_distribution: PathBuf,
    pub catroot2: PathBuf,
    /// Update client error events within this window mark the host
    /// non-compliant.
    pub error_window_days: u32,
    /// Seconds to wait for each service to reach the requested state.
    pub service_wait_secs: u64,
    pub max_attempts: u32,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            services: vec![
                "wuauserv".to_string(),
                "bits".to_string(),
                "cryptsvc".to_string(),
            ],
            software_distribution: PathBuf::from(r"C:\Windows\SoftwareDistribution"),
            catroot2: PathBuf::from(r"C:\Windows\System32\catroot2"),
            error_window_days: 7,
            service_wait_secs: 60,
            max_attempts: 2,
        }
    }
}

/// WSUS / WUfB policy hygiene settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct WsusConfig {
    /// Stale policy values that must be absent on a cloud-managed host.
    pub settings: Vec<RegistrySetting>,
    /// Service restarted after the cleanup so the client re-reads policy.
    pub restart_service: String,
    pub max_attempts: u32,
}

impl Default for WsusConfig {
    fn default() -> Self {
        const POLICY: &str = r"HKLM\SOFTWARE\Policies\Microsoft\Windows\WindowsUpdate";
        let absent = |name: &str, path: &str, value_name: &str| RegistrySetting {
            name: name.to_string(),
            path: path.to_string(),
            value_name: value_name.to_string(),
            expected: RegistryExpectation::Absent,
        };
        Self {
            settings: vec![
                absent("wsus-server", POLICY, "WUServer"),
                absent("wsus-status-server", POLICY, "WUStatusServer"),
                absent("wsus-alternate-url", POLICY, "UpdateServiceUrlAlternate"),
                absent("wsus-target-group", POLICY, "TargetGroup"),
                absent("wsus-target-group-enabled", POLICY, "TargetGroupEnabled"),
                absent(
                    "wsus-use-wuserver",
                    r"HKLM\SOFTWARE\Policies\Microsoft\Windows\WindowsUpdate\AU",
                    "UseWUServer",
                ),
            ],
            restart_service: "wuauserv".to_string(),
            max_attempts: 1,
        }
    }
}

/// Lenovo BIOS Secure-Boot settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BiosConfig {
    /// Environment variable holding the supervisor password. The password
    /// itself never lives in the config file.
    pub password_env: String,
    pub max_attempts: u32,
}

impl Default for BiosConfig {
    fn default() -> Self {
        Self {
            password_env: "REMEDYCTL_BIOS_PASSWORD".to_string(),
            max_attempts: 2,
        }
    }
}

impl RemedyConfig {
    /// Startup validation: every retry budget is at least 1 and the
    /// registry table is well-formed with unique names.
    pub fn validate(&self) -> Result<()> {
        for (section, attempts) in [
            ("disk", self.disk.max_attempts),
            ("update", self.update.max_attempts),
            ("wsus", self.wsus.max_attempts),
            ("bios", self.bios.max_attempts),
        ] {
            if attempts == 0 {
                return Err(RemedyError::ConfigError(format!(
                    "{}.max_attempts must be at least 1",
                    section
                )));
            }
        }

        if !(0.0..=100.0).contains(&self.disk.min_free_percent) {
            return Err(RemedyError::ConfigError(format!(
                "disk.min_free_percent must be within 0-100, got {}",
                self.disk.min_free_percent
            )));
        }

        let mut seen = HashSet::new();
        for setting in &self.wsus.settings {
            if setting.name.is_empty() || setting.path.is_empty() || setting.value_name.is_empty() {
                return Err(RemedyError::InvalidCheck(format!(
                    "wsus setting '{}' has an empty field",
                    setting.name
                )));
            }
            if !seen.insert(setting.name.as_str()) {
                return Err(RemedyError::InvalidCheck(format!(
                    "duplicate wsus setting name '{}'",
                    setting.name
                )));
            }
        }

        Ok(())
    }
}

/// Configuration manager
#[derive(Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("com", "resolvetech", "remedyctl").ok_or_else(
            || RemedyError::ConfigError("Failed to determine config directory".into()),
        )?;

        let config_dir = project_dirs.config_dir().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }

        Ok(Self { config_dir })
    }

    pub fn load() -> Result<Self> {
        Self::new()
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Load and validate the config, falling back to defaults when the
    /// file does not exist yet.
    pub fn load_config(&self) -> Result<RemedyConfig> {
        let config_path = self.config_file();

        let config = if config_path.exists() {
            let contents = fs::read_to_string(config_path)?;
            toml::from_str(&contents)?
        } else {
            RemedyConfig::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save_config(&self, config: &RemedyConfig) -> Result<()> {
        let config_path = self.config_file();
        let contents = toml::to_string_pretty(config)
            .map_err(|e| RemedyError::ConfigError(format!("Failed to serialize config: {}", e)))?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// The well-known audit log location the device-management agent's log
    /// collector picks up, unless overridden in config or on the CLI.
    pub fn default_log_path(&self) -> PathBuf {
        if cfg!(windows) {
            PathBuf::from(r"C:\ProgramData\remedyctl\logs\remedyctl.log")
        } else {
            self.config_dir.join("logs").join("remedyctl.log")
        }
    }
}
