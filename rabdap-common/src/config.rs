//! Configuration loading and config file resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "RABDAP_CONFIG";

/// Environment variable overriding the directory bind password
pub const PASSWORD_ENV_VAR: &str = "RABDAP_LDAP_PASSWORD";

/// Service configuration (TOML)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub directory: DirectoryConfig,
    pub refresh: RefreshConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address for the HTTP API
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5730".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: get_default_data_folder().join("rabdap.db"),
        }
    }
}

/// Directory (LDAP) connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Server URL, `ldap://` or `ldaps://`
    pub url: String,
    /// Bind user (`cn`)
    pub user: String,
    /// Bind user's group (`ou`)
    pub user_group: String,
    pub password: Option<String>,
    /// Domain components appended to the bind DN
    pub domain: String,
    pub search_base: String,
    /// Delay observed before every directory query
    pub throttle_ms: u64,
    /// Idle period after which the connection is closed
    pub idle_timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: "ldaps://ldap.brown.edu:636".to_string(),
            user: String::new(),
            user_group: String::new(),
            password: None,
            domain: "dc=brown,dc=edu".to_string(),
            search_base: "ou=people,dc=brown,dc=edu".to_string(),
            throttle_ms: 500,
            idle_timeout_secs: 300,
        }
    }
}

impl DirectoryConfig {
    /// Bind DN built from user, group and domain
    pub fn bind_dn(&self) -> String {
        format!("cn={},ou={},{}", self.user, self.user_group, self.domain)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Scheduled batch refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Seconds between scheduled refreshes; 0 disables the schedule
    pub interval_secs: u64,
    /// Entries not updated for this many days are refreshed
    pub stale_after_days: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 0,
            stale_after_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing level when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the resolved config file, or compiled defaults if there is none
    ///
    /// A missing file is not an error; an unreadable or invalid one is.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            _ => {
                tracing::debug!("No config file, using compiled defaults");
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Apply environment overrides (secrets are kept out of config files)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var(PASSWORD_ENV_VAR) {
            if !password.is_empty() {
                self.directory.password = Some(password);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.directory.url.trim().is_empty() {
            return Err(Error::Config("directory.url must not be empty".to_string()));
        }
        if !(self.directory.url.starts_with("ldap://") || self.directory.url.starts_with("ldaps://")) {
            return Err(Error::Config(format!(
                "directory.url must use ldap:// or ldaps://, got {}",
                self.directory.url
            )));
        }
        if self.directory.throttle_ms == 0 {
            return Err(Error::Config("directory.throttle_ms must be positive".to_string()));
        }
        if self.directory.idle_timeout_secs == 0 {
            return Err(Error::Config("directory.idle_timeout_secs must be positive".to_string()));
        }
        if self.refresh.stale_after_days == 0 {
            return Err(Error::Config("refresh.stale_after_days must be positive".to_string()));
        }
        Ok(())
    }
}

/// Config file resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. Platform config file, if present
///
/// Returns `None` when nothing is configured; callers fall back to
/// compiled defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config file
    platform_config_file()
}

/// Existing platform config file, user config before system config
fn platform_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("rabdap").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/rabdap/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default data folder
fn get_default_data_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/rabdap (or /var/lib/rabdap for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("rabdap"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/rabdap"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("rabdap"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/rabdap"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("rabdap"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\rabdap"))
    } else {
        PathBuf::from("./rabdap_data")
    }
}
