//! Configuration management for blockd.
//!
//! The config file is optional: a missing file yields the platform defaults
//! so the daemon can start on a freshly installed host. A file that exists
//! but does not parse or validate is a startup error.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[cfg(not(windows))]
pub const DEFAULT_CONFIG_PATH: &str = "/etc/blockd/config.yaml";
#[cfg(windows)]
pub const DEFAULT_CONFIG_PATH: &str = r"C:\ProgramData\blockd\config.yaml";

#[cfg(not(windows))]
const DEFAULT_SOCKET_PATH: &str = "/var/run/blockd.sock";
#[cfg(windows)]
const DEFAULT_SOCKET_PATH: &str = r"\\.\pipe\blockd";

#[cfg(not(windows))]
const DEFAULT_STATE_FILE: &str = "/var/lib/blockd/state.json";
#[cfg(windows)]
const DEFAULT_STATE_FILE: &str = r"C:\ProgramData\blockd\state.json";

#[cfg(not(windows))]
const DEFAULT_HOSTS_FILE: &str = "/etc/hosts";
#[cfg(windows)]
const DEFAULT_HOSTS_FILE: &str = r"C:\Windows\System32\drivers\etc\hosts";

const MIN_TICK_INTERVAL_MS: u64 = 100;
const MAX_TICK_INTERVAL_MS: u64 = 60_000;
const MAX_DNS_TIMEOUT_SECS: u64 = 60;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// IPC endpoint: Unix socket path, or named pipe name on Windows
    pub socket_path: PathBuf,

    /// Permission bits of the Unix socket file
    pub socket_mode: u32,

    /// Persisted block state
    pub state_file: PathBuf,

    /// System hosts file
    pub hosts_file: PathBuf,

    /// Reconciliation tick interval in milliseconds
    pub tick_interval_ms: u64,

    /// Firewall backend (auto, nftables, pf, netsh, none)
    pub firewall: Backend,

    /// Flush the OS DNS cache after applying or clearing a block
    pub flush_dns: bool,

    /// Per-lookup timeout when resolving blocked domains for firewall rules
    pub dns_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            socket_mode: 0o666,
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            hosts_file: PathBuf::from(DEFAULT_HOSTS_FILE),
            tick_interval_ms: 1_000,
            firewall: Backend::Auto,
            flush_dns: true,
            dns_timeout_secs: crate::dns::DNS_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, falling back to defaults when the
    /// file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(MIN_TICK_INTERVAL_MS..=MAX_TICK_INTERVAL_MS).contains(&self.tick_interval_ms) {
            bail!(
                "Invalid tick_interval_ms {}. Must be between {} and {}",
                self.tick_interval_ms,
                MIN_TICK_INTERVAL_MS,
                MAX_TICK_INTERVAL_MS
            );
        }

        if self.dns_timeout_secs == 0 || self.dns_timeout_secs > MAX_DNS_TIMEOUT_SECS {
            bail!(
                "Invalid dns_timeout_secs {}. Must be between 1 and {}",
                self.dns_timeout_secs,
                MAX_DNS_TIMEOUT_SECS
            );
        }

        if self.socket_mode > 0o777 {
            bail!("Invalid socket_mode {:o}. Must be at most 777", self.socket_mode);
        }

        if self.socket_path.as_os_str().is_empty() {
            bail!("socket_path cannot be empty");
        }

        if self.state_file.as_os_str().is_empty() {
            bail!("state_file cannot be empty");
        }

        if self.hosts_file.as_os_str().is_empty() {
            bail!("hosts_file cannot be empty");
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.dns_timeout_secs)
    }

    /// Save configuration to YAML file atomically
    ///
    /// Uses tempfile + rename pattern to prevent corruption on crash.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let path = path.as_ref();
        let content = serde_yaml::to_string(self).with_context(|| "Failed to serialize config")?;

        let parent_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent_dir)
            .with_context(|| format!("Failed to create config directory {:?}", parent_dir))?;

        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .context("Failed to create temporary file for config")?;

        temp_file.write_all(content.as_bytes())?;
        temp_file.as_file().sync_all()?;

        temp_file
            .persist(path)
            .with_context(|| format!("Failed to persist config file: {:?}", path))?;

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Pick the platform's firewall if its tool is present, else none
    #[default]
    Auto,
    /// Linux nftables (`inet blockd` table)
    Nftables,
    /// macOS packet filter (`blockd` anchor)
    Pf,
    /// Windows Firewall via `netsh advfirewall`
    Netsh,
    /// Hosts file only
    None,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Backend::Auto => "auto",
            Backend::Nftables => "nftables",
            Backend::Pf => "pf",
            Backend::Netsh => "netsh",
            Backend::None => "none",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.firewall, Backend::Auto);
        assert!(config.flush_dns);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "firewall: none\ntick_interval_ms: 250\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.firewall, Backend::None);
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.hosts_file, Config::default().hosts_file);
    }

    #[test]
    fn test_load_invalid_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "firewall: [unterminated").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_load_unknown_backend() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "firewall: iptables\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut config = Config::default();
        config.tick_interval_ms = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tick_interval_ms = 120_000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.dns_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.socket_mode = 0o1777;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.hosts_file = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etc/config.yaml");

        let config = Config {
            firewall: Backend::Nftables,
            flush_dns: false,
            ..Config::default()
        };
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_backend_display_matches_serde() {
        for backend in [
            Backend::Auto,
            Backend::Nftables,
            Backend::Pf,
            Backend::Netsh,
            Backend::None,
        ] {
            let yaml = serde_yaml::to_string(&backend).unwrap();
            assert_eq!(yaml.trim(), backend.to_string());
        }
    }
}
