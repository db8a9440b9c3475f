//! Hub configuration.
//!
//! Loading order (later sources override earlier, objects merged key by key):
//! 1. Global config `~/.config/sbhub/config.json`
//! 2. `SBHUB_CONFIG_CONTENT` environment variable (inline JSON)
//! 3. An explicit config file (`--config`)
//! 4. `SBHUB_STORAGE_ROOT` environment variable

use crate::error::{SandboxError, SandboxResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Inline JSON configuration.
pub const CONFIG_CONTENT_ENV: &str = "SBHUB_CONFIG_CONTENT";
/// Storage root override.
pub const STORAGE_ROOT_ENV: &str = "SBHUB_STORAGE_ROOT";

/// Inclusive host port range for published sandbox ports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: 8000,
            end: 8999,
        }
    }
}

/// Settings shared by every command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HubConfig {
    /// Directory holding sandbox data, snapshots and archives
    pub storage_root: PathBuf,

    /// Mount point of the data directory inside containers
    pub data_mount: String,

    /// Shared bridge network for networked sandboxes
    pub network: String,

    /// Host ports available to networked sandboxes
    pub port_range: PortRange,

    /// Size tier used when none is given
    pub default_size: String,

    /// TTL given to a sandbox recreated by attach or detach
    #[serde(with = "humantime_serde")]
    pub rebind_window: Duration,

    /// Pause between janitor sweeps
    #[serde(with = "humantime_serde")]
    pub janitor_interval: Duration,

    #[serde(with = "humantime_serde")]
    pub pull_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub build_timeout: Duration,

    /// Grace period before a stopping container is killed
    #[serde(with = "humantime_serde")]
    pub stop_grace: Duration,

    /// Retry permission-denied storage operations through `sudo -n`
    pub sudo_fallback: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            data_mount: "/data".to_string(),
            network: "sb-hub-net".to_string(),
            port_range: PortRange::default(),
            default_size: "small".to_string(),
            rebind_window: Duration::from_secs(60 * 60),
            janitor_interval: Duration::from_secs(30),
            pull_timeout: Duration::from_secs(2 * 60),
            build_timeout: Duration::from_secs(10 * 60),
            stop_grace: Duration::from_secs(30),
            sudo_fallback: true,
        }
    }
}

fn default_storage_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("sbhub").join("sandboxes"))
        .unwrap_or_else(|| PathBuf::from(".sbhub").join("sandboxes"))
}

impl HubConfig {
    /// Load configuration from all sources. Returns the files that were read.
    pub async fn load(explicit: Option<&Path>) -> SandboxResult<(Self, Vec<PathBuf>)> {
        let global = Self::global_config_dir().map(|dir| dir.join("config.json"));
        let inline = std::env::var(CONFIG_CONTENT_ENV).ok();
        let storage_root = std::env::var_os(STORAGE_ROOT_ENV).map(PathBuf::from);

        Self::load_layers(global.as_deref(), inline.as_deref(), explicit, storage_root).await
    }

    async fn load_layers(
        global: Option<&Path>,
        inline: Option<&str>,
        explicit: Option<&Path>,
        storage_root: Option<PathBuf>,
    ) -> SandboxResult<(Self, Vec<PathBuf>)> {
        let mut merged = serde_json::to_value(Self::default())?;
        let mut sources = Vec::new();

        if let Some(path) = global.filter(|p| p.exists()) {
            merge_values(&mut merged, Self::read_file(path).await?);
            sources.push(path.to_path_buf());
        }

        if let Some(content) = inline {
            let value = serde_json::from_str(content).map_err(|e| {
                SandboxError::ConfigError(format!("{}: {}", CONFIG_CONTENT_ENV, e))
            })?;
            merge_values(&mut merged, value);
        }

        if let Some(path) = explicit {
            merge_values(&mut merged, Self::read_file(path).await?);
            sources.push(path.to_path_buf());
        }

        let mut config: Self = serde_json::from_value(merged)
            .map_err(|e| SandboxError::ConfigError(e.to_string()))?;

        if let Some(root) = storage_root {
            config.storage_root = root;
        }

        config.validate()?;
        debug!(sources = ?sources, root = %config.storage_root.display(), "Configuration loaded");
        Ok((config, sources))
    }

    async fn read_file(path: &Path) -> SandboxResult<Value> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SandboxError::ConfigError(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| SandboxError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// Get the global config directory.
    ///
    /// On Unix, prefers `~/.config/sbhub` over the platform directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            if let Some(home) = dirs::home_dir() {
                let xdg_config = home.join(".config").join("sbhub");
                if xdg_config.exists() {
                    return Some(xdg_config);
                }
            }
        }

        dirs::config_dir().map(|d| d.join("sbhub"))
    }

    fn validate(&self) -> SandboxResult<()> {
        if self.port_range.start > self.port_range.end {
            return Err(SandboxError::ConfigError(format!(
                "port_range start {} is above end {}",
                self.port_range.start, self.port_range.end
            )));
        }
        if !self.data_mount.starts_with('/') {
            return Err(SandboxError::ConfigError(format!(
                "data_mount '{}' must be an absolute path",
                self.data_mount
            )));
        }
        crate::catalog::lookup(&self.default_size)
            .map_err(|e| SandboxError::ConfigError(format!("default_size: {}", e)))?;
        for (key, value) in [
            ("rebind_window", self.rebind_window),
            ("janitor_interval", self.janitor_interval),
            ("pull_timeout", self.pull_timeout),
            ("build_timeout", self.build_timeout),
        ] {
            if value.is_zero() {
                return Err(SandboxError::ConfigError(format!(
                    "{} must be greater than zero",
                    key
                )));
            }
        }
        Ok(())
    }
}

/// Recursively merge `other` into `base`; objects merge key by key, any
/// other value replaces.
fn merge_values(base: &mut Value, other: Value) {
    match (base, other) {
        (Value::Object(base), Value::Object(other)) => {
            for (key, value) in other {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, other) => *base = other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.data_mount, "/data");
        assert_eq!(config.network, "sb-hub-net");
        assert_eq!(config.port_range, PortRange { start: 8000, end: 8999 });
        assert_eq!(config.rebind_window, Duration::from_secs(3600));
        assert_eq!(config.pull_timeout, Duration::from_secs(120));
        assert!(config.sudo_fallback);
        assert!(config.storage_root.ends_with("sandboxes"));
    }

    #[test]
    fn test_durations_are_human_readable() {
        let config: HubConfig =
            serde_json::from_str(r#"{"janitor_interval": "5m", "stop_grace": "10s"}"#).unwrap();
        assert_eq!(config.janitor_interval, Duration::from_secs(300));
        assert_eq!(config.stop_grace, Duration::from_secs(10));
        assert_eq!(config.network, "sb-hub-net");
    }

    #[test]
    fn test_merge_values_is_deep() {
        let mut base = serde_json::json!({"port_range": {"start": 8000, "end": 8999}, "network": "a"});
        merge_values(&mut base, serde_json::json!({"port_range": {"end": 8100}}));
        assert_eq!(base["port_range"]["start"], 8000);
        assert_eq!(base["port_range"]["end"], 8100);
        assert_eq!(base["network"], "a");
    }

    #[tokio::test]
    async fn test_load_layers_precedence() {
        let dir = TempDir::new().unwrap();
        let global = dir.path().join("global.json");
        let explicit = dir.path().join("explicit.json");
        std::fs::write(&global, r#"{"network": "global-net", "default_size": "large"}"#).unwrap();
        std::fs::write(&explicit, r#"{"network": "explicit-net"}"#).unwrap();

        let (config, sources) = HubConfig::load_layers(
            Some(&global),
            Some(r#"{"default_size": "medium", "janitor_interval": "1m"}"#),
            Some(&explicit),
            Some(PathBuf::from("/srv/sandboxes")),
        )
        .await
        .unwrap();

        assert_eq!(config.network, "explicit-net");
        assert_eq!(config.default_size, "medium");
        assert_eq!(config.janitor_interval, Duration::from_secs(60));
        assert_eq!(config.storage_root, PathBuf::from("/srv/sandboxes"));
        assert_eq!(sources, vec![global, explicit]);
    }

    #[tokio::test]
    async fn test_missing_global_is_skipped() {
        let dir = TempDir::new().unwrap();
        let (config, sources) =
            HubConfig::load_layers(Some(&dir.path().join("absent.json")), None, None, None)
                .await
                .unwrap();
        assert!(sources.is_empty());
        assert_eq!(config.network, "sb-hub-net");
    }

    #[tokio::test]
    async fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = HubConfig::load_layers(None, None, Some(&dir.path().join("nope.json")), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_zero_durations_rejected() {
        let config = HubConfig {
            rebind_window: Duration::ZERO,
            ..HubConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rebind_window"), "{err}");

        let config = HubConfig {
            stop_grace: Duration::ZERO,
            ..HubConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_values_rejected() {
        for inline in [
            r#"{"port_range": {"start": 9000, "end": 8000}}"#,
            r#"{"default_size": "huge"}"#,
            r#"{"data_mount": "data"}"#,
            r#"{"pull_timeout": "soon"}"#,
            r#"{"rebind_window": "0s"}"#,
            r#"{"janitor_interval": "0s"}"#,
            r#"{"build_timeout": "0s"}"#,
            "not json",
        ] {
            let result = HubConfig::load_layers(None, Some(inline), None, None).await;
            assert!(result.is_err(), "{inline}");
        }
    }
}
