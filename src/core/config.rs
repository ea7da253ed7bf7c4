// ! Runtime configuration
// !
// ! Module handles the host-level settings file for the plugin runtime:
// ! discovery directory, hot reload, health monitoring, reload transaction
// ! limits, version history and logging. YAML and JSON are both accepted,
// ! chosen by file extension.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::error::{PluginError, PluginResult};

/// Top-level runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Directory scanned for plugin configuration files
    #[serde(default = "default_plugin_dir")]
    pub plugin_dir: PathBuf,

    /// Hot reload settings
    #[serde(default)]
    pub hot_reload: HotReloadSettings,

    /// Health monitoring settings
    #[serde(default)]
    pub health: HealthSettings,

    /// Reload transaction settings
    #[serde(default)]
    pub reload: ReloadSettings,

    /// Configuration version history settings
    #[serde(default)]
    pub versioning: VersioningSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_plugin_dir() -> PathBuf {
    PathBuf::from("./plugins")
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            plugin_dir: default_plugin_dir(),
            hot_reload: HotReloadSettings::default(),
            health: HealthSettings::default(),
            reload: ReloadSettings::default(),
            versioning: VersioningSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Hot reload settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotReloadSettings {
    /// Watch the plugin directory on startup
    #[serde(default)]
    pub enabled: bool,

    /// Debounce window (milliseconds)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// File extensions treated as plugin configuration
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_extensions() -> Vec<String> {
    vec!["yaml".to_string(), "yml".to_string(), "json".to_string()]
}

impl Default for HotReloadSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            debounce_ms: default_debounce_ms(),
            extensions: default_extensions(),
        }
    }
}

/// Health monitoring settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSettings {
    /// Interval between health sweeps (milliseconds)
    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,

    /// Attempt stop/start when a plugin reports Error
    #[serde(default = "default_true")]
    pub auto_recovery: bool,

    /// Capacity of the health event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Per-plugin deadline for a single health call (milliseconds)
    #[serde(default = "default_health_check_timeout_ms")]
    pub check_timeout_ms: u64,
}

fn default_health_interval_ms() -> u64 {
    30_000
}

fn default_event_buffer() -> usize {
    64
}

fn default_health_check_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_health_interval_ms(),
            auto_recovery: true,
            event_buffer: default_event_buffer(),
            check_timeout_ms: default_health_check_timeout_ms(),
        }
    }
}

/// Reload transaction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloadSettings {
    /// Interval between post-start health polls (milliseconds)
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    /// Overall deadline for the health-check phase (milliseconds)
    #[serde(default = "default_health_check_phase_timeout_ms")]
    pub health_check_timeout_ms: u64,

    /// Non-healthy observations tolerated before failing
    #[serde(default = "default_max_health_retries")]
    pub max_health_retries: u32,
}

fn default_health_check_interval_ms() -> u64 {
    500
}

fn default_health_check_phase_timeout_ms() -> u64 {
    10_000
}

fn default_max_health_retries() -> u32 {
    10
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            health_check_interval_ms: default_health_check_interval_ms(),
            health_check_timeout_ms: default_health_check_phase_timeout_ms(),
            max_health_retries: default_max_health_retries(),
        }
    }
}

/// Configuration version history settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersioningSettings {
    /// Persist configuration history
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Root directory of the history store
    #[serde(default = "default_versions_root")]
    pub root: PathBuf,

    /// Versions kept per plugin
    #[serde(default = "default_max_versions")]
    pub max_versions: usize,
}

fn default_versions_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mediasync")
        .join("plugin-versions")
}

fn default_max_versions() -> usize {
    10
}

impl Default for VersioningSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            root: default_versions_root(),
            max_versions: default_max_versions(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive (e.g. "info", "mediasync_plugins=debug")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

impl RuntimeConfig {
    /// Load configuration from a YAML or JSON file
    pub async fn from_file(path: impl AsRef<Path>) -> PluginResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;

        let config: Self = if is_json(path) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML or JSON file
    pub async fn to_file(&self, path: impl AsRef<Path>) -> PluginResult<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };

        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Reject settings the runtime cannot operate with
    pub fn validate(&self) -> PluginResult<()> {
        if self.health.interval_ms == 0 {
            return Err(PluginError::validation(
                "health.interval_ms must be greater than zero",
            ));
        }
        if self.health.event_buffer == 0 {
            return Err(PluginError::validation(
                "health.event_buffer must be greater than zero",
            ));
        }
        if self.reload.health_check_interval_ms == 0 {
            return Err(PluginError::validation(
                "reload.health_check_interval_ms must be greater than zero",
            ));
        }
        if self.versioning.enabled && self.versioning.max_versions == 0 {
            return Err(PluginError::validation(
                "versioning.max_versions must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.hot_reload.debounce_ms, 500);
        assert_eq!(config.reload.max_health_retries, 10);
        assert_eq!(config.reload.health_check_timeout_ms, 10_000);
        assert_eq!(config.versioning.max_versions, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
plugin_dir: /etc/mediasync/plugins
hot_reload:
  enabled: true
  debounce_ms: 250
"#;
        let config: RuntimeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.plugin_dir, PathBuf::from("/etc/mediasync/plugins"));
        assert!(config.hot_reload.enabled);
        assert_eq!(config.hot_reload.debounce_ms, 250);
        assert_eq!(config.hot_reload.extensions.len(), 3);
        assert_eq!(config.health.event_buffer, 64);
    }

    #[tokio::test]
    async fn test_file_round_trip_by_extension() {
        let dir = TempDir::new().unwrap();
        let mut config = RuntimeConfig::default();
        config.logging.json = true;

        for name in ["runtime.yaml", "runtime.json"] {
            let path = dir.path().join(name);
            config.to_file(&path).await.unwrap();
            let loaded = RuntimeConfig::from_file(&path).await.unwrap();
            assert_eq!(loaded, config);
        }
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runtime.yaml");
        tokio::fs::write(&path, "health:\n  interval_ms: 0\n")
            .await
            .unwrap();

        let err = RuntimeConfig::from_file(&path).await.unwrap_err();
        assert!(matches!(err, PluginError::Validation(_)));
    }
}
