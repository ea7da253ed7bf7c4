// ! Plugin lifecycle types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::health::PluginHealth;
use crate::plugin::config::PluginConfig;

/// Lifecycle state of a managed plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Unknown,
    Discovered,
    Loading,
    Loaded,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
    Unloading,
}

impl PluginState {
    /// Lowercase state name
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginState::Unknown => "unknown",
            PluginState::Discovered => "discovered",
            PluginState::Loading => "loading",
            PluginState::Loaded => "loaded",
            PluginState::Starting => "starting",
            PluginState::Running => "running",
            PluginState::Stopping => "stopping",
            PluginState::Stopped => "stopped",
            PluginState::Error => "error",
            PluginState::Unloading => "unloading",
        }
    }

    /// Whether the plugin's background work may be live
    pub fn is_active(&self) -> bool {
        matches!(self, PluginState::Starting | PluginState::Running)
    }

    /// Whether the instance has to be stopped before it can be dropped
    ///
    /// Error and Unknown count: a failed start or health check can leave the
    /// plugin's own tasks running.
    pub fn needs_stop(&self) -> bool {
        matches!(
            self,
            PluginState::Starting
                | PluginState::Running
                | PluginState::Stopping
                | PluginState::Error
                | PluginState::Unknown
        )
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable status of a managed plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginStatus {
    /// Current lifecycle state
    pub state: PluginState,

    /// Last transition message
    pub message: String,

    /// Last error, set while in `Error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Configuration the plugin was loaded with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<PluginConfig>,

    /// When the status last changed
    pub updated_at: DateTime<Utc>,
}

impl PluginStatus {
    /// Create a status with no config attached
    pub fn new(state: PluginState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            error: None,
            config: None,
            updated_at: Utc::now(),
        }
    }
}

/// Resource usage reported for a plugin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Resident memory attributed to the plugin
    pub memory_bytes: u64,

    /// Open network connections
    pub connections: u32,

    /// Open file handles
    pub file_handles: u32,
}

impl ResourceUsage {
    /// Baseline recorded when a plugin starts
    pub fn initial() -> Self {
        Self {
            memory_bytes: 1024 * 1024,
            connections: 0,
            file_handles: 1,
        }
    }
}

/// One observation from the health monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthEvent {
    /// Plugin the observation is about
    pub plugin_name: String,

    /// Reported health (after recovery, when one was attempted)
    pub health: PluginHealth,

    /// A stop/start recovery was attempted
    pub recovery_attempted: bool,

    /// The plugin reported operational health after recovery
    pub recovery_succeeded: bool,

    /// When the observation was made
    pub timestamp: DateTime<Utc>,
}

impl HealthEvent {
    /// Observation without recovery
    pub fn observed(plugin_name: impl Into<String>, health: PluginHealth) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            health,
            recovery_attempted: false,
            recovery_succeeded: false,
            timestamp: Utc::now(),
        }
    }
}
