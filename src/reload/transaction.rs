// ! Reload transactions
// !
// ! Module holds the per-reload record (phases, snapshot, errors), the
// ! options bounding the health-check phase and the validation applied before
// ! anything is touched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::core::config::ReloadSettings;
use crate::core::error::{PluginError, PluginResult};
use crate::core::health::PluginHealth;
use crate::plugin::config::PluginConfig;
use crate::plugin::types::{PluginState, PluginStatus, ResourceUsage};

/// Step of a reload transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPhase {
    Validation,
    Snapshot,
    Stopping,
    Loading,
    Starting,
    HealthCheck,
    Complete,
    Rollback,
    Failed,
}

impl ReloadPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadPhase::Validation => "validation",
            ReloadPhase::Snapshot => "snapshot",
            ReloadPhase::Stopping => "stopping",
            ReloadPhase::Loading => "loading",
            ReloadPhase::Starting => "starting",
            ReloadPhase::HealthCheck => "health_check",
            ReloadPhase::Complete => "complete",
            ReloadPhase::Rollback => "rollback",
            ReloadPhase::Failed => "failed",
        }
    }

    /// Whether the transaction can make no further progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReloadPhase::Complete | ReloadPhase::Failed)
    }
}

impl fmt::Display for ReloadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plugin state captured before a reload touches anything
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub plugin_name: String,

    /// Configuration the plugin was running with, if it was loaded
    pub config: Option<PluginConfig>,

    /// Lifecycle state at capture time
    pub state: PluginState,

    /// Health at capture time
    pub health: PluginHealth,

    /// Resource usage at capture time
    pub resource_usage: ResourceUsage,

    pub captured_at: DateTime<Utc>,
}

impl ConfigSnapshot {
    /// Capture from a status record; `None` means the plugin is unknown
    pub fn capture(
        plugin_name: &str,
        status: Option<&PluginStatus>,
        resource_usage: Option<ResourceUsage>,
        health: PluginHealth,
    ) -> Self {
        let (config, state) = match status {
            Some(status) => (status.config.clone(), status.state),
            None => (None, PluginState::Stopped),
        };
        Self {
            plugin_name: plugin_name.to_string(),
            config,
            state,
            health,
            resource_usage: resource_usage.unwrap_or_default(),
            captured_at: Utc::now(),
        }
    }

    /// How the plugin should be restored on rollback
    pub fn restore_plan(&self) -> RestorePlan {
        let Some(config) = &self.config else {
            return RestorePlan::CleanupOnly;
        };
        match self.state {
            PluginState::Running | PluginState::Starting => RestorePlan::LoadAndStart(config.clone()),
            PluginState::Loaded => RestorePlan::Load(config.clone(), PluginState::Loaded),
            PluginState::Stopped | PluginState::Stopping => {
                RestorePlan::Load(config.clone(), PluginState::Stopped)
            }
            // Never successfully started; nothing to return to
            PluginState::Error
            | PluginState::Unknown
            | PluginState::Discovered
            | PluginState::Loading
            | PluginState::Unloading => RestorePlan::CleanupOnly,
        }
    }
}

/// Rollback action derived from a snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum RestorePlan {
    /// Remove whatever the failed reload left behind
    CleanupOnly,
    /// Reload the previous configuration without starting it, then put it
    /// back in the recorded state (Loaded or Stopped)
    Load(PluginConfig, PluginState),
    /// Reload and restart the previous configuration
    LoadAndStart(PluginConfig),
}

/// Record of one reload attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadTransaction {
    pub id: String,
    pub plugin_name: String,
    pub new_config: PluginConfig,
    pub snapshot: Option<ConfigSnapshot>,
    pub phase: ReloadPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub errors: Vec<String>,
}

impl ReloadTransaction {
    pub fn new(plugin_name: impl Into<String>, new_config: PluginConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            plugin_name: plugin_name.into(),
            new_config,
            snapshot: None,
            phase: ReloadPhase::Validation,
            started_at: Utc::now(),
            finished_at: None,
            errors: Vec::new(),
        }
    }

    pub(crate) fn enter(&mut self, phase: ReloadPhase) {
        self.phase = phase;
        if phase.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub(crate) fn record_error(&mut self, error: &PluginError) {
        self.errors.push(format!("{}: {}", self.phase, error));
    }

    /// Number of errors recorded so far
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Elapsed time, up to completion when finished
    pub fn duration(&self) -> Duration {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).to_std().unwrap_or_default()
    }
}

/// Bounds for the post-start health-check phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadOptions {
    /// Interval between health polls
    pub health_check_interval: Duration,

    /// Overall deadline for the phase
    pub health_check_timeout: Duration,

    /// Non-healthy observations tolerated before the phase fails
    pub max_health_retries: u32,
}

impl Default for ReloadOptions {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_millis(500),
            health_check_timeout: Duration::from_secs(10),
            max_health_retries: 10,
        }
    }
}

impl From<&ReloadSettings> for ReloadOptions {
    fn from(settings: &ReloadSettings) -> Self {
        Self {
            health_check_interval: Duration::from_millis(settings.health_check_interval_ms.max(1)),
            health_check_timeout: Duration::from_millis(settings.health_check_timeout_ms),
            max_health_retries: settings.max_health_retries,
        }
    }
}

/// Host-defined check applied to every reload
pub trait SystemConstraint: Send + Sync {
    /// Name used in error messages
    fn name(&self) -> &str;

    /// Reject the reload of `current` into `proposed`
    fn check(&self, proposed: &PluginConfig, current: Option<&PluginStatus>) -> PluginResult<()>;
}

/// Called on every phase transition
pub type PhaseObserver = Arc<dyn Fn(&ReloadTransaction) + Send + Sync>;

/// Validation applied before any side effect
pub(crate) fn validate_reload(
    name: &str,
    proposed: &PluginConfig,
    current: Option<&PluginStatus>,
    constraints: &[Arc<dyn SystemConstraint>],
) -> PluginResult<()> {
    if proposed.name != name {
        return Err(PluginError::validation(format!(
            "plugin name cannot be changed during reload ('{name}' -> '{}')",
            proposed.name
        )));
    }

    proposed.validate()?;

    if let Some(previous) = current.and_then(|status| status.config.as_ref()) {
        if previous.plugin_type != proposed.plugin_type {
            return Err(PluginError::validation(format!(
                "plugin type cannot be changed during reload ({} -> {})",
                previous.plugin_type, proposed.plugin_type
            )));
        }
    }

    for constraint in constraints {
        constraint.check(proposed, current).map_err(|e| {
            PluginError::validation(format!("constraint '{}' rejected reload: {e}", constraint.name()))
        })?;
    }

    Ok(())
}
