// ! Health reporting types shared by plugins and the runtime
// !
// ! Module provides:
// ! - The health status vocabulary plugins report through `Plugin::health`
// ! - Health snapshots with metadata and timing
// ! - Timeout-bounded evaluation so a hung plugin cannot stall a caller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// Custom serialization for Duration
mod duration_serde {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Health status reported by a plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Plugin is healthy and operational
    Healthy,
    /// Plugin has minor issues but is functional
    Degraded,
    /// Plugin is unhealthy and may not function properly
    Unhealthy,
    /// Plugin hit an error it cannot clear on its own; eligible for auto-recovery
    Error,
    /// Plugin is not running
    Stopped,
    /// Health could not be determined
    Unknown,
}

impl HealthStatus {
    /// Check if status indicates the plugin is operational
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    /// Get a numeric score for this status (higher is better)
    pub fn score(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 100,
            HealthStatus::Degraded => 75,
            HealthStatus::Unhealthy => 25,
            HealthStatus::Error => 10,
            HealthStatus::Stopped => 5,
            HealthStatus::Unknown => 0,
        }
    }

    /// Combine two health statuses, returning the worse of the two
    pub fn combine(self, other: HealthStatus) -> HealthStatus {
        if self.score() < other.score() {
            self
        } else {
            other
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Error => write!(f, "error"),
            HealthStatus::Stopped => write!(f, "stopped"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Point-in-time health of a single plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginHealth {
    /// Overall health status
    pub status: HealthStatus,
    /// Human-readable description
    pub message: String,
    /// Additional details reported by the plugin
    pub metadata: HashMap<String, serde_json::Value>,
    /// When the check was performed
    pub checked_at: DateTime<Utc>,
    /// Duration the health check took (as milliseconds)
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl PluginHealth {
    /// Create a healthy result
    pub fn healthy(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Healthy, message)
    }

    /// Create a degraded result
    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Degraded, message)
    }

    /// Create an unhealthy result
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Unhealthy, message)
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Error, message)
    }

    /// Create a stopped result
    pub fn stopped(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Stopped, message)
    }

    /// Create an unknown result
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Unknown, message)
    }

    /// Create a new health result
    pub fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            metadata: HashMap::new(),
            checked_at: Utc::now(),
            duration: Duration::from_millis(0),
        }
    }

    /// Add metadata to the health result
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Set the duration for this health check
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Check if the plugin reported healthy
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Evaluate a health future, mapping an elapsed deadline to `Unknown`.
pub async fn check_with_timeout<F>(name: &str, limit: Duration, check: F) -> PluginHealth
where
    F: Future<Output = PluginHealth>,
{
    let start = Instant::now();

    match timeout(limit, check).await {
        Ok(health) => {
            let elapsed = start.elapsed();
            if health.duration.is_zero() {
                health.with_duration(elapsed)
            } else {
                health
            }
        }
        Err(_) => {
            debug!("Health check for {} timed out after {:?}", name, limit);
            PluginHealth::unknown(format!("Health check for '{name}' timed out"))
                .with_duration(start.elapsed())
                .with_metadata("timeout", serde_json::Value::Bool(true))
        }
    }
}
