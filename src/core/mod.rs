//! Core building blocks shared by the lifecycle and reload layers
//!
//! This module contains error handling, health reporting, runtime
//! configuration, structured logging and lifecycle metrics.

pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;

// Re-export commonly used items
pub use config::{
    HealthSettings, HotReloadSettings, LoggingConfig, ReloadSettings, RuntimeConfig,
    VersioningSettings,
};
pub use error::{PluginError, PluginResult};
pub use health::{HealthStatus, PluginHealth, check_with_timeout};
pub use logging::{ErrorContext, ErrorLogLevel, ErrorLogger, init_logging};
pub use metrics::{LifecycleMetrics, MetricsSummary, ReloadOutcome};
