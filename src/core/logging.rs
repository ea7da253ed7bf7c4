// ! Structured logging for the plugin runtime
// !
// ! Module provides structured error logging with categorization and
// ! plugin/phase context, plus subscriber installation for hosts.

use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::{Level, error, info, span, warn};

use crate::core::config::LoggingConfig;
use crate::core::error::{PluginError, PluginResult};

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLogLevel {
    /// Critical errors that require immediate attention
    Critical,
    /// Errors that affect functionality but the runtime can continue
    Error,
    /// Warnings about potential issues
    Warning,
    /// Informational error context
    Info,
}

impl From<&PluginError> for ErrorLogLevel {
    fn from(error: &PluginError) -> Self {
        match error {
            // Plugin may be left in Error state
            PluginError::RollbackFailed { .. } | PluginError::Internal(_) => {
                ErrorLogLevel::Critical
            }

            PluginError::CreationFailed { .. }
            | PluginError::ConfigurationFailed { .. }
            | PluginError::StartFailed { .. }
            | PluginError::StopFailed { .. }
            | PluginError::ReloadFailed { .. }
            | PluginError::HealthCheckFailed { .. }
            | PluginError::Shutdown { .. }
            | PluginError::Version(_) => ErrorLogLevel::Error,

            PluginError::Timeout(_)
            | PluginError::HookFailed { .. }
            | PluginError::Io(_)
            | PluginError::Watch(_)
            | PluginError::Discovery(_)
            | PluginError::ReloadInProgress { .. }
            | PluginError::AlreadyRegistered(_) => ErrorLogLevel::Warning,

            // Caller input issues
            PluginError::InvalidArgument(_)
            | PluginError::AlreadyExists(_)
            | PluginError::NotFound(_)
            | PluginError::FactoryNotFound(_)
            | PluginError::Validation(_)
            | PluginError::Serialization(_) => ErrorLogLevel::Info,
        }
    }
}

/// Extended error context for logging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Operation being performed when error occurred
    pub operation: String,
    /// Plugin the operation targeted
    pub plugin: Option<String>,
    /// Reload phase, when inside a transaction
    pub phase: Option<String>,
    /// Reload transaction ID
    pub transaction_id: Option<String>,
    /// Additional context data
    pub extra: HashMap<String, Value>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            operation: "unknown".to_string(),
            plugin: None,
            phase: None,
            transaction_id: None,
            extra: HashMap::new(),
        }
    }
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    /// Set plugin name
    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    /// Set reload phase
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    /// Set transaction ID
    pub fn with_transaction(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    /// Add extra context data
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Structured error logger
pub struct ErrorLogger;

impl ErrorLogger {
    /// Log an error with full context
    pub fn log_error(error: &PluginError, context: &ErrorContext) {
        let category = error.category();
        let recoverable = error.is_recoverable();
        let log_level = ErrorLogLevel::from(error);

        let log_data = json!({
            "error_category": category,
            "error_recoverable": recoverable,
            "error_message": error.to_string(),
            "operation": context.operation,
            "plugin": context.plugin,
            "phase": context.phase,
            "transaction_id": context.transaction_id,
            "extra_context": context.extra,
        });
        let plugin = context.plugin.as_deref().unwrap_or("-");

        match log_level {
            ErrorLogLevel::Critical => {
                error!(
                    target: "plugin_errors",
                    error_category = category,
                    error_recoverable = recoverable,
                    operation = context.operation.as_str(),
                    plugin = plugin,
                    "CRITICAL plugin error: {} - {}",
                    error,
                    serde_json::to_string(&log_data).unwrap_or_default()
                );
            }
            ErrorLogLevel::Error => {
                error!(
                    target: "plugin_errors",
                    error_category = category,
                    error_recoverable = recoverable,
                    operation = context.operation.as_str(),
                    plugin = plugin,
                    "Plugin error: {} - {}",
                    error,
                    serde_json::to_string(&log_data).unwrap_or_default()
                );
            }
            ErrorLogLevel::Warning => {
                warn!(
                    target: "plugin_errors",
                    error_category = category,
                    error_recoverable = recoverable,
                    operation = context.operation.as_str(),
                    plugin = plugin,
                    "Plugin warning: {} - {}",
                    error,
                    serde_json::to_string(&log_data).unwrap_or_default()
                );
            }
            ErrorLogLevel::Info => {
                info!(
                    target: "plugin_errors",
                    error_category = category,
                    error_recoverable = recoverable,
                    operation = context.operation.as_str(),
                    plugin = plugin,
                    "Plugin info: {} - {}",
                    error,
                    serde_json::to_string(&log_data).unwrap_or_default()
                );
            }
        }
    }

    /// Create a logging span for an operation
    pub fn create_operation_span(operation: &str, context: &ErrorContext) -> tracing::Span {
        span!(
            Level::INFO,
            "plugin_operation",
            operation = operation,
            plugin = context.plugin.as_deref(),
            phase = context.phase.as_deref(),
            transaction_id = context.transaction_id.as_deref(),
        )
    }
}

impl PluginError {
    /// Log this error with structured context
    pub fn log_with_context(&self, context: &ErrorContext) {
        ErrorLogger::log_error(self, context);
    }

    /// Log this error with basic context
    pub fn log_error(&self, operation: &str) {
        ErrorLogger::log_error(self, &ErrorContext::new(operation));
    }
}

/// Install a global `tracing` subscriber configured from `LoggingConfig`.
///
/// `RUST_LOG` takes precedence over the configured level when set. Returns an
/// error if a global subscriber is already installed.
#[cfg(feature = "tracing-subscriber")]
pub fn init_logging(config: &LoggingConfig) -> PluginResult<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| PluginError::invalid_argument(format!("Invalid log level: {e}")))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| PluginError::internal(format!("Failed to install subscriber: {e}")))
}

#[cfg(not(feature = "tracing-subscriber"))]
pub fn init_logging(_config: &LoggingConfig) -> PluginResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_log_levels() {
        assert_eq!(
            ErrorLogLevel::from(&PluginError::internal("test")),
            ErrorLogLevel::Critical
        );
        assert_eq!(
            ErrorLogLevel::from(&PluginError::StartFailed {
                plugin: "p1".to_string(),
                reason: "boom".to_string()
            }),
            ErrorLogLevel::Error
        );
        assert_eq!(
            ErrorLogLevel::from(&PluginError::timeout("test")),
            ErrorLogLevel::Warning
        );
        assert_eq!(
            ErrorLogLevel::from(&PluginError::validation("test")),
            ErrorLogLevel::Info
        );
    }

    #[test]
    fn test_error_context_builder() {
        let context = ErrorContext::new("atomic_reload")
            .with_plugin("p1")
            .with_phase("health_check")
            .with_transaction("tx-1")
            .with_extra("attempt", json!(3));

        assert_eq!(context.operation, "atomic_reload");
        assert_eq!(context.plugin, Some("p1".to_string()));
        assert_eq!(context.phase, Some("health_check".to_string()));
        assert_eq!(context.transaction_id, Some("tx-1".to_string()));
        assert_eq!(context.extra.get("attempt"), Some(&json!(3)));
    }

    #[test]
    fn test_error_logging_does_not_panic() {
        let error = PluginError::ReloadInProgress {
            plugin: "p1".to_string(),
            transaction_id: "tx-1".to_string(),
        };
        error.log_error("atomic_reload");
        error.log_with_context(&ErrorContext::new("atomic_reload").with_plugin("p1"));
    }

    #[test]
    fn test_operation_span_creation() {
        let _subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init();

        let context = ErrorContext::new("start").with_plugin("p1");
        let span = ErrorLogger::create_operation_span("start_plugin", &context);
        let _span_guard = span.enter();
    }

    #[test]
    fn test_init_logging_rejects_second_install() {
        let config = LoggingConfig::default();
        // First call may or may not win depending on test ordering.
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err() || cfg!(not(feature = "tracing-subscriber")));
    }
}
