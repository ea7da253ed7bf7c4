// ! Error types for the plugin runtime
// !
// ! Module defines every error the lifecycle, reload and versioning layers can
// ! surface, with categorization used for logging and metrics.

use thiserror::Error;

/// The main error type for the plugin runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// A required argument was missing or malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Registry key is already taken
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Requested plugin or factory is not known
    #[error("Not found: {0}")]
    NotFound(String),

    /// No factory registered for the plugin type
    #[error("No factory registered for plugin type: {0}")]
    FactoryNotFound(String),

    /// Factory failed to construct the plugin
    #[error("Plugin creation failed for '{plugin}': {reason}")]
    CreationFailed { plugin: String, reason: String },

    /// Plugin rejected its settings
    #[error("Plugin configuration failed for '{plugin}': {reason}")]
    ConfigurationFailed { plugin: String, reason: String },

    /// A plugin with the same name is already registered
    #[error("Plugin already registered: {0}")]
    AlreadyRegistered(String),

    /// Plugin start call failed
    #[error("Plugin '{plugin}' failed to start: {reason}")]
    StartFailed { plugin: String, reason: String },

    /// Plugin stop call failed
    #[error("Plugin '{plugin}' failed to stop: {reason}")]
    StopFailed { plugin: String, reason: String },

    /// A lifecycle hook rejected the transition
    #[error("Lifecycle hook '{event}' failed for '{plugin}': {reason}")]
    HookFailed {
        event: String,
        plugin: String,
        reason: String,
    },

    /// Plugin did not become healthy after a reload
    #[error("Health check failed for '{plugin}': {reason}")]
    HealthCheckFailed { plugin: String, reason: String },

    /// Configuration or transition validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Another reload is already running for the plugin
    #[error("Reload already in progress for plugin '{plugin}' (transaction {transaction_id})")]
    ReloadInProgress {
        plugin: String,
        transaction_id: String,
    },

    /// Reload failed and the previous configuration was restored
    #[error("Reload of '{plugin}' failed: {cause}; rolled back to previous configuration")]
    ReloadFailed { plugin: String, cause: String },

    /// Reload failed and restoring the previous configuration failed too
    #[error("Reload of '{plugin}' failed: {cause}; rollback also failed: {rollback_error}")]
    RollbackFailed {
        plugin: String,
        cause: String,
        rollback_error: String,
    },

    /// Operation exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// One or more plugins failed to stop during shutdown
    #[error("Shutdown completed with {} failure(s): {}", .failures.len(), .failures.join("; "))]
    Shutdown { failures: Vec<String> },

    /// Plugin discovery failed
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// File watching failed
    #[error("Watch error: {0}")]
    Watch(String),

    /// I/O errors from the standard library
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Version history errors
    #[error("Version error: {0}")]
    Version(String),

    /// Internal errors that shouldn't normally occur
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for PluginError {
    fn from(err: std::io::Error) -> Self {
        PluginError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> Self {
        PluginError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for PluginError {
    fn from(err: serde_yaml::Error) -> Self {
        PluginError::Serialization(err.to_string())
    }
}

impl From<notify::Error> for PluginError {
    fn from(err: notify::Error) -> Self {
        PluginError::Watch(err.to_string())
    }
}

/// Result type alias for plugin runtime operations
pub type PluginResult<T> = Result<T, PluginError>;

impl PluginError {
    /// Create a new invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a new not found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Create a new version history error
    pub fn version<S: Into<String>>(message: S) -> Self {
        Self::Version(message.into())
    }

    /// Check if retrying the operation may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            PluginError::InvalidArgument(_) => false,
            PluginError::AlreadyExists(_) => false,
            PluginError::NotFound(_) => false,
            PluginError::FactoryNotFound(_) => false,
            PluginError::CreationFailed { .. } => true,
            PluginError::ConfigurationFailed { .. } => false,
            PluginError::AlreadyRegistered(_) => false,
            PluginError::StartFailed { .. } => true,
            PluginError::StopFailed { .. } => true,
            PluginError::HookFailed { .. } => true,
            PluginError::HealthCheckFailed { .. } => true,
            PluginError::Validation(_) => false,
            PluginError::ReloadInProgress { .. } => true,
            PluginError::ReloadFailed { .. } => true,
            PluginError::RollbackFailed { .. } => false,
            PluginError::Timeout(_) => true,
            PluginError::Shutdown { .. } => false,
            PluginError::Discovery(_) => true,
            PluginError::Watch(_) => true,
            PluginError::Io(_) => true,
            PluginError::Serialization(_) => false,
            PluginError::Version(_) => false,
            PluginError::Internal(_) => false,
        }
    }

    /// Get the error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            PluginError::InvalidArgument(_) => "configuration",
            PluginError::Validation(_) => "configuration",
            PluginError::Serialization(_) => "configuration",
            PluginError::AlreadyExists(_) => "lookup",
            PluginError::NotFound(_) => "lookup",
            PluginError::FactoryNotFound(_) => "lookup",
            PluginError::CreationFailed { .. } => "lifecycle",
            PluginError::ConfigurationFailed { .. } => "lifecycle",
            PluginError::AlreadyRegistered(_) => "lifecycle",
            PluginError::StartFailed { .. } => "lifecycle",
            PluginError::StopFailed { .. } => "lifecycle",
            PluginError::HookFailed { .. } => "lifecycle",
            PluginError::HealthCheckFailed { .. } => "reload",
            PluginError::ReloadFailed { .. } => "reload",
            PluginError::RollbackFailed { .. } => "reload",
            PluginError::ReloadInProgress { .. } => "concurrency",
            PluginError::Timeout(_) => "timeout",
            PluginError::Shutdown { .. } => "lifecycle",
            PluginError::Discovery(_) => "io",
            PluginError::Watch(_) => "io",
            PluginError::Io(_) => "io",
            PluginError::Version(_) => "versioning",
            PluginError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = PluginError::not_found("plugin 'p1'");
        assert_eq!(error.to_string(), "Not found: plugin 'p1'");
        assert_eq!(error.category(), "lookup");
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_error_recovery() {
        assert!(PluginError::timeout("health check").is_recoverable());
        assert!(!PluginError::validation("empty name").is_recoverable());
        assert!(
            PluginError::StartFailed {
                plugin: "p1".to_string(),
                reason: "port busy".to_string()
            }
            .is_recoverable()
        );
    }

    #[test]
    fn test_reload_error_messages() {
        let err = PluginError::ReloadFailed {
            plugin: "p1".to_string(),
            cause: "health check timed out".to_string(),
        };
        assert!(err.to_string().contains("rolled back"));

        let err = PluginError::RollbackFailed {
            plugin: "p1".to_string(),
            cause: "start failed".to_string(),
            rollback_error: "factory missing".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("start failed"));
        assert!(text.contains("factory missing"));
    }

    #[test]
    fn test_shutdown_aggregates_failures() {
        let err = PluginError::Shutdown {
            failures: vec!["a: boom".to_string(), "b: stuck".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Shutdown completed with 2 failure(s): a: boom; b: stuck"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err: PluginError = io_err.into();
        assert!(matches!(err, PluginError::Io(ref msg) if msg.contains("missing file")));
        assert_eq!(err.category(), "io");
    }
}
