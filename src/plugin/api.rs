// ! Plugin API definitions
// !
// ! Module defines the trait every service module implements to be managed by
// ! the runtime, and the descriptive types it reports about itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::core::error::{PluginError, PluginResult};
use crate::core::health::PluginHealth;
use crate::plugin::config::PluginType;

/// Core trait that all plugins must implement
///
/// Input, output and transform plugins all implement this one trait; the kind
/// is carried by [`PluginMetadata::plugin_type`]. Every method takes `&self`
/// so the runtime can call into a plugin without holding any of its own locks;
/// implementations keep mutable state behind their own synchronization.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Start the plugin's background work
    async fn start(&self) -> PluginResult<()>;

    /// Stop the plugin's background work
    async fn stop(&self) -> PluginResult<()>;

    /// Report current health
    async fn health(&self) -> PluginHealth;

    /// Short service description
    fn info(&self) -> PluginInfo;

    /// Feature flags
    fn capabilities(&self) -> PluginCapabilities;

    /// Full metadata, validated on registration
    fn metadata(&self) -> PluginMetadata;

    /// Apply plugin-specific settings
    async fn configure(&self, _settings: &HashMap<String, Value>) -> PluginResult<()> {
        Ok(())
    }
}

/// Short service description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin name
    pub name: String,

    /// Plugin version
    pub version: String,

    /// Plugin description
    pub description: String,
}

/// Plugin capabilities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginCapabilities {
    /// Supports hot reload
    pub hot_reload: bool,

    /// Supports configuration updates
    pub configurable: bool,

    /// Reports meaningful health
    pub health_check: bool,

    /// Plugin-defined capability names (e.g. "webhook", "incremental-sync")
    #[serde(default)]
    pub features: Vec<String>,
}

/// Plugin metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Plugin name
    pub name: String,

    /// Plugin version
    pub version: String,

    /// Plugin kind
    #[serde(rename = "type")]
    pub plugin_type: PluginType,

    /// Plugin description
    #[serde(default)]
    pub description: String,

    /// Plugin author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Plugin license
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PluginMetadata {
    /// Create metadata with the required fields
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        plugin_type: PluginType,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            plugin_type,
            description: String::new(),
            author: None,
            license: None,
            tags: Vec::new(),
        }
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set author
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Check the fields registration depends on
    pub fn validate(&self) -> PluginResult<()> {
        if self.name.trim().is_empty() {
            return Err(PluginError::invalid_argument(
                "plugin metadata name cannot be empty",
            ));
        }
        if self.version.trim().is_empty() {
            return Err(PluginError::invalid_argument(format!(
                "plugin '{}' metadata version cannot be empty",
                self.name
            )));
        }
        Ok(())
    }

    /// Short description derived from metadata
    pub fn info(&self) -> PluginInfo {
        PluginInfo {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_validation() {
        let metadata = PluginMetadata::new("jellyfin-input", "1.2.0", PluginType::Input);
        assert!(metadata.validate().is_ok());

        let missing_name = PluginMetadata::new("  ", "1.0.0", PluginType::Output);
        assert!(matches!(
            missing_name.validate(),
            Err(PluginError::InvalidArgument(_))
        ));

        let missing_version = PluginMetadata::new("trakt", "", PluginType::Output);
        let err = missing_version.validate().unwrap_err();
        assert!(err.to_string().contains("trakt"));
    }

    #[test]
    fn test_metadata_serializes_type_field() {
        let metadata = PluginMetadata::new("dedupe", "0.3.1", PluginType::Transform)
            .with_description("Drops duplicate watch events")
            .with_author("MediaSync");

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["type"], "transform");
        assert_eq!(json["author"], "MediaSync");
        assert!(json.get("license").is_none());

        let info = metadata.info();
        assert_eq!(info.name, "dedupe");
        assert_eq!(info.description, "Drops duplicate watch events");
    }
}
