// ! Plugin configuration management
// !
// ! Module handles the declarative description of a plugin instance and the
// ! files it is loaded from.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::core::error::{PluginError, PluginResult};

/// Plugin kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    /// Pulls media activity from a source
    Input,
    /// Pushes media activity to a destination
    Output,
    /// Rewrites or filters activity between input and output
    Transform,
}

impl PluginType {
    /// All known plugin kinds
    pub const ALL: [PluginType; 3] = [PluginType::Input, PluginType::Output, PluginType::Transform];

    /// Lowercase name used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::Input => "input",
            PluginType::Output => "output",
            PluginType::Transform => "transform",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginType {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "input" => Ok(PluginType::Input),
            "output" => Ok(PluginType::Output),
            "transform" => Ok(PluginType::Transform),
            other => Err(PluginError::validation(format!(
                "invalid plugin type '{other}' (expected input, output or transform)"
            ))),
        }
    }
}

/// Plugin configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Plugin name/identifier
    pub name: String,

    /// Plugin kind
    #[serde(rename = "type")]
    pub plugin_type: PluginType,

    /// Plugin version
    pub version: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Whether the plugin is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Plugin-specific settings
    #[serde(default)]
    pub settings: HashMap<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl PluginConfig {
    /// Create an enabled configuration with no settings
    pub fn new(name: impl Into<String>, plugin_type: PluginType, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plugin_type,
            version: version.into(),
            description: String::new(),
            enabled: true,
            settings: HashMap::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set a single setting
    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Set the enabled flag
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Read a setting
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Structural validation: required fields and numeric constraints.
    pub fn validate(&self) -> PluginResult<()> {
        if self.name.trim().is_empty() {
            return Err(PluginError::validation("plugin name cannot be empty"));
        }
        if self.version.trim().is_empty() {
            return Err(PluginError::validation(format!(
                "plugin '{}' version cannot be empty",
                self.name
            )));
        }

        for (key, value) in &self.settings {
            if !is_non_negative_key(key) {
                continue;
            }
            if let Some(number) = value.as_f64() {
                if number < 0.0 {
                    return Err(PluginError::validation(format!(
                        "plugin '{}' setting '{key}' cannot be negative (got {number})",
                        self.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Load a configuration from a YAML or JSON file
    pub async fn from_file(path: impl AsRef<Path>) -> PluginResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(path, &content)
    }

    /// Parse a configuration, choosing the format by file extension
    pub fn parse(path: &Path, content: &str) -> PluginResult<Self> {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let config: Self = if is_json {
            serde_json::from_str(content)
                .map_err(|e| PluginError::Serialization(format!("{}: {e}", path.display())))?
        } else {
            serde_yaml::from_str(content)
                .map_err(|e| PluginError::Serialization(format!("{}: {e}", path.display())))?
        };
        Ok(config)
    }

    /// Save configuration to a YAML or JSON file
    pub async fn to_file(&self, path: impl AsRef<Path>) -> PluginResult<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            _ => serde_yaml::to_string(self)?,
        };

        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

// Durations, intervals and limits.
fn is_non_negative_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("timeout")
        || key.contains("interval")
        || key.ends_with("_ms")
        || key.ends_with("_seconds")
        || key.ends_with("_secs")
        || key.starts_with("max_")
        || key.ends_with("_size")
        || key.ends_with("_limit")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plugin_type_parsing() {
        assert_eq!("input".parse::<PluginType>().unwrap(), PluginType::Input);
        assert_eq!(" Output ".parse::<PluginType>().unwrap(), PluginType::Output);
        assert_eq!(PluginType::Transform.to_string(), "transform");
        assert!("sink".parse::<PluginType>().is_err());
    }

    #[test]
    fn test_yaml_schema() {
        let yaml = r#"
name: plex-input
type: input
version: 1.0.0
description: Reads Plex watch history
settings:
  url: http://plex.local:32400
  poll_interval_seconds: 60
  filters:
    libraries: [Movies, Shows]
"#;
        let config = PluginConfig::parse(Path::new("plex.yaml"), yaml).unwrap();
        assert_eq!(config.name, "plex-input");
        assert_eq!(config.plugin_type, PluginType::Input);
        assert!(config.enabled);
        assert_eq!(config.settings["filters"]["libraries"][1], json!("Shows"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_type_rejected_at_parse() {
        let yaml = "name: x\ntype: sink\nversion: 1.0.0\n";
        let err = PluginConfig::parse(Path::new("x.yml"), yaml).unwrap_err();
        assert!(matches!(err, PluginError::Serialization(_)));
    }

    #[test]
    fn test_validation_rules() {
        let base = PluginConfig::new("trakt-output", PluginType::Output, "2.0.0");
        assert!(base.validate().is_ok());

        let empty_name = PluginConfig::new("", PluginType::Output, "2.0.0");
        assert!(matches!(empty_name.validate(), Err(PluginError::Validation(_))));

        let empty_version = PluginConfig::new("trakt-output", PluginType::Output, " ");
        assert!(empty_version.validate().is_err());

        let negative_timeout = base.clone().with_setting("request_timeout", json!(-5));
        let err = negative_timeout.validate().unwrap_err();
        assert!(err.to_string().contains("request_timeout"));

        // Unrelated negative numbers are allowed
        let offset = base.with_setting("utc_offset_hours", json!(-5));
        assert!(offset.validate().is_ok());
    }

    #[test]
    fn test_clone_is_deep() {
        let original = PluginConfig::new("p", PluginType::Transform, "1.0.0")
            .with_setting("rules", json!({"nested": {"keep": true}}));
        let mut copy = original.clone();
        copy.settings
            .get_mut("rules")
            .and_then(|v| v.get_mut("nested"))
            .and_then(|v| v.as_object_mut())
            .map(|m| m.insert("keep".to_string(), json!(false)));

        assert_eq!(original.settings["rules"]["nested"]["keep"], json!(true));
        assert_eq!(copy.settings["rules"]["nested"]["keep"], json!(false));
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = PluginConfig::new("emby", PluginType::Input, "1.0.0")
            .with_setting("api_key", json!("secret"));

        for name in ["emby.yaml", "emby.json"] {
            let path = dir.path().join(name);
            config.to_file(&path).await.unwrap();
            assert_eq!(PluginConfig::from_file(&path).await.unwrap(), config);
        }
    }
}
