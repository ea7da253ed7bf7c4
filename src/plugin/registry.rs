// ! Plugin registry
// !
// ! Module maintains the name-keyed table of live plugin instances.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::core::error::{PluginError, PluginResult};
use crate::plugin::api::{Plugin, PluginMetadata};
use crate::plugin::config::PluginType;

/// A registered plugin together with the metadata captured at registration
#[derive(Clone)]
pub struct RegisteredPlugin {
    /// Registry key
    pub name: String,

    /// Metadata reported by the instance when it was registered
    pub metadata: PluginMetadata,

    /// Shared handle to the instance
    pub plugin: Arc<dyn Plugin>,
}

impl std::fmt::Debug for RegisteredPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredPlugin")
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Registry of live plugin instances keyed by name
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, RegisteredPlugin>>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under `name`
    pub async fn register(&self, name: &str, plugin: Arc<dyn Plugin>) -> PluginResult<()> {
        if name.trim().is_empty() {
            return Err(PluginError::invalid_argument("plugin name cannot be empty"));
        }

        let metadata = plugin.metadata();
        metadata.validate()?;

        let mut plugins = self.plugins.write().await;
        if plugins.contains_key(name) {
            return Err(PluginError::AlreadyExists(format!("plugin '{name}'")));
        }

        info!(
            "Registering plugin '{}' ({} {})",
            name, metadata.plugin_type, metadata.version
        );
        plugins.insert(
            name.to_string(),
            RegisteredPlugin {
                name: name.to_string(),
                metadata,
                plugin,
            },
        );
        Ok(())
    }

    /// Remove a plugin, returning its handle
    pub async fn unregister(&self, name: &str) -> PluginResult<Arc<dyn Plugin>> {
        let removed = self.plugins.write().await.remove(name);
        match removed {
            Some(entry) => {
                debug!("Unregistered plugin '{}'", name);
                Ok(entry.plugin)
            }
            None => Err(PluginError::not_found(format!("plugin '{name}'"))),
        }
    }

    /// Look up a plugin handle
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .await
            .get(name)
            .map(|entry| Arc::clone(&entry.plugin))
    }

    /// Look up the full entry
    pub async fn entry(&self, name: &str) -> Option<RegisteredPlugin> {
        self.plugins.read().await.get(name).cloned()
    }

    /// Whether `name` is registered
    pub async fn contains(&self, name: &str) -> bool {
        self.plugins.read().await.contains_key(name)
    }

    /// Snapshot of all entries, sorted by name
    pub async fn list(&self) -> Vec<RegisteredPlugin> {
        let mut entries: Vec<_> = self.plugins.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Snapshot of entries of one kind, sorted by name
    pub async fn list_by_type(&self, plugin_type: PluginType) -> Vec<RegisteredPlugin> {
        let mut entries: Vec<_> = self
            .plugins
            .read()
            .await
            .values()
            .filter(|entry| entry.metadata.plugin_type == plugin_type)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Registered names, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.plugins.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered plugins
    pub async fn len(&self) -> usize {
        self.plugins.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.plugins.read().await.is_empty()
    }
}
