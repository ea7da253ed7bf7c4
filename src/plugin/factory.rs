// ! Plugin factories
// !
// ! Module maps each plugin type to the constructor that builds instances of it.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::core::error::{PluginError, PluginResult};
use crate::plugin::api::Plugin;
use crate::plugin::config::{PluginConfig, PluginType};

/// Constructs plugin instances from configuration
pub trait PluginFactory: Send + Sync {
    /// Build a new, unstarted instance
    fn create(&self, config: &PluginConfig) -> PluginResult<Box<dyn Plugin>>;
}

impl<F> PluginFactory for F
where
    F: Fn(&PluginConfig) -> PluginResult<Box<dyn Plugin>> + Send + Sync,
{
    fn create(&self, config: &PluginConfig) -> PluginResult<Box<dyn Plugin>> {
        self(config)
    }
}

/// Registry of factories keyed by plugin type
#[derive(Default)]
pub struct FactoryRegistry {
    factories: RwLock<HashMap<PluginType, Arc<dyn PluginFactory>>>,
}

impl FactoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory for `plugin_type`
    pub async fn register(
        &self,
        plugin_type: PluginType,
        factory: Arc<dyn PluginFactory>,
    ) -> PluginResult<()> {
        let mut factories = self.factories.write().await;
        if factories.contains_key(&plugin_type) {
            return Err(PluginError::AlreadyExists(format!(
                "factory for plugin type '{plugin_type}'"
            )));
        }
        info!("Registered factory for plugin type '{}'", plugin_type);
        factories.insert(plugin_type, factory);
        Ok(())
    }

    /// Remove the factory for `plugin_type`
    pub async fn unregister(&self, plugin_type: PluginType) -> PluginResult<()> {
        self.factories
            .write()
            .await
            .remove(&plugin_type)
            .map(|_| ())
            .ok_or_else(|| PluginError::not_found(format!("factory for '{plugin_type}'")))
    }

    /// Look up the factory for `plugin_type`
    pub async fn get(&self, plugin_type: PluginType) -> PluginResult<Arc<dyn PluginFactory>> {
        self.factories
            .read()
            .await
            .get(&plugin_type)
            .cloned()
            .ok_or_else(|| PluginError::FactoryNotFound(plugin_type.to_string()))
    }

    /// Plugin types with a registered factory
    pub async fn list_types(&self) -> Vec<PluginType> {
        let mut types: Vec<_> = self.factories.read().await.keys().copied().collect();
        types.sort();
        types
    }
}
