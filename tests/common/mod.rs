//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use mediasync_plugins::prelude::*;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Stand-in for a media server connector; `health` setting scripts its health
pub struct ScriptedPlugin {
    metadata: PluginMetadata,
    running: AtomicBool,
    settings: Mutex<HashMap<String, Value>>,
}

impl ScriptedPlugin {
    pub fn new(config: &PluginConfig) -> Self {
        Self {
            metadata: PluginMetadata::new(&config.name, &config.version, config.plugin_type),
            running: AtomicBool::new(false),
            settings: Mutex::new(config.settings.clone()),
        }
    }
}

#[async_trait]
impl Plugin for ScriptedPlugin {
    async fn start(&self) -> PluginResult<()> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> PluginResult<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn health(&self) -> PluginHealth {
        if !self.running.load(Ordering::SeqCst) {
            return PluginHealth::stopped("not running");
        }
        let scripted = self
            .settings
            .lock()
            .get("health")
            .and_then(|v| v.as_str().map(str::to_string));
        match scripted.as_deref() {
            Some("unhealthy") => PluginHealth::unhealthy("scripted"),
            Some("error") => PluginHealth::error("scripted"),
            _ => PluginHealth::healthy("ok"),
        }
    }

    fn info(&self) -> PluginInfo {
        self.metadata.info()
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities {
            hot_reload: true,
            configurable: true,
            health_check: true,
            features: vec!["scrobble".to_string()],
        }
    }

    fn metadata(&self) -> PluginMetadata {
        self.metadata.clone()
    }

    async fn configure(&self, settings: &HashMap<String, Value>) -> PluginResult<()> {
        *self.settings.lock() = settings.clone();
        Ok(())
    }
}

/// Manager with a `ScriptedPlugin` factory for every plugin type
pub async fn scripted_manager() -> Arc<PluginManager> {
    let manager = PluginManager::new(
        Arc::new(PluginRegistry::new()),
        Arc::new(FactoryRegistry::new()),
    );
    register_scripted(manager.factories()).await;
    Arc::new(manager)
}

pub async fn register_scripted(factories: &FactoryRegistry) {
    for plugin_type in PluginType::ALL {
        let factory = |config: &PluginConfig| -> PluginResult<Box<dyn Plugin>> {
            Ok(Box::new(ScriptedPlugin::new(config)))
        };
        factories
            .register(plugin_type, Arc::new(factory))
            .await
            .unwrap();
    }
}

/// Write a plugin config file in YAML
pub async fn write_plugin_config(path: &Path, name: &str, version: &str, settings: &str) {
    let content = format!(
        "name: {name}\ntype: input\nversion: \"{version}\"\ndescription: test plugin\nsettings:\n{settings}"
    );
    tokio::fs::write(path, content).await.unwrap();
}

/// Poll `check` every 25ms until it holds or `attempts` run out
pub async fn eventually<F, Fut>(manager: &Arc<PluginManager>, attempts: usize, check: F) -> bool
where
    F: Fn(Arc<PluginManager>) -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..attempts {
        if check(Arc::clone(manager)).await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    false
}
