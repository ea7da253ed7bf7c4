// ! Scriptable plugin used by the unit tests
// !
// ! Behaviour is driven by settings so reload tests can swap it through
// ! configuration alone:
// !   health: healthy | degraded | unhealthy | error | stopped
// !   fail_start / fail_stop / fail_configure: bool
// !   stop_delay_ms: number
// ! A health override set from the test is cleared by the next start.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::core::error::{PluginError, PluginResult};
use crate::core::health::{HealthStatus, PluginHealth};
use crate::plugin::api::{Plugin, PluginCapabilities, PluginInfo, PluginMetadata};
use crate::plugin::config::{PluginConfig, PluginType};
use crate::plugin::factory::PluginFactory;

#[derive(Default)]
struct MockState {
    running: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
    settings: Mutex<HashMap<String, Value>>,
    health_override: Mutex<Option<HealthStatus>>,
}

/// Cloneable handle; clones share state
#[derive(Clone)]
pub struct MockPlugin {
    metadata: PluginMetadata,
    state: Arc<MockState>,
}

impl MockPlugin {
    pub fn new(config: &PluginConfig) -> Self {
        let state = MockState::default();
        *state.settings.lock() = config.settings.clone();
        Self {
            metadata: PluginMetadata::new(&config.name, &config.version, config.plugin_type),
            state: Arc::new(state),
        }
    }

    pub fn set_health(&self, status: HealthStatus) {
        *self.state.health_override.lock() = Some(status);
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.state.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }

    pub fn setting(&self, key: &str) -> Option<Value> {
        self.state.settings.lock().get(key).cloned()
    }

    fn flag(&self, key: &str) -> bool {
        self.setting(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }
}

#[async_trait]
impl Plugin for MockPlugin {
    async fn start(&self) -> PluginResult<()> {
        self.state.starts.fetch_add(1, Ordering::SeqCst);
        self.state.health_override.lock().take();
        if self.flag("fail_start") {
            return Err(PluginError::internal("scripted start failure"));
        }
        self.state.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> PluginResult<()> {
        self.state.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.setting("stop_delay_ms").and_then(|v| v.as_u64()) {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        if self.flag("fail_stop") {
            return Err(PluginError::internal("scripted stop failure"));
        }
        self.state.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn health(&self) -> PluginHealth {
        if let Some(status) = *self.state.health_override.lock() {
            return PluginHealth::new(status, "overridden");
        }
        if !self.is_running() {
            return PluginHealth::stopped("not running");
        }
        let scripted = self
            .setting("health")
            .and_then(|v| v.as_str().map(str::to_string));
        match scripted.as_deref() {
            None | Some("healthy") => PluginHealth::healthy("ok"),
            Some("degraded") => PluginHealth::degraded("scripted"),
            Some("unhealthy") => PluginHealth::unhealthy("scripted"),
            Some("stopped") => PluginHealth::stopped("scripted"),
            Some(_) => PluginHealth::error("scripted"),
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
            features: Vec::new(),
        }
    }

    fn metadata(&self) -> PluginMetadata {
        self.metadata.clone()
    }

    async fn configure(&self, settings: &HashMap<String, Value>) -> PluginResult<()> {
        if settings.get("fail_configure").and_then(|v| v.as_bool()) == Some(true) {
            return Err(PluginError::validation("scripted configure failure"));
        }
        *self.state.settings.lock() = settings.clone();
        Ok(())
    }
}

/// Factory that remembers every instance it built, by name
#[derive(Clone, Default)]
pub struct MockFactory {
    instances: Arc<Mutex<HashMap<String, MockPlugin>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent instance built for `name`
    pub fn instance(&self, name: &str) -> Option<MockPlugin> {
        self.instances.lock().get(name).cloned()
    }
}

impl PluginFactory for MockFactory {
    fn create(&self, config: &PluginConfig) -> PluginResult<Box<dyn Plugin>> {
        if config.setting("fail_create").and_then(|v| v.as_bool()) == Some(true) {
            return Err(PluginError::internal("scripted create failure"));
        }
        let plugin = MockPlugin::new(config);
        self.instances
            .lock()
            .insert(config.name.clone(), plugin.clone());
        Ok(Box::new(plugin))
    }
}

/// Register `factory` for every plugin type
pub async fn register_everywhere(
    factories: &crate::plugin::factory::FactoryRegistry,
    factory: &MockFactory,
) {
    for plugin_type in PluginType::ALL {
        factories
            .register(plugin_type, Arc::new(factory.clone()))
            .await
            .unwrap();
    }
}
