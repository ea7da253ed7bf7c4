// ! Plugin lifecycle manager
// !
// ! Module drives plugins through load, start, stop and unload, keeping a
// ! status record and resource usage entry per plugin name.

use futures::future::join_all;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::core::error::{PluginError, PluginResult};
use crate::core::logging::ErrorContext;
use crate::core::metrics::LifecycleMetrics;
use crate::plugin::api::Plugin;
use crate::plugin::discovery::{DirectoryDiscovery, PluginDiscovery};
use crate::plugin::factory::{FactoryRegistry, PluginFactory};
use crate::plugin::hooks::{LifecycleEvent, LifecycleHooks};
use crate::plugin::config::{PluginConfig, PluginType};
use crate::plugin::monitor::MonitorHandle;
use crate::plugin::registry::PluginRegistry;
use crate::plugin::types::{PluginState, PluginStatus, ResourceUsage};

/// Default deadline for a single health call
const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle manager for media-sync plugins
pub struct PluginManager {
    /// Live instances
    pub(crate) registry: Arc<PluginRegistry>,

    /// Constructors per plugin type
    factories: Arc<FactoryRegistry>,

    /// Status per plugin name
    statuses: Arc<RwLock<HashMap<String, PluginStatus>>>,

    /// Resource usage per plugin name
    resources: Arc<RwLock<HashMap<String, ResourceUsage>>>,

    /// Start/stop hooks
    hooks: LifecycleHooks,

    /// Configuration source for bulk loading
    discovery: Arc<dyn PluginDiscovery>,

    /// Operation counters
    pub(crate) metrics: LifecycleMetrics,

    /// Running health monitor, if any
    pub(crate) monitor: Mutex<Option<MonitorHandle>>,

    /// Deadline for a single plugin health call
    pub(crate) health_check_timeout: Duration,
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new(
            Arc::new(PluginRegistry::new()),
            Arc::new(FactoryRegistry::new()),
        )
    }
}

impl PluginManager {
    /// Create a manager over explicit registries
    pub fn new(registry: Arc<PluginRegistry>, factories: Arc<FactoryRegistry>) -> Self {
        Self {
            registry,
            factories,
            statuses: Arc::new(RwLock::new(HashMap::new())),
            resources: Arc::new(RwLock::new(HashMap::new())),
            hooks: LifecycleHooks::new(),
            discovery: Arc::new(DirectoryDiscovery::new()),
            metrics: LifecycleMetrics::new(),
            monitor: Mutex::new(None),
            health_check_timeout: DEFAULT_HEALTH_CHECK_TIMEOUT,
        }
    }

    /// Replace the discovery used by `discover_and_load_plugins`
    pub fn with_discovery(mut self, discovery: Arc<dyn PluginDiscovery>) -> Self {
        self.discovery = discovery;
        self
    }

    /// Share a metrics collector
    pub fn with_metrics(mut self, metrics: LifecycleMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Deadline for a single health call made by the monitor
    pub fn with_health_check_timeout(mut self, timeout: Duration) -> Self {
        self.health_check_timeout = timeout;
        self
    }

    /// Plugin registry
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Factory registry
    pub fn factories(&self) -> &Arc<FactoryRegistry> {
        &self.factories
    }

    /// Lifecycle hooks
    pub fn hooks(&self) -> &LifecycleHooks {
        &self.hooks
    }

    /// Operation counters
    pub fn metrics(&self) -> &LifecycleMetrics {
        &self.metrics
    }

    /// Register the factory for a plugin type
    pub async fn register_factory(
        &self,
        plugin_type: PluginType,
        factory: Arc<dyn PluginFactory>,
    ) -> PluginResult<()> {
        self.factories.register(plugin_type, factory).await
    }

    /// Register a lifecycle hook
    pub async fn register_lifecycle_hook<F, Fut>(&self, event: LifecycleEvent, hook: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = PluginResult<()>> + Send + 'static,
    {
        self.hooks.register(event, hook).await;
    }

    /// Register a lifecycle hook by event name (`"pre-start"`, `"post-stop"`, ...)
    pub async fn register_named_hook<F, Fut>(&self, event: &str, hook: F) -> PluginResult<()>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = PluginResult<()>> + Send + 'static,
    {
        let event: LifecycleEvent = event.parse()?;
        self.register_lifecycle_hook(event, hook).await;
        Ok(())
    }

    /// Create, configure and register a plugin from `config`
    pub async fn load_plugin(&self, config: PluginConfig) -> PluginResult<()> {
        let name = config.name.clone();
        if name.trim().is_empty() {
            return Err(PluginError::invalid_argument("plugin name cannot be empty"));
        }
        info!("Loading plugin: {} ({})", name, config.plugin_type);

        if let Err(e) = config.validate() {
            return Err(self.fail(&name, "load_plugin", e).await);
        }

        // The live instance keeps its status; only a racing load lands in Error
        if self.registry.contains(&name).await {
            let err = PluginError::AlreadyRegistered(name.clone());
            err.log_with_context(&ErrorContext::new("load_plugin").with_plugin(&name));
            self.metrics.record_operation("load_plugin", false).await;
            self.metrics.record_error(&err, "load_plugin").await;
            return Err(err);
        }

        self.set_state(&name, PluginState::Loading, "loading").await;

        let factory = match self.factories.get(config.plugin_type).await {
            Ok(factory) => factory,
            Err(e) => return Err(self.fail(&name, "load_plugin", e).await),
        };

        let plugin: Arc<dyn Plugin> = match factory.create(&config) {
            Ok(plugin) => Arc::from(plugin),
            Err(e) => {
                let err = PluginError::CreationFailed {
                    plugin: name.clone(),
                    reason: e.to_string(),
                };
                return Err(self.fail(&name, "load_plugin", err).await);
            }
        };

        if !config.settings.is_empty() {
            if let Err(e) = plugin.configure(&config.settings).await {
                let err = PluginError::ConfigurationFailed {
                    plugin: name.clone(),
                    reason: e.to_string(),
                };
                return Err(self.fail(&name, "load_plugin", err).await);
            }
        }

        if let Err(e) = self.registry.register(&name, plugin).await {
            let err = match e {
                PluginError::AlreadyExists(_) => PluginError::AlreadyRegistered(name.clone()),
                other => other,
            };
            return Err(self.fail(&name, "load_plugin", err).await);
        }

        {
            let mut statuses = self.statuses.write().await;
            let mut status = PluginStatus::new(PluginState::Loaded, "loaded");
            status.config = Some(config);
            statuses.insert(name.clone(), status);
        }
        self.metrics.record_operation("load_plugin", true).await;
        info!("Plugin loaded: {}", name);
        Ok(())
    }

    /// Start a loaded plugin
    pub async fn start_plugin(&self, name: &str) -> PluginResult<()> {
        let plugin = self.require(name).await?;

        if self.state_of(name).await == Some(PluginState::Running) {
            debug!("Plugin '{}' already running", name);
            return Ok(());
        }

        // Pre-start hooks veto without touching status
        if let Err(e) = self.hooks.run(LifecycleEvent::PreStart, name).await {
            e.log_with_context(&ErrorContext::new("start_plugin").with_plugin(name));
            self.metrics.record_error(&e, "start_plugin").await;
            return Err(e);
        }

        info!("Starting plugin: {}", name);
        self.set_state(name, PluginState::Starting, "starting").await;

        if let Err(e) = plugin.start().await {
            let err = PluginError::StartFailed {
                plugin: name.to_string(),
                reason: e.to_string(),
            };
            return Err(self.fail(name, "start_plugin", err).await);
        }

        self.set_state(name, PluginState::Running, "running").await;
        self.resources
            .write()
            .await
            .insert(name.to_string(), ResourceUsage::initial());
        self.metrics.record_operation("start_plugin", true).await;

        if let Err(e) = self.hooks.run(LifecycleEvent::PostStart, name).await {
            warn!("Post-start hook failed for plugin '{}': {}", name, e);
        }
        Ok(())
    }

    /// Stop a plugin
    pub async fn stop_plugin(&self, name: &str) -> PluginResult<()> {
        let plugin = self.require(name).await?;

        if let Err(e) = self.hooks.run(LifecycleEvent::PreStop, name).await {
            e.log_with_context(&ErrorContext::new("stop_plugin").with_plugin(name));
            self.metrics.record_error(&e, "stop_plugin").await;
            return Err(e);
        }

        info!("Stopping plugin: {}", name);
        self.set_state(name, PluginState::Stopping, "stopping").await;

        if let Err(e) = plugin.stop().await {
            let err = PluginError::StopFailed {
                plugin: name.to_string(),
                reason: e.to_string(),
            };
            return Err(self.fail(name, "stop_plugin", err).await);
        }

        self.set_state(name, PluginState::Stopped, "stopped").await;
        self.resources
            .write()
            .await
            .insert(name.to_string(), ResourceUsage::default());
        self.metrics.record_operation("stop_plugin", true).await;

        if let Err(e) = self.hooks.run(LifecycleEvent::PostStop, name).await {
            warn!("Post-stop hook failed for plugin '{}': {}", name, e);
        }
        Ok(())
    }

    /// Unregister a plugin and forget its status
    ///
    /// The plugin is not stopped first; callers stop running plugins before
    /// unloading them.
    pub async fn unload_plugin(&self, name: &str) -> PluginResult<()> {
        let registered = self.registry.contains(name).await;
        let tracked = self.statuses.read().await.contains_key(name);
        if !registered && !tracked {
            return Err(PluginError::not_found(format!("plugin '{name}'")));
        }

        info!("Unloading plugin: {}", name);
        if self.state_of(name).await.is_some_and(|s| s.is_active()) {
            warn!("Unloading plugin '{}' while it is still active", name);
        }
        self.set_state(name, PluginState::Unloading, "unloading").await;

        if registered {
            // Concurrent unload may have raced us; the outcome is the same.
            if let Err(e) = self.registry.unregister(name).await {
                debug!("Plugin '{}' already unregistered: {}", name, e);
            }
        }

        self.statuses.write().await.remove(name);
        self.resources.write().await.remove(name);
        self.metrics.record_operation("unload_plugin", true).await;
        Ok(())
    }

    /// Current status of a plugin
    pub async fn get_plugin_status(&self, name: &str) -> Option<PluginStatus> {
        self.statuses.read().await.get(name).cloned()
    }

    /// Snapshot of every status
    pub async fn list_plugin_statuses(&self) -> HashMap<String, PluginStatus> {
        self.statuses.read().await.clone()
    }

    /// Current resource usage of a plugin
    pub async fn get_plugin_resource_usage(&self, name: &str) -> Option<ResourceUsage> {
        self.resources.read().await.get(name).copied()
    }

    /// Replace the resource usage reported for a plugin
    pub async fn update_resource_usage(&self, name: &str, usage: ResourceUsage) -> PluginResult<()> {
        if !self.statuses.read().await.contains_key(name) {
            return Err(PluginError::not_found(format!("plugin '{name}'")));
        }
        self.resources.write().await.insert(name.to_string(), usage);
        Ok(())
    }

    /// Shared handle to a registered plugin
    pub async fn get_plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.registry.get(name).await
    }

    /// Load and start every enabled configuration found in `dir`
    ///
    /// Returns the number of plugins that were both loaded and started.
    /// Individual failures are logged and skipped.
    pub async fn discover_and_load_plugins(&self, dir: impl AsRef<Path>) -> PluginResult<usize> {
        let dir = dir.as_ref();
        let configs = self
            .discovery
            .discover(dir)
            .await
            .map_err(|e| match e {
                PluginError::Discovery(_) => e,
                other => PluginError::Discovery(other.to_string()),
            })?;

        let mut started = 0;
        for config in configs {
            let name = config.name.clone();
            if !config.enabled {
                debug!("Skipping disabled plugin '{}'", name);
                continue;
            }
            if let Err(e) = self.load_plugin(config).await {
                warn!("Failed to load plugin '{}': {}", name, e);
                continue;
            }
            if let Err(e) = self.start_plugin(&name).await {
                warn!("Failed to start plugin '{}': {}", name, e);
                continue;
            }
            started += 1;
        }

        info!("Started {} plugin(s) from {:?}", started, dir);
        Ok(started)
    }

    /// Stop monitoring and every plugin that may be running, collecting failures
    pub async fn shutdown(&self) -> PluginResult<()> {
        self.stop_health_monitoring().await;

        let mut failures = Vec::new();
        for name in self.plugins_to_stop().await {
            if let Err(e) = self.stop_plugin(&name).await {
                failures.push(format!("{name}: {e}"));
            }
        }

        if failures.is_empty() {
            info!("Plugin manager shut down");
            Ok(())
        } else {
            Err(PluginError::Shutdown { failures })
        }
    }

    /// Stop every plugin that may be running, concurrently within `timeout`
    ///
    /// Plugins that are Loaded or Stopped hold nothing to release and are
    /// skipped; Error counts as possibly running.
    pub async fn graceful_shutdown(&self, timeout: Duration) -> PluginResult<()> {
        self.stop_health_monitoring().await;

        let names = self.plugins_to_stop().await;
        let total = names.len();
        let completed = Arc::new(AtomicUsize::new(0));
        info!("Gracefully stopping {} plugin(s)", total);

        let stops = names.into_iter().map(|name| {
            let completed = Arc::clone(&completed);
            async move {
                let result = self.stop_plugin(&name).await;
                completed.fetch_add(1, Ordering::SeqCst);
                result.err().map(|e| format!("{name}: {e}"))
            }
        });

        match tokio::time::timeout(timeout, join_all(stops)).await {
            Ok(results) => {
                let failures: Vec<String> = results.into_iter().flatten().collect();
                if failures.is_empty() {
                    Ok(())
                } else {
                    Err(PluginError::Shutdown { failures })
                }
            }
            Err(_) => Err(PluginError::timeout(format!(
                "graceful shutdown exceeded {:?}; {} of {} plugin(s) stopped",
                timeout,
                completed.load(Ordering::SeqCst),
                total
            ))),
        }
    }

    async fn plugins_to_stop(&self) -> Vec<String> {
        let registered = self.registry.names().await;
        let statuses = self.statuses.read().await;
        registered
            .into_iter()
            .filter(|name| statuses.get(name).is_none_or(|s| s.state.needs_stop()))
            .collect()
    }

    /// Whether `name` is registered and in a state that still needs a stop
    pub(crate) async fn needs_stop(&self, name: &str) -> bool {
        if !self.registry.contains(name).await {
            return false;
        }
        self.state_of(name).await.is_none_or(|s| s.needs_stop())
    }

    /// Put a loaded plugin back into `state` without calling into it
    pub(crate) async fn restore_state(&self, name: &str, state: PluginState) -> PluginResult<()> {
        if !self.statuses.read().await.contains_key(name) {
            return Err(PluginError::not_found(format!("plugin '{name}'")));
        }
        self.set_state(name, state, state.as_str()).await;
        Ok(())
    }

    async fn require(&self, name: &str) -> PluginResult<Arc<dyn Plugin>> {
        self.registry
            .get(name)
            .await
            .ok_or_else(|| PluginError::not_found(format!("plugin '{name}'")))
    }

    async fn state_of(&self, name: &str) -> Option<PluginState> {
        self.statuses.read().await.get(name).map(|s| s.state)
    }

    async fn set_state(&self, name: &str, state: PluginState, message: &str) {
        let mut statuses = self.statuses.write().await;
        let status = statuses
            .entry(name.to_string())
            .or_insert_with(|| PluginStatus::new(state, message));
        status.state = state;
        status.message = message.to_string();
        status.error = None;
        status.updated_at = chrono::Utc::now();
    }

    /// Record `err` against `name`, move it to Error and hand the error back
    async fn fail(&self, name: &str, operation: &str, err: PluginError) -> PluginError {
        {
            let mut statuses = self.statuses.write().await;
            let status = statuses
                .entry(name.to_string())
                .or_insert_with(|| PluginStatus::new(PluginState::Error, ""));
            status.state = PluginState::Error;
            status.message = format!("{operation} failed");
            status.error = Some(err.to_string());
            status.updated_at = chrono::Utc::now();
        }

        err.log_with_context(&ErrorContext::new(operation).with_plugin(name));
        self.metrics.record_operation(operation, false).await;
        self.metrics.record_error(&err, operation).await;
        err
    }
}
