// ! Plugin runtime
// !
// ! Module wires the lifecycle manager, health monitor and hot reload together
// ! from a single `RuntimeConfig`.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::config::RuntimeConfig;
use crate::core::error::PluginResult;
use crate::plugin::factory::FactoryRegistry;
use crate::plugin::manager::PluginManager;
use crate::plugin::registry::PluginRegistry;
use crate::plugin::types::HealthEvent;
use crate::reload::manager::ReloadManager;

/// Lifecycle manager, reload manager and their background tasks
pub struct PluginRuntime {
    config: RuntimeConfig,
    manager: Arc<PluginManager>,
    reload: Arc<ReloadManager>,
    token: CancellationToken,
}

impl PluginRuntime {
    /// Create a runtime with empty registries
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_registries(
            config,
            Arc::new(PluginRegistry::new()),
            Arc::new(FactoryRegistry::new()),
        )
    }

    /// Create a runtime over existing registries
    pub fn with_registries(
        config: RuntimeConfig,
        registry: Arc<PluginRegistry>,
        factories: Arc<FactoryRegistry>,
    ) -> Self {
        let manager = Arc::new(
            PluginManager::new(registry, factories)
                .with_health_check_timeout(Duration::from_millis(config.health.check_timeout_ms)),
        );
        let reload = Arc::new(ReloadManager::from_config(Arc::clone(&manager), &config));
        Self {
            config,
            manager,
            reload,
            token: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn plugin_manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    pub fn reload_manager(&self) -> &Arc<ReloadManager> {
        &self.reload
    }

    /// Token cancelling every background task of this runtime
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Load the plugin directory, start monitoring and, if enabled, hot reload
    ///
    /// Returns the health event stream. A missing plugin directory is not an
    /// error; the runtime starts empty and hot reload stays off.
    pub async fn start(&self) -> PluginResult<mpsc::Receiver<HealthEvent>> {
        self.config.validate()?;
        let dir = &self.config.plugin_dir;
        let dir_exists = tokio::fs::metadata(dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);

        let started = if dir_exists {
            self.manager.discover_and_load_plugins(dir).await?
        } else {
            warn!("Plugin directory {:?} does not exist", dir);
            0
        };

        let (events, receiver) = mpsc::channel(self.config.health.event_buffer);
        let interval = Duration::from_millis(self.config.health.interval_ms);
        if self.config.health.auto_recovery {
            self.manager
                .start_health_monitoring_with_recovery(self.token.clone(), events, interval)
                .await?;
        } else {
            self.manager
                .start_health_monitoring(self.token.clone(), events, interval)
                .await?;
        }

        if self.config.hot_reload.enabled && dir_exists {
            self.reload.enable_hot_reload(dir, self.token.clone()).await?;
        }

        info!("Plugin runtime started with {} plugin(s)", started);
        Ok(receiver)
    }

    /// Stop hot reload and monitoring, then stop plugins within `timeout`
    pub async fn shutdown(&self, timeout: Duration) -> PluginResult<()> {
        self.reload.disable_hot_reload().await;
        let result = self.manager.graceful_shutdown(timeout).await;
        self.token.cancel();
        info!("Plugin runtime stopped");
        result
    }
}
