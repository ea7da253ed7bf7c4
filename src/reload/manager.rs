// ! Atomic plugin reload
// !
// ! Module replaces a running plugin's configuration as one transaction:
// ! validate, snapshot, stop, load, start, wait for health. Any failure after
// ! the snapshot restores the previous configuration.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::core::config::RuntimeConfig;
use crate::core::error::{PluginError, PluginResult};
use crate::core::health::{HealthStatus, PluginHealth, check_with_timeout};
use crate::core::logging::ErrorContext;
use crate::core::metrics::{LifecycleMetrics, ReloadOutcome};
use crate::plugin::config::PluginConfig;
use crate::plugin::manager::PluginManager;
use crate::plugin::types::{PluginState, PluginStatus};
use crate::reload::dispatch::HotReloadSession;
use crate::reload::transaction::{
    ConfigSnapshot, PhaseObserver, ReloadOptions, ReloadPhase, ReloadTransaction, RestorePlan,
    SystemConstraint, validate_reload,
};
use crate::reload::versions::ConfigVersionManager;
use crate::reload::watcher::WatcherConfig;

/// Releases a plugin's reload slot when dropped
struct ReloadSlot<'a> {
    active: &'a Mutex<HashMap<String, String>>,
    plugin: String,
}

impl Drop for ReloadSlot<'_> {
    fn drop(&mut self) {
        self.active.lock().remove(&self.plugin);
    }
}

/// Transactional reloads on top of a [`PluginManager`]
pub struct ReloadManager {
    pub(super) manager: Arc<PluginManager>,
    versions: Option<Arc<ConfigVersionManager>>,
    options: ReloadOptions,
    constraints: Vec<Arc<dyn SystemConstraint>>,
    observer: Option<PhaseObserver>,
    /// Plugin name -> transaction id of the reload in flight
    active: Mutex<HashMap<String, String>>,
    metrics: LifecycleMetrics,
    pub(super) watcher_config: WatcherConfig,
    pub(super) hot_reload: tokio::sync::Mutex<Option<HotReloadSession>>,
    /// Last applied configuration per watched file
    pub(super) file_configs: RwLock<HashMap<PathBuf, PluginConfig>>,
}

impl ReloadManager {
    /// Create a reload manager with default options and no version history
    pub fn new(manager: Arc<PluginManager>) -> Self {
        let metrics = manager.metrics().clone();
        Self {
            manager,
            versions: None,
            options: ReloadOptions::default(),
            constraints: Vec::new(),
            observer: None,
            active: Mutex::new(HashMap::new()),
            metrics,
            watcher_config: WatcherConfig::default(),
            hot_reload: tokio::sync::Mutex::new(None),
            file_configs: RwLock::new(HashMap::new()),
        }
    }

    /// Create a reload manager from runtime settings
    pub fn from_config(manager: Arc<PluginManager>, config: &RuntimeConfig) -> Self {
        let mut reload = Self::new(manager)
            .with_options(ReloadOptions::from(&config.reload))
            .with_watcher_config(WatcherConfig::from(&config.hot_reload));
        if config.versioning.enabled {
            reload = reload.with_versions(Arc::new(ConfigVersionManager::from_settings(
                &config.versioning,
            )));
        }
        reload
    }

    /// Health-check phase bounds
    pub fn with_options(mut self, options: ReloadOptions) -> Self {
        self.options = options;
        self
    }

    /// Record pre-reload backups and committed configurations
    pub fn with_versions(mut self, versions: Arc<ConfigVersionManager>) -> Self {
        self.versions = Some(versions);
        self
    }

    /// Add a host-defined validation
    pub fn with_constraint(mut self, constraint: Arc<dyn SystemConstraint>) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Observe every phase transition
    pub fn with_observer(mut self, observer: PhaseObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Watcher settings used by hot reload
    pub fn with_watcher_config(mut self, config: WatcherConfig) -> Self {
        self.watcher_config = config;
        self
    }

    /// Underlying lifecycle manager
    pub fn plugin_manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    /// Version history, when enabled
    pub fn versions(&self) -> Option<&Arc<ConfigVersionManager>> {
        self.versions.as_ref()
    }

    /// Reloads in flight: plugin name -> transaction id
    pub fn active_reloads(&self) -> HashMap<String, String> {
        self.active.lock().clone()
    }

    /// Whether a reload of `name` is in flight
    pub fn is_reloading(&self, name: &str) -> bool {
        self.active.lock().contains_key(name)
    }

    /// Replace the configuration of `name` with `new_config`
    ///
    /// On failure after the snapshot the previous configuration is restored
    /// and `ReloadFailed` is returned; if restoring fails too the result is
    /// `RollbackFailed`. A second reload of the same plugin while one is in
    /// flight fails immediately with `ReloadInProgress`.
    pub async fn atomic_reload(&self, name: &str, new_config: PluginConfig) -> PluginResult<()> {
        let mut tx = ReloadTransaction::new(name, new_config);
        let _slot = self.claim(name, &tx.id)?;

        info!(
            plugin = name,
            transaction_id = tx.id.as_str(),
            "Starting atomic reload"
        );
        self.observe(&tx);

        let current = self.manager.get_plugin_status(name).await;
        if let Err(e) = validate_reload(name, &tx.new_config, current.as_ref(), &self.constraints) {
            return Err(self.reject(&mut tx, e).await);
        }

        self.advance(&mut tx, ReloadPhase::Snapshot);
        let health = self.current_health(name, current.as_ref()).await;
        let usage = self.manager.get_plugin_resource_usage(name).await;
        let snapshot = ConfigSnapshot::capture(name, current.as_ref(), usage, health);
        if let (Some(versions), Some(previous)) = (&self.versions, &snapshot.config) {
            if let Err(e) = versions.save_version(previous, "pre_reload_backup").await {
                warn!("Failed to back up configuration of '{}': {}", name, e);
            }
        }
        tx.snapshot = Some(snapshot);

        match self.apply(&mut tx).await {
            Ok(()) => {
                self.commit(&mut tx).await;
                Ok(())
            }
            Err(cause) => Err(self.rollback(&mut tx, cause).await),
        }
    }

    fn claim(&self, name: &str, transaction_id: &str) -> PluginResult<ReloadSlot<'_>> {
        let mut active = self.active.lock();
        if let Some(existing) = active.get(name) {
            return Err(PluginError::ReloadInProgress {
                plugin: name.to_string(),
                transaction_id: existing.clone(),
            });
        }
        active.insert(name.to_string(), transaction_id.to_string());
        Ok(ReloadSlot {
            active: &self.active,
            plugin: name.to_string(),
        })
    }

    async fn apply(&self, tx: &mut ReloadTransaction) -> PluginResult<()> {
        let name = tx.plugin_name.clone();

        self.advance(tx, ReloadPhase::Stopping);
        self.teardown(&name).await?;

        self.advance(tx, ReloadPhase::Loading);
        self.manager.load_plugin(tx.new_config.clone()).await?;

        if !tx.new_config.enabled {
            debug!("Plugin '{}' disabled by new configuration, leaving it loaded", name);
            return Ok(());
        }

        self.advance(tx, ReloadPhase::Starting);
        self.manager.start_plugin(&name).await?;

        self.advance(tx, ReloadPhase::HealthCheck);
        self.wait_for_healthy(&name).await
    }

    /// Stop unless known to be stopped, then unload if known
    pub(super) async fn teardown(&self, name: &str) -> PluginResult<()> {
        if self.manager.needs_stop(name).await {
            self.manager.stop_plugin(name).await?;
        }
        match self.manager.unload_plugin(name).await {
            Ok(()) | Err(PluginError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn commit(&self, tx: &mut ReloadTransaction) {
        self.advance(tx, ReloadPhase::Complete);

        if let Some(versions) = &self.versions {
            if let Err(e) = versions
                .save_version(&tx.new_config, "hot_reload_success")
                .await
            {
                warn!("Failed to record configuration of '{}': {}", tx.plugin_name, e);
            }
        }

        self.metrics.record_reload(ReloadOutcome::Committed).await;
        info!(
            plugin = tx.plugin_name.as_str(),
            transaction_id = tx.id.as_str(),
            "Reload committed in {:?}",
            tx.duration()
        );
    }

    async fn reject(&self, tx: &mut ReloadTransaction, error: PluginError) -> PluginError {
        tx.record_error(&error);
        self.log(tx, &error);
        self.advance(tx, ReloadPhase::Failed);
        self.metrics.record_reload(ReloadOutcome::Rejected).await;
        error
    }

    async fn rollback(&self, tx: &mut ReloadTransaction, cause: PluginError) -> PluginError {
        tx.record_error(&cause);
        self.log(tx, &cause);
        self.advance(tx, ReloadPhase::Rollback);

        let plan = tx
            .snapshot
            .as_ref()
            .map_or(RestorePlan::CleanupOnly, ConfigSnapshot::restore_plan);
        warn!(
            "Rolling back reload of '{}' after {} failure",
            tx.plugin_name, cause
        );
        let restored = self.restore(&tx.plugin_name, plan).await;
        self.advance(tx, ReloadPhase::Failed);

        match restored {
            Ok(()) => {
                self.metrics.record_reload(ReloadOutcome::RolledBack).await;
                PluginError::ReloadFailed {
                    plugin: tx.plugin_name.clone(),
                    cause: cause.to_string(),
                }
            }
            Err(rollback_error) => {
                tx.record_error(&rollback_error);
                let error = PluginError::RollbackFailed {
                    plugin: tx.plugin_name.clone(),
                    cause: cause.to_string(),
                    rollback_error: rollback_error.to_string(),
                };
                self.log(tx, &error);
                self.metrics.record_reload(ReloadOutcome::RollbackFailed).await;
                error
            }
        }
    }

    async fn restore(&self, name: &str, plan: RestorePlan) -> PluginResult<()> {
        // Remove whatever the failed attempt left registered
        if self.manager.needs_stop(name).await {
            if let Err(e) = self.manager.stop_plugin(name).await {
                warn!("Cleanup stop of '{}' failed: {}", name, e);
            }
        }
        match self.manager.unload_plugin(name).await {
            Ok(()) | Err(PluginError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        match plan {
            RestorePlan::CleanupOnly => Ok(()),
            RestorePlan::Load(config, state) => {
                self.manager.load_plugin(config).await?;
                if state != PluginState::Loaded {
                    self.manager.restore_state(name, state).await?;
                }
                Ok(())
            }
            RestorePlan::LoadAndStart(config) => {
                self.manager.load_plugin(config).await?;
                self.manager.start_plugin(name).await
            }
        }
    }

    /// Poll health until `Healthy`, bounded by retries and an overall deadline
    async fn wait_for_healthy(&self, name: &str) -> PluginResult<()> {
        let plugin = self
            .manager
            .get_plugin(name)
            .await
            .ok_or_else(|| PluginError::not_found(format!("plugin '{name}'")))?;
        let options = self.options;

        let poll = async {
            let mut ticker = tokio::time::interval(options.health_check_interval);
            let mut failures = 0u32;
            loop {
                ticker.tick().await;
                let health = plugin.health().await;
                match health.status {
                    HealthStatus::Healthy => return Ok(()),
                    HealthStatus::Stopped => {
                        return Err(PluginError::HealthCheckFailed {
                            plugin: name.to_string(),
                            reason: format!("plugin reported stopped: {}", health.message),
                        });
                    }
                    status => {
                        failures += 1;
                        debug!(
                            "Health check {} for '{}' returned {}",
                            failures, name, status
                        );
                        if failures > options.max_health_retries {
                            return Err(PluginError::HealthCheckFailed {
                                plugin: name.to_string(),
                                reason: format!(
                                    "still {status} after {failures} checks: {}",
                                    health.message
                                ),
                            });
                        }
                    }
                }
            }
        };

        tokio::time::timeout(options.health_check_timeout, poll)
            .await
            .unwrap_or_else(|_| {
                Err(PluginError::timeout(format!(
                    "plugin '{name}' did not become healthy within {:?}",
                    options.health_check_timeout
                )))
            })
    }

    async fn current_health(&self, name: &str, status: Option<&PluginStatus>) -> PluginHealth {
        let Some(status) = status else {
            return PluginHealth::stopped("not loaded");
        };
        if !status.state.is_active() {
            return PluginHealth::stopped(format!("plugin is {}", status.state));
        }
        match self.manager.get_plugin(name).await {
            Some(plugin) => {
                check_with_timeout(name, self.options.health_check_timeout, plugin.health()).await
            }
            None => PluginHealth::unknown("plugin not registered"),
        }
    }

    fn advance(&self, tx: &mut ReloadTransaction, phase: ReloadPhase) {
        debug!(
            plugin = tx.plugin_name.as_str(),
            transaction_id = tx.id.as_str(),
            "Reload phase: {}",
            phase
        );
        tx.enter(phase);
        self.observe(tx);
    }

    fn observe(&self, tx: &ReloadTransaction) {
        if let Some(observer) = &self.observer {
            observer(tx);
        }
    }

    fn log(&self, tx: &ReloadTransaction, error: &PluginError) {
        error.log_with_context(
            &ErrorContext::new("atomic_reload")
                .with_plugin(&tx.plugin_name)
                .with_phase(tx.phase.as_str())
                .with_transaction(&tx.id),
        );
    }
}
