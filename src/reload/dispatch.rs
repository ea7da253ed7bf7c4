// ! Hot reload dispatch
// !
// ! Module connects the watcher to the reload manager: each debounced file
// ! change is parsed, diffed against the last applied configuration of that
// ! file and turned into a load, reload or unload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::error::{PluginError, PluginResult};
use crate::plugin::config::PluginConfig;
use crate::plugin::discovery::DirectoryDiscovery;
use crate::reload::delta::{ChangeKind, ConfigDelta};
use crate::reload::manager::ReloadManager;
use crate::reload::watcher::{FileChangeEvent, HotReloadWatcher};

/// Running hot reload: the watcher and the task consuming its events
pub(crate) struct HotReloadSession {
    watcher: HotReloadWatcher,
    token: CancellationToken,
    task: JoinHandle<()>,
    root: PathBuf,
}

impl ReloadManager {
    /// Watch `dir` and apply configuration changes as they settle
    ///
    /// Files already present are recorded as the baseline without being
    /// loaded; use `PluginManager::discover_and_load_plugins` for that.
    pub async fn enable_hot_reload(
        self: &Arc<Self>,
        dir: impl AsRef<Path>,
        token: CancellationToken,
    ) -> PluginResult<()> {
        let dir = dir.as_ref().to_path_buf();
        let mut session = self.hot_reload.lock().await;
        if session.is_some() {
            return Err(PluginError::AlreadyExists(format!(
                "hot reload already enabled for {}",
                dir.display()
            )));
        }

        let discovery =
            DirectoryDiscovery::new().with_extensions(self.watcher_config.extensions.clone());
        let baseline = discovery.discover_files(&dir).await?;
        {
            let mut file_configs = self.file_configs.write().await;
            file_configs.clear();
            file_configs.extend(baseline);
        }

        let watcher = HotReloadWatcher::new(self.watcher_config.clone());
        let token = token.child_token();
        let mut events = watcher.start(&dir, token.clone()).await?;

        let weak = Arc::downgrade(self);
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        let Some(manager) = weak.upgrade() else { break };
                        if let Err(e) = manager.handle_file_change(&event).await {
                            warn!("Hot reload of {:?} failed: {}", event.path, e);
                        }
                    }
                }
            }
            debug!("Hot reload dispatch stopped");
        });

        info!("Hot reload enabled for {:?}", dir);
        *session = Some(HotReloadSession {
            watcher,
            token,
            task,
            root: dir,
        });
        Ok(())
    }

    /// Stop watching; reloads already running finish
    pub async fn disable_hot_reload(&self) {
        let session = self.hot_reload.lock().await.take();
        if let Some(session) = session {
            session.token.cancel();
            session.watcher.stop().await;
            if let Err(e) = session.task.await {
                if !e.is_cancelled() {
                    warn!("Hot reload dispatch ended abnormally: {}", e);
                }
            }
            info!("Hot reload disabled for {:?}", session.root);
        }
    }

    /// Whether a watcher is running
    pub async fn is_hot_reload_enabled(&self) -> bool {
        self.hot_reload
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
    }

    /// Apply one file change
    ///
    /// Returns the computed delta, or `None` when the file was neither known
    /// nor present. An unreadable or invalid file is an error and leaves the
    /// last applied configuration in place; a failed apply is retried on the
    /// next change to the file.
    pub async fn handle_file_change(
        &self,
        event: &FileChangeEvent,
    ) -> PluginResult<Option<ConfigDelta>> {
        let path = &event.path;
        let new = if tokio::fs::try_exists(path).await.unwrap_or(false) {
            let config = PluginConfig::from_file(path).await?;
            config.validate()?;
            Some(config)
        } else {
            None
        };

        let old = self.file_configs.read().await.get(path).cloned();
        let Some(delta) = ConfigDelta::compute(old.as_ref(), new.as_ref()) else {
            return Ok(None);
        };

        if delta.is_noop() {
            debug!("No effective change in {:?}", path);
            return Ok(Some(delta));
        }

        info!(
            "Plugin config {:?} changed ({:?} '{}')",
            path, delta.kind, delta.plugin_name
        );
        self.apply_delta(path, &delta).await?;

        let mut file_configs = self.file_configs.write().await;
        match new {
            Some(config) => file_configs.insert(path.clone(), config),
            None => file_configs.remove(path),
        };
        Ok(Some(delta))
    }

    async fn apply_delta(&self, path: &Path, delta: &ConfigDelta) -> PluginResult<()> {
        match (delta.kind, &delta.old, &delta.new) {
            (ChangeKind::Create, _, Some(new)) => self.apply_config(new).await,
            (ChangeKind::Delete, Some(old), _) => self.retire_unless_claimed(path, &old.name).await,
            (ChangeKind::Update, Some(old), Some(new)) => {
                if delta.enabled_changed() {
                    let verb = if new.enabled { "enabled" } else { "disabled" };
                    info!("Plugin '{}' {} by {:?}", new.name, verb, path);
                }
                if delta.is_rename() {
                    self.retire_unless_claimed(path, &old.name).await?;
                }
                self.apply_config(new).await
            }
            _ => Ok(()),
        }
    }

    async fn apply_config(&self, config: &PluginConfig) -> PluginResult<()> {
        if !config.enabled {
            return self.teardown(&config.name).await;
        }
        if self.manager.get_plugin_status(&config.name).await.is_some() {
            return self.atomic_reload(&config.name, config.clone()).await;
        }
        self.manager.load_plugin(config.clone()).await?;
        self.manager.start_plugin(&config.name).await
    }

    /// Retire `name` unless another watched file still defines it
    async fn retire_unless_claimed(&self, path: &Path, name: &str) -> PluginResult<()> {
        let claimed = self
            .file_configs
            .read()
            .await
            .iter()
            .any(|(other, config)| other != path && config.name == name);
        if claimed {
            debug!("Plugin '{}' still defined by another file", name);
            return Ok(());
        }
        self.teardown(name).await
    }
}
