// ! Configuration version history
// !
// ! Module persists every applied plugin configuration so operators can see
// ! what changed and roll back. Layout per plugin:
// !
// !   <root>/<plugin>/<version-id>.json   full record
// !   <root>/<plugin>/versions.json       index, oldest first
// !   <root>/<plugin>/current             id of the latest saved version

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::config::VersioningSettings;
use crate::core::error::{PluginError, PluginResult};
use crate::plugin::config::PluginConfig;

const INDEX_FILE: &str = "versions.json";
const CURRENT_FILE: &str = "current";

/// Versions kept per plugin unless configured otherwise
pub const DEFAULT_MAX_VERSIONS: usize = 10;

/// Lifecycle of a stored version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    /// Most recently applied configuration
    Active,
    /// Previously applied configuration known to work
    Stable,
    /// Configuration that failed to apply
    Failed,
    /// Kept for reference only
    Archived,
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VersionStatus::Active => "active",
            VersionStatus::Stable => "stable",
            VersionStatus::Failed => "failed",
            VersionStatus::Archived => "archived",
        };
        f.write_str(s)
    }
}

/// Index entry describing one stored version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    /// SHA-256 of the canonical JSON encoding of the configuration
    pub hash: String,
    pub status: VersionStatus,
}

/// A stored configuration version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigVersion {
    pub id: String,
    pub plugin_name: String,
    pub config: PluginConfig,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub hash: String,
    pub status: VersionStatus,
}

impl ConfigVersion {
    /// Index entry for this version
    pub fn info(&self) -> VersionInfo {
        VersionInfo {
            id: self.id.clone(),
            timestamp: self.timestamp,
            reason: self.reason.clone(),
            hash: self.hash.clone(),
            status: self.status,
        }
    }
}

/// Stable content hash of a configuration
///
/// Settings are hashed through `serde_json::Value`, whose maps are ordered, so
/// equal configurations hash equally regardless of insertion order.
pub fn config_hash(config: &PluginConfig) -> PluginResult<String> {
    let canonical = serde_json::to_vec(&serde_json::to_value(config)?)?;
    let digest = Sha256::digest(&canonical);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

fn new_version_id(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..=0xff_ffff);
    format!("{}-{:06x}", now.format("%Y%m%dT%H%M%S%3fZ"), suffix)
}

/// Persistent per-plugin configuration history
pub struct ConfigVersionManager {
    root: PathBuf,
    max_versions: usize,
    // Serializes read-modify-write of index files
    lock: Mutex<()>,
}

impl ConfigVersionManager {
    /// Create a manager rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_versions: DEFAULT_MAX_VERSIONS,
            lock: Mutex::new(()),
        }
    }

    /// Create a manager from runtime settings
    pub fn from_settings(settings: &VersioningSettings) -> Self {
        Self::new(&settings.root).with_max_versions(settings.max_versions)
    }

    /// Override the number of versions kept per plugin
    pub fn with_max_versions(mut self, max_versions: usize) -> Self {
        self.max_versions = max_versions.max(1);
        self
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Versions kept per plugin
    pub fn max_versions(&self) -> usize {
        self.max_versions
    }

    /// Persist `config` as the newest version of its plugin
    pub async fn save_version(
        &self,
        config: &PluginConfig,
        reason: &str,
    ) -> PluginResult<ConfigVersion> {
        self.save_with_status(config, reason, VersionStatus::Active)
            .await
    }

    /// Persist `config` with an explicit status
    pub async fn save_with_status(
        &self,
        config: &PluginConfig,
        reason: &str,
        status: VersionStatus,
    ) -> PluginResult<ConfigVersion> {
        let dir = self.plugin_dir(&config.name)?;
        let _guard = self.lock.lock().await;

        tokio::fs::create_dir_all(&dir).await?;

        let timestamp = Utc::now();
        let version = ConfigVersion {
            id: new_version_id(timestamp),
            plugin_name: config.name.clone(),
            config: config.clone(),
            timestamp,
            reason: reason.to_string(),
            hash: config_hash(config)?,
            status,
        };

        write_atomic(
            &dir.join(format!("{}.json", version.id)),
            &serde_json::to_vec_pretty(&version)?,
        )
        .await?;

        let mut index = read_index(&dir).await?;
        if status == VersionStatus::Active {
            // Only one version is active at a time
            for entry in index.iter_mut().filter(|e| e.status == VersionStatus::Active) {
                entry.status = VersionStatus::Stable;
            }
        }
        index.push(version.info());

        let excess = index.len().saturating_sub(self.max_versions);
        let pruned: Vec<VersionInfo> = index.drain(..excess).collect();

        write_atomic(&dir.join(INDEX_FILE), &serde_json::to_vec_pretty(&index)?).await?;
        write_atomic(&dir.join(CURRENT_FILE), version.id.as_bytes()).await?;

        for old in pruned {
            let path = dir.join(format!("{}.json", old.id));
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("Pruned version {} of '{}'", old.id, config.name),
                Err(e) => warn!("Failed to prune version file {:?}: {}", path, e),
            }
        }

        info!(
            "Saved version {} of '{}' ({})",
            version.id, config.name, reason
        );
        Ok(version)
    }

    /// Index entries, newest first, optionally truncated to `limit`
    pub async fn list_versions(
        &self,
        plugin: &str,
        limit: Option<usize>,
    ) -> PluginResult<Vec<VersionInfo>> {
        let dir = self.plugin_dir(plugin)?;
        let mut index = read_index(&dir).await?;
        index.reverse();
        if let Some(limit) = limit {
            index.truncate(limit);
        }
        Ok(index)
    }

    /// Load one stored version
    pub async fn get_version(&self, plugin: &str, id: &str) -> PluginResult<ConfigVersion> {
        let dir = self.plugin_dir(plugin)?;
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(PluginError::invalid_argument(format!(
                "invalid version id '{id}'"
            )));
        }

        let path = dir.join(format!("{id}.json"));
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PluginError::not_found(format!(
                    "version '{id}' of plugin '{plugin}'"
                )));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&content)?)
    }

    /// Version the `current` pointer refers to
    pub async fn current_version(&self, plugin: &str) -> PluginResult<Option<ConfigVersion>> {
        let dir = self.plugin_dir(plugin)?;
        match tokio::fs::read_to_string(dir.join(CURRENT_FILE)).await {
            Ok(id) => self.get_version(plugin, id.trim()).await.map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Save a copy of version `id` as the newest version
    pub async fn rollback_to_version(
        &self,
        plugin: &str,
        id: &str,
    ) -> PluginResult<ConfigVersion> {
        let target = self.get_version(plugin, id).await?;
        info!("Rolling back '{}' to version {}", plugin, id);
        self.save_version(&target.config, &format!("rollback_to:{id}"))
            .await
    }

    /// Update the status of a stored version
    pub async fn set_version_status(
        &self,
        plugin: &str,
        id: &str,
        status: VersionStatus,
    ) -> PluginResult<()> {
        let mut version = self.get_version(plugin, id).await?;
        let dir = self.plugin_dir(plugin)?;
        let _guard = self.lock.lock().await;

        let mut index = read_index(&dir).await?;
        let entry = index
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| PluginError::not_found(format!("version '{id}' in index")))?;
        entry.status = status;
        version.status = status;

        write_atomic(
            &dir.join(format!("{id}.json")),
            &serde_json::to_vec_pretty(&version)?,
        )
        .await?;
        write_atomic(&dir.join(INDEX_FILE), &serde_json::to_vec_pretty(&index)?).await?;
        Ok(())
    }

    /// Plugins with stored history, sorted
    pub async fn plugins(&self) -> PluginResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn plugin_dir(&self, plugin: &str) -> PluginResult<PathBuf> {
        let unsafe_name = plugin.trim().is_empty()
            || plugin.contains(['/', '\\'])
            || plugin == "."
            || plugin == "..";
        if unsafe_name {
            return Err(PluginError::invalid_argument(format!(
                "plugin name '{plugin}' cannot be used as a directory"
            )));
        }
        Ok(self.root.join(plugin))
    }
}

async fn read_index(dir: &Path) -> PluginResult<Vec<VersionInfo>> {
    match tokio::fs::read(dir.join(INDEX_FILE)).await {
        Ok(content) => serde_json::from_slice(&content)
            .map_err(|e| PluginError::version(format!("corrupt index in {}: {e}", dir.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

// Write to a sibling temp file then rename over the target.
async fn write_atomic(path: &Path, content: &[u8]) -> PluginResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
