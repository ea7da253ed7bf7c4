// ! Plugin discovery
// !
// ! Module finds plugin configuration files on disk and parses them.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::error::{PluginError, PluginResult};
use crate::plugin::config::PluginConfig;

/// Source of plugin configurations
#[async_trait]
pub trait PluginDiscovery: Send + Sync {
    /// Return every valid configuration under `dir`
    async fn discover(&self, dir: &Path) -> PluginResult<Vec<PluginConfig>>;
}

/// Discovers `*.yaml` / `*.yml` files in a directory tree
#[derive(Debug, Clone)]
pub struct DirectoryDiscovery {
    /// Accepted file extensions, without the dot
    extensions: Vec<String>,

    /// Descend into subdirectories
    recursive: bool,
}

impl Default for DirectoryDiscovery {
    fn default() -> Self {
        Self {
            extensions: vec!["yaml".to_string(), "yml".to_string()],
            recursive: true,
        }
    }
}

impl DirectoryDiscovery {
    /// Create a discovery for YAML files, recursing into subdirectories
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the accepted extensions
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Only scan the top-level directory
    pub fn non_recursive(mut self) -> Self {
        self.recursive = false;
        self
    }

    /// Whether `path` looks like a plugin configuration file
    pub fn accepts(&self, path: &Path) -> bool {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(true);
        if hidden {
            return false;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }

    /// Candidate files under `dir`, sorted by path
    pub async fn config_files(&self, dir: &Path) -> PluginResult<Vec<PathBuf>> {
        let mut pending = vec![dir.to_path_buf()];
        let mut files = Vec::new();

        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current).await.map_err(|e| {
                PluginError::Discovery(format!("cannot read {}: {e}", current.display()))
            })?;

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if self.recursive {
                        pending.push(path);
                    }
                } else if self.accepts(&path) {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Parse and validate every candidate file, keeping the path each came from
    pub async fn discover_files(&self, dir: &Path) -> PluginResult<Vec<(PathBuf, PluginConfig)>> {
        let files = self.config_files(dir).await?;
        let mut configs = Vec::with_capacity(files.len());

        for path in files {
            let parsed = PluginConfig::from_file(&path)
                .await
                .and_then(|config| config.validate().map(|_| config));
            match parsed {
                Ok(config) => {
                    debug!("Discovered plugin '{}' in {:?}", config.name, path);
                    configs.push((path, config));
                }
                Err(e) => warn!("Skipping invalid plugin config {:?}: {}", path, e),
            }
        }

        Ok(configs)
    }
}

#[async_trait]
impl PluginDiscovery for DirectoryDiscovery {
    async fn discover(&self, dir: &Path) -> PluginResult<Vec<PluginConfig>> {
        let configs: Vec<_> = self
            .discover_files(dir)
            .await?
            .into_iter()
            .map(|(_, config)| config)
            .collect();
        info!("Discovered {} plugin config(s) in {:?}", configs.len(), dir);
        Ok(configs)
    }
}
