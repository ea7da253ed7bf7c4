//! Configuration hot reload
//!
//! This module replaces plugin configurations at runtime. It provides:
//!
//! - A debounced file watcher over the plugin configuration directory
//! - Delta computation between the last applied and the new configuration
//! - Transactional reloads with snapshot, health gate and rollback
//! - Per-plugin configuration version history on disk

pub mod delta;
pub mod dispatch;
pub mod manager;
pub mod transaction;
pub mod versions;
pub mod watcher;


pub use delta::{ChangeKind, ConfigDelta, SettingChange};
pub use manager::ReloadManager;
pub use transaction::{
    ConfigSnapshot, PhaseObserver, ReloadOptions, ReloadPhase, ReloadTransaction, RestorePlan,
    SystemConstraint,
};
pub use versions::{
    ConfigVersion, ConfigVersionManager, DEFAULT_MAX_VERSIONS, VersionInfo, VersionStatus,
    config_hash,
};
pub use watcher::{FileChangeEvent, FileChangeKind, HotReloadWatcher, WatcherConfig};
