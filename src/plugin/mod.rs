//! Plugin lifecycle management
//!
//! This module provides registration, construction and lifecycle control for
//! media-sync plugins. It supports:
//!
//! - Name-keyed plugin registry and type-keyed factory registry
//! - Load / start / stop / unload with per-plugin status and resource usage
//! - Pre/post start and stop hooks
//! - Periodic health monitoring with optional stop/start recovery
//! - Discovery of YAML plugin configurations on disk
//! - Bulk and graceful shutdown

pub mod api;
pub mod config;
pub mod discovery;
pub mod factory;
pub mod hooks;
pub mod manager;
pub mod monitor;
pub mod registry;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{Plugin, PluginCapabilities, PluginInfo, PluginMetadata};
pub use config::{PluginConfig, PluginType};
pub use discovery::{DirectoryDiscovery, PluginDiscovery};
pub use factory::{FactoryRegistry, PluginFactory};
pub use hooks::{HookFuture, LifecycleEvent, LifecycleHooks};
pub use manager::PluginManager;
pub use registry::{PluginRegistry, RegisteredPlugin};
pub use types::*;
