// Copyright (c) 2025 MediaSync Contributors
// SPDX-License-Identifier: MIT

//! # MediaSync plugin runtime
//!
//! Lifecycle and hot-reload runtime for media-sync plugins: input plugins
//! that read from a media server, output plugins that publish to a tracker,
//! and transform plugins in between.
// !
//! ## Features
//!
//! - **Registries**: name-keyed plugin registry, type-keyed factory registry
//! - **Lifecycle**: load, start, stop and unload with status and resource tracking
//! - **Hooks**: pre/post start and stop callbacks that can veto a transition
//! - **Health**: periodic monitoring with optional stop/start recovery
//! - **Hot reload**: debounced directory watching driving atomic reloads
//! - **Rollback**: failed reloads restore the previous configuration
//! - **Versioning**: per-plugin configuration history on disk
// !
//! ## Quick Start
//!
//! ```rust,no_run
//! use mediasync_plugins::prelude::*;
//! use std::time::Duration;
//!
//! # async fn run() -> PluginResult<()> {
//! let config = RuntimeConfig::from_file("mediasync.yaml").await?;
//! init_logging(&config.logging)?;
//!
//! let runtime = PluginRuntime::new(config);
//! let mut health = runtime.start().await?;
//!
//! tokio::spawn(async move {
//!     while let Some(event) = health.recv().await {
//!         println!("{}: {}", event.plugin_name, event.health.status);
//!     }
//! });
//!
//! runtime.shutdown(Duration::from_secs(30)).await
//! # }
//! ```

pub mod core;
pub mod plugin;
pub mod reload;
pub mod runtime;

// Re-export commonly used types for convenience
pub use core::error::{PluginError, PluginResult};
pub use runtime::PluginRuntime;

/// Prelude module for convenient imports
///
/// Module re-exports the most commonly used types and traits.
/// Use `use mediasync_plugins::prelude::*;` to import everything you need.
pub mod prelude {
    // Core types
    pub use crate::core::{
        config::RuntimeConfig,
        error::{PluginError, PluginResult},
        health::{HealthStatus, PluginHealth},
        logging::init_logging,
        metrics::LifecycleMetrics,
    };

    // Plugin API and lifecycle
    pub use crate::plugin::{
        FactoryRegistry, HealthEvent, LifecycleEvent, Plugin, PluginCapabilities, PluginConfig,
        PluginFactory, PluginInfo, PluginManager, PluginMetadata, PluginRegistry, PluginState,
        PluginStatus, PluginType,
    };

    // Reload
    pub use crate::reload::{
        ConfigVersionManager, HotReloadWatcher, ReloadManager, ReloadOptions, ReloadPhase,
        WatcherConfig,
    };

    pub use crate::runtime::PluginRuntime;

    // Essential external types
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};
    pub use std::collections::HashMap;
    pub use tokio_util::sync::CancellationToken;
}
