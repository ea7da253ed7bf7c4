//! Integration tests for the runtime assembled from a settings file

mod common;

use common::{register_scripted, write_plugin_config};
use mediasync_plugins::prelude::*;
use pretty_assertions::assert_eq;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_runtime_from_settings_file() {
    let root = TempDir::new().unwrap();
    let plugins = root.path().join("plugins");
    tokio::fs::create_dir(&plugins).await.unwrap();
    write_plugin_config(&plugins.join("plex.yaml"), "plex", "1.0.0", "  batch_size: 10\n").await;

    let settings = format!(
        "plugin_dir: {}\nhot_reload:\n  enabled: true\n  debounce_ms: 50\nhealth:\n  interval_ms: 20\nversioning:\n  enabled: true\n  root: {}\n",
        plugins.display(),
        root.path().join("versions").display()
    );
    let settings_path = root.path().join("mediasync.yaml");
    tokio::fs::write(&settings_path, settings).await.unwrap();

    let config = RuntimeConfig::from_file(&settings_path).await.unwrap();
    assert_eq!(config.hot_reload.debounce_ms, 50);
    assert!(config.versioning.enabled);

    let runtime = PluginRuntime::new(config);
    register_scripted(runtime.plugin_manager().factories()).await;

    let mut health = runtime.start().await.unwrap();
    assert!(runtime.reload_manager().is_hot_reload_enabled().await);
    assert!(runtime.reload_manager().versions().is_some());

    let event = tokio::time::timeout(Duration::from_secs(2), health.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.plugin_name, "plex");
    assert_eq!(event.health.status, HealthStatus::Healthy);

    runtime.shutdown(Duration::from_secs(5)).await.unwrap();
    assert!(!runtime.reload_manager().is_hot_reload_enabled().await);
    assert!(runtime.cancellation_token().is_cancelled());
    assert_eq!(
        runtime
            .plugin_manager()
            .get_plugin_status("plex")
            .await
            .unwrap()
            .state,
        PluginState::Stopped
    );
}

#[tokio::test]
async fn test_runtime_without_plugin_dir_starts_empty() {
    let root = TempDir::new().unwrap();
    let config = RuntimeConfig {
        plugin_dir: root.path().join("missing"),
        ..RuntimeConfig::default()
    };

    let runtime = PluginRuntime::new(config);
    let _health = runtime.start().await.unwrap();
    assert!(!runtime.reload_manager().is_hot_reload_enabled().await);
    assert!(runtime.plugin_manager().list_plugin_statuses().await.is_empty());

    runtime.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_invalid_settings_are_rejected() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("mediasync.json");
    tokio::fs::write(&path, r#"{"health": {"interval_ms": 0}}"#)
        .await
        .unwrap();

    assert!(matches!(
        RuntimeConfig::from_file(&path).await,
        Err(PluginError::Validation(_))
    ));
}
