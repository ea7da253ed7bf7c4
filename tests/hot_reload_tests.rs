//! Integration tests for file watching and hot reload
//!
//! These tests use a real file system watcher on a temporary directory, so
//! they wait on wall-clock time rather than a paused clock.

mod common;

use common::{eventually, scripted_manager, write_plugin_config};
use mediasync_plugins::prelude::*;
use mediasync_plugins::reload::{FileChangeEvent, VersionStatus};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn watcher_config(debounce_ms: u64) -> WatcherConfig {
    WatcherConfig {
        debounce: Duration::from_millis(debounce_ms),
        ..WatcherConfig::default()
    }
}

fn fast_reload() -> ReloadOptions {
    ReloadOptions {
        health_check_interval: Duration::from_millis(10),
        health_check_timeout: Duration::from_secs(2),
        max_health_retries: 3,
    }
}

async fn next_event(rx: &mut mpsc::Receiver<FileChangeEvent>, wait: Duration) -> Option<FileChangeEvent> {
    tokio::time::timeout(wait, rx.recv()).await.ok().flatten()
}

#[tokio::test]
async fn test_burst_of_writes_yields_one_event() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plex.yaml");
    let watcher = HotReloadWatcher::new(watcher_config(200));
    let token = CancellationToken::new();
    let mut rx = watcher.start(dir.path(), token.clone()).await.unwrap();
    assert!(watcher.is_watching().await);

    for i in 0..5 {
        tokio::fs::write(&path, format!("revision: {i}\n")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let event = next_event(&mut rx, Duration::from_secs(3)).await.unwrap();
    assert_eq!(event.path.file_name(), path.file_name());
    assert_eq!(
        tokio::fs::read_to_string(&event.path).await.unwrap(),
        "revision: 4\n"
    );
    assert!(next_event(&mut rx, Duration::from_millis(500)).await.is_none());

    // Scratch files never surface
    tokio::fs::write(dir.path().join(".plex.yaml.swp"), "x").await.unwrap();
    tokio::fs::write(dir.path().join("notes.txt"), "x").await.unwrap();
    assert!(next_event(&mut rx, Duration::from_millis(500)).await.is_none());

    watcher.stop().await;
    assert!(!watcher.is_watching().await);
}

#[tokio::test]
async fn test_cancelled_token_ends_stream() {
    let dir = TempDir::new().unwrap();
    let watcher = HotReloadWatcher::new(watcher_config(50));
    let token = CancellationToken::new();
    let mut rx = watcher.start(dir.path(), token.clone()).await.unwrap();

    assert!(matches!(
        watcher.start(dir.path(), token.clone()).await,
        Err(PluginError::AlreadyExists(_))
    ));

    token.cancel();
    let closed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn test_hot_reload_end_to_end() {
    let dir = TempDir::new().unwrap();
    let versions_dir = TempDir::new().unwrap();
    let plex = dir.path().join("plex.yaml");
    write_plugin_config(&plex, "plex", "1.0.0", "  batch_size: 10\n").await;

    let manager = scripted_manager().await;
    assert_eq!(manager.discover_and_load_plugins(dir.path()).await.unwrap(), 1);

    let versions = Arc::new(ConfigVersionManager::new(versions_dir.path()));
    let reload = Arc::new(
        ReloadManager::new(Arc::clone(&manager))
            .with_options(fast_reload())
            .with_watcher_config(watcher_config(100))
            .with_versions(Arc::clone(&versions)),
    );
    let token = CancellationToken::new();
    reload.enable_hot_reload(dir.path(), token.clone()).await.unwrap();
    assert!(reload.is_hot_reload_enabled().await);

    // Update
    write_plugin_config(&plex, "plex", "1.1.0", "  batch_size: 20\n").await;
    let updated = eventually(&manager, 80, |manager| async move {
        manager
            .get_plugin_status("plex")
            .await
            .and_then(|s| s.config)
            .is_some_and(|c| c.version == "1.1.0")
    })
    .await;
    assert!(updated);
    assert_eq!(
        manager.get_plugin_status("plex").await.unwrap().state,
        PluginState::Running
    );

    // Create
    write_plugin_config(&dir.path().join("trakt.yaml"), "trakt", "1.0.0", "  client_id: abc\n")
        .await;
    let created = eventually(&manager, 80, |manager| async move {
        manager
            .get_plugin_status("trakt")
            .await
            .is_some_and(|s| s.state == PluginState::Running)
    })
    .await;
    assert!(created);

    // Unhealthy update is rolled back
    write_plugin_config(&plex, "plex", "1.2.0", "  batch_size: 30\n  health: unhealthy\n").await;
    let rolled_back = eventually(&manager, 80, |manager| async move {
        manager
            .metrics()
            .counter("plugin_reloads_total:outcome=rolled_back")
            .await
            == 1
    })
    .await;
    assert!(rolled_back);
    let status = manager.get_plugin_status("plex").await.unwrap();
    assert_eq!(status.state, PluginState::Running);
    assert_eq!(status.config.unwrap().version, "1.1.0");

    // Delete
    tokio::fs::remove_file(&plex).await.unwrap();
    let removed = eventually(&manager, 80, |manager| async move {
        manager.get_plugin_status("plex").await.is_none()
    }).await;
    assert!(removed);

    reload.disable_hot_reload().await;
    assert!(!reload.is_hot_reload_enabled().await);

    let history = versions.list_versions("plex", None).await.unwrap();
    assert_eq!(history[0].status, VersionStatus::Active);
    assert!(history.iter().any(|v| v.reason == "hot_reload_success"));
}

#[tokio::test]
async fn test_hot_reload_cannot_be_enabled_twice() {
    let dir = TempDir::new().unwrap();
    let manager = scripted_manager().await;
    let reload = Arc::new(ReloadManager::new(manager).with_watcher_config(watcher_config(50)));
    let token = CancellationToken::new();

    reload.enable_hot_reload(dir.path(), token.clone()).await.unwrap();
    assert!(matches!(
        reload.enable_hot_reload(dir.path(), token.clone()).await,
        Err(PluginError::AlreadyExists(_))
    ));

    reload.disable_hot_reload().await;
    reload.enable_hot_reload(dir.path(), token).await.unwrap();
    reload.disable_hot_reload().await;
}
