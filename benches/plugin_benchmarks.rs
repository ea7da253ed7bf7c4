//! Plugin runtime performance benchmarks
//!
//! Measures configuration hashing and diffing, registry lookups and a full
//! plugin lifecycle.

#![cfg(feature = "bench")]

use async_trait::async_trait;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use mediasync_plugins::core::PluginHealth;
use mediasync_plugins::plugin::{
    FactoryRegistry, Plugin, PluginCapabilities, PluginConfig, PluginInfo, PluginManager,
    PluginMetadata, PluginRegistry, PluginType,
};
use mediasync_plugins::reload::{ConfigDelta, config_hash};
use mediasync_plugins::PluginResult;
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

struct NoopPlugin {
    metadata: PluginMetadata,
}

#[async_trait]
impl Plugin for NoopPlugin {
    async fn start(&self) -> PluginResult<()> {
        Ok(())
    }

    async fn stop(&self) -> PluginResult<()> {
        Ok(())
    }

    async fn health(&self) -> PluginHealth {
        PluginHealth::healthy("ok")
    }

    fn info(&self) -> PluginInfo {
        self.metadata.info()
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::default()
    }

    fn metadata(&self) -> PluginMetadata {
        self.metadata.clone()
    }
}

fn noop(config: &PluginConfig) -> Arc<dyn Plugin> {
    Arc::new(NoopPlugin {
        metadata: PluginMetadata::new(&config.name, &config.version, config.plugin_type),
    })
}

fn sample_config(batch_size: u64) -> PluginConfig {
    let mut config = PluginConfig::new("plex", PluginType::Input, "1.0.0")
        .with_description("Plex media server connector")
        .with_setting("batch_size", json!(batch_size))
        .with_setting("timeout_ms", json!(5000));
    for i in 0..20 {
        config = config.with_setting(format!("library_{i}"), json!({"enabled": true, "id": i}));
    }
    config
}

fn benchmark_config(c: &mut Criterion) {
    let mut group = c.benchmark_group("config");
    let old = sample_config(10);
    let new = sample_config(20);

    group.bench_function("validate", |b| b.iter(|| black_box(&old).validate()));
    group.bench_function("hash", |b| b.iter(|| config_hash(black_box(&old))));
    group.bench_function("delta", |b| {
        b.iter(|| ConfigDelta::compute(Some(black_box(&old)), Some(black_box(&new))))
    });

    group.finish();
}

fn benchmark_registry(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let registry = PluginRegistry::new();
    rt.block_on(async {
        for i in 0..100 {
            let config = PluginConfig::new(format!("plugin-{i}"), PluginType::Output, "1.0.0");
            registry.register(&config.name, noop(&config)).await.unwrap();
        }
    });

    let mut group = c.benchmark_group("registry");
    group.bench_function("get", |b| {
        b.to_async(&rt)
            .iter(|| async { registry.get(black_box("plugin-42")).await })
    });
    group.bench_function("list_by_type", |b| {
        b.to_async(&rt)
            .iter(|| async { registry.list_by_type(PluginType::Output).await })
    });
    group.finish();
}

fn benchmark_lifecycle(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let manager = PluginManager::new(
        Arc::new(PluginRegistry::new()),
        Arc::new(FactoryRegistry::new()),
    );
    rt.block_on(async {
        let factory = |config: &PluginConfig| -> PluginResult<Box<dyn Plugin>> {
            Ok(Box::new(NoopPlugin {
                metadata: PluginMetadata::new(&config.name, &config.version, config.plugin_type),
            }))
        };
        manager
            .register_factory(PluginType::Input, Arc::new(factory))
            .await
            .unwrap();
    });

    c.bench_function("load_start_stop_unload", |b| {
        b.to_async(&rt).iter(|| async {
            manager.load_plugin(sample_config(10)).await.unwrap();
            manager.start_plugin("plex").await.unwrap();
            manager.stop_plugin("plex").await.unwrap();
            manager.unload_plugin("plex").await.unwrap();
        })
    });
}

criterion_group!(
    benches,
    benchmark_config,
    benchmark_registry,
    benchmark_lifecycle
);
criterion_main!(benches);
