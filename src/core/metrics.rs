// ! Lifecycle metrics for the plugin runtime
// !
// ! Module provides counters for lifecycle operations, reload outcomes and
// ! health-monitoring delivery. Each manager owns its own collector so several
// ! runtimes can live in one process.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::core::error::PluginError;

/// Outcome of an atomic reload, as counted by the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// New configuration committed
    Committed,
    /// Failed and previous configuration restored
    RolledBack,
    /// Failed and rollback failed too
    RollbackFailed,
    /// Rejected before touching plugin state
    Rejected,
}

impl ReloadOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            ReloadOutcome::Committed => "committed",
            ReloadOutcome::RolledBack => "rolled_back",
            ReloadOutcome::RollbackFailed => "rollback_failed",
            ReloadOutcome::Rejected => "rejected",
        }
    }
}

/// Metrics collector for plugin lifecycle operations
#[derive(Debug, Clone, Default)]
pub struct LifecycleMetrics {
    /// Lifecycle operation counters by operation and success
    operation_counters: Arc<RwLock<HashMap<String, AtomicU64>>>,
    /// Error counters by category
    error_counters: Arc<RwLock<HashMap<String, AtomicU64>>>,
    /// Reload outcome counters
    reload_counters: Arc<RwLock<HashMap<String, AtomicU64>>>,
    /// Health event counters (sent, dropped, recovery)
    health_counters: Arc<RwLock<HashMap<String, AtomicU64>>>,
}

impl LifecycleMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a lifecycle operation (load, start, stop, unload)
    pub async fn record_operation(&self, operation: &str, success: bool) {
        let key = format!("plugin_operations_total:operation={operation}:success={success}");
        self.increment_counter(&self.operation_counters, &key).await;

        debug!(
            target: "plugin_metrics",
            operation = operation,
            success = success,
            "Lifecycle operation recorded"
        );
    }

    /// Record an error occurrence
    pub async fn record_error(&self, error: &PluginError, context: &str) {
        let category = error.category();
        let key = format!("plugin_errors_total:category={category}:context={context}");
        self.increment_counter(&self.error_counters, &key).await;

        let category_key = format!("plugin_errors_by_category:{category}");
        self.increment_counter(&self.error_counters, &category_key)
            .await;
    }

    /// Record the outcome of a reload transaction
    pub async fn record_reload(&self, outcome: ReloadOutcome) {
        let key = format!("plugin_reloads_total:outcome={}", outcome.as_str());
        self.increment_counter(&self.reload_counters, &key).await;
    }

    /// Record a health event delivery attempt
    pub async fn record_health_event(&self, delivered: bool) {
        let key = if delivered {
            "health_events_sent"
        } else {
            "health_events_dropped"
        };
        self.increment_counter(&self.health_counters, key).await;
    }

    /// Record an auto-recovery attempt
    pub async fn record_recovery(&self, success: bool) {
        let key = format!("health_recoveries_total:success={success}");
        self.increment_counter(&self.health_counters, &key).await;
    }

    /// Read a single counter across all groups
    pub async fn counter(&self, key: &str) -> u64 {
        for group in [
            &self.operation_counters,
            &self.error_counters,
            &self.reload_counters,
            &self.health_counters,
        ] {
            if let Some(value) = group.read().await.get(key) {
                return value.load(Ordering::Relaxed);
            }
        }
        0
    }

    /// Get all metrics
    pub async fn snapshot(&self) -> MetricsSummary {
        MetricsSummary {
            operations: Self::read_group(&self.operation_counters).await,
            errors: Self::read_group(&self.error_counters).await,
            reloads: Self::read_group(&self.reload_counters).await,
            health: Self::read_group(&self.health_counters).await,
        }
    }

    /// Reset all metrics (useful for testing)
    pub async fn reset(&self) {
        self.operation_counters.write().await.clear();
        self.error_counters.write().await.clear();
        self.reload_counters.write().await.clear();
        self.health_counters.write().await.clear();

        warn!(target: "plugin_metrics", "Lifecycle metrics reset");
    }

    async fn read_group(counters: &Arc<RwLock<HashMap<String, AtomicU64>>>) -> HashMap<String, u64> {
        let counters = counters.read().await;
        counters
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    /// Internal helper to increment a counter
    async fn increment_counter(
        &self,
        counters: &Arc<RwLock<HashMap<String, AtomicU64>>>,
        key: &str,
    ) {
        let mut counters_guard = counters.write().await;
        let counter = counters_guard
            .entry(key.to_string())
            .or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Summary of all metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub operations: HashMap<String, u64>,
    pub errors: HashMap<String, u64>,
    pub reloads: HashMap<String, u64>,
    pub health: HashMap<String, u64>,
}
