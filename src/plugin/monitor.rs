// ! Health monitoring and auto-recovery
// !
// ! Module runs a periodic health sweep over every registered plugin and
// ! publishes one event per plugin per sweep. Slow consumers lose events
// ! rather than stalling the sweep.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::error::{PluginError, PluginResult};
use crate::core::health::{HealthStatus, PluginHealth, check_with_timeout};
use crate::plugin::manager::PluginManager;
use crate::plugin::types::HealthEvent;

/// Handle to a running monitor task
pub(crate) struct MonitorHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl PluginManager {
    /// Start periodic health checks without recovery
    pub async fn start_health_monitoring(
        self: &Arc<Self>,
        token: CancellationToken,
        events: mpsc::Sender<HealthEvent>,
        interval: Duration,
    ) -> PluginResult<()> {
        self.spawn_monitor(token, events, interval, false).await
    }

    /// Start periodic health checks, stopping and restarting plugins that
    /// report `Error`
    pub async fn start_health_monitoring_with_recovery(
        self: &Arc<Self>,
        token: CancellationToken,
        events: mpsc::Sender<HealthEvent>,
        interval: Duration,
    ) -> PluginResult<()> {
        self.spawn_monitor(token, events, interval, true).await
    }

    /// Stop the monitor and wait for its task to finish
    pub async fn stop_health_monitoring(&self) {
        let handle = self.monitor.lock().await.take();
        if let Some(mut handle) = handle {
            handle.token.cancel();
            if let Err(e) = (&mut handle.task).await {
                if !e.is_cancelled() {
                    warn!("Health monitor task ended abnormally: {}", e);
                }
            }
            info!("Health monitoring stopped");
        }
    }

    /// Whether a monitor task is running
    pub async fn is_health_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Check every registered plugin once
    ///
    /// With `recovery` set, plugins reporting `Error` are stopped and
    /// restarted, then queried again.
    pub async fn check_all_health(&self, recovery: bool) -> Vec<HealthEvent> {
        let entries = self.registry.list().await;
        let mut events = Vec::with_capacity(entries.len());

        for entry in entries {
            let health =
                check_with_timeout(&entry.name, self.health_check_timeout, entry.plugin.health())
                    .await;

            if recovery && health.status == HealthStatus::Error {
                events.push(self.recover(&entry.name).await);
            } else {
                events.push(HealthEvent::observed(&entry.name, health));
            }
        }

        events
    }

    async fn recover(&self, name: &str) -> HealthEvent {
        warn!("Plugin '{}' reported error health, attempting recovery", name);

        if let Err(e) = self.stop_plugin(name).await {
            debug!("Recovery stop of '{}' failed: {}", name, e);
        }
        let restarted = self.start_plugin(name).await;

        let health = match self.get_plugin(name).await {
            Some(plugin) => {
                check_with_timeout(name, self.health_check_timeout, plugin.health()).await
            }
            None => PluginHealth::unknown("plugin no longer registered"),
        };
        let succeeded = restarted.is_ok() && health.status.is_operational();
        self.metrics.record_recovery(succeeded).await;

        if succeeded {
            info!("Plugin '{}' recovered", name);
        } else {
            warn!("Recovery of plugin '{}' failed (status {})", name, health.status);
        }

        let mut event = HealthEvent::observed(name, health);
        event.recovery_attempted = true;
        event.recovery_succeeded = succeeded;
        event
    }

    async fn spawn_monitor(
        self: &Arc<Self>,
        token: CancellationToken,
        events: mpsc::Sender<HealthEvent>,
        interval: Duration,
        recovery: bool,
    ) -> PluginResult<()> {
        if interval.is_zero() {
            return Err(PluginError::invalid_argument(
                "health check interval must be greater than zero",
            ));
        }

        let mut slot = self.monitor.lock().await;
        if slot.as_ref().is_some_and(|h| !h.task.is_finished()) {
            return Err(PluginError::AlreadyExists("health monitor".to_string()));
        }

        let token = token.child_token();
        let task = tokio::spawn(monitor_loop(
            Arc::downgrade(self),
            token.clone(),
            events,
            interval,
            recovery,
        ));

        info!(
            "Health monitoring started (interval {:?}, recovery {})",
            interval, recovery
        );
        *slot = Some(MonitorHandle { token, task });
        Ok(())
    }
}

async fn monitor_loop(
    manager: Weak<PluginManager>,
    token: CancellationToken,
    events: mpsc::Sender<HealthEvent>,
    interval: Duration,
    recovery: bool,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately; sweeps start one interval in.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(manager) = manager.upgrade() else { break };
                let sweep = manager.check_all_health(recovery);
                let results = tokio::select! {
                    _ = token.cancelled() => break,
                    results = sweep => results,
                };

                for event in results {
                    let delivered = match events.try_send(event) {
                        Ok(()) => true,
                        Err(TrySendError::Full(event)) => {
                            debug!("Health event channel full, dropping event for '{}'", event.plugin_name);
                            false
                        }
                        Err(TrySendError::Closed(_)) => false,
                    };
                    manager.metrics.record_health_event(delivered).await;
                }
            }
        }
    }
    debug!("Health monitor loop exited");
}
