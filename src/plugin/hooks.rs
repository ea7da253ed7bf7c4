// ! Lifecycle hooks
// !
// ! Module lets hosts run callbacks around plugin start and stop. Pre hooks can
// ! veto the transition; post hook failures are only logged by the manager.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::error::{PluginError, PluginResult};

/// Point in the lifecycle a hook runs at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleEvent {
    PreStart,
    PostStart,
    PreStop,
    PostStop,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::PreStart => "pre-start",
            LifecycleEvent::PostStart => "post-start",
            LifecycleEvent::PreStop => "pre-stop",
            LifecycleEvent::PostStop => "post-stop",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre-start" => Ok(LifecycleEvent::PreStart),
            "post-start" => Ok(LifecycleEvent::PostStart),
            "pre-stop" => Ok(LifecycleEvent::PreStop),
            "post-stop" => Ok(LifecycleEvent::PostStop),
            other => Err(PluginError::invalid_argument(format!(
                "unknown lifecycle event '{other}'"
            ))),
        }
    }
}

/// Future returned by a hook
pub type HookFuture = Pin<Box<dyn Future<Output = PluginResult<()>> + Send>>;

type HookFn = Arc<dyn Fn(String) -> HookFuture + Send + Sync>;

/// Ordered hook lists per lifecycle event
#[derive(Default)]
pub struct LifecycleHooks {
    hooks: RwLock<HashMap<LifecycleEvent, Vec<HookFn>>>,
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook for `event`; hooks run in registration order
    pub async fn register<F, Fut>(&self, event: LifecycleEvent, hook: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PluginResult<()>> + Send + 'static,
    {
        let hook: HookFn = Arc::new(move |plugin| Box::pin(hook(plugin)));
        self.hooks.write().await.entry(event).or_default().push(hook);
    }

    /// Number of hooks registered for `event`
    pub async fn count(&self, event: LifecycleEvent) -> usize {
        self.hooks.read().await.get(&event).map_or(0, Vec::len)
    }

    /// Run every hook for `event`, stopping at the first failure
    pub async fn run(&self, event: LifecycleEvent, plugin: &str) -> PluginResult<()> {
        // Hooks may register further hooks; never call them under the lock.
        let hooks = match self.hooks.read().await.get(&event) {
            Some(hooks) => hooks.clone(),
            None => return Ok(()),
        };

        for (index, hook) in hooks.iter().enumerate() {
            debug!("Running {} hook #{} for plugin '{}'", event, index, plugin);
            hook(plugin.to_string())
                .await
                .map_err(|e| PluginError::HookFailed {
                    event: event.to_string(),
                    plugin: plugin.to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_event_names() {
        for event in [
            LifecycleEvent::PreStart,
            LifecycleEvent::PostStart,
            LifecycleEvent::PreStop,
            LifecycleEvent::PostStop,
        ] {
            assert_eq!(event.as_str().parse::<LifecycleEvent>().unwrap(), event);
        }
        assert!("on-start".parse::<LifecycleEvent>().is_err());
        assert_eq!(
            serde_json::to_value(LifecycleEvent::PreStop).unwrap(),
            "pre-stop"
        );
    }

    #[tokio::test]
    async fn test_hooks_run_in_order() {
        let hooks = LifecycleHooks::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            hooks
                .register(LifecycleEvent::PreStart, move |plugin| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.lock().push(format!("{tag}:{plugin}"));
                        Ok(())
                    }
                })
                .await;
        }

        hooks.run(LifecycleEvent::PreStart, "plex").await.unwrap();
        assert_eq!(*seen.lock(), vec!["first:plex", "second:plex"]);

        // Other events are untouched
        hooks.run(LifecycleEvent::PostStop, "plex").await.unwrap();
        assert_eq!(hooks.count(LifecycleEvent::PostStop).await, 0);
    }

    #[tokio::test]
    async fn test_first_failure_stops_chain() {
        let hooks = LifecycleHooks::new();
        let later_ran = Arc::new(Mutex::new(false));

        hooks
            .register(LifecycleEvent::PreStop, |_| async {
                Err(PluginError::validation("maintenance window"))
            })
            .await;
        let flag = Arc::clone(&later_ran);
        hooks
            .register(LifecycleEvent::PreStop, move |_| {
                let flag = Arc::clone(&flag);
                async move {
                    *flag.lock() = true;
                    Ok(())
                }
            })
            .await;

        let err = hooks.run(LifecycleEvent::PreStop, "trakt").await.unwrap_err();
        match err {
            PluginError::HookFailed { event, plugin, reason } => {
                assert_eq!(event, "pre-stop");
                assert_eq!(plugin, "trakt");
                assert!(reason.contains("maintenance window"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!*later_ran.lock());
    }
}
