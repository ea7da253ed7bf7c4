// ! Configuration deltas
// !
// ! Module compares the previously seen and newly read configuration of a
// ! plugin file and classifies the change.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::plugin::config::PluginConfig;

/// Kind of change between two configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// Change to a single setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingChange {
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// Difference between two versions of a plugin configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDelta {
    pub plugin_name: String,
    pub kind: ChangeKind,
    pub old: Option<PluginConfig>,
    pub new: Option<PluginConfig>,
    /// Settings that differ, keyed by setting name
    pub settings: BTreeMap<String, SettingChange>,
}

impl ConfigDelta {
    /// Compare two configurations; `None` when both are absent
    pub fn compute(old: Option<&PluginConfig>, new: Option<&PluginConfig>) -> Option<Self> {
        let (kind, plugin_name) = match (old, new) {
            (None, None) => return None,
            (None, Some(new)) => (ChangeKind::Create, new.name.clone()),
            (Some(old), None) => (ChangeKind::Delete, old.name.clone()),
            (Some(_), Some(new)) => (ChangeKind::Update, new.name.clone()),
        };

        let empty: HashMap<String, Value> = HashMap::new();
        let old_settings = old.map_or(&empty, |c| &c.settings);
        let new_settings = new.map_or(&empty, |c| &c.settings);

        let keys: BTreeSet<&String> = old_settings.keys().chain(new_settings.keys()).collect();
        let settings = keys
            .into_iter()
            .filter_map(|key| {
                let before = old_settings.get(key);
                let after = new_settings.get(key);
                (before != after).then(|| {
                    (
                        key.clone(),
                        SettingChange {
                            old: before.cloned(),
                            new: after.cloned(),
                        },
                    )
                })
            })
            .collect();

        Some(Self {
            plugin_name,
            kind,
            old: old.cloned(),
            new: new.cloned(),
            settings,
        })
    }

    /// An update that changes nothing
    pub fn is_noop(&self) -> bool {
        self.kind == ChangeKind::Update && self.old == self.new
    }

    /// The update moved the configuration to a different plugin name
    pub fn is_rename(&self) -> bool {
        match (&self.old, &self.new) {
            (Some(old), Some(new)) => old.name != new.name,
            _ => false,
        }
    }

    /// The `enabled` flag differs
    pub fn enabled_changed(&self) -> bool {
        match (&self.old, &self.new) {
            (Some(old), Some(new)) => old.enabled != new.enabled,
            _ => false,
        }
    }
}
