use serde_json::Value;
use std::marker::PhantomData;

use super::types::{DaemonConfig, DaemonConfigs, DaemonDetails};
use crate::error::Result;
use crate::user_config::{ConfigService, RawRegistry};

/// Storage key of the single pre-multi-connection daemon of a kind.
const LEGACY_KEY: &str = "legacy";

/// Public key for a storage key: `None` for the legacy entry.
pub(crate) fn public_key(storage_key: &str) -> Option<String> {
    if storage_key == LEGACY_KEY {
        None
    } else {
        Some(storage_key.to_string())
    }
}

/// Storage key for a public key.
pub(crate) fn storage_key(key: Option<&str>) -> &str {
    key.unwrap_or(LEGACY_KEY)
}

pub(crate) fn is_legacy_key(storage_key: &str) -> bool {
    storage_key == LEGACY_KEY
}

/// Whole-map persistence for one daemon kind.
///
/// There is no per-entry API: callers read the map, change it, and write it
/// back in one piece.
pub trait DaemonStore<T: DaemonDetails>: Send + Sync {
    fn get_daemons(&self) -> Result<DaemonConfigs<T>>;

    fn set_daemons(&self, daemons: DaemonConfigs<T>) -> Result<()>;
}

/// [`DaemonStore`] backed by the kind's map inside the CLI config file.
pub struct ConfigDaemonStore<T> {
    config: ConfigService,
    _kind: PhantomData<fn() -> T>,
}

impl<T: DaemonDetails> ConfigDaemonStore<T> {
    pub fn new(config: ConfigService) -> Self {
        Self {
            config,
            _kind: PhantomData,
        }
    }
}

/// Parse one stored entry. Entries of another kind are rejected.
fn parse_entry<T: DaemonDetails>(value: &Value) -> std::result::Result<DaemonConfig<T>, String> {
    let daemon: DaemonConfig<T> = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
    if daemon.kind != T::KIND {
        return Err(format!("{} entry in the {} registry", daemon.kind, T::KIND));
    }
    Ok(daemon)
}

/// Split a raw registry into parsed entries and the keys of unreadable ones.
fn parse_registry<T: DaemonDetails>(raw: &RawRegistry) -> (DaemonConfigs<T>, Vec<String>) {
    let mut daemons = DaemonConfigs::new();
    let mut unreadable = Vec::new();

    for (key, value) in raw {
        match parse_entry::<T>(value) {
            Ok(daemon) => {
                daemons.insert(key.clone(), daemon);
            }
            Err(reason) => {
                tracing::warn!(kind = %T::KIND, key = %key, "Dropping unreadable daemon entry: {}", reason);
                unreadable.push(key.clone());
            }
        }
    }

    (daemons, unreadable)
}

impl<T: DaemonDetails> DaemonStore<T> for ConfigDaemonStore<T> {
    /// Parsed entries of this kind. Unreadable entries are removed from the
    /// file in the same call, like entries that never got a pid.
    fn get_daemons(&self) -> Result<DaemonConfigs<T>> {
        let config = self.config.load()?;
        let (daemons, unreadable) = parse_registry::<T>(T::registry(&config));

        if !unreadable.is_empty() {
            self.config.update(|config| {
                let registry = T::registry_mut(config);
                for key in &unreadable {
                    registry.remove(key);
                }
            })?;
        }

        Ok(daemons)
    }

    fn set_daemons(&self, daemons: DaemonConfigs<T>) -> Result<()> {
        tracing::trace!(kind = %T::KIND, count = daemons.len(), "Writing daemon registry");
        let mut registry = RawRegistry::new();
        for (key, daemon) in daemons {
            registry.insert(key, serde_json::to_value(daemon)?);
        }
        self.config
            .update(|config| *T::registry_mut(config) = registry)
    }
}
