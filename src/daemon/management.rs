use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::process::{KillResult, ProcessManager};
use super::store::{self, ConfigDaemonStore, DaemonStore};
use super::types::{DaemonConfig, DaemonConfigs, DaemonDetails, RunningDaemonStatus};
use crate::error::{Result, ZliError};
use crate::user_config::ConfigService;

/// Public registry key: the connection id, or `None` for the legacy entry.
pub type DaemonKey = Option<String>;

/// Outcome of tearing down one daemon.
#[derive(Debug)]
pub enum DisconnectResult<T> {
    /// No pid was ever recorded, nothing to kill.
    DaemonPidNotSet { config: DaemonConfig<T> },
    DaemonFailKilled {
        config: DaemonConfig<T>,
        error: ZliError,
    },
    DaemonSuccessKilled {
        config: DaemonConfig<T>,
        kill_result: KillResult,
    },
}

impl<T> DisconnectResult<T> {
    pub fn config(&self) -> &DaemonConfig<T> {
        match self {
            Self::DaemonPidNotSet { config }
            | Self::DaemonFailKilled { config, .. }
            | Self::DaemonSuccessKilled { config, .. } => config,
        }
    }
}

/// Liveness of one registered daemon.
#[derive(Debug, Clone, PartialEq)]
pub enum DaemonStatus<T> {
    /// No pid on record.
    NoDaemonRunning { config: DaemonConfig<T> },
    /// Pid on record but the process is gone.
    DaemonQuitUnexpectedly { config: DaemonConfig<T> },
    DaemonIsRunning {
        config: DaemonConfig<T>,
        status: RunningDaemonStatus,
    },
}

impl<T> DaemonStatus<T> {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::DaemonIsRunning { .. })
    }

    pub fn config(&self) -> &DaemonConfig<T> {
        match self {
            Self::NoDaemonRunning { config }
            | Self::DaemonQuitUnexpectedly { config }
            | Self::DaemonIsRunning { config, .. } => config,
        }
    }
}

/// Result of a status sweep, including how many entries the sweep pruned
/// from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport<T> {
    pub statuses: BTreeMap<DaemonKey, DaemonStatus<T>>,
    pub pruned: usize,
}

impl<T> StatusReport<T> {
    pub fn any_running(&self) -> bool {
        self.statuses.values().any(DaemonStatus::is_running)
    }
}

/// Registry operations for one daemon kind.
///
/// Reconciles the persisted registry with the OS process table. Only
/// structural misuse is returned as an error; kill failures and stale
/// entries are reported per entry.
pub struct DaemonManagementService<T: DaemonDetails> {
    store: Box<dyn DaemonStore<T>>,
    processes: Arc<dyn ProcessManager>,
}

impl<T: DaemonDetails> DaemonManagementService<T> {
    pub fn new(store: Box<dyn DaemonStore<T>>, processes: Arc<dyn ProcessManager>) -> Self {
        Self { store, processes }
    }

    /// Service over the kind's registry in the CLI config file.
    pub fn for_config(config: &ConfigService, processes: Arc<dyn ProcessManager>) -> Self {
        Self::new(Box::new(ConfigDaemonStore::<T>::new(config.clone())), processes)
    }

    /// All registered daemons. The legacy entry, if any, is keyed `None`.
    pub fn get_daemon_configs(&self) -> Result<BTreeMap<DaemonKey, DaemonConfig<T>>> {
        Ok(self
            .store
            .get_daemons()?
            .into_iter()
            .map(|(key, config)| (store::public_key(&key), config))
            .collect())
    }

    /// Register a daemon under its connection id.
    ///
    /// Legacy entries are read-only: calling this without a connection id is
    /// a caller bug and leaves the registry untouched.
    pub fn add_daemon(&self, connection_id: Option<&str>, config: DaemonConfig<T>) -> Result<()> {
        let connection_id = match connection_id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(ZliError::MissingConnectionId),
        };
        if store::is_legacy_key(connection_id) {
            return Err(ZliError::Config(format!(
                "connection id '{}' is reserved",
                connection_id
            )));
        }

        let mut daemons = self.store.get_daemons()?;
        debug!(kind = %T::KIND, connection_id, "Registering daemon");
        daemons.insert(connection_id.to_string(), config);
        self.store.set_daemons(daemons)
    }

    /// Kill every registered daemon and empty the registry.
    ///
    /// Every entry is removed whatever the outcome, including failed kills.
    pub async fn disconnect_all_daemons(&self) -> Result<BTreeMap<DaemonKey, DisconnectResult<T>>> {
        let daemons = self.store.get_daemons()?;
        if daemons.is_empty() {
            return Ok(BTreeMap::new());
        }

        let mut results = BTreeMap::new();
        for (key, config) in daemons {
            let result = self.kill_daemon(config).await;
            results.insert(store::public_key(&key), result);
        }

        self.store.set_daemons(DaemonConfigs::new())?;
        Ok(results)
    }

    /// Kill one daemon and drop it from the registry. `None` if no entry
    /// exists under `key`.
    pub async fn disconnect_daemon(&self, key: Option<&str>) -> Result<Option<DisconnectResult<T>>> {
        let mut daemons = self.store.get_daemons()?;
        let Some(config) = daemons.remove(store::storage_key(key)) else {
            debug!(kind = %T::KIND, key = ?key, "No daemon registered");
            return Ok(None);
        };

        let result = self.kill_daemon(config).await;
        self.store.set_daemons(daemons)?;
        Ok(Some(result))
    }

    /// Status of every registered daemon.
    ///
    /// Not read-only: entries without a pid are pruned from the store (the
    /// count is reported in [`StatusReport::pruned`]). Entries whose process
    /// died are kept until explicitly disconnected.
    pub fn get_all_daemon_statuses(&self) -> Result<StatusReport<T>> {
        let mut daemons = self.store.get_daemons()?;
        let mut statuses = BTreeMap::new();
        let mut pruned = Vec::new();

        for (key, config) in &daemons {
            let status = match config.local_pid {
                None => {
                    pruned.push(key.clone());
                    DaemonStatus::NoDaemonRunning {
                        config: config.clone(),
                    }
                }
                Some(pid) if !self.processes.is_process_running(pid) => {
                    DaemonStatus::DaemonQuitUnexpectedly {
                        config: config.clone(),
                    }
                }
                Some(_) => DaemonStatus::DaemonIsRunning {
                    config: config.clone(),
                    status: T::running_status(config),
                },
            };
            statuses.insert(store::public_key(key), status);
        }

        if !pruned.is_empty() {
            debug!(kind = %T::KIND, count = pruned.len(), "Pruning daemons without a pid");
            for key in &pruned {
                daemons.remove(key);
            }
            self.store.set_daemons(daemons)?;
        }

        Ok(StatusReport {
            statuses,
            pruned: pruned.len(),
        })
    }

    async fn kill_daemon(&self, config: DaemonConfig<T>) -> DisconnectResult<T> {
        let Some(pid) = config.local_pid else {
            return DisconnectResult::DaemonPidNotSet { config };
        };

        match self.processes.try_kill_process(pid).await {
            Ok(kill_result) => {
                info!(kind = %T::KIND, pid, "Daemon {}", kill_result);
                DisconnectResult::DaemonSuccessKilled {
                    config,
                    kill_result,
                }
            }
            Err(error) => {
                warn!(kind = %T::KIND, pid, "Failed to kill daemon: {}", error);
                DisconnectResult::DaemonFailKilled { config, error }
            }
        }
    }
}
