//! Local daemon lifecycle
//!
//! Every tunnel (db, kube, web, shell) is terminated by a background daemon
//! spawned on localhost. Each CLI invocation is short-lived, so the only
//! shared state is:
//! - the per-kind daemon registry in the CLI config file ([`store`])
//! - the OS process table ([`process`])
//!
//! [`management::DaemonManagementService`] reconciles the two: listing,
//! status sweeps (which prune entries without a pid) and kill/disconnect.

pub mod management;
pub mod process;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use management::{DaemonKey, DaemonManagementService, DaemonStatus, DisconnectResult, StatusReport};
pub use process::{KillResult, OsProcessManager, ProcessManager};
pub use store::{ConfigDaemonStore, DaemonStore};
pub use types::{
    DaemonConfig, DaemonConfigs, DaemonDetails, DaemonKind, DbDaemon, KubeDaemon,
    RunningDaemonStatus, ShellDaemon, WebDaemon,
};
