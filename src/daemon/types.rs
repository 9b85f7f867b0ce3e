use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::user_config::{CliConfig, RawRegistry};

/// Kind of locally spawned tunnel daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonKind {
    Db,
    Kube,
    Web,
    Shell,
}

impl DaemonKind {
    pub const ALL: [DaemonKind; 4] = [Self::Db, Self::Kube, Self::Web, Self::Shell];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Db => "db",
            Self::Kube => "kube",
            Self::Web => "web",
            Self::Shell => "shell",
        }
    }
}

impl fmt::Display for DaemonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One registered daemon as persisted in the CLI config file.
///
/// `local_pid == None` means the entry was written without a daemon ever
/// being spawned. Such entries can never become running and are pruned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonConfig<T> {
    #[serde(rename = "type")]
    pub kind: DaemonKind,
    pub name: String,
    pub local_host: String,
    pub local_port: u16,
    #[serde(default)]
    pub local_pid: Option<u32>,
    #[serde(flatten)]
    pub details: T,
}

impl<T: DaemonDetails> DaemonConfig<T> {
    pub fn new(
        name: impl Into<String>,
        local_host: impl Into<String>,
        local_port: u16,
        local_pid: Option<u32>,
        details: T,
    ) -> Self {
        Self {
            kind: T::KIND,
            name: name.into(),
            local_host: local_host.into(),
            local_port,
            local_pid,
            details,
        }
    }
}

impl<T> DaemonConfig<T> {
    pub fn local_address(&self) -> String {
        format!("{}:{}", self.local_host, self.local_port)
    }
}

/// Persisted registry for one daemon kind, keyed by storage key
/// (a connection id, or the legacy sentinel).
pub type DaemonConfigs<T> = BTreeMap<String, DaemonConfig<T>>;

/// Kind-specific payload of a daemon that is currently running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunningDaemonStatus {
    Db {
        local_url: String,
        target_name: String,
    },
    Kube {
        local_url: String,
        target_cluster: String,
        target_user: String,
        target_groups: Vec<String>,
    },
    Web {
        local_url: String,
        target_name: String,
    },
    Shell {
        local_url: String,
        target_name: String,
        target_user: String,
    },
}

impl RunningDaemonStatus {
    pub fn local_url(&self) -> &str {
        match self {
            Self::Db { local_url, .. }
            | Self::Kube { local_url, .. }
            | Self::Web { local_url, .. }
            | Self::Shell { local_url, .. } => local_url,
        }
    }
}

impl fmt::Display for RunningDaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Db {
                local_url,
                target_name,
            } => write!(f, "{target_name} on {local_url}"),
            Self::Kube {
                local_url,
                target_cluster,
                target_user,
                target_groups,
            } => {
                write!(f, "{target_user}@{target_cluster} on {local_url}")?;
                if !target_groups.is_empty() {
                    write!(f, " (groups: {})", target_groups.join(", "))?;
                }
                Ok(())
            }
            Self::Web {
                local_url,
                target_name,
            } => write!(f, "{target_name} on {local_url}"),
            Self::Shell {
                local_url,
                target_name,
                target_user,
            } => write!(f, "{target_user}@{target_name} on {local_url}"),
        }
    }
}

/// Per-kind behaviour of a daemon registry.
///
/// Each kind knows its tag, which raw map of the CLI config file holds its
/// registry, and how to describe itself while running.
pub trait DaemonDetails:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: DaemonKind;

    fn registry(config: &CliConfig) -> &RawRegistry;

    fn registry_mut(config: &mut CliConfig) -> &mut RawRegistry;

    fn running_status(daemon: &DaemonConfig<Self>) -> RunningDaemonStatus;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbDaemon {
    pub target_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeDaemon {
    pub target_cluster: String,
    pub target_user: String,
    #[serde(default)]
    pub target_groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebDaemon {
    pub target_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellDaemon {
    pub target_name: String,
    pub target_user: String,
}

impl DaemonDetails for DbDaemon {
    const KIND: DaemonKind = DaemonKind::Db;

    fn registry(config: &CliConfig) -> &RawRegistry {
        &config.db_daemons
    }

    fn registry_mut(config: &mut CliConfig) -> &mut RawRegistry {
        &mut config.db_daemons
    }

    fn running_status(daemon: &DaemonConfig<Self>) -> RunningDaemonStatus {
        RunningDaemonStatus::Db {
            local_url: daemon.local_address(),
            target_name: daemon.details.target_name.clone(),
        }
    }
}

impl DaemonDetails for KubeDaemon {
    const KIND: DaemonKind = DaemonKind::Kube;

    fn registry(config: &CliConfig) -> &RawRegistry {
        &config.kube_daemons
    }

    fn registry_mut(config: &mut CliConfig) -> &mut RawRegistry {
        &mut config.kube_daemons
    }

    fn running_status(daemon: &DaemonConfig<Self>) -> RunningDaemonStatus {
        RunningDaemonStatus::Kube {
            local_url: format!("https://{}", daemon.local_address()),
            target_cluster: daemon.details.target_cluster.clone(),
            target_user: daemon.details.target_user.clone(),
            target_groups: daemon.details.target_groups.clone(),
        }
    }
}

impl DaemonDetails for WebDaemon {
    const KIND: DaemonKind = DaemonKind::Web;

    fn registry(config: &CliConfig) -> &RawRegistry {
        &config.web_daemons
    }

    fn registry_mut(config: &mut CliConfig) -> &mut RawRegistry {
        &mut config.web_daemons
    }

    fn running_status(daemon: &DaemonConfig<Self>) -> RunningDaemonStatus {
        RunningDaemonStatus::Web {
            local_url: format!("http://{}", daemon.local_address()),
            target_name: daemon.details.target_name.clone(),
        }
    }
}

impl DaemonDetails for ShellDaemon {
    const KIND: DaemonKind = DaemonKind::Shell;

    fn registry(config: &CliConfig) -> &RawRegistry {
        &config.shell_daemons
    }

    fn registry_mut(config: &mut CliConfig) -> &mut RawRegistry {
        &mut config.shell_daemons
    }

    fn running_status(daemon: &DaemonConfig<Self>) -> RunningDaemonStatus {
        RunningDaemonStatus::Shell {
            local_url: daemon.local_address(),
            target_name: daemon.details.target_name.clone(),
            target_user: daemon.details.target_user.clone(),
        }
    }
}
