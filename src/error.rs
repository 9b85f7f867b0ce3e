use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZliError {
    /// New daemons are always keyed by a backend connection id.
    #[error("cannot register a daemon without a connection id")]
    MissingConnectionId,

    #[error("failed to kill process {pid}: {reason}")]
    ProcessKill { pid: u32, reason: String },

    #[error("{kind} daemon {key}: {reason}")]
    DaemonUnavailable {
        kind: crate::daemon::DaemonKind,
        key: String,
        reason: String,
    },

    #[error("no logged-in subject found in {0}; run `zli login` first")]
    NotLoggedIn(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("certificate error: {0}")]
    Certificate(#[from] rcgen::Error),
}

impl ZliError {
    pub fn process_kill(pid: u32, reason: impl Into<String>) -> Self {
        Self::ProcessKill {
            pid,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ZliError>;
