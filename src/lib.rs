pub mod clienv;
pub mod daemon;
pub mod error;
pub mod kube;
pub mod user_config;

pub use daemon::{DaemonManagementService, OsProcessManager, ProcessManager};
pub use error::{Result, ZliError};
pub use user_config::ConfigService;
