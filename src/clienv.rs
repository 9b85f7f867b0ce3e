use std::path::PathBuf;
use std::time::Duration;

const ZLI_CONFIG_DIR: &str = "ZLI_CONFIG_DIR";
const ZLI_CONFIG_NAME: &str = "ZLI_CONFIG_NAME";
const ZLI_KILL_GRACE_MS: &str = "ZLI_KILL_GRACE_MS";
const ZLI_LOG: &str = "ZLI_LOG";
const KUBECONFIG: &str = "KUBECONFIG";

const FALLBACK_CONFIG_DIR: &str = "~/.config";
const ZLI_SUBDIR: &str = "zli";
const DEFAULT_CONFIG_NAME: &str = "prod";
const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(5000);
const DEFAULT_LOG_FILTER: &str = "warn";

/// Non-empty environment variable, trimmed.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// zli config directory ($ZLI_CONFIG_DIR or ~/.config/zli)
pub fn config_dir() -> PathBuf {
    let dir = env_opt(ZLI_CONFIG_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from(FALLBACK_CONFIG_DIR))
                .join(ZLI_SUBDIR)
        });
    tracing::trace!(dir = %dir.display(), "Resolved config directory");
    dir
}

/// Config profile name ($ZLI_CONFIG_NAME or "prod")
pub fn config_name() -> String {
    let name = env_opt(ZLI_CONFIG_NAME).unwrap_or_else(|| DEFAULT_CONFIG_NAME.to_string());
    tracing::trace!(name = %name, "Resolved config name");
    name
}

/// Full path of the CLI config file: <config_dir>/<config_name>.json
pub fn config_path() -> PathBuf {
    config_dir().join(format!("{}.json", config_name()))
}

/// Grace period between SIGTERM and SIGKILL ($ZLI_KILL_GRACE_MS or 5000)
pub fn kill_grace_period() -> Duration {
    env_opt(ZLI_KILL_GRACE_MS)
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_KILL_GRACE)
}

/// Log filter directive ($ZLI_LOG or "warn")
pub fn log_filter() -> String {
    env_opt(ZLI_LOG).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

/// The user's kubeconfig: first entry of $KUBECONFIG, else ~/.kube/config
pub fn kube_config_path() -> PathBuf {
    let path = env_opt(KUBECONFIG)
        .and_then(|list| {
            std::env::split_paths(&list)
                .find(|p| !p.as_os_str().is_empty())
        })
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join(".kube")
                .join("config")
        });
    tracing::trace!(path = %path.display(), "Resolved kubeconfig path");
    path
}
