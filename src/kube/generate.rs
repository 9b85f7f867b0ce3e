use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fs;

use super::kubeconfig::{AuthInfo, Cluster, Context, KubeConfig, NamedCluster, NamedContext, NamedUser};
use super::reconcile::bzero_user_name;
use super::security::KubeDaemonSecurityConfig;
use crate::daemon::{DaemonConfig, DaemonKind, DaemonManagementService, DaemonStatus, KubeDaemon};
use crate::error::{Result, ZliError};

/// Context (and cluster) name for a kube daemon's target.
pub fn context_name(daemon: &DaemonConfig<KubeDaemon>) -> String {
    format!(
        "bzero-{}@{}",
        daemon.details.target_user, daemon.details.target_cluster
    )
}

/// The registered kube daemon under `key`, provided its process is alive.
///
/// Runs a status sweep first, so a daemon that never started is pruned.
pub fn running_kube_daemon(
    daemons: &DaemonManagementService<KubeDaemon>,
    key: Option<&str>,
) -> Result<DaemonConfig<KubeDaemon>> {
    let unavailable = |reason: String| ZliError::DaemonUnavailable {
        kind: DaemonKind::Kube,
        key: key.unwrap_or("(legacy)").to_string(),
        reason,
    };

    let mut report = daemons.get_all_daemon_statuses()?;
    match report.statuses.remove(&key.map(str::to_string)) {
        Some(DaemonStatus::DaemonIsRunning { config, .. }) => Ok(config),
        Some(DaemonStatus::NoDaemonRunning { .. }) => Err(unavailable("never started".into())),
        Some(DaemonStatus::DaemonQuitUnexpectedly { config }) => Err(unavailable(format!(
            "pid {} is no longer running; reconnect first",
            config.local_pid.unwrap_or_default()
        ))),
        None => Err(unavailable("not registered".into())),
    }
}

/// Kubeconfig fragment pointing kubectl at a local kube daemon.
///
/// The cluster trusts the daemon's self-signed certificate and the user
/// authenticates with the shared daemon token.
pub fn build_kube_config(
    daemon: &DaemonConfig<KubeDaemon>,
    security: &KubeDaemonSecurityConfig,
    email: &str,
) -> Result<KubeConfig> {
    let cert_pem = fs::read(&security.cert_path)?;
    let name = context_name(daemon);
    let user_name = bzero_user_name(email);

    let mut config = KubeConfig::new();
    config.clusters.push(NamedCluster {
        name: name.clone(),
        cluster: Cluster {
            server: format!("https://{}:{}", daemon.local_host, daemon.local_port),
            certificate_authority_data: Some(STANDARD.encode(cert_pem)),
            ..Cluster::default()
        },
    });
    config.contexts.push(NamedContext {
        name: name.clone(),
        context: Context {
            cluster: name.clone(),
            user: user_name.clone(),
            ..Context::default()
        },
    });
    config.users.push(NamedUser {
        name: user_name,
        user: AuthInfo {
            token: Some(security.token.clone()),
            ..AuthInfo::default()
        },
    });
    config.current_context = Some(name);

    Ok(config)
}
