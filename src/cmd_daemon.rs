use anyhow::Result;
use std::sync::Arc;
use zli::daemon::{
    DaemonDetails, DaemonKey, DaemonKind, DaemonManagementService, DaemonStatus, DbDaemon,
    DisconnectResult, KubeDaemon, OsProcessManager, ProcessManager, ShellDaemon, WebDaemon,
};
use zli::kube::KubeConfigReconciler;
use zli::{clienv, ConfigService};

use crate::args::{kinds, DaemonCommands};

/// Run `$f::<T>(args)` for the registry type of a runtime [`DaemonKind`].
macro_rules! for_kind {
    ($kind:expr, $f:ident($($arg:expr),*)) => {
        match $kind {
            DaemonKind::Db => $f::<DbDaemon>($($arg),*).await,
            DaemonKind::Kube => $f::<KubeDaemon>($($arg),*).await,
            DaemonKind::Web => $f::<WebDaemon>($($arg),*).await,
            DaemonKind::Shell => $f::<ShellDaemon>($($arg),*).await,
        }
    };
}

pub(crate) async fn cmd_daemons(command: DaemonCommands) -> Result<()> {
    let config = ConfigService::from_env();
    let processes: Arc<dyn ProcessManager> = Arc::new(OsProcessManager::new());

    match command {
        DaemonCommands::List { kind } => {
            for kind in kinds(kind) {
                for_kind!(kind, list_kind(&config, &processes))?;
            }
        }
        DaemonCommands::Disconnect { kind } => {
            for kind in kinds(kind) {
                for_kind!(kind, disconnect_kind(&config, &processes))?;
            }
        }
        DaemonCommands::Close {
            kind,
            connection_id,
        } => {
            let kind: DaemonKind = kind.into();
            let key = connection_id.as_deref();
            for_kind!(kind, close_daemon(&config, &processes, key))?;
        }
    }

    Ok(())
}

async fn list_kind<T: DaemonDetails>(
    config: &ConfigService,
    processes: &Arc<dyn ProcessManager>,
) -> Result<()> {
    let service = DaemonManagementService::<T>::for_config(config, Arc::clone(processes));
    let report = service.get_all_daemon_statuses()?;

    for (key, status) in &report.statuses {
        println!("{:<6} {:<38} {}", T::KIND, display_key(key), describe_status(status));
    }
    if report.pruned > 0 {
        println!(
            "Removed {} {} daemon entr{} that never started",
            report.pruned,
            T::KIND,
            if report.pruned == 1 { "y" } else { "ies" }
        );
    }

    Ok(())
}

async fn disconnect_kind<T: DaemonDetails>(
    config: &ConfigService,
    processes: &Arc<dyn ProcessManager>,
) -> Result<()> {
    let service = DaemonManagementService::<T>::for_config(config, Arc::clone(processes));
    let results = service.disconnect_all_daemons().await?;

    if results.is_empty() {
        println!("No {} daemons to disconnect", T::KIND);
    }
    for (key, result) in &results {
        println!("{:<6} {:<38} {}", T::KIND, display_key(key), describe_disconnect(result));
    }

    if T::KIND == DaemonKind::Kube {
        prune_kube_config(config, processes);
    }
    Ok(())
}

async fn close_daemon<T: DaemonDetails>(
    config: &ConfigService,
    processes: &Arc<dyn ProcessManager>,
    key: Option<&str>,
) -> Result<()> {
    let service = DaemonManagementService::<T>::for_config(config, Arc::clone(processes));
    let owned_key = key.map(str::to_string);

    match service.disconnect_daemon(key).await? {
        Some(result) => println!(
            "{:<6} {:<38} {}",
            T::KIND,
            display_key(&owned_key),
            describe_disconnect(&result)
        ),
        None => println!("No {} daemon registered for {}", T::KIND, display_key(&owned_key)),
    }

    if T::KIND == DaemonKind::Kube {
        prune_kube_config(config, processes);
    }
    Ok(())
}

/// Drop kubeconfig entries of daemons that were just killed. Failures are
/// reported, never fatal: the daemons are already gone.
fn prune_kube_config(config: &ConfigService, processes: &Arc<dyn ProcessManager>) {
    let daemons = DaemonManagementService::<KubeDaemon>::for_config(config, Arc::clone(processes));
    let path = clienv::kube_config_path();

    match KubeConfigReconciler::new(config, &daemons).sync_file(&path, None) {
        Ok(report) if report.is_changed() => println!(
            "Removed {} stale context(s) from {}",
            report.removed_contexts.len(),
            path.display()
        ),
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to prune kubeconfig: {}", e);
            println!("Could not clean up {}: {}", path.display(), e);
        }
    }
}

fn display_key(key: &DaemonKey) -> &str {
    key.as_deref().unwrap_or("(legacy)")
}

fn describe_status<T>(status: &DaemonStatus<T>) -> String {
    match status {
        DaemonStatus::NoDaemonRunning { config } => {
            format!("no daemon running ({})", config.name)
        }
        DaemonStatus::DaemonQuitUnexpectedly { config } => format!(
            "daemon quit unexpectedly (pid {}, was {} on {})",
            config.local_pid.unwrap_or_default(),
            config.name,
            config.local_address()
        ),
        DaemonStatus::DaemonIsRunning { status, .. } => format!("running: {status}"),
    }
}

fn describe_disconnect<T>(result: &DisconnectResult<T>) -> String {
    match result {
        DisconnectResult::DaemonPidNotSet { config } => {
            format!("removed {} (no daemon was started)", config.name)
        }
        DisconnectResult::DaemonFailKilled { config, error } => {
            format!("removed {} but could not kill its daemon: {error}", config.name)
        }
        DisconnectResult::DaemonSuccessKilled {
            config,
            kill_result,
        } => format!("disconnected {} ({kill_result})", config.name),
    }
}
