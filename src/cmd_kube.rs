use anyhow::{Context, Result};
use std::sync::Arc;
use zli::daemon::{DaemonManagementService, KubeDaemon, OsProcessManager};
use zli::kube::{build_kube_config, get_security_settings, running_kube_daemon, KubeConfigReconciler};
use zli::{clienv, ConfigService};

use crate::args::KubeCommands;

pub(crate) async fn cmd_kube(command: KubeCommands) -> Result<()> {
    let config = ConfigService::from_env();
    let daemons =
        DaemonManagementService::<KubeDaemon>::for_config(&config, Arc::new(OsProcessManager::new()));
    let path = clienv::kube_config_path();

    match command {
        KubeCommands::Generate {
            connection_id,
            force,
        } => {
            let daemon = running_kube_daemon(&daemons, connection_id.as_deref())?;

            let security = get_security_settings(&config, force)?;
            let email = config.me()?.email;
            let fragment = build_kube_config(&daemon, &security, &email)?;

            KubeConfigReconciler::new(&config, &daemons)
                .sync_file(&path, Some(&fragment))
                .with_context(|| format!("Failed to update {}", path.display()))?;

            println!(
                "Updated {} (context {})",
                path.display(),
                fragment.current_context().unwrap_or_default()
            );
        }
        KubeCommands::Prune => {
            let report = KubeConfigReconciler::new(&config, &daemons)
                .sync_file(&path, None)
                .with_context(|| format!("Failed to prune {}", path.display()))?;

            if report.is_changed() {
                for name in &report.removed_contexts {
                    println!("Removed context {}", name);
                }
                for name in &report.removed_users {
                    println!("Removed user {}", name);
                }
            } else {
                println!("{} is up to date", path.display());
            }
        }
    }

    Ok(())
}
