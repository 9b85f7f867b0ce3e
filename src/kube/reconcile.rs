use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use super::kubeconfig::{load_kube_config, merge_kube_config, write_kube_config, KubeConfig};
use crate::daemon::{DaemonManagementService, KubeDaemon};
use crate::error::Result;
use crate::user_config::ConfigService;

/// Kubeconfig user name of entries this CLI generates for `email`.
pub fn bzero_user_name(email: &str) -> String {
    format!("bzero-{email}")
}

/// Port of a cluster server url, defaulting by scheme.
pub fn server_port(server: &str) -> Option<u16> {
    let (scheme, rest) = server.split_once("://").unwrap_or(("https", server));
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or_default();

    let port = match host_port.strip_prefix('[') {
        Some(bracketed) => bracketed
            .split_once(']')
            .and_then(|(_, after)| after.strip_prefix(':')),
        None => host_port.rsplit_once(':').map(|(_, port)| port),
    };

    match port {
        Some(port) => port.parse().ok(),
        None => match scheme {
            "https" => Some(443),
            "http" => Some(80),
            _ => None,
        },
    }
}

/// Kubeconfig with stale bzero entries removed, plus what was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredKubeConfig {
    pub filtered_kube_config: KubeConfig,
    pub removed_clusters: Vec<String>,
    pub removed_contexts: Vec<String>,
    pub removed_users: Vec<String>,
}

impl FilteredKubeConfig {
    pub fn is_changed(&self) -> bool {
        !(self.removed_clusters.is_empty()
            && self.removed_contexts.is_empty()
            && self.removed_users.is_empty())
    }
}

/// Drop bzero-managed entries whose kube daemon is gone.
///
/// A bzero context (one whose user is `bzero-<email>`) survives only if its
/// cluster's server port belongs to a registered kube daemon. Its cluster is
/// dropped with it unless another surviving context still uses it. The bzero user survives only while some kube daemon is running.
/// Everything else passes through in its original order. The input is not
/// modified.
///
/// Runs a kube status sweep, which prunes daemons without a pid.
pub fn filter_kube_config(
    config: &ConfigService,
    daemons: &DaemonManagementService<KubeDaemon>,
    kube_config: &KubeConfig,
) -> Result<FilteredKubeConfig> {
    let user_name = bzero_user_name(&config.me()?.email);

    let live_ports: HashSet<u16> = daemons
        .get_daemon_configs()?
        .values()
        .map(|daemon| daemon.local_port)
        .collect();
    let any_running = daemons.get_all_daemon_statuses()?.any_running();

    let mut removed_contexts = HashSet::new();
    let mut dropped_clusters = HashSet::new();

    for ctx in kube_config
        .contexts
        .iter()
        .filter(|ctx| ctx.context.user == user_name)
    {
        let port = kube_config
            .cluster(&ctx.context.cluster)
            .and_then(|cluster| server_port(&cluster.cluster.server));
        let live = port.is_some_and(|port| live_ports.contains(&port));
        debug!(context = %ctx.name, port = ?port, live, "Checking bzero context");

        if !live {
            removed_contexts.insert(ctx.name.as_str());
            dropped_clusters.insert(ctx.context.cluster.as_str());
        }
    }

    // A cluster still referenced by any surviving context stays, bzero or not.
    let referenced: HashSet<&str> = kube_config
        .contexts
        .iter()
        .filter(|ctx| !removed_contexts.contains(ctx.name.as_str()))
        .map(|ctx| ctx.context.cluster.as_str())
        .collect();
    dropped_clusters.retain(|name| !referenced.contains(name));

    let mut filtered = kube_config.clone();
    let mut report = FilteredKubeConfig {
        filtered_kube_config: KubeConfig::default(),
        removed_clusters: Vec::new(),
        removed_contexts: Vec::new(),
        removed_users: Vec::new(),
    };

    filtered.contexts.retain(|ctx| {
        let keep = !removed_contexts.contains(ctx.name.as_str());
        if !keep {
            report.removed_contexts.push(ctx.name.clone());
        }
        keep
    });
    filtered.clusters.retain(|cluster| {
        let keep = !dropped_clusters.contains(cluster.name.as_str());
        if !keep {
            report.removed_clusters.push(cluster.name.clone());
        }
        keep
    });
    if !any_running {
        filtered.users.retain(|user| {
            let keep = user.name != user_name;
            if !keep {
                report.removed_users.push(user.name.clone());
            }
            keep
        });
    }

    if filtered
        .current_context()
        .is_some_and(|current| removed_contexts.contains(current))
    {
        filtered.current_context = None;
    }

    report.filtered_kube_config = filtered;
    Ok(report)
}

/// Keeps the user's kubeconfig in line with the live kube daemons.
pub struct KubeConfigReconciler<'a> {
    config: &'a ConfigService,
    daemons: &'a DaemonManagementService<KubeDaemon>,
}

impl<'a> KubeConfigReconciler<'a> {
    pub fn new(config: &'a ConfigService, daemons: &'a DaemonManagementService<KubeDaemon>) -> Self {
        Self { config, daemons }
    }

    pub fn filter(&self, kube_config: &KubeConfig) -> Result<FilteredKubeConfig> {
        filter_kube_config(self.config, self.daemons, kube_config)
    }

    /// Filter the kubeconfig at `path`, merge `fragment` on top, and write
    /// the result back. The file is left alone when nothing changes.
    pub fn sync_file(&self, path: &Path, fragment: Option<&KubeConfig>) -> Result<FilteredKubeConfig> {
        let existing = load_kube_config(path)?;
        let mut report = self.filter(&existing)?;

        if let Some(fragment) = fragment {
            report.filtered_kube_config = merge_kube_config(&report.filtered_kube_config, fragment);
        }

        if fragment.is_some() || report.is_changed() {
            write_kube_config(path, &report.filtered_kube_config)?;
        } else {
            debug!(path = %path.display(), "Kubeconfig already up to date");
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::testing::{MemoryDaemonStore, ScriptedProcessManager};
    use crate::daemon::{DaemonConfig, DaemonConfigs};
    use crate::kube::kubeconfig::{AuthInfo, Cluster, Context, NamedCluster, NamedContext, NamedUser};
    use std::sync::Arc;

    const EMAIL: &str = "alice@example.com";

    fn logged_in(dir: &tempfile::TempDir) -> ConfigService {
        let config = ConfigService::new(dir.path().join("prod.json"));
        std::fs::write(config.path(), format!(r#"{{"whoami": {{"email": "{EMAIL}"}}}}"#)).unwrap();
        config
    }

    fn kube_daemon(port: u16, pid: Option<u32>) -> DaemonConfig<KubeDaemon> {
        DaemonConfig::new("prod", "localhost", port, pid, KubeDaemon {
            target_cluster: "prod".into(),
            target_user: "admin".into(),
            target_groups: vec![],
        })
    }

    fn daemons(
        entries: &[(&str, DaemonConfig<KubeDaemon>)],
        processes: ScriptedProcessManager,
    ) -> DaemonManagementService<KubeDaemon> {
        let registry: DaemonConfigs<KubeDaemon> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        DaemonManagementService::new(
            Box::new(MemoryDaemonStore::new(registry)),
            Arc::new(processes),
        )
    }

    fn add_entry(config: &mut KubeConfig, name: &str, server: &str, user: &str) {
        config.clusters.push(NamedCluster {
            name: name.into(),
            cluster: Cluster {
                server: server.into(),
                ..Cluster::default()
            },
        });
        config.contexts.push(NamedContext {
            name: name.into(),
            context: Context {
                cluster: name.into(),
                user: user.into(),
                ..Context::default()
            },
        });
        if !config.users.iter().any(|u| u.name == user) {
            config.users.push(NamedUser {
                name: user.into(),
                user: AuthInfo::default(),
            });
        }
    }

    fn bzero_config(port: u16) -> KubeConfig {
        let mut config = KubeConfig::new();
        add_entry(
            &mut config,
            "bzero-admin@prod",
            &format!("https://localhost:{port}"),
            &bzero_user_name(EMAIL),
        );
        config.current_context = Some("bzero-admin@prod".into());
        config
    }

    #[test]
    fn server_port_parsing() {
        assert_eq!(server_port("https://localhost:9443"), Some(9443));
        assert_eq!(server_port("https://127.0.0.1:6443/api"), Some(6443));
        assert_eq!(server_port("https://[::1]:8443"), Some(8443));
        assert_eq!(server_port("https://example.com"), Some(443));
        assert_eq!(server_port("http://example.com/"), Some(80));
        assert_eq!(server_port("localhost:9000"), Some(9000));
        assert_eq!(server_port("https://localhost:notaport"), None);
    }

    #[test]
    fn live_daemon_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let config = logged_in(&dir);
        let daemons = daemons(
            &[("c1", kube_daemon(9443, Some(10)))],
            ScriptedProcessManager::new().running(10),
        );
        let input = bzero_config(9443);

        let result = filter_kube_config(&config, &daemons, &input).unwrap();

        assert_eq!(result.filtered_kube_config, input);
        assert!(!result.is_changed());
    }

    #[test]
    fn no_daemons_removes_bzero_entries() {
        let dir = tempfile::tempdir().unwrap();
        let config = logged_in(&dir);
        let daemons = daemons(&[], ScriptedProcessManager::new());
        let input = bzero_config(9443);

        let result = filter_kube_config(&config, &daemons, &input).unwrap();
        let filtered = &result.filtered_kube_config;

        assert!(filtered.clusters.is_empty());
        assert!(filtered.contexts.is_empty());
        assert!(filtered.users.is_empty());
        assert_eq!(filtered.current_context, None);
        assert_eq!(result.removed_users, vec![bzero_user_name(EMAIL)]);
        // Input untouched.
        assert_eq!(input.clusters.len(), 1);
    }

    #[test]
    fn foreign_entries_pass_through_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = logged_in(&dir);
        let daemons = daemons(&[], ScriptedProcessManager::new());

        let mut input = KubeConfig::new();
        add_entry(&mut input, "eks", "https://10.0.0.1:9443", "eks-admin");
        add_entry(&mut input, "bzero-admin@prod", "https://localhost:9443", &bzero_user_name(EMAIL));
        add_entry(&mut input, "kind", "https://127.0.0.1:6443", "kind-user");
        // Someone else's bzero entries are not ours to manage.
        add_entry(&mut input, "bzero-bob", "https://localhost:7000", "bzero-bob@example.com");
        input.current_context = Some("eks".into());

        let result = filter_kube_config(&config, &daemons, &input).unwrap();
        let filtered = &result.filtered_kube_config;

        let clusters: Vec<&str> = filtered.clusters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(clusters, vec!["eks", "kind", "bzero-bob"]);
        let users: Vec<&str> = filtered.users.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(users, vec!["eks-admin", "kind-user", "bzero-bob@example.com"]);
        assert_eq!(filtered.current_context(), Some("eks"));
    }

    #[test]
    fn cluster_shared_with_foreign_context_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let config = logged_in(&dir);
        let daemons = daemons(&[], ScriptedProcessManager::new());

        let mut input = bzero_config(9443);
        input.contexts.push(NamedContext {
            name: "ops@prod".into(),
            context: Context {
                cluster: "bzero-admin@prod".into(),
                user: "ops".into(),
                ..Context::default()
            },
        });

        let result = filter_kube_config(&config, &daemons, &input).unwrap();
        let filtered = &result.filtered_kube_config;

        assert_eq!(result.removed_contexts, vec!["bzero-admin@prod".to_string()]);
        assert!(result.removed_clusters.is_empty());
        let clusters: Vec<&str> = filtered.clusters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(clusters, vec!["bzero-admin@prod"]);
        let contexts: Vec<&str> = filtered.contexts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(contexts, vec!["ops@prod"]);
    }

    #[test]
    fn context_survives_by_port_user_by_any_running() {
        let dir = tempfile::tempdir().unwrap();
        let config = logged_in(&dir);
        // Registered on 9443 but its process is dead; a different daemon is running.
        let daemons = daemons(
            &[
                ("c1", kube_daemon(9443, Some(10))),
                ("c2", kube_daemon(9555, Some(20))),
            ],
            ScriptedProcessManager::new().running(20),
        );

        let mut input = KubeConfig::new();
        let user = bzero_user_name(EMAIL);
        add_entry(&mut input, "a", "https://localhost:9443", &user);
        add_entry(&mut input, "b", "https://localhost:9999", &user);

        let result = filter_kube_config(&config, &daemons, &input).unwrap();
        let filtered = &result.filtered_kube_config;

        let contexts: Vec<&str> = filtered.contexts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(contexts, vec!["a"]);
        assert_eq!(result.removed_clusters, vec!["b".to_string()]);
        assert_eq!(filtered.users.len(), 1);
    }

    #[test]
    fn user_removed_when_nothing_running_even_if_ports_registered() {
        let dir = tempfile::tempdir().unwrap();
        let config = logged_in(&dir);
        let daemons = daemons(
            &[("c1", kube_daemon(9443, Some(10)))],
            ScriptedProcessManager::new(),
        );

        let result = filter_kube_config(&config, &daemons, &bzero_config(9443)).unwrap();

        assert_eq!(result.filtered_kube_config.contexts.len(), 1);
        assert!(result.filtered_kube_config.users.is_empty());
    }

    #[test]
    fn filter_requires_login() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigService::new(dir.path().join("prod.json"));
        let daemons = daemons(&[], ScriptedProcessManager::new());
        assert!(filter_kube_config(&config, &daemons, &KubeConfig::new()).is_err());
    }

    #[test]
    fn sync_file_merges_fragment_and_prunes() {
        let dir = tempfile::tempdir().unwrap();
        let config = logged_in(&dir);
        let daemons = daemons(
            &[("c2", kube_daemon(9555, Some(20)))],
            ScriptedProcessManager::new().running(20),
        );
        let path = dir.path().join("kube").join("config");

        // Stale entry from a daemon that no longer exists.
        let mut stale = bzero_config(9443);
        stale.contexts[0].name = "stale".into();
        stale.current_context = Some("stale".into());
        write_kube_config(&path, &stale).unwrap();

        let mut fragment = KubeConfig::new();
        add_entry(&mut fragment, "fresh", "https://localhost:9555", &bzero_user_name(EMAIL));
        fragment.current_context = Some("fresh".into());

        let reconciler = KubeConfigReconciler::new(&config, &daemons);
        let report = reconciler.sync_file(&path, Some(&fragment)).unwrap();
        assert_eq!(report.removed_contexts, vec!["stale".to_string()]);

        let written = load_kube_config(&path).unwrap();
        let contexts: Vec<&str> = written.contexts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(contexts, vec!["fresh"]);
        assert_eq!(written.current_context(), Some("fresh"));
        assert_eq!(written.users.len(), 1);
    }

    #[test]
    fn sync_file_without_changes_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = logged_in(&dir);
        let daemons = daemons(&[], ScriptedProcessManager::new());
        let path = dir.path().join("config");

        let reconciler = KubeConfigReconciler::new(&config, &daemons);
        let report = reconciler.sync_file(&path, None).unwrap();

        assert!(!report.is_changed());
        assert!(!path.exists());
    }
}
