use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::user_config::write_atomic;

/// In-memory kubeconfig. Only the fields the reconciler reads are typed;
/// everything else round-trips through the `extra` maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KubeConfig {
    #[serde(rename = "apiVersion", default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub clusters: Vec<NamedCluster>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub contexts: Vec<NamedContext>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub users: Vec<NamedUser>,
    #[serde(
        rename = "current-context",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub current_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: Cluster,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default)]
    pub server: String,
    #[serde(
        rename = "certificate-authority-data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate_authority_data: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: Context,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(default)]
    pub user: AuthInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

trait Named {
    fn name(&self) -> &str;
}

impl Named for NamedCluster {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for NamedContext {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for NamedUser {
    fn name(&self) -> &str {
        &self.name
    }
}

impl KubeConfig {
    /// Empty config with the standard header.
    pub fn new() -> Self {
        Self {
            api_version: Some("v1".to_string()),
            kind: Some("Config".to_string()),
            ..Self::default()
        }
    }

    /// `current-context`, treating kubectl's empty string as unset.
    pub fn current_context(&self) -> Option<&str> {
        self.current_context.as_deref().filter(|c| !c.is_empty())
    }

    pub fn cluster(&self, name: &str) -> Option<&NamedCluster> {
        self.clusters.iter().find(|c| c.name == name)
    }
}

/// Entries of `source`, each replaced by the same-named entry of
/// `destination` if one exists, followed by the remaining `destination`
/// entries. Names are unique in the output; the first occurrence wins.
fn union_by_name<T: Named + Clone>(source: &[T], destination: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(source.len() + destination.len());

    for item in source {
        if !seen.insert(item.name().to_string()) {
            continue;
        }
        let chosen = destination
            .iter()
            .find(|d| d.name() == item.name())
            .unwrap_or(item);
        merged.push(chosen.clone());
    }
    for item in destination {
        if seen.insert(item.name().to_string()) {
            merged.push(item.clone());
        }
    }

    merged
}

/// Merge a freshly generated `destination` fragment into `source`.
///
/// Clusters, contexts and users are unioned by name with `destination`
/// winning on collisions. `current-context` comes from `destination` when
/// set. Neither input is modified.
pub fn merge_kube_config(source: &KubeConfig, destination: &KubeConfig) -> KubeConfig {
    let mut extra = source.extra.clone();
    extra.extend(destination.extra.clone());

    KubeConfig {
        api_version: destination
            .api_version
            .clone()
            .or_else(|| source.api_version.clone()),
        kind: destination.kind.clone().or_else(|| source.kind.clone()),
        clusters: union_by_name(&source.clusters, &destination.clusters),
        contexts: union_by_name(&source.contexts, &destination.contexts),
        users: union_by_name(&source.users, &destination.users),
        current_context: destination
            .current_context()
            .or_else(|| source.current_context())
            .map(str::to_string),
        preferences: destination
            .preferences
            .clone()
            .or_else(|| source.preferences.clone()),
        extra,
    }
}

/// Load a kubeconfig; a missing or empty file is an empty config.
pub fn load_kube_config(path: &Path) -> Result<KubeConfig> {
    tracing::trace!(path = %path.display(), "Loading kubeconfig");
    if !path.exists() {
        return Ok(KubeConfig::new());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(KubeConfig::new());
    }
    Ok(serde_yaml::from_str(&content)?)
}

pub fn write_kube_config(path: &Path, config: &KubeConfig) -> Result<()> {
    tracing::trace!(path = %path.display(), "Writing kubeconfig");
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    write_atomic(path, serde_yaml::to_string(config)?, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(name: &str, server: &str) -> NamedCluster {
        NamedCluster {
            name: name.to_string(),
            cluster: Cluster {
                server: server.to_string(),
                ..Cluster::default()
            },
        }
    }

    fn context(name: &str, cluster: &str, user: &str) -> NamedContext {
        NamedContext {
            name: name.to_string(),
            context: Context {
                cluster: cluster.to_string(),
                user: user.to_string(),
                ..Context::default()
            },
        }
    }

    fn user(name: &str, token: &str) -> NamedUser {
        NamedUser {
            name: name.to_string(),
            user: AuthInfo {
                token: Some(token.to_string()),
                ..AuthInfo::default()
            },
        }
    }

    #[test]
    fn merge_prefers_destination_on_collision() {
        let mut source = KubeConfig::new();
        source.clusters = vec![cluster("a", "https://a:1"), cluster("shared", "https://old:1")];
        source.users = vec![user("u", "old-token")];
        source.current_context = Some("ctx-a".into());

        let mut destination = KubeConfig::new();
        destination.clusters = vec![cluster("shared", "https://new:2"), cluster("b", "https://b:3")];
        destination.users = vec![user("u", "new-token")];

        let source_before = source.clone();
        let destination_before = destination.clone();
        let merged = merge_kube_config(&source, &destination);

        let names: Vec<&str> = merged.clusters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "shared", "b"]);
        assert_eq!(merged.cluster("shared").unwrap().cluster.server, "https://new:2");
        assert_eq!(merged.users.len(), 1);
        assert_eq!(merged.users[0].user.token.as_deref(), Some("new-token"));
        assert_eq!(merged.current_context(), Some("ctx-a"));

        assert_eq!(source, source_before);
        assert_eq!(destination, destination_before);
    }

    #[test]
    fn merge_dedupes_within_inputs() {
        let mut source = KubeConfig::new();
        source.contexts = vec![context("c", "x", "u"), context("c", "y", "u")];
        let mut destination = KubeConfig::new();
        destination.contexts = vec![context("d", "x", "u"), context("d", "z", "u")];

        let merged = merge_kube_config(&source, &destination);
        let names: Vec<&str> = merged.contexts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c", "d"]);
        assert_eq!(merged.contexts[0].context.cluster, "x");
        assert_eq!(merged.contexts[1].context.cluster, "x");
    }

    #[test]
    fn merge_current_context_from_destination_when_set() {
        let mut source = KubeConfig::new();
        source.current_context = Some("old".into());
        let mut destination = KubeConfig::new();
        destination.current_context = Some("new".into());
        assert_eq!(merge_kube_config(&source, &destination).current_context(), Some("new"));

        destination.current_context = Some(String::new());
        assert_eq!(merge_kube_config(&source, &destination).current_context(), Some("old"));
    }

    #[test]
    fn parses_kubectl_output_and_keeps_unknown_fields() {
        let yaml = r#"
apiVersion: v1
kind: Config
clusters:
- cluster:
    server: https://10.0.0.1:6443
    insecure-skip-tls-verify: true
  name: eks
contexts:
- context:
    cluster: eks
    user: eks-admin
    namespace: default
  name: eks
current-context: eks
preferences: {}
users:
- name: eks-admin
  user:
    exec:
      command: aws
"#;
        let config: KubeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.clusters[0].cluster.server, "https://10.0.0.1:6443");
        assert!(config.clusters[0].cluster.extra.contains_key("insecure-skip-tls-verify"));
        assert!(config.users[0].user.extra.contains_key("exec"));
        assert_eq!(config.contexts[0].context.namespace.as_deref(), Some("default"));

        let rendered = serde_yaml::to_string(&config).unwrap();
        let reparsed: KubeConfig = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn null_collections_parse_as_empty() {
        let config: KubeConfig =
            serde_yaml::from_str("apiVersion: v1\nclusters: null\ncontexts:\nusers: []\n").unwrap();
        assert!(config.clusters.is_empty());
        assert!(config.contexts.is_empty());
        assert!(config.users.is_empty());
    }

    #[test]
    fn load_missing_file_is_empty_and_write_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".kube").join("config");

        let empty = load_kube_config(&path).unwrap();
        assert!(empty.clusters.is_empty());

        let mut config = KubeConfig::new();
        config.clusters.push(cluster("a", "https://localhost:9443"));
        write_kube_config(&path, &config).unwrap();
        assert_eq!(load_kube_config(&path).unwrap(), config);
    }

    #[test]
    fn write_replaces_existing_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, "clusters: []\n").unwrap();

        let mut config = KubeConfig::new();
        config.clusters.push(cluster("b", "https://localhost:9444"));
        write_kube_config(&path, &config).unwrap();

        assert_eq!(load_kube_config(&path).unwrap(), config);
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("config")]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
