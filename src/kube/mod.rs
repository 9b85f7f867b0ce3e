//! Kubeconfig and kube daemon security material
//!
//! - [`kubeconfig`]: in-memory kubeconfig model, file I/O and merging
//! - [`reconcile`]: pruning of stale bzero-managed entries against live daemons
//! - [`generate`]: the fragment a new kube daemon contributes
//! - [`security`]: shared mTLS cert/key/CSR and token for kube daemons

pub mod generate;
pub mod kubeconfig;
pub mod reconcile;
pub mod security;

pub use generate::{build_kube_config, running_kube_daemon};
pub use kubeconfig::{load_kube_config, merge_kube_config, write_kube_config, KubeConfig};
pub use reconcile::{filter_kube_config, FilteredKubeConfig, KubeConfigReconciler};
pub use security::{get_security_settings, KubeDaemonSecurityConfig};
