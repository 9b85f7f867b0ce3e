use clap::{Parser, Subcommand, ValueEnum};
use zli::daemon::DaemonKind;

#[derive(Parser)]
#[command(name = "zli")]
#[command(version)]
#[command(about = "Zero-trust access CLI", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Manage local tunnel daemons
    Daemons {
        #[command(subcommand)]
        command: DaemonCommands,
    },

    /// Manage the kubeconfig entries of local kube daemons
    Kube {
        #[command(subcommand)]
        command: KubeCommands,
    },
}

#[derive(Subcommand)]
pub(crate) enum DaemonCommands {
    /// Show every registered daemon and whether it is still running
    List {
        /// Only this kind of daemon (default: all)
        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,
    },

    /// Kill every registered daemon
    Disconnect {
        /// Only this kind of daemon (default: all)
        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,
    },

    /// Kill a single daemon
    Close {
        /// Kind of daemon
        #[arg(value_enum)]
        kind: KindArg,

        /// Connection id (omit for a daemon started by an older zli)
        connection_id: Option<String>,
    },
}

#[derive(Subcommand)]
pub(crate) enum KubeCommands {
    /// Add a running kube daemon's context to your kubeconfig
    Generate {
        /// Connection id of the kube daemon (omit for a daemon started by an older zli)
        connection_id: Option<String>,

        /// Regenerate certificates and rotate the daemon token
        #[arg(long)]
        force: bool,
    },

    /// Remove kubeconfig entries whose daemon is gone
    Prune,
}

#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum KindArg {
    Db,
    Kube,
    Web,
    Shell,
}

impl From<KindArg> for DaemonKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Db => DaemonKind::Db,
            KindArg::Kube => DaemonKind::Kube,
            KindArg::Web => DaemonKind::Web,
            KindArg::Shell => DaemonKind::Shell,
        }
    }
}

/// The selected kind, or every kind.
pub(crate) fn kinds(kind: Option<KindArg>) -> Vec<DaemonKind> {
    match kind {
        Some(kind) => vec![kind.into()],
        None => DaemonKind::ALL.to_vec(),
    }
}
