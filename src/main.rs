mod args;
mod cmd_daemon;
mod cmd_kube;

use args::{Cli, Commands};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_new(zli::clienv::log_filter())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemons { command } => cmd_daemon::cmd_daemons(command).await?,
        Commands::Kube { command } => cmd_kube::cmd_kube(command).await?,
    }

    Ok(())
}
