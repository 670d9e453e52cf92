use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use bastion::server::{ServerConfig, start_server};

#[derive(Parser)]
#[command(name = "bastion")]
#[command(version, about = "Bastion-host deployment console for NKP clusters")]
struct Cli {
    /// Port for the control API
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Deployment base directory (config artifacts, script working dir)
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// Directory holding the deployment scripts (defaults to <base-dir>/scripts)
    #[arg(long)]
    scripts_dir: Option<PathBuf>,

    /// Bind on all interfaces and allow cross-origin requests
    #[arg(long)]
    dev: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "bastion=debug" } else { "bastion=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    start_server(ServerConfig {
        port: cli.port,
        base_dir: cli.base_dir,
        scripts_dir: cli.scripts_dir,
        dev_mode: cli.dev,
    })
    .await
}
