use chatnet::cli::{commands::Cli, run_cli};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("Starting chatnet...");

    if let Err(e) = run_cli(cli.command, cli.config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
