mod cli;
mod client;
mod config;
mod daemon;
mod ipc;
mod lock;
mod model;
mod sampler;

use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Daemon(args) => {
            let config = match args.into_config().validate() {
                Ok(config) => config,
                Err(e) => {
                    tracing::error!(error = %e, "invalid configuration");
                    eprintln!("applockd daemon: {e}");
                    std::process::exit(1);
                }
            };
            if let Err(e) = daemon::run(config).await {
                tracing::error!(error = %e, "daemon failed");
                eprintln!("applockd daemon: {e}");
                std::process::exit(1);
            }
        }
        Command::Client { action } => {
            if let Err(e) = client::run(action).await {
                tracing::error!(error = %e, "client failed");
                eprintln!("applockd client: {e}");
                std::process::exit(1);
            }
        }
    }
}
