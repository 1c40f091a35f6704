use std::process::ExitCode;

use clap::Parser;
use tcpchat::{Args, Server, ServerConfig};
use tracing::{error, info};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from(Args::parse());
    info!("Binding to {}", config.address());

    let result = Server::bind(&config).and_then(Server::run);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "server stopped");
            ExitCode::from(err.exit_code())
        }
    }
}
