mod app;
mod cli;
mod server;
mod telemetry;
mod tls;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use crate::app::AppState;
use crate::cli::Args;
use crate::server::Server;
use dialog_core::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    if let Some(port) = args.grpc_port {
        config.grpc_port = port;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }

    telemetry::init_telemetry(&config.log_level, args.json_logs || !config.is_development())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        env = %config.env,
        "starting dialog-service"
    );

    let tls = tls::load_tls_material(&config)?;
    let state = AppState::new(config, tls.as_ref()).await?;
    Server::new(state, tls).run().await
}
