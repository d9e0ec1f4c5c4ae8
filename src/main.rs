use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;

use flingoos_client::SessionManagerClient;
use flingoos_core::events::UiEvent;
use flingoos_server::{HttpSessionBackend, ServerConfig, SessionCoordinator};
use flingoos_telemetry::{init_telemetry, TelemetryConfig};

/// Flingoos Web UI — browser front-end for the Session Manager.
#[derive(Parser, Debug)]
#[command(name = "flingoos-web", version, about)]
struct Args {
    /// Port to run on
    #[arg(long, default_value_t = 8844)]
    port: u16,

    /// Session Manager API URL
    #[arg(
        long,
        env = "SESSION_MANAGER_URL",
        default_value = "http://localhost:8845"
    )]
    session_manager_url: String,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _telemetry = init_telemetry(TelemetryConfig {
        json_output: args.json_logs,
        ..Default::default()
    });

    tracing::info!(upstream = %args.session_manager_url, "Starting Flingoos Web UI");

    let client = SessionManagerClient::new(&args.session_manager_url);
    let backend = Arc::new(HttpSessionBackend::new(client));

    let (event_tx, _) = broadcast::channel::<UiEvent>(1024);
    let coordinator = Arc::new(SessionCoordinator::new(backend, event_tx.clone()));

    let config = ServerConfig {
        port: args.port,
        ..Default::default()
    };
    let handle = flingoos_server::start(config, coordinator, event_tx).await?;

    tracing::info!(port = handle.port, "Access at: http://127.0.0.1:{}", handle.port);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    Ok(())
}
