//! Pothole Patrol API Server
//!
//! Usage:
//!   cargo run --bin pothole_api
//!
//! Environment (a `.env` file is loaded if present):
//!   PORT / POTHOLE_PORT - Server port (default: 8080)
//!   HOST                - Server host (default: 0.0.0.0)
//!   SECRET_KEY          - JWT signing key (required in prod)
//!   DATA_PATH           - JSON snapshot file (optional)
//!   AT_USERNAME / AT_API_KEY - Africa's Talking credentials
//!   LOG_FORMAT          - compact | json
//!   RUST_LOG            - Log filter (default: info)

use pothole_patrol::api::{create_router, start_maintenance_tasks, AppState};
use pothole_patrol::models::config::{AppConfig, LogFormat};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenv::dotenv().ok();

    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);

    let addr = config.socket_addr()?;
    info!(
        env = ?config.environment,
        debug = config.debug,
        ai_bypass = config.ai_bypass,
        persistence = config.data_path.is_some(),
        "Configuration loaded"
    );

    let state = Arc::new(AppState::from_config(config)?);
    state.bootstrap_admin().await?;

    let maintenance = start_maintenance_tasks(state.clone());
    info!("Background maintenance task started");

    let app = create_router(state.clone());

    info!("Pothole Patrol API starting on http://{}", addr);
    info!("Health check: http://{}/v1/health", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Graceful shutdown sequence
    info!("Shutdown signal received, cleaning up...");
    maintenance.abort();

    if let Some(path) = &state.config.data_path {
        match state.save_snapshot(path).await {
            Ok(()) => info!(path = %path.display(), "Final snapshot written"),
            Err(e) => warn!(error = %e, "Failed to write final snapshot"),
        }
    }

    let stats = state.telemetry.get_stats();
    info!(
        received = stats.submissions_received,
        accepted = stats.submissions_accepted,
        approved = stats.reports_approved,
        airtime_paid_ghs = stats.airtime_paid_ghs,
        "Session telemetry"
    );
    match state.telemetry.export_stats_json() {
        Ok(path) => info!("Stats exported to: {}", path.display()),
        Err(e) => warn!("Failed to export stats: {}", e),
    }
    if let Err(e) = state.telemetry.export_stats_csv() {
        warn!("Failed to append telemetry history: {}", e);
    }

    info!("Pothole Patrol API shutdown complete");
    Ok(())
}
