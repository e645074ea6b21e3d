//! Pothole Patrol REST API
//! Reporter accounts, report submission and sync, rewards, staff review

pub mod admin;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod types;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::utils::constants::MAINTENANCE_INTERVAL_SECS;
pub use handlers::AppState;
pub use routes::create_router;
pub use types::*;

/// Periodic housekeeping: prune limiter windows and expired revocations,
/// and snapshot the store when persistence is configured.
pub fn start_maintenance_tasks(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(MAINTENANCE_INTERVAL_SECS));
        // First tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;

            let limiter_keys = state.api_limiter.cleanup() + state.screening.cleanup();
            let revoked = state.blacklist.cleanup_expired();
            debug!(limiter_keys, revoked, "Maintenance sweep");

            if let Some(path) = &state.config.data_path {
                if let Err(e) = state.save_snapshot(path).await {
                    warn!(error = %e, path = %path.display(), "Snapshot failed");
                }
            }
        }
    })
}
