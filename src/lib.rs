//! Pothole Patrol Library
//!
//! Backend for a civic pothole-reporting app in Ghana:
//! - Reporter accounts with JWT sessions and ID verification
//! - Photo reports screened for spam (rate limits, GPS clusters,
//!   perceptual-hash duplicates, classifier verdict)
//! - Offline capture sync with idempotent client references
//! - Points for approved reports, redeemable as MTN airtime
//! - Staff review, payouts and CSV export

pub mod api;
pub mod auth;
pub mod core;
pub mod models;
pub mod providers;
pub mod store;
pub mod utils;

pub use api::{create_router, AppState};
pub use models::config::AppConfig;
pub use models::errors::{AppError, AppResult, ErrorCode};
pub use store::Store;
pub use utils::telemetry::{ReportTelemetry, TelemetryStats};
