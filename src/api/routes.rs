//! API Route Configuration

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::warn;

use super::admin;
use super::handlers::{self, AppState};
use super::middleware::{logging_middleware, rate_limit_middleware};
use crate::utils::constants::MAX_REQUEST_BODY_BYTES;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Create the API router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    let auth = Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh_token))
        .route("/logout", post(handlers::logout))
        .route("/me", get(handlers::me))
        .route("/upload-id", post(handlers::upload_id));

    let reports = Router::new()
        .route("/submit", post(handlers::submit_report))
        .route("/sync", post(handlers::sync_reports))
        .route("/public", get(handlers::public_reports))
        .route("/mine", get(handlers::my_reports));

    let rewards = Router::new()
        .route("/redeem", post(handlers::redeem))
        .route("/history", get(handlers::redemption_history));

    let admin = Router::new()
        .route("/reports", get(admin::list_reports))
        .route("/reports/approve", post(admin::approve_reports))
        .route("/reports/reject", post(admin::reject_reports))
        .route("/reports/export", get(admin::export_reports))
        .route("/redemptions", get(admin::list_redemptions))
        .route("/redemptions/approve", post(admin::approve_redemptions))
        .route("/profiles", get(admin::list_profiles))
        .route("/profiles/:user_id/verify", post(admin::verify_profile))
        .route("/stats", get(admin::stats));

    // API v1 routes
    let api_v1 = Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/auth", auth)
        .nest("/reports", reports)
        .nest("/rewards", rewards)
        .nest("/admin", admin);

    let mut router = Router::new()
        .nest("/v1", api_v1)
        .route("/health", get(handlers::health_check));

    // Uploaded photos are served by the app only in debug; production
    // puts them behind the CDN / reverse proxy.
    let media_url = state.config.media_url.as_str();
    if state.config.debug && media_url.starts_with('/') && media_url.len() > 1 {
        router = router.nest_service(
            media_url,
            ServeDir::new(&state.config.media_root),
        );
    }

    let cors = cors_layer(&state.config.cors_allow_origins);

    router
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
        // Middleware (order matters - bottom runs first)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(logging_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
}
