//! API Middleware (Rate Limiting, Logging) and request extractors

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::handlers::AppState;
use crate::auth::{Claims, TokenType};
use crate::models::errors::AppError;
use crate::models::types::User;
use crate::utils::fingerprint::client_ip;

fn is_health(path: &str) -> bool {
    path == "/health" || path == "/v1/health"
}

fn peer_addr(parts_ext: &axum::http::Extensions) -> Option<SocketAddr> {
    parts_ext.get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0)
}

/// Per-client request budget (`API_RATE_LIMIT_PER_MINUTE`)
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    // Skip rate limiting for health check
    if is_health(request.uri().path()) {
        return next.run(request).await;
    }

    let rate_key = client_ip(request.headers(), peer_addr(request.extensions()))
        .unwrap_or_else(|| "unknown".to_string());

    let decision = state.api_limiter.check(&rate_key);

    if !decision.allowed {
        warn!(key = %rate_key, "Rate limit exceeded");
        let mut response = AppError::rate_limited(format!(
            "Rate limit exceeded. Retry after {} seconds",
            decision.reset_secs
        ))
        .into_response();
        let headers = response.headers_mut();
        headers.insert("X-RateLimit-Remaining", 0u32.into());
        headers.insert("X-RateLimit-Reset", decision.reset_secs.into());
        headers.insert(header::RETRY_AFTER, decision.reset_secs.into());
        return response;
    }

    let mut response = next.run(request).await;

    // Add rate limit headers
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Remaining", decision.remaining.into());
    headers.insert("X-RateLimit-Reset", decision.reset_secs.into());

    response
}

/// Request logging middleware
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        latency_ms = %latency.as_millis(),
        "Request completed"
    );

    response
}

// ============================================
// Extractors
// ============================================

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(AppError::missing_token)?;

    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::invalid_token("Authorization header must be 'Bearer <token>'."))?;
    Ok(token)
}

/// The account behind a valid access token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub claims: Claims,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let claims = state.tokens.verify(token, TokenType::Access)?;

        let user = state
            .store
            .get_user(claims.sub)?
            .filter(|u| u.is_active)
            .ok_or_else(|| AppError::invalid_token("User not found."))?;

        Ok(Self { user, claims })
    }
}

/// An authenticated staff account
#[derive(Debug, Clone)]
pub struct StaffUser(pub User);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for StaffUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser { user, .. } = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_staff {
            warn!(user_id = user.id, "Non-staff access to admin endpoint");
            return Err(AppError::forbidden());
        }
        Ok(Self(user))
    }
}

/// Caller IP and user agent, for screening and fingerprints
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        Ok(Self {
            ip: client_ip(&parts.headers, peer_addr(&parts.extensions)),
            user_agent,
        })
    }
}
