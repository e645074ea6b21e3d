//! Centralized Error Handling Module
//!
//! Every failure carries a unique error code so that logs and client
//! responses can be matched up without reading messages.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - AUTH_xxx: Authentication / account errors
//! - REPORT_xxx: Pothole report screening errors
//! - REWARD_xxx: Points and airtime errors
//! - API_xxx: Generic API errors
//! - CFG_xxx: Configuration errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;
use tracing::{error, warn};

use crate::api::types::{ApiError, ApiResponse};

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message, safe to show to clients
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // Auth / Account Errors
    // ============================================
    /// Username already registered
    UsernameTaken,
    /// Username on the reserved list
    UsernameReserved,
    /// Username fails the format rules
    UsernameInvalid,
    /// Not a valid Ghana phone number
    PhoneInvalid,
    /// Password too weak
    PasswordWeak,
    /// Wrong username or password
    InvalidCredentials,
    /// Authorization header missing
    MissingToken,
    /// Token malformed, wrong type or revoked
    InvalidToken,
    /// Token expired
    TokenExpired,
    /// Refresh token rejected
    InvalidRefreshToken,
    /// Authenticated but not staff
    Forbidden,

    // ============================================
    // Report Screening Errors
    // ============================================
    /// Too many reports at the same spot
    ReportGpsSpam,
    /// Unknown region name
    ReportInvalidRegion,
    /// Image payload could not be decoded
    ReportInvalidImage,
    /// Image already reported
    ReportDuplicateImage,
    /// Coordinates or severity out of range
    ReportInvalidInput,

    // ============================================
    // Reward Errors
    // ============================================
    /// Points not positive or not a multiple of the block size
    RewardInvalidPoints,
    /// Balance too low for the request
    RewardInsufficientPoints,
    /// Airtime provider rejected or failed the payout
    AirtimeProviderError,

    // ============================================
    // API Errors
    // ============================================
    /// Invalid request format
    ApiBadRequest,
    /// Rate limit exceeded
    ApiRateLimited,
    /// Resource not found
    ApiNotFound,
    /// Internal server error
    ApiInternalError,

    // ============================================
    // Configuration Errors
    // ============================================
    /// Missing environment variable
    ConfigMissingEnv,
    /// Invalid configuration value
    ConfigInvalidValue,

    // ============================================
    // Storage / External Errors
    // ============================================
    /// Reading or writing the store snapshot / media failed
    StorageError,
    /// External service timeout
    ExternalTimeout,
    /// External connection failed
    ExternalConnectionFailed,

    // ============================================
    // Generic Errors
    // ============================================
    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            // Auth
            Self::UsernameTaken => "AUTH_USERNAME_TAKEN",
            Self::UsernameReserved => "AUTH_USERNAME_RESERVED",
            Self::UsernameInvalid => "AUTH_USERNAME_INVALID",
            Self::PhoneInvalid => "AUTH_PHONE_INVALID",
            Self::PasswordWeak => "AUTH_PASSWORD_WEAK",
            Self::InvalidCredentials => "AUTH_INVALID_CREDENTIALS",
            Self::MissingToken => "AUTH_MISSING_TOKEN",
            Self::InvalidToken => "AUTH_INVALID_TOKEN",
            Self::TokenExpired => "AUTH_TOKEN_EXPIRED",
            Self::InvalidRefreshToken => "AUTH_INVALID_REFRESH_TOKEN",
            Self::Forbidden => "AUTH_FORBIDDEN",

            // Reports
            Self::ReportGpsSpam => "REPORT_GPS_SPAM",
            Self::ReportInvalidRegion => "REPORT_INVALID_REGION",
            Self::ReportInvalidImage => "REPORT_INVALID_IMAGE",
            Self::ReportDuplicateImage => "REPORT_DUPLICATE_IMAGE",
            Self::ReportInvalidInput => "REPORT_INVALID_INPUT",

            // Rewards
            Self::RewardInvalidPoints => "REWARD_INVALID_POINTS",
            Self::RewardInsufficientPoints => "REWARD_INSUFFICIENT_POINTS",
            Self::AirtimeProviderError => "REWARD_AIRTIME_PROVIDER_ERROR",

            // API
            Self::ApiBadRequest => "API_BAD_REQUEST",
            Self::ApiRateLimited => "API_RATE_LIMITED",
            Self::ApiNotFound => "API_NOT_FOUND",
            Self::ApiInternalError => "API_INTERNAL_ERROR",

            // Configuration
            Self::ConfigMissingEnv => "CFG_MISSING_ENV",
            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",

            // Storage / External
            Self::StorageError => "STORAGE_ERROR",
            Self::ExternalTimeout => "EXTERNAL_TIMEOUT",
            Self::ExternalConnectionFailed => "EXTERNAL_CONNECTION_FAILED",

            // Generic
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Get HTTP status code for API responses
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UsernameTaken
            | Self::UsernameReserved
            | Self::UsernameInvalid
            | Self::PhoneInvalid
            | Self::PasswordWeak
            | Self::InvalidCredentials
            | Self::InvalidRefreshToken
            | Self::ReportGpsSpam
            | Self::ReportInvalidRegion
            | Self::ReportInvalidImage
            | Self::ReportDuplicateImage
            | Self::ReportInvalidInput
            | Self::RewardInvalidPoints
            | Self::RewardInsufficientPoints
            | Self::ApiBadRequest
            | Self::ConfigInvalidValue => 400,
            Self::MissingToken | Self::InvalidToken | Self::TokenExpired => 401,
            Self::Forbidden => 403,
            Self::ApiNotFound => 404,
            Self::ApiRateLimited => 429,
            Self::AirtimeProviderError | Self::ExternalConnectionFailed => 502,
            Self::ExternalTimeout => 504,
            _ => 500,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExternalTimeout | Self::ExternalConnectionFailed | Self::ApiRateLimited
        )
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    /// API bad request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiBadRequest, msg)
    }

    /// Rate limit exceeded
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiRateLimited, msg)
    }

    /// Resource not found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiNotFound, msg)
    }

    /// API internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiInternalError, msg)
    }

    /// Wrong username or password
    pub fn invalid_credentials() -> Self {
        Self::new(ErrorCode::InvalidCredentials, "Invalid credentials.")
    }

    /// Missing bearer token
    pub fn missing_token() -> Self {
        Self::new(
            ErrorCode::MissingToken,
            "Authentication credentials were not provided.",
        )
    }

    /// Invalid access token
    pub fn invalid_token(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, msg)
    }

    /// Staff-only endpoint
    pub fn forbidden() -> Self {
        Self::new(
            ErrorCode::Forbidden,
            "You do not have permission to perform this action.",
        )
    }

    /// Missing environment variable
    pub fn missing_env(name: &str) -> Self {
        Self::new(
            ErrorCode::ConfigMissingEnv,
            format!("Missing environment variable: {}", name),
        )
    }

    /// Invalid configuration value
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalidValue, msg)
    }

    /// Storage failure
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageError, msg)
    }

    /// Airtime provider failure
    pub fn airtime(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::AirtimeProviderError, msg)
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// HTTP rendering
// ============================================

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(code = self.code_str(), error = %self, source = ?self.source, "Request failed");
        } else {
            warn!(code = self.code_str(), message = %self.message, "Request rejected");
        }

        let body = ApiResponse::<()>::error(ApiError::from(&self));
        (status, Json(body)).into_response()
    }
}

// ============================================
// Conversion from common error types
// ============================================

impl From<eyre::Report> for AppError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::Unknown, err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::StorageError, "IO error", err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::ExternalTimeout, "Request timeout")
        } else if err.is_connect() {
            Self::new(ErrorCode::ExternalConnectionFailed, "Connection failed")
        } else {
            Self::new(ErrorCode::AirtimeProviderError, err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::StorageError, "JSON error", err)
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                Self::new(ErrorCode::TokenExpired, "Token is expired.")
            }
            _ => Self::with_source(ErrorCode::InvalidToken, "Token is invalid.", err),
        }
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        Self::with_source(ErrorCode::ReportInvalidImage, "Invalid image data.", err)
    }
}

impl From<base64::DecodeError> for AppError {
    fn from(err: base64::DecodeError) -> Self {
        Self::with_source(ErrorCode::ApiBadRequest, "Invalid base64 data.", err)
    }
}
