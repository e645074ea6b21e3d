//! API Request/Response Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::errors::AppError;
use crate::models::types::{PotholeReport, RedemptionRequest, User, UserProfile};

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    pub timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, latency_ms: f64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            latency_ms: Some(latency_ms),
            timestamp: Utc::now().timestamp(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(error: ApiError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            latency_ms: None,
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// API Error
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&AppError> for ApiError {
    fn from(err: &AppError) -> Self {
        // Internal causes are logged, never sent to clients
        let details = if err.code.http_status() < 500 {
            err.source.as_ref().map(|s| s.to_string())
        } else {
            None
        };
        Self {
            code: err.code_str().to_string(),
            message: err.message.clone(),
            details,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageData {
    pub message: String,
}

impl MessageData {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================
// Health Check
// ============================================

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

// ============================================
// Auth
// ============================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthData {
    pub access: String,
    pub refresh: String,
    pub user_id: i64,
    pub username: String,
    pub phone: String,
    pub points: u32,
    pub is_verified: bool,
}

/// Body of `/auth/refresh` and `/auth/logout`
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshData {
    pub access: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileData {
    pub user_id: i64,
    pub username: String,
    pub phone: String,
    pub points: u32,
    pub is_verified: bool,
    pub id_document: Option<String>,
    pub is_staff: bool,
}

impl ProfileData {
    pub fn new(user: &User, profile: &UserProfile) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            phone: profile.phone.clone(),
            points: profile.points,
            is_verified: profile.is_verified,
            id_document: profile.id_document.clone(),
            is_staff: user.is_staff,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadIdRequest {
    pub file_base64: String,
}

#[derive(Debug, Serialize)]
pub struct UploadIdData {
    pub message: String,
    pub is_verified: bool,
    pub id_document_url: String,
}

// ============================================
// Reports
// ============================================

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitReportRequest {
    pub image_base64: String,
    pub latitude: f64,
    pub longitude: f64,
    pub region: String,
    pub severity: i64,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitReportData {
    pub id: Uuid,
    pub status: String,
    pub message: String,
}

/// One report captured while offline
#[derive(Debug, Clone, Deserialize)]
pub struct SyncItem {
    pub client_ref: Uuid,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub report: SubmitReportRequest,
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub reports: Vec<SyncItem>,
}

#[derive(Debug, Serialize)]
pub struct SyncData {
    pub total_requested: usize,
    pub total_created: usize,
    pub total_existing: usize,
    pub total_failed: usize,
    pub results: Vec<SyncItemResult>,
    pub processing_time_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct SyncItemResult {
    pub client_ref: Uuid,
    /// "created" | "existing" | "error"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl SyncItemResult {
    pub fn stored(client_ref: Uuid, status: &str, id: Uuid) -> Self {
        Self {
            client_ref,
            status: status.to_string(),
            id: Some(id),
            error: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PublicReportsQuery {
    #[serde(default)]
    pub region: Option<String>,
}

/// Map marker for the public view
#[derive(Debug, Serialize)]
pub struct PotholeMapItem {
    pub id: Uuid,
    pub region: String,
    pub latitude: f64,
    pub longitude: f64,
    pub severity: u8,
    pub created_at: DateTime<Utc>,
}

impl From<&PotholeReport> for PotholeMapItem {
    fn from(r: &PotholeReport) -> Self {
        Self {
            id: r.id,
            region: r.region.to_string(),
            latitude: r.latitude,
            longitude: r.longitude,
            severity: r.severity,
            created_at: r.created_at,
        }
    }
}

/// Full report as shown to its author and to staff
#[derive(Debug, Serialize)]
pub struct ReportData {
    pub id: Uuid,
    pub user: Option<String>,
    pub image: String,
    pub region: String,
    pub latitude: f64,
    pub longitude: f64,
    pub severity: u8,
    pub ai_valid: bool,
    pub ai_score: Option<f64>,
    pub status: String,
    pub is_spam: bool,
    pub is_synced: bool,
    pub client_ref: Option<Uuid>,
    pub captured_at: Option<DateTime<Utc>>,
    pub rejection_reason: String,
    pub points_awarded: u32,
    pub created_at: DateTime<Utc>,
}

impl ReportData {
    pub fn new(r: &PotholeReport, username: Option<String>) -> Self {
        Self {
            id: r.id,
            user: username,
            image: r.image.clone(),
            region: r.region.to_string(),
            latitude: r.latitude,
            longitude: r.longitude,
            severity: r.severity,
            ai_valid: r.ai_valid,
            ai_score: r.ai_score,
            status: r.status.to_string(),
            is_spam: r.is_spam,
            is_synced: r.is_synced,
            client_ref: r.client_ref,
            captured_at: r.captured_at,
            rejection_reason: r.rejection_reason.clone(),
            points_awarded: r.points_awarded,
            created_at: r.created_at,
        }
    }
}

// ============================================
// Rewards
// ============================================

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub points: i64,
    pub mtn_phone: String,
}

#[derive(Debug, Serialize)]
pub struct RedeemData {
    pub id: i64,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RedemptionData {
    pub id: i64,
    pub points: u32,
    pub airtime_amount: f64,
    pub status: String,
    pub mtn_phone: String,
    pub reference: String,
    pub rejection_reason: String,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl From<&RedemptionRequest> for RedemptionData {
    fn from(r: &RedemptionRequest) -> Self {
        Self {
            id: r.id,
            points: r.points,
            airtime_amount: r.airtime_amount,
            status: r.status.to_string(),
            mtn_phone: r.mtn_phone.clone(),
            reference: r.reference.clone(),
            rejection_reason: r.rejection_reason.clone(),
            created_at: r.created_at,
            approved_at: r.approved_at,
        }
    }
}

// ============================================
// Admin
// ============================================

#[derive(Debug, Deserialize)]
pub struct AdminReportsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub is_spam: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ReportIdsRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RejectReportsRequest {
    pub ids: Vec<Uuid>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminRedemptionsQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RedemptionIdsRequest {
    pub ids: Vec<i64>,
}

/// Redemption with its owner, for staff
#[derive(Debug, Serialize)]
pub struct AdminRedemptionData {
    pub user_id: i64,
    pub username: Option<String>,
    #[serde(flatten)]
    pub redemption: RedemptionData,
}

#[derive(Debug, Deserialize)]
pub struct ProfileSearchQuery {
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdminProfileData {
    #[serde(flatten)]
    pub profile: ProfileData,
    pub is_protected: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatsData {
    pub store: crate::store::StoreCounts,
    pub telemetry: crate::utils::telemetry::TelemetryStats,
    pub spam_rate_percent: f64,
    pub revoked_tokens: crate::utils::cache::BlacklistStats,
    pub classifier: String,
    pub uptime_seconds: u64,
    pub api_version: String,
}
