//! API Request Handlers

use axum::extract::{Json, Query, State};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::middleware::{AuthUser, ClientMeta};
use super::types::*;
use crate::auth::{hash_password, verify_password, TokenService, TokenType};
use crate::core::classifier::classifier_for;
use crate::core::payouts::request_redemption;
use crate::core::screening::{ScreeningInput, ScreeningPipeline};
use crate::core::validators::{validate_ghana_phone, validate_password, validate_username};
use crate::models::config::AppConfig;
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{PotholeReport, Region, ReviewStatus, User};
use crate::providers::airtime::{AfricasTalkingClient, AirtimeProvider};
use crate::store::{read_snapshot, write_snapshot, ReportInsert, Snapshot, Store};
use crate::utils::cache::TokenBlacklist;
use crate::utils::constants::{APP_VERSION, MAX_SYNC_BATCH};
use crate::utils::media::{decode_base64_payload, MediaStore};
use crate::utils::rate_limit::{RateLimitConfig, RateLimiter};
use crate::utils::telemetry::ReportTelemetry;

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub store: Store,
    pub tokens: TokenService,
    pub blacklist: TokenBlacklist,
    pub media: MediaStore,
    pub screening: ScreeningPipeline,
    pub airtime: Arc<dyn AirtimeProvider>,
    pub telemetry: Arc<ReportTelemetry>,
    pub api_limiter: RateLimiter,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Store,
        airtime: Arc<dyn AirtimeProvider>,
        telemetry: Arc<ReportTelemetry>,
    ) -> Self {
        let tokens = TokenService::new(
            &config.secret_key,
            config.access_token_ttl,
            config.refresh_token_ttl,
        );
        let screening = ScreeningPipeline::new(
            classifier_for(config.ai_bypass),
            config.duplicate_hamming_threshold,
            telemetry.clone(),
        );

        Self {
            tokens,
            blacklist: TokenBlacklist::new(),
            media: MediaStore::new(config.media_root.clone(), config.media_url.clone()),
            screening,
            airtime,
            telemetry,
            api_limiter: RateLimiter::new(RateLimitConfig::per_minute(
                config.api_rate_limit_per_minute,
            )),
            start_time: Instant::now(),
            store,
            config,
        }
    }

    /// Production wiring: restore the store and talk to Africa's Talking
    pub fn from_config(config: AppConfig) -> AppResult<Self> {
        let snapshot = match &config.data_path {
            Some(path) => read_snapshot(path)?,
            None => Snapshot::default(),
        };
        let airtime: Arc<dyn AirtimeProvider> = Arc::new(AfricasTalkingClient::new(&config.airtime)?);
        Ok(Self::from_snapshot(
            config,
            snapshot,
            airtime,
            Arc::new(ReportTelemetry::new()),
        ))
    }

    /// Build state over a loaded snapshot, reviving its token revocations
    pub fn from_snapshot(
        config: AppConfig,
        mut snapshot: Snapshot,
        airtime: Arc<dyn AirtimeProvider>,
        telemetry: Arc<ReportTelemetry>,
    ) -> Self {
        let revoked = std::mem::take(&mut snapshot.revoked_tokens);
        let state = Self::new(config, Store::from_snapshot(snapshot), airtime, telemetry);
        let restored = state.blacklist.restore(&revoked);
        if restored > 0 {
            info!(restored, "Token revocations restored");
        }
        state
    }

    /// Persist the store together with live token revocations
    pub async fn save_snapshot(&self, path: &Path) -> AppResult<()> {
        let mut snapshot = self.store.snapshot()?;
        snapshot.revoked_tokens = self.blacklist.export();
        write_snapshot(path, &snapshot).await
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Create (or promote) the staff account named by ADMIN_USERNAME
    pub async fn bootstrap_admin(&self) -> AppResult<()> {
        let Some(admin) = self.config.admin.clone() else {
            return Ok(());
        };
        let username = admin.username.trim().to_lowercase();

        if let Some(existing) = self.store.find_user_by_username(&username)? {
            if !existing.is_staff {
                self.store.transaction(|tables| {
                    if let Some(user) = tables.users.get_mut(&existing.id) {
                        user.is_staff = true;
                    }
                })?;
                info!(username = %username, "Existing account promoted to staff");
            }
            return Ok(());
        }

        let password_hash = hash_blocking(admin.password).await?;
        let (user, _) = self.store.create_user(&username, password_hash, admin.phone, true)?;
        self.store.update_profile(user.id, |p| p.is_protected = true)?;
        info!(username = %username, user_id = user.id, "Staff account created");
        Ok(())
    }
}

pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

pub(crate) fn ok<T: serde::Serialize>(data: T, start: Instant) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data, elapsed_ms(start)))
}

async fn hash_blocking(password: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::internal(format!("Hashing task failed: {}", e)))?
}

async fn verify_blocking(password: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::internal(format!("Verification task failed: {}", e)))
}

// ============================================
// Health Check
// ============================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthData>> {
    let start = Instant::now();

    let data = HealthData {
        status: "ok".to_string(),
        version: APP_VERSION.to_string(),
        uptime_seconds: state.uptime_seconds(),
    };

    ok(data, start)
}

// ============================================
// Auth
// ============================================

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<ApiResponse<MessageData>>> {
    let start = Instant::now();

    let username = validate_username(&req.username)?;
    validate_password(&req.password, &username)?;
    let phone = validate_ghana_phone(&req.phone)?;

    if state.store.find_user_by_username(&username)?.is_some() {
        return Err(AppError::new(ErrorCode::UsernameTaken, "Username already taken."));
    }

    let password_hash = hash_blocking(req.password).await?;
    // create_user re-checks under the lock
    let (user, _) = state.store.create_user(&username, password_hash, phone, false)?;

    info!(user_id = user.id, username = %user.username, "Account registered");
    Ok(ok(MessageData::new("Account created successfully."), start))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<AuthData>>> {
    let start = Instant::now();
    let username = req.username.trim().to_lowercase();

    let user = state
        .store
        .find_user_by_username(&username)?
        .filter(|u| u.is_active)
        .ok_or_else(AppError::invalid_credentials)?;

    if !verify_blocking(req.password, user.password_hash.clone()).await? {
        warn!(username = %username, "Failed login");
        return Err(AppError::invalid_credentials());
    }

    let profile = state
        .store
        .get_profile(user.id)?
        .ok_or_else(|| AppError::internal("Profile missing for user"))?;
    let pair = state.tokens.issue_pair(&user)?;

    Ok(ok(
        AuthData {
            access: pair.access,
            refresh: pair.refresh,
            user_id: user.id,
            username: user.username,
            phone: profile.phone,
            points: profile.points,
            is_verified: profile.is_verified,
        },
        start,
    ))
}

pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<ApiResponse<RefreshData>>> {
    let start = Instant::now();
    let invalid = || AppError::new(ErrorCode::InvalidRefreshToken, "Invalid refresh token.");

    let claims = state
        .tokens
        .verify(&req.refresh, TokenType::Refresh)
        .map_err(|_| invalid())?;
    if state.blacklist.is_revoked(&claims.jti) {
        return Err(invalid());
    }

    let user = state
        .store
        .get_user(claims.sub)?
        .filter(|u| u.is_active)
        .ok_or_else(invalid)?;

    let access = state.tokens.issue(&user, TokenType::Access)?;
    Ok(ok(RefreshData { access }, start))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<ApiResponse<MessageData>>> {
    let start = Instant::now();

    let claims = state
        .tokens
        .verify(&req.refresh, TokenType::Refresh)
        .map_err(|_| AppError::bad_request("Invalid token."))?;
    if state.blacklist.is_revoked(&claims.jti) {
        return Err(AppError::bad_request("Invalid token."));
    }

    state.blacklist.revoke(&claims.jti, claims.remaining());
    info!(user_id = claims.sub, "Logged out");
    Ok(ok(MessageData::new("Logged out successfully."), start))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> AppResult<Json<ApiResponse<ProfileData>>> {
    let start = Instant::now();
    let profile = state
        .store
        .get_profile(auth.user.id)?
        .ok_or_else(|| AppError::not_found("Profile not found."))?;
    Ok(ok(ProfileData::new(&auth.user, &profile), start))
}

pub async fn upload_id(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<UploadIdRequest>,
) -> AppResult<Json<ApiResponse<UploadIdData>>> {
    let start = Instant::now();

    let bytes = decode_base64_payload(&req.file_base64)
        .ok()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| AppError::bad_request("Invalid file data."))?;

    let url = state.media.save("ids", "id", &bytes).await?;
    let profile = state.store.update_profile(auth.user.id, |p| {
        p.id_document = Some(url.clone());
        // Staff must verify the new document
        p.is_verified = false;
    })?;

    info!(user_id = auth.user.id, "ID document uploaded");
    Ok(ok(
        UploadIdData {
            message: "ID uploaded successfully. Awaiting manual verification.".to_string(),
            is_verified: profile.is_verified,
            id_document_url: url,
        },
        start,
    ))
}

// ============================================
// Reports
// ============================================

/// Offline capture details for synced reports
struct OfflineCapture {
    client_ref: Uuid,
    captured_at: Option<DateTime<Utc>>,
}

/// A stored submission
enum StoredReport {
    Created(PotholeReport),
    /// A concurrent upload of the same capture got there first
    Existing(PotholeReport),
}

impl StoredReport {
    fn into_report(self) -> PotholeReport {
        match self {
            Self::Created(report) | Self::Existing(report) => report,
        }
    }
}

/// Screen, store the photo and record a new report
async fn create_report(
    state: &AppState,
    user: &User,
    meta: &ClientMeta,
    req: &SubmitReportRequest,
    offline: Option<OfflineCapture>,
) -> AppResult<StoredReport> {
    let input = ScreeningInput {
        user_id: user.id,
        client_ip: meta.ip.as_deref(),
        user_agent: &meta.user_agent,
        latitude: req.latitude,
        longitude: req.longitude,
        region: &req.region,
        severity: req.severity,
        image_base64: &req.image_base64,
        device_id: req.device_id.as_deref(),
        captured_at: offline.as_ref().and_then(|o| o.captured_at),
        enforce_rate_limits: offline.is_none(),
    };
    let screened = state.screening.screen(&state.store, &input).await?;
    let is_spam = screened.is_spam();

    let image = state
        .media
        .save("potholes", "pothole", &screened.image_bytes)
        .await?;

    let now = Utc::now();
    let report = PotholeReport {
        id: Uuid::new_v4(),
        user_id: Some(user.id),
        image,
        image_hash: screened.image_hash.to_hex(),
        latitude: screened.latitude,
        longitude: screened.longitude,
        region: screened.region,
        severity: screened.severity,
        ai_valid: screened.verdict.valid,
        ai_score: Some(screened.verdict.score),
        status: ReviewStatus::Pending,
        is_spam,
        submitted_ip: meta.ip.clone(),
        device_id: screened.device_id,
        is_synced: true,
        client_ref: offline.as_ref().map(|o| o.client_ref),
        captured_at: offline.and_then(|o| o.captured_at),
        approved_by: None,
        approved_at: None,
        rejection_reason: String::new(),
        points_awarded: 0,
        created_at: now,
        updated_at: now,
    };

    // Screening ran without the lock, so client_ref and hash are checked again
    let inserted = state
        .store
        .insert_report_checked(report.clone(), state.screening.hamming_threshold());
    let outcome = match inserted {
        Ok(ReportInsert::Inserted) => {
            info!(report_id = %report.id, user_id = user.id, region = %report.region, "Report stored");
            return Ok(StoredReport::Created(report));
        }
        Ok(ReportInsert::Existing(existing)) => Ok(StoredReport::Existing(existing)),
        Ok(ReportInsert::Duplicate(other)) => {
            debug!(existing = %other, "Duplicate stored concurrently");
            Err(AppError::new(
                ErrorCode::ReportDuplicateImage,
                "Duplicate pothole image.",
            ))
        }
        Err(e) => Err(e),
    };

    if let Err(e) = state.media.remove(&report.image).await {
        warn!(error = %e, image = %report.image, "Failed to remove unused photo");
    }
    outcome
}

pub async fn submit_report(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    meta: ClientMeta,
    Json(req): Json<SubmitReportRequest>,
) -> AppResult<Json<ApiResponse<SubmitReportData>>> {
    let start = Instant::now();
    let report = create_report(&state, &auth.user, &meta, &req, None)
        .await?
        .into_report();

    Ok(ok(
        SubmitReportData {
            id: report.id,
            status: report.status.to_string(),
            message: "Report submitted successfully and is pending review.".to_string(),
        },
        start,
    ))
}

/// Upload reports captured offline.
///
/// Items are processed in order; each `client_ref` is stored at most once,
/// so a client may resend a whole batch after a dropped connection.
pub async fn sync_reports(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    meta: ClientMeta,
    Json(req): Json<SyncRequest>,
) -> AppResult<Json<ApiResponse<SyncData>>> {
    let start = Instant::now();

    if req.reports.len() > MAX_SYNC_BATCH {
        return Err(AppError::bad_request(format!(
            "Too many reports in one sync (max {}).",
            MAX_SYNC_BATCH
        )));
    }

    // One charge per batch against the submission budgets
    state
        .screening
        .charge_batch(auth.user.id, meta.ip.as_deref())?;

    let total_requested = req.reports.len();
    let mut results = Vec::with_capacity(total_requested);
    let (mut created, mut existing, mut failed) = (0, 0, 0);

    for item in req.reports {
        let client_ref = item.client_ref;
        if let Some(report) = state.store.find_report_by_client_ref(auth.user.id, client_ref)? {
            existing += 1;
            results.push(SyncItemResult::stored(client_ref, "existing", report.id));
            continue;
        }

        let offline = OfflineCapture {
            client_ref,
            captured_at: item.captured_at,
        };
        match create_report(&state, &auth.user, &meta, &item.report, Some(offline)).await {
            Ok(StoredReport::Created(report)) => {
                created += 1;
                results.push(SyncItemResult::stored(client_ref, "created", report.id));
            }
            Ok(StoredReport::Existing(report)) => {
                existing += 1;
                results.push(SyncItemResult::stored(client_ref, "existing", report.id));
            }
            Err(e) => match state.store.find_report_by_client_ref(auth.user.id, client_ref)? {
                // A parallel retry stored it while this one was screening
                Some(report) => {
                    existing += 1;
                    results.push(SyncItemResult::stored(client_ref, "existing", report.id));
                }
                None => {
                    failed += 1;
                    results.push(SyncItemResult {
                        client_ref,
                        status: "error".to_string(),
                        id: None,
                        error: Some(ApiError::from(&e)),
                    });
                }
            },
        }
    }

    info!(
        user_id = auth.user.id,
        total = total_requested,
        created,
        existing,
        failed,
        "Offline sync processed"
    );

    Ok(ok(
        SyncData {
            total_requested,
            total_created: created,
            total_existing: existing,
            total_failed: failed,
            results,
            processing_time_ms: elapsed_ms(start),
        },
        start,
    ))
}

pub async fn public_reports(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PublicReportsQuery>,
) -> AppResult<Json<ApiResponse<Vec<PotholeMapItem>>>> {
    let start = Instant::now();

    let region = query.region.as_deref().map(str::trim).filter(|r| !r.is_empty());
    let reports = match region {
        None => state.store.public_reports(None)?,
        Some(name) => match name.parse::<Region>() {
            Ok(region) => state.store.public_reports(Some(region))?,
            // Unknown region names match nothing
            Err(_) => Vec::new(),
        },
    };

    Ok(ok(reports.iter().map(PotholeMapItem::from).collect(), start))
}

pub async fn my_reports(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<ReportData>>>> {
    let start = Instant::now();
    let reports = state.store.reports_for_user(auth.user.id)?;
    let data = reports
        .iter()
        .map(|r| ReportData::new(r, Some(auth.user.username.clone())))
        .collect();
    Ok(ok(data, start))
}

// ============================================
// Rewards
// ============================================

pub async fn redeem(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<RedeemRequest>,
) -> AppResult<Json<ApiResponse<RedeemData>>> {
    let start = Instant::now();
    let redemption = request_redemption(
        &state.store,
        &state.telemetry,
        auth.user.id,
        req.points,
        &req.mtn_phone,
    )?;

    Ok(ok(
        RedeemData {
            id: redemption.id,
            status: redemption.status.to_string(),
            message: "Redemption request submitted successfully.".to_string(),
        },
        start,
    ))
}

pub async fn redemption_history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<RedemptionData>>>> {
    let start = Instant::now();
    let rows = state.store.redemptions_for_user(auth.user.id)?;
    Ok(ok(rows.iter().map(RedemptionData::from).collect(), start))
}
