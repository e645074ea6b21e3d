//! Staff-only endpoints: moderation, payouts, profile verification

use axum::{
    extract::{Json, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use super::handlers::{ok, AppState};
use super::middleware::StaffUser;
use super::types::*;
use crate::core::payouts::{approve_redemptions as pay_redemptions, PayoutSummary};
use crate::core::review::{
    approve_reports as approve_pending, reject_reports as reject_any, reports_to_csv,
    ReviewSummary,
};
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{Region, ReviewStatus};
use crate::store::ReportFilter;
use crate::utils::constants::APP_VERSION;

fn parse_status(raw: Option<&str>) -> AppResult<Option<ReviewStatus>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse().map(Some),
        None => Ok(None),
    }
}

fn report_filter(query: &AdminReportsQuery) -> AppResult<ReportFilter> {
    let region = match query.region.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        Some(name) => Some(name.parse::<Region>()?),
        None => None,
    };
    Ok(ReportFilter {
        status: parse_status(query.status.as_deref())?,
        region,
        is_spam: query.is_spam,
    })
}

// ============================================
// Reports
// ============================================

pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Query(query): Query<AdminReportsQuery>,
) -> AppResult<Json<ApiResponse<Vec<ReportData>>>> {
    let start = Instant::now();
    let filter = report_filter(&query)?;

    let names = state.store.usernames()?;
    let reports = state.store.list_reports(&filter)?;
    let data = reports
        .iter()
        .map(|r| ReportData::new(r, r.user_id.and_then(|id| names.get(&id).cloned())))
        .collect();

    Ok(ok(data, start))
}

pub async fn approve_reports(
    State(state): State<Arc<AppState>>,
    StaffUser(admin): StaffUser,
    Json(req): Json<ReportIdsRequest>,
) -> AppResult<Json<ApiResponse<ReviewSummary>>> {
    let start = Instant::now();
    let summary = approve_pending(&state.store, &state.telemetry, &req.ids, admin.id)?;
    Ok(ok(summary, start))
}

pub async fn reject_reports(
    State(state): State<Arc<AppState>>,
    StaffUser(admin): StaffUser,
    Json(req): Json<RejectReportsRequest>,
) -> AppResult<Json<ApiResponse<ReviewSummary>>> {
    let start = Instant::now();
    let summary = reject_any(&state.store, &state.telemetry, &req.ids, req.reason.as_deref())?;
    info!(admin_id = admin.id, rejected = summary.rejected, "Bulk rejection");
    Ok(ok(summary, start))
}

/// Download the filtered report list as CSV
pub async fn export_reports(
    State(state): State<Arc<AppState>>,
    StaffUser(admin): StaffUser,
    Query(query): Query<AdminReportsQuery>,
) -> AppResult<Response> {
    let filter = report_filter(&query)?;

    let names = state.store.usernames()?;
    let reports = state.store.list_reports(&filter)?;
    let csv = reports_to_csv(&reports, |id| names.get(&id).cloned());

    info!(admin_id = admin.id, rows = reports.len(), "Reports exported");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"pothole_reports.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

// ============================================
// Redemptions
// ============================================

pub async fn list_redemptions(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Query(query): Query<AdminRedemptionsQuery>,
) -> AppResult<Json<ApiResponse<Vec<AdminRedemptionData>>>> {
    let start = Instant::now();
    let status = parse_status(query.status.as_deref())?;

    let names = state.store.usernames()?;
    let data = state
        .store
        .list_redemptions(status)?
        .iter()
        .map(|r| AdminRedemptionData {
            user_id: r.user_id,
            username: names.get(&r.user_id).cloned(),
            redemption: RedemptionData::from(r),
        })
        .collect();

    Ok(ok(data, start))
}

pub async fn approve_redemptions(
    State(state): State<Arc<AppState>>,
    StaffUser(admin): StaffUser,
    Json(req): Json<RedemptionIdsRequest>,
) -> AppResult<Json<ApiResponse<PayoutSummary>>> {
    let start = Instant::now();
    let summary = pay_redemptions(
        &state.store,
        state.airtime.as_ref(),
        &state.telemetry,
        &req.ids,
        admin.id,
    )
    .await?;
    Ok(ok(summary, start))
}

// ============================================
// Profiles
// ============================================

pub async fn list_profiles(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Query(query): Query<ProfileSearchQuery>,
) -> AppResult<Json<ApiResponse<Vec<AdminProfileData>>>> {
    let start = Instant::now();
    let data = state
        .store
        .search_profiles(query.q.as_deref())?
        .iter()
        .map(|(user, profile)| AdminProfileData {
            profile: ProfileData::new(user, profile),
            is_protected: profile.is_protected,
            is_active: user.is_active,
            created_at: profile.created_at,
        })
        .collect();
    Ok(ok(data, start))
}

pub async fn verify_profile(
    State(state): State<Arc<AppState>>,
    StaffUser(admin): StaffUser,
    Path(user_id): Path<i64>,
) -> AppResult<Json<ApiResponse<ProfileData>>> {
    let start = Instant::now();
    let user = state
        .store
        .get_user(user_id)?
        .ok_or_else(|| AppError::not_found("User not found."))?;
    let profile = state.store.update_profile(user_id, |p| p.is_verified = true)?;

    info!(admin_id = admin.id, user_id, "Profile verified");
    Ok(ok(ProfileData::new(&user, &profile), start))
}

// ============================================
// Stats
// ============================================

pub async fn stats(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
) -> AppResult<Json<ApiResponse<StatsData>>> {
    let start = Instant::now();
    let telemetry = state.telemetry.get_stats();

    let data = StatsData {
        store: state.store.counts()?,
        spam_rate_percent: telemetry.spam_rate(),
        telemetry,
        revoked_tokens: state.blacklist.stats(),
        classifier: state.screening.classifier_name().to_string(),
        uptime_seconds: state.uptime_seconds(),
        api_version: APP_VERSION.to_string(),
    };
    Ok(ok(data, start))
}
