//! Points and airtime rules

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{PotholeReport, UserProfile};
use crate::utils::constants::{
    points_to_airtime, POINTS_PER_APPROVED_REPORT, REDEMPTION_BLOCK_POINTS,
    REDEMPTION_REFERENCE_PREFIX,
};

/// Credit the reporter for an approved report.
///
/// Returns the points credited; zero when the report was already paid out,
/// so replaying an approval never double-credits.
pub fn award_report_points(report: &mut PotholeReport, profile: &mut UserProfile) -> u32 {
    if report.points_awarded > 0 {
        return 0;
    }

    let now = Utc::now();
    profile.points = profile.points.saturating_add(POINTS_PER_APPROVED_REPORT);
    profile.updated_at = now;

    report.points_awarded = POINTS_PER_APPROVED_REPORT;
    report.updated_at = now;

    POINTS_PER_APPROVED_REPORT
}

/// Validate a redemption amount and return the airtime (GHS) it buys
pub fn airtime_for_points(points: i64) -> AppResult<u32> {
    if points <= 0 {
        return Err(AppError::new(
            ErrorCode::RewardInvalidPoints,
            "Points must be positive.",
        ));
    }
    if points % REDEMPTION_BLOCK_POINTS as i64 != 0 {
        return Err(AppError::new(
            ErrorCode::RewardInvalidPoints,
            format!("Redemptions must be in blocks of {}.", REDEMPTION_BLOCK_POINTS),
        ));
    }
    let points = u32::try_from(points)
        .map_err(|_| AppError::new(ErrorCode::RewardInsufficientPoints, "Insufficient points."))?;
    Ok(points_to_airtime(points))
}

/// Check a request against the balance not already tied up in pending redemptions
pub fn ensure_available(balance: u32, pending: u32, requested: u32) -> AppResult<()> {
    if balance.saturating_sub(pending) < requested {
        return Err(AppError::new(
            ErrorCode::RewardInsufficientPoints,
            "Insufficient points.",
        ));
    }
    Ok(())
}

/// `RDM-YYYYMMDD-XXXXXX`
pub fn generate_reference(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
    format!(
        "{}-{}-{}",
        REDEMPTION_REFERENCE_PREFIX,
        now.format("%Y%m%d"),
        random
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::{Region, ReviewStatus};
    use chrono::TimeZone;

    fn report() -> PotholeReport {
        let now = Utc::now();
        PotholeReport {
            id: Uuid::new_v4(),
            user_id: Some(1),
            image: "/media/potholes/p.jpg".into(),
            image_hash: "f".repeat(256),
            latitude: 5.6,
            longitude: -0.18,
            region: Region::GreaterAccra,
            severity: 5,
            ai_valid: true,
            ai_score: Some(0.95),
            status: ReviewStatus::Approved,
            is_spam: false,
            submitted_ip: None,
            device_id: String::new(),
            is_synced: true,
            client_ref: None,
            captured_at: None,
            approved_by: None,
            approved_at: None,
            rejection_reason: String::new(),
            points_awarded: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_award_is_idempotent() {
        let mut r = report();
        let mut p = UserProfile::new(1, "0244000000".into());

        assert_eq!(award_report_points(&mut r, &mut p), 50);
        assert_eq!(award_report_points(&mut r, &mut p), 0);
        assert_eq!(p.points, 50);
        assert_eq!(r.points_awarded, 50);
    }

    #[test]
    fn test_airtime_for_points() {
        assert_eq!(airtime_for_points(500).unwrap(), 5);
        assert_eq!(airtime_for_points(2000).unwrap(), 20);
        assert_eq!(airtime_for_points(0).unwrap_err().code, ErrorCode::RewardInvalidPoints);
        assert_eq!(airtime_for_points(-500).unwrap_err().code, ErrorCode::RewardInvalidPoints);
        assert_eq!(airtime_for_points(750).unwrap_err().code, ErrorCode::RewardInvalidPoints);
    }

    #[test]
    fn test_ensure_available_counts_pending() {
        assert!(ensure_available(1000, 0, 1000).is_ok());
        assert!(ensure_available(1000, 500, 500).is_ok());
        let err = ensure_available(1000, 500, 1000).unwrap_err();
        assert_eq!(err.code, ErrorCode::RewardInsufficientPoints);
    }

    #[test]
    fn test_reference_format() {
        let now = Utc.with_ymd_and_hms(2025, 3, 7, 12, 0, 0).unwrap();
        let reference = generate_reference(now);
        assert!(reference.starts_with("RDM-20250307-"));
        let tail = reference.rsplit('-').next().unwrap();
        assert_eq!(tail.len(), 6);
        assert!(tail.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}
