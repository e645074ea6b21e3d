//! Admin review of pothole reports: approve, reject, export

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::rewards::award_report_points;
use crate::models::errors::AppResult;
use crate::models::types::{PotholeReport, ReviewStatus};
use crate::store::Store;
use crate::utils::telemetry::ReportTelemetry;

pub const AI_REJECTION_REASON: &str = "AI rejected this image as non-pothole.";
pub const DEFAULT_REJECTION_REASON: &str = "Rejected by admin.";

/// What happened to one report in a bulk action
#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub id: Uuid,
    /// "approved" | "rejected" | "skipped"
    pub outcome: String,
    pub points_awarded: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReviewOutcome {
    fn new(id: Uuid, outcome: &str, points_awarded: u32, reason: Option<&str>) -> Self {
        Self {
            id,
            outcome: outcome.to_string(),
            points_awarded,
            reason: reason.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReviewSummary {
    pub approved: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub points_awarded: u32,
    pub results: Vec<ReviewOutcome>,
}

impl ReviewSummary {
    fn push(&mut self, outcome: ReviewOutcome) {
        match outcome.outcome.as_str() {
            "approved" => self.approved += 1,
            "rejected" => self.rejected += 1,
            _ => self.skipped += 1,
        }
        self.points_awarded += outcome.points_awarded;
        self.results.push(outcome);
    }
}

/// Approve pending reports, crediting their authors.
///
/// Reports the classifier marked invalid are rejected instead. Non-pending
/// and unknown ids are skipped. Runs as one store transaction.
pub fn approve_reports(
    store: &Store,
    telemetry: &ReportTelemetry,
    ids: &[Uuid],
    admin_id: i64,
) -> AppResult<ReviewSummary> {
    let summary = store.transaction(|tables| {
        let mut summary = ReviewSummary::default();
        let now = Utc::now();

        for id in ids {
            let Some(report) = tables.reports.get_mut(id) else {
                summary.push(ReviewOutcome::new(*id, "skipped", 0, Some("Report not found.")));
                continue;
            };
            if report.status != ReviewStatus::Pending {
                summary.push(ReviewOutcome::new(*id, "skipped", 0, Some("Report is not pending.")));
                continue;
            }

            if !report.ai_valid {
                report.status = ReviewStatus::Rejected;
                report.rejection_reason = AI_REJECTION_REASON.to_string();
                report.updated_at = now;
                summary.push(ReviewOutcome::new(*id, "rejected", 0, Some(AI_REJECTION_REASON)));
                continue;
            }

            report.status = ReviewStatus::Approved;
            report.approved_by = Some(admin_id);
            report.approved_at = Some(now);
            report.updated_at = now;

            let points = match report.user_id.and_then(|uid| tables.profiles.get_mut(&uid)) {
                Some(profile) => award_report_points(report, profile),
                None => 0,
            };
            summary.push(ReviewOutcome::new(*id, "approved", points, None));
        }
        summary
    })?;

    for result in &summary.results {
        match result.outcome.as_str() {
            "approved" => telemetry.record_review(true, result.points_awarded),
            "rejected" => telemetry.record_review(false, 0),
            _ => {}
        }
    }
    info!(
        admin_id,
        approved = summary.approved,
        rejected = summary.rejected,
        skipped = summary.skipped,
        points = summary.points_awarded,
        "Reports approved"
    );
    Ok(summary)
}

/// Reject reports regardless of status.
///
/// An explicit reason always wins; otherwise an existing reason is kept
/// and an empty one becomes "Rejected by admin.".
pub fn reject_reports(
    store: &Store,
    telemetry: &ReportTelemetry,
    ids: &[Uuid],
    reason: Option<&str>,
) -> AppResult<ReviewSummary> {
    let reason = reason.map(str::trim).filter(|r| !r.is_empty());

    let summary = store.transaction(|tables| {
        let mut summary = ReviewSummary::default();
        let now = Utc::now();

        for id in ids {
            let Some(report) = tables.reports.get_mut(id) else {
                summary.push(ReviewOutcome::new(*id, "skipped", 0, Some("Report not found.")));
                continue;
            };

            report.status = ReviewStatus::Rejected;
            if let Some(reason) = reason {
                report.rejection_reason = reason.to_string();
            } else if report.rejection_reason.is_empty() {
                report.rejection_reason = DEFAULT_REJECTION_REASON.to_string();
            }
            report.updated_at = now;

            let reason = report.rejection_reason.clone();
            summary.push(ReviewOutcome::new(*id, "rejected", 0, Some(&reason)));
        }
        summary
    })?;

    for _ in 0..summary.rejected {
        telemetry.record_review(false, 0);
    }
    info!(rejected = summary.rejected, skipped = summary.skipped, "Reports rejected");
    Ok(summary)
}

// ============================================
// CSV export
// ============================================

const CSV_HEADER: &str = "id,user,region,lat,lng,severity,ai_valid,ai_score,status,is_spam,points_awarded,submitted_ip,device_id,created_at,approved_at";

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn py_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Render reports as CSV; `username` resolves a report's author
pub fn reports_to_csv(
    reports: &[PotholeReport],
    username: impl Fn(i64) -> Option<String>,
) -> String {
    let mut out = String::with_capacity(128 * (reports.len() + 1));
    out.push_str(CSV_HEADER);
    out.push_str("\r\n");

    for r in reports {
        let user = r.user_id.and_then(&username).unwrap_or_default();
        let row = [
            r.id.to_string(),
            csv_field(&user),
            csv_field(r.region.as_str()),
            r.latitude.to_string(),
            r.longitude.to_string(),
            r.severity.to_string(),
            py_bool(r.ai_valid).to_string(),
            r.ai_score.map(|s| s.to_string()).unwrap_or_default(),
            r.status.as_str().to_string(),
            py_bool(r.is_spam).to_string(),
            r.points_awarded.to_string(),
            csv_field(r.submitted_ip.as_deref().unwrap_or_default()),
            csv_field(&r.device_id),
            r.created_at.to_rfc3339(),
            r.approved_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        ];
        out.push_str(&row.join(","));
        out.push_str("\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::Region;

    fn seed(store: &Store, ai_valid: bool, status: ReviewStatus) -> Uuid {
        let now = Utc::now();
        let report = PotholeReport {
            id: Uuid::new_v4(),
            user_id: Some(1),
            image: "/media/potholes/p.jpg".into(),
            image_hash: "0".repeat(256),
            latitude: 5.6,
            longitude: -0.18,
            region: Region::GreaterAccra,
            severity: 6,
            ai_valid,
            ai_score: Some(0.95),
            status,
            is_spam: !ai_valid,
            submitted_ip: Some("41.66.1.2".into()),
            device_id: "dev".into(),
            is_synced: true,
            client_ref: None,
            captured_at: None,
            approved_by: None,
            approved_at: None,
            rejection_reason: String::new(),
            points_awarded: 0,
            created_at: now,
            updated_at: now,
        };
        let id = report.id;
        store.insert_report(report).unwrap();
        id
    }

    fn store_with_user() -> Store {
        let store = Store::new();
        store.create_user("kofi", "h".into(), "0244123456".into(), false).unwrap();
        store
    }

    #[test]
    fn test_approve_awards_once() {
        let store = store_with_user();
        let telemetry = ReportTelemetry::new();
        let id = seed(&store, true, ReviewStatus::Pending);

        let summary = approve_reports(&store, &telemetry, &[id, id], 99).unwrap();
        assert_eq!(summary.approved, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(store.get_profile(1).unwrap().unwrap().points, 50);

        let report = store.get_report(id).unwrap().unwrap();
        assert_eq!(report.status, ReviewStatus::Approved);
        assert_eq!(report.approved_by, Some(99));
        assert!(report.approved_at.is_some());
        assert_eq!(report.points_awarded, 50);
        assert_eq!(telemetry.get_stats().points_awarded, 50);
    }

    #[test]
    fn test_approve_rejects_ai_invalid() {
        let store = store_with_user();
        let telemetry = ReportTelemetry::new();
        let id = seed(&store, false, ReviewStatus::Pending);

        let summary = approve_reports(&store, &telemetry, &[id, Uuid::new_v4()], 99).unwrap();
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.skipped, 1);

        let report = store.get_report(id).unwrap().unwrap();
        assert_eq!(report.status, ReviewStatus::Rejected);
        assert_eq!(report.rejection_reason, AI_REJECTION_REASON);
        assert_eq!(store.get_profile(1).unwrap().unwrap().points, 0);
    }

    #[test]
    fn test_reject_reason_rules() {
        let store = store_with_user();
        let telemetry = ReportTelemetry::new();
        let approved = seed(&store, true, ReviewStatus::Approved);
        let pending = seed(&store, true, ReviewStatus::Pending);

        reject_reports(&store, &telemetry, &[approved], None).unwrap();
        let report = store.get_report(approved).unwrap().unwrap();
        assert_eq!(report.status, ReviewStatus::Rejected);
        assert_eq!(report.rejection_reason, DEFAULT_REJECTION_REASON);

        // Existing reason survives a second rejection without reason
        reject_reports(&store, &telemetry, &[pending], Some("Blurry photo")).unwrap();
        reject_reports(&store, &telemetry, &[pending], None).unwrap();
        assert_eq!(store.get_report(pending).unwrap().unwrap().rejection_reason, "Blurry photo");
    }

    #[test]
    fn test_csv_export() {
        let store = store_with_user();
        let id = seed(&store, true, ReviewStatus::Pending);
        let reports = store.list_reports(&Default::default()).unwrap();

        let csv = reports_to_csv(&reports, |uid| (uid == 1).then(|| "kofi".to_string()));
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), CSV_HEADER);
        let row = lines.next().unwrap();
        assert!(row.starts_with(&format!("{},kofi,Greater Accra,5.6,-0.18,6,True,0.95,pending,False,0,41.66.1.2,dev,", id)));
        assert!(row.ends_with(','));
    }

    #[test]
    fn test_csv_missing_values_are_empty() {
        let store = store_with_user();
        let id = seed(&store, true, ReviewStatus::Pending);
        store
            .transaction(|tables| {
                if let Some(report) = tables.reports.get_mut(&id) {
                    report.ai_score = None;
                    report.submitted_ip = None;
                }
            })
            .unwrap();
        let reports = store.list_reports(&Default::default()).unwrap();

        let csv = reports_to_csv(&reports, |_| None);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with(&format!("{},,Greater Accra,5.6,-0.18,6,True,,pending,False,0,,dev,", id)));
        assert!(!row.contains("None"));
    }

    #[test]
    fn test_csv_field_escaping() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
