//! Telemetry Module for Pothole Patrol
//!
//! Counts what the screening pipeline and the review workflow do, for
//! the admin dashboard and for end-of-run exports:
//! - how many submissions arrive and why they are refused
//! - how many reports get approved / rejected
//! - how much airtime has been paid out
//!
//! Privacy-first: no usernames, phone numbers or coordinates are kept here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Why a submission was refused
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RejectionReason {
    RateLimited,
    GpsSpam,
    InvalidRegion,
    InvalidInput,
    InvalidImage,
    Duplicate,
    AiRejected,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::RateLimited => "rate_limited",
            RejectionReason::GpsSpam => "gps_spam",
            RejectionReason::InvalidRegion => "invalid_region",
            RejectionReason::InvalidInput => "invalid_input",
            RejectionReason::InvalidImage => "invalid_image",
            RejectionReason::Duplicate => "duplicate",
            RejectionReason::AiRejected => "ai_rejected",
        }
    }
}

/// Aggregated statistics for reporting
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelemetryStats {
    pub submissions_received: u64,
    pub submissions_accepted: u64,
    /// Refusals keyed by reason
    pub submissions_rejected: HashMap<String, u64>,
    pub reports_approved: u64,
    pub reports_rejected: u64,
    pub points_awarded: u64,
    pub redemptions_requested: u64,
    pub redemptions_paid: u64,
    pub redemptions_failed: u64,
    pub airtime_paid_ghs: u64,
    /// Average screening latency (ms)
    pub avg_screening_ms: f64,
    pub period_start: u64,
    pub period_end: u64,
}

impl TelemetryStats {
    pub fn total_rejected(&self) -> u64 {
        self.submissions_rejected.values().sum()
    }

    /// Share of submissions refused by screening, in percent
    pub fn spam_rate(&self) -> f64 {
        if self.submissions_received == 0 {
            0.0
        } else {
            self.total_rejected() as f64 / self.submissions_received as f64 * 100.0
        }
    }

    /// Export as CSV row
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{}\n",
            self.period_start,
            self.period_end,
            self.submissions_received,
            self.submissions_accepted,
            self.total_rejected(),
            self.reports_approved,
            self.points_awarded,
            self.redemptions_paid,
            self.airtime_paid_ghs,
        )
    }
}

/// Main telemetry collector
pub struct ReportTelemetry {
    submissions_received: AtomicU64,
    submissions_accepted: AtomicU64,
    screening_ms_total: AtomicU64,
    reports_approved: AtomicU64,
    reports_rejected: AtomicU64,
    points_awarded: AtomicU64,
    redemptions_requested: AtomicU64,
    redemptions_paid: AtomicU64,
    redemptions_failed: AtomicU64,
    airtime_paid_ghs: AtomicU64,
    rejections: RwLock<HashMap<RejectionReason, u64>>,
    session_start: u64,
    export_dir: PathBuf,
}

impl ReportTelemetry {
    /// Create new collector exporting to ./telemetry
    pub fn new() -> Self {
        Self::with_export_dir(PathBuf::from("./telemetry"))
    }

    pub fn with_export_dir(export_dir: PathBuf) -> Self {
        Self {
            submissions_received: AtomicU64::new(0),
            submissions_accepted: AtomicU64::new(0),
            screening_ms_total: AtomicU64::new(0),
            reports_approved: AtomicU64::new(0),
            reports_rejected: AtomicU64::new(0),
            points_awarded: AtomicU64::new(0),
            redemptions_requested: AtomicU64::new(0),
            redemptions_paid: AtomicU64::new(0),
            redemptions_failed: AtomicU64::new(0),
            airtime_paid_ghs: AtomicU64::new(0),
            rejections: RwLock::new(HashMap::new()),
            session_start: current_timestamp(),
            export_dir,
        }
    }

    pub fn record_accepted(&self, screening_ms: u64) {
        self.submissions_received.fetch_add(1, Ordering::Relaxed);
        self.submissions_accepted.fetch_add(1, Ordering::Relaxed);
        self.screening_ms_total.fetch_add(screening_ms, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, reason: RejectionReason, screening_ms: u64) {
        self.submissions_received.fetch_add(1, Ordering::Relaxed);
        self.screening_ms_total.fetch_add(screening_ms, Ordering::Relaxed);
        if let Ok(mut counts) = self.rejections.write() {
            *counts.entry(reason).or_insert(0) += 1;
        }
    }

    pub fn record_review(&self, approved: bool, points: u32) {
        if approved {
            self.reports_approved.fetch_add(1, Ordering::Relaxed);
        } else {
            self.reports_rejected.fetch_add(1, Ordering::Relaxed);
        }
        self.points_awarded.fetch_add(points as u64, Ordering::Relaxed);
    }

    pub fn record_redemption_requested(&self) {
        self.redemptions_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_payout(&self, success: bool, amount_ghs: u64) {
        if success {
            self.redemptions_paid.fetch_add(1, Ordering::Relaxed);
            self.airtime_paid_ghs.fetch_add(amount_ghs, Ordering::Relaxed);
        } else {
            self.redemptions_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get current statistics
    pub fn get_stats(&self) -> TelemetryStats {
        let received = self.submissions_received.load(Ordering::Relaxed);
        let avg_screening_ms = if received > 0 {
            self.screening_ms_total.load(Ordering::Relaxed) as f64 / received as f64
        } else {
            0.0
        };

        let submissions_rejected = self
            .rejections
            .read()
            .map(|counts| {
                counts
                    .iter()
                    .map(|(k, v)| (k.as_str().to_string(), *v))
                    .collect()
            })
            .unwrap_or_default();

        TelemetryStats {
            submissions_received: received,
            submissions_accepted: self.submissions_accepted.load(Ordering::Relaxed),
            submissions_rejected,
            reports_approved: self.reports_approved.load(Ordering::Relaxed),
            reports_rejected: self.reports_rejected.load(Ordering::Relaxed),
            points_awarded: self.points_awarded.load(Ordering::Relaxed),
            redemptions_requested: self.redemptions_requested.load(Ordering::Relaxed),
            redemptions_paid: self.redemptions_paid.load(Ordering::Relaxed),
            redemptions_failed: self.redemptions_failed.load(Ordering::Relaxed),
            airtime_paid_ghs: self.airtime_paid_ghs.load(Ordering::Relaxed),
            avg_screening_ms,
            period_start: self.session_start,
            period_end: current_timestamp(),
        }
    }

    /// Export current stats to a JSON file
    pub fn export_stats_json(&self) -> Result<PathBuf, std::io::Error> {
        fs::create_dir_all(&self.export_dir)?;
        let stats = self.get_stats();
        let path = self
            .export_dir
            .join(format!("stats_{}.json", current_timestamp()));

        let json = serde_json::to_string_pretty(&stats)?;
        fs::write(&path, json)?;

        Ok(path)
    }

    /// Append stats to the CSV history
    pub fn export_stats_csv(&self) -> Result<PathBuf, std::io::Error> {
        fs::create_dir_all(&self.export_dir)?;
        let stats = self.get_stats();
        let path = self.export_dir.join("telemetry_history.csv");

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        if file.metadata()?.len() == 0 {
            writeln!(file, "period_start,period_end,received,accepted,rejected,approved,points_awarded,redemptions_paid,airtime_paid_ghs")?;
        }

        write!(file, "{}", stats.to_csv_row())?;

        Ok(path)
    }
}

impl Default for ReportTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_counts() {
        let telemetry = ReportTelemetry::new();
        telemetry.record_accepted(10);
        telemetry.record_rejected(RejectionReason::Duplicate, 4);
        telemetry.record_rejected(RejectionReason::Duplicate, 6);
        telemetry.record_rejected(RejectionReason::GpsSpam, 0);
        telemetry.record_review(true, 50);
        telemetry.record_payout(true, 5);
        telemetry.record_payout(false, 0);

        let stats = telemetry.get_stats();
        assert_eq!(stats.submissions_received, 4);
        assert_eq!(stats.submissions_accepted, 1);
        assert_eq!(stats.submissions_rejected["duplicate"], 2);
        assert_eq!(stats.total_rejected(), 3);
        assert_eq!(stats.spam_rate(), 75.0);
        assert_eq!(stats.avg_screening_ms, 5.0);
        assert_eq!(stats.points_awarded, 50);
        assert_eq!(stats.redemptions_paid, 1);
        assert_eq!(stats.redemptions_failed, 1);
        assert_eq!(stats.airtime_paid_ghs, 5);
    }

    #[test]
    fn test_export_files() {
        let dir = tempfile::tempdir().unwrap();
        let telemetry = ReportTelemetry::with_export_dir(dir.path().join("telemetry"));
        telemetry.record_accepted(1);

        let json_path = telemetry.export_stats_json().unwrap();
        let json = std::fs::read_to_string(json_path).unwrap();
        assert!(json.contains("submissions_accepted"));

        let csv_path = telemetry.export_stats_csv().unwrap();
        telemetry.export_stats_csv().unwrap();
        let csv = std::fs::read_to_string(csv_path).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.starts_with("period_start,"));
    }
}
