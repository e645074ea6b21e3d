//! Anti-Spam Screening Pipeline
//!
//! Every submission passes through a fixed sequence of checks before it
//! is allowed into the store. The first failing check decides the outcome:
//!
//! 1. per-user rate limit
//! 2. per-IP rate limit
//! 3. GPS clustering
//! 4. region
//! 5. severity and coordinates
//! 6. image decoding
//! 7. perceptual-hash duplicate lookup
//! 8. classifier verdict
//!
//! Reports synced from offline storage skip the two rate limits per item.
//! The batch as a whole is charged once through [`ScreeningPipeline::charge_batch`]
//! and every other step still runs for each item.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::classifier::{PotholeClassifier, Verdict};
use super::geo::{detect_gps_spam, validate_coordinates};
use super::phash::{calculate_phash_blocking, ImageHash};
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::Region;
use crate::store::Store;
use crate::utils::constants::{
    GPS_CLUSTER_WINDOW_MINUTES, MAX_SEVERITY, MIN_SEVERITY, REPORT_IP_LIMIT,
    REPORT_RATE_WINDOW_SECS, REPORT_USER_LIMIT,
};
use crate::utils::fingerprint::device_fingerprint;
use crate::utils::media::decode_base64_payload;
use crate::utils::rate_limit::{RateLimitConfig, RateLimiter};
use crate::utils::telemetry::{RejectionReason, ReportTelemetry};

/// Raw submission as received from the client
#[derive(Debug, Clone)]
pub struct ScreeningInput<'a> {
    pub user_id: i64,
    pub client_ip: Option<&'a str>,
    pub user_agent: &'a str,
    pub latitude: f64,
    pub longitude: f64,
    pub region: &'a str,
    pub severity: i64,
    pub image_base64: &'a str,
    pub device_id: Option<&'a str>,
    /// Capture time for offline reports
    pub captured_at: Option<DateTime<Utc>>,
    /// Offline batches skip the per-user / per-IP limits
    pub enforce_rate_limits: bool,
}

/// A submission that passed screening, ready to be stored
#[derive(Debug, Clone)]
pub struct ScreenedReport {
    pub image_bytes: Vec<u8>,
    pub image_hash: ImageHash,
    pub region: Region,
    pub severity: u8,
    pub latitude: f64,
    pub longitude: f64,
    pub device_id: String,
    pub verdict: Verdict,
}

impl ScreenedReport {
    /// Classifier rejections are stored but flagged
    pub fn is_spam(&self) -> bool {
        !self.verdict.valid
    }
}

/// Anti-spam decision engine
pub struct ScreeningPipeline {
    user_limiter: RateLimiter,
    ip_limiter: RateLimiter,
    classifier: Box<dyn PotholeClassifier>,
    hamming_threshold: u32,
    telemetry: Arc<ReportTelemetry>,
}

impl ScreeningPipeline {
    pub fn new(
        classifier: Box<dyn PotholeClassifier>,
        hamming_threshold: u32,
        telemetry: Arc<ReportTelemetry>,
    ) -> Self {
        let window = std::time::Duration::from_secs(REPORT_RATE_WINDOW_SECS);
        Self {
            user_limiter: RateLimiter::new(RateLimitConfig::new(REPORT_USER_LIMIT, window)),
            ip_limiter: RateLimiter::new(RateLimitConfig::new(REPORT_IP_LIMIT, window)),
            classifier,
            hamming_threshold,
            telemetry,
        }
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    pub fn hamming_threshold(&self) -> u32 {
        self.hamming_threshold
    }

    /// Count one offline batch against the per-user and per-IP budgets
    pub fn charge_batch(&self, user_id: i64, client_ip: Option<&str>) -> AppResult<()> {
        let result = self.check_rate_limits(user_id, client_ip);
        if let Err(err) = &result {
            self.telemetry.record_rejected(RejectionReason::RateLimited, 0);
            warn!(user_id, code = err.code_str(), "Sync batch refused");
        }
        result
    }

    /// Drop stale rate-limit windows, returns entries removed
    pub fn cleanup(&self) -> usize {
        self.user_limiter.cleanup() + self.ip_limiter.cleanup()
    }

    /// Run every check in order, recording the outcome in telemetry
    pub async fn screen(
        &self,
        store: &Store,
        input: &ScreeningInput<'_>,
    ) -> AppResult<ScreenedReport> {
        let start = Instant::now();
        let result = self.run_checks(store, input).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(screened) => {
                if screened.is_spam() {
                    self.telemetry.record_rejected(RejectionReason::AiRejected, elapsed_ms);
                } else {
                    self.telemetry.record_accepted(elapsed_ms);
                }
                info!(
                    user_id = input.user_id,
                    region = %screened.region,
                    severity = screened.severity,
                    ai_valid = screened.verdict.valid,
                    ai_score = screened.verdict.score,
                    "Submission passed screening"
                );
            }
            Err(err) => {
                let reason = rejection_reason(err);
                self.telemetry.record_rejected(reason, elapsed_ms);
                warn!(
                    user_id = input.user_id,
                    reason = reason.as_str(),
                    code = err.code_str(),
                    "Submission refused"
                );
            }
        }

        result
    }

    fn check_rate_limits(&self, user_id: i64, client_ip: Option<&str>) -> AppResult<()> {
        if !self.user_limiter.check(&format!("user:{}", user_id)).allowed {
            return Err(AppError::rate_limited("Too many reports. Slow down."));
        }
        if let Some(ip) = client_ip {
            if !self.ip_limiter.check(&format!("ip:{}", ip)).allowed {
                return Err(AppError::rate_limited("Too many reports from this IP."));
            }
        }
        Ok(())
    }

    async fn run_checks(
        &self,
        store: &Store,
        input: &ScreeningInput<'_>,
    ) -> AppResult<ScreenedReport> {
        // 1-2. Rate limits
        if input.enforce_rate_limits {
            self.check_rate_limits(input.user_id, input.client_ip)?;
        }

        // 3. GPS clustering
        let at = input.captured_at.unwrap_or_else(Utc::now);
        let window = Duration::minutes(GPS_CLUSTER_WINDOW_MINUTES);
        let recent = store.recent_reports_for_user(input.user_id, at - window)?;
        if detect_gps_spam(&recent, input.latitude, input.longitude, at) {
            return Err(AppError::new(
                ErrorCode::ReportGpsSpam,
                "Too many reports around the same location in a short time.",
            ));
        }

        // 4. Region
        let region: Region = input.region.parse()?;

        // 5. Severity and coordinates
        let severity = parse_severity(input.severity)?;
        validate_coordinates(input.latitude, input.longitude)?;

        // 6. Image decoding
        let image_bytes = decode_base64_payload(input.image_base64)
            .map_err(|_| AppError::new(ErrorCode::ReportInvalidImage, "Invalid image data."))?;
        let (image_bytes, image_hash) = calculate_phash_blocking(image_bytes).await?;

        // 7. Duplicate lookup
        if let Some(existing) = store.find_similar_hash(&image_hash, self.hamming_threshold)? {
            debug!(existing = %existing, "Perceptual hash collision");
            return Err(AppError::new(
                ErrorCode::ReportDuplicateImage,
                "Duplicate pothole image.",
            ));
        }

        // 8. Classifier
        let verdict = self.classifier.classify(&image_bytes);

        let device_id = match input.device_id.map(str::trim).filter(|d| !d.is_empty()) {
            Some(device) => device.to_string(),
            None => device_fingerprint(input.user_agent, input.client_ip),
        };

        Ok(ScreenedReport {
            image_bytes,
            image_hash,
            region,
            severity,
            latitude: input.latitude,
            longitude: input.longitude,
            device_id,
            verdict,
        })
    }
}

fn parse_severity(raw: i64) -> AppResult<u8> {
    u8::try_from(raw)
        .ok()
        .filter(|s| (MIN_SEVERITY..=MAX_SEVERITY).contains(s))
        .ok_or_else(|| {
            AppError::new(
                ErrorCode::ReportInvalidInput,
                format!("Severity must be between {} and {}.", MIN_SEVERITY, MAX_SEVERITY),
            )
        })
}

fn rejection_reason(err: &AppError) -> RejectionReason {
    match err.code {
        ErrorCode::ApiRateLimited => RejectionReason::RateLimited,
        ErrorCode::ReportGpsSpam => RejectionReason::GpsSpam,
        ErrorCode::ReportInvalidRegion => RejectionReason::InvalidRegion,
        ErrorCode::ReportInvalidImage => RejectionReason::InvalidImage,
        ErrorCode::ReportDuplicateImage => RejectionReason::Duplicate,
        _ => RejectionReason::InvalidInput,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::BypassClassifier;
    use crate::models::types::{PotholeReport, ReviewStatus};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use image::{GrayImage, ImageFormat, Luma};
    use std::io::Cursor;
    use uuid::Uuid;

    // Seeded noise: distinct seeds give unrelated hashes
    fn png(seed: u32) -> Vec<u8> {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(12_345);
        let img = GrayImage::from_fn(64, 64, |_, _| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            Luma([(state >> 24) as u8])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn pipeline() -> (ScreeningPipeline, Arc<ReportTelemetry>) {
        let telemetry = Arc::new(ReportTelemetry::new());
        (
            ScreeningPipeline::new(Box::new(BypassClassifier), 0, telemetry.clone()),
            telemetry,
        )
    }

    fn input(image: &str, lat: f64) -> ScreeningInput<'_> {
        ScreeningInput {
            user_id: 1,
            client_ip: Some("41.66.1.2"),
            user_agent: "okhttp/4.9",
            latitude: lat,
            longitude: -0.187,
            region: "Greater Accra",
            severity: 5,
            image_base64: image,
            device_id: None,
            captured_at: None,
            enforce_rate_limits: true,
        }
    }

    fn stored(screened: &ScreenedReport) -> PotholeReport {
        let now = Utc::now();
        PotholeReport {
            id: Uuid::new_v4(),
            user_id: Some(1),
            image: "/media/potholes/p.jpg".into(),
            image_hash: screened.image_hash.to_hex(),
            latitude: screened.latitude,
            longitude: screened.longitude,
            region: screened.region,
            severity: screened.severity,
            ai_valid: true,
            ai_score: Some(screened.verdict.score),
            status: ReviewStatus::Pending,
            is_spam: false,
            submitted_ip: None,
            device_id: screened.device_id.clone(),
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

    #[tokio::test]
    async fn test_accepts_valid_submission() {
        let (pipeline, telemetry) = pipeline();
        let store = Store::new();
        let image = STANDARD.encode(png(1));

        let screened = pipeline.screen(&store, &input(&image, 5.6)).await.unwrap();
        assert_eq!(screened.region, Region::GreaterAccra);
        assert_eq!(screened.severity, 5);
        assert_eq!(screened.device_id, device_fingerprint("okhttp/4.9", Some("41.66.1.2")));
        assert!(!screened.is_spam());
        assert_eq!(telemetry.get_stats().submissions_accepted, 1);
    }

    #[tokio::test]
    async fn test_duplicate_image_refused() {
        let (pipeline, _) = pipeline();
        let store = Store::new();
        let image = format!("data:image/png;base64,{}", STANDARD.encode(png(2)));

        let first = pipeline.screen(&store, &input(&image, 5.6)).await.unwrap();
        store.insert_report(stored(&first)).unwrap();

        let err = pipeline.screen(&store, &input(&image, 6.6)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ReportDuplicateImage);
        assert_eq!(err.message, "Duplicate pothole image.");
    }

    #[tokio::test]
    async fn test_user_rate_limit_comes_first() {
        let (pipeline, telemetry) = pipeline();
        let store = Store::new();

        for _ in 0..3 {
            // Invalid region still consumes the rate-limit budget
            let mut bad = input("x", 5.6);
            bad.region = "Lagos";
            assert_eq!(
                pipeline.screen(&store, &bad).await.unwrap_err().code,
                ErrorCode::ReportInvalidRegion
            );
        }
        let err = pipeline.screen(&store, &input("x", 5.6)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ApiRateLimited);
        assert_eq!(err.message, "Too many reports. Slow down.");
        assert_eq!(telemetry.get_stats().submissions_rejected["rate_limited"], 1);
    }

    #[tokio::test]
    async fn test_offline_batches_skip_rate_limits() {
        let (pipeline, _) = pipeline();
        let store = Store::new();
        for seed in 0..5 {
            let image = STANDARD.encode(png(100 + seed));
            let mut item = input(&image, 5.0 + seed as f64 * 0.1);
            item.enforce_rate_limits = false;
            let screened = pipeline.screen(&store, &item).await.unwrap();
            store.insert_report(stored(&screened)).unwrap();
        }
    }

    #[tokio::test]
    async fn test_batch_charge_shares_user_budget() {
        let (pipeline, telemetry) = pipeline();
        let store = Store::new();
        for _ in 0..3 {
            pipeline.charge_batch(1, Some("41.66.1.2")).unwrap();
        }
        let err = pipeline.charge_batch(1, Some("41.66.1.2")).unwrap_err();
        assert_eq!(err.code, ErrorCode::ApiRateLimited);
        assert_eq!(telemetry.get_stats().submissions_rejected["rate_limited"], 1);

        // Single submissions draw on the same budget
        let image = STANDARD.encode(png(5));
        let err = pipeline.screen(&store, &input(&image, 5.6)).await.unwrap_err();
        assert_eq!(err.message, "Too many reports. Slow down.");
        assert!(pipeline.charge_batch(2, Some("41.66.9.9")).is_ok());
    }

    #[tokio::test]
    async fn test_gps_cluster_refused() {
        let (pipeline, _) = pipeline();
        let store = Store::new();
        for seed in 0..3 {
            let image = STANDARD.encode(png(200 + seed));
            let mut item = input(&image, 5.6);
            item.enforce_rate_limits = false;
            let screened = pipeline.screen(&store, &item).await.unwrap();
            store.insert_report(stored(&screened)).unwrap();
        }

        let image = STANDARD.encode(png(300));
        let err = pipeline.screen(&store, &input(&image, 5.6001)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ReportGpsSpam);
    }

    #[tokio::test]
    async fn test_field_validation() {
        let (pipeline, _) = pipeline();
        let store = Store::new();
        let image = STANDARD.encode(png(3));

        let mut bad = input(&image, 5.6);
        bad.severity = 11;
        bad.enforce_rate_limits = false;
        assert_eq!(pipeline.screen(&store, &bad).await.unwrap_err().code, ErrorCode::ReportInvalidInput);

        let mut bad = input(&image, 95.0);
        bad.enforce_rate_limits = false;
        assert_eq!(pipeline.screen(&store, &bad).await.unwrap_err().code, ErrorCode::ReportInvalidInput);

        let mut bad = input("!!!not-base64", 5.6);
        bad.enforce_rate_limits = false;
        let err = pipeline.screen(&store, &bad).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ReportInvalidImage);
        assert_eq!(err.message, "Invalid image data.");

        let garbage = STANDARD.encode(b"definitely not an image");
        let mut bad = input(&garbage, 5.6);
        bad.enforce_rate_limits = false;
        assert_eq!(pipeline.screen(&store, &bad).await.unwrap_err().code, ErrorCode::ReportInvalidImage);
    }

    #[tokio::test]
    async fn test_client_device_id_preferred() {
        let (pipeline, _) = pipeline();
        let store = Store::new();
        let image = STANDARD.encode(png(4));
        let mut item = input(&image, 5.6);
        item.device_id = Some("pixel-7-abc");
        assert_eq!(pipeline.screen(&store, &item).await.unwrap().device_id, "pixel-7-abc");
    }
}
