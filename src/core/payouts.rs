//! Airtime redemptions: request and admin payout

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use super::rewards::{airtime_for_points, generate_reference};
use super::validators::validate_ghana_phone;
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{RedemptionRequest, ReviewStatus};
use crate::providers::airtime::AirtimeProvider;
use crate::store::Store;
use crate::utils::telemetry::ReportTelemetry;

pub const PAYOUT_FAILURE_REASON: &str = "Airtime API error. Try again.";

/// Validate and record a redemption request for `user_id`
pub fn request_redemption(
    store: &Store,
    telemetry: &ReportTelemetry,
    user_id: i64,
    points: i64,
    mtn_phone: &str,
) -> AppResult<RedemptionRequest> {
    let airtime = airtime_for_points(points)?;
    let phone = validate_ghana_phone(mtn_phone)?;
    // airtime_for_points already bounds points to a positive u32
    let points = u32::try_from(points).map_err(|_| AppError::bad_request("Invalid points."))?;

    let redemption = store.insert_redemption(
        user_id,
        points,
        airtime as f64,
        phone,
        generate_reference(Utc::now()),
    )?;

    telemetry.record_redemption_requested();
    info!(
        user_id,
        redemption_id = redemption.id,
        points,
        airtime_ghs = airtime,
        "Redemption requested"
    );
    Ok(redemption)
}

#[derive(Debug, Clone, Serialize)]
pub struct PayoutOutcome {
    pub id: i64,
    /// "approved" | "rejected" | "skipped"
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PayoutSummary {
    pub approved: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub results: Vec<PayoutOutcome>,
}

impl PayoutSummary {
    fn skip(&mut self, id: i64, reason: &str) {
        self.skipped += 1;
        self.results.push(PayoutOutcome {
            id,
            outcome: "skipped".into(),
            reference: None,
            reason: Some(reason.into()),
        });
    }
}

/// Holds a redemption out of concurrent payout runs until dropped
struct PayoutClaim<'a> {
    store: &'a Store,
    id: i64,
}

impl<'a> PayoutClaim<'a> {
    /// Claim `id` if it is pending and no other run is paying it
    fn acquire(
        store: &'a Store,
        id: i64,
    ) -> AppResult<Result<(Self, RedemptionRequest), &'static str>> {
        let claimed = store.transaction(|tables| -> Result<RedemptionRequest, &'static str> {
            let redemption = tables
                .redemptions
                .get(&id)
                .cloned()
                .ok_or("Redemption not found.")?;
            if redemption.status != ReviewStatus::Pending || !tables.payouts_in_flight.insert(id) {
                return Err("Redemption is not pending.");
            }
            Ok(redemption)
        })?;
        Ok(claimed.map(|redemption| (Self { store, id }, redemption)))
    }
}

impl Drop for PayoutClaim<'_> {
    fn drop(&mut self) {
        let id = self.id;
        if let Err(e) = self
            .store
            .transaction(|tables| tables.payouts_in_flight.remove(&id))
        {
            warn!(redemption_id = id, error = %e, "Failed to release payout claim");
        }
    }
}

/// Pay out pending redemptions one at a time.
///
/// On success the redemption is approved, its reference replaced by the
/// provider's request id and the points deducted (never below zero). On
/// failure it is rejected so the user can try again.
pub async fn approve_redemptions(
    store: &Store,
    provider: &dyn AirtimeProvider,
    telemetry: &ReportTelemetry,
    ids: &[i64],
    admin_id: i64,
) -> AppResult<PayoutSummary> {
    let mut summary = PayoutSummary::default();

    for &id in ids {
        // Claimed before the provider call so a concurrent run cannot pay twice
        let (_claim, redemption) = match PayoutClaim::acquire(store, id)? {
            Ok(claimed) => claimed,
            Err(reason) => {
                summary.skip(id, reason);
                continue;
            }
        };

        let sent = provider
            .send_airtime(&redemption.mtn_phone, redemption.airtime_amount)
            .await;

        let outcome = store.transaction(|tables| {
            let now = Utc::now();
            let Some(current) = tables.redemptions.get_mut(&id) else {
                return None;
            };
            if current.status != ReviewStatus::Pending {
                return None;
            }

            match &sent {
                Ok(reference) => {
                    current.status = ReviewStatus::Approved;
                    current.reference = reference.clone();
                    current.approved_by = Some(admin_id);
                    current.approved_at = Some(now);
                    current.updated_at = now;

                    let (user_id, points) = (current.user_id, current.points);
                    if let Some(profile) = tables.profiles.get_mut(&user_id) {
                        profile.points = profile.points.saturating_sub(points);
                        profile.updated_at = now;
                    }
                    Some(PayoutOutcome {
                        id,
                        outcome: "approved".into(),
                        reference: Some(reference.clone()),
                        reason: None,
                    })
                }
                Err(_) => {
                    current.status = ReviewStatus::Rejected;
                    current.rejection_reason = PAYOUT_FAILURE_REASON.to_string();
                    current.updated_at = now;
                    Some(PayoutOutcome {
                        id,
                        outcome: "rejected".into(),
                        reference: None,
                        reason: Some(PAYOUT_FAILURE_REASON.into()),
                    })
                }
            }
        })?;

        match outcome {
            Some(result) => {
                match &sent {
                    Ok(reference) => {
                        summary.approved += 1;
                        telemetry.record_payout(true, redemption.airtime_amount as u64);
                        info!(redemption_id = id, admin_id, reference = %reference, "Redemption paid");
                    }
                    Err(e) => {
                        summary.rejected += 1;
                        telemetry.record_payout(false, 0);
                        error!(redemption_id = id, provider = provider.name(), error = %e, "Airtime payout failed");
                    }
                }
                summary.results.push(result);
            }
            None => summary.skip(id, "Redemption is not pending."),
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::errors::ErrorCode;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeProvider {
        fail: bool,
        delay: Duration,
        sent: Mutex<Vec<(String, f64)>>,
    }

    impl FakeProvider {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                delay: Duration::ZERO,
                sent: Mutex::new(Vec::new()),
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(false)
            }
        }
    }

    #[async_trait]
    impl AirtimeProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn send_airtime(&self, phone: &str, amount: f64) -> AppResult<String> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.sent.lock().unwrap().push((phone.to_string(), amount));
            if self.fail {
                Err(AppError::airtime("boom"))
            } else {
                Ok("ATQid_test".into())
            }
        }
    }

    fn store_with_points(points: u32) -> Store {
        let store = Store::new();
        store.create_user("kofi", "h".into(), "0244123456".into(), false).unwrap();
        store.update_profile(1, |p| p.points = points).unwrap();
        store
    }

    #[test]
    fn test_request_validation() {
        let store = store_with_points(600);
        let telemetry = ReportTelemetry::new();

        let err = request_redemption(&store, &telemetry, 1, 250, "0244123456").unwrap_err();
        assert_eq!(err.code, ErrorCode::RewardInvalidPoints);
        let err = request_redemption(&store, &telemetry, 1, 500, "12345").unwrap_err();
        assert_eq!(err.code, ErrorCode::PhoneInvalid);
        let err = request_redemption(&store, &telemetry, 1, 1000, "0244123456").unwrap_err();
        assert_eq!(err.code, ErrorCode::RewardInsufficientPoints);

        let ok = request_redemption(&store, &telemetry, 1, 500, "+233244123456").unwrap();
        assert_eq!(ok.airtime_amount, 5.0);
        assert_eq!(ok.status, ReviewStatus::Pending);
        assert!(ok.reference.starts_with("RDM-"));
        assert_eq!(telemetry.get_stats().redemptions_requested, 1);
    }

    #[tokio::test]
    async fn test_successful_payout_deducts_points() {
        let store = store_with_points(1000);
        let telemetry = ReportTelemetry::new();
        let provider = FakeProvider::new(false);
        let r = request_redemption(&store, &telemetry, 1, 500, "0244123456").unwrap();

        let summary = approve_redemptions(&store, &provider, &telemetry, &[r.id, r.id], 7)
            .await
            .unwrap();
        assert_eq!(summary.approved, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(provider.sent.lock().unwrap().as_slice(), &[("0244123456".to_string(), 5.0)]);

        let paid = store.get_redemption(r.id).unwrap().unwrap();
        assert_eq!(paid.status, ReviewStatus::Approved);
        assert_eq!(paid.reference, "ATQid_test");
        assert_eq!(paid.approved_by, Some(7));
        assert_eq!(store.get_profile(1).unwrap().unwrap().points, 500);
        assert_eq!(telemetry.get_stats().airtime_paid_ghs, 5);
    }

    #[tokio::test]
    async fn test_failed_payout_rejects_and_keeps_points() {
        let store = store_with_points(500);
        let telemetry = ReportTelemetry::new();
        let provider = FakeProvider::new(true);
        let r = request_redemption(&store, &telemetry, 1, 500, "0244123456").unwrap();

        let summary = approve_redemptions(&store, &provider, &telemetry, &[r.id, 404], 7)
            .await
            .unwrap();
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.skipped, 1);

        let failed = store.get_redemption(r.id).unwrap().unwrap();
        assert_eq!(failed.status, ReviewStatus::Rejected);
        assert_eq!(failed.rejection_reason, PAYOUT_FAILURE_REASON);
        assert_eq!(store.get_profile(1).unwrap().unwrap().points, 500);
        // Points are free again once the request is refused
        assert_eq!(store.pending_redemption_points(1).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_approvals_pay_once() {
        let store = store_with_points(500);
        let telemetry = ReportTelemetry::new();
        let provider = FakeProvider::slow(Duration::from_millis(50));
        let r = request_redemption(&store, &telemetry, 1, 500, "0244123456").unwrap();

        let ids = [r.id];
        let (first, second) = tokio::join!(
            approve_redemptions(&store, &provider, &telemetry, &ids, 7),
            approve_redemptions(&store, &provider, &telemetry, &ids, 8),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first.approved + second.approved, 1);
        assert_eq!(first.skipped + second.skipped, 1);
        assert_eq!(provider.sent.lock().unwrap().len(), 1);
        assert_eq!(store.get_profile(1).unwrap().unwrap().points, 0);
        assert!(store.snapshot().unwrap().payouts_in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_payout_releases_claim() {
        let store = store_with_points(500);
        let telemetry = ReportTelemetry::new();
        let provider = FakeProvider::slow(Duration::from_secs(5));
        let r = request_redemption(&store, &telemetry, 1, 500, "0244123456").unwrap();

        let cut = tokio::time::timeout(
            Duration::from_millis(20),
            approve_redemptions(&store, &provider, &telemetry, &[r.id], 7),
        )
        .await;
        assert!(cut.is_err());

        assert!(store.snapshot().unwrap().payouts_in_flight.is_empty());
        let still = store.get_redemption(r.id).unwrap().unwrap();
        assert_eq!(still.status, ReviewStatus::Pending);
        assert_eq!(store.pending_redemption_points(1).unwrap(), 500);
    }
}
