//! GPS helpers: distance and location-cluster spam detection

use chrono::{DateTime, Duration, Utc};

use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::utils::constants::{
    EARTH_RADIUS_M, GPS_CLUSTER_MAX_REPORTS, GPS_CLUSTER_RADIUS_M, GPS_CLUSTER_WINDOW_MINUTES,
};

/// A previously stored report position
#[derive(Debug, Clone, Copy)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
}

/// Great-circle distance in metres
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Reject NaN and out-of-range coordinates
pub fn validate_coordinates(latitude: f64, longitude: f64) -> AppResult<()> {
    let ok = latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude);
    if ok {
        Ok(())
    } else {
        Err(AppError::new(
            ErrorCode::ReportInvalidInput,
            "Latitude must be within [-90, 90] and longitude within [-180, 180].",
        ))
    }
}

/// True when the user already has enough reports near this point within
/// the clustering window around `at`.
///
/// `at` is the submission time for live reports and the capture time for
/// reports synced from offline storage, so the window is symmetric.
pub fn detect_gps_spam(recent: &[GeoPoint], latitude: f64, longitude: f64, at: DateTime<Utc>) -> bool {
    let window = Duration::minutes(GPS_CLUSTER_WINDOW_MINUTES);

    let nearby = recent
        .iter()
        .filter(|p| (at - p.created_at).abs() <= window)
        .filter(|p| haversine_distance(latitude, longitude, p.latitude, p.longitude) <= GPS_CLUSTER_RADIUS_M)
        .count();

    nearby >= GPS_CLUSTER_MAX_REPORTS
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCRA: (f64, f64) = (5.6037, -0.1870);

    fn point(lat: f64, lon: f64, mins_ago: i64, now: DateTime<Utc>) -> GeoPoint {
        GeoPoint {
            latitude: lat,
            longitude: lon,
            created_at: now - Duration::minutes(mins_ago),
        }
    }

    #[test]
    fn test_haversine_known_distance() {
        // Accra -> Kumasi is roughly 200 km
        let d = haversine_distance(ACCRA.0, ACCRA.1, 6.6885, -1.6244);
        assert!((195_000.0..205_000.0).contains(&d), "got {}", d);
        assert_eq!(haversine_distance(ACCRA.0, ACCRA.1, ACCRA.0, ACCRA.1), 0.0);
    }

    #[test]
    fn test_gps_spam_threshold() {
        let now = Utc::now();
        // ~11 m apart
        let near = (ACCRA.0 + 0.0001, ACCRA.1);
        let two = vec![point(near.0, near.1, 1, now), point(near.0, near.1, 2, now)];
        assert!(!detect_gps_spam(&two, ACCRA.0, ACCRA.1, now));

        let mut three = two.clone();
        three.push(point(near.0, near.1, 3, now));
        assert!(detect_gps_spam(&three, ACCRA.0, ACCRA.1, now));
    }

    #[test]
    fn test_gps_spam_ignores_old_and_far() {
        let now = Utc::now();
        let far = (ACCRA.0 + 0.01, ACCRA.1); // ~1.1 km
        let reports = vec![
            point(ACCRA.0, ACCRA.1, 10, now),
            point(ACCRA.0, ACCRA.1, 6, now),
            point(far.0, far.1, 1, now),
            point(far.0, far.1, 1, now),
        ];
        assert!(!detect_gps_spam(&reports, ACCRA.0, ACCRA.1, now));
    }

    #[test]
    fn test_gps_spam_window_is_symmetric_for_offline_captures() {
        let now = Utc::now();
        let captured = now - Duration::hours(2);
        let reports = vec![
            point(ACCRA.0, ACCRA.1, 121, now),
            point(ACCRA.0, ACCRA.1, 119, now),
            point(ACCRA.0, ACCRA.1, 118, now),
        ];
        assert!(detect_gps_spam(&reports, ACCRA.0, ACCRA.1, captured));
        assert!(!detect_gps_spam(&reports, ACCRA.0, ACCRA.1, now));
    }

    #[test]
    fn test_validate_coordinates() {
        assert!(validate_coordinates(ACCRA.0, ACCRA.1).is_ok());
        assert!(validate_coordinates(91.0, 0.0).is_err());
        assert!(validate_coordinates(0.0, -181.0).is_err());
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
    }
}
