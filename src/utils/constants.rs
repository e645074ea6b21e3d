//! Constants Module - Single Source of Truth
//!
//! Business rules and tunables used across the service live here so the
//! screening, rewards and API layers agree on the same numbers.

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// Application name
pub const APP_NAME: &str = "Pothole Patrol";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent for outbound HTTP requests
pub const USER_AGENT: &str = concat!("PotholePatrol/", env!("CARGO_PKG_VERSION"));

// ============================================
// REWARDS
// ============================================

/// Points credited when a report is approved
pub const POINTS_PER_APPROVED_REPORT: u32 = 50;

/// Redemptions must be multiples of this many points
pub const REDEMPTION_BLOCK_POINTS: u32 = 500;

/// Airtime (GHS) paid per redemption block
pub const AIRTIME_GHS_PER_BLOCK: u32 = 5;

/// Prefix of locally generated redemption references
pub const REDEMPTION_REFERENCE_PREFIX: &str = "RDM";

// ============================================
// SCREENING
// ============================================

/// Submissions allowed per user per window
pub const REPORT_USER_LIMIT: u32 = 3;

/// Submissions allowed per client IP per window
pub const REPORT_IP_LIMIT: u32 = 10;

/// Submission rate-limit window (seconds)
pub const REPORT_RATE_WINDOW_SECS: u64 = 60;

/// Radius for GPS clustering (metres)
pub const GPS_CLUSTER_RADIUS_M: f64 = 100.0;

/// Look-back window for GPS clustering (minutes)
pub const GPS_CLUSTER_WINDOW_MINUTES: i64 = 5;

/// Nearby recent reports that make the next one spam
pub const GPS_CLUSTER_MAX_REPORTS: usize = 3;

/// Earth radius used by the haversine formula (metres)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Side length of the downscaled hash image
pub const PHASH_SIZE: u32 = 32;

/// Largest accepted photo width or height (pixels)
pub const MAX_IMAGE_DIMENSION: u32 = 8192;

/// Memory the image decoder may allocate for one photo
pub const MAX_IMAGE_DECODE_BYTES: u64 = 256 * 1024 * 1024;

/// Allowed severity range
pub const MIN_SEVERITY: u8 = 1;
pub const MAX_SEVERITY: u8 = 10;

/// Classifier confidence when AI_BYPASS is on
pub const AI_BYPASS_SCORE: f64 = 0.99;

/// Classifier confidence when trusting on-device scoring
pub const AI_CLIENT_TRUST_SCORE: f64 = 0.95;

/// Maximum reports accepted in one offline sync batch
pub const MAX_SYNC_BATCH: usize = 50;

// ============================================
// AUTH
// ============================================

/// Access token lifetime (1 hour)
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 60 * 60;

/// Refresh token lifetime (90 days)
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 90 * 24 * 60 * 60;

/// Minimum password length
pub const MIN_PASSWORD_LEN: usize = 8;

// ============================================
// API
// ============================================

/// Default global request budget per client per minute
pub const DEFAULT_API_RATE_LIMIT_PER_MINUTE: u32 = 120;

/// Largest accepted request body (base64 photos, sync batches)
pub const MAX_REQUEST_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Interval for background cleanup / snapshot tasks (seconds)
pub const MAINTENANCE_INTERVAL_SECS: u64 = 60;

// ============================================
// AIRTIME PROVIDER
// ============================================

/// Africa's Talking production API
pub const AT_DEFAULT_BASE_URL: &str = "https://api.africastalking.com";

/// Currency code prefixed to airtime amounts
pub const AIRTIME_CURRENCY: &str = "GHS";

/// Timeout for airtime API calls (seconds)
pub const AIRTIME_TIMEOUT_SECS: u64 = 15;

/// Base retry delay in milliseconds (1s -> 2s -> 4s -> ...)
pub const AIRTIME_BASE_RETRY_MS: u64 = 1_000;

/// Maximum retry delay in milliseconds
pub const AIRTIME_MAX_RETRY_MS: u64 = 60_000;

/// Maximum attempts per payout
pub const AIRTIME_MAX_ATTEMPTS: u32 = 5;

/// Jitter percentage applied to each retry delay
pub const RETRY_JITTER_PERCENT: u64 = 20;

/// Convert a points amount into the airtime value it buys
#[inline]
pub fn points_to_airtime(points: u32) -> u32 {
    (points / REDEMPTION_BLOCK_POINTS) * AIRTIME_GHS_PER_BLOCK
}
