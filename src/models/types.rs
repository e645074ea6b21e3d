//! Domain types: accounts, pothole reports and airtime redemptions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::errors::{AppError, ErrorCode};

// ============================================
// Accounts
// ============================================

/// Login account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Always stored trimmed and lowercase
    pub username: String,
    /// Argon2 PHC string
    pub password_hash: String,
    pub is_staff: bool,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

/// Reporter profile attached one-to-one to a [`User`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub phone: String,
    pub is_verified: bool,
    /// Public URL of the uploaded ID document
    pub id_document: Option<String>,
    /// Reserved or celebrity account
    pub is_protected: bool,
    pub points: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: i64, phone: String) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            phone,
            is_verified: false,
            id_document: None,
            is_protected: false,
            points: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================
// Regions
// ============================================

/// The sixteen administrative regions of Ghana
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Region {
    #[default]
    #[serde(rename = "Greater Accra")]
    GreaterAccra,
    Ashanti,
    Eastern,
    Western,
    #[serde(rename = "Western North")]
    WesternNorth,
    Central,
    Volta,
    Oti,
    Northern,
    Savannah,
    #[serde(rename = "North East")]
    NorthEast,
    #[serde(rename = "Upper East")]
    UpperEast,
    #[serde(rename = "Upper West")]
    UpperWest,
    Bono,
    #[serde(rename = "Bono East")]
    BonoEast,
    Ahafo,
}

impl Region {
    pub const ALL: [Region; 16] = [
        Region::GreaterAccra,
        Region::Ashanti,
        Region::Eastern,
        Region::Western,
        Region::WesternNorth,
        Region::Central,
        Region::Volta,
        Region::Oti,
        Region::Northern,
        Region::Savannah,
        Region::NorthEast,
        Region::UpperEast,
        Region::UpperWest,
        Region::Bono,
        Region::BonoEast,
        Region::Ahafo,
    ];

    /// Display name, as sent by clients
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::GreaterAccra => "Greater Accra",
            Region::Ashanti => "Ashanti",
            Region::Eastern => "Eastern",
            Region::Western => "Western",
            Region::WesternNorth => "Western North",
            Region::Central => "Central",
            Region::Volta => "Volta",
            Region::Oti => "Oti",
            Region::Northern => "Northern",
            Region::Savannah => "Savannah",
            Region::NorthEast => "North East",
            Region::UpperEast => "Upper East",
            Region::UpperWest => "Upper West",
            Region::Bono => "Bono",
            Region::BonoEast => "Bono East",
            Region::Ahafo => "Ahafo",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = AppError;

    /// Exact match on the display name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| AppError::new(ErrorCode::ReportInvalidRegion, "Invalid region."))
    }
}

// ============================================
// Pothole Reports
// ============================================

/// Review state shared by reports and redemptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            other => Err(AppError::bad_request(format!("Unknown status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PotholeReport {
    pub id: Uuid,
    /// None once the reporting account is gone
    pub user_id: Option<i64>,
    /// Public URL of the stored photo
    pub image: String,
    /// 256-char hex average hash, see `core::phash`
    pub image_hash: String,
    pub latitude: f64,
    pub longitude: f64,
    pub region: Region,
    pub severity: u8,
    pub ai_valid: bool,
    pub ai_score: Option<f64>,
    pub status: ReviewStatus,
    pub is_spam: bool,
    pub submitted_ip: Option<String>,
    pub device_id: String,
    pub is_synced: bool,
    /// Client-generated id for reports captured offline
    pub client_ref: Option<Uuid>,
    /// When the photo was taken, if the client reported it
    pub captured_at: Option<DateTime<Utc>>,
    pub approved_by: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: String,
    pub points_awarded: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================
// Redemptions
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionRequest {
    pub id: i64,
    pub user_id: i64,
    pub points: u32,
    /// Airtime value in GHS
    pub airtime_amount: f64,
    pub status: ReviewStatus,
    pub mtn_phone: String,
    /// `RDM-...` until paid, then the provider request id
    pub reference: String,
    pub approved_by: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
