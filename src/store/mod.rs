//! In-process data store
//!
//! Users, profiles, reports and redemptions live in one [`Snapshot`]
//! guarded by a single lock, so updates that touch several records (an
//! approval crediting a profile, a redemption reserving points) are
//! atomic. The snapshot can be persisted to and restored from JSON.

pub mod snapshot;

pub use snapshot::{read_snapshot, write_snapshot, Snapshot};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::core::geo::GeoPoint;
use crate::core::phash::ImageHash;
use crate::core::rewards::ensure_available;
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{
    PotholeReport, RedemptionRequest, Region, ReviewStatus, User, UserProfile,
};

/// Admin report listing filter
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportFilter {
    pub status: Option<ReviewStatus>,
    pub region: Option<Region>,
    pub is_spam: Option<bool>,
}

impl ReportFilter {
    fn matches(&self, report: &PotholeReport) -> bool {
        self.status.map_or(true, |s| report.status == s)
            && self.region.map_or(true, |r| report.region == r)
            && self.is_spam.map_or(true, |s| report.is_spam == s)
    }
}

/// Row counts for the admin dashboard
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreCounts {
    pub users: usize,
    pub reports: usize,
    pub pending_reports: usize,
    pub spam_reports: usize,
    pub redemptions: usize,
    pub pending_redemptions: usize,
}

/// Outcome of [`Store::insert_report_checked`]
#[derive(Debug, Clone)]
pub enum ReportInsert {
    Inserted,
    /// The same `(user, client_ref)` is already stored
    Existing(PotholeReport),
    /// A stored report's image hash is within the threshold
    Duplicate(Uuid),
}

#[derive(Debug, Default)]
pub struct Store {
    tables: RwLock<Snapshot>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            tables: RwLock::new(snapshot),
        }
    }

    /// Load from a JSON snapshot file (empty store if the file is missing)
    pub fn load_from(path: &Path) -> AppResult<Self> {
        Ok(Self::from_snapshot(read_snapshot(path)?))
    }

    /// Persist the current contents to a JSON snapshot file
    pub async fn save_to(&self, path: &Path) -> AppResult<()> {
        let snapshot = self.snapshot()?;
        write_snapshot(path, &snapshot).await
    }

    pub fn snapshot(&self) -> AppResult<Snapshot> {
        Ok(self.read()?.clone())
    }

    pub fn restore(&self, snapshot: Snapshot) -> AppResult<()> {
        *self.write()? = snapshot;
        Ok(())
    }

    /// Run `f` with exclusive access to every table
    pub fn transaction<R>(&self, f: impl FnOnce(&mut Snapshot) -> R) -> AppResult<R> {
        let mut tables = self.write()?;
        Ok(f(&mut tables))
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, Snapshot>> {
        self.tables
            .read()
            .map_err(|_| AppError::storage("Store lock poisoned"))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, Snapshot>> {
        self.tables
            .write()
            .map_err(|_| AppError::storage("Store lock poisoned"))
    }

    // ============================================
    // Users & Profiles
    // ============================================

    /// Create a user and its profile; the username must be free
    pub fn create_user(
        &self,
        username: &str,
        password_hash: String,
        phone: String,
        is_staff: bool,
    ) -> AppResult<(User, UserProfile)> {
        let mut tables = self.write()?;

        if tables.users.values().any(|u| u.username == username) {
            return Err(AppError::new(
                ErrorCode::UsernameTaken,
                "Username already taken.",
            ));
        }

        let id = tables.allocate_user_id();
        let user = User {
            id,
            username: username.to_string(),
            password_hash,
            is_staff,
            is_active: true,
            date_joined: Utc::now(),
        };
        let profile = UserProfile::new(id, phone);

        tables.users.insert(id, user.clone());
        tables.profiles.insert(id, profile.clone());
        Ok((user, profile))
    }

    pub fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    pub fn get_user(&self, id: i64) -> AppResult<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    /// Username by id, for listings that show report authors
    pub fn usernames(&self) -> AppResult<HashMap<i64, String>> {
        Ok(self
            .read()?
            .users
            .values()
            .map(|u| (u.id, u.username.clone()))
            .collect())
    }

    pub fn get_profile(&self, user_id: i64) -> AppResult<Option<UserProfile>> {
        Ok(self.read()?.profiles.get(&user_id).cloned())
    }

    /// Mutate a profile in place, bumping `updated_at`
    pub fn update_profile(
        &self,
        user_id: i64,
        f: impl FnOnce(&mut UserProfile),
    ) -> AppResult<UserProfile> {
        let mut tables = self.write()?;
        let profile = tables
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| AppError::not_found("Profile not found."))?;
        f(profile);
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    /// Case-insensitive search over username and phone
    pub fn search_profiles(&self, query: Option<&str>) -> AppResult<Vec<(User, UserProfile)>> {
        let needle = query
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());
        let tables = self.read()?;

        let mut rows: Vec<(User, UserProfile)> = tables
            .profiles
            .values()
            .filter_map(|p| tables.users.get(&p.user_id).map(|u| (u, p)))
            .filter(|(u, p)| match &needle {
                Some(n) => u.username.contains(n.as_str()) || p.phone.contains(n.as_str()),
                None => true,
            })
            .map(|(u, p)| (u.clone(), p.clone()))
            .collect();
        rows.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
        Ok(rows)
    }

    // ============================================
    // Reports
    // ============================================

    pub fn insert_report(&self, report: PotholeReport) -> AppResult<()> {
        self.write()?.reports.insert(report.id, report);
        Ok(())
    }

    /// Insert `report` unless its `client_ref` or a near-identical image is
    /// already stored. Both checks run under the write lock.
    pub fn insert_report_checked(
        &self,
        report: PotholeReport,
        threshold: u32,
    ) -> AppResult<ReportInsert> {
        let hash = ImageHash::from_hex(&report.image_hash)?;
        let mut tables = self.write()?;

        if let (Some(user_id), Some(client_ref)) = (report.user_id, report.client_ref) {
            if let Some(existing) = find_by_client_ref(&tables, user_id, client_ref) {
                return Ok(ReportInsert::Existing(existing.clone()));
            }
        }
        if let Some(other) = find_similar(&tables, &hash, threshold) {
            return Ok(ReportInsert::Duplicate(other));
        }

        tables.reports.insert(report.id, report);
        Ok(ReportInsert::Inserted)
    }

    pub fn get_report(&self, id: Uuid) -> AppResult<Option<PotholeReport>> {
        Ok(self.read()?.reports.get(&id).cloned())
    }

    /// A user's reports, newest first
    pub fn reports_for_user(&self, user_id: i64) -> AppResult<Vec<PotholeReport>> {
        let mut reports: Vec<PotholeReport> = self
            .read()?
            .reports
            .values()
            .filter(|r| r.user_id == Some(user_id))
            .cloned()
            .collect();
        sort_newest_first(&mut reports);
        Ok(reports)
    }

    /// Positions of a user's reports taken at or after `since`.
    ///
    /// Offline captures are placed at their capture time.
    pub fn recent_reports_for_user(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<GeoPoint>> {
        Ok(self
            .read()?
            .reports
            .values()
            .filter(|r| r.user_id == Some(user_id))
            .map(|r| GeoPoint {
                latitude: r.latitude,
                longitude: r.longitude,
                created_at: r.captured_at.unwrap_or(r.created_at),
            })
            .filter(|p| p.created_at >= since)
            .collect())
    }

    /// Id of a stored report whose hash is within `threshold` bits
    pub fn find_similar_hash(&self, hash: &ImageHash, threshold: u32) -> AppResult<Option<Uuid>> {
        Ok(find_similar(&*self.read()?, hash, threshold))
    }

    pub fn find_report_by_client_ref(
        &self,
        user_id: i64,
        client_ref: Uuid,
    ) -> AppResult<Option<PotholeReport>> {
        Ok(find_by_client_ref(&*self.read()?, user_id, client_ref).cloned())
    }

    /// Admin listing, newest first
    pub fn list_reports(&self, filter: &ReportFilter) -> AppResult<Vec<PotholeReport>> {
        let mut reports: Vec<PotholeReport> = self
            .read()?
            .reports
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        sort_newest_first(&mut reports);
        Ok(reports)
    }

    /// Approved, non-spam reports for the public map, newest first
    pub fn public_reports(&self, region: Option<Region>) -> AppResult<Vec<PotholeReport>> {
        self.list_reports(&ReportFilter {
            status: Some(ReviewStatus::Approved),
            region,
            is_spam: Some(false),
        })
    }

    // ============================================
    // Redemptions
    // ============================================

    /// Record a pending redemption if the user's unreserved balance covers it
    pub fn insert_redemption(
        &self,
        user_id: i64,
        points: u32,
        airtime_amount: f64,
        mtn_phone: String,
        reference: String,
    ) -> AppResult<RedemptionRequest> {
        let mut tables = self.write()?;

        let balance = tables
            .profiles
            .get(&user_id)
            .map(|p| p.points)
            .ok_or_else(|| AppError::not_found("Profile not found."))?;
        ensure_available(balance, tables.pending_redemption_points(user_id), points)?;

        let now = Utc::now();
        let redemption = RedemptionRequest {
            id: tables.allocate_redemption_id(),
            user_id,
            points,
            airtime_amount,
            status: ReviewStatus::Pending,
            mtn_phone,
            reference,
            approved_by: None,
            approved_at: None,
            rejection_reason: String::new(),
            created_at: now,
            updated_at: now,
        };
        tables.redemptions.insert(redemption.id, redemption.clone());
        Ok(redemption)
    }

    pub fn get_redemption(&self, id: i64) -> AppResult<Option<RedemptionRequest>> {
        Ok(self.read()?.redemptions.get(&id).cloned())
    }

    /// A user's redemptions, newest first
    pub fn redemptions_for_user(&self, user_id: i64) -> AppResult<Vec<RedemptionRequest>> {
        let mut rows: Vec<RedemptionRequest> = self
            .read()?
            .redemptions
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    pub fn pending_redemption_points(&self, user_id: i64) -> AppResult<u32> {
        Ok(self.read()?.pending_redemption_points(user_id))
    }

    /// Admin listing, newest first
    pub fn list_redemptions(&self, status: Option<ReviewStatus>) -> AppResult<Vec<RedemptionRequest>> {
        let mut rows: Vec<RedemptionRequest> = self
            .read()?
            .redemptions
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    pub fn counts(&self) -> AppResult<StoreCounts> {
        let tables = self.read()?;
        Ok(StoreCounts {
            users: tables.users.len(),
            reports: tables.reports.len(),
            pending_reports: tables
                .reports
                .values()
                .filter(|r| r.status == ReviewStatus::Pending)
                .count(),
            spam_reports: tables.reports.values().filter(|r| r.is_spam).count(),
            redemptions: tables.redemptions.len(),
            pending_redemptions: tables
                .redemptions
                .values()
                .filter(|r| r.status == ReviewStatus::Pending)
                .count(),
        })
    }
}

fn find_similar(tables: &Snapshot, hash: &ImageHash, threshold: u32) -> Option<Uuid> {
    if threshold == 0 {
        let hex = hash.to_hex();
        return tables
            .reports
            .values()
            .find(|r| r.image_hash == hex)
            .map(|r| r.id);
    }

    tables
        .reports
        .values()
        .find(|r| {
            ImageHash::from_hex(&r.image_hash)
                .map(|stored| stored.hamming(hash) <= threshold)
                .unwrap_or(false)
        })
        .map(|r| r.id)
}

fn find_by_client_ref(tables: &Snapshot, user_id: i64, client_ref: Uuid) -> Option<&PotholeReport> {
    tables
        .reports
        .values()
        .find(|r| r.user_id == Some(user_id) && r.client_ref == Some(client_ref))
}

fn sort_newest_first(reports: &mut [PotholeReport]) {
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn report(user_id: i64, hash: &str, created_at: DateTime<Utc>) -> PotholeReport {
        PotholeReport {
            id: Uuid::new_v4(),
            user_id: Some(user_id),
            image: "/media/potholes/p.jpg".into(),
            image_hash: hash.to_string(),
            latitude: 5.6037,
            longitude: -0.187,
            region: Region::GreaterAccra,
            severity: 4,
            ai_valid: true,
            ai_score: Some(0.95),
            status: ReviewStatus::Pending,
            is_spam: false,
            submitted_ip: Some("41.66.1.2".into()),
            device_id: "device".into(),
            is_synced: true,
            client_ref: None,
            captured_at: None,
            approved_by: None,
            approved_at: None,
            rejection_reason: String::new(),
            points_awarded: 0,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_create_user_rejects_taken_username() {
        let store = Store::new();
        let (user, profile) = store
            .create_user("kofi", "hash".into(), "0244123456".into(), false)
            .unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(profile.user_id, 1);

        let err = store
            .create_user("kofi", "hash".into(), "0244123457".into(), false)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UsernameTaken);

        let (second, _) = store
            .create_user("ama", "hash".into(), "0244123457".into(), false)
            .unwrap();
        assert_eq!(second.id, 2);
    }

    #[test]
    fn test_similar_hash_threshold() {
        let store = Store::new();
        let base = "0".repeat(256);
        store.insert_report(report(1, &base, Utc::now())).unwrap();

        let exact = ImageHash::from_hex(&base).unwrap();
        assert!(store.find_similar_hash(&exact, 0).unwrap().is_some());

        // Three bits differ
        let near = ImageHash::from_hex(&format!("7{}", "0".repeat(255))).unwrap();
        assert!(store.find_similar_hash(&near, 0).unwrap().is_none());
        assert!(store.find_similar_hash(&near, 3).unwrap().is_some());
        assert!(store.find_similar_hash(&near, 2).unwrap().is_none());
    }

    #[test]
    fn test_checked_insert_rechecks_client_ref_and_hash() {
        let store = Store::new();
        let base = "0".repeat(256);
        let client_ref = Uuid::new_v4();

        let mut first = report(1, &base, Utc::now());
        first.client_ref = Some(client_ref);
        assert!(matches!(
            store.insert_report_checked(first.clone(), 0).unwrap(),
            ReportInsert::Inserted
        ));

        // Same capture uploaded again
        let mut again = report(1, &"f".repeat(256), Utc::now());
        again.client_ref = Some(client_ref);
        match store.insert_report_checked(again, 0).unwrap() {
            ReportInsert::Existing(existing) => assert_eq!(existing.id, first.id),
            other => panic!("unexpected {:?}", other),
        }

        // Another user's capture of the same photo
        let mut copy = report(2, &base, Utc::now());
        copy.client_ref = Some(client_ref);
        match store.insert_report_checked(copy, 0).unwrap() {
            ReportInsert::Duplicate(id) => assert_eq!(id, first.id),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.counts().unwrap().reports, 1);
    }

    #[test]
    fn test_recent_reports_use_capture_time() {
        let store = Store::new();
        let now = Utc::now();
        let mut offline = report(1, "a", now);
        offline.captured_at = Some(now - Duration::hours(3));
        store.insert_report(offline).unwrap();
        store.insert_report(report(1, "b", now)).unwrap();
        store.insert_report(report(2, "c", now)).unwrap();

        let since = now - Duration::minutes(5);
        assert_eq!(store.recent_reports_for_user(1, since).unwrap().len(), 1);
    }

    #[test]
    fn test_listing_order_and_filters() {
        let store = Store::new();
        let now = Utc::now();
        let old = report(1, "a", now - Duration::hours(1));
        let mut approved = report(1, "b", now);
        approved.status = ReviewStatus::Approved;
        let mut spam = report(2, "c", now);
        spam.status = ReviewStatus::Approved;
        spam.is_spam = true;
        spam.region = Region::Ashanti;

        store.insert_report(old.clone()).unwrap();
        store.insert_report(approved.clone()).unwrap();
        store.insert_report(spam).unwrap();

        let mine = store.reports_for_user(1).unwrap();
        assert_eq!(mine[0].id, approved.id);
        assert_eq!(mine[1].id, old.id);

        let public = store.public_reports(None).unwrap();
        assert_eq!(public.len(), 1);
        assert!(store.public_reports(Some(Region::Ashanti)).unwrap().is_empty());

        let filter = ReportFilter {
            region: Some(Region::Ashanti),
            ..Default::default()
        };
        assert_eq!(store.list_reports(&filter).unwrap().len(), 1);
    }

    #[test]
    fn test_redemption_reserves_points() {
        let store = Store::new();
        let (user, _) = store
            .create_user("kofi", "hash".into(), "0244123456".into(), false)
            .unwrap();
        store.update_profile(user.id, |p| p.points = 1000).unwrap();

        store
            .insert_redemption(user.id, 500, 5.0, "0244123456".into(), "RDM-1".into())
            .unwrap();
        assert_eq!(store.pending_redemption_points(user.id).unwrap(), 500);

        store
            .insert_redemption(user.id, 500, 5.0, "0244123456".into(), "RDM-2".into())
            .unwrap();
        let err = store
            .insert_redemption(user.id, 500, 5.0, "0244123456".into(), "RDM-3".into())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RewardInsufficientPoints);

        let history = store.redemptions_for_user(user.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].reference, "RDM-2");
    }

    #[test]
    fn test_search_profiles() {
        let store = Store::new();
        store.create_user("kofi", "h".into(), "0244123456".into(), false).unwrap();
        store.create_user("ama", "h".into(), "0554000000".into(), false).unwrap();

        assert_eq!(store.search_profiles(None).unwrap().len(), 2);
        assert_eq!(store.search_profiles(Some("KOF")).unwrap().len(), 1);
        assert_eq!(store.search_profiles(Some("0554")).unwrap()[0].0.username, "ama");
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = Store::new();
        store.create_user("kofi", "h".into(), "0244123456".into(), false).unwrap();
        store.insert_report(report(1, "abc", Utc::now())).unwrap();
        store.save_to(&path).await.unwrap();

        let loaded = Store::load_from(&path).unwrap();
        assert!(loaded.find_user_by_username("kofi").unwrap().is_some());
        assert_eq!(loaded.reports_for_user(1).unwrap().len(), 1);
        let (next, _) = loaded.create_user("ama", "h".into(), "0244123457".into(), false).unwrap();
        assert_eq!(next.id, 2);
    }
}
