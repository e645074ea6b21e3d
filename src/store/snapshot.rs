//! Store contents and their on-disk JSON form

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::errors::AppResult;
use crate::models::types::{PotholeReport, RedemptionRequest, ReviewStatus, User, UserProfile};

/// Every table, serialized as one JSON document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub next_user_id: i64,
    pub next_redemption_id: i64,
    pub users: BTreeMap<i64, User>,
    pub profiles: BTreeMap<i64, UserProfile>,
    pub reports: BTreeMap<Uuid, PotholeReport>,
    pub redemptions: BTreeMap<i64, RedemptionRequest>,
    /// Revoked refresh token ids and when each token expires
    #[serde(default)]
    pub revoked_tokens: BTreeMap<String, DateTime<Utc>>,
    /// Redemptions whose airtime call is in progress
    #[serde(skip)]
    pub payouts_in_flight: BTreeSet<i64>,
}

impl Snapshot {
    pub fn allocate_user_id(&mut self) -> i64 {
        self.next_user_id += 1;
        self.next_user_id
    }

    pub fn allocate_redemption_id(&mut self) -> i64 {
        self.next_redemption_id += 1;
        self.next_redemption_id
    }

    /// Points tied up in redemptions that have not been paid or refused
    pub fn pending_redemption_points(&self, user_id: i64) -> u32 {
        self.redemptions
            .values()
            .filter(|r| r.user_id == user_id && r.status == ReviewStatus::Pending)
            .map(|r| r.points)
            .sum()
    }

    /// Repair id counters after loading a hand-edited or older file
    fn normalize(&mut self) {
        let max_user = self.users.keys().next_back().copied().unwrap_or(0);
        let max_redemption = self.redemptions.keys().next_back().copied().unwrap_or(0);
        self.next_user_id = self.next_user_id.max(max_user);
        self.next_redemption_id = self.next_redemption_id.max(max_redemption);
    }
}

/// Write the snapshot atomically (temp file + rename)
pub async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> AppResult<()> {
    let json = serde_json::to_vec_pretty(snapshot)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &json).await?;
    tokio::fs::rename(&tmp, path).await?;

    info!(
        path = %path.display(),
        users = snapshot.users.len(),
        reports = snapshot.reports.len(),
        redemptions = snapshot.redemptions.len(),
        "Store snapshot written"
    );
    Ok(())
}

/// Read a snapshot; a missing file is an empty store
pub fn read_snapshot(path: &Path) -> AppResult<Snapshot> {
    if !path.exists() {
        warn!(path = %path.display(), "No snapshot found, starting empty");
        return Ok(Snapshot::default());
    }

    let raw = std::fs::read(path)?;
    let mut snapshot: Snapshot = serde_json::from_slice(&raw)?;
    snapshot.normalize();

    info!(
        path = %path.display(),
        users = snapshot.users.len(),
        reports = snapshot.reports.len(),
        "Store snapshot loaded"
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = read_snapshot(&dir.path().join("none.json")).unwrap();
        assert!(snapshot.users.is_empty());
        assert_eq!(snapshot.next_user_id, 0);
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("store.json");

        let mut snapshot = Snapshot::default();
        let id = snapshot.allocate_user_id();
        snapshot.profiles.insert(id, UserProfile::new(id, "0244123456".into()));

        write_snapshot(&path, &snapshot).await.unwrap();
        let loaded = read_snapshot(&path).unwrap();
        assert_eq!(loaded.next_user_id, 1);
        assert_eq!(loaded.profiles[&1].phone, "0244123456");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_normalize_repairs_counters() {
        let mut snapshot = Snapshot::default();
        snapshot.profiles.insert(7, UserProfile::new(7, "0244123456".into()));
        snapshot.users.insert(
            7,
            User {
                id: 7,
                username: "kofi".into(),
                password_hash: String::new(),
                is_staff: false,
                is_active: true,
                date_joined: chrono::Utc::now(),
            },
        );
        snapshot.normalize();
        assert_eq!(snapshot.allocate_user_id(), 8);
    }
}
