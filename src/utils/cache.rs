//! Revoked refresh-token cache
//!
//! Logout blacklists the refresh token's `jti` until the token would have
//! expired anyway; after that the entry is useless and is swept by the
//! periodic cleanup task.
//!
//! Features:
//! - Per-entry expiry taken from the token's own `exp`
//! - Thread-safe with DashMap
//! - Hit/miss counters for the admin stats endpoint
//! - Export/restore as wall-clock expiries for the store snapshot

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A revoked token id
#[derive(Clone, Debug)]
pub struct RevokedEntry {
    /// When the token was revoked
    pub revoked_at: Instant,
    /// How long the entry must be kept
    pub ttl: Duration,
}

impl RevokedEntry {
    pub fn is_expired(&self) -> bool {
        self.revoked_at.elapsed() > self.ttl
    }
}

/// Shared blacklist of refresh token ids
#[derive(Clone, Default)]
pub struct TokenBlacklist {
    store: Arc<DashMap<String, RevokedEntry>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl TokenBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke `jti` for `ttl`
    pub fn revoke(&self, jti: &str, ttl: Duration) {
        self.store.insert(
            jti.to_string(),
            RevokedEntry {
                revoked_at: Instant::now(),
                ttl,
            },
        );
        debug!(jti, ttl_secs = ttl.as_secs(), "Refresh token revoked");
    }

    /// Whether `jti` is currently revoked
    pub fn is_revoked(&self, jti: &str) -> bool {
        let revoked = match self.store.get(jti) {
            Some(entry) => !entry.is_expired(),
            None => false,
        };
        if revoked {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        revoked
    }

    /// Live revocations keyed by `jti`, with the time each token expires
    pub fn export(&self) -> BTreeMap<String, DateTime<Utc>> {
        let now = Utc::now();
        self.store
            .iter()
            .filter(|entry| !entry.is_expired())
            .filter_map(|entry| {
                let left = entry.ttl.saturating_sub(entry.revoked_at.elapsed());
                let left = chrono::Duration::from_std(left).ok()?;
                Some((entry.key().clone(), now + left))
            })
            .collect()
    }

    /// Re-add exported revocations, skipping tokens that have since expired
    pub fn restore(&self, entries: &BTreeMap<String, DateTime<Utc>>) -> usize {
        let now = Utc::now();
        let mut restored = 0;
        for (jti, expires_at) in entries {
            // Negative remaining time fails the conversion
            if let Ok(ttl) = (*expires_at - now).to_std() {
                self.revoke(jti, ttl);
                restored += 1;
            }
        }
        restored
    }

    /// Remove entries whose token has expired
    pub fn cleanup_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired());
        before - self.store.len()
    }

    pub fn stats(&self) -> BlacklistStats {
        BlacklistStats {
            entries: self.store.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Blacklist statistics for monitoring
#[derive(Debug, Clone, serde::Serialize)]
pub struct BlacklistStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}
