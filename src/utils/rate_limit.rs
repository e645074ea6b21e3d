//! Fixed-window rate limiter
//!
//! Used both by the global API middleware (per client) and by report
//! screening (per user and per IP). Counters live in a DashMap, so checks
//! from concurrent requests never take a global lock.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Rate limiter configuration
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Requests per window
    pub requests_per_window: u32,
    /// Window duration
    pub window_duration: Duration,
}

impl RateLimitConfig {
    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests, Duration::from_secs(60))
    }

    pub fn new(requests_per_window: u32, window_duration: Duration) -> Self {
        Self {
            requests_per_window,
            window_duration,
        }
    }
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_secs: u64,
}

/// In-memory rate limiter
pub struct RateLimiter {
    /// Request count and window start per key
    requests: DashMap<String, (u32, Instant)>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            requests: DashMap::new(),
            config,
        }
    }

    /// Count one request against `key`; a refused request is not counted
    pub fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();

        let mut entry = self.requests.entry(key.to_string()).or_insert((0, now));

        // Reset window if expired
        if now.duration_since(entry.1) > self.config.window_duration {
            entry.0 = 0;
            entry.1 = now;
        }

        let reset_secs = self
            .config
            .window_duration
            .saturating_sub(now.duration_since(entry.1))
            .as_secs();

        if entry.0 >= self.config.requests_per_window {
            return RateDecision {
                allowed: false,
                remaining: 0,
                reset_secs,
            };
        }

        entry.0 += 1;
        RateDecision {
            allowed: true,
            remaining: self.config.requests_per_window - entry.0,
            reset_secs,
        }
    }

    /// True when `key` is over its budget (counts the attempt otherwise)
    #[cfg(test)]
    fn is_limited(&self, key: &str) -> bool {
        !self.check(key).allowed
    }

    /// Drop stale windows; returns how many were removed
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.requests.len();
        self.requests.retain(|_, (_, started)| {
            now.duration_since(*started) < self.config.window_duration * 2
        });
        before - self.requests.len()
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.requests.len()
    }
}
