//! Per-identity failed-login counter with a sliding lockout window.
//!
//! Each identity owns one cache entry keyed `attempt:<identity>` whose value is the
//! number of consecutive failures and whose TTL is the lockout window. A single read
//! therefore answers both "how many failures" and "how long until reset".
//! Every failure restarts the TTL, so continued attempts keep pushing the reset out.

use crate::cache::ExpiringCache;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

const KEY_PREFIX: &str = "attempt:";

/// Failure reported by an attempt store backend (for example a remote cache).
#[derive(Debug, Error)]
#[error("attempt store unavailable: {0}")]
pub struct CacheError(pub String);

/// Storage for attempt counters.
///
/// `increment` must be atomic per key: concurrent increments of one key may not be
/// lost.
pub trait AttemptStore: Send + Sync {
    /// Current count and remaining TTL for `key`, `None` if absent or expired.
    fn read(&self, key: &str) -> Result<Option<(u32, Duration)>, CacheError>;
    /// Add one to the count under `key` (starting at 1) and restart its TTL.
    fn increment(&self, key: &str, ttl: Duration) -> Result<u32, CacheError>;
    fn clear(&self, key: &str) -> Result<(), CacheError>;
}

impl AttemptStore for ExpiringCache<u32> {
    fn read(&self, key: &str) -> Result<Option<(u32, Duration)>, CacheError> {
        Ok(self.get_with_ttl(key))
    }

    fn increment(&self, key: &str, ttl: Duration) -> Result<u32, CacheError> {
        Ok(self.update(key, ttl, |current| {
            current.map_or(1, |count| count.saturating_add(1))
        }))
    }

    fn clear(&self, key: &str) -> Result<(), CacheError> {
        self.delete(key);
        Ok(())
    }
}

/// Outcome of `AttemptLimiter::check`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttemptStatus {
    pub blocked: bool,
    pub retry_after: Duration,
}

impl AttemptStatus {
    const ALLOWED: Self = Self {
        blocked: false,
        retry_after: Duration::ZERO,
    };
}

/// Read-only projection of an identity's counter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptRecord {
    pub identity: String,
    pub count: u32,
    pub remaining_lockout: Duration,
}

pub struct AttemptLimiter {
    store: Arc<dyn AttemptStore>,
    max_attempts: u32,
    lockout_window: Duration,
}

impl AttemptLimiter {
    /// `max_attempts` below 1 is raised to 1 and `lockout_window` to one second.
    #[must_use]
    pub fn new(store: Arc<dyn AttemptStore>, max_attempts: u32, lockout_window: Duration) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            lockout_window: lockout_window.max(Duration::from_secs(1)),
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Report whether `identity` is locked out and for how long.
    ///
    /// A store read failure is logged and treated as "no record".
    pub fn check(&self, identity: &str) -> AttemptStatus {
        match self.record(identity) {
            Some(record) if record.count >= self.max_attempts => AttemptStatus {
                blocked: true,
                retry_after: record.remaining_lockout,
            },
            _ => AttemptStatus::ALLOWED,
        }
    }

    /// Current counter for `identity`, if any.
    pub fn record(&self, identity: &str) -> Option<AttemptRecord> {
        match self.store.read(&attempts_key(identity)) {
            Ok(entry) => entry.map(|(count, remaining_lockout)| AttemptRecord {
                identity: identity.to_string(),
                count,
                remaining_lockout,
            }),
            Err(err) => {
                error!("Failed to read login attempts: {err}");
                None
            }
        }
    }

    /// Count one more failure and restart the lockout window.
    ///
    /// Returns the new count, or `None` if the store could not be updated.
    pub fn record_failure(&self, identity: &str) -> Option<u32> {
        match self
            .store
            .increment(&attempts_key(identity), self.lockout_window)
        {
            Ok(count) => {
                if count == self.max_attempts {
                    warn!(
                        lockout_seconds = self.lockout_window.as_secs(),
                        "Login attempts exhausted, identity locked out"
                    );
                } else {
                    debug!(count, "Recorded failed login attempt");
                }
                Some(count)
            }
            Err(err) => {
                error!("Failed to record login failure: {err}");
                None
            }
        }
    }

    /// Forget every failure recorded for `identity`.
    pub fn record_success(&self, identity: &str) {
        if let Err(err) = self.store.clear(&attempts_key(identity)) {
            error!("Failed to clear login attempts: {err}");
        }
    }
}

fn attempts_key(identity: &str) -> String {
    format!("{KEY_PREFIX}{identity}")
}
