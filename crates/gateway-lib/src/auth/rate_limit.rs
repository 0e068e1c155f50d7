// ============================
// crates/gateway-lib/src/auth/rate_limit.rs
// ============================
//! Rate limiting for authentication attempts.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Default number of failed attempts before rate limiting
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default lockout duration (5 minutes)
const DEFAULT_LOCKOUT_DURATION: Duration = Duration::from_secs(5 * 60);

/// Entry in the rate limit map
#[derive(Debug, Clone)]
struct RateLimitEntry {
    /// Number of failed attempts
    failed_attempts: u32,
    /// Time of the last failed attempt
    last_failure: Instant,
    /// When the lockout expires
    lockout_expiry: Option<Instant>,
}

/// Rate limiter for `authenticate` attempts, keyed by connection
#[derive(Debug, Clone)]
pub struct AuthRateLimiter {
    attempts: Arc<DashMap<Uuid, RateLimitEntry>>,
    /// Maximum number of failed attempts before lockout
    max_attempts: u32,
    /// Duration of lockout period
    lockout_duration: Duration,
}

impl Default for AuthRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_LOCKOUT_DURATION)
    }
}

impl AuthRateLimiter {
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            attempts: Arc::new(DashMap::new()),
            max_attempts,
            lockout_duration,
        }
    }

    /// Record a failed authentication attempt
    pub fn record_failed_attempt(&self, connection_id: Uuid) {
        let now = Instant::now();

        let mut entry = self
            .attempts
            .entry(connection_id)
            .or_insert_with(|| RateLimitEntry {
                failed_attempts: 0,
                last_failure: now,
                lockout_expiry: None,
            });

        // Reset if a previous lockout has expired
        if let Some(expiry) = entry.lockout_expiry {
            if now > expiry {
                entry.failed_attempts = 0;
                entry.lockout_expiry = None;
            }
        }

        entry.failed_attempts += 1;
        entry.last_failure = now;

        if entry.failed_attempts >= self.max_attempts {
            entry.lockout_expiry = Some(now + self.lockout_duration);
            tracing::warn!(%connection_id, "connection locked out for authentication attempts");
        }
    }

    /// Record a successful authentication
    pub fn record_success(&self, connection_id: Uuid) {
        self.attempts.remove(&connection_id);
    }

    /// Drop all state for a closed connection
    pub fn forget(&self, connection_id: Uuid) {
        self.attempts.remove(&connection_id);
    }

    /// Check if a connection is allowed to attempt authentication
    pub fn check_rate_limit(&self, connection_id: Uuid) -> bool {
        if let Some(entry) = self.attempts.get(&connection_id) {
            if let Some(expiry) = entry.lockout_expiry {
                if Instant::now() < expiry {
                    return false;
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_until_max_attempts() {
        let limiter = AuthRateLimiter::new(3, Duration::from_secs(60));
        let conn = Uuid::new_v4();

        limiter.record_failed_attempt(conn);
        limiter.record_failed_attempt(conn);
        assert!(limiter.check_rate_limit(conn));

        limiter.record_failed_attempt(conn);
        assert!(!limiter.check_rate_limit(conn));
    }

    #[test]
    fn test_success_clears_history() {
        let limiter = AuthRateLimiter::new(2, Duration::from_secs(60));
        let conn = Uuid::new_v4();

        limiter.record_failed_attempt(conn);
        limiter.record_success(conn);
        limiter.record_failed_attempt(conn);
        assert!(limiter.check_rate_limit(conn));
    }

    #[test]
    fn test_lockout_expires() {
        let limiter = AuthRateLimiter::new(1, Duration::from_millis(10));
        let conn = Uuid::new_v4();

        limiter.record_failed_attempt(conn);
        assert!(!limiter.check_rate_limit(conn));

        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.check_rate_limit(conn));
    }

    #[test]
    fn test_connections_are_independent() {
        let limiter = AuthRateLimiter::new(1, Duration::from_secs(60));
        let locked = Uuid::new_v4();
        let other = Uuid::new_v4();

        limiter.record_failed_attempt(locked);
        assert!(!limiter.check_rate_limit(locked));
        assert!(limiter.check_rate_limit(other));
    }
}
