use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after_secs: u64,
}

/// Per-key sliding-window rate limiter.
///
/// Each key gets `max_per_window` allowed calls within `window`. After the
/// window elapses since the first call in the current window, the counter
/// resets automatically.
pub struct RateLimiter<K: Eq + Hash> {
    window: Mutex<HashMap<K, (u32, Instant)>>,
    max_per_window: u32,
    window_duration: Duration,
}

impl<K: Eq + Hash> RateLimiter<K> {
    const EVICTION_THRESHOLD: usize = 10_000;

    pub fn new(max_per_window: u32, window_secs: u64) -> Self {
        Self {
            window: Mutex::new(HashMap::new()),
            max_per_window,
            window_duration: Duration::from_secs(window_secs),
        }
    }

    // `guard` must outlive `entry` because `entry` borrows from the HashMap behind the lock.
    #[allow(clippy::significant_drop_tightening)]
    pub fn check_and_increment(&self, key: K) -> RateLimitResult {
        let now = Instant::now();
        let mut guard = self
            .window
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if guard.len() > Self::EVICTION_THRESHOLD {
            guard.retain(|_, (_, ts)| now.duration_since(*ts) < self.window_duration);
        }

        let entry = guard.entry(key).or_insert((0, now));

        if now.duration_since(entry.1) >= self.window_duration {
            *entry = (1, now);
            return RateLimitResult {
                allowed: true,
                limit: self.max_per_window,
                remaining: self.max_per_window.saturating_sub(1),
                reset_after_secs: self.window_duration.as_secs(),
            };
        }

        let reset_after_secs = self
            .window_duration
            .saturating_sub(now.duration_since(entry.1))
            .as_secs();

        if entry.0 >= self.max_per_window {
            return RateLimitResult {
                allowed: false,
                limit: self.max_per_window,
                remaining: 0,
                reset_after_secs,
            };
        }

        entry.0 += 1;
        RateLimitResult {
            allowed: true,
            limit: self.max_per_window,
            remaining: self.max_per_window.saturating_sub(entry.0),
            reset_after_secs,
        }
    }
}

/// Rate limiter keyed by client IP; guards upload and login endpoints.
pub type IpRateLimiter = RateLimiter<String>;

/// Rate limiter keyed by staff id; guards the bulk-upload endpoint per
/// uploading staff member rather than per IP.
pub type StaffRateLimiter = RateLimiter<i64>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn allows_calls_within_limit() {
        let limiter = IpRateLimiter::new(3, 3600);
        let ip = "127.0.0.1".to_string();
        assert!(limiter.check_and_increment(ip.clone()).allowed);
        assert!(limiter.check_and_increment(ip.clone()).allowed);
        assert!(limiter.check_and_increment(ip).allowed);
    }

    #[test]
    fn blocks_calls_over_limit() {
        let limiter = IpRateLimiter::new(2, 3600);
        let ip = "10.0.0.5".to_string();
        assert!(limiter.check_and_increment(ip.clone()).allowed);
        assert!(limiter.check_and_increment(ip.clone()).allowed);
        assert!(!limiter.check_and_increment(ip.clone()).allowed);
        assert!(!limiter.check_and_increment(ip).allowed);
    }

    #[test]
    fn different_keys_are_independent() {
        let limiter = IpRateLimiter::new(1, 3600);
        assert!(limiter.check_and_increment("1.1.1.1".to_string()).allowed);
        assert!(!limiter.check_and_increment("1.1.1.1".to_string()).allowed);
        assert!(limiter.check_and_increment("2.2.2.2".to_string()).allowed);
    }

    #[test]
    fn staff_rate_limiter_basic() {
        let limiter = StaffRateLimiter::new(2, 60);
        assert!(limiter.check_and_increment(42).allowed);
        assert!(limiter.check_and_increment(42).allowed);
        assert!(!limiter.check_and_increment(42).allowed);
    }

    #[test]
    fn result_remaining_decrements_correctly() {
        let limiter = IpRateLimiter::new(3, 3600);
        let ip = "9.9.9.9".to_string();
        let r1 = limiter.check_and_increment(ip.clone());
        assert_eq!(r1.remaining, 2);
        assert_eq!(r1.limit, 3);

        let r2 = limiter.check_and_increment(ip.clone());
        assert_eq!(r2.remaining, 1);

        let r3 = limiter.check_and_increment(ip.clone());
        assert_eq!(r3.remaining, 0);
        assert!(r3.allowed);

        let r4 = limiter.check_and_increment(ip);
        assert_eq!(r4.remaining, 0);
        assert!(!r4.allowed);
    }

    #[test]
    fn result_reset_after_within_window() {
        let limiter = IpRateLimiter::new(10, 3600);
        let r = limiter.check_and_increment("5.5.5.5".to_string());
        assert!(r.reset_after_secs <= 3600);
        assert!(r.reset_after_secs >= 3599);
    }

    #[test]
    fn eviction_removes_expired_entries() {
        let limiter = IpRateLimiter::new(100, 1);

        for i in 0..=IpRateLimiter::EVICTION_THRESHOLD {
            limiter.check_and_increment(format!("10.0.{}.{}", i / 256, i % 256));
        }

        let count_before = limiter.window.lock().unwrap().len();
        assert!(
            count_before > IpRateLimiter::EVICTION_THRESHOLD,
            "should have > threshold entries before eviction"
        );

        std::thread::sleep(std::time::Duration::from_millis(1100));

        limiter.check_and_increment("trigger".to_string());
        let count_after = limiter.window.lock().unwrap().len();
        assert_eq!(
            count_after, 1,
            "all expired entries should be evicted, only 'trigger' remains"
        );
    }
}
