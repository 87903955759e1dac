//! Per-route request rate limiting over fixed one-second windows.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
struct Windows {
    by_route: HashMap<String, Window>,
    last_sweep: Instant,
}

impl Windows {
    /// Drop windows that have ended, at most once per window length.
    fn sweep(&mut self, now: Instant) {
        if now.duration_since(self.last_sweep) < WINDOW {
            return;
        }
        self.by_route
            .retain(|_, window| now.duration_since(window.started) < WINDOW);
        self.last_sweep = now;
    }
}

/// Counts requests per route uuid.
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<Windows>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self {
            windows: Mutex::new(Windows {
                by_route: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request for `uuid`; returns `true` when it exceeds `limit`
    /// requests in the current window.
    pub fn is_rate_limited(&self, uuid: &str, limit: u32) -> bool {
        self.is_rate_limited_at(uuid, limit, Instant::now())
    }

    fn is_rate_limited_at(&self, uuid: &str, limit: u32, now: Instant) -> bool {
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        windows.sweep(now);

        let window = windows.by_route.entry(uuid.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(window.started) >= WINDOW {
            window.started = now;
            window.count = 0;
        }

        window.count = window.count.saturating_add(1);
        window.count > limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_within_window() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for _ in 0..3 {
            assert!(!limiter.is_rate_limited_at("route", 3, now));
        }
        assert!(limiter.is_rate_limited_at("route", 3, now));
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        assert!(!limiter.is_rate_limited_at("route", 1, now));
        assert!(limiter.is_rate_limited_at("route", 1, now));
        assert!(!limiter.is_rate_limited_at("route", 1, now + WINDOW));
    }

    #[test]
    fn test_routes_are_independent() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        assert!(!limiter.is_rate_limited_at("a", 1, now));
        assert!(!limiter.is_rate_limited_at("b", 1, now));
        assert!(limiter.is_rate_limited_at("a", 1, now));
    }

    #[test]
    fn test_idle_routes_are_evicted() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        assert!(!limiter.is_rate_limited_at("deleted", 5, now));
        assert!(!limiter.is_rate_limited_at("active", 5, now));

        let later = now + WINDOW * 2;
        assert!(!limiter.is_rate_limited_at("active", 5, later));

        let windows = limiter.windows.lock().unwrap();
        assert_eq!(windows.by_route.len(), 1);
        assert!(windows.by_route.contains_key("active"));
    }

    #[test]
    fn test_sweep_keeps_current_windows() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        assert!(!limiter.is_rate_limited_at("route", 1, now + WINDOW));
        // Same window: the count survives the sweep
        assert!(limiter.is_rate_limited_at("route", 1, now + WINDOW));
    }

    #[test]
    fn test_zero_limit_blocks_everything() {
        let limiter = RateLimiter::new();
        assert!(limiter.is_rate_limited("route", 0));
    }
}
