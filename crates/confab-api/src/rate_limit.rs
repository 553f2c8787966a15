//! Sliding-window rate limiting for message creation.
//!
//! State is process-local and reset on restart. Each client gets an ordered
//! window of recent request instants; the limiter is consulted after the
//! access policy has passed and before the store mutation, so a rejected
//! request never mutates anything — not even its own window.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use std::sync::Mutex;

/// Qualifying requests allowed per client inside one window.
const MAX_REQUESTS: usize = 5;

/// Sliding window length.
const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct RateLimitError {
    pub retry_after_secs: u64,
}

pub struct RateLimiter {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record-or-reject for one qualifying request.
    ///
    /// A single lock acquisition covers prune, check, and record, so two
    /// concurrent requests from one client cannot both take the last slot.
    /// Callers pass `Instant::now()`; tests pass synthetic instants.
    pub fn allow(&self, client: &str, now: Instant) -> Result<(), RateLimitError> {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let window = windows.entry(client.to_string()).or_default();

        while let Some(&front) = window.front() {
            if now.duration_since(front) > WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= MAX_REQUESTS {
            let oldest = window.front().copied().unwrap_or(now);
            let retry_after = WINDOW.saturating_sub(now.duration_since(oldest)).as_secs();
            return Err(RateLimitError {
                retry_after_secs: retry_after,
            });
        }

        window.push_back(now);
        Ok(())
    }

    /// Drop clients whose entire window has expired. Without this the key
    /// space grows by one entry per distinct client ever seen; the server
    /// runs it on an interval.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let before = windows.len();
        windows.retain(|_, window| {
            window
                .back()
                .is_some_and(|&last| now.duration_since(last) <= WINDOW)
        });
        before - windows.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve the client identity: the first `x-forwarded-for` entry when
/// present, else the peer address. Trusting the header is a deployment
/// assumption — it is only correct behind a reverse proxy that sets it.
pub fn client_key(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_requests_in_window_all_pass() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();

        for i in 0..5 {
            limiter
                .allow("10.0.0.1", t0 + Duration::from_secs(i * 2))
                .expect("should be under limit");
        }
    }

    #[test]
    fn sixth_request_in_window_is_denied() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();

        for i in 0..5 {
            limiter.allow("10.0.0.1", t0 + Duration::from_secs(i)).unwrap();
        }

        let err = limiter
            .allow("10.0.0.1", t0 + Duration::from_secs(10))
            .unwrap_err();
        assert!(err.retry_after_secs <= 60);
    }

    #[test]
    fn window_slides_past_old_requests() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();

        for i in 0..5 {
            limiter.allow("10.0.0.1", t0 + Duration::from_secs(i)).unwrap();
        }
        assert!(limiter.allow("10.0.0.1", t0 + Duration::from_secs(30)).is_err());

        // 61s after the first request, the oldest slot has expired.
        assert!(limiter.allow("10.0.0.1", t0 + Duration::from_secs(61)).is_ok());
    }

    #[test]
    fn denied_requests_are_not_recorded() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();

        for i in 0..5 {
            limiter.allow("10.0.0.1", t0 + Duration::from_secs(i)).unwrap();
        }
        // Hammering while denied must not extend the lockout.
        for i in 10..50 {
            let _ = limiter.allow("10.0.0.1", t0 + Duration::from_secs(i));
        }

        assert!(limiter.allow("10.0.0.1", t0 + Duration::from_secs(65)).is_ok());
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();

        for i in 0..5 {
            limiter.allow("10.0.0.1", t0 + Duration::from_secs(i)).unwrap();
        }
        assert!(limiter.allow("10.0.0.1", t0 + Duration::from_secs(10)).is_err());
        assert!(limiter.allow("10.0.0.2", t0 + Duration::from_secs(10)).is_ok());
    }

    #[test]
    fn sweep_drops_only_stale_clients() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();

        limiter.allow("stale", t0).unwrap();
        limiter.allow("fresh", t0 + Duration::from_secs(90)).unwrap();

        let dropped = limiter.sweep(t0 + Duration::from_secs(120));
        assert_eq!(dropped, 1);

        // The fresh client's window still counts its request.
        for _ in 0..4 {
            limiter.allow("fresh", t0 + Duration::from_secs(100)).unwrap();
        }
        assert!(limiter.allow("fresh", t0 + Duration::from_secs(100)).is_err());
    }

    #[test]
    fn client_key_prefers_forwarded_for() {
        let peer: SocketAddr = "203.0.113.9:55000".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "198.51.100.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_key(&headers, peer), "198.51.100.7");

        let empty = HeaderMap::new();
        assert_eq!(client_key(&empty, peer), "203.0.113.9");
    }
}
