//! Per-client fixed-window rate limiting.

use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use parking_lot::Mutex;
use serde_json::json;
use tracing::warn;

use crate::config::RateLimitConfig;

#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Arc<Mutex<HashMap<IpAddr, Window>>>,
}

struct Window {
    count: u32,
    started: Instant,
}

#[derive(Debug, PartialEq, Eq)]
enum Decision {
    Allowed { remaining: u32, reset_after: Duration },
    Exceeded { retry_after: Duration },
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn window(&self) -> Duration {
        self.config.window
    }

    fn check(&self, ip: IpAddr, now: Instant) -> Decision {
        let mut state = self.state.lock();
        let entry = state.entry(ip).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.duration_since(entry.started) >= self.config.window {
            entry.count = 0;
            entry.started = now;
        }

        let reset_after = (entry.started + self.config.window).saturating_duration_since(now);
        if entry.count >= self.config.max_requests {
            return Decision::Exceeded {
                retry_after: reset_after,
            };
        }

        entry.count += 1;
        Decision::Allowed {
            remaining: self.config.max_requests - entry.count,
            reset_after,
        }
    }

    /// Drops windows that have fully elapsed.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window = self.config.window;
        self.state
            .lock()
            .retain(|_, w| now.duration_since(w.started) < window);
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.state.lock().len()
    }
}

/// Rejects a client with 429 once it has made `max_requests` requests in the
/// current window. Requests without connection info share a single bucket.
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    let limit = limiter.config.max_requests;
    match limiter.check(ip, Instant::now()) {
        Decision::Allowed {
            remaining,
            reset_after,
        } => {
            let mut res = next.run(request).await;
            set_headers(&mut res, limit, remaining, reset_after);
            res
        }
        Decision::Exceeded { retry_after } => {
            let secs = ceil_secs(retry_after);
            warn!(ip = %ip, retry_after_secs = secs, "rate limit exceeded");
            let mut res = (
                StatusCode::TOO_MANY_REQUESTS,
                [("retry-after", secs.to_string())],
                Json(json!({
                    "error": "too many requests, please try again later",
                    "retryAfterSeconds": secs,
                })),
            )
                .into_response();
            set_headers(&mut res, limit, 0, retry_after);
            res
        }
    }
}

fn set_headers(res: &mut Response, limit: u32, remaining: u32, reset_after: Duration) {
    let headers = res.headers_mut();
    headers.insert(HeaderName::from_static("ratelimit-limit"), HeaderValue::from(limit));
    headers.insert(
        HeaderName::from_static("ratelimit-remaining"),
        HeaderValue::from(remaining),
    );
    headers.insert(
        HeaderName::from_static("ratelimit-reset"),
        HeaderValue::from(ceil_secs(reset_after)),
    );
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            window: Duration::from_secs(window_secs),
            max_requests,
        })
    }

    #[test]
    fn allows_up_to_max_then_rejects() {
        let l = limiter(3, 60);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let now = Instant::now();

        for expected_remaining in [2, 1, 0] {
            match l.check(ip, now) {
                Decision::Allowed { remaining, .. } => assert_eq!(remaining, expected_remaining),
                other => panic!("should be allowed, got {other:?}"),
            }
        }
        assert!(matches!(l.check(ip, now), Decision::Exceeded { .. }));
    }

    #[test]
    fn window_resets() {
        let l = limiter(1, 60);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let start = Instant::now();

        assert!(matches!(l.check(ip, start), Decision::Allowed { .. }));
        match l.check(ip, start + Duration::from_secs(20)) {
            Decision::Exceeded { retry_after } => assert_eq!(retry_after, Duration::from_secs(40)),
            other => panic!("should be exceeded, got {other:?}"),
        }
        assert!(matches!(
            l.check(ip, start + Duration::from_secs(60)),
            Decision::Allowed { .. }
        ));
    }

    #[test]
    fn clients_are_counted_separately() {
        let l = limiter(1, 60);
        let now = Instant::now();
        assert!(matches!(l.check("10.0.0.1".parse().unwrap(), now), Decision::Allowed { .. }));
        assert!(matches!(l.check("10.0.0.2".parse().unwrap(), now), Decision::Allowed { .. }));
        assert!(matches!(l.check("10.0.0.1".parse().unwrap(), now), Decision::Exceeded { .. }));
    }

    #[test]
    fn zero_max_rejects_everything() {
        let l = limiter(0, 60);
        assert!(matches!(
            l.check("10.0.0.1".parse().unwrap(), Instant::now()),
            Decision::Exceeded { .. }
        ));
    }

    #[test]
    fn cleanup_keeps_live_windows() {
        let l = limiter(5, 3600);
        l.check("10.0.0.1".parse().unwrap(), Instant::now());
        l.cleanup();
        assert_eq!(l.tracked(), 1);
    }

    #[test]
    fn ceil_secs_rounds_up() {
        assert_eq!(ceil_secs(Duration::from_millis(1500)), 2);
        assert_eq!(ceil_secs(Duration::from_secs(3)), 3);
        assert_eq!(ceil_secs(Duration::ZERO), 0);
    }
}
