//! Fixed-window request limiting per client IP.
//!
//! The limiter is optional middleware: it is built at startup only when
//! enabled in configuration, and the request handler never refers to it.

use crate::config::RateLimitConfig;
use crate::verdict::LookupResult;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Requests seen from one client in the current window.
#[derive(Debug, Clone)]
struct Window {
    started: Instant,
    count: u32,
}

impl Window {
    fn is_expired(&self, length: Duration) -> bool {
        self.started.elapsed() >= length
    }
}

/// Outcome of recording one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// Thread-safe fixed-window limiter keyed by client IP.
pub struct RateLimiter {
    windows: RwLock<HashMap<IpAddr, Window>>,
    max_requests: u32,
    window: Duration,
    max_clients: usize,
    client_ip_headers: Vec<String>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, max_clients: usize) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            max_requests,
            window,
            max_clients,
            client_ip_headers: Vec::new(),
        }
    }

    /// Build the limiter if configuration enables it.
    pub fn from_config(config: &RateLimitConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let mut limiter = Self::new(
            config.max_requests,
            Duration::from_secs(config.window_seconds),
            config.max_tracked_clients,
        );
        limiter.client_ip_headers = config
            .client_ip_headers
            .iter()
            .map(|h| h.to_lowercase())
            .collect();
        Some(limiter)
    }

    /// Requests allowed per window.
    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    /// Record one request from `ip`.
    pub fn check(&self, ip: IpAddr) -> RateDecision {
        let Ok(mut windows) = self.windows.write() else {
            // Poisoned lock: fail open.
            return RateDecision::Allowed {
                remaining: self.max_requests,
            };
        };

        if windows.len() >= self.max_clients && !windows.contains_key(&ip) {
            self.evict(&mut windows);
        }

        let window = windows.entry(ip).or_insert_with(|| Window {
            started: Instant::now(),
            count: 0,
        });

        if window.is_expired(self.window) {
            window.started = Instant::now();
            window.count = 0;
        }

        if window.count >= self.max_requests {
            let retry_after = self.window.saturating_sub(window.started.elapsed());
            return RateDecision::Limited { retry_after };
        }

        window.count += 1;
        RateDecision::Allowed {
            remaining: self.max_requests - window.count,
        }
    }

    fn evict(&self, windows: &mut HashMap<IpAddr, Window>) {
        windows.retain(|_, w| !w.is_expired(self.window));

        if windows.len() >= self.max_clients {
            if let Some(oldest) = windows
                .iter()
                .min_by_key(|(_, w)| w.started)
                .map(|(ip, _)| *ip)
            {
                windows.remove(&oldest);
            }
        }
    }

    /// Remove expired windows.
    pub fn cleanup(&self) {
        if let Ok(mut windows) = self.windows.write() {
            windows.retain(|_, w| !w.is_expired(self.window));
        }
    }

    /// Number of clients currently tracked.
    pub fn len(&self) -> usize {
        self.windows.read().map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identify the client: configured headers first, then the peer address.
    fn client_ip(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
        extract_client_ip(headers, &self.client_ip_headers).or(peer.map(|addr| addr.ip()))
    }
}

/// Whether a limiter was installed at startup.
pub fn is_active(limiter: Option<&Arc<RateLimiter>>) -> bool {
    limiter.is_some()
}

/// Extract client IP from request headers, using the first entry of a
/// comma-separated list (`X-Forwarded-For: client, proxy1, proxy2`).
pub fn extract_client_ip(headers: &HeaderMap, names: &[String]) -> Option<IpAddr> {
    for name in names {
        let Some(value) = headers.get(name.as_str()).and_then(|v| v.to_str().ok()) else {
            continue;
        };

        if let Some(ip) = value.split(',').next().and_then(|s| s.trim().parse().ok()) {
            return Some(ip);
        }
    }
    None
}

/// Middleware enforcing the limiter.
pub async fn limit_by_client(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let Some(ip) = limiter.client_ip(request.headers(), peer) else {
        debug!("No client IP available, skipping rate limit");
        return next.run(request).await;
    };

    match limiter.check(ip) {
        RateDecision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(limiter.limit()));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
        RateDecision::Limited { retry_after } => {
            warn!(ip = %ip, limit = limiter.limit(), "Rate limit exceeded");
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(LookupResult::error("Too many requests.")),
            )
                .into_response();
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(limiter.limit()));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
            headers.insert(
                "retry-after",
                HeaderValue::from(retry_after.as_secs().max(1)),
            );
            response
        }
    }
}
