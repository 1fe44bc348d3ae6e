//! IP reputation checker.
//!
//! A small web front end that takes an IP address from a form, looks it up
//! on AbuseIPDB and reports one of `malicious`, `clean`, `unknown`,
//! `invalid` or `error`.
//!
//! # Features
//!
//! - **Single lookup** - One GET per request, 90-day window, 8 second timeout, no retry
//! - **Fixed classification** - Score above 50 is malicious; zero score and zero reports is unknown
//! - **Opaque failures** - Upstream bodies and internal errors never reach the client
//! - **Optional rate limiting** - Per-client fixed window, installed at startup
//!
//! # Example Configuration
//!
//! ```yaml
//! abuseipdb:
//!   api_key: "${ABUSEIPDB_KEY}"
//!   max_age_days: 90
//!   timeout_ms: 8000
//!
//! rate_limit:
//!   enabled: true
//!   max_requests: 30
//!   window_seconds: 3600
//! ```

pub mod config;
pub mod error;
pub mod providers;
pub mod rate_limit;
pub mod server;
pub mod verdict;

pub use config::Config;
pub use server::{create_app, AppState};

use providers::abuseipdb::AbuseIPDBProvider;
use rate_limit::RateLimiter;
use std::sync::Arc;
use tracing::{info, warn};

/// Resolve the process-wide state and optional middleware from configuration.
///
/// A missing or unusable credential does not fail startup: the returned
/// state answers every request with 503.
pub fn build(config: &Config) -> (AppState, Option<Arc<RateLimiter>>) {
    let state = match config.api_key() {
        None => {
            warn!("ABUSEIPDB_KEY is not set; every request will return 503");
            AppState::unconfigured()
        }
        Some(_) => match AbuseIPDBProvider::new(config.abuseipdb.clone()) {
            Ok(provider) => {
                info!(
                    max_age_days = config.abuseipdb.max_age_days,
                    timeout_ms = config.abuseipdb.timeout_ms,
                    "AbuseIPDB provider enabled"
                );
                AppState::new(Arc::new(provider))
            }
            Err(e) => {
                warn!(error = %e, "AbuseIPDB provider unavailable; every request will return 503");
                AppState::unconfigured()
            }
        },
    };

    let limiter = RateLimiter::from_config(&config.rate_limit).map(Arc::new);
    if rate_limit::is_active(limiter.as_ref()) {
        info!(
            max_requests = config.rate_limit.max_requests,
            window_seconds = config.rate_limit.window_seconds,
            "Rate limiting enabled"
        );
    } else {
        info!("Rate limiting disabled");
    }

    (state, limiter)
}
