//! IP reputation providers.

pub mod abuseipdb;

use async_trait::async_trait;
use std::net::IpAddr;
use thiserror::Error;

/// A validated lookup. The address is kept as submitted (trimmed); upstream
/// receives this spelling, not the canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    ip_address: String,
    ip: IpAddr,
}

impl LookupRequest {
    /// Trim and validate user input. `None` if it is not an IPv4/IPv6 address.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let ip = trimmed.parse().ok()?;
        Some(Self {
            ip_address: trimmed.to_string(),
            ip,
        })
    }

    /// The address as submitted.
    pub fn ip_address(&self) -> &str {
        &self.ip_address
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }
}

/// Raw reputation data returned by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reputation {
    /// Abuse confidence score (0-100, higher = worse).
    pub score: u8,

    /// Number of abuse reports in the queried window.
    pub reports: u64,
}

impl Reputation {
    pub fn new(score: u8, reports: u64) -> Self {
        Self { score, reports }
    }
}

/// Error from a reputation provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Upstream answered with a non-200 status.
    #[error("upstream returned HTTP {0}")]
    Status(u16),

    /// Request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection, DNS or transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// Body was not valid JSON.
    #[error("invalid JSON: {0}")]
    Parse(String),

    /// Body was JSON but not of the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// API key cannot be sent as a header value.
    #[error("invalid API credential")]
    InvalidCredential,
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

/// Trait for IP reputation providers.
#[async_trait]
pub trait ReputationProvider: Send + Sync {
    /// Look up the reputation of an IP address. Makes exactly one attempt.
    async fn check(&self, request: &LookupRequest) -> Result<Reputation, ProviderError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}
