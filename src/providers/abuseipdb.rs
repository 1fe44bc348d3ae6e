//! AbuseIPDB reputation provider.

use super::{LookupRequest, ProviderError, Reputation, ReputationProvider};
use crate::config::AbuseIPDBConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// AbuseIPDB API response.
#[derive(Debug, Deserialize)]
struct AbuseIPDBResponse {
    #[serde(default)]
    data: AbuseIPDBData,
}

/// AbuseIPDB API response data.
#[derive(Debug, Default, Deserialize)]
struct AbuseIPDBData {
    /// Abuse confidence score (0-100).
    #[serde(rename = "abuseConfidenceScore", default)]
    abuse_confidence_score: u8,

    /// Total number of reports.
    #[serde(rename = "totalReports", default)]
    total_reports: u64,

    #[serde(rename = "isTor", default)]
    is_tor: Option<bool>,

    #[serde(rename = "countryCode", default)]
    country_code: Option<String>,
}

/// AbuseIPDB reputation provider.
pub struct AbuseIPDBProvider {
    config: AbuseIPDBConfig,
    api_key: HeaderValue,
    client: Client,
}

impl AbuseIPDBProvider {
    /// Create a new AbuseIPDB provider.
    pub fn new(config: AbuseIPDBConfig) -> Result<Self, ProviderError> {
        let key = config.api_key.trim();
        if key.is_empty() {
            return Err(ProviderError::InvalidCredential);
        }
        let mut api_key =
            HeaderValue::from_str(key).map_err(|_| ProviderError::InvalidCredential)?;
        api_key.set_sensitive(true);

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }
}

/// Decode a 200 response body.
fn parse_body(body: &[u8]) -> Result<Reputation, ProviderError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    let response: AbuseIPDBResponse =
        serde_json::from_value(value).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    let data = response.data;
    debug!(
        score = data.abuse_confidence_score,
        reports = data.total_reports,
        is_tor = ?data.is_tor,
        country = ?data.country_code,
        "AbuseIPDB response decoded"
    );

    Ok(Reputation::new(
        data.abuse_confidence_score,
        data.total_reports,
    ))
}

#[async_trait]
impl ReputationProvider for AbuseIPDBProvider {
    async fn check(&self, request: &LookupRequest) -> Result<Reputation, ProviderError> {
        let ip = request.ip_address();
        debug!(ip = %ip, "Querying AbuseIPDB");

        let response = self
            .client
            .get(&self.config.api_url)
            .query(&[
                ("ipAddress", ip.to_string()),
                ("maxAgeInDays", self.config.max_age_days.to_string()),
            ])
            .header("Key", self.api_key.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            // The body stays server-side.
            let body = response.text().await.unwrap_or_default();
            warn!(ip = %ip, status = status.as_u16(), "AbuseIPDB returned an error status");
            debug!(body = %body, "AbuseIPDB error body");
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let reputation = parse_body(&body)?;

        debug!(
            ip = %ip,
            score = reputation.score,
            reports = reputation.reports,
            "AbuseIPDB lookup complete"
        );

        Ok(reputation)
    }

    fn name(&self) -> &str {
        "abuseipdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> AbuseIPDBConfig {
        AbuseIPDBConfig {
            api_key: "test-key".to_string(),
            ..AbuseIPDBConfig::default()
        }
    }

    #[test]
    fn test_provider_name() {
        let provider = AbuseIPDBProvider::new(create_test_config()).unwrap();
        assert_eq!(provider.name(), "abuseipdb");
    }

    #[test]
    fn test_blank_key_is_invalid_credential() {
        let mut config = create_test_config();
        config.api_key = "  ".to_string();
        assert!(matches!(
            AbuseIPDBProvider::new(config),
            Err(ProviderError::InvalidCredential)
        ));
    }

    #[test]
    fn test_non_header_key_is_invalid_credential() {
        let mut config = create_test_config();
        config.api_key = "bad\nkey".to_string();
        assert!(matches!(
            AbuseIPDBProvider::new(config),
            Err(ProviderError::InvalidCredential)
        ));
    }

    #[test]
    fn test_parse_body() {
        let body = br#"{"data":{"ipAddress":"1.2.3.4","abuseConfidenceScore":75,"totalReports":10,"isTor":false,"countryCode":"US"}}"#;
        let reputation = parse_body(body).unwrap();
        assert_eq!(reputation, Reputation::new(75, 10));
    }

    #[test]
    fn test_parse_body_missing_fields_default_to_zero() {
        assert_eq!(parse_body(br#"{"data":{}}"#).unwrap(), Reputation::default());
        assert_eq!(parse_body(br#"{}"#).unwrap(), Reputation::default());
    }

    #[test]
    fn test_parse_body_not_json() {
        assert!(matches!(
            parse_body(b"<html>oops</html>"),
            Err(ProviderError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_body_wrong_shape() {
        assert!(matches!(
            parse_body(br#"{"data":{"abuseConfidenceScore":"high"}}"#),
            Err(ProviderError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_body(br#""just text""#),
            Err(ProviderError::InvalidResponse(_))
        ));
    }
}
