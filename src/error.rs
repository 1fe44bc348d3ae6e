//! Request failures and their HTTP mapping.

use crate::providers::ProviderError;
use crate::verdict::LookupResult;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Why a `/check_ip` request did not produce a verdict.
///
/// Every variant ends the request. Client-facing messages are fixed strings;
/// the details carried here are only logged.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("missing or invalid AbuseIPDB credential")]
    Configuration,

    #[error("{0}")]
    Validation(&'static str),

    #[error("upstream returned HTTP {0}")]
    Upstream(u16),

    #[error("upstream request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid JSON from upstream: {0}")]
    Parse(String),

    #[error("unexpected failure: {0}")]
    Unknown(String),
}

pub const CONTENT_TYPE_MESSAGE: &str = "Content-Type must be application/json";
pub const INVALID_IP_MESSAGE: &str = "Please enter a valid IP address.";

impl CheckError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CheckError::Configuration => StatusCode::SERVICE_UNAVAILABLE,
            CheckError::Validation(_) => StatusCode::BAD_REQUEST,
            CheckError::Upstream(_) | CheckError::Network(_) | CheckError::Parse(_) => {
                StatusCode::BAD_GATEWAY
            }
            CheckError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            CheckError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn client_message(&self) -> String {
        match self {
            CheckError::Configuration => "Server misconfigured: missing ABUSEIPDB_KEY".to_string(),
            CheckError::Validation(msg) => (*msg).to_string(),
            CheckError::Upstream(code) => format!("Upstream API error: {}", code),
            CheckError::Timeout => "Request timed out.".to_string(),
            CheckError::Network(_) => "Network error.".to_string(),
            CheckError::Parse(_) => "Invalid JSON from upstream API.".to_string(),
            CheckError::Unknown(_) => "Server error.".to_string(),
        }
    }
}

impl From<ProviderError> for CheckError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Status(code) => CheckError::Upstream(code),
            ProviderError::Timeout => CheckError::Timeout,
            ProviderError::Network(msg) => CheckError::Network(msg),
            ProviderError::Parse(msg) => CheckError::Parse(msg),
            ProviderError::InvalidCredential => CheckError::Configuration,
            ProviderError::InvalidResponse(msg) => CheckError::Unknown(msg),
        }
    }
}

impl IntoResponse for CheckError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.client_message();

        match self {
            CheckError::Configuration => (status, Json(json!({ "error": message }))).into_response(),
            CheckError::Validation(_) => {
                (status, Json(LookupResult::invalid(message))).into_response()
            }
            _ => (status, Json(LookupResult::error(message))).into_response(),
        }
    }
}
