//! Classification of a reputation lookup into a user-facing verdict.

use crate::providers::Reputation;
use serde::{Deserialize, Serialize};

/// Scores strictly above this value are malicious.
pub const MALICIOUS_THRESHOLD: u8 = 50;

/// Verdict status shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Malicious,
    Clean,
    Unknown,
    Invalid,
    Error,
}

/// Response body for `/check_ip`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LookupResult {
    pub status: Status,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reports: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LookupResult {
    fn scored(status: Status, reputation: &Reputation) -> Self {
        Self {
            status,
            score: Some(reputation.score),
            reports: Some(reputation.reports),
            message: None,
        }
    }

    fn with_message(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            score: None,
            reports: None,
            message: Some(message.into()),
        }
    }

    /// Rejected input.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::with_message(Status::Invalid, message)
    }

    /// Failed lookup.
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_message(Status::Error, message)
    }
}

/// Classify a lookup. Priority order: a high score always wins, then the
/// no-data case, then clean. Zero score with reports is clean, not unknown.
pub fn classify(reputation: &Reputation) -> LookupResult {
    if reputation.score > MALICIOUS_THRESHOLD {
        LookupResult::scored(Status::Malicious, reputation)
    } else if reputation.reports == 0 && reputation.score == 0 {
        LookupResult::with_message(Status::Unknown, "No data found for this IP.")
    } else {
        LookupResult::scored(Status::Clean, reputation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(score: u8, reports: u64) -> Status {
        classify(&Reputation::new(score, reports)).status
    }

    #[test]
    fn test_classify() {
        assert_eq!(status_of(75, 10), Status::Malicious);
        assert_eq!(status_of(0, 0), Status::Unknown);
        assert_eq!(status_of(10, 3), Status::Clean);
        assert_eq!(status_of(100, 0), Status::Malicious);
    }

    #[test]
    fn test_threshold_boundary() {
        assert_eq!(status_of(50, 40), Status::Clean);
        assert_eq!(status_of(51, 0), Status::Malicious);
    }

    #[test]
    fn test_zero_score_with_reports_is_clean() {
        assert_eq!(status_of(0, 4), Status::Clean);
    }

    #[test]
    fn test_scored_results_carry_score_and_reports() {
        let result = classify(&Reputation::new(75, 10));
        assert_eq!(result.score, Some(75));
        assert_eq!(result.reports, Some(10));
        assert!(result.message.is_none());
    }

    #[test]
    fn test_serialization_omits_absent_fields() {
        let json = serde_json::to_value(classify(&Reputation::new(0, 0))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "unknown", "message": "No data found for this IP."})
        );

        let json = serde_json::to_value(classify(&Reputation::new(10, 3))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "clean", "score": 10, "reports": 3})
        );
    }
}
