//! Stable, machine-readable error codes for the ingestion pipeline.
//!
//! Record-level codes (MISSING_UPC, INVALID_PRICE, ...) are counted in a
//! FeedRun's histogram and never abort a run. Run-level codes (FETCH_ERROR,
//! TIMEOUT_ERROR, PARSE_ERROR, SUBSCRIPTION_EXPIRED) abort the run and are
//! stamped onto Feed.primaryErrorCode.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MissingUpc,
    InvalidUpc,
    MissingTitle,
    InvalidPrice,
    MissingCaliber,
    MissingBrand,
    MalformedRow,
    ParseError,
    FetchError,
    TimeoutError,
    SubscriptionExpired,
}

impl ErrorCode {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingUpc
            | Self::InvalidUpc
            | Self::MissingTitle
            | Self::InvalidPrice
            | Self::MissingCaliber
            | Self::MissingBrand
            | Self::MalformedRow => ErrorCategory::Record,

            Self::ParseError | Self::FetchError | Self::TimeoutError | Self::SubscriptionExpired => {
                ErrorCategory::Run
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingUpc => "MISSING_UPC",
            Self::InvalidUpc => "INVALID_UPC",
            Self::MissingTitle => "MISSING_TITLE",
            Self::InvalidPrice => "INVALID_PRICE",
            Self::MissingCaliber => "MISSING_CALIBER",
            Self::MissingBrand => "MISSING_BRAND",
            Self::MalformedRow => "MALFORMED_ROW",
            Self::ParseError => "PARSE_ERROR",
            Self::FetchError => "FETCH_ERROR",
            Self::TimeoutError => "TIMEOUT_ERROR",
            Self::SubscriptionExpired => "SUBSCRIPTION_EXPIRED",
        }
    }

    /// Classifies a run-level failure from the originating error's message
    /// (`fetch*` -> FETCH_ERROR, `timeout*` -> TIMEOUT_ERROR, else PARSE_ERROR).
    pub fn classify_run_failure(message: &str) -> ErrorCode {
        let lower = message.to_ascii_lowercase();
        if lower.starts_with("timeout") || lower.contains("timed out") {
            ErrorCode::TimeoutError
        } else if lower.starts_with("fetch") || lower.contains("connection") {
            ErrorCode::FetchError
        } else {
            ErrorCode::ParseError
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Record,
    Run,
}

/// Per-record diagnostic, attached to quarantined/rejected records and fed
/// into the FeedRun error histogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub code: ErrorCode,
    pub message: String,
    pub raw_value: Option<String>,
}

impl FieldError {
    pub fn new(field: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code,
            message: message.into(),
            raw_value: None,
        }
    }

    pub fn with_raw_value(mut self, raw: impl Into<String>) -> Self {
        self.raw_value = Some(raw.into());
        self
    }
}

/// Run-level failure, classified and propagated so the queue's retry policy
/// can act on it.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("parse failed: {0}")]
    Parse(String),

    #[error("subscription expired for dealer {dealer_id}")]
    SubscriptionExpired { dealer_id: String },
}

impl PipelineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Fetch(_) => ErrorCode::FetchError,
            Self::Timeout(_) => ErrorCode::TimeoutError,
            Self::Parse(_) => ErrorCode::ParseError,
            Self::SubscriptionExpired { .. } => ErrorCode::SubscriptionExpired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_fetch_and_timeout_prefixes() {
        assert_eq!(
            ErrorCode::classify_run_failure("fetch: connection refused"),
            ErrorCode::FetchError
        );
        assert_eq!(
            ErrorCode::classify_run_failure("Timeout waiting for response"),
            ErrorCode::TimeoutError
        );
        assert_eq!(
            ErrorCode::classify_run_failure("unexpected token at line 3"),
            ErrorCode::ParseError
        );
    }

    #[test]
    fn error_code_round_trips_through_serde_as_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::MissingUpc).unwrap();
        assert_eq!(json, "\"MISSING_UPC\"");
    }
}
