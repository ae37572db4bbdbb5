//! Error taxonomy for the analysis pipeline.
//!
//! | Variant | Raised by | Retried |
//! |---------|-----------|---------|
//! | [`AuditError::Extraction`] | frame extractor | job level, with backoff |
//! | [`AuditError::Gateway`] | LLM / embedding calls | gateway level only |
//! | [`AuditError::Schema`] | response validation | never |
//! | [`AuditError::Quality`] | grounding check | never |
//! | [`AuditError::Configuration`] | startup, credential lookup | never |
//! | [`AuditError::Storage`] | persistence backends | job level, with backoff |
//!
//! The orchestrator never persists raw error text as the user-facing message.
//! It classifies errors with [`FailureCategory::classify`] instead.

use std::fmt;

use thiserror::Error;

/// What went wrong on an external model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    Timeout,
    RateLimited,
    /// Non-success HTTP status other than 429.
    Http(u16),
    Network,
    /// The call succeeded but the payload could not be interpreted.
    InvalidResponse,
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayErrorKind::Timeout => f.write_str("timeout"),
            GatewayErrorKind::RateLimited => f.write_str("rate limited"),
            GatewayErrorKind::Http(status) => write!(f, "http {}", status),
            GatewayErrorKind::Network => f.write_str("network"),
            GatewayErrorKind::InvalidResponse => f.write_str("invalid response"),
        }
    }
}

/// A model call that failed after its retry budget was spent.
#[derive(Debug, Clone, Error)]
#[error("{kind} after {attempts} attempt(s): {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub attempts: u32,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            attempts: 1,
            message: message.into(),
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// The model reply could not be turned into the canonical report shape.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("no JSON object found in response")]
    NoJsonObject,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("response JSON is not an object")]
    NotAnObject,
    #[error("missing required keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("frame extraction failed: {0}")]
    Extraction(String),
    #[error("model call failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("quality check failed: {0}")]
    Quality(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl AuditError {
    /// Whether a job-level retry may help.
    ///
    /// Gateway errors are terminal here because the gateway has already
    /// spent its own retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuditError::Extraction(_) | AuditError::Storage(_))
    }

    pub fn storage(err: impl fmt::Display) -> Self {
        AuditError::Storage(err.to_string())
    }
}

pub type AuditResult<T> = std::result::Result<T, AuditError>;

/// User-facing failure categories persisted on a failed audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    ConfigurationMissing,
    Timeout,
    RateLimit,
    MalformedResponse,
    IncompleteResponse,
    Generic,
}

impl FailureCategory {
    pub fn classify(err: &AuditError) -> Self {
        match err {
            AuditError::Configuration(_) => FailureCategory::ConfigurationMissing,
            AuditError::Gateway(g) => match g.kind {
                GatewayErrorKind::Timeout => FailureCategory::Timeout,
                GatewayErrorKind::RateLimited => FailureCategory::RateLimit,
                GatewayErrorKind::Http(401) | GatewayErrorKind::Http(403) => {
                    FailureCategory::ConfigurationMissing
                }
                GatewayErrorKind::InvalidResponse => FailureCategory::MalformedResponse,
                _ => FailureCategory::Generic,
            },
            AuditError::Schema(SchemaError::MissingKeys(_)) => FailureCategory::IncompleteResponse,
            AuditError::Schema(_) => FailureCategory::MalformedResponse,
            AuditError::Quality(_) => FailureCategory::IncompleteResponse,
            AuditError::Extraction(_) | AuditError::Storage(_) => FailureCategory::Generic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::ConfigurationMissing => "configuration_missing",
            FailureCategory::Timeout => "timeout",
            FailureCategory::RateLimit => "rate_limit",
            FailureCategory::MalformedResponse => "malformed_response",
            FailureCategory::IncompleteResponse => "incomplete_response",
            FailureCategory::Generic => "generic",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            FailureCategory::ConfigurationMissing => {
                "The analysis service is not configured correctly. Please contact support."
            }
            FailureCategory::Timeout => {
                "The analysis took too long to complete. Please try again with a shorter video."
            }
            FailureCategory::RateLimit => {
                "The analysis service is temporarily busy. Please try again in a few minutes."
            }
            FailureCategory::MalformedResponse => {
                "The analysis produced an unreadable result. Please try again."
            }
            FailureCategory::IncompleteResponse => {
                "The analysis could not identify specific issues in this recording. Please try again or upload a clearer recording."
            }
            FailureCategory::Generic => {
                "Something went wrong while analyzing your video. Please try again."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_extraction_and_storage_are_retryable() {
        assert!(AuditError::Extraction("ffmpeg exited 1".into()).is_retryable());
        assert!(AuditError::Storage("locked".into()).is_retryable());
        let gw = GatewayError::new(GatewayErrorKind::Timeout, "slow").with_attempts(4);
        assert!(!AuditError::Gateway(gw).is_retryable());
        assert!(!AuditError::Quality("generic".into()).is_retryable());
        assert!(!AuditError::Schema(SchemaError::NoJsonObject).is_retryable());
    }

    #[test]
    fn classify_maps_to_user_categories() {
        let cases = vec![
            (
                AuditError::Configuration("OPENAI_API_KEY not set".into()),
                FailureCategory::ConfigurationMissing,
            ),
            (
                GatewayError::new(GatewayErrorKind::Timeout, "t").into(),
                FailureCategory::Timeout,
            ),
            (
                GatewayError::new(GatewayErrorKind::RateLimited, "429").into(),
                FailureCategory::RateLimit,
            ),
            (
                SchemaError::InvalidJson("eof".into()).into(),
                FailureCategory::MalformedResponse,
            ),
            (
                SchemaError::MissingKeys(vec!["identifiedIssues".into()]).into(),
                FailureCategory::IncompleteResponse,
            ),
            (
                AuditError::Quality("all generic".into()),
                FailureCategory::IncompleteResponse,
            ),
            (
                AuditError::Extraction("no frames".into()),
                FailureCategory::Generic,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(FailureCategory::classify(&err), expected, "{}", err);
        }
    }

    #[test]
    fn user_messages_never_echo_error_text() {
        let err = AuditError::Extraction("/tmp/secret/path.mp4: Permission denied".into());
        let msg = FailureCategory::classify(&err).user_message();
        assert!(!msg.contains("secret"));
    }

    #[test]
    fn gateway_error_display_includes_attempts() {
        let gw = GatewayError::new(GatewayErrorKind::Http(500), "boom").with_attempts(4);
        assert_eq!(gw.to_string(), "http 500 after 4 attempt(s): boom");
    }
}
