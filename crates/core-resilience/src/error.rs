//! Classified failures: the single error shape that crosses collaborator boundaries
//!
//! Raw failures from the database, the Graph API or the LLM provider never
//! leave the classifier. Everything downstream (the retry executor, the
//! scheduled-post state machine, the CLI) only ever sees a [`ClassifiedError`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClassifiedError>;

/// Placeholder written in place of secret-looking context values
pub const REDACTED: &str = "[REDACTED]";

/// Substrings that mark a context key as secret-bearing (matched case-insensitively)
const SENSITIVE_KEY_MARKERS: [&str; 5] = ["password", "token", "secret", "key", "auth"];

/// The fixed set of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    RateLimit,
    ExternalServiceError,
    DatabaseError,
    ServiceUnavailable,
    Unknown,
}

impl ErrorKind {
    /// Conventional HTTP-style status code for this kind
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Authentication => 401,
            ErrorKind::Authorization => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::RateLimit => 429,
            ErrorKind::ExternalServiceError => 502,
            ErrorKind::DatabaseError => 500,
            ErrorKind::ServiceUnavailable => 503,
            ErrorKind::Unknown => 500,
        }
    }

    /// Kinds that will not succeed on a plain retry
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ErrorKind::Validation
                | ErrorKind::Authentication
                | ErrorKind::Authorization
                | ErrorKind::NotFound
                | ErrorKind::Conflict
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "Validation",
            ErrorKind::Authentication => "Authentication",
            ErrorKind::Authorization => "Authorization",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::RateLimit => "RateLimit",
            ErrorKind::ExternalServiceError => "ExternalServiceError",
            ErrorKind::DatabaseError => "DatabaseError",
            ErrorKind::ServiceUnavailable => "ServiceUnavailable",
            ErrorKind::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network-level condition under which no response was received
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkFault {
    /// Request or connect timed out
    Timeout,
    /// Peer reset the connection
    ConnectionReset,
    /// Connection aborted locally (e.g. client-side timeout)
    ConnectionAborted,
    /// DNS lookup failed
    HostNotFound,
    /// Host could not be reached or refused the connection
    Unreachable,
}

/// A normalized failure produced by the classifier
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    /// Conventional status code for `kind`
    pub status_code: u16,
    /// Status code returned by the upstream service, when one responded
    pub upstream_status: Option<u16>,
    /// Upstream retry hint in seconds (e.g. from a `retry-after` header)
    pub retry_after: Option<u64>,
    /// Set when the failure happened below HTTP (timeout, reset, DNS)
    pub network_fault: Option<NetworkFault>,
    /// Free-form diagnostics; secret-looking keys are redacted on emission
    pub context: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: kind.status_code(),
            upstream_status: None,
            retry_after: None,
            network_fault: None,
            context: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalServiceError, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DatabaseError, message)
    }

    pub fn with_upstream_status(mut self, status: u16) -> Self {
        self.upstream_status = Some(status);
        self
    }

    pub fn with_retry_after(mut self, seconds: Option<u64>) -> Self {
        self.retry_after = seconds;
        self
    }

    pub fn with_network_fault(mut self, fault: NetworkFault) -> Self {
        self.network_fault = Some(fault);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn is_rate_limit(&self) -> bool {
        self.kind == ErrorKind::RateLimit
            || self.status_code == 429
            || self.upstream_status == Some(429)
    }

    /// Copy safe to hand to logs or telemetry
    pub fn sanitized(&self) -> SanitizedError {
        let context = self
            .context
            .iter()
            .map(|(key, value)| {
                if is_sensitive_key(key) {
                    (key.clone(), Value::String(REDACTED.to_string()))
                } else {
                    (key.clone(), value.clone())
                }
            })
            .collect();

        SanitizedError {
            kind: self.kind,
            message: self.message.clone(),
            status_code: self.status_code,
            upstream_status: self.upstream_status,
            retry_after: self.retry_after,
            network_fault: self.network_fault,
            context,
            timestamp: self.timestamp,
        }
    }

    /// Sanitized JSON form used in log lines
    pub fn to_log_json(&self) -> Value {
        serde_json::to_value(self.sanitized()).unwrap_or_else(|_| {
            serde_json::json!({ "kind": self.kind, "message": self.message })
        })
    }
}

/// Serializable, redacted view of a [`ClassifiedError`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedError {
    pub kind: ErrorKind,
    pub message: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_fault: Option<NetworkFault>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// True when a context key looks like it carries a credential
pub fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    SENSITIVE_KEY_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conventional_status_codes() {
        assert_eq!(ErrorKind::Validation.status_code(), 400);
        assert_eq!(ErrorKind::Authentication.status_code(), 401);
        assert_eq!(ErrorKind::Authorization.status_code(), 403);
        assert_eq!(ErrorKind::NotFound.status_code(), 404);
        assert_eq!(ErrorKind::Conflict.status_code(), 409);
        assert_eq!(ErrorKind::RateLimit.status_code(), 429);
        assert_eq!(ErrorKind::ExternalServiceError.status_code(), 502);
        assert_eq!(ErrorKind::DatabaseError.status_code(), 500);
        assert_eq!(ErrorKind::ServiceUnavailable.status_code(), 503);
        assert_eq!(ErrorKind::Unknown.status_code(), 500);
    }

    #[test]
    fn test_permanent_kinds() {
        assert!(ErrorKind::Validation.is_permanent());
        assert!(ErrorKind::Authentication.is_permanent());
        assert!(ErrorKind::Conflict.is_permanent());
        assert!(!ErrorKind::RateLimit.is_permanent());
        assert!(!ErrorKind::ExternalServiceError.is_permanent());
        assert!(!ErrorKind::DatabaseError.is_permanent());
    }

    #[test]
    fn test_access_token_is_redacted() {
        let err = ClassifiedError::external("Graph API returned error 500")
            .with_context("accessToken", "EAAB-very-secret")
            .with_context("service", "Facebook");

        let json = serde_json::to_value(err.sanitized()).unwrap();
        assert_eq!(json["context"]["accessToken"], REDACTED);
        assert_eq!(json["context"]["service"], "Facebook");
        assert_eq!(json["statusCode"], 502);
        assert_eq!(json["kind"], "ExternalServiceError");

        // The original keeps its value
        assert_eq!(err.context["accessToken"], "EAAB-very-secret");
    }

    #[test]
    fn test_sensitive_key_matching() {
        assert!(is_sensitive_key("password"));
        assert!(is_sensitive_key("PAGE_ACCESS_TOKEN"));
        assert!(is_sensitive_key("clientSecret"));
        assert!(is_sensitive_key("apiKey"));
        assert!(is_sensitive_key("Authorization"));
        assert!(!is_sensitive_key("service"));
        assert!(!is_sensitive_key("status"));
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(ClassifiedError::new(ErrorKind::RateLimit, "slow down").is_rate_limit());
        assert!(ClassifiedError::external("throttled")
            .with_upstream_status(429)
            .is_rate_limit());
        assert!(!ClassifiedError::external("bad gateway")
            .with_upstream_status(502)
            .is_rate_limit());
    }

    #[test]
    fn test_display() {
        let err = ClassifiedError::validation("content is empty");
        assert_eq!(err.to_string(), "Validation: content is empty");
    }
}
