//! Failure classifier
//!
//! Maps raw failures from each external collaborator onto the fixed
//! [`ErrorKind`] taxonomy. The mapping is pure; callers log the result.
//!
//! ```
//! use pagepilot_core_resilience::classify::{classify, HttpFailure, RawFailure};
//! use pagepilot_core_resilience::ErrorKind;
//!
//! let err = classify(RawFailure::http(
//!     "Facebook",
//!     HttpFailure::Response {
//!         status: 429,
//!         retry_after: Some("5".to_string()),
//!         message: None,
//!     },
//! ));
//! assert_eq!(err.kind, ErrorKind::RateLimit);
//! assert_eq!(err.retry_after, Some(5));
//! ```

use crate::error::{ClassifiedError, ErrorKind, NetworkFault};

/// Failure reported by an HTTP client
#[derive(Debug, Clone, PartialEq)]
pub enum HttpFailure {
    /// The upstream answered with a non-success status
    Response {
        status: u16,
        /// Raw `retry-after` header value
        retry_after: Option<String>,
        /// Error message extracted from the response body, if any
        message: Option<String>,
    },
    /// The request was sent but no response arrived
    NoResponse {
        reason: String,
        fault: Option<NetworkFault>,
    },
    /// The request could not be constructed at all
    RequestBuild(String),
}

/// Failure reported by the persistence layer
#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceFailure {
    UniqueViolation { fields: Vec<String> },
    /// Schema or value validation failed
    Validation { messages: Vec<String> },
    ForeignKeyViolation { constraint: Option<String> },
    /// Generic connection-level error
    Connection(String),
    ConnectionRefused,
    HostNotFound,
    HostUnreachable,
    Other { name: String, message: String },
}

/// Failure reported by the LLM provider client
#[derive(Debug, Clone, PartialEq)]
pub enum LlmFailure {
    Response {
        status: u16,
        retry_after: Option<String>,
        message: Option<String>,
    },
    Timeout,
    Other(String),
}

/// A raw failure tagged with the collaborator that produced it
#[derive(Debug, Clone, PartialEq)]
pub enum RawFailure {
    Http { service: String, failure: HttpFailure },
    Persistence(PersistenceFailure),
    Llm { provider: String, failure: LlmFailure },
}

impl RawFailure {
    pub fn http(service: impl Into<String>, failure: HttpFailure) -> Self {
        RawFailure::Http {
            service: service.into(),
            failure,
        }
    }

    pub fn llm(provider: impl Into<String>, failure: LlmFailure) -> Self {
        RawFailure::Llm {
            provider: provider.into(),
            failure,
        }
    }
}

impl From<PersistenceFailure> for RawFailure {
    fn from(failure: PersistenceFailure) -> Self {
        RawFailure::Persistence(failure)
    }
}

/// Classify any raw collaborator failure
pub fn classify(raw: RawFailure) -> ClassifiedError {
    match raw {
        RawFailure::Http { service, failure } => classify_http(&service, failure),
        RawFailure::Persistence(failure) => classify_persistence(failure),
        RawFailure::Llm { provider, failure } => classify_llm(&provider, failure),
    }
}

/// Parse a `retry-after` header given in seconds
///
/// HTTP-date values are not honoured and yield `None`.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    let trimmed = value.trim();
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Some(secs);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| secs.ceil() as u64)
}

fn classify_http(service: &str, failure: HttpFailure) -> ClassifiedError {
    match failure {
        HttpFailure::Response {
            status,
            retry_after,
            message,
        } => {
            let message = message.unwrap_or_else(|| format!("{} API error", service));
            match status {
                401 => ClassifiedError::new(
                    ErrorKind::Authentication,
                    format!("{} authentication failed: {}", service, message),
                )
                .with_upstream_status(status)
                .with_context("service", service),
                403 => ClassifiedError::new(
                    ErrorKind::Authorization,
                    format!("{} authorization failed: {}", service, message),
                )
                .with_upstream_status(status)
                .with_context("service", service),
                429 => rate_limited(service, status, retry_after.as_deref()),
                _ => ClassifiedError::external(format!(
                    "{} returned error {}: {}",
                    service, status, message
                ))
                .with_upstream_status(status)
                .with_context("service", service)
                .with_context("status", status),
            }
        }
        HttpFailure::NoResponse { reason, fault } => {
            let err = ClassifiedError::new(
                ErrorKind::ServiceUnavailable,
                format!("{} service unavailable: No response received", service),
            )
            .with_context("service", service)
            .with_context("reason", reason);
            match fault {
                Some(fault) => err.with_network_fault(fault),
                None => err,
            }
        }
        HttpFailure::RequestBuild(message) => {
            ClassifiedError::external(format!("{} request failed: {}", service, message))
                .with_context("service", service)
        }
    }
}

fn rate_limited(service: &str, status: u16, retry_after: Option<&str>) -> ClassifiedError {
    let seconds = retry_after.and_then(parse_retry_after);
    let message = match seconds {
        Some(secs) => format!("{} rate limit exceeded. Retry after {}s.", service, secs),
        None => format!("{} rate limit exceeded. Please try again later.", service),
    };
    let err = ClassifiedError::new(ErrorKind::RateLimit, message)
        .with_upstream_status(status)
        .with_retry_after(seconds)
        .with_context("service", service);
    match seconds {
        Some(secs) => err.with_context("retryAfter", secs),
        None => err,
    }
}

fn classify_persistence(failure: PersistenceFailure) -> ClassifiedError {
    match failure {
        PersistenceFailure::UniqueViolation { fields } => {
            let message = if fields.is_empty() {
                "Duplicate entry found".to_string()
            } else {
                format!("Duplicate entry for: {}", fields.join(", "))
            };
            ClassifiedError::new(ErrorKind::Conflict, message).with_context("fields", fields)
        }
        PersistenceFailure::Validation { messages } => {
            let message = if messages.is_empty() {
                "Validation failed".to_string()
            } else {
                messages.join(", ")
            };
            ClassifiedError::validation(message)
        }
        PersistenceFailure::ForeignKeyViolation { constraint } => {
            let err = ClassifiedError::validation("Related resource not found");
            match constraint {
                Some(constraint) => err.with_context("constraint", constraint),
                None => err,
            }
        }
        PersistenceFailure::Connection(message) => {
            ClassifiedError::database("Database connection failed")
                .with_context("originalError", message)
        }
        PersistenceFailure::ConnectionRefused => {
            ClassifiedError::database("Database server unavailable")
                .with_network_fault(NetworkFault::Unreachable)
                .with_context("originalError", "ConnectionRefused")
        }
        PersistenceFailure::HostNotFound => {
            ClassifiedError::database("Database server unavailable")
                .with_network_fault(NetworkFault::HostNotFound)
                .with_context("originalError", "HostNotFound")
        }
        PersistenceFailure::HostUnreachable => {
            ClassifiedError::database("Database server unavailable")
                .with_network_fault(NetworkFault::Unreachable)
                .with_context("originalError", "HostUnreachable")
        }
        PersistenceFailure::Other { name, message } => {
            ClassifiedError::database("Database operation failed")
                .with_context("originalError", name)
                .with_context("message", message)
        }
    }
}

fn classify_llm(provider: &str, failure: LlmFailure) -> ClassifiedError {
    match failure {
        LlmFailure::Response {
            status,
            retry_after,
            message,
        } => match status {
            401 => ClassifiedError::new(
                ErrorKind::Authentication,
                format!("{} API key invalid or expired", provider),
            )
            .with_upstream_status(status)
            .with_context("service", provider),
            429 => rate_limited(provider, status, retry_after.as_deref()),
            500..=599 => ClassifiedError::external(format!(
                "{} service error ({}). Please try again later.",
                provider, status
            ))
            .with_upstream_status(status)
            .with_context("service", provider)
            .with_context("status", status),
            _ => {
                let detail = message.unwrap_or_else(|| format!("status {}", status));
                ClassifiedError::external(format!("{} API error: {}", provider, detail))
                    .with_upstream_status(status)
                    .with_context("service", provider)
            }
        },
        LlmFailure::Timeout => ClassifiedError::external(format!(
            "{} API timeout. Please try again later.",
            provider
        ))
        .with_network_fault(NetworkFault::Timeout)
        .with_context("service", provider),
        LlmFailure::Other(message) => {
            ClassifiedError::external(format!("{} API error: {}", provider, message))
                .with_context("service", provider)
        }
    }
}
