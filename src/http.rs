/*!
 * Shared reqwest plumbing: client construction and transport-error mapping
 */

use pagepilot_core_resilience::{HttpFailure, NetworkFault};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;
use std::error::Error as StdError;
use std::io;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("pagepilot/", env!("CARGO_PKG_VERSION"));

/// Build a client with a per-request timeout
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, HttpFailure> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| HttpFailure::RequestBuild(e.to_string()))
}

/// Network-level condition behind a transport error, if recognisable
pub fn network_fault(err: &reqwest::Error) -> Option<NetworkFault> {
    if err.is_timeout() {
        return Some(NetworkFault::Timeout);
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::TimedOut => return Some(NetworkFault::Timeout),
                io::ErrorKind::ConnectionReset => return Some(NetworkFault::ConnectionReset),
                io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe => {
                    return Some(NetworkFault::ConnectionAborted)
                }
                io::ErrorKind::ConnectionRefused => return Some(NetworkFault::Unreachable),
                _ => {}
            }
        }
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("dns") || text.contains("failed to lookup address") {
            return Some(NetworkFault::HostNotFound);
        }
        source = cause.source();
    }

    if err.is_connect() {
        Some(NetworkFault::Unreachable)
    } else {
        None
    }
}

/// Map a reqwest error raised before any response was read
pub fn transport_failure(err: &reqwest::Error) -> HttpFailure {
    if err.is_builder() {
        return HttpFailure::RequestBuild(err.to_string());
    }
    HttpFailure::NoResponse {
        reason: err.to_string(),
        fault: network_fault(err),
    }
}

/// Raw `retry-after` header value
pub fn retry_after(headers: &HeaderMap) -> Option<String> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// `error.message` from a JSON error body, as Graph and OpenAI both return
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("error")? {
        Value::String(message) => Some(message.clone()),
        error => error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}
