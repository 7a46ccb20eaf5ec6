//! Classifier and retry executor working together

use pagepilot_core_resilience::prelude::*;
use pagepilot_core_resilience::{retry, Result, REDACTED};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

fn graph(status: u16, retry_after: Option<&str>) -> ClassifiedError {
    classify(RawFailure::http(
        "Facebook",
        HttpFailure::Response {
            status,
            retry_after: retry_after.map(str::to_string),
            message: None,
        },
    ))
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_hint_then_success() {
    let calls = AtomicU32::new(0);
    let started = Instant::now();

    let outcome = retry(&RetryPolicy::default(), || async {
        match calls.fetch_add(1, Ordering::SeqCst) {
            0 => Err(graph(429, Some("3"))),
            1 => Err(graph(503, None)),
            _ => Ok("1001_9"),
        }
    })
    .await;

    assert_eq!(outcome.attempts, 3);
    assert_eq!(assert_ok!(outcome.result), "1001_9");
    // 3s from the hint, then the schedule's second step (2s)
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(5000) && waited < Duration::from_millis(5100));
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failures_are_not_retried() {
    for status in [400, 401, 403, 404] {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&RetryPolicy::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(graph(status, None))
        })
        .await;

        let err = assert_err!(result);
        assert_eq!(err.upstream_status, Some(status));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "status {}", status);
    }
}

#[tokio::test(start_paused = true)]
async fn test_llm_timeout_retried_until_exhausted() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::default().with_max_attempts(4);

    let result: Result<()> = with_retry(&policy, || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(classify(RawFailure::llm("OpenAI", LlmFailure::Timeout)))
    })
    .await;

    let err = assert_err!(result);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(err.message, "OpenAI API timeout. Please try again later.");
    assert_eq!(err.network_fault, Some(NetworkFault::Timeout));
}

#[test]
fn test_sanitized_log_form_redacts_context_secrets() {
    let err = graph(500, None)
        .with_context("access_token", "EAAB-secret")
        .with_context("pageId", "1001");

    let json = err.to_log_json().to_string();
    assert!(!json.contains("EAAB-secret"));
    assert!(json.contains(REDACTED));
    assert!(json.contains("1001"));
}
