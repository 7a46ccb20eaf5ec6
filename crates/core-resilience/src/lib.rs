//! PagePilot Core Resilience: failure classification and retry primitives
//!
//! # Overview
//!
//! Every outbound call PagePilot makes (database, Facebook Graph API, LLM
//! provider) goes through the same three pieces:
//!
//! - **Classifier**: maps a raw collaborator failure into one of ten
//!   [`ErrorKind`]s with a conventional status code and optional retry hint
//! - **Retry executor**: re-runs an async operation with exponential
//!   backoff while the policy's predicate says the failure is transient
//! - **Lifecycle**: connect / health-check / close for long-lived
//!   collaborators, with connect-with-retry at startup
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Storage systems (SQLite, the posts table)
//! - Network protocols (reqwest, Graph API payloads)
//! - The scheduled-post domain
//!
//! Collaborator adapters build a [`RawFailure`] from whatever their client
//! library reports and hand it to [`classify`]. Nothing past that point
//! ever sees the raw failure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     Caller (executor, planner, CLI)     │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Retry Executor                    │  ← bounded attempts
//! │  (predicate, backoff, retry-after)      │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Collaborator adapter              │
//! │  (reqwest / sqlx call)                  │
//! └─────────────┬───────────────────────────┘
//!               │ raw failure
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Classifier                        │  ← ClassifiedError
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use pagepilot_core_resilience::{
//!     classify, with_retry, ClassifiedError, HttpFailure, RawFailure, RetryPolicy,
//! };
//!
//! # async fn call_graph_api() -> Result<String, HttpFailure> { Ok("123_456".into()) }
//! # async fn example() -> Result<(), ClassifiedError> {
//! let policy = RetryPolicy::default();
//!
//! let post_id = with_retry(&policy, || async {
//!     call_graph_api()
//!         .await
//!         .map_err(|failure| classify(RawFailure::http("Facebook", failure)))
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod classify;
pub mod error;
pub mod lifecycle;
pub mod retry;

// Re-export main types for convenience
pub use backoff::BackoffSchedule;
pub use classify::{
    classify, parse_retry_after, HttpFailure, LlmFailure, PersistenceFailure, RawFailure,
};
pub use error::{ClassifiedError, ErrorKind, NetworkFault, Result, SanitizedError, REDACTED};
pub use lifecycle::{connect_with_retry, probe, probe_all, startup_policy, Lifecycle, Probe};
pub use retry::{default_retryable, retry, with_retry, RetryOutcome, RetryPolicy};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use pagepilot_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::classify::{classify, HttpFailure, LlmFailure, PersistenceFailure, RawFailure};
    pub use super::error::{ClassifiedError, ErrorKind, NetworkFault};
    pub use super::lifecycle::{connect_with_retry, Lifecycle};
    pub use super::retry::{with_retry, RetryPolicy};
}
