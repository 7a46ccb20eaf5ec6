//! Explicit lifecycle for long-lived collaborators
//!
//! Database pools and HTTP clients are constructed once at process start,
//! connected through the retry executor, and then passed by reference to
//! every consumer. There are no module-level singletons.

use crate::error::Result;
use crate::retry::{self, RetryPolicy};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Startup attempts used by [`connect_with_retry`] callers by convention
pub const STARTUP_CONNECT_ATTEMPTS: u32 = 5;

/// A collaborator with connect / health-check / close phases
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Short name used in logs and health reports
    fn name(&self) -> &str;

    /// Establish the underlying connection
    async fn connect(&self) -> Result<()>;

    /// Cheap liveness probe
    async fn health_check(&self) -> Result<()>;

    /// Release the underlying resources
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Policy used at startup: five attempts, otherwise the defaults
pub fn startup_policy() -> RetryPolicy {
    RetryPolicy::default().with_max_attempts(STARTUP_CONNECT_ATTEMPTS)
}

/// Connect `collaborator`, retrying under `policy`
pub async fn connect_with_retry<L>(collaborator: &L, policy: &RetryPolicy) -> Result<()>
where
    L: Lifecycle + ?Sized,
{
    let outcome = retry::retry(policy, || collaborator.connect()).await;
    match &outcome.result {
        Ok(()) => info!(
            collaborator = collaborator.name(),
            attempts = outcome.attempts,
            "Connected"
        ),
        Err(err) => error!(
            collaborator = collaborator.name(),
            attempts = outcome.attempts,
            error = %err.to_log_json(),
            "Failed to connect"
        ),
    }
    outcome.into_result()
}

/// Result of probing one collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub name: String,
    pub healthy: bool,
    pub response_time: Duration,
    pub error: Option<String>,
}

/// Run a single health check and time it
pub async fn probe<L>(collaborator: &L) -> Probe
where
    L: Lifecycle + ?Sized,
{
    let started = Instant::now();
    let result = collaborator.health_check().await;
    let response_time = started.elapsed();

    Probe {
        name: collaborator.name().to_string(),
        healthy: result.is_ok(),
        response_time,
        error: result.err().map(|e| e.message),
    }
}

/// Probe every collaborator concurrently, preserving input order
pub async fn probe_all(collaborators: &[&dyn Lifecycle]) -> Vec<Probe> {
    futures::future::join_all(collaborators.iter().map(|c| probe(*c))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClassifiedError, ErrorKind, NetworkFault};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures_left: AtomicU32,
        connects: AtomicU32,
        healthy: bool,
    }

    impl Flaky {
        fn new(failures: u32, healthy: bool) -> Self {
            Self {
                failures_left: AtomicU32::new(failures),
                connects: AtomicU32::new(0),
                healthy,
            }
        }
    }

    #[async_trait]
    impl Lifecycle for Flaky {
        fn name(&self) -> &str {
            "flaky-db"
        }

        async fn connect(&self) -> Result<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(ClassifiedError::new(
                    ErrorKind::ServiceUnavailable,
                    "Database server unavailable",
                )
                .with_network_fault(NetworkFault::Unreachable));
            }
            Ok(())
        }

        async fn health_check(&self) -> Result<()> {
            if self.healthy {
                Ok(())
            } else {
                Err(ClassifiedError::database("ping failed"))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_with_retry_recovers() {
        let db = Flaky::new(3, true);
        connect_with_retry(&db, &startup_policy()).await.unwrap();
        assert_eq!(db.connects.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_with_retry_gives_up() {
        let db = Flaky::new(10, true);
        let err = connect_with_retry(&db, &startup_policy()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ServiceUnavailable);
        assert_eq!(db.connects.load(Ordering::SeqCst), STARTUP_CONNECT_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_probe_all_keeps_order() {
        let up = Flaky::new(0, true);
        let down = Flaky::new(0, false);
        let probes = probe_all(&[&up, &down]).await;

        assert_eq!(probes.len(), 2);
        assert!(probes[0].healthy);
        assert!(probes[0].error.is_none());
        assert!(!probes[1].healthy);
        assert_eq!(probes[1].error.as_deref(), Some("ping failed"));
    }

    #[tokio::test]
    async fn test_default_close_is_noop() {
        let db = Flaky::new(0, true);
        assert!(db.close().await.is_ok());
    }
}
