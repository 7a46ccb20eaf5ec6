/*!
 * Aggregate health report over the application's collaborators
 */

use chrono::{DateTime, Utc};
use pagepilot_core_resilience::{probe_all, Lifecycle, Probe};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Down,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Ok => write!(f, "OK"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Down => write!(f, "DOWN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub name: String,
    pub healthy: bool,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Probe> for ComponentHealth {
    fn from(probe: Probe) -> Self {
        Self {
            name: probe.name,
            healthy: probe.healthy,
            response_time_ms: probe.response_time.as_millis() as u64,
            error: probe.error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    pub components: Vec<ComponentHealth>,
}

impl HealthReport {
    /// OK when every component is healthy, DOWN when none is
    pub fn from_components(components: Vec<ComponentHealth>, checked_at: DateTime<Utc>) -> Self {
        let healthy = components.iter().filter(|c| c.healthy).count();
        let status = if healthy == components.len() {
            HealthStatus::Ok
        } else if healthy == 0 {
            HealthStatus::Down
        } else {
            HealthStatus::Degraded
        };

        Self {
            status,
            checked_at,
            components,
        }
    }

    /// Probe every collaborator concurrently
    pub async fn check(collaborators: &[&dyn Lifecycle]) -> Self {
        let components = probe_all(collaborators)
            .await
            .into_iter()
            .map(ComponentHealth::from)
            .collect();
        Self::from_components(components, Utc::now())
    }

    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pagepilot_core_resilience::{ClassifiedError, Result};

    struct Fixed {
        name: &'static str,
        healthy: bool,
    }

    #[async_trait]
    impl Lifecycle for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        async fn health_check(&self) -> Result<()> {
            if self.healthy {
                Ok(())
            } else {
                Err(ClassifiedError::database("Database connection failed"))
            }
        }
    }

    fn component(name: &str, healthy: bool) -> ComponentHealth {
        ComponentHealth {
            name: name.into(),
            healthy,
            response_time_ms: 1,
            error: None,
        }
    }

    #[test]
    fn test_status_aggregation() {
        let now = Utc::now();
        let ok = HealthReport::from_components(vec![component("database", true), component("llm", true)], now);
        assert_eq!(ok.status, HealthStatus::Ok);

        let degraded = HealthReport::from_components(vec![component("database", true), component("llm", false)], now);
        assert_eq!(degraded.status, HealthStatus::Degraded);

        let down = HealthReport::from_components(vec![component("database", false)], now);
        assert_eq!(down.status, HealthStatus::Down);
    }

    #[tokio::test]
    async fn test_check_reports_errors_as_json() {
        let db = Fixed { name: "database", healthy: false };
        let graph = Fixed { name: "facebook", healthy: true };

        let report = HealthReport::check(&[&db, &graph]).await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(!report.is_ok());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "DEGRADED");
        assert_eq!(json["components"][0]["name"], "database");
        assert_eq!(json["components"][0]["healthy"], false);
        assert!(json["components"][0]["error"].is_string());
        assert!(json["components"][1].get("error").is_none());
        assert!(json["components"][1]["responseTimeMs"].is_u64());
    }
}
