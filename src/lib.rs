/*!
 * PagePilot - scheduled publishing for Facebook pages
 *
 * Application layer on top of the scheduler and resilience crates:
 * - TOML configuration with environment overrides
 * - Structured logging via tracing
 * - Facebook Graph API publisher
 * - Chat-completion client for trend research and post ideas
 * - Collaborator health reporting
 */

pub mod app;
pub mod config;
pub mod error;
pub mod facebook;
pub mod health;
pub mod http;
pub mod llm;
pub mod logging;

// Re-export commonly used types
pub use app::App;
pub use config::{AppConfig, FacebookConfig, LlmConfig, LogLevel};
pub use error::{AppError, Result};
pub use facebook::GraphClient;
pub use health::{HealthReport, HealthStatus};
pub use llm::LlmClient;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
