/*!
 * Wiring: builds the store and HTTP collaborators from configuration
 */

use crate::config::AppConfig;
use crate::error::Result;
use crate::facebook::GraphClient;
use crate::health::HealthReport;
use crate::llm::LlmClient;
use pagepilot_core_resilience::{connect_with_retry, startup_policy, Lifecycle};
use pagepilot_scheduler::{AutoScheduler, PostService, Scheduler, SqliteStore, SystemClock};
use std::sync::Arc;
use tracing::info;

pub struct App {
    pub config: AppConfig,
    pub store: Arc<SqliteStore>,
    pub graph: Arc<GraphClient>,
    pub llm: Arc<LlmClient>,
}

impl App {
    /// Build every collaborator without touching the network
    pub fn build(config: AppConfig) -> Result<Self> {
        let store = Arc::new(SqliteStore::new(&config.database_url)?);
        let graph = Arc::new(GraphClient::new(&config.facebook)?);
        let llm = Arc::new(LlmClient::new(&config.llm)?);
        Ok(Self {
            config,
            store,
            graph,
            llm,
        })
    }

    /// Build, then connect the database (migrations included) with retries
    pub async fn start(config: AppConfig) -> Result<Self> {
        let app = Self::build(config)?;
        connect_with_retry(app.store.as_ref(), &startup_policy()).await?;
        info!(database = %app.config.database_url, "Application started");
        Ok(app)
    }

    pub fn scheduler(&self) -> Result<Arc<Scheduler>> {
        let scheduler = Scheduler::new(
            self.store.clone(),
            self.graph.clone(),
            Arc::new(SystemClock),
            self.config.scheduler.clone(),
        )?;
        Ok(Arc::new(scheduler))
    }

    pub fn posts(&self) -> PostService {
        PostService::new(self.store.clone(), Arc::new(SystemClock))
    }

    pub fn planner(&self) -> AutoScheduler {
        AutoScheduler::new(self.store.clone(), self.llm.clone(), Arc::new(SystemClock))
    }

    pub async fn health(&self) -> HealthReport {
        let collaborators: [&dyn Lifecycle; 3] =
            [self.store.as_ref(), self.graph.as_ref(), self.llm.as_ref()];
        HealthReport::check(&collaborators).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.store.close().await?;
        info!("Application stopped");
        Ok(())
    }
}
