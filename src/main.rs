/*!
 * PagePilot CLI - Command Line Interface
 */

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use pagepilot::{
    error::{AppError, EXIT_FATAL, EXIT_PARTIAL, EXIT_SUCCESS},
    logging, App, AppConfig,
};
use pagepilot_core_resilience::ClassifiedError;
use pagepilot_scheduler::{
    ContentType, NewPost, PageAccount, PostFilter, PostStatus, PostStore, Trend,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "pagepilot")]
#[command(version, about = "Scheduled publishing for Facebook pages", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Verbose output (forces DEBUG logging)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler: sweep for due posts every scan interval
    Run,

    /// Run a single sweep and print its statistics as JSON
    Sweep,

    /// Register or update a page account
    Account {
        #[arg(long)]
        id: String,
        #[arg(long)]
        user: String,
        #[arg(long = "page-id")]
        page_id: Option<String>,
        #[arg(long = "page-name")]
        page_name: Option<String>,
        /// Page access token
        #[arg(long, env = "PAGE_ACCESS_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Schedule a post
    Schedule {
        #[arg(long)]
        user: String,
        #[arg(long)]
        account: String,
        #[arg(long)]
        content: String,
        /// RFC 3339 timestamp, e.g. 2024-07-01T09:00:00Z
        #[arg(long = "at")]
        scheduled_for: DateTime<Utc>,
        #[arg(long = "type", default_value = "post")]
        content_type: ContentType,
        #[arg(long = "media")]
        media_urls: Vec<String>,
        #[arg(long = "hashtag")]
        hashtags: Vec<String>,
    },

    /// Cancel a pending post
    Cancel { id: String },

    /// List posts
    List {
        #[arg(long)]
        status: Option<PostStatus>,
        #[arg(long)]
        account: Option<String>,
    },

    /// Auto-schedule posts from trending topics
    Plan {
        #[arg(long)]
        account: String,
        /// Use these topics instead of researching trends
        #[arg(long = "topic")]
        topics: Vec<String>,
        /// Category to research when no topics are given
        #[arg(long)]
        category: Option<String>,
    },

    /// Check database, Graph API and LLM reachability
    Health,

    /// Write a default configuration file
    InitConfig { path: PathBuf },
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    if let Commands::InitConfig { path } = &cli.command {
        AppConfig::default().to_file(path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(EXIT_SUCCESS);
    }

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.verbose |= cli.verbose;
    logging::init_logging(&config)?;

    let app = App::start(config).await?;
    let code = dispatch(&app, cli.command).await;
    if let Err(e) = app.shutdown().await {
        warn!(error = %e, "Shutdown did not complete cleanly");
    }
    code
}

async fn dispatch(app: &App, command: Commands) -> anyhow::Result<i32> {
    match command {
        Commands::Run => {
            let scheduler = app.scheduler()?;
            tokio::select! {
                _ = scheduler.run() => {}
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for shutdown signal")?;
                    info!("Shutdown requested");
                }
            }
            Ok(EXIT_SUCCESS)
        }

        Commands::Sweep => {
            let stats = app.scheduler()?.run_sweep().await;
            print_json(&stats)?;
            Ok(if stats.failed > 0 || stats.errors > 0 {
                EXIT_PARTIAL
            } else {
                EXIT_SUCCESS
            })
        }

        Commands::Account {
            id,
            user,
            page_id,
            page_name,
            token,
        } => {
            let account = PageAccount {
                id,
                user_id: user,
                page_id,
                page_name,
                page_access_token: token,
            };
            app.store.upsert_account(&account).await?;
            if account.credential().is_none() {
                warn!(account_id = %account.id, "Account saved without page id or token; its posts will fail");
            }
            println!("Saved account {}", account.id);
            Ok(EXIT_SUCCESS)
        }

        Commands::Schedule {
            user,
            account,
            content,
            scheduled_for,
            content_type,
            media_urls,
            hashtags,
        } => {
            let post = app
                .posts()
                .schedule(NewPost {
                    user_id: user,
                    facebook_account_id: account,
                    content,
                    content_type,
                    media_urls,
                    hashtags,
                    scheduled_for,
                    metadata: Default::default(),
                })
                .await?;
            print_json(&post)?;
            Ok(EXIT_SUCCESS)
        }

        Commands::Cancel { id } => {
            let post = app.posts().cancel(&id).await?;
            print_json(&post)?;
            Ok(EXIT_SUCCESS)
        }

        Commands::List { status, account } => {
            let posts = app
                .posts()
                .list(&PostFilter {
                    status,
                    account_id: account,
                    ..Default::default()
                })
                .await?;
            print_json(&posts)?;
            Ok(EXIT_SUCCESS)
        }

        Commands::Plan {
            account,
            topics,
            category,
        } => {
            let now = Utc::now();
            let trends = if topics.is_empty() {
                app.llm.research_trends(category.as_deref(), now).await?
            } else {
                manual_trends(&topics, category.as_deref(), now)
            };

            let mut settings = app.config.autopilot.clone();
            // Explicit invocation plans even when background autopilot is off
            settings.auto_post_enabled = true;

            let posts = app.planner().plan(&settings, &account, &trends).await?;
            print_json(&posts)?;
            Ok(EXIT_SUCCESS)
        }

        Commands::Health => {
            let report = app.health().await;
            print_json(&report)?;
            Ok(if report.is_ok() { EXIT_SUCCESS } else { EXIT_PARTIAL })
        }

        Commands::InitConfig { .. } => Ok(EXIT_SUCCESS),
    }
}

/// Topics given on the command line rank above any researched trend
fn manual_trends(topics: &[String], category: Option<&str>, now: DateTime<Utc>) -> Vec<Trend> {
    topics
        .iter()
        .map(|topic| Trend {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.clone(),
            category: category.unwrap_or("general").to_string(),
            description: None,
            trend_score: 100,
            suggested_hashtags: Vec::new(),
            valid_until: now + Duration::days(pagepilot::llm::TREND_VALIDITY_DAYS),
        })
        .collect()
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(app_err) = err.downcast_ref::<AppError>() {
        return app_err.exit_code();
    }
    match err.downcast_ref::<ClassifiedError>() {
        Some(classified) => AppError::Classified(classified.clone()).exit_code(),
        None => EXIT_FATAL,
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
