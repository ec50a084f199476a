//! Outreach - sequencing and deliverability engine entry point

mod dispatch;

use anyhow::{bail, Result};
use chrono::Utc;
use outreach_api::AppState;
use outreach_common::config::{Config, LoggingConfig};
use outreach_common::types::Channel;
use outreach_core::{
    CampaignManager, CapabilityProbe, ChannelActionHandler, ChannelRouter, ChannelSender,
    EngineJobHandler, EngineMetrics, HttpChannelDriver, HumanDelay, JobCategory, JobQueue,
    MemoryJobQueue, NoCapabilities, PgJobQueue, SequenceScheduler, SmtpSender, TokenSigner,
    TrackingIngester, TrackingLinks, WarmupEngine, WorkerPool,
};
use outreach_storage::{DatabasePool, Repositories};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::dispatch::Dispatcher;

/// Claimed jobs older than this are assumed abandoned by a dead worker
const STALE_JOB_MINUTES: i64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting outreach engine...");

    // Initialize store
    let repos = match config.database.backend.as_str() {
        "postgres" => {
            let db_pool = DatabasePool::new(&config.database).await?;
            info!("Database connection established");

            db_pool.migrate().await?;
            info!("Database migrations completed");
            Repositories::postgres(db_pool)
        }
        "memory" => {
            warn!("Using the in-memory store; state is lost on exit");
            Repositories::in_memory()
        }
        other => bail!("Unknown database backend: {}", other),
    };

    // Initialize job queue
    let queue: Arc<dyn JobQueue> = match repos.pool() {
        Some(pool) => Arc::new(PgJobQueue::new(pool.clone())),
        None => Arc::new(MemoryJobQueue::new()),
    };
    let recovered = queue
        .recover_stale(Utc::now() - chrono::Duration::minutes(STALE_JOB_MINUTES))
        .await?;
    if recovered > 0 {
        info!("Recovered {} stale jobs", recovered);
    }

    let metrics = EngineMetrics::new()?;
    let signer = TokenSigner::new(&config.tracking.secret)?;
    if config.tracking.secret == "change-me" {
        warn!("tracking.secret is the default value; set a real key");
    }

    // Initialize channel senders
    let smtp = Arc::new(SmtpSender::new(
        config.server.hostname.clone(),
        Duration::from_secs(config.channels.smtp_timeout_secs),
    ));
    let mut router = ChannelRouter::new().with(Channel::Email, smtp);
    let probe: Arc<dyn CapabilityProbe> = match &config.channels.linkedin_driver_url {
        Some(url) => {
            let driver = Arc::new(HttpChannelDriver::new(
                url.clone(),
                Duration::from_secs(config.channels.driver_timeout_secs),
            )?);
            router = router.with(Channel::Linkedin, driver.clone());
            info!("LinkedIn driver at {}", url);
            driver as Arc<dyn CapabilityProbe>
        }
        None => {
            info!("No LinkedIn driver configured, LinkedIn steps will fail");
            Arc::new(NoCapabilities)
        }
    };
    let sender: Arc<dyn ChannelSender> = Arc::new(router);

    // Initialize engine components
    let scheduler = Arc::new(SequenceScheduler::new(
        repos.clone(),
        sender.clone(),
        probe,
        TrackingLinks::new(config.tracking.base_url.clone()),
        signer.clone(),
        metrics.clone(),
        &config.scheduler,
    ));
    let warmup = Arc::new(WarmupEngine::new(
        repos.clone(),
        sender.clone(),
        HumanDelay::minutes(config.warmup.min_delay_minutes, config.warmup.max_delay_minutes),
        metrics.clone(),
    ));
    let channel = Arc::new(ChannelActionHandler::new(
        repos.clone(),
        sender.clone(),
        metrics.clone(),
    ));
    let handler = Arc::new(EngineJobHandler::new(scheduler, warmup, channel));
    let manager = Arc::new(CampaignManager::new(repos.clone(), queue.clone()));

    // Start workers
    let workers = &config.workers;
    let worker_handles = WorkerPool::new(
        queue.clone(),
        metrics.clone(),
        Duration::from_secs(workers.poll_interval_secs.max(1)),
    )
    .register(JobCategory::SequenceAdvance, handler.clone(), workers.sequence_concurrency)
    .register(JobCategory::Warmup, handler.clone(), workers.warmup_concurrency)
    .register(JobCategory::ChannelAction, handler, workers.channel_concurrency)
    .spawn();

    // Start dispatch loop
    let dispatch_handle = {
        let dispatcher = Dispatcher::new(
            repos.clone(),
            queue.clone(),
            manager,
            config.warmup.enabled,
        );
        let cycle_interval = Duration::from_secs(config.scheduler.cycle_interval_secs.max(1));
        tokio::spawn(dispatcher.run(cycle_interval))
    };

    // Start API server
    let api_handle = {
        let state = AppState {
            repos: repos.clone(),
            ingester: TrackingIngester::new(repos.clone(), signer, metrics.clone()),
            metrics,
            bounce_webhook_secret: config.tracking.bounce_webhook_secret.clone(),
        };
        let app = outreach_api::create_router(state);
        let listener = tokio::net::TcpListener::bind(&config.api.bind).await?;
        info!("Starting API server on {}", config.api.bind);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("API server error: {}", e);
            }
        })
    };

    info!("Outreach engine started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Cleanup
    dispatch_handle.abort();
    api_handle.abort();
    for handle in worker_handles {
        handle.abort();
    }

    info!("Outreach engine shutdown complete");

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_level(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
