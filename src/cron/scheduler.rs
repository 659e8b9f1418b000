//! Cron scheduler for periodic background tasks.
//!
//! Runs jobs like:
//! - Expiring old trade-stream entries (hourly)
//! - Sampling component health (every heartbeat interval)

use std::sync::Arc;

use anyhow::Result;
use log::{error, info};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::{cache::Cache, pubsub::BackendSocket, worker::{ChainClient, CurveRegistry}};

use super::jobs;

/// Cron scheduler that manages the listener's periodic jobs.
pub struct CronScheduler {
    cache: Cache,
    chain: Arc<ChainClient>,
    socket: BackendSocket,
    registry: Arc<CurveRegistry>,
    settings: CronSettings,
}

/// Configuration for cron job intervals.
#[derive(Debug, Clone)]
pub struct CronSettings {
    /// Interval for the trade-stream cleanup sweep - default 1 hour
    pub cleanup_interval_secs: u64,
    /// Interval for health sampling - default 30 seconds
    pub health_interval_secs: u64,
}

impl Default for CronSettings {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 3600,
            health_interval_secs: 30,
        }
    }
}

impl CronScheduler {
    pub fn new(
        cache: Cache,
        chain: Arc<ChainClient>,
        socket: BackendSocket,
        registry: Arc<CurveRegistry>,
        settings: CronSettings,
    ) -> Self {
        Self {
            cache,
            chain,
            socket,
            registry,
            settings,
        }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        self.register_cleanup_job(&scheduler).await?;
        self.register_health_job(&scheduler).await?;

        scheduler.start().await?;
        info!("Cron scheduler started with {} jobs", 2);

        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_cleanup_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let cache = self.cache.clone();
        let interval = self.settings.cleanup_interval_secs;

        let job = Job::new_repeated_async(
            std::time::Duration::from_secs(interval),
            move |_uuid, _lock| {
                let cache = cache.clone();
                Box::pin(async move {
                    if let Err(e) = jobs::cleanup_trades::run(&cache).await {
                        error!("Failed to clean up trade streams: {e:#}");
                    }
                })
            },
        )?;

        scheduler.add(job).await?;
        info!("Registered cleanup_trades job (every {interval}s)");
        Ok(())
    }

    async fn register_health_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let cache = self.cache.clone();
        let chain = self.chain.clone();
        let socket = self.socket.clone();
        let registry = self.registry.clone();
        let interval = self.settings.health_interval_secs;

        let job = Job::new_repeated_async(
            std::time::Duration::from_secs(interval),
            move |_uuid, _lock| {
                let cache = cache.clone();
                let chain = chain.clone();
                let socket = socket.clone();
                let registry = registry.clone();
                Box::pin(async move {
                    if let Err(e) =
                        jobs::health_monitor::run(&cache, &chain, &socket, &registry).await
                    {
                        error!("Health sample failed: {e:#}");
                    }
                })
            },
        )?;

        scheduler.add(job).await?;
        info!("Registered health_monitor job (every {interval}s)");
        Ok(())
    }
}
