use std::{
    process,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use curvestream::{
    aggregator::CandleAggregator,
    alerts::AlertBank,
    fanout::FanOut,
    worker::{run_event_feed, ChainClient, CurveRegistry, Dispatcher},
    BackendSocket, Cache, CronScheduler, CronSettings, Settings,
};
use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use tokio::{signal, sync::mpsc};
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Bound on teardown once cancellation is triggered.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
        .expect("logger init");

    info!("Starting curvestream listener v{}", env!("CARGO_PKG_VERSION"));

    let settings = match Settings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Configuration error: {e}");
            process::exit(1);
        }
    };

    match run(settings).await {
        Ok(()) => info!("Shutdown complete"),
        Err(e) => {
            error!("Fatal error: {e:#}");
            process::exit(1);
        }
    }
}

async fn run(settings: Settings) -> Result<()> {
    let intervals = settings
        .processing
        .intervals()
        .context("invalid OHLCV interval configuration")?;

    // Infrastructure first: cache, backend socket, chain session.
    let cache = Cache::connect(settings.cache.clone()).await?;
    let socket = BackendSocket::connect(&settings.websocket).await?;

    let registry = Arc::new(CurveRegistry::new());
    let chain = Arc::new(ChainClient::new(settings.blockchain.clone(), registry.clone())?);
    chain.connect().await?;

    // One-shot discovery seeds the registry; a failing factory view is
    // tolerated (dynamically deployed curves still register).
    if let Err(e) = chain.discover_curves().await {
        warn!("Curve discovery failed: {e:#}");
    }

    let (event_tx, event_rx) = mpsc::channel(settings.processing.batch_size.max(1));
    let (domain_tx, domain_rx) = mpsc::channel(256);

    let aggregator = Arc::new(CandleAggregator::new(cache.clone(), intervals));
    let fanout = FanOut::new(cache.clone(), socket.clone());
    let alerts = AlertBank::new(
        settings.processing.large_trade_threshold_eth.clone(),
        cache.clone(),
        domain_tx.clone(),
    );
    let dispatcher = Dispatcher::new(
        cache.clone(),
        registry.clone(),
        aggregator,
        fanout,
        alerts,
        domain_tx,
    );

    let cancellation = CancellationToken::new();
    let failed = Arc::new(AtomicBool::new(false));

    // Core tasks cancel the shared token when they die so the supervisor
    // can tear the rest down.
    let chain_task = {
        let chain = chain.clone();
        let token = cancellation.clone();
        let failed = failed.clone();
        tokio::spawn(async move {
            if let Err(e) = chain.run(event_tx, token.child_token()).await {
                error!("Chain client failed: {e:#}");
                failed.store(true, Ordering::SeqCst);
            }
            token.cancel();
        })
    };

    let dispatch_task = {
        let token = cancellation.clone();
        tokio::spawn(async move {
            dispatcher.run(event_rx, token.child_token()).await;
            token.cancel();
        })
    };

    let sender_task = {
        let socket = socket.clone();
        let token = cancellation.child_token();
        tokio::spawn(async move { socket.run(token).await })
    };

    let feed_task = {
        let socket = socket.clone();
        let token = cancellation.child_token();
        tokio::spawn(async move { run_event_feed(domain_rx, socket, token).await })
    };

    let cron_task = {
        let cron = CronScheduler::new(
            cache.clone(),
            chain.clone(),
            socket.clone(),
            registry.clone(),
            CronSettings {
                health_interval_secs: settings.blockchain.heartbeat_interval_s,
                ..Default::default()
            },
        );
        let token = cancellation.clone();
        let failed = failed.clone();
        tokio::spawn(async move {
            if let Err(e) = cron.run(token.child_token()).await {
                error!("Cron scheduler failed: {e:#}");
                failed.store(true, Ordering::SeqCst);
            }
            token.cancel();
        })
    };

    tokio::select! {
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received");
        }
        _ = cancellation.cancelled() => {
            warn!("A core task terminated, shutting down");
        }
    }

    cancellation.cancel();

    // Bounded teardown; tasks still running after the grace window are
    // abandoned.
    let teardown = async {
        let _ = tokio::join!(chain_task, dispatch_task, sender_task, feed_task, cron_task);
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, teardown).await.is_err() {
        warn!("Teardown exceeded {SHUTDOWN_GRACE:?}, abandoning remaining tasks");
    }

    socket.disconnect().await;

    if failed.load(Ordering::SeqCst) {
        anyhow::bail!("terminated after component failure");
    }
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler");
        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
