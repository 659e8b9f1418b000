//! Periodic health sampling.
//!
//! Warns on degraded components; degradations never stop the process, the
//! samples only make them visible.

use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};

use crate::{cache::Cache, pubsub::BackendSocket, worker::{ChainClient, CurveRegistry}};

pub async fn run(
    cache: &Cache,
    chain: &Arc<ChainClient>,
    socket: &BackendSocket,
    registry: &Arc<CurveRegistry>,
) -> Result<()> {
    let cache_healthy = cache.health_check().await;
    let chain_healthy = chain.health().await;
    let socket_healthy = socket.is_connected();

    if !cache_healthy {
        warn!("Cache unhealthy: ping failed");
    }
    if !chain_healthy {
        warn!("Chain connection unhealthy: tip query failed");
    }
    if !socket_healthy {
        warn!("Backend socket disconnected");
    }

    info!(
        "Health: cache={cache_healthy} chain={chain_healthy} socket={socket_healthy} | block {} | {} events | {} curves | {} sent / {} dropped",
        chain.cached_tip(),
        chain.events_received(),
        registry.len(),
        socket.messages_sent(),
        socket.messages_dropped(),
    );
    Ok(())
}
