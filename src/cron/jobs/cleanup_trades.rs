//! Job to expire old trade-stream entries.
//!
//! The per-token sorted sets are bounded by count at write time; this job
//! additionally drops everything older than the 24h stats window so idle
//! tokens do not pin stale data.

use anyhow::Result;
use log::info;

use crate::cache::Cache;

const RETENTION_HOURS: u64 = 24;

pub async fn run(cache: &Cache) -> Result<()> {
    info!("Starting cleanup_trades job...");
    let start = std::time::Instant::now();

    let removed = cache.cleanup_old_trades(RETENTION_HOURS).await?;

    info!(
        "Completed cleanup_trades job in {:?} ({removed} entries removed)",
        start.elapsed()
    );
    Ok(())
}
