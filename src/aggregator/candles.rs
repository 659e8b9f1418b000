//! Multi-interval OHLCV aggregation.
//!
//! Owns the latest candle per (token, interval). One trade fans out into
//! one update per configured interval; updates for distinct keys run in
//! parallel, updates for the same key serialize through a per-key mutex
//! that is never held across an await point other than its own
//! read-modify-write.

use std::{
    future::Future,
    sync::{Arc, Mutex},
};

use alloy::primitives::Address;
use anyhow::Result;
use futures::future::join_all;
use log::warn;
use rustc_hash::FxHashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::{
    cache::Cache,
    models::{Candle, CandleRecord, Interval, Trade},
};

/// Persistence seam for candle state: seed reads on cold start and
/// write-through after each update.
pub trait CandleStore: Clone + Send + Sync + 'static {
    fn load(
        &self,
        token: Address,
        interval: Interval,
    ) -> impl Future<Output = Result<Option<Candle>>> + Send;

    fn save(&self, candle: &Candle) -> impl Future<Output = Result<()>> + Send;
}

impl CandleStore for Cache {
    async fn load(&self, token: Address, interval: Interval) -> Result<Option<Candle>> {
        let key = format!(
            "{}{}:{}",
            self.settings.candles_key_prefix,
            token.to_checksum(None),
            interval
        );
        let record: Option<CandleRecord> = self.client.get_json(&key).await?;
        Ok(record.and_then(|r| r.to_candle()))
    }

    async fn save(&self, candle: &Candle) -> Result<()> {
        self.save_candle(candle).await
    }
}

/// One interval's outcome for a processed trade.
#[derive(Debug, Clone)]
pub struct CandleUpdate {
    pub candle: Candle,
    /// True when this trade opened a fresh bucket.
    pub created: bool,
}

type Slot = Arc<AsyncMutex<Option<Candle>>>;

/// Live candle state for every (token, interval) pair.
pub struct CandleAggregator<S> {
    store: S,
    intervals: Vec<Interval>,
    slots: Mutex<FxHashMap<(Address, Interval), Slot>>,
}

impl<S: CandleStore> CandleAggregator<S> {
    pub fn new(store: S, intervals: Vec<Interval>) -> Self {
        Self {
            store,
            intervals,
            slots: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Fold one trade into every configured interval concurrently.
    ///
    /// A failing interval is logged and skipped; the others still land.
    pub async fn apply(&self, trade: &Trade) -> Vec<CandleUpdate> {
        let results = join_all(
            self.intervals
                .iter()
                .map(|interval| self.update_interval(trade, *interval)),
        )
        .await;

        let mut updates = Vec::with_capacity(results.len());
        for (interval, result) in self.intervals.iter().zip(results) {
            match result {
                Ok(update) => updates.push(update),
                Err(e) => warn!(
                    "Candle update failed for {} {interval}: {e:#}",
                    trade.event_id()
                ),
            }
        }
        updates
    }

    async fn update_interval(&self, trade: &Trade, interval: Interval) -> Result<CandleUpdate> {
        let bucket = interval.floor(trade.ts_seconds());
        let (slot, cold) = self.slot(trade.token, interval);

        // The possibly-suspending store read happens before the per-key
        // lock is taken.
        let seeded = if cold {
            match self.store.load(trade.token, interval).await {
                Ok(candle) => candle,
                Err(e) => {
                    warn!("Candle seed read failed for {} {interval}: {e:#}", trade.token);
                    None
                }
            }
        } else {
            None
        };

        let (candle, created) = {
            let mut guard = slot.lock().await;
            if guard.is_none() {
                *guard = seeded;
            }
            match guard.as_mut() {
                Some(current) if current.bucket_ts >= bucket => {
                    current.apply(trade);
                    (current.clone(), false)
                }
                _ => {
                    let mut next =
                        Candle::open_at(trade.token, interval, bucket, trade.opening_price());
                    next.apply(trade);
                    *guard = Some(next.clone());
                    (next, true)
                }
            }
        };

        // Write-through outside the lock; the cache converges on the
        // newest state via TTL even if two writes race.
        self.store.save(&candle).await?;

        Ok(CandleUpdate { candle, created })
    }

    fn slot(&self, token: Address, interval: Interval) -> (Slot, bool) {
        let mut slots = self.slots.lock().expect("slots lock");
        let mut cold = false;
        let slot = slots
            .entry((token, interval))
            .or_insert_with(|| {
                cold = true;
                Arc::new(AsyncMutex::new(None))
            })
            .clone();
        (slot, cold)
    }
}
