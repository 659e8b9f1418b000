//! Domain operations over the cache key layout.
//!
//! The key shapes here are a contract with downstream consumers; changing
//! them breaks the presentation backend.

use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, info, warn};

use crate::{
    cache::Cache,
    models::{
        BondingCurve, BurnEvent, BurnRecord, Candle, CandleRecord, CurveRecord, MarketData,
        MarketRecord, Trade, TradeRecord,
    },
    utils::hex_encode,
};

/// TTLs and bounds of the cache layout (seconds / entry counts).
const LATEST_TRADE_TTL: u64 = 300;
const MARKET_TTL: u64 = 60;
const CURVE_TTL: u64 = 3600;
const CANDLE_TTL: u64 = 60;
const BURN_EVENT_TTL: u64 = 86_400 * 30;
const TRADE_STREAM_CAP: usize = 1000;
const EVENT_STREAM_CAP: usize = 10_000;
const EVENT_STREAM_KEY: &str = "blockchain:events";

/// Retry schedule for the durable stream append.
const STREAM_RETRY_DELAYS_MS: [u64; 3] = [100, 200, 400];

fn token_key(token: &Address) -> String {
    token.to_checksum(None)
}

impl Cache {
    fn trade_stream_key(&self, token: &Address) -> String {
        format!("{}stream:{}", self.settings.trades_key_prefix, token_key(token))
    }

    /// Write `trade:latest:<token>` (price/volume/direction/timestamp).
    pub async fn save_latest_trade(&self, trade: &Trade) -> Result<()> {
        let key = format!("trade:latest:{}", token_key(&trade.token));
        let payload = serde_json::json!({
            "price": trade.price_after.to_string(),
            "volume": trade.token_amount.to_string(),
            "direction": trade.direction.as_str(),
            "timestamp": trade.ts.to_rfc3339(),
        });
        self.client.set_json(&key, &payload, Some(LATEST_TRADE_TTL)).await
    }

    /// Write the `market:<token>` summary.
    pub async fn save_market(&self, market: &MarketData) -> Result<()> {
        let key = format!(
            "{}{}",
            self.settings.market_data_key_prefix,
            token_key(&market.token)
        );
        let record = MarketRecord::from_market(market);
        self.client.set_json(&key, &record, Some(MARKET_TTL)).await
    }

    /// Write the `curve:<token>` summary.
    pub async fn save_curve(&self, curve: &BondingCurve) -> Result<()> {
        let key = format!("curve:{}", token_key(&curve.token));
        let record = CurveRecord::from_curve(curve);
        self.client.set_json(&key, &record, Some(CURVE_TTL)).await
    }

    /// Write the latest candle snapshot for chart readers.
    pub async fn save_candle(&self, candle: &Candle) -> Result<()> {
        let key = format!(
            "{}{}:{}",
            self.settings.candles_key_prefix,
            token_key(&candle.token),
            candle.interval
        );
        let record = CandleRecord::from_candle(candle);
        self.client.set_json(&key, &record, Some(CANDLE_TTL)).await
    }

    /// Append the trade to the per-token time-ordered stream
    /// (`trades:stream:<token>`, score = unix seconds, capped at 1000).
    pub async fn push_trade_stream(&self, trade: &Trade) -> Result<()> {
        let key = self.trade_stream_key(&trade.token);
        let record = TradeRecord::from_trade(trade);
        let member = serde_json::to_string(&record).context("serialize trade record")?;
        self.client
            .zadd_capped(&key, member, trade.ts_seconds() as f64, TRADE_STREAM_CAP)
            .await
    }

    /// Trades for one token in `[start, end]` unix seconds, ascending by
    /// score. Unparseable members are skipped.
    pub async fn trades_in_window(
        &self,
        token: &Address,
        start: u64,
        end: u64,
    ) -> Result<Vec<TradeRecord>> {
        let key = self.trade_stream_key(token);
        let raw = self.client.zrangebyscore(&key, start as f64, end as f64).await?;

        let mut trades = Vec::with_capacity(raw.len());
        for member in raw {
            match serde_json::from_str::<TradeRecord>(&member) {
                Ok(record) => trades.push(record),
                Err(e) => debug!("Skipping malformed trade stream member: {e}"),
            }
        }
        Ok(trades)
    }

    /// Append one event to the `blockchain:events` durable stream.
    ///
    /// Retries on failure with the bounded 100/200/400 ms schedule; a
    /// persistent failure surfaces as the final error (callers log it as a
    /// warning, the pipeline continues).
    pub async fn append_event_stream(
        &self,
        event_type: &str,
        data: &serde_json::Value,
    ) -> Result<String> {
        let payload = serde_json::to_string(data).context("serialize stream payload")?;
        let fields = [
            ("event_type", event_type.to_string()),
            ("data", payload),
            ("timestamp", Utc::now().to_rfc3339()),
            ("source", "blockchain_listener".to_string()),
        ];

        let mut last_err = None;
        for (attempt, delay_ms) in STREAM_RETRY_DELAYS_MS.iter().enumerate() {
            match self
                .client
                .xadd_capped(EVENT_STREAM_KEY, EVENT_STREAM_CAP, &fields)
                .await
            {
                Ok(id) => {
                    debug!("Event {event_type} appended to {EVENT_STREAM_KEY} as {id}");
                    return Ok(id);
                }
                Err(e) => {
                    warn!(
                        "Stream append attempt {}/{} for {event_type} failed: {e:#}",
                        attempt + 1,
                        STREAM_RETRY_DELAYS_MS.len()
                    );
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                }
            }
        }
        Err(last_err.expect("at least one attempt ran"))
    }

    /// Persist a burn event across its query-pattern keys and publish it on
    /// the `burn_events` pub/sub channel.
    pub async fn save_burn_event(&self, burn: &BurnEvent) -> Result<()> {
        let record = BurnRecord::from_burn(burn);
        let member = serde_json::to_string(&record).context("serialize burn record")?;
        let score = burn.timestamp as f64;

        let token = hex_encode(burn.token.as_slice());
        let burner = hex_encode(burn.burner.as_slice());

        self.client
            .zadd("burn_events:all", member.clone(), score)
            .await?;
        self.client
            .zadd(&format!("burn_events:token:{token}"), member.clone(), score)
            .await?;
        self.client
            .zadd(&format!("burn_events:burner:{burner}"), member.clone(), score)
            .await?;

        let event_key = format!(
            "burn_event:{}:{}",
            hex_encode(burn.tx_hash.as_slice()),
            burn.log_index
        );
        self.client
            .set_json(&event_key, &record, Some(BURN_EVENT_TTL))
            .await?;

        let envelope = serde_json::json!({ "type": "burn_event", "data": record });
        self.client
            .publish("burn_events", envelope.to_string())
            .await?;

        info!(
            "Saved burn event: {} tokens burned by {}",
            record.amount, record.burner_address
        );
        Ok(())
    }

    /// Drop trade-stream members older than `hours` across all tokens.
    /// Returns the number of removed members.
    pub async fn cleanup_old_trades(&self, hours: u64) -> Result<u64> {
        let cutoff = (Utc::now().timestamp().max(0) as u64).saturating_sub(hours * 3600);
        let pattern = format!("{}stream:*", self.settings.trades_key_prefix);
        let stream_keys = self.client.keys(&pattern).await?;

        let mut removed = 0u64;
        for key in stream_keys {
            removed += self
                .client
                .zremrangebyscore(&key, 0.0, cutoff as f64)
                .await?;
        }

        info!("Cleaned up {removed} old trade records");
        Ok(removed)
    }

    pub async fn health_check(&self) -> bool {
        self.client.ping().await.is_ok()
    }
}
