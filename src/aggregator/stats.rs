//! 24h rolling market statistics.
//!
//! Recomputed on every accepted trade from the per-token time-ordered
//! trade stream in the cache.

use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use log::warn;

use crate::{
    cache::Cache,
    models::{MarketData, Trade, TradeRecord},
};

const WINDOW_SECS: u64 = 24 * 3600;

/// Aggregates over the 24h window.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats24h {
    pub price_change: BigDecimal,
    pub price_change_pct: BigDecimal,
    pub volume: BigDecimal,
    pub volume_eth: BigDecimal,
    pub trades: u32,
}

impl Stats24h {
    fn zeroed() -> Self {
        Self {
            price_change: BigDecimal::zero(),
            price_change_pct: BigDecimal::zero(),
            volume: BigDecimal::zero(),
            volume_eth: BigDecimal::zero(),
            trades: 0,
        }
    }
}

/// Pure aggregation over the window's trade records.
///
/// `price_change` spans from the first trade's `price_before` to the last
/// trade's `price_after`; the percent change is zero when the first trade
/// opened from a zero price.
pub fn stats_from_records(mut records: Vec<TradeRecord>) -> Stats24h {
    if records.is_empty() {
        return Stats24h::zeroed();
    }

    records.sort_by_key(|r| (r.timestamp, r.block_number, r.log_index));

    let first = records.first().expect("non-empty window");
    let last = records.last().expect("non-empty window");

    let first_before = first.price_before_decimal();
    let price_change = last.price_after_decimal() - &first_before;
    let price_change_pct = if first_before.is_zero() {
        BigDecimal::zero()
    } else {
        (&price_change / &first_before) * BigDecimal::from(100)
    };

    let mut volume = BigDecimal::zero();
    let mut volume_eth = BigDecimal::zero();
    for record in &records {
        volume += record.token_amount_decimal();
        volume_eth += record.eth_amount_decimal();
    }

    Stats24h {
        price_change,
        price_change_pct,
        volume,
        volume_eth,
        trades: records.len() as u32,
    }
}

/// Recompute the 24h market view for the trade's token.
///
/// Even when the window read fails or is empty, the result carries the
/// current price and market cap from the trade itself.
pub async fn compute_market_data(cache: &Cache, trade: &Trade) -> MarketData {
    let now = Utc::now();
    let end = now.timestamp().max(0) as u64;
    let start = end.saturating_sub(WINDOW_SECS);

    let stats = match cache.trades_in_window(&trade.token, start, end).await {
        Ok(records) => stats_from_records(records),
        Err(e) => {
            warn!(
                "24h window read failed for {} ({}): {e:#}",
                trade.token,
                trade.event_id()
            );
            Stats24h::zeroed()
        }
    };

    MarketData {
        token: trade.token,
        current_price: trade.price_after.clone(),
        price_change_24h: stats.price_change,
        price_change_pct_24h: stats.price_change_pct,
        volume_24h: stats.volume,
        volume_eth_24h: stats.volume_eth,
        trades_24h: stats.trades,
        market_cap: &trade.total_supply * &trade.price_after,
        last_updated: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(before: &str, after: &str, amount: &str, eth: &str, ts: i64) -> TradeRecord {
        TradeRecord {
            token_address: "0x0000000000000000000000000000000000000011".into(),
            curve_address: "0x00000000000000000000000000000000000000cc".into(),
            user_address: "0x00000000000000000000000000000000000000aa".into(),
            direction: "BUY".into(),
            token_amount: amount.into(),
            eth_amount: eth.into(),
            price_before: before.into(),
            price_after: after.into(),
            total_supply: "1000".into(),
            block_number: 1,
            tx_hash: "0x00".into(),
            log_index: 0,
            timestamp: ts,
        }
    }

    #[test]
    fn window_aggregates_follow_first_and_last_trade() {
        let records = vec![
            record("0.01", "0.02", "100", "2", 1_700_000_000),
            record("0.02", "0.015", "50", "0.75", 1_700_000_100),
            record("0.015", "0.03", "25", "0.6", 1_700_000_200),
        ];

        let stats = stats_from_records(records);
        assert_eq!(stats.price_change, "0.02".parse::<BigDecimal>().unwrap());
        assert_eq!(stats.price_change_pct, BigDecimal::from(200));
        assert_eq!(stats.volume, BigDecimal::from(175));
        assert_eq!(stats.volume_eth, "3.35".parse::<BigDecimal>().unwrap());
        assert_eq!(stats.trades, 3);
    }

    #[test]
    fn out_of_order_records_are_sorted_by_timestamp() {
        let records = vec![
            record("0.015", "0.03", "1", "0.1", 1_700_000_200),
            record("0.01", "0.02", "1", "0.1", 1_700_000_000),
        ];

        let stats = stats_from_records(records);
        // First trade is the earliest one after sorting
        assert_eq!(stats.price_change, "0.02".parse::<BigDecimal>().unwrap());
        assert_eq!(stats.price_change_pct, BigDecimal::from(200));
    }

    #[test]
    fn empty_window_is_all_zeroes() {
        let stats = stats_from_records(Vec::new());
        assert_eq!(stats, Stats24h {
            price_change: BigDecimal::zero(),
            price_change_pct: BigDecimal::zero(),
            volume: BigDecimal::zero(),
            volume_eth: BigDecimal::zero(),
            trades: 0,
        });
    }

    #[test]
    fn zero_opening_price_pins_percent_change_to_zero() {
        let records = vec![
            record("0", "0.02", "100", "2", 1_700_000_000),
            record("0.02", "0.04", "10", "0.4", 1_700_000_100),
        ];

        let stats = stats_from_records(records);
        assert_eq!(stats.price_change, "0.04".parse::<BigDecimal>().unwrap());
        assert_eq!(stats.price_change_pct, BigDecimal::zero());
        assert_eq!(stats.trades, 2);
    }
}
