use alloy::primitives::Address;
use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};

use crate::models::{Interval, Trade, TradeDirection};

/// One OHLCV bucket for a (token, interval) pair.
///
/// Invariants maintained by `apply`:
/// - `low <= min(open, close)` and `high >= max(open, close)`
/// - `total_vol == buy_vol + sell_vol`
/// - `trade_count >= 1` once the candle has been applied to
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub token: Address,
    pub interval: Interval,
    pub bucket_ts: u64,
    pub open: BigDecimal,
    pub high: BigDecimal,
    pub low: BigDecimal,
    pub close: BigDecimal,
    pub total_vol: BigDecimal,
    pub buy_vol: BigDecimal,
    pub sell_vol: BigDecimal,
    pub vol_eth: BigDecimal,
    pub trade_count: u32,
}

impl Candle {
    /// Fresh candle with zeroed volumes, opened at `open`.
    pub fn open_at(token: Address, interval: Interval, bucket_ts: u64, open: BigDecimal) -> Self {
        Self {
            token,
            interval,
            bucket_ts,
            high: open.clone(),
            low: open.clone(),
            close: open.clone(),
            open,
            total_vol: BigDecimal::zero(),
            buy_vol: BigDecimal::zero(),
            sell_vol: BigDecimal::zero(),
            vol_eth: BigDecimal::zero(),
            trade_count: 0,
        }
    }

    /// Fold a trade into this candle.
    ///
    /// The caller guarantees `interval.floor(trade.ts) == bucket_ts`.
    pub fn apply(&mut self, trade: &Trade) {
        if trade.price_after > self.high {
            self.high = trade.price_after.clone();
        }
        if trade.price_after < self.low {
            self.low = trade.price_after.clone();
        }
        self.close = trade.price_after.clone();

        self.total_vol += &trade.token_amount;
        match trade.direction {
            TradeDirection::Buy => self.buy_vol += &trade.token_amount,
            TradeDirection::Sell => self.sell_vol += &trade.token_amount,
        }
        self.vol_eth += &trade.eth_amount;
        self.trade_count += 1;
    }
}

/// Wire form of a candle, written to `candles:<token>:<interval>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleRecord {
    pub token_address: String,
    pub interval: String,
    pub timestamp: u64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub buy_volume: String,
    pub sell_volume: String,
    pub volume_eth: String,
    pub trades: u32,
}

impl CandleRecord {
    /// Rebuild the in-memory candle from its cached form. Returns `None`
    /// when any field fails to parse (treated as a cache miss).
    pub fn to_candle(&self) -> Option<Candle> {
        use std::str::FromStr;
        Some(Candle {
            token: Address::from_str(&self.token_address).ok()?,
            interval: Interval::parse(&self.interval)?,
            bucket_ts: self.timestamp,
            open: BigDecimal::from_str(&self.open).ok()?,
            high: BigDecimal::from_str(&self.high).ok()?,
            low: BigDecimal::from_str(&self.low).ok()?,
            close: BigDecimal::from_str(&self.close).ok()?,
            total_vol: BigDecimal::from_str(&self.volume).ok()?,
            buy_vol: BigDecimal::from_str(&self.buy_volume).ok()?,
            sell_vol: BigDecimal::from_str(&self.sell_volume).ok()?,
            vol_eth: BigDecimal::from_str(&self.volume_eth).ok()?,
            trade_count: self.trades,
        })
    }

    pub fn from_candle(candle: &Candle) -> Self {
        Self {
            token_address: candle.token.to_checksum(None),
            interval: candle.interval.as_str().to_string(),
            timestamp: candle.bucket_ts,
            open: candle.open.to_string(),
            high: candle.high.to_string(),
            low: candle.low.to_string(),
            close: candle.close.to_string(),
            volume: candle.total_vol.to_string(),
            buy_volume: candle.buy_vol.to_string(),
            sell_volume: candle.sell_vol.to_string(),
            volume_eth: candle.vol_eth.to_string(),
            trades: candle.trade_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BlockInfo;
    use alloy::primitives::{TxHash, B256};
    use chrono::DateTime;

    fn trade(direction: TradeDirection, amount: &str, eth: &str, after: &str, ts: i64) -> Trade {
        Trade {
            token: Address::ZERO,
            curve: Address::ZERO,
            user: Address::ZERO,
            direction,
            token_amount: amount.parse().unwrap(),
            eth_amount: eth.parse().unwrap(),
            price_before: "0.01".parse::<BigDecimal>().unwrap(),
            price_after: after.parse().unwrap(),
            total_supply: "1000".parse::<BigDecimal>().unwrap(),
            block: BlockInfo {
                number: 1,
                timestamp: ts as u64,
                hash: B256::ZERO,
            },
            tx_hash: TxHash::ZERO,
            log_index: 0,
            ts: DateTime::from_timestamp(ts, 0).unwrap(),
        }
    }

    #[test]
    fn single_buy_produces_expected_ohlcv() {
        let t = trade(TradeDirection::Buy, "100", "2", "0.02", 1_700_000_000);
        let mut candle = Candle::open_at(
            Address::ZERO,
            Interval::OneMinute,
            Interval::OneMinute.floor(t.ts_seconds()),
            t.opening_price(),
        );
        candle.apply(&t);

        assert_eq!(candle.bucket_ts, 1_700_000_000);
        assert_eq!(candle.open, "0.01".parse::<BigDecimal>().unwrap());
        assert_eq!(candle.high, "0.02".parse::<BigDecimal>().unwrap());
        assert_eq!(candle.low, "0.01".parse::<BigDecimal>().unwrap());
        assert_eq!(candle.close, "0.02".parse::<BigDecimal>().unwrap());
        assert_eq!(candle.total_vol, BigDecimal::from(100));
        assert_eq!(candle.buy_vol, BigDecimal::from(100));
        assert_eq!(candle.sell_vol, BigDecimal::zero());
        assert_eq!(candle.vol_eth, BigDecimal::from(2));
        assert_eq!(candle.trade_count, 1);
    }

    #[test]
    fn two_trades_in_same_bucket_accumulate() {
        let buy = trade(TradeDirection::Buy, "100", "2", "0.02", 1_700_000_000);
        let sell = trade(TradeDirection::Sell, "50", "0.25", "0.005", 1_700_000_030);

        let mut candle = Candle::open_at(
            Address::ZERO,
            Interval::OneMinute,
            1_700_000_000,
            buy.opening_price(),
        );
        candle.apply(&buy);
        candle.apply(&sell);

        assert_eq!(candle.open, "0.01".parse::<BigDecimal>().unwrap());
        assert_eq!(candle.high, "0.02".parse::<BigDecimal>().unwrap());
        assert_eq!(candle.low, "0.005".parse::<BigDecimal>().unwrap());
        assert_eq!(candle.close, "0.005".parse::<BigDecimal>().unwrap());
        assert_eq!(candle.total_vol, BigDecimal::from(150));
        assert_eq!(candle.buy_vol, BigDecimal::from(100));
        assert_eq!(candle.sell_vol, BigDecimal::from(50));
        assert_eq!(candle.trade_count, 2);
    }

    #[test]
    fn volume_split_always_sums_to_total() {
        let trades = [
            trade(TradeDirection::Buy, "1.5", "0.1", "0.02", 1_700_000_000),
            trade(TradeDirection::Sell, "2.25", "0.1", "0.015", 1_700_000_010),
            trade(TradeDirection::Buy, "0.000000000000000001", "0", "0.02", 1_700_000_020),
        ];
        let mut candle = Candle::open_at(
            Address::ZERO,
            Interval::OneMinute,
            1_700_000_000,
            "0.01".parse::<BigDecimal>().unwrap(),
        );
        for t in &trades {
            candle.apply(t);
        }
        assert_eq!(candle.total_vol, &candle.buy_vol + &candle.sell_vol);
        assert!(candle.low <= candle.open && candle.low <= candle.close);
        assert!(candle.high >= candle.open && candle.high >= candle.close);
    }

    #[test]
    fn zero_amount_trade_moves_price_but_not_volume() {
        let mut zero = trade(TradeDirection::Buy, "0", "0", "0.03", 1_700_000_000);
        zero.price_before = "0.01".parse::<BigDecimal>().unwrap();

        let mut candle = Candle::open_at(
            Address::ZERO,
            Interval::OneMinute,
            1_700_000_000,
            zero.opening_price(),
        );
        candle.apply(&zero);

        assert_eq!(candle.close, "0.03".parse::<BigDecimal>().unwrap());
        assert_eq!(candle.high, "0.03".parse::<BigDecimal>().unwrap());
        assert_eq!(candle.total_vol, BigDecimal::zero());
        assert_eq!(candle.buy_vol, BigDecimal::zero());
        assert_eq!(candle.trade_count, 1);
    }
}
