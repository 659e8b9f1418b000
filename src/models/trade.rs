use alloy::primitives::{Address, TxHash, B256};
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{errors::ListenerError, utils::hex_encode};

/// Direction of a bonding-curve trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "BUY",
            TradeDirection::Sell => "SELL",
        }
    }

    pub fn from_is_buy(is_buy: bool) -> Self {
        if is_buy {
            TradeDirection::Buy
        } else {
            TradeDirection::Sell
        }
    }
}

/// Block the log was included in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: u64,
    pub hash: B256,
}

/// Parse a transaction hash, enforcing the `0x` + 64 hex digit form.
pub fn parse_tx_hash(s: &str) -> Result<TxHash, ListenerError> {
    if !s.starts_with("0x") || s.len() != 66 {
        return Err(ListenerError::Config(format!("invalid tx hash: {s}")));
    }
    TxHash::from_str(s).map_err(|e| ListenerError::Config(format!("invalid tx hash {s}: {e}")))
}

/// Canonical trade, the unit every downstream component consumes.
///
/// All amounts are 18-digit decimals; wei conversion happened at decode.
/// `price_before` and `total_supply` are zero when the source event did not
/// carry them (`TokensPurchased` / `TokensSold`).
#[derive(Debug, Clone)]
pub struct Trade {
    pub token: Address,
    pub curve: Address,
    pub user: Address,
    pub direction: TradeDirection,
    pub token_amount: BigDecimal,
    pub eth_amount: BigDecimal,
    pub price_before: BigDecimal,
    pub price_after: BigDecimal,
    pub total_supply: BigDecimal,
    pub block: BlockInfo,
    pub tx_hash: TxHash,
    pub log_index: u32,
    pub ts: DateTime<Utc>,
}

impl Trade {
    /// Price actually paid per token. Falls back to `price_after` for
    /// zero-amount trades.
    pub fn effective_price(&self) -> BigDecimal {
        if self.token_amount.is_zero() {
            self.price_after.clone()
        } else {
            &self.eth_amount / &self.token_amount
        }
    }

    /// Relative price movement caused by this trade, as a fraction.
    pub fn price_impact(&self) -> BigDecimal {
        if self.price_before.is_zero() {
            return BigDecimal::zero();
        }
        let diff = &self.price_after - &self.price_before;
        diff.abs() / &self.price_before
    }

    pub fn is_large(&self, threshold_eth: &BigDecimal) -> bool {
        self.eth_amount >= *threshold_eth
    }

    /// Opening price for a fresh candle started by this trade.
    pub fn opening_price(&self) -> BigDecimal {
        if self.price_before.is_zero() {
            self.price_after.clone()
        } else {
            self.price_before.clone()
        }
    }

    pub fn ts_seconds(&self) -> u64 {
        self.ts.timestamp().max(0) as u64
    }

    /// Stable identifier used in log records.
    pub fn event_id(&self) -> String {
        format!("{}#{}", hex_encode(self.tx_hash.as_slice()), self.log_index)
    }
}

/// Wire form of a trade: the member stored in `trades:stream:<token>` and
/// the payload shipped to the durable stream and the live socket.
/// Decimal fields are strings to avoid float loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub token_address: String,
    pub curve_address: String,
    pub user_address: String,
    pub direction: String,
    pub token_amount: String,
    pub eth_amount: String,
    pub price_before: String,
    pub price_after: String,
    pub total_supply: String,
    pub block_number: u64,
    pub tx_hash: String,
    pub log_index: u32,
    pub timestamp: i64,
}

impl TradeRecord {
    pub fn from_trade(trade: &Trade) -> Self {
        Self {
            token_address: trade.token.to_checksum(None),
            curve_address: trade.curve.to_checksum(None),
            user_address: trade.user.to_checksum(None),
            direction: trade.direction.as_str().to_string(),
            token_amount: trade.token_amount.to_string(),
            eth_amount: trade.eth_amount.to_string(),
            price_before: trade.price_before.to_string(),
            price_after: trade.price_after.to_string(),
            total_supply: trade.total_supply.to_string(),
            block_number: trade.block.number,
            tx_hash: hex_encode(trade.tx_hash.as_slice()),
            log_index: trade.log_index,
            timestamp: trade.ts.timestamp(),
        }
    }

    fn decimal(field: &str) -> BigDecimal {
        BigDecimal::from_str(field).unwrap_or_else(|_| BigDecimal::zero())
    }

    pub fn token_amount_decimal(&self) -> BigDecimal {
        Self::decimal(&self.token_amount)
    }

    pub fn eth_amount_decimal(&self) -> BigDecimal {
        Self::decimal(&self.eth_amount)
    }

    pub fn price_before_decimal(&self) -> BigDecimal {
        Self::decimal(&self.price_before)
    }

    pub fn price_after_decimal(&self) -> BigDecimal {
        Self::decimal(&self.price_after)
    }
}
