use alloy::primitives::Address;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 24h rolling market view for one token, recomputed on every trade.
#[derive(Debug, Clone)]
pub struct MarketData {
    pub token: Address,
    pub current_price: BigDecimal,
    pub price_change_24h: BigDecimal,
    pub price_change_pct_24h: BigDecimal,
    pub volume_24h: BigDecimal,
    pub volume_eth_24h: BigDecimal,
    pub trades_24h: u32,
    pub market_cap: BigDecimal,
    pub last_updated: DateTime<Utc>,
}

/// Wire form of the market summary written to `market:<token>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRecord {
    pub token_address: String,
    pub current_price: String,
    pub price_change_24h: String,
    pub price_change_percent_24h: String,
    pub volume_24h: String,
    pub volume_eth_24h: String,
    pub trades_24h: u32,
    pub market_cap: String,
    pub last_updated: String,
}

impl MarketRecord {
    pub fn from_market(market: &MarketData) -> Self {
        Self {
            token_address: market.token.to_checksum(None),
            current_price: market.current_price.to_string(),
            price_change_24h: market.price_change_24h.to_string(),
            price_change_percent_24h: market.price_change_pct_24h.to_string(),
            volume_24h: market.volume_24h.to_string(),
            volume_eth_24h: market.volume_eth_24h.to_string(),
            trades_24h: market.trades_24h,
            market_cap: market.market_cap.to_string(),
            last_updated: market.last_updated.to_rfc3339(),
        }
    }
}
