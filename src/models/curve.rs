use alloy::primitives::Address;
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Trade;

/// Lifecycle of a curve as observed in the chain event stream.
///
/// `Discovered -> Active -> ReadyForDex -> Migrated`. Transitions never go
/// backwards; a stale lifecycle event on an already-advanced curve is a
/// no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveStatus {
    Discovered,
    Active,
    ReadyForDex,
    Migrated,
}

impl CurveStatus {
    pub fn is_trading_expected(&self) -> bool {
        matches!(self, CurveStatus::Active | CurveStatus::ReadyForDex)
    }
}

/// Bonding-curve record for one launched token.
///
/// Created on deployment (or one-shot discovery), mutated by every accepted
/// trade, never deleted. Migration flips `active` off but keeps the record.
#[derive(Debug, Clone)]
pub struct BondingCurve {
    pub token: Address,
    pub curve: Address,
    pub creator: Address,
    pub name: String,
    pub symbol: String,
    pub total_supply: BigDecimal,
    pub current_supply: BigDecimal,
    pub reserve_balance: BigDecimal,
    pub current_price: BigDecimal,
    pub active: bool,
    pub status: CurveStatus,
    pub deployed_at: DateTime<Utc>,
    pub total_trades: u64,
    pub total_volume_eth: BigDecimal,
}

impl BondingCurve {
    pub fn new(
        token: Address,
        curve: Address,
        creator: Address,
        name: String,
        symbol: String,
        deployed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token,
            curve,
            creator,
            name,
            symbol,
            total_supply: BigDecimal::zero(),
            current_supply: BigDecimal::zero(),
            reserve_balance: BigDecimal::zero(),
            current_price: BigDecimal::zero(),
            active: true,
            status: CurveStatus::Active,
            deployed_at,
            total_trades: 0,
            total_volume_eth: BigDecimal::zero(),
        }
    }

    pub fn market_cap(&self) -> BigDecimal {
        &self.current_supply * &self.current_price
    }

    pub fn update_from_trade(&mut self, trade: &Trade) {
        self.current_price = trade.price_after.clone();
        if !trade.total_supply.is_zero() {
            self.current_supply = trade.total_supply.clone();
        }
        self.total_trades += 1;
        self.total_volume_eth += &trade.eth_amount;
    }

    /// Advance the lifecycle; transitions only move forward.
    pub fn advance_status(&mut self, next: CurveStatus) {
        let rank = |s: CurveStatus| match s {
            CurveStatus::Discovered => 0,
            CurveStatus::Active => 1,
            CurveStatus::ReadyForDex => 2,
            CurveStatus::Migrated => 3,
        };
        if rank(next) > rank(self.status) {
            self.status = next;
            if next == CurveStatus::Migrated {
                self.active = false;
            }
        }
    }
}

/// Wire form of the curve summary written to `curve:<token>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveRecord {
    pub token_address: String,
    pub curve_address: String,
    pub creator_address: String,
    pub name: String,
    pub symbol: String,
    pub current_price: String,
    pub current_supply: String,
    pub market_cap: String,
    pub total_trades: u64,
    pub total_volume_eth: String,
    pub is_active: bool,
    pub status: CurveStatus,
    pub deployed_at: String,
}

impl CurveRecord {
    pub fn from_curve(curve: &BondingCurve) -> Self {
        Self {
            token_address: curve.token.to_checksum(None),
            curve_address: curve.curve.to_checksum(None),
            creator_address: curve.creator.to_checksum(None),
            name: curve.name.clone(),
            symbol: curve.symbol.clone(),
            current_price: curve.current_price.to_string(),
            current_supply: curve.current_supply.to_string(),
            market_cap: curve.market_cap().to_string(),
            total_trades: curve.total_trades,
            total_volume_eth: curve.total_volume_eth.to_string(),
            is_active: curve.active,
            status: curve.status,
            deployed_at: curve.deployed_at.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlockInfo, TradeDirection};
    use alloy::primitives::{TxHash, B256};
    use chrono::DateTime;

    fn curve() -> BondingCurve {
        BondingCurve::new(
            Address::ZERO,
            Address::ZERO,
            Address::ZERO,
            "Token".into(),
            "TKN".into(),
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        )
    }

    fn trade(supply: &str) -> Trade {
        Trade {
            token: Address::ZERO,
            curve: Address::ZERO,
            user: Address::ZERO,
            direction: TradeDirection::Buy,
            token_amount: "100".parse::<BigDecimal>().unwrap(),
            eth_amount: "2".parse::<BigDecimal>().unwrap(),
            price_before: "0.01".parse::<BigDecimal>().unwrap(),
            price_after: "0.02".parse::<BigDecimal>().unwrap(),
            total_supply: supply.parse().unwrap(),
            block: BlockInfo {
                number: 1,
                timestamp: 1_700_000_000,
                hash: B256::ZERO,
            },
            tx_hash: TxHash::ZERO,
            log_index: 0,
            ts: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn trade_updates_price_supply_and_counters() {
        let mut c = curve();
        c.update_from_trade(&trade("1000"));
        assert_eq!(c.current_price, "0.02".parse::<BigDecimal>().unwrap());
        assert_eq!(c.current_supply, BigDecimal::from(1000));
        assert_eq!(c.total_trades, 1);
        assert_eq!(c.total_volume_eth, BigDecimal::from(2));
        assert_eq!(c.market_cap(), BigDecimal::from(20));
    }

    #[test]
    fn zero_supply_sentinel_keeps_previous_supply() {
        let mut c = curve();
        c.update_from_trade(&trade("1000"));
        c.update_from_trade(&trade("0"));
        assert_eq!(c.current_supply, BigDecimal::from(1000));
        assert_eq!(c.total_trades, 2);
    }

    #[test]
    fn status_only_advances_forward() {
        let mut c = curve();
        assert_eq!(c.status, CurveStatus::Active);
        assert!(c.status.is_trading_expected());

        c.advance_status(CurveStatus::ReadyForDex);
        assert_eq!(c.status, CurveStatus::ReadyForDex);
        assert!(c.status.is_trading_expected());

        c.advance_status(CurveStatus::Migrated);
        assert_eq!(c.status, CurveStatus::Migrated);
        assert!(!c.active);
        assert!(!c.status.is_trading_expected());

        // Stale lifecycle event arrives late
        c.advance_status(CurveStatus::ReadyForDex);
        assert_eq!(c.status, CurveStatus::Migrated);
    }
}
