//! Log decoding.
//!
//! Classifies each raw log by source contract (factory, registered curve,
//! launched token), dispatches on topic0, and converts the payload into a
//! [`DecodedEvent`]. Wei amounts become 18-digit decimals here and nowhere
//! else.

use std::sync::Arc;

use alloy::{primitives::Address, rpc::types::Log, sol_types::SolEvent};
use chrono::{DateTime, Utc};

use crate::{
    abis,
    errors::ListenerError,
    models::{BlockInfo, BurnEvent, CurveDeployment, DecodedEvent, Trade, TradeDirection},
    utils::{decimal_from_wei, hex_encode},
    worker::registry::CurveRegistry,
};

/// Decodes raw logs into domain events.
pub struct Decoder {
    factory: Option<Address>,
    registry: Arc<CurveRegistry>,
}

impl Decoder {
    pub fn new(factory: Option<Address>, registry: Arc<CurveRegistry>) -> Self {
        Self { factory, registry }
    }

    /// Decode one raw log.
    ///
    /// Returns `Ok(None)` for logs from contracts the listener does not
    /// watch (the caller drops them with a warning). Reorged logs
    /// (`removed = true`) and malformed payloads surface as errors.
    pub fn decode(&self, log: &Log) -> Result<Option<DecodedEvent>, ListenerError> {
        if log.removed {
            return Err(ListenerError::ReorgHint {
                tx_hash: hex_encode(log.transaction_hash.unwrap_or_default().as_slice()),
                log_index: log.log_index.unwrap_or(0),
            });
        }

        let address = log.inner.address;

        if self.factory == Some(address) {
            return self.decode_factory(log);
        }
        if self.registry.contains(&address) {
            return self.decode_curve(log);
        }
        if self.registry.is_token(&address) {
            return self.decode_token(log);
        }

        Ok(None)
    }

    fn decode_factory(&self, log: &Log) -> Result<Option<DecodedEvent>, ListenerError> {
        let Some(topic0) = log.inner.data.topics().first().copied() else {
            return Ok(None);
        };

        match topic0 {
            t if t == abis::BondingCurveDeployed::SIGNATURE_HASH => {
                let event = abis::BondingCurveDeployed::decode_log_data(&log.inner.data)
                    .map_err(|e| decode_err("BondingCurveDeployed", log, e))?;
                let (block, tx_hash, log_index) = log_meta(log);
                Ok(Some(DecodedEvent::CurveDeployed(CurveDeployment {
                    token: event.tokenAddress,
                    curve: event.curveAddress,
                    creator: event.creator,
                    name: event.name,
                    symbol: event.symbol,
                    timestamp: event.timestamp.saturating_to::<u64>(),
                    block,
                    tx_hash,
                    log_index,
                })))
            }
            t if t == abis::RegularTokenCreatorApproved::SIGNATURE_HASH => {
                let event = abis::RegularTokenCreatorApproved::decode_log_data(&log.inner.data)
                    .map_err(|e| decode_err("RegularTokenCreatorApproved", log, e))?;
                Ok(Some(DecodedEvent::CreatorApproved {
                    creator: event.creator,
                    timestamp: event.timestamp.saturating_to::<u64>(),
                }))
            }
            t if t == abis::RegularTokenCreatorRevoked::SIGNATURE_HASH => {
                let event = abis::RegularTokenCreatorRevoked::decode_log_data(&log.inner.data)
                    .map_err(|e| decode_err("RegularTokenCreatorRevoked", log, e))?;
                Ok(Some(DecodedEvent::CreatorRevoked {
                    creator: event.creator,
                    timestamp: event.timestamp.saturating_to::<u64>(),
                }))
            }
            _ => Err(unknown_topic(log)),
        }
    }

    fn decode_curve(&self, log: &Log) -> Result<Option<DecodedEvent>, ListenerError> {
        let Some(topic0) = log.inner.data.topics().first().copied() else {
            return Ok(None);
        };
        let curve = log.inner.address;

        match topic0 {
            t if t == abis::Trade::SIGNATURE_HASH => {
                let event = abis::Trade::decode_log_data(&log.inner.data)
                    .map_err(|e| decode_err("Trade", log, e))?;
                let token = self.token_for(&curve, log, "Trade")?;
                let (block, tx_hash, log_index) = log_meta(log);

                let mut ts = event.timestamp.saturating_to::<u64>();
                if ts == 0 {
                    ts = block.timestamp;
                }

                Ok(Some(DecodedEvent::Trade(Trade {
                    token,
                    curve,
                    user: event.user,
                    direction: TradeDirection::from_is_buy(event.isBuy),
                    token_amount: decimal_from_wei(event.tokenDelta),
                    eth_amount: decimal_from_wei(event.ethInOrOut),
                    price_before: decimal_from_wei(event.priceBefore),
                    price_after: decimal_from_wei(event.priceAfter),
                    total_supply: decimal_from_wei(event.supplyAfter),
                    block,
                    tx_hash,
                    log_index,
                    ts: utc_from(ts),
                })))
            }
            // TokensPurchased / TokensSold do not carry priceBefore or
            // supplyAfter; canonicalize with zero sentinels.
            t if t == abis::TokensPurchased::SIGNATURE_HASH => {
                let event = abis::TokensPurchased::decode_log_data(&log.inner.data)
                    .map_err(|e| decode_err("TokensPurchased", log, e))?;
                let token = self.token_for(&curve, log, "TokensPurchased")?;
                let (block, tx_hash, log_index) = log_meta(log);

                Ok(Some(DecodedEvent::Trade(Trade {
                    token,
                    curve,
                    user: event.buyer,
                    direction: TradeDirection::Buy,
                    token_amount: decimal_from_wei(event.tokensReceived),
                    eth_amount: decimal_from_wei(event.ethSpent),
                    price_before: decimal_from_wei(alloy::primitives::U256::ZERO),
                    price_after: decimal_from_wei(event.newPrice),
                    total_supply: decimal_from_wei(alloy::primitives::U256::ZERO),
                    block,
                    tx_hash,
                    log_index,
                    ts: utc_from(block.timestamp),
                })))
            }
            t if t == abis::TokensSold::SIGNATURE_HASH => {
                let event = abis::TokensSold::decode_log_data(&log.inner.data)
                    .map_err(|e| decode_err("TokensSold", log, e))?;
                let token = self.token_for(&curve, log, "TokensSold")?;
                let (block, tx_hash, log_index) = log_meta(log);

                Ok(Some(DecodedEvent::Trade(Trade {
                    token,
                    curve,
                    user: event.seller,
                    direction: TradeDirection::Sell,
                    token_amount: decimal_from_wei(event.tokenAmount),
                    eth_amount: decimal_from_wei(event.ethReceived),
                    price_before: decimal_from_wei(alloy::primitives::U256::ZERO),
                    price_after: decimal_from_wei(event.newPrice),
                    total_supply: decimal_from_wei(alloy::primitives::U256::ZERO),
                    block,
                    tx_hash,
                    log_index,
                    ts: utc_from(block.timestamp),
                })))
            }
            t if t == abis::MilestoneReached::SIGNATURE_HASH => {
                let event = abis::MilestoneReached::decode_log_data(&log.inner.data)
                    .map_err(|e| decode_err("MilestoneReached", log, e))?;
                Ok(Some(DecodedEvent::MilestoneReached {
                    curve,
                    level: event.level.saturating_to::<u64>(),
                    reserve_eth: decimal_from_wei(event.reserveETH),
                    timestamp: event.timestamp.saturating_to::<u64>(),
                }))
            }
            t if t == abis::ReadyForDEX::SIGNATURE_HASH => {
                let event = abis::ReadyForDEX::decode_log_data(&log.inner.data)
                    .map_err(|e| decode_err("ReadyForDEX", log, e))?;
                Ok(Some(DecodedEvent::ReadyForDex {
                    curve,
                    timestamp: event.timestamp.saturating_to::<u64>(),
                }))
            }
            t if t == abis::MigrationCompleted::SIGNATURE_HASH => {
                let event = abis::MigrationCompleted::decode_log_data(&log.inner.data)
                    .map_err(|e| decode_err("MigrationCompleted", log, e))?;
                Ok(Some(DecodedEvent::MigrationCompleted {
                    curve,
                    pool: event.pool,
                    timestamp: event.timestamp.saturating_to::<u64>(),
                }))
            }
            _ => Err(unknown_topic(log)),
        }
    }

    fn decode_token(&self, log: &Log) -> Result<Option<DecodedEvent>, ListenerError> {
        let Some(topic0) = log.inner.data.topics().first().copied() else {
            return Ok(None);
        };

        match topic0 {
            t if t == abis::CommunityBurn::SIGNATURE_HASH => {
                let event = abis::CommunityBurn::decode_log_data(&log.inner.data)
                    .map_err(|e| decode_err("CommunityBurn", log, e))?;
                let (block, tx_hash, log_index) = log_meta(log);
                Ok(Some(DecodedEvent::CommunityBurn(BurnEvent {
                    token: log.inner.address,
                    burner: event.creator,
                    amount: decimal_from_wei(event.amount),
                    total_burned: decimal_from_wei(event.totalBurned),
                    reason: event.reason,
                    timestamp: event.timestamp.saturating_to::<u64>(),
                    block_number: block.number,
                    tx_hash,
                    log_index,
                })))
            }
            _ => Err(unknown_topic(log)),
        }
    }

    fn token_for(
        &self,
        curve: &Address,
        log: &Log,
        event: &'static str,
    ) -> Result<Address, ListenerError> {
        self.registry
            .token_for_curve(curve)
            .ok_or_else(|| decode_err(event, log, "curve missing from registry"))
    }
}

fn log_meta(log: &Log) -> (BlockInfo, alloy::primitives::TxHash, u32) {
    let block = BlockInfo {
        number: log.block_number.unwrap_or(0),
        timestamp: log.block_timestamp.unwrap_or(0),
        hash: log.block_hash.unwrap_or_default(),
    };
    let tx_hash = log.transaction_hash.unwrap_or_default();
    let log_index = log.log_index.unwrap_or(0) as u32;
    (block, tx_hash, log_index)
}

fn utc_from(ts: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts as i64, 0).unwrap_or_else(Utc::now)
}

fn decode_err(event: &'static str, log: &Log, err: impl std::fmt::Display) -> ListenerError {
    ListenerError::Decode {
        event,
        tx_hash: hex_encode(log.transaction_hash.unwrap_or_default().as_slice()),
        log_index: log.log_index.unwrap_or(0),
        message: err.to_string(),
    }
}

fn unknown_topic(log: &Log) -> ListenerError {
    ListenerError::UnknownTopic {
        topic: log
            .inner
            .data
            .topics()
            .first()
            .map(|t| hex_encode(t.as_slice()))
            .unwrap_or_else(|| "<none>".to_string()),
        address: hex_encode(log.inner.address.as_slice()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BondingCurve;
    use alloy::primitives::{LogData, B256, U256};
    use bigdecimal::BigDecimal;
    use chrono::DateTime;

    const FACTORY: Address = Address::repeat_byte(0xfa);
    const CURVE: Address = Address::repeat_byte(0xcc);
    const TOKEN: Address = Address::repeat_byte(0x11);
    const USER: Address = Address::repeat_byte(0xaa);

    fn registry_with_curve() -> Arc<CurveRegistry> {
        let registry = Arc::new(CurveRegistry::new());
        registry.add(BondingCurve::new(
            TOKEN,
            CURVE,
            Address::repeat_byte(0xee),
            "Token".into(),
            "TKN".into(),
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        registry
    }

    fn decoder() -> Decoder {
        Decoder::new(Some(FACTORY), registry_with_curve())
    }

    fn raw_log(address: Address, data: LogData) -> Log {
        Log {
            inner: alloy::primitives::Log { address, data },
            block_hash: Some(B256::repeat_byte(0xbb)),
            block_number: Some(42),
            block_timestamp: Some(1_700_000_000),
            transaction_hash: Some(B256::repeat_byte(0x77)),
            transaction_index: Some(0),
            log_index: Some(3),
            removed: false,
        }
    }

    fn eth(units: u64) -> U256 {
        U256::from(units) * U256::from(10u128.pow(18))
    }

    #[test]
    fn trade_log_decodes_to_canonical_trade() {
        let event = abis::Trade {
            user: USER,
            isBuy: true,
            ethInOrOut: eth(2),
            tokenDelta: eth(100),
            priceBefore: U256::from(10u128.pow(16)),
            priceAfter: U256::from(2) * U256::from(10u128.pow(16)),
            supplyAfter: eth(1000),
            timestamp: U256::from(1_700_000_000u64),
        };
        let log = raw_log(CURVE, event.encode_log_data());

        let decoded = decoder().decode(&log).unwrap().unwrap();
        let DecodedEvent::Trade(trade) = decoded else {
            panic!("expected a trade");
        };

        assert_eq!(trade.token, TOKEN);
        assert_eq!(trade.curve, CURVE);
        assert_eq!(trade.user, USER);
        assert_eq!(trade.direction, TradeDirection::Buy);
        assert_eq!(trade.token_amount, BigDecimal::from(100).with_scale(18));
        assert_eq!(trade.eth_amount, BigDecimal::from(2).with_scale(18));
        assert_eq!(trade.price_before, "0.01".parse::<BigDecimal>().unwrap().with_scale(18));
        assert_eq!(trade.price_after, "0.02".parse::<BigDecimal>().unwrap().with_scale(18));
        assert_eq!(trade.total_supply, BigDecimal::from(1000).with_scale(18));
        assert_eq!(trade.block.number, 42);
        assert_eq!(trade.log_index, 3);
        assert_eq!(trade.ts_seconds(), 1_700_000_000);
    }

    #[test]
    fn tokens_purchased_canonicalizes_with_zero_sentinels() {
        let event = abis::TokensPurchased {
            buyer: USER,
            tokensReceived: eth(50),
            ethSpent: eth(1),
            platformFee: U256::ZERO,
            creatorFee: U256::ZERO,
            newPrice: U256::from(10u128.pow(16)),
        };
        let log = raw_log(CURVE, event.encode_log_data());

        let DecodedEvent::Trade(trade) = decoder().decode(&log).unwrap().unwrap() else {
            panic!("expected a trade");
        };

        assert_eq!(trade.direction, TradeDirection::Buy);
        assert_eq!(trade.price_before, BigDecimal::from(0).with_scale(18));
        assert_eq!(trade.total_supply, BigDecimal::from(0).with_scale(18));
        assert_eq!(trade.price_after, "0.01".parse::<BigDecimal>().unwrap().with_scale(18));
        // No event timestamp on this shape; block timestamp is used
        assert_eq!(trade.ts_seconds(), 1_700_000_000);
    }

    #[test]
    fn tokens_sold_canonicalizes_as_sell() {
        let event = abis::TokensSold {
            seller: USER,
            tokenAmount: eth(25),
            ethReceived: eth(1),
            platformFee: U256::ZERO,
            creatorFee: U256::ZERO,
            newPrice: U256::from(10u128.pow(15)),
        };
        let log = raw_log(CURVE, event.encode_log_data());

        let DecodedEvent::Trade(trade) = decoder().decode(&log).unwrap().unwrap() else {
            panic!("expected a trade");
        };
        assert_eq!(trade.direction, TradeDirection::Sell);
        assert_eq!(trade.token_amount, BigDecimal::from(25).with_scale(18));
    }

    #[test]
    fn factory_deploy_decodes_and_carries_metadata() {
        let event = abis::BondingCurveDeployed {
            tokenAddress: TOKEN,
            curveAddress: CURVE,
            creator: USER,
            name: "X".into(),
            symbol: "X".into(),
            timestamp: U256::from(1_700_000_000u64),
        };
        let log = raw_log(FACTORY, event.encode_log_data());

        let DecodedEvent::CurveDeployed(deploy) = decoder().decode(&log).unwrap().unwrap() else {
            panic!("expected a deployment");
        };
        assert_eq!(deploy.token, TOKEN);
        assert_eq!(deploy.curve, CURVE);
        assert_eq!(deploy.creator, USER);
        assert_eq!(deploy.name, "X");
        assert_eq!(deploy.timestamp, 1_700_000_000);
    }

    #[test]
    fn community_burn_decodes_from_token_address() {
        let event = abis::CommunityBurn {
            creator: USER,
            amount: eth(5),
            totalBurned: eth(10),
            reason: "milestone".into(),
            timestamp: U256::from(1_700_000_000u64),
        };
        let log = raw_log(TOKEN, event.encode_log_data());

        let DecodedEvent::CommunityBurn(burn) = decoder().decode(&log).unwrap().unwrap() else {
            panic!("expected a burn");
        };
        assert_eq!(burn.token, TOKEN);
        assert_eq!(burn.burner, USER);
        assert_eq!(burn.amount, BigDecimal::from(5).with_scale(18));
        assert_eq!(burn.reason, "milestone");
    }

    #[test]
    fn removed_log_is_a_reorg_hint() {
        let event = abis::ReadyForDEX {
            mcapOrReserves: U256::ZERO,
            timestamp: U256::from(1u8),
        };
        let mut log = raw_log(CURVE, event.encode_log_data());
        log.removed = true;

        match decoder().decode(&log) {
            Err(ListenerError::ReorgHint { .. }) => {}
            other => panic!("expected a reorg hint, got {other:?}"),
        }
    }

    #[test]
    fn unwatched_address_is_dropped() {
        let event = abis::ReadyForDEX {
            mcapOrReserves: U256::ZERO,
            timestamp: U256::from(1u8),
        };
        let log = raw_log(Address::repeat_byte(0x99), event.encode_log_data());
        assert!(decoder().decode(&log).unwrap().is_none());
    }

    #[test]
    fn unknown_topic_on_watched_curve_is_reported() {
        // An event the curve binding does not know
        let event = abis::CommunityBurn {
            creator: USER,
            amount: U256::ZERO,
            totalBurned: U256::ZERO,
            reason: String::new(),
            timestamp: U256::ZERO,
        };
        let log = raw_log(CURVE, event.encode_log_data());
        match decoder().decode(&log) {
            Err(ListenerError::UnknownTopic { .. }) => {}
            other => panic!("expected unknown topic, got {other:?}"),
        }
    }

    #[test]
    fn lifecycle_events_decode() {
        let milestone = abis::MilestoneReached {
            level: U256::from(2u8),
            reserveETH: eth(30),
            vestedTokens: eth(1000),
            timestamp: U256::from(1_700_000_000u64),
        };
        let log = raw_log(CURVE, milestone.encode_log_data());
        let DecodedEvent::MilestoneReached { level, .. } =
            decoder().decode(&log).unwrap().unwrap()
        else {
            panic!("expected a milestone");
        };
        assert_eq!(level, 2);

        let migrated = abis::MigrationCompleted {
            pool: Address::repeat_byte(0x44),
            tokenId: U256::from(7u8),
            ethUsed: eth(30),
            tokenUsed: eth(500),
            timestamp: U256::from(1_700_000_100u64),
        };
        let log = raw_log(CURVE, migrated.encode_log_data());
        let DecodedEvent::MigrationCompleted { pool, .. } =
            decoder().decode(&log).unwrap().unwrap()
        else {
            panic!("expected a migration");
        };
        assert_eq!(pool, Address::repeat_byte(0x44));
    }
}
