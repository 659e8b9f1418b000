use alloy::primitives::{Address, TxHash};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::{
    models::{BlockInfo, Candle, MarketData, Trade},
    utils::hex_encode,
};

/// A factory deployment, decoded from `BondingCurveDeployed` or synthesized
/// from one-shot curve discovery.
#[derive(Debug, Clone)]
pub struct CurveDeployment {
    pub token: Address,
    pub curve: Address,
    pub creator: Address,
    pub name: String,
    pub symbol: String,
    pub timestamp: u64,
    pub block: BlockInfo,
    pub tx_hash: TxHash,
    pub log_index: u32,
}

/// A `CommunityBurn` emitted by a launched token contract.
#[derive(Debug, Clone)]
pub struct BurnEvent {
    pub token: Address,
    pub burner: Address,
    pub amount: BigDecimal,
    pub total_burned: BigDecimal,
    pub reason: String,
    pub timestamp: u64,
    pub block_number: u64,
    pub tx_hash: TxHash,
    pub log_index: u32,
}

/// Wire form of a burn event for the `burn_events:*` sorted sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurnRecord {
    pub token_address: String,
    pub burner_address: String,
    pub amount: String,
    pub total_burned: String,
    pub reason: String,
    pub timestamp: u64,
    pub block_number: u64,
    pub transaction_hash: String,
    pub log_index: u32,
}

impl BurnRecord {
    pub fn from_burn(burn: &BurnEvent) -> Self {
        Self {
            token_address: hex_encode(burn.token.as_slice()),
            burner_address: hex_encode(burn.burner.as_slice()),
            amount: burn.amount.to_string(),
            total_burned: burn.total_burned.to_string(),
            reason: burn.reason.clone(),
            timestamp: burn.timestamp,
            block_number: burn.block_number,
            transaction_hash: hex_encode(burn.tx_hash.as_slice()),
            log_index: burn.log_index,
        }
    }
}

/// Output of the log decoder: one variant per chain event the listener
/// understands. This is the type flowing over the pipeline channel from the
/// chain client to the dispatcher.
#[derive(Debug, Clone)]
pub enum DecodedEvent {
    CurveDeployed(CurveDeployment),
    Trade(Trade),
    MilestoneReached {
        curve: Address,
        level: u64,
        reserve_eth: BigDecimal,
        timestamp: u64,
    },
    ReadyForDex {
        curve: Address,
        timestamp: u64,
    },
    MigrationCompleted {
        curve: Address,
        pool: Address,
        timestamp: u64,
    },
    CreatorApproved {
        creator: Address,
        timestamp: u64,
    },
    CreatorRevoked {
        creator: Address,
        timestamp: u64,
    },
    CommunityBurn(BurnEvent),
}

/// Tagged domain events produced while processing decoded events.
///
/// One sum type instead of a listener registry: the dispatcher publishes
/// these on a channel owned by the supervisor, and consumer tasks react to
/// the variants they care about.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    TradeExecuted {
        trade: Trade,
        market: MarketData,
    },
    CandleUpdated(Candle),
    NewCandleCreated(Candle),
    MarketDataUpdated(MarketData),
    LargeTrade {
        trade: Trade,
        threshold_eth: BigDecimal,
    },
    BondingCurveDeployed(CurveDeployment),
    PriceAlert {
        token: Address,
        current_price: BigDecimal,
        threshold_price: BigDecimal,
        alert_type: String,
        user_id: String,
    },
    MilestoneReached {
        curve: Address,
        level: u64,
    },
    VolumeSpike {
        token: Address,
        eth_amount: BigDecimal,
        average_eth: BigDecimal,
    },
    RegularCreatorApproved {
        creator: Address,
    },
    RegularCreatorRevoked {
        creator: Address,
    },
    CommunityBurn(BurnEvent),
}

impl DomainEvent {
    /// Discriminant, used as `event_type` on the durable stream and in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::TradeExecuted { .. } => "TradeExecuted",
            DomainEvent::CandleUpdated(_) => "CandleUpdated",
            DomainEvent::NewCandleCreated(_) => "NewCandleCreated",
            DomainEvent::MarketDataUpdated(_) => "MarketDataUpdated",
            DomainEvent::LargeTrade { .. } => "LargeTrade",
            DomainEvent::BondingCurveDeployed(_) => "BondingCurveDeployed",
            DomainEvent::PriceAlert { .. } => "PriceAlert",
            DomainEvent::MilestoneReached { .. } => "MilestoneReached",
            DomainEvent::VolumeSpike { .. } => "VolumeSpike",
            DomainEvent::RegularCreatorApproved { .. } => "RegularCreatorApproved",
            DomainEvent::RegularCreatorRevoked { .. } => "RegularCreatorRevoked",
            DomainEvent::CommunityBurn(_) => "CommunityBurn",
        }
    }
}
