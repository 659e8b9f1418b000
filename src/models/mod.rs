pub mod candle;
pub mod curve;
pub mod event;
pub mod interval;
pub mod market;
pub mod trade;

pub use candle::{Candle, CandleRecord};
pub use curve::{BondingCurve, CurveRecord, CurveStatus};
pub use event::{BurnEvent, BurnRecord, CurveDeployment, DecodedEvent, DomainEvent};
pub use interval::Interval;
pub use market::{MarketData, MarketRecord};
pub use trade::{parse_tx_hash, BlockInfo, Trade, TradeDirection, TradeRecord};
