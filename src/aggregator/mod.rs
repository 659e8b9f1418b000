pub mod candles;
pub mod stats;

pub use candles::{CandleAggregator, CandleStore, CandleUpdate};
pub use stats::{compute_market_data, stats_from_records, Stats24h};
