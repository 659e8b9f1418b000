pub mod abis;
pub mod aggregator;
pub mod alerts;
pub mod cache;
pub mod config;
pub mod cron;
pub mod errors;
pub mod fanout;
pub mod models;
pub mod pubsub;
pub mod utils;
pub mod worker;

pub use cache::Cache;
pub use config::Settings;
pub use cron::{CronScheduler, CronSettings};
pub use errors::ListenerError;
pub use fanout::FanOut;
pub use pubsub::BackendSocket;
pub use worker::{ChainClient, CurveRegistry, Decoder, Dispatcher};
