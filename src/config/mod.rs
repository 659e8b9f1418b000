mod config;

pub use config::{
    BlockchainSettings, CacheSettings, ProcessingSettings, Settings, WebsocketSettings,
};
