use bigdecimal::BigDecimal;
use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::models::Interval;

/// Chain node connection configuration.
///
/// The listener holds one WebSocket connection for log filters plus the
/// factory view calls. `factory_address` is optional; without it, curve
/// discovery is skipped and only dynamically deployed curves are tracked.
#[derive(Debug, Deserialize, Clone)]
pub struct BlockchainSettings {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_http_url")]
    pub http_url: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default)]
    pub factory_address: Option<String>,
    #[serde(default = "default_max_reconnection_attempts")]
    pub max_reconnection_attempts: u32,
    #[serde(default = "default_heartbeat_interval_s")]
    pub heartbeat_interval_s: u64,
}

fn default_ws_url() -> String {
    "ws://127.0.0.1:8545".to_string()
}

fn default_http_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_chain_id() -> u64 {
    31337
}

fn default_max_reconnection_attempts() -> u32 {
    10
}

fn default_heartbeat_interval_s() -> u64 {
    30
}

/// Redis connection and key-layout configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_cache_url")]
    pub url: String,
    #[serde(default = "default_cache_host")]
    pub host: String,
    #[serde(default = "default_cache_port")]
    pub port: u16,
    #[serde(default)]
    pub db: i64,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_socket_timeout_s")]
    pub socket_timeout_s: u64,
    #[serde(default = "default_trades_key_prefix")]
    pub trades_key_prefix: String,
    #[serde(default = "default_candles_key_prefix")]
    pub candles_key_prefix: String,
    #[serde(default = "default_market_data_key_prefix")]
    pub market_data_key_prefix: String,
}

impl CacheSettings {
    /// Connection URL, assembled from host credentials when a password is
    /// set, otherwise the configured `url` as-is.
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => self.url.clone(),
        }
    }
}

fn default_cache_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_cache_host() -> String {
    "localhost".to_string()
}

fn default_cache_port() -> u16 {
    6379
}

fn default_max_connections() -> u32 {
    20
}

fn default_socket_timeout_s() -> u64 {
    5
}

fn default_trades_key_prefix() -> String {
    "trades:".to_string()
}

fn default_candles_key_prefix() -> String {
    "candles:".to_string()
}

fn default_market_data_key_prefix() -> String {
    "market:".to_string()
}

/// Event processing configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ProcessingSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_ohlcv_intervals")]
    pub ohlcv_intervals: Vec<String>,
    #[serde(default = "default_large_trade_threshold_eth")]
    pub large_trade_threshold_eth: BigDecimal,
}

impl ProcessingSettings {
    /// Parse the configured interval tokens, rejecting unknown ones.
    pub fn intervals(&self) -> Result<Vec<Interval>, ConfigError> {
        self.ohlcv_intervals
            .iter()
            .map(|s| {
                Interval::parse(s).ok_or_else(|| {
                    ConfigError::Message(format!("invalid ohlcv interval: {s}"))
                })
            })
            .collect()
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_ohlcv_intervals() -> Vec<String> {
    Interval::ALL.iter().map(|i| i.as_str().to_string()).collect()
}

fn default_large_trade_threshold_eth() -> BigDecimal {
    BigDecimal::from(1)
}

/// Backend Socket.IO connection configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct WebsocketSettings {
    #[serde(default = "default_ws_host")]
    pub host: String,
    #[serde(default = "default_ws_port")]
    pub port: u16,
    #[serde(default = "default_backend_socket_url")]
    pub backend_socket_url: String,
    #[serde(default = "default_backend_namespace")]
    pub backend_namespace: String,
}

fn default_ws_host() -> String {
    "0.0.0.0".to_string()
}

fn default_ws_port() -> u16 {
    3001
}

fn default_backend_socket_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_backend_namespace() -> String {
    "/charts".to_string()
}

/// Root application configuration.
///
/// Loaded entirely from the environment: `BLOCKCHAIN__WS_URL`,
/// `CACHE__PORT`, `PROCESSING__BATCH_SIZE`, `WEBSOCKET__BACKEND_SOCKET_URL`
/// and so on (double underscore separates section and key).
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_blockchain")]
    pub blockchain: BlockchainSettings,
    #[serde(default = "default_cache")]
    pub cache: CacheSettings,
    #[serde(default = "default_processing")]
    pub processing: ProcessingSettings,
    #[serde(default = "default_websocket")]
    pub websocket: WebsocketSettings,
}

fn default_blockchain() -> BlockchainSettings {
    serde_json::from_value(serde_json::json!({})).expect("blockchain defaults")
}

fn default_cache() -> CacheSettings {
    serde_json::from_value(serde_json::json!({})).expect("cache defaults")
}

fn default_processing() -> ProcessingSettings {
    serde_json::from_value(serde_json::json!({})).expect("processing defaults")
}

fn default_websocket() -> WebsocketSettings {
    serde_json::from_value(serde_json::json!({})).expect("websocket defaults")
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(Environment::default().separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_section() {
        let settings: Settings = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(settings.blockchain.chain_id, 31337);
        assert_eq!(settings.blockchain.max_reconnection_attempts, 10);
        assert_eq!(settings.cache.port, 6379);
        assert_eq!(settings.cache.max_connections, 20);
        assert_eq!(settings.cache.trades_key_prefix, "trades:");
        assert_eq!(settings.processing.batch_size, 100);
        assert_eq!(settings.websocket.port, 3001);
        assert_eq!(settings.websocket.backend_namespace, "/charts");
    }

    #[test]
    fn interval_list_parses_and_rejects_unknown_tokens() {
        let processing: ProcessingSettings = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(processing.intervals().unwrap(), Interval::ALL.to_vec());

        let bad: ProcessingSettings = serde_json::from_value(serde_json::json!({
            "ohlcv_intervals": ["1m", "7m"]
        }))
        .unwrap();
        assert!(bad.intervals().is_err());
    }

    #[test]
    fn connection_url_prefers_password_form() {
        let mut cache: CacheSettings = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(cache.connection_url(), "redis://localhost:6379");
        cache.password = Some("secret".into());
        assert_eq!(cache.connection_url(), "redis://:secret@localhost:6379/0");
    }
}
