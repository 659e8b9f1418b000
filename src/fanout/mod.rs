//! Trade and deployment fan-out.
//!
//! Each upstream event lands in up to three sinks: cache writes, the
//! `blockchain:events` durable stream, and the live backend socket. The
//! sinks are independent; one failing never blocks the others, and every
//! failure is logged with the event id and token.

use log::{debug, warn};

use crate::{
    cache::Cache,
    errors::ListenerError,
    models::{BondingCurve, CurveDeployment, CurveRecord, MarketData, MarketRecord, Trade, TradeRecord},
    pubsub::BackendSocket,
    utils::hex_encode,
};

#[derive(Clone)]
pub struct FanOut {
    cache: Cache,
    socket: BackendSocket,
}

impl FanOut {
    pub fn new(cache: Cache, socket: BackendSocket) -> Self {
        Self { cache, socket }
    }

    /// Push one decorated trade to all three sinks.
    ///
    /// The raw trade is already in `trades:stream:<token>` (saved before
    /// the 24h stats were computed); this writes the remaining cache keys,
    /// appends the durable stream, and emits the live room message.
    pub async fn fan_out_trade(&self, trade: &Trade, market: &MarketData) {
        let record = TradeRecord::from_trade(trade);
        let market_record = MarketRecord::from_market(market);

        let cache_sink = async {
            self.cache
                .save_latest_trade(trade)
                .await
                .map_err(|e| ListenerError::sink("cache", trade.token.to_string(), e))?;
            self.cache
                .save_market(market)
                .await
                .map_err(|e| ListenerError::sink("cache", trade.token.to_string(), e))
        };

        let stream_sink = async {
            let payload = serde_json::json!({
                "token_address": record.token_address,
                "curve_address": record.curve_address,
                "user_address": record.user_address,
                "direction": record.direction,
                "token_amount": record.token_amount,
                "eth_amount": record.eth_amount,
                "price_before": record.price_before,
                "price_after": record.price_after,
                "total_supply": record.total_supply,
                "tx_hash": record.tx_hash,
                "log_index": record.log_index,
                "block_number": record.block_number,
                "timestamp": trade.ts.to_rfc3339(),
                "market_data": market_record,
            });
            self.cache
                .append_event_stream("Trade", &payload)
                .await
                .map(|_| ())
                .map_err(|e| ListenerError::sink("stream", trade.token.to_string(), e))
        };

        let live_sink = async {
            let room = format!("token:{}", record.token_address);
            self.socket.send_to_room(
                &room,
                serde_json::json!({
                    "type": "trade",
                    "data": {
                        "token_address": record.token_address,
                        "price": record.price_after,
                        "volume": record.token_amount,
                        "direction": record.direction,
                        "tx_hash": record.tx_hash,
                        "timestamp": trade.ts.to_rfc3339(),
                        "market_data": market_record,
                    },
                }),
            );
            Ok::<(), ListenerError>(())
        };

        let (cache_res, stream_res, live_res) = tokio::join!(cache_sink, stream_sink, live_sink);
        for result in [cache_res, stream_res, live_res] {
            if let Err(e) = result {
                warn!("{e} (event {})", trade.event_id());
            }
        }
        debug!("Fan-out complete for {}", trade.event_id());
    }

    /// Fan a new deployment out: `curve:<token>` write, stream append,
    /// `new_curve` broadcast.
    pub async fn fan_out_curve_deployed(&self, deployment: &CurveDeployment, curve: &BondingCurve) {
        let record = CurveRecord::from_curve(curve);

        if let Err(e) = self.cache.save_curve(curve).await {
            warn!(
                "{}",
                ListenerError::sink("cache", curve.token.to_string(), e)
            );
        }

        let payload = serde_json::json!({
            "token_address": record.token_address,
            "curve_address": record.curve_address,
            "creator_address": record.creator_address,
            "name": record.name,
            "symbol": record.symbol,
            "total_supply": record.current_supply,
            "current_price": record.current_price,
            "is_active": record.is_active,
            "deployed_at": record.deployed_at,
            "block_number": deployment.block.number,
            "tx_hash": hex_encode(deployment.tx_hash.as_slice()),
            "log_index": deployment.log_index,
            "timestamp": deployment.timestamp,
        });
        if let Err(e) = self
            .cache
            .append_event_stream("BondingCurveDeployed", &payload)
            .await
        {
            warn!(
                "{}",
                ListenerError::sink("stream", curve.token.to_string(), e)
            );
        }

        self.socket.broadcast(serde_json::json!({
            "type": "new_curve",
            "data": {
                "token_address": record.token_address,
                "curve_address": record.curve_address,
                "name": record.name,
                "symbol": record.symbol,
                "current_price": record.current_price,
            },
        }));
    }

    /// Append a non-trade event to the durable stream, logging failures.
    pub async fn append_stream(&self, event_type: &str, payload: &serde_json::Value) {
        if let Err(e) = self.cache.append_event_stream(event_type, payload).await {
            warn!("{}", ListenerError::sink("stream", event_type.to_string(), e));
        }
    }

    pub fn socket(&self) -> &BackendSocket {
        &self.socket
    }
}
