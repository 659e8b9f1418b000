//! Event dispatch loop.
//!
//! Consumes decoded events from the pipeline channel and runs the
//! per-event processing: trades flow through the aggregator, the 24h
//! stats, the fan-out, and the alert bank; deployments and lifecycle
//! events maintain the registry and the curve cache. Every event is
//! processed inside a try boundary; a failure is logged with the event id
//! and never kills the loop.

use std::sync::Arc;

use anyhow::Result;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    aggregator::{compute_market_data, CandleAggregator},
    alerts::AlertBank,
    cache::Cache,
    fanout::FanOut,
    models::{CandleRecord, CurveStatus, DecodedEvent, DomainEvent, Trade},
    pubsub::BackendSocket,
    utils::hex_encode,
    worker::registry::CurveRegistry,
};

pub struct Dispatcher {
    cache: Cache,
    registry: Arc<CurveRegistry>,
    aggregator: Arc<CandleAggregator<Cache>>,
    fanout: FanOut,
    alerts: AlertBank,
    domain_tx: mpsc::Sender<DomainEvent>,
}

impl Dispatcher {
    pub fn new(
        cache: Cache,
        registry: Arc<CurveRegistry>,
        aggregator: Arc<CandleAggregator<Cache>>,
        fanout: FanOut,
        alerts: AlertBank,
        domain_tx: mpsc::Sender<DomainEvent>,
    ) -> Self {
        Self {
            cache,
            registry,
            aggregator,
            fanout,
            alerts,
            domain_tx,
        }
    }

    pub async fn run(
        &self,
        mut rx: mpsc::Receiver<DecodedEvent>,
        cancellation_token: CancellationToken,
    ) {
        info!("Dispatch loop started");
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Dispatch loop received cancellation signal");
                    break;
                }
                event = rx.recv() => {
                    let Some(event) = event else {
                        info!("Pipeline channel closed, stopping dispatch loop");
                        break;
                    };
                    if let Err(e) = self.handle(event).await {
                        warn!("Event processing failed: {e:#}");
                    }
                }
            }
        }
    }

    async fn handle(&self, event: DecodedEvent) -> Result<()> {
        match event {
            DecodedEvent::Trade(trade) => self.handle_trade(trade).await,
            DecodedEvent::CurveDeployed(deployment) => {
                // The chain client registered the curve at decode time;
                // resolve the record it created.
                let Some(curve) = self.registry.get_by_curve(&deployment.curve) else {
                    anyhow::bail!("deployed curve {} missing from registry", deployment.curve);
                };
                info!(
                    "New bonding curve: {} ({}) at {}",
                    curve.name, curve.symbol, curve.curve
                );
                self.fanout.fan_out_curve_deployed(&deployment, &curve).await;
                self.publish(DomainEvent::BondingCurveDeployed(deployment)).await;
                Ok(())
            }
            DecodedEvent::MilestoneReached {
                curve,
                level,
                reserve_eth,
                timestamp,
            } => {
                info!("Curve {curve} reached milestone {level}");
                self.fanout
                    .append_stream(
                        "MilestoneReached",
                        &serde_json::json!({
                            "curve_address": curve.to_checksum(None),
                            "level": level,
                            "reserve_eth": reserve_eth.to_string(),
                            "timestamp": timestamp,
                        }),
                    )
                    .await;
                self.publish(DomainEvent::MilestoneReached { curve, level }).await;
                Ok(())
            }
            DecodedEvent::ReadyForDex { curve, timestamp } => {
                self.advance_curve(curve, CurveStatus::ReadyForDex).await;
                self.fanout
                    .append_stream(
                        "ReadyForDEX",
                        &serde_json::json!({
                            "curve_address": curve.to_checksum(None),
                            "timestamp": timestamp,
                        }),
                    )
                    .await;
                Ok(())
            }
            DecodedEvent::MigrationCompleted {
                curve,
                pool,
                timestamp,
            } => {
                info!("Curve {curve} migrated to pool {pool}");
                self.advance_curve(curve, CurveStatus::Migrated).await;
                self.fanout
                    .append_stream(
                        "MigrationCompleted",
                        &serde_json::json!({
                            "curve_address": curve.to_checksum(None),
                            "pool_address": pool.to_checksum(None),
                            "timestamp": timestamp,
                        }),
                    )
                    .await;
                Ok(())
            }
            DecodedEvent::CreatorApproved { creator, timestamp } => {
                self.fanout
                    .append_stream(
                        "RegularCreatorApproved",
                        &serde_json::json!({
                            "creator_address": creator.to_checksum(None),
                            "timestamp": timestamp,
                        }),
                    )
                    .await;
                self.publish(DomainEvent::RegularCreatorApproved { creator }).await;
                Ok(())
            }
            DecodedEvent::CreatorRevoked { creator, timestamp } => {
                self.fanout
                    .append_stream(
                        "RegularCreatorRevoked",
                        &serde_json::json!({
                            "creator_address": creator.to_checksum(None),
                            "timestamp": timestamp,
                        }),
                    )
                    .await;
                self.publish(DomainEvent::RegularCreatorRevoked { creator }).await;
                Ok(())
            }
            DecodedEvent::CommunityBurn(burn) => {
                if let Err(e) = self.cache.save_burn_event(&burn).await {
                    warn!(
                        "Burn event persist failed for {} ({}#{}): {e:#}",
                        burn.token,
                        hex_encode(burn.tx_hash.as_slice()),
                        burn.log_index
                    );
                }
                self.publish(DomainEvent::CommunityBurn(burn)).await;
                Ok(())
            }
        }
    }

    async fn handle_trade(&self, trade: Trade) -> Result<()> {
        // Trades on migrated curves still count; they are only flagged.
        if self.registry.status_of(&trade.curve) == Some(CurveStatus::Migrated) {
            warn!(
                "Trade {} on migrated curve {} for token {} (accepted, flagged)",
                trade.event_id(),
                trade.curve,
                trade.token
            );
        }

        // Save first: the 24h window below must include this trade.
        if let Err(e) = self.cache.push_trade_stream(&trade).await {
            warn!(
                "Trade stream save failed for {} ({}): {e:#}",
                trade.token,
                trade.event_id()
            );
        }

        let updates = self.aggregator.apply(&trade).await;
        for update in updates {
            let event = if update.created {
                DomainEvent::NewCandleCreated(update.candle)
            } else {
                DomainEvent::CandleUpdated(update.candle)
            };
            self.publish(event).await;
        }

        if let Some(curve) = self.registry.update_from_trade(&trade) {
            if let Err(e) = self.cache.save_curve(&curve).await {
                warn!("Curve record write failed for {}: {e:#}", trade.token);
            }
        }

        let market = compute_market_data(&self.cache, &trade).await;

        self.fanout.fan_out_trade(&trade, &market).await;
        self.alerts.evaluate(&trade, &market).await;

        info!(
            "Processed {} {} {} tokens on {} (price {})",
            trade.direction.as_str(),
            trade.event_id(),
            trade.token_amount,
            trade.token,
            trade.price_after
        );

        self.publish(DomainEvent::MarketDataUpdated(market.clone())).await;
        self.publish(DomainEvent::TradeExecuted { trade, market }).await;
        Ok(())
    }

    async fn advance_curve(&self, curve: alloy::primitives::Address, status: CurveStatus) {
        if let Some(record) = self.registry.advance_status(&curve, status) {
            if let Err(e) = self.cache.save_curve(&record).await {
                warn!("Curve record write failed for {}: {e:#}", record.token);
            }
        } else {
            warn!("Lifecycle event for unknown curve {curve}");
        }
    }

    async fn publish(&self, event: DomainEvent) {
        let kind = event.kind();
        if self.domain_tx.send(event).await.is_err() {
            debug!("Domain event channel closed, dropping {kind}");
        }
    }
}

/// Domain-event consumer: the live-push listener half of the old
/// event-bus design. Candle updates and alert hits become backend socket
/// messages; everything else is observable at debug level.
pub async fn run_event_feed(
    mut rx: mpsc::Receiver<DomainEvent>,
    socket: BackendSocket,
    cancellation_token: CancellationToken,
) {
    info!("Event feed started");
    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => {
                info!("Event feed received cancellation signal");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                feed_one(&socket, event);
            }
        }
    }
}

fn feed_one(socket: &BackendSocket, event: DomainEvent) {
    match event {
        DomainEvent::CandleUpdated(candle) => {
            let room = format!("token:{}", candle.token.to_checksum(None));
            socket.send_to_room(
                &room,
                serde_json::json!({
                    "type": "candle_update",
                    "data": CandleRecord::from_candle(&candle),
                }),
            );
        }
        DomainEvent::NewCandleCreated(candle) => {
            let room = format!("token:{}", candle.token.to_checksum(None));
            socket.send_to_room(
                &room,
                serde_json::json!({
                    "type": "new_candle",
                    "data": CandleRecord::from_candle(&candle),
                }),
            );
        }
        DomainEvent::LargeTrade { trade, threshold_eth } => {
            socket.broadcast(serde_json::json!({
                "type": "large_trade",
                "data": {
                    "token_address": trade.token.to_checksum(None),
                    "amount_eth": trade.eth_amount.to_string(),
                    "direction": trade.direction.as_str(),
                    "tx_hash": hex_encode(trade.tx_hash.as_slice()),
                    "threshold_eth": threshold_eth.to_string(),
                },
            }));
        }
        DomainEvent::PriceAlert {
            token,
            current_price,
            threshold_price,
            alert_type,
            user_id,
        } => {
            socket.broadcast(serde_json::json!({
                "type": "price_alert",
                "data": {
                    "token_address": token.to_checksum(None),
                    "current_price": current_price.to_string(),
                    "threshold_price": threshold_price.to_string(),
                    "alert_type": alert_type,
                    "user_id": user_id,
                },
            }));
        }
        DomainEvent::VolumeSpike {
            token,
            eth_amount,
            average_eth,
        } => {
            socket.broadcast(serde_json::json!({
                "type": "volume_spike",
                "data": {
                    "token_address": token.to_checksum(None),
                    "eth_amount": eth_amount.to_string(),
                    "average_eth_24h": average_eth.to_string(),
                },
            }));
        }
        DomainEvent::MilestoneReached { curve, level } => {
            socket.broadcast(serde_json::json!({
                "type": "milestone",
                "data": {
                    "curve_address": curve.to_checksum(None),
                    "level": level,
                },
            }));
        }
        DomainEvent::CommunityBurn(burn) => {
            debug!(
                "Burn event for {} forwarded via cache pub/sub ({} tokens)",
                burn.token, burn.amount
            );
        }
        // Trade and curve payloads already went out through the fan-out.
        other => debug!("Domain event observed: {}", other.kind()),
    }
}
