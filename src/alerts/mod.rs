//! Alert predicate bank.
//!
//! Evaluated after fan-out on every decorated trade. Matches become
//! [`DomainEvent`]s on the pipeline channel (the event feed turns them into
//! live pushes). Evaluation is fire-and-forget: a failing predicate or a
//! saturated channel is logged and never propagates.

use std::{str::FromStr, sync::Arc, time::Duration};

use alloy::primitives::Address;
use bigdecimal::{BigDecimal, Zero};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{
    cache::Cache,
    models::{DomainEvent, MarketData, Trade},
};

/// Volume spike fires when one trade moves more than this multiple of the
/// 24h average trade size.
const VOLUME_SPIKE_FACTOR: u32 = 10;
/// Minimum trades in the window before the average is meaningful.
const VOLUME_SPIKE_MIN_TRADES: u32 = 10;

/// A per-user price alert registration, read from
/// `alerts:price:<token>` in the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceAlertRule {
    pub user_id: String,
    /// "above" or "below"
    pub alert_type: String,
    pub threshold: String,
}

impl PriceAlertRule {
    pub fn threshold_decimal(&self) -> BigDecimal {
        BigDecimal::from_str(&self.threshold).unwrap_or_else(|_| BigDecimal::zero())
    }
}

/// Whether a registered rule matches the current price.
pub fn price_alert_hit(rule: &PriceAlertRule, current_price: &BigDecimal) -> bool {
    let threshold = rule.threshold_decimal();
    if threshold.is_zero() {
        return false;
    }
    match rule.alert_type.as_str() {
        "above" => *current_price >= threshold,
        "below" => *current_price <= threshold,
        _ => false,
    }
}

/// Whether one trade's ETH notional dwarfs the 24h average trade size.
pub fn volume_spike_average(
    eth_amount: &BigDecimal,
    volume_eth_24h: &BigDecimal,
    trades_24h: u32,
) -> Option<BigDecimal> {
    if trades_24h < VOLUME_SPIKE_MIN_TRADES {
        return None;
    }
    let average = volume_eth_24h / BigDecimal::from(trades_24h);
    if average.is_zero() {
        return None;
    }
    if *eth_amount > &average * BigDecimal::from(VOLUME_SPIKE_FACTOR) {
        Some(average)
    } else {
        None
    }
}

/// The predicate bank. Pure predicates over `(trade, market_data)`;
/// registered price thresholds are looked up in the cache through a short
/// TTL memo so a hot token does not hammer Redis.
pub struct AlertBank {
    large_trade_threshold: BigDecimal,
    cache: Cache,
    domain_tx: mpsc::Sender<DomainEvent>,
    rules: moka::future::Cache<Address, Arc<Vec<PriceAlertRule>>>,
}

impl AlertBank {
    pub fn new(
        large_trade_threshold: BigDecimal,
        cache: Cache,
        domain_tx: mpsc::Sender<DomainEvent>,
    ) -> Self {
        let rules = moka::future::Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(60))
            .build();
        Self {
            large_trade_threshold,
            cache,
            domain_tx,
            rules,
        }
    }

    pub async fn evaluate(&self, trade: &Trade, market: &MarketData) {
        if trade.is_large(&self.large_trade_threshold) {
            self.emit(DomainEvent::LargeTrade {
                trade: trade.clone(),
                threshold_eth: self.large_trade_threshold.clone(),
            })
            .await;
        }

        if let Some(average) =
            volume_spike_average(&trade.eth_amount, &market.volume_eth_24h, market.trades_24h)
        {
            self.emit(DomainEvent::VolumeSpike {
                token: trade.token,
                eth_amount: trade.eth_amount.clone(),
                average_eth: average,
            })
            .await;
        }

        for rule in self.rules_for(trade.token).await.iter() {
            if price_alert_hit(rule, &market.current_price) {
                self.emit(DomainEvent::PriceAlert {
                    token: trade.token,
                    current_price: market.current_price.clone(),
                    threshold_price: rule.threshold_decimal(),
                    alert_type: rule.alert_type.clone(),
                    user_id: rule.user_id.clone(),
                })
                .await;
            }
        }
    }

    async fn rules_for(&self, token: Address) -> Arc<Vec<PriceAlertRule>> {
        let cache = self.cache.clone();
        self.rules
            .get_with(token, async move {
                let key = format!("alerts:price:{}", token.to_checksum(None));
                match cache.client.get_json::<Vec<PriceAlertRule>>(&key).await {
                    Ok(Some(rules)) => Arc::new(rules),
                    Ok(None) => Arc::new(Vec::new()),
                    Err(e) => {
                        warn!("Price alert lookup failed for {token}: {e:#}");
                        Arc::new(Vec::new())
                    }
                }
            })
            .await
    }

    async fn emit(&self, event: DomainEvent) {
        let kind = event.kind();
        if self.domain_tx.send(event).await.is_err() {
            warn!("Alert channel closed, dropping {kind}");
        } else {
            debug!("Alert fired: {kind}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(alert_type: &str, threshold: &str) -> PriceAlertRule {
        PriceAlertRule {
            user_id: "user-1".into(),
            alert_type: alert_type.into(),
            threshold: threshold.into(),
        }
    }

    #[test]
    fn above_and_below_rules_compare_against_threshold() {
        let price: BigDecimal = "0.02".parse().unwrap();
        assert!(price_alert_hit(&rule("above", "0.01"), &price));
        assert!(price_alert_hit(&rule("above", "0.02"), &price));
        assert!(!price_alert_hit(&rule("above", "0.03"), &price));
        assert!(price_alert_hit(&rule("below", "0.05"), &price));
        assert!(!price_alert_hit(&rule("below", "0.01"), &price));
    }

    #[test]
    fn malformed_or_unknown_rules_never_fire() {
        let price: BigDecimal = "0.02".parse().unwrap();
        assert!(!price_alert_hit(&rule("above", "not-a-number"), &price));
        assert!(!price_alert_hit(&rule("crossed", "0.01"), &price));
        assert!(!price_alert_hit(&rule("above", "0"), &price));
    }

    #[test]
    fn volume_spike_needs_enough_history() {
        let big: BigDecimal = BigDecimal::from(50);
        let window_volume: BigDecimal = BigDecimal::from(40);
        // 9 trades: not enough history
        assert!(volume_spike_average(&big, &window_volume, 9).is_none());
        // 20 trades, average 2, trade of 50 > 20 -> spike
        let average = volume_spike_average(&big, &window_volume, 20).unwrap();
        assert_eq!(average, BigDecimal::from(2));
    }

    #[test]
    fn ordinary_trade_is_not_a_spike() {
        let amount: BigDecimal = BigDecimal::from(3);
        let window_volume: BigDecimal = BigDecimal::from(40);
        assert!(volume_spike_average(&amount, &window_volume, 20).is_none());
    }
}
