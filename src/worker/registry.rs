use std::sync::Mutex;

use alloy::primitives::Address;
use log::info;
use rustc_hash::FxHashMap;

use crate::models::{BondingCurve, CurveStatus, Trade};

type CurveListener = Box<dyn Fn(&BondingCurve) + Send + Sync>;

/// The set of known bonding-curve contracts, keyed by curve address.
///
/// Sole owner of curve records: additions come from one-shot discovery and
/// `BondingCurveDeployed` decoding; every accepted trade mutates its curve's
/// record. Listeners registered via `subscribe` are invoked synchronously on
/// each successful insertion (the chain client uses this to install log
/// filters for new contracts).
pub struct CurveRegistry {
    curves: Mutex<FxHashMap<Address, BondingCurve>>,
    // token -> curve reverse index; 1:1 while a curve is active
    tokens: Mutex<FxHashMap<Address, Address>>,
    listeners: Mutex<Vec<CurveListener>>,
}

impl Default for CurveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CurveRegistry {
    pub fn new() -> Self {
        Self {
            curves: Mutex::new(FxHashMap::default()),
            tokens: Mutex::new(FxHashMap::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Insert a curve record. Idempotent: returns false (and skips the
    /// listeners) when the curve address is already registered.
    pub fn add(&self, curve: BondingCurve) -> bool {
        let inserted = {
            let mut curves = self.curves.lock().expect("curves lock");
            if curves.contains_key(&curve.curve) {
                false
            } else {
                self.tokens
                    .lock()
                    .expect("tokens lock")
                    .insert(curve.token, curve.curve);
                curves.insert(curve.curve, curve.clone());
                true
            }
        };

        if inserted {
            info!(
                "Registered curve {} for token {} ({})",
                curve.curve, curve.token, curve.symbol
            );
            // Listener invocation happens outside the map locks so a
            // listener may consult the registry without deadlocking.
            let listeners = self.listeners.lock().expect("listeners lock");
            for listener in listeners.iter() {
                listener(&curve);
            }
        }

        inserted
    }

    pub fn contains(&self, curve: &Address) -> bool {
        self.curves.lock().expect("curves lock").contains_key(curve)
    }

    /// Whether this address is a launched token tracked by a curve.
    pub fn is_token(&self, token: &Address) -> bool {
        self.tokens.lock().expect("tokens lock").contains_key(token)
    }

    pub fn token_for_curve(&self, curve: &Address) -> Option<Address> {
        self.curves
            .lock()
            .expect("curves lock")
            .get(curve)
            .map(|c| c.token)
    }

    pub fn get_by_curve(&self, curve: &Address) -> Option<BondingCurve> {
        self.curves.lock().expect("curves lock").get(curve).cloned()
    }

    pub fn get_by_token(&self, token: &Address) -> Option<BondingCurve> {
        let curve = *self.tokens.lock().expect("tokens lock").get(token)?;
        self.get_by_curve(&curve)
    }

    pub fn snapshot(&self) -> Vec<Address> {
        self.curves.lock().expect("curves lock").keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.curves.lock().expect("curves lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a listener called synchronously on every insertion.
    pub fn subscribe(&self, listener: impl Fn(&BondingCurve) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .expect("listeners lock")
            .push(Box::new(listener));
    }

    /// Fold an accepted trade into its curve record; returns the updated
    /// record for write-through.
    pub fn update_from_trade(&self, trade: &Trade) -> Option<BondingCurve> {
        let mut curves = self.curves.lock().expect("curves lock");
        let curve = curves.get_mut(&trade.curve)?;
        curve.update_from_trade(trade);
        Some(curve.clone())
    }

    /// Advance a curve's lifecycle; returns the updated record when the
    /// curve is known.
    pub fn advance_status(&self, curve: &Address, status: CurveStatus) -> Option<BondingCurve> {
        let mut curves = self.curves.lock().expect("curves lock");
        let record = curves.get_mut(curve)?;
        record.advance_status(status);
        Some(record.clone())
    }

    pub fn status_of(&self, curve: &Address) -> Option<CurveStatus> {
        self.curves
            .lock()
            .expect("curves lock")
            .get(curve)
            .map(|c| c.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn curve(token: u8, curve_addr: u8) -> BondingCurve {
        BondingCurve::new(
            Address::repeat_byte(token),
            Address::repeat_byte(curve_addr),
            Address::repeat_byte(0xee),
            "Token".into(),
            "TKN".into(),
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        )
    }

    #[test]
    fn add_is_idempotent_and_fires_listeners_once() {
        let registry = CurveRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        registry.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(registry.add(curve(0x01, 0x02)));
        assert!(!registry.add(curve(0x01, 0x02)));

        assert_eq!(registry.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn token_index_resolves_both_directions() {
        let registry = CurveRegistry::new();
        registry.add(curve(0x01, 0x02));

        let token = Address::repeat_byte(0x01);
        let curve_addr = Address::repeat_byte(0x02);

        assert!(registry.contains(&curve_addr));
        assert!(registry.is_token(&token));
        assert_eq!(registry.token_for_curve(&curve_addr), Some(token));
        assert_eq!(registry.get_by_token(&token).unwrap().curve, curve_addr);
        assert!(!registry.contains(&token));
    }

    #[test]
    fn snapshot_lists_all_registered_curves() {
        let registry = CurveRegistry::new();
        registry.add(curve(0x01, 0x02));
        registry.add(curve(0x03, 0x04));

        let mut snapshot = registry.snapshot();
        snapshot.sort();
        assert_eq!(
            snapshot,
            vec![Address::repeat_byte(0x02), Address::repeat_byte(0x04)]
        );
    }

    #[test]
    fn listener_can_consult_registry_without_deadlock() {
        let registry = Arc::new(CurveRegistry::new());
        let registry_clone = registry.clone();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        registry.subscribe(move |record| {
            // Re-entrant read during notification
            assert!(registry_clone.contains(&record.curve));
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        registry.add(curve(0x01, 0x02));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lifecycle_updates_go_through_the_registry() {
        let registry = CurveRegistry::new();
        registry.add(curve(0x01, 0x02));
        let curve_addr = Address::repeat_byte(0x02);

        let updated = registry
            .advance_status(&curve_addr, CurveStatus::Migrated)
            .unwrap();
        assert_eq!(updated.status, CurveStatus::Migrated);
        assert!(!updated.active);
        assert_eq!(registry.status_of(&curve_addr), Some(CurveStatus::Migrated));
    }
}
