//! Chain client.
//!
//! Owns the WebSocket connection to the chain node. Installs log filters
//! scoped to the latest block for the factory, every registered curve, and
//! every launched token, polls them on a bounded interval, and pushes
//! decoded events onto the pipeline channel in ascending
//! `(block_number, log_index)` order.

use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use alloy::{
    eips::BlockNumberOrTag,
    primitives::{Address, B256, U256},
    providers::{DynProvider, Provider, ProviderBuilder, WsConnect},
    rpc::types::{Filter, Log},
    sol_types::SolEvent,
};
use anyhow::{Context, Result};
use chrono::DateTime;
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::{
    abis,
    config::BlockchainSettings,
    errors::ListenerError,
    models::{BondingCurve, CurveDeployment, CurveStatus, DecodedEvent},
    worker::{parser::Decoder, registry::CurveRegistry},
};

/// Filter poll cadence.
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Deadline for tip queries and health pings.
const RPC_TIMEOUT: Duration = Duration::from_secs(10);
/// Reconnect backoff bounds: 1 s doubling up to 30 s.
const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Resilient WebSocket session with the chain node.
///
/// Reconnects with exponential backoff; after a reconnect, filters are
/// re-installed from the current tip, so the disconnect window is never
/// replayed.
pub struct ChainClient {
    settings: BlockchainSettings,
    registry: Arc<CurveRegistry>,
    decoder: Decoder,
    factory: Option<Address>,
    provider: RwLock<Option<DynProvider>>,
    // curves registered after filter install, waiting for their filters
    pending: Mutex<mpsc::UnboundedReceiver<(Address, Address)>>,
    latest_block: AtomicU64,
    events_received: AtomicU64,
    reconnect_attempts: AtomicU32,
}

impl ChainClient {
    pub fn new(settings: BlockchainSettings, registry: Arc<CurveRegistry>) -> Result<Self> {
        let factory = settings
            .factory_address
            .as_deref()
            .map(|addr| {
                Address::from_str(addr)
                    .map_err(|e| ListenerError::Config(format!("invalid factory address {addr}: {e}")))
            })
            .transpose()?;

        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        registry.subscribe(move |record| {
            let _ = pending_tx.send((record.curve, record.token));
        });

        let decoder = Decoder::new(factory, registry.clone());

        Ok(Self {
            settings,
            registry,
            decoder,
            factory,
            provider: RwLock::new(None),
            pending: Mutex::new(pending_rx),
            latest_block: AtomicU64::new(0),
            events_received: AtomicU64::new(0),
            reconnect_attempts: AtomicU32::new(0),
        })
    }

    /// Establish the WebSocket session and verify the chain id.
    pub async fn connect(&self) -> Result<()> {
        info!("Connecting to chain node: {}", self.settings.ws_url);

        let ws = WsConnect::new(self.settings.ws_url.clone());
        let provider = ProviderBuilder::new()
            .connect_ws(ws)
            .await
            .map_err(|e| ListenerError::connection(&self.settings.ws_url, e))?;
        let provider = DynProvider::new(provider);

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| ListenerError::connection(&self.settings.ws_url, e))?;
        if chain_id != self.settings.chain_id {
            return Err(ListenerError::connection(
                &self.settings.ws_url,
                format!(
                    "chain id mismatch: expected {}, got {chain_id}",
                    self.settings.chain_id
                ),
            )
            .into());
        }

        let tip = provider
            .get_block_number()
            .await
            .map_err(|e| ListenerError::connection(&self.settings.ws_url, e))?;
        self.latest_block.store(tip, Ordering::SeqCst);

        *self.provider.write().await = Some(provider);

        info!("Connected to chain {chain_id}, latest block: {tip}");
        Ok(())
    }

    async fn provider(&self) -> Result<DynProvider> {
        self.provider
            .read()
            .await
            .clone()
            .context("chain client not connected")
    }

    /// One-shot discovery through the factory view. Missing factory
    /// configuration skips discovery; the call itself failing is the
    /// caller's decision to tolerate.
    pub async fn discover_curves(&self) -> Result<usize> {
        let Some(factory) = self.factory else {
            info!("Factory address not configured, skipping curve discovery");
            return Ok(0);
        };

        info!("Discovering existing bonding curves...");
        let provider = self.provider().await?;
        let contract = abis::ICurveFactory::new(factory, provider);
        let deployed = contract
            .getDeployedCurves()
            .call()
            .await
            .context("getDeployedCurves call failed")?;

        let mut added = 0usize;
        for info in &deployed {
            let mut curve = BondingCurve::new(
                info.tokenAddress,
                info.curveAddress,
                info.creator,
                info.name.clone(),
                info.symbol.clone(),
                DateTime::from_timestamp(info.deployedAt.saturating_to::<u64>() as i64, 0)
                    .unwrap_or_default(),
            );
            curve.active = info.isActive;
            if !info.isActive {
                curve.advance_status(CurveStatus::Migrated);
            }
            if self.registry.add(curve) {
                added += 1;
            }
        }

        info!("Found {} deployed curves ({added} new)", deployed.len());
        Ok(added)
    }

    /// Cheap tip query; also refreshes the cached tip.
    pub async fn latest_block(&self) -> Result<u64> {
        let provider = self.provider().await?;
        let tip = tokio::time::timeout(RPC_TIMEOUT, provider.get_block_number())
            .await
            .context("tip query timed out")?
            .map_err(|e| ListenerError::connection(&self.settings.ws_url, e))?;
        self.latest_block.store(tip, Ordering::SeqCst);
        Ok(tip)
    }

    pub fn cached_tip(&self) -> u64 {
        self.latest_block.load(Ordering::SeqCst)
    }

    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    /// Healthy iff a tip query answers within the RPC deadline.
    pub async fn health(&self) -> bool {
        self.latest_block().await.is_ok()
    }

    /// Poll loop: yields decoded events in `(block_number, log_index)`
    /// order until cancellation. Returns an error only when the reconnect
    /// budget is exhausted.
    pub async fn run(
        &self,
        tx: mpsc::Sender<DecodedEvent>,
        cancellation_token: CancellationToken,
    ) -> Result<()> {
        'session: loop {
            if cancellation_token.is_cancelled() {
                break;
            }

            let mut filters = match self.install_all_filters().await {
                Ok(filters) => filters,
                Err(e) => {
                    warn!("Filter install failed: {e:#}");
                    self.reconnect(&cancellation_token).await?;
                    continue 'session;
                }
            };
            info!("Installed {} log filters from latest block", filters.len());
            self.reconnect_attempts.store(0, Ordering::SeqCst);

            loop {
                if cancellation_token.is_cancelled() {
                    break 'session;
                }

                // Filters for curves that joined the registry since the
                // last iteration are added before this round's poll.
                if let Err(e) = self.install_pending_filters(&mut filters).await {
                    warn!("Dynamic filter install failed: {e:#}");
                    self.reconnect(&cancellation_token).await?;
                    continue 'session;
                }

                let logs = match self.poll_filters(&filters).await {
                    Ok(logs) => logs,
                    Err(e) => {
                        warn!("Filter poll failed: {e:#}");
                        self.reconnect(&cancellation_token).await?;
                        continue 'session;
                    }
                };

                if !logs.is_empty() && self.dispatch_logs(logs, &tx).await.is_err() {
                    // Pipeline channel closed: the dispatcher is gone and
                    // the supervisor is tearing down.
                    info!("Event channel closed, stopping chain client");
                    break 'session;
                }

                tokio::select! {
                    _ = cancellation_token.cancelled() => break 'session,
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                }
            }
        }

        info!("Chain client stopped");
        Ok(())
    }

    async fn dispatch_logs(
        &self,
        mut logs: Vec<Log>,
        tx: &mpsc::Sender<DecodedEvent>,
    ) -> Result<(), mpsc::error::SendError<DecodedEvent>> {
        logs.sort_by_key(|l| (l.block_number.unwrap_or(0), l.log_index.unwrap_or(0)));
        self.fill_block_timestamps(&mut logs).await;

        for log in &logs {
            match self.decoder.decode(log) {
                Ok(Some(event)) => {
                    if let DecodedEvent::CurveDeployed(deployment) = &event {
                        // Register immediately so trades from the new curve
                        // in later blocks are classified correctly.
                        self.register_deployment(deployment);
                    }
                    self.events_received.fetch_add(1, Ordering::Relaxed);
                    tx.send(event).await?;
                }
                Ok(None) => {
                    warn!(
                        "Dropping log from unwatched contract {}",
                        log.inner.address
                    );
                }
                Err(ListenerError::UnknownTopic { topic, address }) => {
                    debug!("Unknown topic {topic} from {address}");
                }
                Err(ListenerError::ReorgHint { tx_hash, log_index }) => {
                    debug!("Dropped removed log {tx_hash}#{log_index}");
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
        Ok(())
    }

    fn register_deployment(&self, deployment: &CurveDeployment) {
        let curve = BondingCurve::new(
            deployment.token,
            deployment.curve,
            deployment.creator,
            deployment.name.clone(),
            deployment.symbol.clone(),
            DateTime::from_timestamp(deployment.timestamp as i64, 0).unwrap_or_default(),
        );
        self.registry.add(curve);
    }

    /// Nodes that omit `blockTimestamp` on logs get it resolved through
    /// one header fetch per distinct block.
    async fn fill_block_timestamps(&self, logs: &mut [Log]) {
        let mut missing: Vec<u64> = logs
            .iter()
            .filter(|l| l.block_timestamp.is_none())
            .filter_map(|l| l.block_number)
            .collect();
        if missing.is_empty() {
            return;
        }
        missing.sort_unstable();
        missing.dedup();

        let Ok(provider) = self.provider().await else {
            return;
        };

        let mut timestamps: FxHashMap<u64, u64> = FxHashMap::default();
        for number in missing {
            match provider
                .get_block_by_number(BlockNumberOrTag::Number(number))
                .await
            {
                Ok(Some(block)) => {
                    timestamps.insert(number, block.header.timestamp);
                }
                Ok(None) => debug!("Block {number} not found while resolving timestamps"),
                Err(e) => warn!("Header fetch for block {number} failed: {e}"),
            }
        }

        for log in logs.iter_mut() {
            if log.block_timestamp.is_none() {
                if let Some(ts) = log.block_number.and_then(|n| timestamps.get(&n)) {
                    log.block_timestamp = Some(*ts);
                }
            }
        }
    }

    async fn install_all_filters(&self) -> Result<Vec<U256>> {
        // Flush stale pending registrations; the snapshot below covers them.
        {
            let mut pending = self.pending.lock().expect("pending lock");
            while pending.try_recv().is_ok() {}
        }

        let mut filters = Vec::new();

        if let Some(factory) = self.factory {
            filters.push(
                self.install_filter(
                    factory,
                    vec![
                        abis::BondingCurveDeployed::SIGNATURE_HASH,
                        abis::RegularTokenCreatorApproved::SIGNATURE_HASH,
                        abis::RegularTokenCreatorRevoked::SIGNATURE_HASH,
                    ],
                )
                .await?,
            );
        }

        for curve in self.registry.snapshot() {
            filters.push(self.install_curve_filter(curve).await?);
            if let Some(token) = self.registry.token_for_curve(&curve) {
                filters.push(self.install_token_filter(token).await?);
            }
        }

        Ok(filters)
    }

    async fn install_pending_filters(&self, filters: &mut Vec<U256>) -> Result<()> {
        let additions: Vec<(Address, Address)> = {
            let mut pending = self.pending.lock().expect("pending lock");
            let mut additions = Vec::new();
            while let Ok(pair) = pending.try_recv() {
                additions.push(pair);
            }
            additions
        };

        for (curve, token) in additions {
            filters.push(self.install_curve_filter(curve).await?);
            filters.push(self.install_token_filter(token).await?);
            info!("Watching new curve {curve} (token {token})");
        }
        Ok(())
    }

    async fn install_curve_filter(&self, curve: Address) -> Result<U256> {
        self.install_filter(
            curve,
            vec![
                abis::Trade::SIGNATURE_HASH,
                abis::TokensPurchased::SIGNATURE_HASH,
                abis::TokensSold::SIGNATURE_HASH,
                abis::MilestoneReached::SIGNATURE_HASH,
                abis::ReadyForDEX::SIGNATURE_HASH,
                abis::MigrationCompleted::SIGNATURE_HASH,
            ],
        )
        .await
    }

    async fn install_token_filter(&self, token: Address) -> Result<U256> {
        self.install_filter(token, vec![abis::CommunityBurn::SIGNATURE_HASH])
            .await
    }

    async fn install_filter(&self, address: Address, topics: Vec<B256>) -> Result<U256> {
        let provider = self.provider().await?;
        let filter = Filter::new()
            .address(address)
            .event_signature(topics)
            .from_block(BlockNumberOrTag::Latest);
        let id = provider
            .new_filter(&filter)
            .await
            .map_err(|e| ListenerError::connection(&self.settings.ws_url, e))?;
        Ok(id)
    }

    async fn poll_filters(&self, filters: &[U256]) -> Result<Vec<Log>> {
        let provider = self.provider().await?;
        let mut logs = Vec::new();
        for id in filters {
            let mut entries: Vec<Log> = provider
                .get_filter_changes(*id)
                .await
                .map_err(|e| ListenerError::connection(&self.settings.ws_url, e))?;
            logs.append(&mut entries);
        }
        Ok(logs)
    }

    /// Exponential backoff reconnect: 1 s doubling to a 30 s cap, bounded
    /// by the configured attempt budget. Successful reconnects reset the
    /// budget; exhaustion is terminal for the client task.
    async fn reconnect(&self, cancellation_token: &CancellationToken) -> Result<()> {
        let mut delay = BACKOFF_INITIAL;

        loop {
            if cancellation_token.is_cancelled() {
                anyhow::bail!("cancelled during reconnect");
            }

            let attempt = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > self.settings.max_reconnection_attempts {
                anyhow::bail!(
                    "reconnect budget exhausted after {} attempts",
                    self.settings.max_reconnection_attempts
                );
            }

            warn!(
                "Reconnect attempt {attempt}/{} in {delay:?}",
                self.settings.max_reconnection_attempts
            );

            tokio::select! {
                _ = cancellation_token.cancelled() => anyhow::bail!("cancelled during reconnect"),
                _ = tokio::time::sleep(delay) => {}
            }

            match self.connect().await {
                Ok(()) => {
                    info!("Reconnected to chain node");
                    return Ok(());
                }
                Err(e) => {
                    warn!("Reconnect failed: {e:#}");
                    delay = (delay * 2).min(BACKOFF_CAP);
                }
            }
        }
    }
}
