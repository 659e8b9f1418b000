//! Backend Socket.IO client.
//!
//! Publishes live trade/market/alert payloads to the presentation backend.
//! Uses fire-and-forget semantics with a bounded drop-oldest queue so a slow
//! backend never blocks the dispatch loop.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{Context, Result};
use futures::FutureExt;
use log::{debug, info, warn};
use rust_socketio::{
    asynchronous::{Client, ClientBuilder},
    Event, Payload,
};
use rustc_hash::FxHashMap;
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::WebsocketSettings;

/// Maximum queued outbound messages before drop-oldest kicks in.
const SEND_QUEUE_CAP: usize = 256;

/// One message waiting to be emitted to the backend.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub event: &'static str,
    pub payload: serde_json::Value,
}

/// Bounded FIFO feeding the sender task. When full, the oldest message is
/// dropped: live data ages fast, the newest state wins.
struct SendQueue {
    inner: Mutex<VecDeque<OutboundMessage>>,
    cap: usize,
    dropped: AtomicU64,
}

impl SendQueue {
    fn new(cap: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue without blocking. Returns true when an older message had to
    /// be dropped to make room.
    fn push(&self, msg: OutboundMessage) -> bool {
        let mut queue = self.inner.lock().expect("send queue lock");
        let mut dropped = false;
        if queue.len() >= self.cap {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            dropped = true;
        }
        queue.push_back(msg);
        dropped
    }

    fn pop(&self) -> Option<OutboundMessage> {
        self.inner.lock().expect("send queue lock").pop_front()
    }

    fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct SocketShared {
    client: RwLock<Option<Client>>,
    connected: AtomicBool,
    queue: SendQueue,
    notify: Notify,
    // room -> subscribed client ids, maintained from backend requests
    rooms: Mutex<FxHashMap<String, Vec<String>>>,
    messages_sent: AtomicU64,
}

/// Socket.IO connection to the presentation backend.
///
/// Single-ownership of the underlying socket; all producers go through the
/// bounded send queue (`room_message`, `broadcast`, `pong`). Inbound
/// `subscribe_request`/`unsubscribe_request` maintain the room membership
/// used for `client_count`.
#[derive(Clone)]
pub struct BackendSocket {
    shared: Arc<SocketShared>,
    namespace: String,
    url: String,
}

impl BackendSocket {
    pub async fn connect(settings: &WebsocketSettings) -> Result<Self> {
        let shared = Arc::new(SocketShared {
            client: RwLock::new(None),
            connected: AtomicBool::new(false),
            queue: SendQueue::new(SEND_QUEUE_CAP),
            notify: Notify::new(),
            rooms: Mutex::new(FxHashMap::default()),
            messages_sent: AtomicU64::new(0),
        });

        let socket = Self {
            shared,
            namespace: settings.backend_namespace.clone(),
            url: settings.backend_socket_url.clone(),
        };

        info!(
            "Connecting to backend socket: {}{}",
            socket.url, socket.namespace
        );

        let on_connect = {
            let shared = socket.shared.clone();
            move |_payload: Payload, client: Client| {
                let shared = shared.clone();
                async move {
                    info!("Connected to backend socket");
                    shared.connected.store(true, Ordering::SeqCst);
                    let identify = serde_json::json!({
                        "type": "blockchain_listener",
                        "version": env!("CARGO_PKG_VERSION"),
                        "capabilities": ["trade_data", "chart_data", "market_data"],
                    });
                    if let Err(e) = client.emit("client_identify", identify).await {
                        warn!("Failed to identify to backend: {e}");
                    }
                }
                .boxed()
            }
        };

        let on_close = {
            let shared = socket.shared.clone();
            move |_payload: Payload, _client: Client| {
                let shared = shared.clone();
                async move {
                    warn!("Disconnected from backend socket");
                    shared.connected.store(false, Ordering::SeqCst);
                }
                .boxed()
            }
        };

        let on_ping = move |payload: Payload, client: Client| {
            async move {
                let ts = first_json(&payload)
                    .and_then(|v| v.get("timestamp").cloned())
                    .unwrap_or(serde_json::Value::Null);
                if let Err(e) = client.emit("pong", serde_json::json!({ "timestamp": ts })).await {
                    warn!("Failed to answer backend ping: {e}");
                }
            }
            .boxed()
        };

        let on_subscribe = {
            let shared = socket.shared.clone();
            move |payload: Payload, _client: Client| {
                let shared = shared.clone();
                async move {
                    if let Some((room, client_id)) = room_request(&payload) {
                        let mut rooms = shared.rooms.lock().expect("rooms lock");
                        let members = rooms.entry(room.clone()).or_default();
                        if !members.contains(&client_id) {
                            members.push(client_id);
                        }
                        debug!("Backend subscription added for {room}");
                    }
                }
                .boxed()
            }
        };

        let on_unsubscribe = {
            let shared = socket.shared.clone();
            move |payload: Payload, _client: Client| {
                let shared = shared.clone();
                async move {
                    if let Some((room, client_id)) = room_request(&payload) {
                        let mut rooms = shared.rooms.lock().expect("rooms lock");
                        if let Some(members) = rooms.get_mut(&room) {
                            members.retain(|c| c != &client_id);
                            if members.is_empty() {
                                rooms.remove(&room);
                            }
                        }
                        debug!("Backend subscription removed for {room}");
                    }
                }
                .boxed()
            }
        };

        let client = ClientBuilder::new(socket.url.clone())
            .namespace(socket.namespace.clone())
            .reconnect(true)
            .on(Event::Connect, on_connect)
            .on(Event::Close, on_close)
            .on("ping", on_ping)
            .on("subscribe_request", on_subscribe)
            .on("unsubscribe_request", on_unsubscribe)
            .on("chart_data_request", |payload: Payload, _client: Client| {
                async move {
                    info!("Chart data request from backend: {:?}", first_json(&payload));
                }
                .boxed()
            })
            .on("market_data_request", |payload: Payload, _client: Client| {
                async move {
                    info!("Market data request from backend: {:?}", first_json(&payload));
                }
                .boxed()
            })
            .connect()
            .await
            .context("Failed to connect to backend socket")?;

        *socket.shared.client.write().await = Some(client);

        Ok(socket)
    }

    /// Drain the send queue until cancellation. Spawned by the supervisor.
    pub async fn run(&self, cancellation_token: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Backend socket sender received cancellation signal");
                    break;
                }
                _ = self.shared.notify.notified() => {
                    self.flush_queue().await;
                }
            }
        }
    }

    async fn flush_queue(&self) {
        while let Some(msg) = self.shared.queue.pop() {
            let guard = self.shared.client.read().await;
            let Some(client) = guard.as_ref() else {
                warn!("Backend socket not initialized, dropping {}", msg.event);
                continue;
            };

            match client.emit(msg.event, msg.payload).await {
                Ok(()) => {
                    self.shared.messages_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    // Best-effort sink: log and move on, no retry
                    warn!("Failed to emit {} to backend: {e}", msg.event);
                }
            }
        }
    }

    /// Enqueue a message; never blocks the caller.
    pub fn send(&self, event: &'static str, payload: serde_json::Value) {
        if self.shared.queue.push(OutboundMessage { event, payload }) {
            warn!(
                "Backend send queue full, dropped oldest message ({} total)",
                self.shared.queue.dropped_total()
            );
        }
        self.shared.notify.notify_one();
    }

    /// Emit a `room_message` to `token:<token>` style rooms.
    pub fn send_to_room(&self, room: &str, data: serde_json::Value) {
        let client_count = {
            let rooms = self.shared.rooms.lock().expect("rooms lock");
            rooms.get(room).map(|m| m.len()).unwrap_or(0)
        };
        self.send(
            "room_message",
            serde_json::json!({
                "room": room,
                "data": data,
                "client_count": client_count,
            }),
        );
    }

    /// General broadcast through the backend.
    pub fn broadcast(&self, data: serde_json::Value) {
        self.send("broadcast", data);
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn messages_sent(&self) -> u64 {
        self.shared.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.shared.queue.dropped_total()
    }

    pub async fn disconnect(&self) {
        let guard = self.shared.client.read().await;
        if let Some(client) = guard.as_ref() {
            if let Err(e) = client.disconnect().await {
                warn!("Error disconnecting backend socket: {e}");
            }
        }
        self.shared.connected.store(false, Ordering::SeqCst);
    }
}

fn first_json(payload: &Payload) -> Option<serde_json::Value> {
    match payload {
        Payload::Text(values) => values.first().cloned(),
        _ => None,
    }
}

fn room_request(payload: &Payload) -> Option<(String, String)> {
    let value = first_json(payload)?;
    let token = value.get("token_address")?.as_str()?.to_string();
    let interval = value
        .get("interval")
        .and_then(|v| v.as_str())
        .unwrap_or("1m");
    let client_id = value.get("client_id")?.as_str()?.to_string();
    Some((format!("token:{token}:{interval}"), client_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(n: usize) -> OutboundMessage {
        OutboundMessage {
            event: "room_message",
            payload: serde_json::json!({ "seq": n }),
        }
    }

    #[test]
    fn queue_preserves_fifo_order() {
        let queue = SendQueue::new(4);
        for n in 0..3 {
            assert!(!queue.push(msg(n)));
        }
        for n in 0..3 {
            assert_eq!(queue.pop().unwrap().payload["seq"], n);
        }
        assert!(queue.pop().is_none());
    }

    #[test]
    fn full_queue_drops_oldest_not_newest() {
        let queue = SendQueue::new(2);
        assert!(!queue.push(msg(0)));
        assert!(!queue.push(msg(1)));
        // Queue full: 0 is evicted, 2 is kept
        assert!(queue.push(msg(2)));
        assert_eq!(queue.dropped_total(), 1);

        assert_eq!(queue.pop().unwrap().payload["seq"], 1);
        assert_eq!(queue.pop().unwrap().payload["seq"], 2);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn drop_counter_accumulates() {
        let queue = SendQueue::new(1);
        queue.push(msg(0));
        for n in 1..=5 {
            assert!(queue.push(msg(n)));
        }
        assert_eq!(queue.dropped_total(), 5);
        assert_eq!(queue.pop().unwrap().payload["seq"], 5);
    }

    #[test]
    fn room_request_defaults_interval() {
        let payload = Payload::Text(vec![serde_json::json!({
            "token_address": "0xabc",
            "client_id": "client-1",
        })]);
        let (room, client) = room_request(&payload).unwrap();
        assert_eq!(room, "token:0xabc:1m");
        assert_eq!(client, "client-1");
    }
}
