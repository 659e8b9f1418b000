use thiserror::Error;

/// Error kinds produced by the listener pipeline.
///
/// Only `Config` is fatal; everything else is handled at the site that
/// produced it (logged and dropped, or retried) so the dispatch loop
/// keeps running.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Invalid or missing configuration. Raised at startup only.
    #[error("configuration error: {0}")]
    Config(String),

    /// Chain node or cache connection failure. Recoverable via reconnect.
    #[error("connection error ({endpoint}): {message}")]
    Connection { endpoint: String, message: String },

    /// A log matched a known topic but its payload did not decode.
    #[error("failed to decode {event} log at {tx_hash}#{log_index}: {message}")]
    Decode {
        event: &'static str,
        tx_hash: String,
        log_index: u64,
        message: String,
    },

    /// A log from a watched contract carried a topic we do not bind.
    #[error("unknown topic {topic} from {address}")]
    UnknownTopic { topic: String, address: String },

    /// One fan-out sink failed. Never aborts the other sinks.
    #[error("sink `{sink}` failed for {token}: {message}")]
    Sink {
        sink: &'static str,
        token: String,
        message: String,
    },

    /// Log delivered with `removed = true` (chain reorg marker).
    #[error("removed log at {tx_hash}#{log_index} dropped")]
    ReorgHint { tx_hash: String, log_index: u64 },
}

impl ListenerError {
    pub fn connection(endpoint: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            message: err.to_string(),
        }
    }

    pub fn sink(sink: &'static str, token: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Sink {
            sink,
            token: token.into(),
            message: err.to_string(),
        }
    }
}
