//! Pub/Sub messaging module for live data push.
//!
//! Provides the Socket.IO connection to the presentation backend, used to
//! fan live trade, market, and alert payloads out to chart subscribers.

mod socket;

pub use socket::{BackendSocket, OutboundMessage};
