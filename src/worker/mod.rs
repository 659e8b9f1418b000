pub mod client;
pub mod dispatcher;
pub mod parser;
pub mod registry;

pub use client::ChainClient;
pub use dispatcher::{run_event_feed, Dispatcher};
pub use parser::Decoder;
pub use registry::CurveRegistry;
