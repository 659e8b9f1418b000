pub mod cleanup_trades;
pub mod health_monitor;
