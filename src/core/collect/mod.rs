//! Data collectors: market sync, order-book fanout, and the trade sweep.
//!
//! Collectors fetch from upstream first and only then touch the store, so
//! no write transaction is ever held across an upstream call.

pub mod markets;
pub mod orderbooks;
pub mod trades;

pub use markets::MarketSync;
pub use orderbooks::OrderBookCollector;
pub use trades::TradeCollector;
