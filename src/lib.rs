//! copytrade - mirrors a target wallet's swaps on Solana
//! Feed -> filter -> planner -> execution engine, backed by a SQLite event store

pub mod app;
pub mod application;
pub mod config;
pub mod domain;
pub mod exchanges;
pub mod feed;
pub mod infrastructure;
pub mod logging;
pub mod math;
pub mod report;
pub mod shared;

// Re-export main types for convenience
pub use config::Config;
pub use domain::execution::{ExecutionEngine, ExecutionRecord, ExecutionStatus, TradeOutcome};
pub use domain::planner::SwapPlanner;
pub use domain::trade::{Trade, TradeDisposition, TradeFilter};
pub use feed::FeedPoller;
pub use infrastructure::EventStore;
