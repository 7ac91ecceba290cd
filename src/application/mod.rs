//! Application layer - CLI commands and the trading pipeline

pub mod commands;
pub mod pipeline;

pub use commands::{Cli, Commands};
pub use pipeline::{Pipeline, PipelineConfig};
