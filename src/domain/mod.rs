//! Domain layer - trades, planning and execution

pub mod execution;
pub mod planner;
pub mod trade;
