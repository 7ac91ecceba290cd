//! Shared components - common types, errors, and utilities

pub mod errors;
pub mod retry;
pub mod types;
pub mod utils;
