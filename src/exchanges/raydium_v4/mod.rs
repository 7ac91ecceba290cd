pub mod adapter;
pub mod instruction;
pub mod parser;

pub use adapter::RaydiumV4Adapter;
pub use parser::RaydiumV4Parser;

/// Raydium liquidity pool v4 program on mainnet.
pub const RAYDIUM_V4_PROGRAM_ID: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
