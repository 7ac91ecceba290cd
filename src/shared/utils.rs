//! Utility functions and helpers

use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;

/// Shorten an address for log lines
pub fn short_pubkey(address: &Pubkey) -> String {
    let s = address.to_string();
    if s.len() <= 16 {
        return s;
    }
    format!("{}...{}", &s[..8], &s[s.len() - 8..])
}

/// Parse a commitment name ("processed", "confirmed", "finalized")
pub fn parse_commitment(value: &str) -> Option<CommitmentConfig> {
    match value.trim().to_ascii_lowercase().as_str() {
        "processed" => Some(CommitmentConfig::processed()),
        "confirmed" => Some(CommitmentConfig::confirmed()),
        "finalized" => Some(CommitmentConfig::finalized()),
        _ => None,
    }
}

/// Render an error with its source chain on one line
pub fn format_error_chain(error: &anyhow::Error) -> String {
    error
        .chain()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(" | ")
}
