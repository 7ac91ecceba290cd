// src/report.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::execution::{ExecutionRecord, ExecutionStatus};
use crate::domain::trade::{Trade, TradeDisposition};

/// Everything the store knows about one trade.
#[derive(Debug, Serialize, Deserialize)]
pub struct TradeReport {
    pub trade: Trade,
    pub disposition: TradeDisposition,
    pub detail: Option<String>,
    pub attempts: u32,
    pub latest_status: Option<ExecutionStatus>,
    pub signature: Option<String>,
    pub history: Vec<ExecutionRecord>,
    pub generated_at: DateTime<Utc>,
}

impl TradeReport {
    pub fn new(
        trade: Trade,
        disposition: TradeDisposition,
        detail: Option<String>,
        history: Vec<ExecutionRecord>,
    ) -> Self {
        let attempts = history.iter().map(|r| r.attempt).max().unwrap_or(0);
        let latest = history.last();
        Self {
            latest_status: latest.map(|r| r.status),
            signature: latest.and_then(|r| r.signature.clone()),
            trade,
            disposition,
            detail,
            attempts,
            history,
            generated_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable multi-line summary.
    pub fn render(&self) -> String {
        let mut out = format!(
            "trade {} by {}\n  {} {} -> {}\n  disposition: {}",
            self.trade.id,
            self.trade.actor,
            self.trade.amount_in,
            self.trade.input_mint,
            self.trade.output_mint,
            self.disposition,
        );
        if let Some(detail) = &self.detail {
            out.push_str(&format!(" ({})", detail));
        }
        out.push_str(&format!("\n  attempts: {}", self.attempts));
        for record in &self.history {
            out.push_str(&format!(
                "\n  #{} {:<9} resends={} sig={} {}",
                record.attempt,
                record.status.as_str(),
                record.retry_count,
                record.signature.as_deref().unwrap_or("-"),
                record.detail.as_deref().unwrap_or(""),
            ));
        }
        out
    }
}
