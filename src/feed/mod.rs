//! Trade feed: fetching, normalization, filtering and deduplication

pub mod http;
pub mod record;

pub use http::HttpTradeSource;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::trade::{Trade, TradeDisposition, TradeFilter};
use crate::infrastructure::store::EventStore;
use crate::shared::errors::{FeedError, StoreError};

/// Raw access to the upstream trade feed.
#[async_trait]
pub trait TradeSource: Send + Sync {
    /// One element per candidate trade. `FeedError::Unavailable` when the feed
    /// cannot be read as a JSON array.
    async fn fetch(&self) -> Result<Vec<Value>, FeedError>;
}

pub struct FeedPoller {
    source: Arc<dyn TradeSource>,
    store: Arc<EventStore>,
    filter: TradeFilter,
    max_trade_age: chrono::Duration,
}

impl FeedPoller {
    pub fn new(
        source: Arc<dyn TradeSource>,
        store: Arc<EventStore>,
        filter: TradeFilter,
        max_trade_age: chrono::Duration,
    ) -> Self {
        Self {
            source,
            store,
            filter,
            max_trade_age,
        }
    }

    /// Fetches one batch and returns the target's trades not returned by any
    /// earlier call, in feed order. Each returned trade is recorded as seen.
    pub async fn poll(&self) -> Result<Vec<Trade>, FeedError> {
        let records = self.source.fetch().await?;
        let now = Utc::now();
        let total = records.len();
        let mut fresh = Vec::new();

        for value in records {
            let trade = match record::normalize(value, now) {
                Ok(trade) => trade,
                Err(e) => {
                    warn!(error = %e, "Skipping feed record");
                    continue;
                }
            };
            if !self.filter.accepts(&trade) {
                continue;
            }
            match self.store.record_seen(&trade) {
                Ok(true) => {
                    info!(
                        trade_id = %trade.id,
                        actor = %trade.actor,
                        input_mint = %trade.input_mint,
                        output_mint = %trade.output_mint,
                        amount_in = trade.amount_in,
                        "Detected target trade"
                    );
                    fresh.push(trade);
                }
                Ok(false) => debug!(trade_id = %trade.id, "Trade already seen"),
                // Not recorded, so the next poll will offer it again.
                Err(e) => error!(trade_id = %trade.id, error = %e, "Failed to record trade"),
            }
        }

        debug!(total, fresh = fresh.len(), "Feed polled");
        Ok(fresh)
    }

    /// Deferred trades to retry this cycle, flipped back to `Queued`. Those
    /// older than the age limit are dropped instead.
    pub fn due_deferred(&self) -> Result<Vec<Trade>, StoreError> {
        let now = Utc::now();
        let mut due = Vec::new();
        for trade in self.store.deferred_trades()? {
            if trade.age(now) > self.max_trade_age {
                self.store.set_disposition(
                    &trade.id,
                    TradeDisposition::Dropped,
                    Some("deferred past max trade age"),
                )?;
                warn!(trade_id = %trade.id, "Deferred trade aged out, dropped");
                continue;
            }
            self.store
                .set_disposition(&trade.id, TradeDisposition::Queued, None)?;
            due.push(trade);
        }
        Ok(due)
    }
}
