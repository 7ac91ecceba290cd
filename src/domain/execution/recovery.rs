//! Startup recovery of work left behind by a previous process

use tracing::{info, warn};

use super::{ExecutionEngine, TradeOutcome};
use crate::domain::trade::{Trade, TradeDisposition};
use crate::shared::errors::ExecutionError;
use crate::shared::types::TradeId;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Claims cleared because their owner died.
    pub released_claims: usize,
    /// Trades whose `Pending` attempt was re-checked, with the result.
    pub resumed: Vec<(TradeId, TradeOutcome)>,
    /// Queued trades that still need a lane.
    pub requeued: Vec<Trade>,
}

/// Resolves every trade whose latest record is `Pending`, then returns the
/// queued trades for the pipeline. Confirmed trades are never touched.
pub async fn recover(engine: &ExecutionEngine) -> Result<RecoveryReport, ExecutionError> {
    let store = engine.store();
    let mut report = RecoveryReport {
        released_claims: store.reset_in_flight()?,
        ..RecoveryReport::default()
    };
    if report.released_claims > 0 {
        warn!(count = report.released_claims, "Released stale in-flight claims");
    }

    for (trade, pending) in store.pending_attempts()? {
        info!(
            trade_id = %trade.id,
            attempt = pending.attempt,
            signature = pending.signature.as_deref().unwrap_or(""),
            "Resuming pending attempt"
        );
        let outcome = engine.resume(&trade, pending).await?;
        report.resumed.push((trade.id.clone(), outcome));
    }

    report.requeued = store.trades_with(TradeDisposition::Queued)?;
    info!(
        resumed = report.resumed.len(),
        requeued = report.requeued.len(),
        "Recovery complete"
    );
    Ok(report)
}
