//! Signs, submits and tracks swap attempts for one trade at a time

use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    transaction::Transaction,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ExecutionRecord, ExecutionStatus, Ledger, ReceiptStatus};
use crate::domain::planner::SwapPlanner;
use crate::domain::trade::{Trade, TradeDisposition};
use crate::exchanges::transaction_builder::TransactionBuilder;
use crate::exchanges::types::SwapInstruction;
use crate::exchanges::PoolSource;
use crate::infrastructure::store::EventStore;
use crate::shared::errors::{ExecutionError, LedgerError, PlanError};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub confirm_poll_interval: Duration,
    pub resend_interval: Duration,
    /// Simulate instead of sending.
    pub dry_run: bool,
    /// Pool used when the feed does not name one.
    pub default_pool: Option<Pubkey>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(90),
            confirm_poll_interval: Duration::from_secs(2),
            resend_interval: Duration::from_secs(2),
            dry_run: false,
            default_pool: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeOutcome {
    Confirmed { signature: String, attempts: u32 },
    PermanentlyFailed { attempts: u32 },
    /// Planning or blockhash fetch failed; no attempt was consumed.
    Deferred(String),
    /// Held by another worker or already settled.
    Skipped,
    /// Shutdown arrived before the next attempt could start.
    Interrupted,
}

pub struct ExecutionEngine {
    ledger: Arc<dyn Ledger>,
    pools: Arc<dyn PoolSource>,
    store: Arc<EventStore>,
    planner: SwapPlanner,
    builder: TransactionBuilder,
    payer: Arc<Keypair>,
    config: EngineConfig,
    shutdown: CancellationToken,
}

impl ExecutionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn Ledger>,
        pools: Arc<dyn PoolSource>,
        store: Arc<EventStore>,
        planner: SwapPlanner,
        builder: TransactionBuilder,
        payer: Arc<Keypair>,
        config: EngineConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ledger,
            pools,
            store,
            planner,
            builder,
            payer,
            config,
            shutdown,
        }
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs the trade until it is confirmed, permanently failed or deferred.
    pub async fn execute(&self, trade: &Trade) -> Result<TradeOutcome, ExecutionError> {
        self.claimed(trade, None).await
    }

    /// Continues a trade whose latest record is a `Pending` attempt left by a
    /// previous process. The signature is re-checked, never re-signed.
    pub async fn resume(
        &self,
        trade: &Trade,
        pending: ExecutionRecord,
    ) -> Result<TradeOutcome, ExecutionError> {
        self.claimed(trade, Some(pending)).await
    }

    async fn claimed(
        &self,
        trade: &Trade,
        pending: Option<ExecutionRecord>,
    ) -> Result<TradeOutcome, ExecutionError> {
        if !self.store.claim(&trade.id)? {
            debug!(trade_id = %trade.id, "Trade already claimed or settled");
            return Ok(TradeOutcome::Skipped);
        }
        let outcome = self.run_attempts(trade, pending).await;
        self.store.release(&trade.id)?;
        outcome
    }

    async fn run_attempts(
        &self,
        trade: &Trade,
        pending: Option<ExecutionRecord>,
    ) -> Result<TradeOutcome, ExecutionError> {
        let mut attempts = self.store.attempts_made(&trade.id)?;

        if let Some(pending) = pending {
            let deadline = self.remaining_deadline(&pending);
            let record = self.drive(pending, None, deadline).await?;
            if let Some(outcome) = self.settle(trade, &record, attempts)? {
                return Ok(outcome);
            }
        }

        loop {
            if attempts >= self.config.max_attempts {
                self.store.set_disposition(
                    &trade.id,
                    TradeDisposition::PermanentlyFailed,
                    Some(&format!("{} attempts exhausted", attempts)),
                )?;
                let exhausted = ExecutionError::AttemptsExhausted {
                    trade_id: trade.id.to_string(),
                    attempts,
                };
                error!(
                    trade_id = %trade.id,
                    actor = %trade.actor,
                    error = %exhausted,
                    "Trade permanently failed"
                );
                return Ok(TradeOutcome::PermanentlyFailed { attempts });
            }

            if self.shutdown.is_cancelled() {
                info!(trade_id = %trade.id, "Shutdown requested, leaving trade queued");
                return Ok(TradeOutcome::Interrupted);
            }

            let instruction = match self.plan(trade).await {
                Ok(instruction) => instruction,
                Err(e) => return self.defer(trade, e.to_string()),
            };
            let (blockhash, last_valid_block_height) = match self.ledger.latest_blockhash().await {
                Ok(latest) => latest,
                Err(e) => return self.defer(trade, e.to_string()),
            };

            attempts += 1;
            let record = self
                .attempt(trade, attempts, &instruction, blockhash, last_valid_block_height)
                .await?;
            if let Some(outcome) = self.settle(trade, &record, attempts)? {
                return Ok(outcome);
            }
        }
    }

    async fn plan(&self, trade: &Trade) -> Result<SwapInstruction, PlanError> {
        let pool = trade.pool.or(self.config.default_pool).ok_or_else(|| {
            PlanError::PoolUnavailable(format!(
                "trade {} names no pool and no default pool is configured",
                trade.id
            ))
        })?;
        let state = self.pools.pool_state(&pool).await?;
        // Read after the pool so the tip is never older than the pool snapshot.
        let tip_slot = self
            .ledger
            .slot()
            .await
            .map_err(|e| PlanError::PoolUnavailable(format!("tip slot: {}", e)))?;
        self.planner.plan(trade, &state, tip_slot)
    }

    fn defer(&self, trade: &Trade, reason: String) -> Result<TradeOutcome, ExecutionError> {
        self.store
            .set_disposition(&trade.id, TradeDisposition::Deferred, Some(&reason))?;
        warn!(trade_id = %trade.id, reason = %reason, "Trade deferred");
        Ok(TradeOutcome::Deferred(reason))
    }

    async fn attempt(
        &self,
        trade: &Trade,
        attempt: u32,
        instruction: &SwapInstruction,
        blockhash: Hash,
        last_valid_block_height: u64,
    ) -> Result<ExecutionRecord, ExecutionError> {
        let transaction = self.builder.build_signed(instruction, &self.payer, blockhash)?;
        let signature = transaction
            .signatures
            .first()
            .copied()
            .ok_or_else(|| ExecutionError::Build("transaction carries no signature".to_string()))?;

        // Write-ahead: the signature is durable before anything reaches the network.
        let pending = ExecutionRecord::pending(
            trade.id.clone(),
            attempt,
            instruction.hash_hex(),
            &signature,
            last_valid_block_height,
        );
        self.store.append_execution(&pending)?;
        info!(
            trade_id = %trade.id,
            attempt,
            %signature,
            amount_in = instruction.amount_in(),
            expected_out = instruction.expected_out(),
            min_amount_out = instruction.min_amount_out(),
            "Submitting swap"
        );

        if self.config.dry_run {
            let (status, detail) = match self.ledger.simulate_transaction(&transaction).await {
                Ok(None) => (ExecutionStatus::Confirmed, "simulated".to_string()),
                Ok(Some(reason)) => (ExecutionStatus::Failed, format!("simulation failed: {}", reason)),
                Err(e) => (ExecutionStatus::Failed, e.to_string()),
            };
            return self.finish(&pending, status, 0, Some(detail));
        }

        let deadline = Instant::now() + self.config.attempt_timeout;
        self.drive(pending, Some(&transaction), deadline).await
    }

    /// Polls the signature until the attempt reaches a terminal status. When the
    /// signed transaction is available it is re-sent unchanged while unconfirmed.
    ///
    /// Once the ledger has reported the transaction as landed, neither the
    /// attempt timeout nor the blockhash bound ends the attempt while it stays
    /// visible. If it later vanishes (a dropped fork) it expires only after its
    /// blockhash can no longer be included.
    async fn drive(
        &self,
        pending: ExecutionRecord,
        transaction: Option<&Transaction>,
        deadline: Instant,
    ) -> Result<ExecutionRecord, ExecutionError> {
        let signature: Signature = pending
            .signature
            .as_deref()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                ExecutionError::Build(format!(
                    "pending attempt {} of trade {} has no valid signature",
                    pending.attempt, pending.trade_id
                ))
            })?;

        // A resumed attempt may have settled while the process was down.
        let search_history = transaction.is_none();
        let mut retry_count = pending.retry_count;
        let mut accepted = false;
        let mut landed = false;
        let mut last_send: Option<Instant> = None;

        loop {
            if let Some(transaction) = transaction {
                let due = match last_send {
                    None => true,
                    Some(at) => !accepted || at.elapsed() >= self.config.resend_interval,
                };
                if due {
                    if last_send.is_some() {
                        retry_count += 1;
                    }
                    last_send = Some(Instant::now());
                    match self.ledger.send_transaction(transaction).await {
                        Ok(_) => accepted = true,
                        Err(LedgerError::Rejected(reason)) if !accepted && !landed => {
                            return self.finish(&pending, ExecutionStatus::Failed, retry_count, Some(reason));
                        }
                        Err(e) => {
                            warn!(
                                trade_id = %pending.trade_id,
                                %signature,
                                retry_count,
                                error = %e,
                                "Send failed, will resend"
                            );
                        }
                    }
                }
            }

            let visible = match self.ledger.signature_status(&signature, search_history).await {
                Ok(ReceiptStatus::Confirmed) => {
                    return self.finish(&pending, ExecutionStatus::Confirmed, retry_count, None);
                }
                Ok(ReceiptStatus::Failed(reason)) => {
                    return self.finish(&pending, ExecutionStatus::Failed, retry_count, Some(reason));
                }
                Ok(ReceiptStatus::Processing) => {
                    if !landed {
                        debug!(trade_id = %pending.trade_id, %signature, "Transaction landed");
                    }
                    landed = true;
                    true
                }
                Ok(ReceiptStatus::Unknown) => false,
                Err(e) => {
                    debug!(%signature, error = %e, "Signature status unavailable");
                    landed
                }
            };

            if landed && visible {
                sleep(self.config.confirm_poll_interval).await;
                continue;
            }

            if !landed && Instant::now() >= deadline {
                return self.finish(
                    &pending,
                    ExecutionStatus::Expired,
                    retry_count,
                    Some("no receipt before attempt timeout".to_string()),
                );
            }

            if let Ok(height) = self.ledger.block_height().await {
                if height > pending.last_valid_block_height {
                    let expired = format!(
                        "blockhash expired at height {} (valid through {})",
                        height, pending.last_valid_block_height
                    );
                    let detail = if landed {
                        format!("dropped after landing; {}", expired)
                    } else {
                        expired
                    };
                    return self.finish(&pending, ExecutionStatus::Expired, retry_count, Some(detail));
                }
            }

            sleep(self.config.confirm_poll_interval).await;
        }
    }

    fn finish(
        &self,
        pending: &ExecutionRecord,
        status: ExecutionStatus,
        retry_count: u32,
        detail: Option<String>,
    ) -> Result<ExecutionRecord, ExecutionError> {
        let record = pending.transition(status, retry_count, detail);
        self.store.append_execution(&record)?;
        debug!(
            trade_id = %record.trade_id,
            attempt = record.attempt,
            status = %record.status,
            retry_count,
            "Attempt finished"
        );
        Ok(record)
    }

    /// Persists the trade-level result of a terminal attempt. `None` means
    /// the trade should be replanned.
    fn settle(
        &self,
        trade: &Trade,
        record: &ExecutionRecord,
        attempts: u32,
    ) -> Result<Option<TradeOutcome>, ExecutionError> {
        match record.status {
            ExecutionStatus::Confirmed => {
                self.store.set_disposition(
                    &trade.id,
                    TradeDisposition::Confirmed,
                    record.detail.as_deref(),
                )?;
                let signature = record.signature.clone().unwrap_or_default();
                info!(
                    trade_id = %trade.id,
                    attempt = record.attempt,
                    signature = %signature,
                    "Trade confirmed"
                );
                Ok(Some(TradeOutcome::Confirmed {
                    signature,
                    attempts,
                }))
            }
            ExecutionStatus::Failed | ExecutionStatus::Expired => {
                warn!(
                    trade_id = %trade.id,
                    attempt = record.attempt,
                    status = %record.status,
                    detail = record.detail.as_deref().unwrap_or(""),
                    "Attempt did not land"
                );
                Ok(None)
            }
            ExecutionStatus::Pending => Err(ExecutionError::ConfirmationTimeout(format!(
                "attempt {} of trade {} is still pending",
                record.attempt, trade.id
            ))),
        }
    }

    fn remaining_deadline(&self, pending: &ExecutionRecord) -> Instant {
        let elapsed = (chrono::Utc::now() - pending.submitted_at)
            .to_std()
            .unwrap_or_default();
        Instant::now() + self.config.attempt_timeout.saturating_sub(elapsed)
    }
}
