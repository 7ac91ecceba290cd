#![allow(dead_code)]

use async_trait::async_trait;
use copytrade::domain::execution::{EngineConfig, ExecutionEngine, Ledger, ReceiptStatus};
use copytrade::domain::planner::{PlannerConfig, SwapPlanner};
use copytrade::exchanges::transaction_builder::TransactionBuilder;
use copytrade::exchanges::types::{PoolKeys, PoolState};
use copytrade::exchanges::PoolSource;
use copytrade::feed::TradeSource;
use copytrade::infrastructure::EventStore;
use copytrade::shared::errors::{FeedError, LedgerError, PlanError};
use serde_json::{json, Value};
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const LAST_VALID_HEIGHT: u64 = 150;

pub fn mint_a() -> Pubkey {
    Pubkey::new_from_array([1; 32])
}

pub fn mint_b() -> Pubkey {
    Pubkey::new_from_array([2; 32])
}

pub fn record(id: u64, trader: &str, amount: u64) -> Value {
    json!({
        "id": id,
        "trader": trader,
        "in": mint_a().to_string(),
        "out": mint_b().to_string(),
        "amount": amount,
    })
}

/// Serves the same batch on every poll.
pub struct StaticFeed(pub Vec<Value>);

#[async_trait]
impl TradeSource for StaticFeed {
    async fn fetch(&self) -> Result<Vec<Value>, FeedError> {
        Ok(self.0.clone())
    }
}

pub struct FixedPool(pub PoolState);

#[async_trait]
impl PoolSource for FixedPool {
    async fn pool_state(&self, _pool: &Pubkey) -> Result<PoolState, PlanError> {
        Ok(self.0.clone())
    }
}

pub fn pool_state() -> PoolState {
    let key = |b: u8| Pubkey::new_from_array([b; 32]);
    PoolState {
        keys: PoolKeys {
            amm: key(10),
            program_id: key(11),
            authority: key(12),
            open_orders: key(13),
            target_orders: key(14),
            base_vault: key(15),
            quote_vault: key(16),
            base_mint: mint_a(),
            quote_mint: mint_b(),
            market_program: key(17),
            market: key(18),
            market_bids: key(19),
            market_asks: key(20),
            market_event_queue: key(21),
            market_base_vault: key(22),
            market_quote_vault: key(23),
            market_vault_signer: key(24),
        },
        base_reserve: 1_000_000,
        quote_reserve: 1_000_000,
        fee_numerator: 25,
        fee_denominator: 10_000,
        slot: 100,
    }
}

#[derive(Default)]
struct LedgerState {
    /// Distinct signatures in first-send order.
    sent: Vec<Signature>,
    sends: usize,
    polls: HashMap<Signature, u32>,
    /// Signature sent but not yet reported terminal.
    outstanding: Option<Signature>,
    /// A new signature was sent while another was still outstanding.
    overlap: bool,
    /// Signatures sent and not yet reported terminal, across all trades.
    in_flight: HashSet<Signature>,
    max_in_flight: usize,
}

/// Ledger that confirms each signature after `polls_to_confirm` status
/// queries, or never when `None`.
pub struct FakeLedger {
    state: Mutex<LedgerState>,
    polls_to_confirm: Option<u32>,
    block_height: u64,
    /// Finalized long ago; only a history lookup finds these.
    archived: HashSet<Signature>,
    history_lookups: Mutex<usize>,
}

impl FakeLedger {
    pub fn confirming_after(polls: u32) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            polls_to_confirm: Some(polls),
            block_height: 10,
            archived: HashSet::new(),
            history_lookups: Mutex::new(0),
        }
    }

    /// Never confirms, and the chain is already past every blockhash.
    pub fn always_expiring() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            polls_to_confirm: None,
            block_height: LAST_VALID_HEIGHT + 1,
            archived: HashSet::new(),
            history_lookups: Mutex::new(0),
        }
    }

    /// Marks `signature` as settled before the recent status cache window.
    pub fn with_archived(mut self, signature: Signature) -> Self {
        self.archived.insert(signature);
        self
    }

    pub fn history_lookups(&self) -> usize {
        *self.history_lookups.lock().unwrap()
    }

    /// Most signatures ever outstanding at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }

    pub fn sends(&self) -> usize {
        self.state.lock().unwrap().sends
    }

    pub fn distinct_signatures(&self) -> Vec<Signature> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn overlapped(&self) -> bool {
        self.state.lock().unwrap().overlap
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn latest_blockhash(&self) -> Result<(Hash, u64), LedgerError> {
        Ok((Hash::new_unique(), LAST_VALID_HEIGHT))
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, LedgerError> {
        let signature = transaction.signatures[0];
        let mut state = self.state.lock().unwrap();
        state.sends += 1;
        if !state.sent.contains(&signature) {
            if state.outstanding.is_some_and(|s| s != signature) {
                state.overlap = true;
            }
            state.sent.push(signature);
            state.outstanding = Some(signature);
            state.in_flight.insert(signature);
            state.max_in_flight = state.max_in_flight.max(state.in_flight.len());
        }
        Ok(signature)
    }

    async fn simulate_transaction(
        &self,
        _transaction: &Transaction,
    ) -> Result<Option<String>, LedgerError> {
        Ok(None)
    }

    async fn signature_status(
        &self,
        signature: &Signature,
        search_history: bool,
    ) -> Result<ReceiptStatus, LedgerError> {
        if search_history {
            *self.history_lookups.lock().unwrap() += 1;
        }
        if self.archived.contains(signature) {
            return Ok(if search_history {
                ReceiptStatus::Confirmed
            } else {
                ReceiptStatus::Unknown
            });
        }

        let mut state = self.state.lock().unwrap();
        let polls = {
            let count = state.polls.entry(*signature).or_insert(0);
            *count += 1;
            *count
        };
        let (status, terminal) = match self.polls_to_confirm {
            Some(needed) if polls >= needed => (ReceiptStatus::Confirmed, true),
            Some(_) => (ReceiptStatus::Unknown, false),
            // Expiry is decided by block height, so the attempt ends here.
            None => (ReceiptStatus::Unknown, true),
        };
        if terminal {
            if state.outstanding == Some(*signature) {
                state.outstanding = None;
            }
            state.in_flight.remove(signature);
        }
        Ok(status)
    }

    async fn block_height(&self) -> Result<u64, LedgerError> {
        Ok(self.block_height)
    }

    async fn slot(&self) -> Result<u64, LedgerError> {
        Ok(100)
    }
}

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        max_attempts: 3,
        attempt_timeout: Duration::from_secs(30),
        confirm_poll_interval: Duration::from_millis(100),
        resend_interval: Duration::from_secs(1),
        dry_run: false,
        default_pool: Some(Pubkey::new_from_array([10; 32])),
    }
}

pub fn engine(
    ledger: Arc<FakeLedger>,
    store: Arc<EventStore>,
    shutdown: CancellationToken,
) -> ExecutionEngine {
    let payer = Arc::new(Keypair::new());
    let planner = SwapPlanner::new(PlannerConfig::new(payer.pubkey(), 100, 50));
    ExecutionEngine::new(
        ledger,
        Arc::new(FixedPool(pool_state())),
        store,
        planner,
        TransactionBuilder::default(),
        payer,
        engine_config(),
        shutdown,
    )
}

/// Polls `check` on the tokio clock until it holds or `limit` elapses.
pub async fn wait_until<F>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
