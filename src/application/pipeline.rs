//! Poll -> dispatch -> per-actor lanes -> engine

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::execution::{ExecutionEngine, TradeOutcome};
use crate::domain::trade::{Trade, TradeDisposition};
use crate::feed::FeedPoller;
use crate::infrastructure::store::EventStore;
use crate::shared::retry::Backoff;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub poll_interval: Duration,
    pub backoff_max: Duration,
    /// Capacity of the dispatch queue and of each lane.
    pub queue_capacity: usize,
    pub max_concurrent_attempts: usize,
}

pub struct Pipeline {
    poller: Arc<FeedPoller>,
    engine: Arc<ExecutionEngine>,
    store: Arc<EventStore>,
    config: PipelineConfig,
    shutdown: CancellationToken,
}

impl Pipeline {
    pub fn new(
        poller: Arc<FeedPoller>,
        engine: Arc<ExecutionEngine>,
        config: PipelineConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let store = engine.store().clone();
        Self {
            poller,
            engine,
            store,
            config,
            shutdown,
        }
    }

    /// Runs until the shutdown token fires. `backlog` is dispatched ahead of
    /// the first poll. Returns once every lane has drained.
    pub async fn run(self, backlog: Vec<Trade>) -> Result<()> {
        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));

        let dispatcher = tokio::spawn(dispatch(
            rx,
            self.engine.clone(),
            self.store.clone(),
            Arc::new(Semaphore::new(self.config.max_concurrent_attempts.max(1))),
            self.config.queue_capacity.max(1),
        ));

        poll_loop(
            self.poller.clone(),
            tx,
            backlog,
            self.config.clone(),
            self.shutdown.clone(),
        )
        .await;

        dispatcher.await.context("dispatcher task panicked")?;
        info!("Pipeline stopped");
        Ok(())
    }
}

async fn poll_loop(
    poller: Arc<FeedPoller>,
    tx: mpsc::Sender<Trade>,
    backlog: Vec<Trade>,
    config: PipelineConfig,
    shutdown: CancellationToken,
) {
    for trade in backlog {
        if tx.send(trade).await.is_err() {
            return;
        }
    }

    let mut backoff = Backoff::new(config.poll_interval, config.backoff_max);
    let mut delay = Duration::ZERO;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, poller stopping");
                break;
            }
            _ = sleep(delay) => {}
        }

        let mut batch = match poller.due_deferred() {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Failed to load deferred trades");
                Vec::new()
            }
        };
        match poller.poll().await {
            Ok(trades) => {
                backoff.reset();
                delay = config.poll_interval;
                batch.extend(trades);
            }
            Err(e) => {
                delay = backoff.next_delay();
                warn!(
                    error = %e,
                    failures = backoff.failures(),
                    retry_in_ms = delay.as_millis() as u64,
                    "Feed poll failed"
                );
            }
        }

        for trade in batch {
            if tx.send(trade).await.is_err() {
                error!("Dispatcher gone, poller stopping");
                return;
            }
        }
    }
}

async fn dispatch(
    mut rx: mpsc::Receiver<Trade>,
    engine: Arc<ExecutionEngine>,
    store: Arc<EventStore>,
    permits: Arc<Semaphore>,
    lane_capacity: usize,
) {
    let mut lanes: HashMap<String, mpsc::Sender<Trade>> = HashMap::new();
    let mut workers = JoinSet::new();

    while let Some(trade) = rx.recv().await {
        let lane = lanes.entry(trade.actor.clone()).or_insert_with(|| {
            let (lane_tx, lane_rx) = mpsc::channel(lane_capacity);
            workers.spawn(run_lane(
                trade.actor.clone(),
                lane_rx,
                engine.clone(),
                permits.clone(),
            ));
            debug!(actor = %trade.actor, "Lane opened");
            lane_tx
        });

        if let Err(e) = lane.try_send(trade) {
            let (reason, trade) = match e {
                mpsc::error::TrySendError::Full(t) => ("lane full", t),
                mpsc::error::TrySendError::Closed(t) => ("lane closed", t),
            };
            warn!(trade_id = %trade.id, actor = %trade.actor, reason, "Trade dropped");
            if let Err(e) = store.set_disposition(&trade.id, TradeDisposition::Dropped, Some(reason)) {
                error!(trade_id = %trade.id, error = %e, "Failed to persist dropped trade");
            }
        }
    }

    // Closing the lane senders lets each worker drain and exit.
    lanes.clear();
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Lane worker panicked");
        }
    }
}

/// Executes one actor's trades strictly in arrival order. A deferred trade
/// leaves the lane, so later trades from the same actor go ahead of it; it
/// comes back through `FeedPoller::due_deferred` on a later poll cycle.
async fn run_lane(
    actor: String,
    mut rx: mpsc::Receiver<Trade>,
    engine: Arc<ExecutionEngine>,
    permits: Arc<Semaphore>,
) {
    while let Some(trade) = rx.recv().await {
        let _permit = match permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        match engine.execute(&trade).await {
            Ok(TradeOutcome::Confirmed { signature, attempts }) => {
                debug!(trade_id = %trade.id, %signature, attempts, "Lane finished trade")
            }
            Ok(outcome) => debug!(trade_id = %trade.id, ?outcome, "Lane finished trade"),
            Err(e) => error!(trade_id = %trade.id, error = %e, "Execution error"),
        }
    }
    debug!(actor = %actor, "Lane closed");
}
