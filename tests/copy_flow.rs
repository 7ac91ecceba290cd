mod common;

use common::*;
use copytrade::application::pipeline::{Pipeline, PipelineConfig};
use copytrade::domain::execution::{ExecutionStatus, TradeOutcome};
use copytrade::domain::trade::{Trade, TradeDisposition, TradeFilter};
use copytrade::feed::FeedPoller;
use copytrade::infrastructure::EventStore;
use copytrade::shared::types::TradeId;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Running {
    store: Arc<EventStore>,
    ledger: Arc<FakeLedger>,
    shutdown: CancellationToken,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl Running {
    async fn stop(self) -> (Arc<EventStore>, Arc<FakeLedger>) {
        self.shutdown.cancel();
        self.handle.await.unwrap().unwrap();
        (self.store, self.ledger)
    }

    fn disposition(&self, id: &str) -> Option<TradeDisposition> {
        self.store.disposition(&TradeId::from(id)).unwrap()
    }
}

fn start(feed: Vec<serde_json::Value>, ledger: FakeLedger) -> Running {
    launch(feed, ledger, 16, 4, Vec::new())
}

/// Backlog trades are recorded as seen and dispatched ahead of the first poll.
fn launch(
    feed: Vec<serde_json::Value>,
    ledger: FakeLedger,
    queue_capacity: usize,
    max_concurrent_attempts: usize,
    backlog: Vec<Trade>,
) -> Running {
    let store = Arc::new(EventStore::open_in_memory().unwrap());
    for trade in &backlog {
        store.record_seen(trade).unwrap();
    }
    let ledger = Arc::new(ledger);
    let shutdown = CancellationToken::new();
    let engine = Arc::new(engine(ledger.clone(), store.clone(), shutdown.clone()));
    let poller = Arc::new(FeedPoller::new(
        Arc::new(StaticFeed(feed)),
        store.clone(),
        TradeFilter::new("X"),
        chrono::Duration::seconds(600),
    ));
    let pipeline = Pipeline::new(
        poller,
        engine,
        PipelineConfig {
            poll_interval: Duration::from_secs(1),
            backoff_max: Duration::from_secs(10),
            queue_capacity,
            max_concurrent_attempts,
        },
        shutdown.clone(),
    );
    let handle = tokio::spawn(pipeline.run(backlog));
    Running {
        store,
        ledger,
        shutdown,
        handle,
    }
}

fn backlog_trade(id: &str, actor: &str) -> Trade {
    Trade {
        id: TradeId::from(id),
        actor: actor.to_string(),
        input_mint: mint_a(),
        output_mint: mint_b(),
        amount_in: 10_000,
        observed_at: chrono::Utc::now(),
        pool: None,
    }
}

#[tokio::test(start_paused = true)]
async fn target_trade_is_copied_exactly_once() {
    let run = start(vec![record(1, "X", 10_000)], FakeLedger::confirming_after(2));

    assert!(
        wait_until(Duration::from_secs(30), || run.disposition("1")
            == Some(TradeDisposition::Confirmed))
        .await
    );
    // several more poll cycles over the same feed response
    tokio::time::sleep(Duration::from_secs(5)).await;
    let (store, ledger) = run.stop().await;

    let history = store.history(&TradeId::from("1")).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, ExecutionStatus::Pending);
    assert_eq!(history[1].status, ExecutionStatus::Confirmed);
    assert!(history.iter().all(|r| r.attempt == 1));
    assert_eq!(ledger.distinct_signatures().len(), 1);
    assert_eq!(ledger.sends(), 1);
}

#[tokio::test(start_paused = true)]
async fn other_traders_are_ignored() {
    let run = start(
        vec![record(1, "Y", 10_000), record(2, "Y", 5_000)],
        FakeLedger::confirming_after(1),
    );
    tokio::time::sleep(Duration::from_secs(5)).await;
    let (store, ledger) = run.stop().await;

    assert_eq!(ledger.sends(), 0);
    assert!(!store.has_seen(&TradeId::from("1")).unwrap());
    assert!(store.history(&TradeId::from("2")).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn same_actor_trades_settle_in_feed_order() {
    let run = start(
        vec![record(1, "X", 10_000), record(2, "X", 20_000)],
        FakeLedger::confirming_after(4),
    );

    assert!(
        wait_until(Duration::from_secs(30), || run.disposition("2")
            == Some(TradeDisposition::Confirmed))
        .await
    );
    let (store, ledger) = run.stop().await;

    assert!(!ledger.overlapped());
    let first = store.history(&TradeId::from("1")).unwrap();
    let second = store.history(&TradeId::from("2")).unwrap();
    let first_done = first.last().unwrap();
    assert_eq!(first_done.status, ExecutionStatus::Confirmed);
    assert!(first_done.recorded_at <= second[0].submitted_at);
    assert_eq!(ledger.distinct_signatures().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn expiring_attempts_end_in_permanent_failure() {
    let run = start(vec![record(1, "X", 10_000)], FakeLedger::always_expiring());

    assert!(
        wait_until(Duration::from_secs(30), || run.disposition("1")
            == Some(TradeDisposition::PermanentlyFailed))
        .await
    );
    tokio::time::sleep(Duration::from_secs(5)).await;
    let (store, ledger) = run.stop().await;

    let history = store.history(&TradeId::from("1")).unwrap();
    let expired: Vec<_> = history
        .iter()
        .filter(|r| r.status == ExecutionStatus::Expired)
        .collect();
    assert_eq!(expired.len(), 3);
    assert_eq!(
        expired.iter().map(|r| r.attempt).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    // one fresh signature per attempt, nothing after exhaustion
    assert_eq!(ledger.distinct_signatures().len(), 3);
    assert_eq!(store.attempts_made(&TradeId::from("1")).unwrap(), 3);
}

#[tokio::test(start_paused = true)]
async fn executing_a_settled_trade_is_a_no_op() {
    let store = Arc::new(EventStore::open_in_memory().unwrap());
    let ledger = Arc::new(FakeLedger::confirming_after(1));
    let engine = engine(ledger.clone(), store.clone(), CancellationToken::new());
    let poller = FeedPoller::new(
        Arc::new(StaticFeed(vec![record(9, "X", 10_000)])),
        store.clone(),
        TradeFilter::new("X"),
        chrono::Duration::seconds(600),
    );

    let trades = poller.poll().await.unwrap();
    assert_eq!(trades.len(), 1);
    let outcome = engine.execute(&trades[0]).await.unwrap();
    assert!(matches!(outcome, TradeOutcome::Confirmed { attempts: 1, .. }));

    assert_eq!(engine.execute(&trades[0]).await.unwrap(), TradeOutcome::Skipped);
    assert!(poller.poll().await.unwrap().is_empty());
    assert_eq!(ledger.sends(), 1);
}

#[tokio::test(start_paused = true)]
async fn full_lane_drops_the_overflow() {
    // trade 1 holds the lane for several seconds while 2..4 arrive together
    let run = launch(
        (1..=4).map(|id| record(id, "X", 10_000)).collect(),
        FakeLedger::confirming_after(40),
        1,
        4,
        Vec::new(),
    );

    assert!(
        wait_until(Duration::from_secs(30), || run.disposition("1")
            == Some(TradeDisposition::Confirmed))
        .await
    );
    tokio::time::sleep(Duration::from_secs(30)).await;
    let (store, _ledger) = run.stop().await;

    let dropped: Vec<_> = ["2", "3", "4"]
        .into_iter()
        .filter(|id| store.disposition(&TradeId::from(*id)).unwrap() == Some(TradeDisposition::Dropped))
        .collect();
    assert!(!dropped.is_empty());
    for id in dropped {
        let id = TradeId::from(id);
        assert_eq!(
            store.disposition_detail(&id).unwrap(),
            Some((TradeDisposition::Dropped, Some("lane full".to_string())))
        );
        // dropped trades are never attempted, and later polls do not revive them
        assert!(store.history(&id).unwrap().is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_the_attempt_in_flight() {
    let run = launch(
        vec![record(1, "X", 10_000), record(2, "X", 10_000)],
        FakeLedger::confirming_after(30),
        16,
        4,
        Vec::new(),
    );
    let id = TradeId::from("1");

    assert!(
        wait_until(Duration::from_secs(10), || run.store.latest_status(&id).unwrap()
            == Some(ExecutionStatus::Pending))
        .await
    );
    let (store, ledger) = run.stop().await;

    let last = store.latest_record(&id).unwrap().unwrap();
    assert!(last.status.is_terminal());
    assert_eq!(last.status, ExecutionStatus::Confirmed);
    assert!(store.pending_attempts().unwrap().is_empty());
    // the queued trade behind it is left for the next run
    assert!(store.history(&TradeId::from("2")).unwrap().is_empty());
    assert_eq!(store.disposition(&TradeId::from("2")).unwrap(), Some(TradeDisposition::Queued));
    assert_eq!(ledger.distinct_signatures().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_attempts_are_capped_across_actors() {
    let backlog = vec![
        backlog_trade("a1", "X1"),
        backlog_trade("b1", "X2"),
        backlog_trade("a2", "X1"),
        backlog_trade("b2", "X2"),
    ];
    let run = launch(Vec::new(), FakeLedger::confirming_after(5), 16, 1, backlog);

    assert!(
        wait_until(Duration::from_secs(60), || ["a1", "b1", "a2", "b2"]
            .iter()
            .all(|id| run.disposition(id) == Some(TradeDisposition::Confirmed)))
        .await
    );
    let (_store, ledger) = run.stop().await;

    assert_eq!(ledger.distinct_signatures().len(), 4);
    assert_eq!(ledger.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn deferred_trade_does_not_hold_back_the_actor() {
    // trade 1 names a mint the pool does not trade, so it can only defer
    let unroutable = serde_json::json!({
        "id": 1,
        "trader": "X",
        "in": solana_sdk::pubkey::Pubkey::new_from_array([99; 32]).to_string(),
        "out": mint_b().to_string(),
        "amount": 10_000,
    });
    let run = start(vec![unroutable, record(2, "X", 10_000)], FakeLedger::confirming_after(2));

    assert!(
        wait_until(Duration::from_secs(30), || run.disposition("2")
            == Some(TradeDisposition::Confirmed))
        .await
    );
    let (store, ledger) = run.stop().await;

    let first = TradeId::from("1");
    assert!(matches!(
        store.disposition(&first).unwrap(),
        Some(TradeDisposition::Deferred) | Some(TradeDisposition::Queued)
    ));
    assert!(store.history(&first).unwrap().is_empty());
    assert_eq!(ledger.distinct_signatures().len(), 1);
}
