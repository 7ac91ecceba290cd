mod common;

use chrono::Utc;
use common::*;
use copytrade::domain::execution::{recover, ExecutionRecord, ExecutionStatus, TradeOutcome};
use copytrade::domain::trade::{Trade, TradeDisposition};
use copytrade::infrastructure::EventStore;
use copytrade::shared::types::TradeId;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn trade(id: &str) -> Trade {
    Trade {
        id: TradeId::from(id),
        actor: "X".to_string(),
        input_mint: mint_a(),
        output_mint: mint_b(),
        amount_in: 10_000,
        observed_at: Utc::now(),
        pool: None,
    }
}

#[tokio::test(start_paused = true)]
async fn pending_attempt_left_on_disk_is_resolved_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("copytrade.db");
    let signature = Signature::new_unique();

    {
        // The previous process wrote its attempt, claimed the trade and died.
        let store = EventStore::open(&path).unwrap();
        let t = trade("1");
        store.record_seen(&t).unwrap();
        store.record_seen(&trade("2")).unwrap();
        assert!(store.claim(&t.id).unwrap());
        store
            .append_execution(&ExecutionRecord::pending(
                t.id.clone(),
                1,
                "00".repeat(32),
                &signature,
                LAST_VALID_HEIGHT,
            ))
            .unwrap();
    }

    let store = Arc::new(EventStore::open(&path).unwrap());
    let ledger = Arc::new(FakeLedger::confirming_after(1));
    let engine = engine(ledger.clone(), store.clone(), CancellationToken::new());

    let report = recover(&engine).await.unwrap();

    assert_eq!(report.released_claims, 1);
    assert_eq!(report.resumed.len(), 1);
    assert_eq!(
        report.resumed[0],
        (
            TradeId::from("1"),
            TradeOutcome::Confirmed {
                signature: signature.to_string(),
                attempts: 1,
            }
        )
    );
    assert_eq!(
        report.requeued.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
        vec!["2"]
    );
    // nothing was re-signed or re-sent
    assert_eq!(ledger.sends(), 0);
    assert_eq!(
        store.latest_status(&TradeId::from("1")).unwrap(),
        Some(ExecutionStatus::Confirmed)
    );
    assert_eq!(
        store.disposition(&TradeId::from("1")).unwrap(),
        Some(TradeDisposition::Confirmed)
    );

    // a second restart finds nothing left to resume
    let again = recover(&engine).await.unwrap();
    assert!(again.resumed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn expired_pending_attempt_is_retried_with_a_new_signature() {
    let store = Arc::new(EventStore::open_in_memory().unwrap());
    let t = trade("1");
    store.record_seen(&t).unwrap();
    let stale = Signature::new_unique();
    store
        .append_execution(&ExecutionRecord::pending(
            t.id.clone(),
            1,
            "00".repeat(32),
            &stale,
            LAST_VALID_HEIGHT,
        ))
        .unwrap();

    let ledger = Arc::new(FakeLedger::always_expiring());
    let engine = engine(ledger.clone(), store.clone(), CancellationToken::new());
    let report = recover(&engine).await.unwrap();

    assert_eq!(
        report.resumed[0].1,
        TradeOutcome::PermanentlyFailed { attempts: 3 }
    );
    let history = store.history(&t.id).unwrap();
    let expired: Vec<u32> = history
        .iter()
        .filter(|r| r.status == ExecutionStatus::Expired)
        .map(|r| r.attempt)
        .collect();
    assert_eq!(expired, vec![1, 2, 3]);
    assert_eq!(ledger.distinct_signatures().len(), 2);
    assert!(!ledger.distinct_signatures().contains(&stale));
}

#[tokio::test(start_paused = true)]
async fn attempt_settled_while_down_is_found_in_history() {
    let store = Arc::new(EventStore::open_in_memory().unwrap());
    let t = trade("1");
    store.record_seen(&t).unwrap();
    let settled = Signature::new_unique();
    let mut pending = ExecutionRecord::pending(t.id.clone(), 1, "00".repeat(32), &settled, LAST_VALID_HEIGHT);
    // the process was down far longer than the attempt timeout
    pending.submitted_at = Utc::now() - chrono::Duration::hours(6);
    store.append_execution(&pending).unwrap();

    // the chain is past the blockhash, and recent-status lookups no longer know it
    let ledger = Arc::new(FakeLedger::always_expiring().with_archived(settled));
    let engine = engine(ledger.clone(), store.clone(), CancellationToken::new());
    let report = recover(&engine).await.unwrap();

    assert_eq!(
        report.resumed[0].1,
        TradeOutcome::Confirmed {
            signature: settled.to_string(),
            attempts: 1,
        }
    );
    assert!(ledger.history_lookups() >= 1);
    assert_eq!(ledger.sends(), 0);
    assert!(ledger.distinct_signatures().is_empty());
    assert_eq!(store.attempts_made(&t.id).unwrap(), 1);
    assert_eq!(store.disposition(&t.id).unwrap(), Some(TradeDisposition::Confirmed));
}
