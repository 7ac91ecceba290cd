// src/app.rs
use anyhow::{Context, Result};
use solana_sdk::signature::Signer;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::pipeline::{Pipeline, PipelineConfig};
use crate::config::Config;
use crate::domain::execution::{recover, EngineConfig, ExecutionEngine};
use crate::domain::planner::{PlannerConfig, SwapPlanner};
use crate::domain::trade::TradeFilter;
use crate::exchanges::raydium_v4::adapter::RaydiumV4Adapter;
use crate::exchanges::transaction_builder::TransactionBuilder;
use crate::feed::{FeedPoller, HttpTradeSource};
use crate::infrastructure::{EventStore, SolanaRpc};
use crate::shared::retry::retry_async;
use crate::shared::utils::short_pubkey;

const HEALTH_CHECK_ATTEMPTS: usize = 3;

/// Builds every component from `config` and runs until Ctrl+C. Errors
/// returned here are startup failures.
pub async fn run(config: Config) -> Result<()> {
    config.validate().context("invalid configuration")?;
    let target = config.target_wallet()?;
    let payer = Arc::new(
        config
            .load_keypair(|key| std::env::var(key).ok())
            .context("loading signing key")?,
    );

    let store = Arc::new(
        EventStore::open(Path::new(&config.store.path))
            .with_context(|| format!("opening store {}", config.store.path))?,
    );

    let rpc = Arc::new(SolanaRpc::new(
        config.rpc.url.clone(),
        Duration::from_millis(config.rpc.timeout_ms),
        config.confirm_commitment()?,
        config.preflight_commitment()?,
        config.rpc.skip_preflight,
    ));
    let slot = retry_async(
        |attempt| {
            let rpc = rpc.clone();
            async move {
                rpc.check_health().await.map_err(|e| {
                    warn!(attempt, error = %e, "RPC health check failed");
                    e
                })
            }
        },
        HEALTH_CHECK_ATTEMPTS,
        Duration::from_millis(500),
    )
    .await
    .with_context(|| format!("RPC {} unreachable", rpc.url()))?;

    info!(
        wallet = %short_pubkey(&payer.pubkey()),
        target = %target,
        rpc = %rpc.url(),
        feed = %config.feed.url,
        slot,
        dry_run = config.execution.dry_run,
        "Starting copytrade"
    );

    let pools = Arc::new(RaydiumV4Adapter::new(rpc.clone(), config.raydium_program()?));
    let planner = SwapPlanner::new(PlannerConfig {
        owner: payer.pubkey(),
        slippage_bps: config.trade.slippage_bps,
        max_price_impact_bps: config.trade.max_price_impact_bps,
        max_pool_age_slots: config.trade.max_pool_age_slots,
        copy_ratio_bps: config.trade.copy_ratio_bps,
        max_amount_in: config.trade.max_amount_in,
    });
    let builder = TransactionBuilder::new(
        config.execution.compute_unit_limit,
        config.execution.priority_fee_microlamports,
    );
    let engine_config = EngineConfig {
        max_attempts: config.execution.max_attempts,
        attempt_timeout: Duration::from_millis(config.execution.attempt_timeout_ms),
        confirm_poll_interval: Duration::from_millis(config.execution.confirm_poll_interval_ms),
        resend_interval: Duration::from_millis(config.execution.resend_interval_ms),
        dry_run: config.execution.dry_run,
        default_pool: config.default_pool()?,
    };

    let shutdown = CancellationToken::new();
    let engine = Arc::new(ExecutionEngine::new(
        rpc.clone(),
        pools,
        store.clone(),
        planner,
        builder,
        payer,
        engine_config,
        shutdown.clone(),
    ));

    let report = recover(&engine).await.context("recovering previous run")?;
    info!(
        released = report.released_claims,
        resumed = report.resumed.len(),
        requeued = report.requeued.len(),
        "Recovery finished"
    );

    let source = Arc::new(
        HttpTradeSource::new(
            config.feed.url.clone(),
            Duration::from_millis(config.feed.timeout_ms),
        )
        .context("building feed client")?,
    );
    let poller = Arc::new(FeedPoller::new(
        source,
        store,
        TradeFilter::new(target),
        chrono::Duration::seconds(config.trade.max_trade_age_secs as i64),
    ));
    let pipeline = Pipeline::new(
        poller,
        engine,
        PipelineConfig {
            poll_interval: config.poll_interval(),
            backoff_max: Duration::from_millis(config.feed.backoff_max_ms),
            queue_capacity: config.execution.queue_capacity,
            max_concurrent_attempts: config.execution.max_concurrent_attempts,
        },
        shutdown.clone(),
    );

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, shutting down");
                signal_token.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    pipeline.run(report.requeued).await
}
