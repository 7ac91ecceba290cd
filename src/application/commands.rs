//! CLI commands and handlers
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::Path;

use crate::config::Config;
use crate::infrastructure::store::EventStore;
use crate::report::TradeReport;
use crate::shared::types::TradeId;

#[derive(Parser, Debug)]
#[command(name = "copytrade")]
#[command(version, about = "Mirror a target wallet's swaps on Solana")]
pub struct Cli {
    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Settings that take precedence over the config file and the environment.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Path to config file (optional)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// RPC endpoint URL
    #[arg(long, global = true)]
    pub rpc_url: Option<String>,

    /// Trade feed URL
    #[arg(long, global = true)]
    pub feed_url: Option<String>,

    /// Wallet whose trades are copied
    #[arg(long, global = true)]
    pub target: Option<String>,

    /// Path to keypair file
    #[arg(long, global = true)]
    pub keypair: Option<String>,

    /// SQLite event store path
    #[arg(long, global = true)]
    pub store: Option<String>,

    /// Simulate transactions instead of sending them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Log level or filter directives
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(v) = &self.rpc_url {
            config.rpc.url = v.clone();
        }
        if let Some(v) = &self.feed_url {
            config.feed.url = v.clone();
        }
        if let Some(v) = &self.target {
            config.trade.target_wallet = Some(v.clone());
        }
        if let Some(v) = &self.keypair {
            config.wallet.keypair = Some(v.clone());
        }
        if let Some(v) = &self.store {
            config.store.path = v.clone();
        }
        if self.dry_run {
            config.execution.dry_run = true;
        }
        if let Some(v) = &self.log_level {
            config.logging.level = v.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Poll the feed and copy the target's trades (default)
    Run,

    /// Show the disposition and attempt history of one trade
    Status {
        /// Trade id as reported by the feed
        trade_id: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// File, then environment, then command line.
pub fn load_config(overrides: &Overrides) -> Result<Config> {
    let mut config = match &overrides.config {
        Some(path) => Config::from_file(path).with_context(|| format!("loading {}", path))?,
        None => Config::default(),
    };
    config.apply_env(|key| std::env::var(key).ok());
    overrides.apply(&mut config);
    Ok(config)
}

/// Renders the stored history of `trade_id`; `None` when the id is unknown.
pub fn trade_status(store: &EventStore, trade_id: &str, json: bool) -> Result<Option<String>> {
    let id = TradeId::new(trade_id);
    let Some(trade) = store.trade(&id)? else {
        return Ok(None);
    };
    let (disposition, detail) = store
        .disposition_detail(&id)?
        .context("trade row vanished while reading")?;
    let report = TradeReport::new(trade, disposition, detail, store.history(&id)?);
    let rendered = if json {
        report.to_json()?
    } else {
        report.render()
    };
    Ok(Some(rendered))
}

pub fn run_status(config: &Config, trade_id: &str, json: bool) -> Result<()> {
    let store = EventStore::open(Path::new(&config.store.path))
        .with_context(|| format!("opening store {}", config.store.path))?;
    match trade_status(&store, trade_id, json)? {
        Some(report) => println!("{}", report),
        None => anyhow::bail!("trade {} is not in the store", trade_id),
    }
    Ok(())
}
