use serde::Deserialize;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
    signature::{read_keypair_file, Keypair},
};
use std::str::FromStr;
use std::time::Duration;
use std::{fs, path::Path};

use crate::exchanges::raydium_v4::RAYDIUM_V4_PROGRAM_ID;
use crate::shared::errors::ConfigError;
use crate::shared::utils::parse_commitment;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcCfg {
    pub url: String,
    pub timeout_ms: u64,
    /// Commitment an attempt must reach to count as confirmed.
    pub confirm_commitment: String,
    pub preflight_commitment: String,
    pub skip_preflight: bool,
}

impl Default for RpcCfg {
    fn default() -> Self {
        Self {
            url: "https://api.mainnet-beta.solana.com".to_string(),
            timeout_ms: 10_000,
            confirm_commitment: "finalized".to_string(),
            preflight_commitment: "confirmed".to_string(),
            skip_preflight: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WalletCfg {
    /// Keypair file; `PRIVATE_KEY` in the environment takes precedence.
    pub keypair: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedCfg {
    pub url: String,
    pub poll_interval_ms: u64,
    pub min_poll_interval_ms: u64,
    pub timeout_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for FeedCfg {
    fn default() -> Self {
        Self {
            url: "https://api.pump.fun/recent-trades".to_string(),
            poll_interval_ms: 5_000,
            min_poll_interval_ms: 1_000,
            timeout_ms: 10_000,
            backoff_max_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradeCfg {
    pub target_wallet: Option<String>,
    /// Pool used for trades whose feed record names none.
    pub default_pool: Option<String>,
    pub slippage_bps: u32,
    pub max_price_impact_bps: Option<u32>,
    pub copy_ratio_bps: u32,
    pub max_amount_in: Option<u64>,
    pub max_pool_age_slots: u64,
    pub max_trade_age_secs: u64,
}

impl Default for TradeCfg {
    fn default() -> Self {
        Self {
            target_wallet: None,
            default_pool: None,
            slippage_bps: 100,
            max_price_impact_bps: None,
            copy_ratio_bps: 10_000,
            max_amount_in: None,
            max_pool_age_slots: 150,
            max_trade_age_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionCfg {
    pub max_attempts: u32,
    pub attempt_timeout_ms: u64,
    pub confirm_poll_interval_ms: u64,
    pub resend_interval_ms: u64,
    pub max_concurrent_attempts: usize,
    pub queue_capacity: usize,
    pub compute_unit_limit: u32,
    pub priority_fee_microlamports: u64,
    pub dry_run: bool,
}

impl Default for ExecutionCfg {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout_ms: 90_000,
            confirm_poll_interval_ms: 2_000,
            resend_interval_ms: 2_000,
            max_concurrent_attempts: 4,
            queue_capacity: 64,
            compute_unit_limit: 200_000,
            priority_fee_microlamports: 1_000,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProgramsCfg {
    pub raydium_v4: String,
}

impl Default for ProgramsCfg {
    fn default() -> Self {
        Self {
            raydium_v4: RAYDIUM_V4_PROGRAM_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreCfg {
    pub path: String,
}

impl Default for StoreCfg {
    fn default() -> Self {
        Self {
            path: "data/copytrade.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingCfg {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingCfg {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rpc: RpcCfg,
    pub wallet: WalletCfg,
    pub feed: FeedCfg,
    pub trade: TradeCfg,
    pub execution: ExecutionCfg,
    pub programs: ProgramsCfg,
    pub store: StoreCfg,
    pub logging: LoggingCfg,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&s)
    }

    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Overlays environment settings. `get` is the variable lookup, normally
    /// `std::env::var(..).ok()`.
    pub fn apply_env<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(v) = get("TARGET_WALLET") {
            self.trade.target_wallet = Some(v);
        }
        if let Some(v) = get("RPC_URL") {
            self.rpc.url = v;
        }
        if let Some(v) = get("FEED_URL") {
            self.feed.url = v;
        }
        if let Some(v) = get("KEYPAIR_PATH") {
            self.wallet.keypair = Some(v);
        }
        if let Some(v) = get("DEFAULT_POOL") {
            self.trade.default_pool = Some(v);
        }
        if let Some(v) = get("STORE_PATH") {
            self.store.path = v;
        }
    }

    /// Checks everything that can be checked without network access.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.target_wallet()?;
        self.default_pool()?;
        self.raydium_program()?;
        self.confirm_commitment()?;
        self.preflight_commitment()?;
        if self.execution.max_attempts == 0 {
            return Err(invalid("execution.max_attempts", "must be at least 1"));
        }
        if self.execution.max_concurrent_attempts == 0 {
            return Err(invalid("execution.max_concurrent_attempts", "must be at least 1"));
        }
        if self.execution.queue_capacity == 0 {
            return Err(invalid("execution.queue_capacity", "must be at least 1"));
        }
        if self.trade.slippage_bps > 10_000 {
            return Err(invalid("trade.slippage_bps", "must not exceed 10000"));
        }
        if self.trade.copy_ratio_bps == 0 {
            return Err(invalid("trade.copy_ratio_bps", "must be positive"));
        }
        if self.feed.min_poll_interval_ms == 0 {
            return Err(invalid("feed.min_poll_interval_ms", "must be positive"));
        }
        Ok(())
    }

    /// The actor whose trades are copied. Must be a valid address.
    pub fn target_wallet(&self) -> Result<String, ConfigError> {
        let target = self
            .trade
            .target_wallet
            .clone()
            .ok_or(ConfigError::Missing("TARGET_WALLET"))?;
        Pubkey::from_str(&target).map_err(|e| invalid("trade.target_wallet", e))?;
        Ok(target)
    }

    pub fn default_pool(&self) -> Result<Option<Pubkey>, ConfigError> {
        self.trade
            .default_pool
            .as_deref()
            .map(|p| Pubkey::from_str(p).map_err(|e| invalid("trade.default_pool", e)))
            .transpose()
    }

    pub fn raydium_program(&self) -> Result<Pubkey, ConfigError> {
        Pubkey::from_str(&self.programs.raydium_v4).map_err(|e| invalid("programs.raydium_v4", e))
    }

    pub fn confirm_commitment(&self) -> Result<CommitmentConfig, ConfigError> {
        parse_commitment(&self.rpc.confirm_commitment)
            .ok_or_else(|| invalid("rpc.confirm_commitment", &self.rpc.confirm_commitment))
    }

    pub fn preflight_commitment(&self) -> Result<CommitmentConfig, ConfigError> {
        parse_commitment(&self.rpc.preflight_commitment)
            .ok_or_else(|| invalid("rpc.preflight_commitment", &self.rpc.preflight_commitment))
    }

    /// Configured interval, clamped to the minimum.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.feed.poll_interval_ms.max(self.feed.min_poll_interval_ms))
    }

    /// Signing key: `PRIVATE_KEY` (JSON byte array) first, then the keypair file.
    pub fn load_keypair<F>(&self, get: F) -> Result<Keypair, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = get("PRIVATE_KEY").filter(|v| !v.trim().is_empty()) {
            let bytes: Vec<u8> = serde_json::from_str(secret.trim())
                .map_err(|_| invalid("PRIVATE_KEY", "expected a JSON array of bytes"))?;
            return Keypair::from_bytes(&bytes).map_err(|e| invalid("PRIVATE_KEY", e));
        }
        match &self.wallet.keypair {
            Some(path) => read_keypair_file(path).map_err(|e| invalid("wallet.keypair", e)),
            None => Err(ConfigError::Missing("PRIVATE_KEY")),
        }
    }
}

fn invalid(key: &'static str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
}
