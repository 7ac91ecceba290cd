//! Solana JSON-RPC transport for the ledger and account reads

use async_trait::async_trait;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_client::rpc_request::{RpcError, RpcResponseErrorData};
use solana_sdk::{
    account::Account, commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey,
    signature::Signature, transaction::Transaction,
};
use solana_transaction_status::TransactionStatus;
use std::time::Duration;
use tracing::debug;

use crate::domain::execution::{Ledger, ReceiptStatus};
use crate::exchanges::AccountReader;
use crate::shared::errors::LedgerError;

/// Pool reads and the tip slot share one commitment so their slots compare.
fn read_commitment() -> CommitmentConfig {
    CommitmentConfig::confirmed()
}

/// Nonblocking RPC client wrapper
pub struct SolanaRpc {
    client: RpcClient,
    confirm_commitment: CommitmentConfig,
    preflight_commitment: CommitmentConfig,
    skip_preflight: bool,
}

impl SolanaRpc {
    pub fn new(
        rpc_url: String,
        timeout: Duration,
        confirm_commitment: CommitmentConfig,
        preflight_commitment: CommitmentConfig,
        skip_preflight: bool,
    ) -> Self {
        Self {
            client: RpcClient::new_with_timeout_and_commitment(rpc_url, timeout, confirm_commitment),
            confirm_commitment,
            preflight_commitment,
            skip_preflight,
        }
    }

    pub fn url(&self) -> String {
        self.client.url()
    }

    /// Startup reachability check.
    pub async fn check_health(&self) -> Result<u64, LedgerError> {
        self.client
            .get_slot_with_commitment(read_commitment())
            .await
            .map_err(classify)
    }
}

#[async_trait]
impl Ledger for SolanaRpc {
    async fn latest_blockhash(&self) -> Result<(Hash, u64), LedgerError> {
        self.client
            .get_latest_blockhash_with_commitment(self.confirm_commitment)
            .await
            .map_err(classify)
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, LedgerError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: self.skip_preflight,
            preflight_commitment: Some(self.preflight_commitment.commitment),
            // resends are driven by the engine
            max_retries: Some(0),
            ..RpcSendTransactionConfig::default()
        };
        self.client
            .send_transaction_with_config(transaction, config)
            .await
            .map_err(classify)
    }

    async fn simulate_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Option<String>, LedgerError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: true,
            commitment: Some(self.preflight_commitment),
            ..RpcSimulateTransactionConfig::default()
        };
        let response = self
            .client
            .simulate_transaction_with_config(transaction, config)
            .await
            .map_err(classify)?;
        let result = response.value;
        if let Some(logs) = &result.logs {
            debug!(units = ?result.units_consumed, lines = logs.len(), "Simulation finished");
        }
        Ok(result.err.map(|e| e.to_string()))
    }

    async fn signature_status(
        &self,
        signature: &Signature,
        search_history: bool,
    ) -> Result<ReceiptStatus, LedgerError> {
        let signatures = [*signature];
        let response = if search_history {
            self.client.get_signature_statuses_with_history(&signatures).await
        } else {
            self.client.get_signature_statuses(&signatures).await
        }
        .map_err(classify)?;
        Ok(match response.value.into_iter().next().flatten() {
            Some(status) => receipt_from_status(&status, self.confirm_commitment),
            None => ReceiptStatus::Unknown,
        })
    }

    async fn block_height(&self) -> Result<u64, LedgerError> {
        self.client
            .get_block_height_with_commitment(self.confirm_commitment)
            .await
            .map_err(classify)
    }

    async fn slot(&self) -> Result<u64, LedgerError> {
        self.client
            .get_slot_with_commitment(read_commitment())
            .await
            .map_err(classify)
    }
}

#[async_trait]
impl AccountReader for SolanaRpc {
    async fn get_accounts(&self, keys: &[Pubkey]) -> Result<(u64, Vec<Option<Account>>), LedgerError> {
        let response = self
            .client
            .get_multiple_accounts_with_commitment(keys, read_commitment())
            .await
            .map_err(classify)?;
        Ok((response.context.slot, response.value))
    }
}

/// Maps an on-ledger status to a receipt at the required commitment.
pub fn receipt_from_status(status: &TransactionStatus, commitment: CommitmentConfig) -> ReceiptStatus {
    if let Some(err) = &status.err {
        return ReceiptStatus::Failed(err.to_string());
    }
    if status.satisfies_commitment(commitment) {
        ReceiptStatus::Confirmed
    } else {
        ReceiptStatus::Processing
    }
}

/// Preflight and transaction errors are rejections; everything else is
/// treated as transport trouble and may be retried.
fn classify(error: ClientError) -> LedgerError {
    match error.kind() {
        ClientErrorKind::RpcError(RpcError::RpcResponseError {
            message,
            data: RpcResponseErrorData::SendTransactionPreflightFailure(_),
            ..
        }) => LedgerError::Rejected(message.clone()),
        ClientErrorKind::TransactionError(e) => LedgerError::Rejected(e.to_string()),
        ClientErrorKind::SigningError(e) => LedgerError::Rejected(e.to_string()),
        _ => LedgerError::Transport(error.to_string()),
    }
}
