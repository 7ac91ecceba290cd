use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    packet::PACKET_DATA_SIZE,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_instruction,
    transaction::Transaction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use spl_token::native_mint;
use tracing::debug;

use crate::exchanges::compute_budget::create_compute_budget_instructions;
use crate::exchanges::types::SwapInstruction;
use crate::shared::errors::ExecutionError;

/// Wraps a planned swap into a signed transaction.
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    compute_unit_limit: u32,
    priority_fee_micro_lamports: u64,
}

impl TransactionBuilder {
    pub fn new(compute_unit_limit: u32, priority_fee_micro_lamports: u64) -> Self {
        Self {
            compute_unit_limit,
            priority_fee_micro_lamports,
        }
    }

    /// ComputeBudget, destination ATA, optional SOL wrap, the swap, optional unwrap.
    pub fn build_instructions(
        &self,
        swap: &SwapInstruction,
        owner: &Pubkey,
    ) -> Result<Vec<Instruction>, ExecutionError> {
        let token_program = spl_token::id();
        let mut instructions =
            create_compute_budget_instructions(self.compute_unit_limit, self.priority_fee_micro_lamports);

        instructions.push(create_associated_token_account_idempotent(
            owner,
            owner,
            &swap.output_mint(),
            &token_program,
        ));

        let input_is_native = swap.input_mint() == native_mint::id();
        let output_is_native = swap.output_mint() == native_mint::id();

        if input_is_native {
            let wsol = get_associated_token_address(owner, &native_mint::id());
            instructions.push(create_associated_token_account_idempotent(
                owner,
                owner,
                &native_mint::id(),
                &token_program,
            ));
            instructions.push(system_instruction::transfer(owner, &wsol, swap.amount_in()));
            instructions.push(
                spl_token::instruction::sync_native(&token_program, &wsol)
                    .map_err(|e| ExecutionError::Build(format!("sync_native: {}", e)))?,
            );
        }

        instructions.push(swap.to_instruction());

        if input_is_native || output_is_native {
            let wsol = get_associated_token_address(owner, &native_mint::id());
            instructions.push(
                spl_token::instruction::close_account(&token_program, &wsol, owner, owner, &[])
                    .map_err(|e| ExecutionError::Build(format!("close_account: {}", e)))?,
            );
        }

        Ok(instructions)
    }

    pub fn build_signed(
        &self,
        swap: &SwapInstruction,
        payer: &Keypair,
        recent_blockhash: Hash,
    ) -> Result<Transaction, ExecutionError> {
        let instructions = self.build_instructions(swap, &payer.pubkey())?;
        let transaction = Transaction::new_signed_with_payer(
            &instructions,
            Some(&payer.pubkey()),
            &[payer],
            recent_blockhash,
        );
        Self::validate_transaction(&transaction)?;
        debug!(
            trade_id = %swap.trade_id(),
            instructions = instructions.len(),
            "Built swap transaction"
        );
        Ok(transaction)
    }

    /// Validate transaction before execution
    pub fn validate_transaction(transaction: &Transaction) -> Result<(), ExecutionError> {
        if transaction.message.instructions.is_empty() {
            return Err(ExecutionError::Build("Transaction has no instructions".to_string()));
        }

        let size = bincode::serialize(transaction)
            .map_err(|e| ExecutionError::Build(format!("serialize: {}", e)))?
            .len();
        if size > PACKET_DATA_SIZE {
            return Err(ExecutionError::Build(format!(
                "Transaction too large: {} bytes (limit {})",
                size, PACKET_DATA_SIZE
            )));
        }
        Ok(())
    }
}
