use solana_sdk::{compute_budget::ComputeBudgetInstruction, instruction::Instruction};

/// Create ComputeBudget instruction to set priority fee
pub fn create_priority_fee_instruction(micro_lamports_per_cu: u64) -> Instruction {
    ComputeBudgetInstruction::set_compute_unit_price(micro_lamports_per_cu)
}

/// Create ComputeBudget instruction to set compute unit limit
pub fn create_compute_unit_limit_instruction(compute_units: u32) -> Instruction {
    ComputeBudgetInstruction::set_compute_unit_limit(compute_units)
}

/// ComputeBudget preamble for a swap transaction. A zero limit or price is left out.
pub fn create_compute_budget_instructions(
    compute_units: u32,
    micro_lamports_per_cu: u64,
) -> Vec<Instruction> {
    let mut instructions = Vec::with_capacity(2);
    if compute_units > 0 {
        instructions.push(create_compute_unit_limit_instruction(compute_units));
    }
    if micro_lamports_per_cu > 0 {
        instructions.push(create_priority_fee_instruction(micro_lamports_per_cu));
    }
    instructions
}
