use solana_sdk::{
    instruction::CompiledInstruction,
    message::Message,
    pubkey::Pubkey,
};

use crate::error::Error;
use crate::rpc::Block;

const COMPUTE_BUDGET_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("ComputeBudget111111111111111111111111111111");

// ComputeBudgetInstruction discriminants (borsh enum tags)
const SET_COMPUTE_UNIT_LIMIT: u8 = 2;
const SET_COMPUTE_UNIT_PRICE: u8 = 3;

/// Set the compute unit price (micro-lamports per unit) on a compiled
/// message. An existing set-price instruction is rewritten in place,
/// otherwise one is prepended.
pub fn set_compute_unit_price(message: &mut Message, micro_lamports: u64) -> Result<(), Error> {
    set_compute_budget_instruction(message, SET_COMPUTE_UNIT_PRICE, &micro_lamports.to_le_bytes())
}

/// Set the compute unit limit on a compiled message. Same rewrite-or-prepend
/// behavior as [`set_compute_unit_price`].
pub fn set_compute_unit_limit(message: &mut Message, units: u32) -> Result<(), Error> {
    set_compute_budget_instruction(message, SET_COMPUTE_UNIT_LIMIT, &units.to_le_bytes())
}

fn set_compute_budget_instruction(
    message: &mut Message,
    tag: u8,
    payload: &[u8],
) -> Result<(), Error> {
    let program_index = match message
        .account_keys
        .iter()
        .position(|key| *key == COMPUTE_BUDGET_PROGRAM_ID)
    {
        Some(index) => index,
        None => {
            if message.account_keys.len() >= u8::MAX as usize {
                return Err(Error::InvalidTransaction(
                    "no room in account keys for compute budget program".to_string(),
                ));
            }
            // keys appended at the end land in the readonly non-signer
            // section, so no existing instruction index shifts
            message.account_keys.push(COMPUTE_BUDGET_PROGRAM_ID);
            message.header.num_readonly_unsigned_accounts += 1;
            message.account_keys.len() - 1
        }
    };

    let mut data = Vec::with_capacity(1 + payload.len());
    data.push(tag);
    data.extend_from_slice(payload);

    for ix in message.instructions.iter_mut() {
        if ix.program_id_index as usize == program_index && ix.data.first() == Some(&tag) {
            ix.data = data;
            return Ok(());
        }
    }

    message.instructions.insert(
        0,
        CompiledInstruction {
            program_id_index: program_index as u8,
            accounts: vec![],
            data,
        },
    );
    Ok(())
}

/// Per-transaction compute unit prices extracted from a block.
#[derive(Debug, Default)]
pub struct BlockFeeData {
    pub prices: Vec<u64>,
}

/// Scan a block's transactions for compute-budget set-price instructions and
/// collect the prices they carry.
pub fn parse_block(block: &Block) -> BlockFeeData {
    let mut prices = Vec::new();
    for tx in &block.transactions {
        let keys = tx.message.static_account_keys();
        for ix in tx.message.instructions() {
            let Some(program) = keys.get(ix.program_id_index as usize) else {
                continue;
            };
            if *program != COMPUTE_BUDGET_PROGRAM_ID {
                continue;
            }
            if ix.data.first() == Some(&SET_COMPUTE_UNIT_PRICE) && ix.data.len() >= 9 {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&ix.data[1..9]);
                prices.push(u64::from_le_bytes(raw));
            }
        }
    }
    BlockFeeData { prices }
}
