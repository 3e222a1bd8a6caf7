/// Token-swap program instruction builders
use borsh::{BorshDeserialize, BorshSerialize};
use reflector_types::Pool;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use crate::{SdkError, SdkResult};

/// Instruction tag of an exact-in swap
pub const SWAP_TAG: u8 = 1;

/// Wire data of an exact-in swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SwapData {
    pub tag: u8,
    pub amount_in: u64,
    pub minimum_amount_out: u64,
}

/// Pool authority PDA
pub fn pool_authority(pool: &Pubkey, swap_program: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[pool.as_ref()], swap_program).0
}

/// Accounts for one exact-in swap through a pool
#[derive(Debug, Clone)]
pub struct SwapAccounts {
    pub user: Pubkey,
    pub user_source: Pubkey,
    pub user_destination: Pubkey,
    pub source_mint: Pubkey,
    pub destination_mint: Pubkey,
    pub source_token_program: Pubkey,
    pub destination_token_program: Pubkey,
}

/// Build an exact-in swap of `amount_in` through `pool`, out of
/// `accounts.source_mint`.
pub fn swap_exact_in(
    swap_program: &Pubkey,
    pool: &Pool,
    accounts: &SwapAccounts,
    amount_in: u64,
    minimum_amount_out: u64,
) -> SdkResult<Instruction> {
    let (pool_source, pool_destination) =
        pool.swap_accounts(&accounts.source_mint).ok_or_else(|| {
            SdkError::InvalidParameters(format!(
                "pool {} does not trade {}",
                pool.pool_address, accounts.source_mint
            ))
        })?;

    let data = SwapData {
        tag: SWAP_TAG,
        amount_in,
        minimum_amount_out,
    }
    .try_to_vec()
    .map_err(|e| SdkError::Serialization(e.to_string()))?;

    let authority = pool_authority(&pool.pool_address, swap_program);

    Ok(Instruction {
        program_id: *swap_program,
        accounts: vec![
            AccountMeta::new_readonly(pool.pool_address, false),
            AccountMeta::new_readonly(authority, false),
            AccountMeta::new_readonly(accounts.user, true),
            AccountMeta::new(accounts.user_source, false),
            AccountMeta::new(pool_source, false),
            AccountMeta::new(pool_destination, false),
            AccountMeta::new(accounts.user_destination, false),
            AccountMeta::new(pool.lp_mint, false),
            AccountMeta::new(pool.fee_account, false),
            AccountMeta::new_readonly(accounts.source_mint, false),
            AccountMeta::new_readonly(accounts.destination_mint, false),
            AccountMeta::new_readonly(accounts.source_token_program, false),
            AccountMeta::new_readonly(accounts.destination_token_program, false),
            AccountMeta::new_readonly(pool.pool_token_program, false),
            // Host fee goes back to the pool's own fee account
            AccountMeta::new(pool.fee_account, false),
        ],
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Pool {
        Pool {
            pool_address: Pubkey::new_unique(),
            token_account_a: Pubkey::new_unique(),
            token_account_b: Pubkey::new_unique(),
            lp_mint: Pubkey::new_unique(),
            fee_account: Pubkey::new_unique(),
            mint_a: Pubkey::new_unique(),
            mint_b: Pubkey::new_unique(),
            pool_token_program: spl_token_2022::id(),
        }
    }

    #[test]
    fn test_swap_instruction_layout() {
        let pool = pool();
        let program = Pubkey::new_unique();
        let accounts = SwapAccounts {
            user: Pubkey::new_unique(),
            user_source: Pubkey::new_unique(),
            user_destination: Pubkey::new_unique(),
            source_mint: pool.mint_b,
            destination_mint: pool.mint_a,
            source_token_program: spl_token::id(),
            destination_token_program: spl_token_2022::id(),
        };

        let ix = swap_exact_in(&program, &pool, &accounts, 1_000, 990).unwrap();
        assert_eq!(ix.data.len(), 17);
        assert_eq!(ix.data[0], SWAP_TAG);
        assert_eq!(&ix.data[1..9], &1_000u64.to_le_bytes());
        assert_eq!(&ix.data[9..17], &990u64.to_le_bytes());

        // b -> a swaps take from side b and pay out of side a
        assert_eq!(ix.accounts[4].pubkey, pool.token_account_b);
        assert_eq!(ix.accounts[5].pubkey, pool.token_account_a);
        assert!(ix.accounts[2].is_signer);
        assert_eq!(ix.accounts.len(), 15);
    }

    #[test]
    fn test_swap_rejects_foreign_mint() {
        let pool = pool();
        let accounts = SwapAccounts {
            user: Pubkey::new_unique(),
            user_source: Pubkey::new_unique(),
            user_destination: Pubkey::new_unique(),
            source_mint: Pubkey::new_unique(),
            destination_mint: pool.mint_a,
            source_token_program: spl_token::id(),
            destination_token_program: spl_token::id(),
        };
        assert!(swap_exact_in(&Pubkey::new_unique(), &pool, &accounts, 1, 0).is_err());
    }
}
