//! Decoding of SPL token and Token-2022 mint/account data
//!
//! Token-2022 accounts carry the transfer-fee extension; classic SPL token
//! accounts decode through the same path with no withheld balance.

use solana_sdk::{account::Account, pubkey::Pubkey};
use spl_token_2022::extension::{
    transfer_fee::{TransferFeeAmount, TransferFeeConfig},
    BaseStateWithExtensions, StateWithExtensions,
};

use crate::{SdkError, SdkResult};

/// Decoded token account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccountInfo {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
    /// Transfer fees withheld on this account, zero without the extension
    pub withheld: u64,
}

/// Decoded mint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintInfo {
    pub supply: u64,
    pub decimals: u8,
    /// Program owning the mint, either SPL token or Token-2022
    pub token_program: Pubkey,
    /// Transfer fees already harvested to the mint
    pub withheld: u64,
}

pub fn unpack_token_account(data: &[u8]) -> SdkResult<TokenAccountInfo> {
    let state = StateWithExtensions::<spl_token_2022::state::Account>::unpack(data)
        .map_err(|e| SdkError::Deserialization(format!("token account: {}", e)))?;

    let withheld = state
        .get_extension::<TransferFeeAmount>()
        .map(|ext| u64::from(ext.withheld_amount))
        .unwrap_or(0);

    Ok(TokenAccountInfo {
        mint: state.base.mint,
        owner: state.base.owner,
        amount: state.base.amount,
        withheld,
    })
}

pub fn unpack_mint(account: &Account) -> SdkResult<MintInfo> {
    let state = StateWithExtensions::<spl_token_2022::state::Mint>::unpack(&account.data)
        .map_err(|e| SdkError::Deserialization(format!("mint: {}", e)))?;

    let withheld = state
        .get_extension::<TransferFeeConfig>()
        .map(|ext| u64::from(ext.withheld_amount))
        .unwrap_or(0);

    Ok(MintInfo {
        supply: state.base.supply,
        decimals: state.base.decimals,
        token_program: account.owner,
        withheld,
    })
}

/// Whether `program` is one of the two token programs
pub fn is_token_program(program: &Pubkey) -> bool {
    *program == spl_token::id() || *program == spl_token_2022::id()
}
