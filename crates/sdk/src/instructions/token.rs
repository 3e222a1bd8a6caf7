/// Token instruction builders: transfers, burns, withheld fee withdrawal,
/// associated accounts and native SOL wrapping
use solana_sdk::{instruction::Instruction, pubkey::Pubkey, system_instruction};
use spl_associated_token_account::{
    get_associated_token_address_with_program_id,
    instruction::create_associated_token_account_idempotent,
};
use spl_token_2022::extension::transfer_fee::instruction as transfer_fee;

use crate::SdkResult;

/// Associated token account of `wallet` for `mint` under `token_program`
pub fn associated_token_address(wallet: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    get_associated_token_address_with_program_id(wallet, mint, token_program)
}

/// Create `wallet`'s associated token account unless it already exists
pub fn create_ata_idempotent(
    payer: &Pubkey,
    wallet: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
) -> Instruction {
    create_associated_token_account_idempotent(payer, wallet, mint, token_program)
}

#[allow(clippy::too_many_arguments)]
pub fn transfer_checked(
    token_program: &Pubkey,
    source: &Pubkey,
    mint: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    amount: u64,
    decimals: u8,
) -> SdkResult<Instruction> {
    Ok(spl_token_2022::instruction::transfer_checked(
        token_program,
        source,
        mint,
        destination,
        authority,
        &[],
        amount,
        decimals,
    )?)
}

pub fn burn_checked(
    token_program: &Pubkey,
    account: &Pubkey,
    mint: &Pubkey,
    authority: &Pubkey,
    amount: u64,
    decimals: u8,
) -> SdkResult<Instruction> {
    Ok(spl_token_2022::instruction::burn_checked(
        token_program,
        account,
        mint,
        authority,
        &[],
        amount,
        decimals,
    )?)
}

/// Move fees harvested into the mint to `destination`
pub fn withdraw_withheld_from_mint(
    token_program: &Pubkey,
    mint: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
) -> SdkResult<Instruction> {
    Ok(transfer_fee::withdraw_withheld_tokens_from_mint(
        token_program,
        mint,
        destination,
        authority,
        &[],
    )?)
}

/// Move fees withheld on `sources` to `destination`
pub fn withdraw_withheld_from_accounts(
    token_program: &Pubkey,
    mint: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    sources: &[Pubkey],
) -> SdkResult<Instruction> {
    let sources: Vec<&Pubkey> = sources.iter().collect();
    Ok(transfer_fee::withdraw_withheld_tokens_from_accounts(
        token_program,
        mint,
        destination,
        authority,
        &[],
        &sources,
    )?)
}

/// Fund `owner`'s WSOL account with `lamports` and sync its token balance.
///
/// The account is created first when `create` is set.
pub fn wrap_sol(owner: &Pubkey, lamports: u64, create: bool) -> SdkResult<Vec<Instruction>> {
    let wsol = spl_token::native_mint::id();
    let ata = associated_token_address(owner, &wsol, &spl_token::id());

    let mut instructions = Vec::with_capacity(3);
    if create {
        instructions.push(create_ata_idempotent(owner, owner, &wsol, &spl_token::id()));
    }
    instructions.push(system_instruction::transfer(owner, &ata, lamports));
    instructions.push(spl_token::instruction::sync_native(&spl_token::id(), &ata)?);
    Ok(instructions)
}

/// Close `owner`'s WSOL account, returning lamports and rent to `owner`
pub fn unwrap_sol(owner: &Pubkey) -> SdkResult<Instruction> {
    let ata = associated_token_address(owner, &spl_token::native_mint::id(), &spl_token::id());
    Ok(spl_token::instruction::close_account(
        &spl_token::id(),
        &ata,
        owner,
        owner,
        &[],
    )?)
}

pub fn transfer_lamports(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    system_instruction::transfer(from, to, lamports)
}
