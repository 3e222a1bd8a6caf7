//! Withheld-fee reclaim
//!
//! Moves transfer fees withheld on holder accounts, and those already
//! harvested to the mint, into the authority's token account.

use reflector_sdk::{
    instructions::{withdraw_withheld_from_accounts, withdraw_withheld_from_mint},
    MintInfo, SdkResult,
};
use reflector_types::Holder;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    batch::TransactionBatch,
    config::RetryConfig,
    queue::{ExecutionQueue, ExecutionReport, TransactionSubmitter},
};

/// Accounts and authority of one reclaim pass
#[derive(Debug, Clone, Copy)]
pub struct ReclaimTarget {
    pub mint: Pubkey,
    pub token_program: Pubkey,
    /// Token account receiving the withdrawn fees
    pub destination: Pubkey,
    /// Withdraw-withheld authority of the mint
    pub authority: Pubkey,
}

/// Reclaim batches: the mint withdrawal first, then one batch per chunk of
/// `accounts_per_ix` holder accounts with a positive balance.
pub fn plan_reclaim(
    target: &ReclaimTarget,
    holders: &[Holder],
    accounts_per_ix: usize,
) -> SdkResult<Vec<TransactionBatch>> {
    let mut batches = vec![TransactionBatch::new(
        "reclaim-mint",
        vec![withdraw_withheld_from_mint(
            &target.token_program,
            &target.mint,
            &target.destination,
            &target.authority,
        )?],
    )];

    let sources: Vec<Pubkey> = holders
        .iter()
        .filter(|h| h.amount > 0 && h.address != target.destination)
        .map(|h| h.address)
        .collect();

    for chunk in sources.chunks(accounts_per_ix.max(1)) {
        batches.push(TransactionBatch::new(
            "reclaim-accounts",
            vec![withdraw_withheld_from_accounts(
                &target.token_program,
                &target.mint,
                &target.destination,
                &target.authority,
                chunk,
            )?],
        ));
    }

    Ok(batches)
}

/// Run the reclaim pass through the execution queue.
///
/// Only Token-2022 mints withhold fees; other mints return an empty report.
pub async fn reclaim_withheld(
    submitter: Arc<dyn TransactionSubmitter>,
    retry: RetryConfig,
    target: &ReclaimTarget,
    mint: &MintInfo,
    holders: &[Holder],
    accounts_per_ix: usize,
) -> SdkResult<ExecutionReport> {
    if mint.token_program != spl_token_2022::id() {
        info!("{} is not a Token-2022 mint, nothing to reclaim", target.mint);
        return Ok(ExecutionReport::default());
    }

    let batches = plan_reclaim(target, holders, accounts_per_ix)?;
    info!(
        "Reclaiming withheld fees: {} batches covering {} holders",
        batches.len(),
        holders.len()
    );

    let report = ExecutionQueue::submit_all(submitter, retry, batches).await;
    if !report.all_succeeded() {
        warn!(
            "{} reclaim batches failed, continuing with whatever was collected",
            report.failed.len()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ReclaimTarget {
        ReclaimTarget {
            mint: Pubkey::new_unique(),
            token_program: spl_token_2022::id(),
            destination: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
        }
    }

    #[test]
    fn test_mint_withdrawal_comes_first() {
        let target = target();
        let holders: Vec<Holder> = (0..45)
            .map(|i| Holder::new(Pubkey::new_unique(), i % 3, None))
            .collect();

        let batches = plan_reclaim(&target, &holders, 20).unwrap();

        // 30 funded holders: 20 + 10
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].label, "reclaim-mint");
        assert!(batches.iter().all(|b| b.len() == 1));
        // mint, destination, authority, then the sources
        assert_eq!(batches[1].instructions[0].accounts.len(), 3 + 20);
        assert_eq!(batches[2].instructions[0].accounts.len(), 3 + 10);
    }

    #[test]
    fn test_destination_is_not_a_source() {
        let target = target();
        let holders = vec![
            Holder::new(target.destination, 500, None),
            Holder::new(Pubkey::new_unique(), 1, None),
        ];

        let batches = plan_reclaim(&target, &holders, 20).unwrap();
        assert_eq!(batches.len(), 2);
        let sources: Vec<Pubkey> = batches[1].instructions[0].accounts[3..]
            .iter()
            .map(|m| m.pubkey)
            .collect();
        assert_eq!(sources, vec![holders[1].address]);
    }
}
