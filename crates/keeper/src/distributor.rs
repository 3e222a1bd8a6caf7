//! Distribution run
//!
//! Sequences one run: reclaim withheld fees, split the collected balance, pay
//! the DAO and developer shares, buy and burn, then reflect the rest to
//! holders. A failing stage is logged and skipped; the disbursement file is
//! written whatever happens.

use reflector_sdk::{
    instructions::{
        associated_token_address, burn_checked, create_ata_idempotent, transfer_checked,
        transfer_lamports,
    },
    HolderDirectory, Ledger, MintInfo, SwapAggregator,
};
use reflector_types::{total_amount, DisbursementRecord, Holder, RecipientKind, WSOL_MINT};
use solana_sdk::pubkey::Pubkey;
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, info, warn};

use crate::{
    allocation::{allocate, rate_per_token, without_excluded},
    batch::{BatchBuilder, PlannedInstruction, TransactionBatch},
    config::DistributorConfig,
    error::{KeeperError, KeeperResult},
    fees::FeeSplit,
    pools::{PoolResolver, ResolvedPools},
    queue::{ExecutionQueue, ExecutionReport, TransactionSubmitter},
    reclaim::{reclaim_withheld, ReclaimTarget},
    report::{write_disbursements, RunSummary},
    swap::SwapAdapter,
};

pub struct Distributor {
    config: DistributorConfig,
    ledger: Arc<dyn Ledger>,
    directory: Arc<dyn HolderDirectory>,
    submitter: Arc<dyn TransactionSubmitter>,
    swaps: SwapAdapter,
    authority: Pubkey,
}

impl Distributor {
    pub fn new(
        config: DistributorConfig,
        ledger: Arc<dyn Ledger>,
        directory: Arc<dyn HolderDirectory>,
        aggregator: Arc<dyn SwapAggregator>,
        submitter: Arc<dyn TransactionSubmitter>,
        authority: Pubkey,
    ) -> Self {
        let swaps = SwapAdapter::new(
            ledger.clone(),
            aggregator,
            submitter.clone(),
            authority,
            config.swap_program_id,
            config.swap.clone(),
        );
        Self {
            config,
            ledger,
            directory,
            submitter,
            swaps,
            authority,
        }
    }

    pub fn config(&self) -> &DistributorConfig {
        &self.config
    }

    /// Run every stage once and write the disbursement file
    pub async fn run(&self) -> KeeperResult<RunSummary> {
        let mut summary = RunSummary::new(self.config.output_path.clone());
        let mut records = Vec::new();

        let result = self.distribute(&mut summary, &mut records).await;

        write_disbursements(&self.config.output_path, &records)?;
        summary.finish();
        summary.log();

        result.map(|_| summary)
    }

    async fn distribute(
        &self,
        summary: &mut RunSummary,
        records: &mut Vec<DisbursementRecord>,
    ) -> KeeperResult<()> {
        let mint = self.config.token_mint;
        let mint_info = self.ledger.mint(&mint).await?;

        let holders = self.directory.holders(&mint).await?;
        if holders.is_empty() {
            return Err(KeeperError::EmptyHolderSet(mint.to_string()));
        }
        info!("{} holders of {}", holders.len(), mint);

        let source = associated_token_address(&self.authority, &mint, &mint_info.token_program);

        if mint_info.token_program == spl_token_2022::id() {
            let target = ReclaimTarget {
                mint,
                token_program: mint_info.token_program,
                destination: source,
                authority: self.authority,
            };
            match reclaim_withheld(
                self.submitter.clone(),
                self.config.retry.clone(),
                &target,
                &mint_info,
                &holders,
                self.config.batch.reclaim_accounts_per_ix,
            )
            .await
            {
                Ok(report) => summary.record_execution("reclaim", &report),
                Err(e) => summary.record_failed("reclaim", e.to_string()),
            }
        } else {
            summary.record_skipped("reclaim", "mint does not withhold transfer fees");
        }

        let balance = self.ledger.token_balance(&source).await?.unwrap_or(0);
        summary.collected = balance;
        if balance == 0 {
            summary.record_skipped("distribution", format!("nothing collected in {}", source));
            return Ok(());
        }

        let split = FeeSplit::compute(balance, &self.config.fees);
        summary.dust = split.dust;

        let treasury = self.pay_treasury(&mint, &mint_info, &source, &split).await?;
        summary.record_execution("treasury", &treasury);

        match self.config.burn_mint {
            None => summary.record_skipped("burn", "no burn mint configured"),
            Some(burn_mint) => {
                let buy = if split.burn == 0 {
                    summary.record_skipped("burn-swap", "burn share is zero");
                    0
                } else if !self.submitter.is_live() {
                    summary.record_skipped("burn-swap", "dry run does not execute swaps");
                    0
                } else {
                    split.burn
                };
                self.buy_and_burn(summary, &burn_mint, buy).await;
            }
        }

        if split.reflect == 0 {
            summary.record_skipped("reflect", "reflection share is zero");
            return Ok(());
        }

        let reflection_mint = self.config.reflection_mint();
        let amount = if reflection_mint == mint {
            split.reflect
        } else if !self.submitter.is_live() {
            summary.record_skipped(
                "reflect",
                format!("dry run cannot price the swap into {}", reflection_mint),
            );
            return Ok(());
        } else {
            match self.convert(split.reflect, &reflection_mint).await {
                Ok(amount) if amount > 0 => amount,
                Ok(_) => {
                    summary.record_skipped("reflect", "swap into the reflection mint returned nothing");
                    return Ok(());
                }
                Err(e) => {
                    summary.record_failed("reflect", e.to_string());
                    return Ok(());
                }
            }
        };

        let (report, paid) = self
            .reflect(&holders, &mint_info, &source, &reflection_mint, amount)
            .await?;
        summary.record_execution("reflect", &report);
        summary.records = paid.len();
        summary.disbursed = total_amount(&paid);
        *records = paid;

        Ok(())
    }

    /// DAO and developer transfers, creating their token accounts when missing
    async fn pay_treasury(
        &self,
        mint: &Pubkey,
        mint_info: &MintInfo,
        source: &Pubkey,
        split: &FeeSplit,
    ) -> KeeperResult<ExecutionReport> {
        let mut builder = self.builder("treasury", self.config.batch.max_heavy_per_tx);
        for (wallet, amount) in [
            (self.config.dao_address, split.dao),
            (self.config.dev_address, split.dev),
        ] {
            if amount == 0 {
                continue;
            }
            let destination = associated_token_address(&wallet, mint, &mint_info.token_program);
            builder.push_group(vec![
                create_ata_idempotent(&self.authority, &wallet, mint, &mint_info.token_program)
                    .into(),
                PlannedInstruction::with_record(
                    transfer_checked(
                        &mint_info.token_program,
                        source,
                        mint,
                        &destination,
                        &self.authority,
                        amount,
                        mint_info.decimals,
                    )?,
                    DisbursementRecord::direct(wallet, amount, RecipientKind::Wallet),
                ),
            ]);
        }

        Ok(self.submit(builder.finish()).await)
    }

    /// Convert `amount` of the collected token into `target`: first through
    /// the on-chain pool into the intermediary mint, then through the
    /// aggregator when `target` is something else.
    async fn convert(&self, amount: u64, target: &Pubkey) -> KeeperResult<u64> {
        let token = self.config.token_mint;
        let intermediary = self.config.intermediary_mint;
        if *target == token {
            return Ok(amount);
        }

        let bridged = if intermediary == token {
            amount
        } else {
            self.swaps
                .execute_pool_swap(&token, &intermediary, amount, 0)
                .await?
                .amount_out
        };
        if *target == intermediary {
            return Ok(bridged);
        }
        if bridged == 0 {
            return Err(KeeperError::SwapFailed(format!(
                "pool swap into {} returned nothing",
                intermediary
            )));
        }

        Ok(self
            .swaps
            .swap_via_aggregator(&intermediary, target, bridged)
            .await?
            .amount_out)
    }

    /// Buy `buy` worth of the burn mint, then burn everything held of it.
    ///
    /// The burn covers leftovers of earlier runs and still happens when the
    /// purchase fails.
    async fn buy_and_burn(&self, summary: &mut RunSummary, burn_mint: &Pubkey, buy: u64) {
        if buy > 0 {
            match self.convert(buy, burn_mint).await {
                Ok(bought) => info!("Bought {} {}", bought, burn_mint),
                Err(e) => summary.record_failed("burn-swap", e.to_string()),
            }
        }

        match self.burn_held(burn_mint).await {
            Ok(Some(report)) => summary.record_execution("burn", &report),
            Ok(None) => summary.record_skipped("burn", format!("no {} held", burn_mint)),
            Err(e) => summary.record_failed("burn", e.to_string()),
        }
    }

    async fn burn_held(&self, burn_mint: &Pubkey) -> KeeperResult<Option<ExecutionReport>> {
        let burn_info = self.ledger.mint(burn_mint).await?;
        let account = associated_token_address(&self.authority, burn_mint, &burn_info.token_program);
        let held = self.ledger.token_balance(&account).await?.unwrap_or(0);
        if held == 0 {
            return Ok(None);
        }

        let instruction = burn_checked(
            &burn_info.token_program,
            &account,
            burn_mint,
            &self.authority,
            held,
            burn_info.decimals,
        )?;
        info!("Burning {} {}", held, burn_mint);

        Ok(Some(
            self.submit(vec![TransactionBatch::new("burn", vec![instruction])])
                .await,
        ))
    }

    async fn reflect(
        &self,
        holders: &[Holder],
        mint_info: &MintInfo,
        source: &Pubkey,
        reflection_mint: &Pubkey,
        amount: u64,
    ) -> KeeperResult<(ExecutionReport, Vec<DisbursementRecord>)> {
        let mint = self.config.token_mint;
        let rate = rate_per_token(amount, mint_info.supply);
        info!(
            "Reflecting {} {} over a supply of {} ({} per unit)",
            amount, reflection_mint, mint_info.supply, rate
        );

        let resolved = match PoolResolver::new(self.ledger.clone(), self.config.swap_program_id)
            .resolve(&mint)
            .await
        {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Pool resolution failed, paying pool accounts directly: {}", e);
                ResolvedPools::default()
            }
        };

        let mut excluded: HashSet<Pubkey> = self.config.exclude.iter().copied().collect();
        excluded.insert(*source);
        let eligible = without_excluded(holders, &excluded);
        debug!("{} of {} holders eligible", eligible.len(), holders.len());

        let records = allocate(&eligible, &resolved.membership, &resolved.providers, rate);
        let planned = self.plan_payouts(reflection_mint, records).await?;
        let paid: Vec<DisbursementRecord> = planned
            .iter()
            .flatten()
            .filter_map(|p| p.record.clone())
            .collect();

        let mut builder = self.builder("reflect", self.config.batch.max_transfers_per_tx);
        for group in planned {
            builder.push_group(group);
        }
        let report = self.submit(builder.finish()).await;

        Ok((report, paid))
    }

    /// Payout instructions for `records` in `reflection_mint`, one group per
    /// payout.
    ///
    /// Native payouts are lamport transfers to wallets; token payouts go to the
    /// recipient's associated account, created in the same group when missing.
    async fn plan_payouts(
        &self,
        reflection_mint: &Pubkey,
        records: Vec<DisbursementRecord>,
    ) -> KeeperResult<Vec<Vec<PlannedInstruction>>> {
        let mut planned = Vec::with_capacity(records.len());

        if *reflection_mint == WSOL_MINT {
            for record in records {
                if record.recipient == RecipientKind::TokenAccount {
                    warn!(
                        "{} has no known owner, cannot pay {} lamports",
                        record.destination, record.amount
                    );
                    continue;
                }
                planned.push(vec![PlannedInstruction::with_record(
                    transfer_lamports(&self.authority, &record.destination, record.amount),
                    record,
                )]);
            }
            return Ok(planned);
        }

        let info = self.ledger.mint(reflection_mint).await?;
        let source = associated_token_address(&self.authority, reflection_mint, &info.token_program);
        let raw_accounts_allowed = *reflection_mint == self.config.token_mint;

        let mut payable = Vec::with_capacity(records.len());
        for record in records {
            let destination = match record.recipient {
                RecipientKind::Wallet => {
                    associated_token_address(&record.destination, reflection_mint, &info.token_program)
                }
                RecipientKind::TokenAccount if raw_accounts_allowed => record.destination,
                RecipientKind::TokenAccount => {
                    warn!(
                        "{} holds a different mint and has no known owner, cannot pay {}",
                        record.destination, record.amount
                    );
                    continue;
                }
            };
            payable.push((destination, record));
        }

        let wallet_accounts: Vec<Pubkey> = payable
            .iter()
            .filter(|(_, r)| r.recipient == RecipientKind::Wallet)
            .map(|(destination, _)| *destination)
            .collect();
        let existing: HashSet<Pubkey> = wallet_accounts
            .iter()
            .zip(self.ledger.multiple_accounts(&wallet_accounts).await?)
            .filter_map(|(address, account)| account.map(|_| *address))
            .collect();

        let mut created = HashSet::new();
        for (destination, record) in payable {
            let mut group = Vec::with_capacity(2);
            if record.recipient == RecipientKind::Wallet
                && !existing.contains(&destination)
                && created.insert(destination)
            {
                group.push(PlannedInstruction::new(create_ata_idempotent(
                    &self.authority,
                    &record.destination,
                    reflection_mint,
                    &info.token_program,
                )));
            }
            group.push(PlannedInstruction::with_record(
                transfer_checked(
                    &info.token_program,
                    &source,
                    reflection_mint,
                    &destination,
                    &self.authority,
                    record.amount,
                    info.decimals,
                )?,
                record,
            ));
            planned.push(group);
        }

        Ok(planned)
    }

    fn builder(&self, label: &str, max_per_batch: usize) -> BatchBuilder {
        let builder = BatchBuilder::new(label, max_per_batch);
        if self.config.batch.estimate_size {
            builder.with_size_limit(self.authority, self.config.batch.max_tx_bytes)
        } else {
            builder
        }
    }

    async fn submit(&self, batches: Vec<TransactionBatch>) -> ExecutionReport {
        ExecutionQueue::submit_all(self.submitter.clone(), self.config.retry.clone(), batches).await
    }
}
