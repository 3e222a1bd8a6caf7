//! Swap adapter
//!
//! Two pricing sources: a direct exact-in swap through the first on-chain
//! pool trading the pair, and an external aggregator that returns a prepared
//! transaction. Either way the amount received is measured from balances, the
//! quote is only an estimate.

use reflector_sdk::{
    instructions::{
        associated_token_address, create_ata_idempotent, swap_exact_in, unwrap_sol, wrap_sol,
        SwapAccounts,
    },
    Ledger, SdkError, SwapAggregator,
};
use reflector_types::WSOL_MINT;
use solana_sdk::{
    instruction::Instruction, program_pack::Pack, pubkey::Pubkey, signature::Signature,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    batch::TransactionBatch,
    config::SwapConfig,
    error::{KeeperError, KeeperResult},
    pools::PoolResolver,
    queue::TransactionSubmitter,
};

/// Result of an executed swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapOutcome {
    pub signature: Signature,
    /// Output actually received, from the balance delta
    pub amount_out: u64,
}

/// Balance of the output asset taken before a swap
#[derive(Debug, Clone, Copy)]
enum OutputSnapshot {
    Token {
        account: Pubkey,
        before: u64,
    },
    /// Wrapped SOL output lands as lamports once the wrapped account closes
    Native {
        lamports: u64,
        /// Wrapped balance already sitting in the account that gets closed
        wrapped: Option<u64>,
    },
}

pub struct SwapAdapter {
    ledger: Arc<dyn Ledger>,
    aggregator: Arc<dyn SwapAggregator>,
    submitter: Arc<dyn TransactionSubmitter>,
    user: Pubkey,
    swap_program: Pubkey,
    config: SwapConfig,
}

impl SwapAdapter {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        aggregator: Arc<dyn SwapAggregator>,
        submitter: Arc<dyn TransactionSubmitter>,
        user: Pubkey,
        swap_program: Pubkey,
        config: SwapConfig,
    ) -> Self {
        Self {
            ledger,
            aggregator,
            submitter,
            user,
            swap_program,
            config,
        }
    }

    /// Build an exact-in swap of `amount_in` through the first pool trading
    /// `input` against `output`.
    ///
    /// Wrapped SOL input is topped up and synced first; wrapped SOL output is
    /// unwrapped afterwards.
    pub async fn swap_exact_in(
        &self,
        input: &Pubkey,
        output: &Pubkey,
        amount_in: u64,
        min_amount_out: u64,
    ) -> KeeperResult<TransactionBatch> {
        let resolver = PoolResolver::new(self.ledger.clone(), self.swap_program);
        let pools = resolver.pools_for_pair(input, output).await?;
        let pool = pools.first().ok_or(SdkError::NoRoute {
            input: *input,
            output: *output,
        })?;
        if pools.len() > 1 {
            debug!("{} pools trade {}/{}, using {}", pools.len(), input, output, pool.pool_address);
        }

        let input_mint = self.ledger.mint(input).await?;
        let output_mint = self.ledger.mint(output).await?;
        let user_source = associated_token_address(&self.user, input, &input_mint.token_program);
        let user_destination =
            associated_token_address(&self.user, output, &output_mint.token_program);

        let mut instructions: Vec<Instruction> = Vec::with_capacity(6);
        if *input == WSOL_MINT {
            match self.ledger.token_balance(&user_source).await? {
                Some(wrapped) if wrapped >= amount_in => {}
                Some(wrapped) => {
                    instructions.extend(wrap_sol(&self.user, amount_in - wrapped, false)?)
                }
                None => instructions.extend(wrap_sol(&self.user, amount_in, true)?),
            }
        }

        instructions.push(create_ata_idempotent(
            &self.user,
            &self.user,
            output,
            &output_mint.token_program,
        ));
        instructions.push(swap_exact_in(
            &self.swap_program,
            pool,
            &SwapAccounts {
                user: self.user,
                user_source,
                user_destination,
                source_mint: *input,
                destination_mint: *output,
                source_token_program: input_mint.token_program,
                destination_token_program: output_mint.token_program,
            },
            amount_in,
            min_amount_out,
        )?);

        if *output == WSOL_MINT {
            instructions.push(unwrap_sol(&self.user)?);
        }

        Ok(TransactionBatch::new(
            format!("swap {} -> {}", input, output),
            instructions,
        ))
    }

    /// Build, submit and measure a pool swap
    pub async fn execute_pool_swap(
        &self,
        input: &Pubkey,
        output: &Pubkey,
        amount_in: u64,
        min_amount_out: u64,
    ) -> KeeperResult<SwapOutcome> {
        let batch = self
            .swap_exact_in(input, output, amount_in, min_amount_out)
            .await?;
        let snapshot = self.snapshot(output).await?;

        let signature = self
            .submitter
            .submit(&batch)
            .await
            .map_err(|e| KeeperError::SwapFailed(format!("{}: {}", batch.label, e)))?;

        let amount_out = self.realized(&snapshot).await?;
        info!(
            "Pool swap {} {} -> {} {}: {}",
            amount_in, input, amount_out, output, signature
        );
        Ok(SwapOutcome {
            signature,
            amount_out,
        })
    }

    /// Quote through the aggregator, then sign and submit its prepared
    /// transaction.
    ///
    /// Any aggregator error fails the swap; nothing is retried here.
    pub async fn quote_and_swap(
        &self,
        input: &Pubkey,
        output: &Pubkey,
        amount_in: u64,
        slippage_bps: u16,
    ) -> KeeperResult<SwapOutcome> {
        let quote = self
            .aggregator
            .quote(input, output, amount_in, slippage_bps, &self.user)
            .await?;
        let transaction = self.aggregator.swap_transaction(&quote, &self.user).await?;
        let snapshot = self.snapshot(output).await?;

        let label = format!("aggregator swap {} -> {}", input, output);
        let signature = self
            .submitter
            .submit_prepared(&label, transaction)
            .await
            .map_err(|e| KeeperError::SwapFailed(format!("{}: {}", label, e)))?;

        let amount_out = self.realized(&snapshot).await?;
        info!(
            "Aggregator swap {} {} -> {} {} (quoted {}): {}",
            amount_in, input, amount_out, output, quote.out_amount, signature
        );
        Ok(SwapOutcome {
            signature,
            amount_out,
        })
    }

    /// Aggregator swap with the configured slippage
    pub async fn swap_via_aggregator(
        &self,
        input: &Pubkey,
        output: &Pubkey,
        amount_in: u64,
    ) -> KeeperResult<SwapOutcome> {
        self.quote_and_swap(input, output, amount_in, self.config.slippage_bps)
            .await
    }

    async fn snapshot(&self, output: &Pubkey) -> KeeperResult<OutputSnapshot> {
        if *output == WSOL_MINT {
            let wrapped_account =
                associated_token_address(&self.user, &WSOL_MINT, &spl_token::id());
            return Ok(OutputSnapshot::Native {
                lamports: self.ledger.native_balance(&self.user).await?,
                wrapped: self.ledger.token_balance(&wrapped_account).await?,
            });
        }

        let program = self.ledger.mint(output).await?.token_program;
        let account = associated_token_address(&self.user, output, &program);
        Ok(OutputSnapshot::Token {
            account,
            before: self.ledger.token_balance(&account).await?.unwrap_or(0),
        })
    }

    async fn realized(&self, snapshot: &OutputSnapshot) -> KeeperResult<u64> {
        match *snapshot {
            OutputSnapshot::Token { account, before } => {
                let after = self.ledger.token_balance(&account).await?.unwrap_or(0);
                Ok(after.saturating_sub(before))
            }
            OutputSnapshot::Native { lamports, wrapped } => {
                let after = self.ledger.native_balance(&self.user).await?;
                // Closing a wrapped account that existed before the swap also
                // returns its rent and its earlier balance
                let (rent_refund, prior) = match wrapped {
                    Some(prior) => (
                        self.ledger
                            .minimum_balance_for_rent_exemption(spl_token::state::Account::LEN)
                            .await?,
                        prior,
                    ),
                    None => (0, 0),
                };
                let delta = i128::from(after) - i128::from(lamports)
                    + i128::from(self.config.signature_fee_lamports)
                    - i128::from(rent_refund)
                    - i128::from(prior);
                Ok(u64::try_from(delta.max(0)).unwrap_or(u64::MAX))
            }
        }
    }
}
