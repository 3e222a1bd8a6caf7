//! Pool resolver
//!
//! Finds the token-swap pools trading a mint and the LP providers behind each
//! pool. Results are plain values handed to the allocation engine.

use reflector_sdk::{
    state::unpack_token_account, AccountFilter, Ledger, SdkResult, TokenHolding,
};
use reflector_types::{
    pool::layout, providers_from_holdings, LpProvider, Pool, PoolMembership, ProviderMap,
};
use solana_sdk::pubkey::Pubkey;
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, info, warn};

/// Pools of one mint with their membership map and providers
#[derive(Debug, Clone, Default)]
pub struct ResolvedPools {
    pub pools: Vec<Pool>,
    pub membership: PoolMembership,
    pub providers: ProviderMap,
}

pub struct PoolResolver {
    ledger: Arc<dyn Ledger>,
    swap_program: Pubkey,
}

impl PoolResolver {
    pub fn new(ledger: Arc<dyn Ledger>, swap_program: Pubkey) -> Self {
        Self {
            ledger,
            swap_program,
        }
    }

    /// Pools holding `mint` on either side.
    ///
    /// The account filter matches one offset at a time, so side A and side B
    /// are queried separately and concatenated.
    pub async fn pools_for_mint(&self, mint: &Pubkey) -> SdkResult<Vec<Pool>> {
        let mut accounts = self
            .ledger
            .program_accounts(
                &self.swap_program,
                vec![AccountFilter::pubkey_at(layout::MINT_A, mint)],
            )
            .await?;
        accounts.extend(
            self.ledger
                .program_accounts(
                    &self.swap_program,
                    vec![AccountFilter::pubkey_at(layout::MINT_B, mint)],
                )
                .await?,
        );

        Ok(self.decode_pools(accounts))
    }

    /// Pools trading `a` against `b`, in either orientation
    pub async fn pools_for_pair(&self, a: &Pubkey, b: &Pubkey) -> SdkResult<Vec<Pool>> {
        let mut accounts = Vec::new();
        for (first, second) in [(a, b), (b, a)] {
            accounts.extend(
                self.ledger
                    .program_accounts(
                        &self.swap_program,
                        vec![
                            AccountFilter::pubkey_at(layout::MINT_A, first),
                            AccountFilter::pubkey_at(layout::MINT_B, second),
                        ],
                    )
                    .await?,
            );
        }

        Ok(self.decode_pools(accounts))
    }

    fn decode_pools(&self, accounts: Vec<(Pubkey, solana_sdk::account::Account)>) -> Vec<Pool> {
        let mut seen = HashSet::new();
        accounts
            .into_iter()
            .filter(|(address, _)| seen.insert(*address))
            .filter_map(|(address, account)| match Pool::unpack(address, &account.data) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("Skipping undecodable pool account {}: {}", address, e);
                    None
                }
            })
            .collect()
    }

    /// LP providers of `pool`: positive LP holdings dereferenced to their owning wallets
    pub async fn providers(&self, pool: &Pool) -> SdkResult<Vec<LpProvider>> {
        let holdings: Vec<TokenHolding> = self
            .ledger
            .largest_token_holders(&pool.lp_mint)
            .await?
            .into_iter()
            .filter(|h| h.amount > 0)
            .collect();

        let addresses: Vec<Pubkey> = holdings.iter().map(|h| h.address).collect();
        let accounts = self.ledger.multiple_accounts(&addresses).await?;

        let mut owned = Vec::with_capacity(holdings.len());
        for (holding, account) in holdings.iter().zip(accounts) {
            let Some(account) = account else {
                warn!("LP token account {} of pool {} vanished", holding.address, pool.pool_address);
                continue;
            };
            match unpack_token_account(&account.data) {
                Ok(info) => owned.push((info.owner, holding.address, holding.amount)),
                Err(e) => warn!("LP token account {} undecodable: {}", holding.address, e),
            }
        }

        Ok(providers_from_holdings(&owned))
    }

    /// Resolve every pool of `mint`.
    ///
    /// A pool whose providers cannot be fetched keeps an empty provider list;
    /// the other pools are unaffected.
    pub async fn resolve(&self, mint: &Pubkey) -> SdkResult<ResolvedPools> {
        let pools = self.pools_for_mint(mint).await?;
        info!("Found {} pools for {}", pools.len(), mint);

        let mut resolved = ResolvedPools::default();
        for pool in &pools {
            if !resolved.membership.add_pool(pool) {
                warn!(
                    "Pool {} shares a token account with an earlier pool, keeping the first mapping",
                    pool.pool_address
                );
            }

            let providers = match self.providers(pool).await {
                Ok(providers) => providers,
                Err(e) => {
                    warn!("Failed to resolve LP providers of pool {}: {}", pool.pool_address, e);
                    Vec::new()
                }
            };
            debug!("Pool {} has {} LP providers", pool.pool_address, providers.len());
            resolved.providers.insert(pool.pool_address, providers);
        }

        resolved.pools = pools;
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflector_sdk::testing::{token_account, MockLedger};
    use solana_sdk::account::Account;

    fn pool_account(pool: &Pool, program: Pubkey) -> Account {
        Account {
            lamports: 1,
            data: pool.pack(),
            owner: program,
            executable: false,
            rent_epoch: 0,
        }
    }

    fn new_pool(mint_a: Pubkey, mint_b: Pubkey) -> Pool {
        Pool {
            pool_address: Pubkey::new_unique(),
            token_account_a: Pubkey::new_unique(),
            token_account_b: Pubkey::new_unique(),
            lp_mint: Pubkey::new_unique(),
            fee_account: Pubkey::new_unique(),
            mint_a,
            mint_b,
            pool_token_program: spl_token_2022::id(),
        }
    }

    #[tokio::test]
    async fn test_finds_pools_on_both_sides() {
        let ledger = Arc::new(MockLedger::new());
        let program = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let other = Pubkey::new_unique();

        let as_a = new_pool(mint, other);
        let as_b = new_pool(other, mint);
        let unrelated = new_pool(other, Pubkey::new_unique());
        for pool in [&as_a, &as_b, &unrelated] {
            ledger.set_account(pool.pool_address, pool_account(pool, program));
        }

        let resolver = PoolResolver::new(ledger, program);
        let pools = resolver.pools_for_mint(&mint).await.unwrap();
        assert_eq!(pools, vec![as_a.clone(), as_b.clone()]);

        let pair = resolver.pools_for_pair(&other, &mint).await.unwrap();
        assert_eq!(pair, vec![as_b, as_a]);
    }

    #[tokio::test]
    async fn test_providers_are_owning_wallets() {
        let ledger = Arc::new(MockLedger::new());
        let program = Pubkey::new_unique();
        let pool = new_pool(Pubkey::new_unique(), Pubkey::new_unique());
        ledger.set_account(pool.pool_address, pool_account(&pool, program));

        let (w1, w2) = (Pubkey::new_unique(), Pubkey::new_unique());
        let (lp1, lp2, empty) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        ledger.set_account(lp1, token_account(pool.lp_mint, w1, 600, spl_token_2022::id()));
        ledger.set_account(lp2, token_account(pool.lp_mint, w2, 400, spl_token_2022::id()));
        ledger.set_account(empty, token_account(pool.lp_mint, Pubkey::new_unique(), 0, spl_token_2022::id()));

        let resolver = PoolResolver::new(ledger, program);
        let providers = resolver.providers(&pool).await.unwrap();

        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].address, w1);
        assert_eq!(providers[0].lp_token_account, lp1);
        assert!((providers[0].pct - 0.6).abs() < 1e-12);
        assert_eq!(providers[1].address, w2);
    }

    #[tokio::test]
    async fn test_failed_pool_keeps_empty_provider_list() {
        let ledger = Arc::new(MockLedger::new());
        let program = Pubkey::new_unique();
        let mint = Pubkey::new_unique();

        let broken = new_pool(mint, Pubkey::new_unique());
        let healthy = new_pool(mint, Pubkey::new_unique());
        for pool in [&broken, &healthy] {
            ledger.set_account(pool.pool_address, pool_account(pool, program));
        }
        ledger.set_account(
            Pubkey::new_unique(),
            token_account(healthy.lp_mint, Pubkey::new_unique(), 10, spl_token_2022::id()),
        );
        ledger.fail_largest_holders(broken.lp_mint);

        let resolved = PoolResolver::new(ledger, program).resolve(&mint).await.unwrap();

        assert_eq!(resolved.pools.len(), 2);
        assert_eq!(resolved.membership.len(), 4);
        assert!(resolved.providers[&broken.pool_address].is_empty());
        assert_eq!(resolved.providers[&healthy.pool_address].len(), 1);
    }
}
