//! Allocation engine
//!
//! Turns a holder snapshot into disbursement records. Holders that are pool
//! token accounts are paid through the pool's LP providers instead.

use reflector_types::{DisbursementRecord, Holder, PoolMembership, ProviderMap, RecipientKind};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Compute disbursements for `holders` at `rate_per_token` reflection units
/// per held unit.
///
/// Output follows holder order; records of one pool account follow the order
/// of that pool's provider list. Zero and negative amounts are dropped.
pub fn allocate(
    holders: &[Holder],
    membership: &PoolMembership,
    providers: &ProviderMap,
    rate_per_token: f64,
) -> Vec<DisbursementRecord> {
    let mut records = Vec::with_capacity(holders.len());

    for holder in holders.iter().filter(|h| h.amount > 0) {
        let Some(pool) = membership.pool_for(&holder.address) else {
            let amount = floor_amount(holder.amount as f64 * rate_per_token);
            if amount > 0 {
                let recipient = if holder.owner.is_some() {
                    RecipientKind::Wallet
                } else {
                    RecipientKind::TokenAccount
                };
                records.push(DisbursementRecord::direct(
                    holder.payout_address(),
                    amount,
                    recipient,
                ));
            }
            continue;
        };

        let pool_providers = providers.get(pool).map(Vec::as_slice).unwrap_or(&[]);
        if pool_providers.is_empty() {
            warn!(
                "Pool account {} (pool {}) has no resolved LP providers, {} held units go unpaid",
                holder.address, pool, holder.amount
            );
            continue;
        }

        for provider in pool_providers {
            // One level only: LP tokens parked in another pool's vault are not followed
            if membership.contains(&provider.lp_token_account)
                || membership.contains(&provider.address)
            {
                warn!(
                    "LP position {} (owner {}) of pool {} is itself a pool account, skipping",
                    provider.lp_token_account, provider.address, pool
                );
                continue;
            }

            let amount = floor_amount(holder.amount as f64 * provider.pct * rate_per_token);
            if amount > 0 {
                records.push(DisbursementRecord::via_pool(
                    provider.address,
                    amount,
                    holder.address,
                    provider.pct,
                ));
            }
        }
        debug!(
            "Pool account {} redistributed across {} providers",
            holder.address,
            pool_providers.len()
        );
    }

    records
}

/// Drop holders whose token account is in `excluded`
pub fn without_excluded(holders: &[Holder], excluded: &HashSet<Pubkey>) -> Vec<Holder> {
    holders
        .iter()
        .filter(|h| !excluded.contains(&h.address))
        .cloned()
        .collect()
}

/// Reflection units per held unit
pub fn rate_per_token(reflect_amount: u64, supply: u64) -> f64 {
    if supply == 0 {
        return 0.0;
    }
    reflect_amount as f64 / supply as f64
}

fn floor_amount(value: f64) -> u64 {
    if value.is_finite() && value >= 1.0 {
        value.floor() as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflector_types::{total_amount, LpProvider};

    fn provider(pct: f64) -> LpProvider {
        LpProvider {
            address: Pubkey::new_unique(),
            lp_token_account: Pubkey::new_unique(),
            amount: 0,
            pct,
        }
    }

    #[test]
    fn test_direct_holders() {
        let h1 = Holder::new(Pubkey::new_unique(), 1000, None);
        let h2 = Holder::new(Pubkey::new_unique(), 2000, None);
        let h3 = Holder::new(Pubkey::new_unique(), 0, None);

        let records = allocate(
            &[h1.clone(), h2.clone(), h3],
            &PoolMembership::new(),
            &ProviderMap::new(),
            0.1,
        );

        let pairs: Vec<(Pubkey, u64)> = records.iter().map(|r| (r.destination, r.amount)).collect();
        assert_eq!(pairs, vec![(h1.address, 100), (h2.address, 200)]);
        assert!(records.iter().all(|r| r.recipient == RecipientKind::TokenAccount));
    }

    #[test]
    fn test_owner_preferred_over_token_account() {
        let owner = Pubkey::new_unique();
        let holder = Holder::new(Pubkey::new_unique(), 50, Some(owner));
        let records = allocate(&[holder], &PoolMembership::new(), &ProviderMap::new(), 1.0);
        assert_eq!(records[0].destination, owner);
        assert_eq!(records[0].recipient, RecipientKind::Wallet);
    }

    #[test]
    fn test_pool_account_split_across_providers() {
        let pool = Pubkey::new_unique();
        let pool_account = Pubkey::new_unique();
        let mut membership = PoolMembership::new();
        membership.insert(pool_account, pool);

        let p1 = provider(0.6);
        let p2 = provider(0.4);
        let mut providers = ProviderMap::new();
        providers.insert(pool, vec![p1.clone(), p2.clone()]);

        let holders = [Holder::new(pool_account, 5000, None)];
        let records = allocate(&holders, &membership, &providers, 0.1);

        let pairs: Vec<(Pubkey, u64)> = records.iter().map(|r| (r.destination, r.amount)).collect();
        assert_eq!(pairs, vec![(p1.address, 300), (p2.address, 200)]);
        assert!(records.iter().all(|r| r.origin == Some(pool_account)));
        assert_eq!(records[0].pct, Some(0.6));
    }

    #[test]
    fn test_pool_split_loses_at_most_one_unit_per_provider() {
        let pool = Pubkey::new_unique();
        let pool_account = Pubkey::new_unique();
        let mut membership = PoolMembership::new();
        membership.insert(pool_account, pool);

        let shares = [0.5, 0.3, 0.2];
        let mut providers = ProviderMap::new();
        providers.insert(pool, shares.iter().map(|pct| provider(*pct)).collect());

        let holder_amount = 12_345;
        let rate = 0.37;
        let records = allocate(
            &[Holder::new(pool_account, holder_amount, None)],
            &membership,
            &providers,
            rate,
        );

        let expected = (holder_amount as f64 * rate).floor() as u64;
        let paid = total_amount(&records);
        assert!(paid <= expected);
        assert!(expected - paid < shares.len() as u64);
    }

    #[test]
    fn test_direct_sum_bounded_by_rate() {
        let holders: Vec<Holder> = [7u64, 13, 999, 1, 40_000]
            .iter()
            .map(|a| Holder::new(Pubkey::new_unique(), *a, None))
            .collect();
        let rate = 0.25;
        let records = allocate(&holders, &PoolMembership::new(), &ProviderMap::new(), rate);

        let held: u64 = holders.iter().map(|h| h.amount).sum();
        assert!(total_amount(&records) <= (held as f64 * rate).floor() as u64);
        // 1 * 0.25 floors to zero and is dropped
        assert_eq!(records.len(), holders.len() - 1);
    }

    #[test]
    fn test_provider_that_is_a_pool_account_is_skipped() {
        let pool = Pubkey::new_unique();
        let pool_account = Pubkey::new_unique();
        // Half of the LP supply sits in the vault of a second pool, owned by
        // that pool's authority
        let nested = provider(0.5);
        let wallet = provider(0.5);

        let mut membership = PoolMembership::new();
        membership.insert(pool_account, pool);
        membership.insert(nested.lp_token_account, Pubkey::new_unique());

        let mut providers = ProviderMap::new();
        providers.insert(pool, vec![nested, wallet.clone()]);

        let records = allocate(
            &[Holder::new(pool_account, 1000, None)],
            &membership,
            &providers,
            1.0,
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].destination, wallet.address);
        assert_eq!(records[0].amount, 500);
    }

    #[test]
    fn test_lp_supply_held_by_another_pool_pays_nobody() {
        let (pool_a, pool_b) = (Pubkey::new_unique(), Pubkey::new_unique());
        let (account_a, vault_b) = (Pubkey::new_unique(), Pubkey::new_unique());

        let mut membership = PoolMembership::new();
        membership.insert(account_a, pool_a);
        membership.insert(vault_b, pool_b);

        let mut providers = ProviderMap::new();
        providers.insert(
            pool_a,
            vec![LpProvider {
                address: Pubkey::new_unique(),
                lp_token_account: vault_b,
                amount: 1_000,
                pct: 1.0,
            }],
        );

        let records = allocate(&[Holder::new(account_a, 1000, None)], &membership, &providers, 1.0);
        assert!(records.is_empty());
    }

    #[test]
    fn test_pool_without_providers_pays_nothing() {
        let pool_account = Pubkey::new_unique();
        let mut membership = PoolMembership::new();
        membership.insert(pool_account, Pubkey::new_unique());

        let direct = Holder::new(Pubkey::new_unique(), 10, None);
        let records = allocate(
            &[Holder::new(pool_account, 1000, None), direct.clone()],
            &membership,
            &ProviderMap::new(),
            1.0,
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].destination, direct.address);
    }

    #[test]
    fn test_exclusions_and_rate() {
        let keep = Holder::new(Pubkey::new_unique(), 1, None);
        let drop = Holder::new(Pubkey::new_unique(), 1, None);
        let excluded: HashSet<Pubkey> = [drop.address].into_iter().collect();

        let filtered = without_excluded(&[keep.clone(), drop], &excluded);
        assert_eq!(filtered, vec![keep]);

        assert_eq!(rate_per_token(50, 1000), 0.05);
        assert_eq!(rate_per_token(50, 0), 0.0);
    }
}
