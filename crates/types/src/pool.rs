/// Liquidity pool accounts, pool membership and LP providers

use serde::{Deserialize, Serialize};
use solana_program::pubkey::Pubkey;
use std::collections::BTreeMap;

use crate::{errors::LayoutError, serde_helpers::pubkey_serde, LayoutResult};

// ============================================================================
// Token-swap Pool Layout
// ============================================================================

/// Byte offsets inside a token-swap pool account.
///
/// version(1) | is_initialized(1) | bump(1) | pool_token_program(32) |
/// token_account_a(32) | token_account_b(32) | pool_mint(32) | mint_a(32) |
/// mint_b(32) | fee_account(32) | 8 x u64 fee fields | curve_type(1) |
/// curve_parameters(32)
pub mod layout {
    pub const IS_INITIALIZED: usize = 1;
    pub const POOL_TOKEN_PROGRAM: usize = 3;
    pub const TOKEN_ACCOUNT_A: usize = POOL_TOKEN_PROGRAM + 32;
    pub const TOKEN_ACCOUNT_B: usize = TOKEN_ACCOUNT_A + 32;
    pub const POOL_MINT: usize = TOKEN_ACCOUNT_B + 32;
    pub const MINT_A: usize = POOL_MINT + 32;
    pub const MINT_B: usize = MINT_A + 32;
    pub const FEE_ACCOUNT: usize = MINT_B + 32;
    pub const FEES: usize = FEE_ACCOUNT + 32;
    pub const CURVE_TYPE: usize = FEES + 8 * 8;
    pub const LEN: usize = CURVE_TYPE + 1 + 32;
}

/// A liquidity pool's constituent accounts, read-only for the whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    #[serde(with = "pubkey_serde")]
    pub pool_address: Pubkey,
    #[serde(with = "pubkey_serde")]
    pub token_account_a: Pubkey,
    #[serde(with = "pubkey_serde")]
    pub token_account_b: Pubkey,
    #[serde(with = "pubkey_serde")]
    pub lp_mint: Pubkey,
    #[serde(with = "pubkey_serde")]
    pub fee_account: Pubkey,
    #[serde(with = "pubkey_serde")]
    pub mint_a: Pubkey,
    #[serde(with = "pubkey_serde")]
    pub mint_b: Pubkey,
    #[serde(with = "pubkey_serde")]
    pub pool_token_program: Pubkey,
}

impl Pool {
    /// Decode a pool from its token-swap account data
    pub fn unpack(pool_address: Pubkey, data: &[u8]) -> LayoutResult<Self> {
        if data.len() < layout::LEN {
            return Err(LayoutError::TooShort {
                account: pool_address,
                len: data.len(),
                expected: layout::LEN,
            });
        }
        if data[layout::IS_INITIALIZED] == 0 {
            return Err(LayoutError::NotInitialized { account: pool_address });
        }

        let key_at = |offset: usize| -> LayoutResult<Pubkey> {
            Pubkey::try_from(&data[offset..offset + 32]).map_err(|_| LayoutError::InvalidPubkey {
                account: pool_address,
                offset,
            })
        };

        Ok(Self {
            pool_address,
            token_account_a: key_at(layout::TOKEN_ACCOUNT_A)?,
            token_account_b: key_at(layout::TOKEN_ACCOUNT_B)?,
            lp_mint: key_at(layout::POOL_MINT)?,
            fee_account: key_at(layout::FEE_ACCOUNT)?,
            mint_a: key_at(layout::MINT_A)?,
            mint_b: key_at(layout::MINT_B)?,
            pool_token_program: key_at(layout::POOL_TOKEN_PROGRAM)?,
        })
    }

    /// Encode the fields this crate reads; everything else is zeroed
    pub fn pack(&self) -> Vec<u8> {
        let mut data = vec![0u8; layout::LEN];
        data[0] = 1;
        data[layout::IS_INITIALIZED] = 1;
        let mut put = |offset: usize, key: &Pubkey| {
            data[offset..offset + 32].copy_from_slice(key.as_ref());
        };
        put(layout::POOL_TOKEN_PROGRAM, &self.pool_token_program);
        put(layout::TOKEN_ACCOUNT_A, &self.token_account_a);
        put(layout::TOKEN_ACCOUNT_B, &self.token_account_b);
        put(layout::POOL_MINT, &self.lp_mint);
        put(layout::MINT_A, &self.mint_a);
        put(layout::MINT_B, &self.mint_b);
        put(layout::FEE_ACCOUNT, &self.fee_account);
        data
    }

    pub fn holds_mint(&self, mint: &Pubkey) -> bool {
        self.mint_a == *mint || self.mint_b == *mint
    }

    /// Pool-side (source, destination) token accounts for a swap out of `input_mint`
    pub fn swap_accounts(&self, input_mint: &Pubkey) -> Option<(Pubkey, Pubkey)> {
        if *input_mint == self.mint_a {
            Some((self.token_account_a, self.token_account_b))
        } else if *input_mint == self.mint_b {
            Some((self.token_account_b, self.token_account_a))
        } else {
            None
        }
    }
}

// ============================================================================
// Pool Membership
// ============================================================================

/// Maps each pool-side token account to the pool that owns it.
///
/// Every key maps to exactly one pool; a conflicting insert keeps the first
/// mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMembership {
    accounts: BTreeMap<Pubkey, Pubkey>,
}

impl PoolMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register both sides of a pool; returns false if either side was
    /// already claimed by a different pool.
    pub fn add_pool(&mut self, pool: &Pool) -> bool {
        let a = self.insert(pool.token_account_a, pool.pool_address);
        let b = self.insert(pool.token_account_b, pool.pool_address);
        a && b
    }

    /// Returns false when `token_account` already belongs to another pool
    pub fn insert(&mut self, token_account: Pubkey, pool: Pubkey) -> bool {
        match self.accounts.get(&token_account) {
            Some(existing) => *existing == pool,
            None => {
                self.accounts.insert(token_account, pool);
                true
            }
        }
    }

    pub fn pool_for(&self, token_account: &Pubkey) -> Option<&Pubkey> {
        self.accounts.get(token_account)
    }

    pub fn contains(&self, token_account: &Pubkey) -> bool {
        self.accounts.contains_key(token_account)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Pubkey, &Pubkey)> {
        self.accounts.iter()
    }
}

// ============================================================================
// LP Providers
// ============================================================================

/// A wallet owning part of a pool's LP token supply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LpProvider {
    /// Wallet owning the LP token account (not the LP token account itself)
    #[serde(with = "pubkey_serde")]
    pub address: Pubkey,
    #[serde(with = "pubkey_serde")]
    pub lp_token_account: Pubkey,
    pub amount: u64,
    /// Share of the pool's LP supply, 0 < pct <= 1
    pub pct: f64,
}

/// LP providers per pool address, each list in pool-listing order
pub type ProviderMap = BTreeMap<Pubkey, Vec<LpProvider>>;

/// Turn raw LP holdings into providers with their share of the total.
///
/// Zero holdings are dropped; the remaining shares sum to 1 within float
/// tolerance.
pub fn providers_from_holdings(holdings: &[(Pubkey, Pubkey, u64)]) -> Vec<LpProvider> {
    let total: u128 = holdings.iter().map(|(_, _, amount)| *amount as u128).sum();
    if total == 0 {
        return Vec::new();
    }

    holdings
        .iter()
        .filter(|(_, _, amount)| *amount > 0)
        .map(|(owner, account, amount)| LpProvider {
            address: *owner,
            lp_token_account: *account,
            amount: *amount,
            pct: *amount as f64 / total as f64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pool() -> Pool {
        Pool {
            pool_address: Pubkey::new_unique(),
            token_account_a: Pubkey::new_unique(),
            token_account_b: Pubkey::new_unique(),
            lp_mint: Pubkey::new_unique(),
            fee_account: Pubkey::new_unique(),
            mint_a: Pubkey::new_unique(),
            mint_b: Pubkey::new_unique(),
            pool_token_program: Pubkey::new_unique(),
        }
    }

    #[test]
    fn test_layout_offsets_match_filter_offsets() {
        assert_eq!(layout::MINT_A, 1 + 1 + 1 + 32 + 32 + 32 + 32);
        assert_eq!(layout::MINT_B, 1 + 1 + 1 + 32 + 32 + 32 + 32 + 32);
        assert_eq!(layout::LEN, 324);
    }

    #[test]
    fn test_unpack_reads_packed_pool() {
        let pool = sample_pool();
        let decoded = Pool::unpack(pool.pool_address, &pool.pack()).unwrap();
        assert_eq!(decoded, pool);
    }

    #[test]
    fn test_unpack_rejects_short_and_uninitialized() {
        let pool = sample_pool();
        let data = pool.pack();
        assert!(matches!(
            Pool::unpack(pool.pool_address, &data[..100]),
            Err(LayoutError::TooShort { .. })
        ));

        let mut uninitialized = data.clone();
        uninitialized[layout::IS_INITIALIZED] = 0;
        assert!(matches!(
            Pool::unpack(pool.pool_address, &uninitialized),
            Err(LayoutError::NotInitialized { .. })
        ));
    }

    #[test]
    fn test_swap_accounts_direction() {
        let pool = sample_pool();
        assert_eq!(
            pool.swap_accounts(&pool.mint_a),
            Some((pool.token_account_a, pool.token_account_b))
        );
        assert_eq!(
            pool.swap_accounts(&pool.mint_b),
            Some((pool.token_account_b, pool.token_account_a))
        );
        assert_eq!(pool.swap_accounts(&Pubkey::new_unique()), None);
    }

    #[test]
    fn test_membership_keeps_first_pool() {
        let pool = sample_pool();
        let mut membership = PoolMembership::new();
        assert!(membership.add_pool(&pool));
        assert_eq!(membership.len(), 2);
        assert_eq!(membership.pool_for(&pool.token_account_b), Some(&pool.pool_address));

        let other = Pubkey::new_unique();
        assert!(!membership.insert(pool.token_account_a, other));
        assert_eq!(membership.pool_for(&pool.token_account_a), Some(&pool.pool_address));
        // Re-registering the same pool is not a conflict
        assert!(membership.add_pool(&pool));
    }

    #[test]
    fn test_provider_shares_sum_to_one() {
        let holdings = vec![
            (Pubkey::new_unique(), Pubkey::new_unique(), 600),
            (Pubkey::new_unique(), Pubkey::new_unique(), 0),
            (Pubkey::new_unique(), Pubkey::new_unique(), 400),
        ];
        let providers = providers_from_holdings(&holdings);
        assert_eq!(providers.len(), 2);
        assert!((providers[0].pct - 0.6).abs() < 1e-12);
        assert!((providers[1].pct - 0.4).abs() < 1e-12);
        let sum: f64 = providers.iter().map(|p| p.pct).sum();
        assert!((sum - 1.0).abs() < 1e-9);

        assert!(providers_from_holdings(&[]).is_empty());
    }
}
