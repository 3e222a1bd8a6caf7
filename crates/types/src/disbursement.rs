/// Allocation engine output: who gets paid and how much

use serde::{Deserialize, Serialize};
use solana_program::pubkey::Pubkey;

use crate::serde_helpers::{option_pubkey_serde, pubkey_serde};

/// What kind of account a disbursement destination is.
///
/// Wallets get paid through their associated token account (or directly in
/// lamports for native payouts); raw token accounts are paid as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecipientKind {
    #[default]
    Wallet,
    TokenAccount,
}

/// A single payout.
///
/// Serialized as `{address, amount, original_address?, lp?}` for the run
/// audit file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisbursementRecord {
    #[serde(rename = "address", with = "pubkey_serde")]
    pub destination: Pubkey,

    pub amount: u64,

    /// Pool token account whose allocation was redistributed to this LP provider
    #[serde(
        rename = "original_address",
        default,
        with = "option_pubkey_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub origin: Option<Pubkey>,

    /// Share of the pool's LP supply behind this record
    #[serde(rename = "lp", default, skip_serializing_if = "Option::is_none")]
    pub pct: Option<f64>,

    #[serde(skip)]
    pub recipient: RecipientKind,
}

impl DisbursementRecord {
    /// Payout to a holder that owns the tokens directly
    pub fn direct(destination: Pubkey, amount: u64, recipient: RecipientKind) -> Self {
        Self {
            destination,
            amount,
            origin: None,
            pct: None,
            recipient,
        }
    }

    /// Payout to an LP provider on behalf of a pool token account
    pub fn via_pool(provider: Pubkey, amount: u64, pool_account: Pubkey, pct: f64) -> Self {
        Self {
            destination: provider,
            amount,
            origin: Some(pool_account),
            pct: Some(pct),
            recipient: RecipientKind::Wallet,
        }
    }

    pub fn is_indirect(&self) -> bool {
        self.origin.is_some()
    }
}

/// Sum of all record amounts, saturating
pub fn total_amount(records: &[DisbursementRecord]) -> u64 {
    records.iter().fold(0u64, |acc, r| acc.saturating_add(r.amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_serialization_shape() {
        let wallet = Pubkey::new_unique();
        let pool_account = Pubkey::new_unique();
        let records = vec![
            DisbursementRecord::direct(wallet, 100, RecipientKind::Wallet),
            DisbursementRecord::via_pool(wallet, 30, pool_account, 0.6),
        ];

        let value = serde_json::to_value(&records).unwrap();
        let direct = value[0].as_object().unwrap();
        assert_eq!(direct["address"], wallet.to_string());
        assert_eq!(direct["amount"], 100);
        assert!(!direct.contains_key("original_address"));
        assert!(!direct.contains_key("lp"));
        assert!(!direct.contains_key("recipient"));

        let indirect = value[1].as_object().unwrap();
        assert_eq!(indirect["original_address"], pool_account.to_string());
        assert_eq!(indirect["lp"], 0.6);
    }

    #[test]
    fn test_total_amount() {
        let a = DisbursementRecord::direct(Pubkey::new_unique(), 7, RecipientKind::Wallet);
        let b = DisbursementRecord::direct(Pubkey::new_unique(), 5, RecipientKind::TokenAccount);
        assert_eq!(total_amount(&[a, b]), 12);
        assert_eq!(total_amount(&[]), 0);
    }
}
