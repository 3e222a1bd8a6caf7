/// Token holder snapshot returned by the holder directory

use serde::{Deserialize, Serialize};
use solana_program::pubkey::Pubkey;

use crate::serde_helpers::{amount_serde, option_pubkey_serde, pubkey_serde};

/// One token account holding the tracked mint.
///
/// `address` is the token account; `owner` is the wallet behind it when the
/// directory was able to resolve it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holder {
    #[serde(with = "pubkey_serde")]
    pub address: Pubkey,

    #[serde(deserialize_with = "amount_serde::deserialize")]
    pub amount: u64,

    #[serde(default, with = "option_pubkey_serde", skip_serializing_if = "Option::is_none")]
    pub owner: Option<Pubkey>,
}

impl Holder {
    pub fn new(address: Pubkey, amount: u64, owner: Option<Pubkey>) -> Self {
        Self { address, amount, owner }
    }

    /// Wallet that should receive payouts, falling back to the token account
    pub fn payout_address(&self) -> Pubkey {
        self.owner.unwrap_or(self.address)
    }
}
