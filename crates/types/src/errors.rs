use solana_program::pubkey::Pubkey;
use thiserror::Error;

/// Errors raised while decoding on-chain account layouts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    /// Account data shorter than the layout requires
    #[error("Account {account} too short: {len} bytes, expected at least {expected}")]
    TooShort { account: Pubkey, len: usize, expected: usize },

    /// Pool account flagged as uninitialized
    #[error("Pool {account} is not initialized")]
    NotInitialized { account: Pubkey },

    /// A pubkey field could not be read
    #[error("Invalid pubkey at offset {offset} in {account}")]
    InvalidPubkey { account: Pubkey, offset: usize },
}
