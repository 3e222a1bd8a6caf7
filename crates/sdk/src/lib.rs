/// Reflector SDK
///
/// Client-side plumbing for the fee reflector:
/// - Ledger access (RPC-backed, with an in-memory double behind `testing`)
/// - Holder directory (paged HTTP indexer)
/// - Swap aggregator (quote and pre-built swap transactions)
/// - Instruction builders for token, Token-2022 fee and token-swap programs

pub mod aggregator;
pub mod directory;
pub mod error;
pub mod instructions;
pub mod ledger;
pub mod state;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(test)]
mod test_server;

pub use aggregator::{decode_swap_transaction, JupiterClient, Quote, SwapAggregator};
pub use directory::{HolderDirectory, HttpHolderDirectory, StaticHolderDirectory};
pub use error::{SdkError, SdkResult};
pub use ledger::{AccountFilter, Ledger, RpcLedger, SignatureStatus, TokenHolding};
pub use state::{MintInfo, TokenAccountInfo};

// Re-export shared types
pub use reflector_types::*;
