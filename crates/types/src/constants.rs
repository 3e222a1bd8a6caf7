/// Program ids, well-known mints and sizing constants used across the reflector

use solana_program::{pubkey, pubkey::Pubkey};

// ============================================================================
// Programs and Mints
// ============================================================================

/// FluxBeam token-swap program (SPL token-swap fork with Token-2022 support)
pub const SWAP_PROGRAM_ID: Pubkey = pubkey!("FLUXubRmkEi2q6K3Y9kBPg9248ggaZVsoSFhtJHSrm1X");

/// Wrapped SOL mint, also the default intermediary of the burn route
pub const WSOL_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");

// ============================================================================
// External Services
// ============================================================================

/// Default holder directory base URL
pub const DEFAULT_HOLDER_API_URL: &str = "https://api.fluxbeam.xyz/v1";

/// Default aggregator base URL (quote + swap endpoints live below it)
pub const DEFAULT_AGGREGATOR_URL: &str = "https://quote-api.jup.ag/v6";

// ============================================================================
// Transaction Sizing
// ============================================================================

/// Maximum serialized transaction size accepted by the ledger
pub const MAX_TRANSACTION_BYTES: usize = 1232;

/// Safe instruction count for light transfer instructions
pub const DEFAULT_MAX_TRANSFERS_PER_TX: usize = 18;

/// Safe instruction count for instructions with many account references
pub const DEFAULT_MAX_HEAVY_PER_TX: usize = 10;

/// Maximum source accounts passed to one withdraw-withheld instruction
pub const DEFAULT_RECLAIM_ACCOUNTS_PER_IX: usize = 20;

/// Attempts before a transaction is dead-lettered
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Lamports charged per transaction signature
pub const DEFAULT_SIGNATURE_FEE_LAMPORTS: u64 = 5_000;

/// Basis points denominator (10,000 = 100%)
pub const BPS_DENOMINATOR: u64 = 10_000;
