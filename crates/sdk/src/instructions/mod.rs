/// Instruction builders for the token programs and the token-swap program
pub mod swap;
pub mod token;

pub use swap::{pool_authority, swap_exact_in, SwapAccounts, SwapData};
pub use token::*;
