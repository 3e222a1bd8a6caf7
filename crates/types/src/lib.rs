/// Shared types for the fee reflector
///
/// This crate provides the data model that flows between the holder
/// directory, the pool resolver, the allocation engine and the batch builder,
/// together with program ids and the token-swap pool account layout.

pub mod constants;
pub mod disbursement;
pub mod errors;
pub mod holder;
pub mod pool;
pub mod serde_helpers;

// Re-export all public types
pub use constants::*;
pub use disbursement::*;
pub use errors::*;
pub use holder::*;
pub use pool::*;

/// Result type alias using the shared layout error type
pub type LayoutResult<T> = std::result::Result<T, LayoutError>;
