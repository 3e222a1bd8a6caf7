pub mod allocation;
pub mod batch;
pub mod config;
pub mod distributor;
pub mod error;
pub mod fees;
pub mod pools;
pub mod queue;
pub mod reclaim;
pub mod report;
pub mod submitter;
pub mod swap;
pub mod withheld;

pub use allocation::{allocate, rate_per_token, without_excluded};
pub use batch::{build_batches, BatchBuilder, PlannedInstruction, TransactionBatch};
pub use config::{DistributorConfig, FeesConfig, RetryConfig};
pub use distributor::Distributor;
pub use error::{KeeperError, KeeperResult};
pub use fees::FeeSplit;
pub use pools::{PoolResolver, ResolvedPools};
pub use queue::{ErrorClass, ExecutionQueue, ExecutionReport, SubmitError, TransactionSubmitter};
pub use report::{RunSummary, StageOutcome};
pub use submitter::{DryRunSubmitter, LedgerSubmitter};
pub use swap::{SwapAdapter, SwapOutcome};
pub use withheld::{scan_withheld, WithheldSummary};
