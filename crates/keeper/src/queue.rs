//! Execution queue
//!
//! Submits batches one at a time. Failures are requeued until the attempt cap
//! is reached and then dead-lettered; an optional second pass re-submits every
//! dead letter once.

use async_trait::async_trait;
use solana_sdk::{signature::Signature, transaction::VersionedTransaction};
use std::{collections::VecDeque, fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{batch::TransactionBatch, config::RetryConfig};

/// How a submission failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network, RPC or congestion trouble
    Transient,
    /// Blockhash expired before the transaction confirmed
    Expired,
    /// The ledger refused or failed the transaction
    Rejected,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Expired => write!(f, "expired"),
            ErrorClass::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{class}: {message}")]
pub struct SubmitError {
    pub class: ErrorClass,
    pub message: String,
}

impl SubmitError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Transient, message)
    }

    pub fn expired(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Expired, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Rejected, message)
    }
}

/// Sends one transaction and waits for its confirmation
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Sign and submit a batch built by this process
    async fn submit(&self, batch: &TransactionBatch) -> Result<Signature, SubmitError>;

    /// Sign and submit a transaction built elsewhere (aggregator swaps)
    async fn submit_prepared(
        &self,
        label: &str,
        transaction: VersionedTransaction,
    ) -> Result<Signature, SubmitError>;

    /// Whether submissions actually reach the ledger
    fn is_live(&self) -> bool {
        true
    }
}

/// A batch waiting in the queue
#[derive(Debug, Clone)]
pub struct QueuedTransaction {
    pub batch: TransactionBatch,
    pub attempts: u32,
}

/// Outcome of draining the queue
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub succeeded: Vec<Signature>,
    pub failed: Vec<TransactionBatch>,
}

impl ExecutionReport {
    pub fn merge(&mut self, other: ExecutionReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ExecutionQueue {
    submitter: Arc<dyn TransactionSubmitter>,
    retry: RetryConfig,
    pending: VecDeque<QueuedTransaction>,
    dead_letters: Vec<QueuedTransaction>,
    succeeded: Vec<Signature>,
}

impl ExecutionQueue {
    pub fn new(submitter: Arc<dyn TransactionSubmitter>, retry: RetryConfig) -> Self {
        Self {
            submitter,
            retry,
            pending: VecDeque::new(),
            dead_letters: Vec::new(),
            succeeded: Vec::new(),
        }
    }

    pub fn enqueue(&mut self, batch: TransactionBatch) {
        if batch.is_empty() {
            return;
        }
        self.pending.push_back(QueuedTransaction { batch, attempts: 0 });
    }

    pub fn pending(&self) -> &VecDeque<QueuedTransaction> {
        &self.pending
    }

    pub fn dead_letters(&self) -> &[QueuedTransaction] {
        &self.dead_letters
    }

    /// Drain the pending queue, requeueing failures until the attempt cap
    pub async fn run(&mut self) {
        while let Some(mut item) = self.pending.pop_front() {
            item.attempts += 1;
            let attempt = item.attempts;

            match self.submitter.submit(&item.batch).await {
                Ok(signature) => {
                    info!(
                        "{}: {} instructions confirmed on attempt {}: {}",
                        item.batch.label,
                        item.batch.len(),
                        attempt,
                        signature
                    );
                    self.succeeded.push(signature);
                }
                Err(e) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt - 1);
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {}ms",
                        item.batch.label, attempt, self.retry.max_attempts, e, delay
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    self.pending.push_back(item);
                }
                Err(e) => {
                    error!(
                        "{}: giving up after {} attempts ({}); destinations: {:?}",
                        item.batch.label,
                        attempt,
                        e,
                        item.batch.destinations()
                    );
                    self.dead_letters.push(item);
                }
            }
        }
    }

    /// Submit every dead letter once more; the ones that fail again stay dead
    pub async fn retry_dead_letters(&mut self) {
        if self.dead_letters.is_empty() {
            return;
        }

        info!("Retrying {} dead-lettered transactions", self.dead_letters.len());
        let dead = std::mem::take(&mut self.dead_letters);
        for mut item in dead {
            item.attempts += 1;
            match self.submitter.submit(&item.batch).await {
                Ok(signature) => {
                    info!("{}: recovered on retry pass: {}", item.batch.label, signature);
                    self.succeeded.push(signature);
                }
                Err(e) => {
                    error!(
                        "{}: retry pass failed ({}); destinations: {:?}",
                        item.batch.label,
                        e,
                        item.batch.destinations()
                    );
                    self.dead_letters.push(item);
                }
            }
        }
    }

    /// Consume the queue into its report
    pub fn into_report(self) -> ExecutionReport {
        ExecutionReport {
            succeeded: self.succeeded,
            failed: self.dead_letters.into_iter().map(|q| q.batch).collect(),
        }
    }

    /// Queue `batches`, drain them, run the dead-letter pass if configured
    pub async fn submit_all(
        submitter: Arc<dyn TransactionSubmitter>,
        retry: RetryConfig,
        batches: Vec<TransactionBatch>,
    ) -> ExecutionReport {
        let retry_pass = retry.retry_dead_letters;
        let mut queue = Self::new(submitter, retry);
        for batch in batches {
            queue.enqueue(batch);
        }

        queue.run().await;
        if retry_pass {
            queue.retry_dead_letters().await;
        }
        queue.into_report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{pubkey::Pubkey, system_instruction};
    use std::sync::Mutex;

    /// Fails the first `failures` submissions of every batch label
    struct ScriptedSubmitter {
        failures: u32,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedSubmitter {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls_for(&self, label: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|l| *l == label).count()
        }
    }

    #[async_trait]
    impl TransactionSubmitter for ScriptedSubmitter {
        async fn submit(&self, batch: &TransactionBatch) -> Result<Signature, SubmitError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(batch.label.clone());
            let seen = calls.iter().filter(|l| **l == batch.label).count() as u32;
            if seen <= self.failures {
                Err(SubmitError::transient("node is behind"))
            } else {
                Ok(Signature::new_unique())
            }
        }

        async fn submit_prepared(
            &self,
            _label: &str,
            _transaction: VersionedTransaction,
        ) -> Result<Signature, SubmitError> {
            Ok(Signature::new_unique())
        }
    }

    fn batch(label: &str) -> TransactionBatch {
        let ix = system_instruction::transfer(&Pubkey::new_unique(), &Pubkey::new_unique(), 1);
        TransactionBatch::new(label, vec![ix])
    }

    fn retry(retry_dead_letters: bool) -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
            backoff_multiplier: 2.0,
            retry_dead_letters,
            confirm_poll_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_always_failing_is_attempted_max_times() {
        let submitter = Arc::new(ScriptedSubmitter::new(u32::MAX));
        let mut queue = ExecutionQueue::new(submitter.clone(), retry(false));
        queue.enqueue(batch("doomed"));
        queue.run().await;

        assert_eq!(submitter.calls_for("doomed"), 3);
        assert!(queue.pending().is_empty());
        assert_eq!(queue.dead_letters().len(), 1);
        assert_eq!(queue.dead_letters()[0].attempts, 3);

        let report = queue.into_report();
        assert!(report.succeeded.is_empty());
        assert_eq!(report.failed.len(), 1);
    }

    #[tokio::test]
    async fn test_success_on_second_attempt_leaves_no_trace() {
        let submitter = Arc::new(ScriptedSubmitter::new(1));
        let mut queue = ExecutionQueue::new(submitter.clone(), retry(true));
        queue.enqueue(batch("flaky"));
        queue.run().await;

        assert_eq!(submitter.calls_for("flaky"), 2);
        assert!(queue.pending().is_empty());
        assert!(queue.dead_letters().is_empty());
        assert_eq!(queue.into_report().succeeded.len(), 1);
    }

    #[tokio::test]
    async fn test_dead_letter_pass_recovers_transient_failures() {
        // Fails three times, then succeeds on the extra pass
        let submitter = Arc::new(ScriptedSubmitter::new(3));
        let report =
            ExecutionQueue::submit_all(submitter.clone(), retry(true), vec![batch("late")]).await;

        assert_eq!(submitter.calls_for("late"), 4);
        assert_eq!(report.succeeded.len(), 1);
        assert!(report.all_succeeded());
    }

    #[tokio::test]
    async fn test_batches_are_processed_in_order() {
        let submitter = Arc::new(ScriptedSubmitter::new(0));
        let batches = vec![batch("a"), batch("b"), batch("c")];
        let report = ExecutionQueue::submit_all(submitter.clone(), retry(true), batches).await;

        assert_eq!(report.succeeded.len(), 3);
        assert_eq!(*submitter.calls.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_batches_are_not_queued() {
        let submitter = Arc::new(ScriptedSubmitter::new(0));
        let mut queue = ExecutionQueue::new(submitter.clone(), retry(true));
        queue.enqueue(TransactionBatch::new("empty", vec![]));
        assert!(queue.pending().is_empty());
    }
}
