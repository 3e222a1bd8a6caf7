//! Submitters: the ledger-backed one and the dry-run logger

use async_trait::async_trait;
use reflector_sdk::{Ledger, SignatureStatus};
use solana_sdk::{
    message::{Message, VersionedMessage},
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::VersionedTransaction,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

use crate::{
    batch::TransactionBatch,
    queue::{ErrorClass, SubmitError, TransactionSubmitter},
};

/// Status polls after the blockhash expires while the signature is still unknown
const EXPIRED_UNKNOWN_POLLS: u32 = 3;

/// Status polls after the blockhash expires while the signature is processed
/// but below the commitment
const EXPIRED_PROCESSED_POLLS: u32 = 120;

/// Classify a send-time error message
fn classify_send_error(message: &str) -> ErrorClass {
    let lower = message.to_ascii_lowercase();
    if lower.contains("blockhash not found") || lower.contains("block height exceeded") {
        ErrorClass::Expired
    } else if lower.contains("instruction") || lower.contains("insufficient") {
        ErrorClass::Rejected
    } else {
        ErrorClass::Transient
    }
}

/// Signs with the distribution authority, sends, and polls for confirmation
/// until the blockhash's last valid block height passes.
pub struct LedgerSubmitter {
    ledger: Arc<dyn Ledger>,
    payer: Arc<Keypair>,
    skip_preflight: bool,
    poll_interval: Duration,
}

impl LedgerSubmitter {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        payer: Arc<Keypair>,
        skip_preflight: bool,
        poll_interval: Duration,
    ) -> Self {
        Self {
            ledger,
            payer,
            skip_preflight,
            poll_interval,
        }
    }

    async fn send_and_confirm(
        &self,
        label: &str,
        transaction: VersionedTransaction,
        last_valid_block_height: u64,
    ) -> Result<Signature, SubmitError> {
        let signature = self
            .ledger
            .send_transaction(&transaction, self.skip_preflight)
            .await
            .map_err(|e| {
                let message = e.to_string();
                SubmitError::new(classify_send_error(&message), message)
            })?;
        debug!("{}: sent {}", label, signature);

        // Past the last valid height nothing new can land, but a transaction
        // that already landed may still be short of the commitment
        let mut expired = false;
        let (mut unknown_polls, mut processed_polls) = (0u32, 0u32);
        loop {
            let status = match self.ledger.signature_status(&signature).await {
                Ok(status) => status,
                Err(e) => {
                    debug!("{}: status poll failed: {}", label, e);
                    SignatureStatus::Unknown
                }
            };
            match &status {
                SignatureStatus::Confirmed => return Ok(signature),
                SignatureStatus::Failed(e) => {
                    return Err(SubmitError::rejected(format!("{} failed: {}", signature, e)))
                }
                SignatureStatus::Processed if expired => processed_polls += 1,
                SignatureStatus::Unknown if expired => unknown_polls += 1,
                _ => {}
            }

            if expired {
                if unknown_polls > EXPIRED_UNKNOWN_POLLS
                    || processed_polls > EXPIRED_PROCESSED_POLLS
                {
                    return Err(SubmitError::expired(format!(
                        "{} not confirmed by block height {} ({:?})",
                        signature, last_valid_block_height, status
                    )));
                }
            } else {
                let height = self
                    .ledger
                    .block_height()
                    .await
                    .map_err(|e| SubmitError::transient(e.to_string()))?;
                if height > last_valid_block_height {
                    debug!(
                        "{}: {} past block height {}, waiting for a late status",
                        label, signature, last_valid_block_height
                    );
                    expired = true;
                    continue;
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl TransactionSubmitter for LedgerSubmitter {
    async fn submit(&self, batch: &TransactionBatch) -> Result<Signature, SubmitError> {
        let (blockhash, last_valid_block_height) = self
            .ledger
            .latest_blockhash()
            .await
            .map_err(|e| SubmitError::transient(e.to_string()))?;

        let message = Message::new_with_blockhash(
            &batch.instructions,
            Some(&self.payer.pubkey()),
            &blockhash,
        );
        let transaction =
            VersionedTransaction::try_new(VersionedMessage::Legacy(message), &[self.payer.as_ref()])
                .map_err(|e| SubmitError::rejected(format!("signing: {}", e)))?;

        self.send_and_confirm(&batch.label, transaction, last_valid_block_height)
            .await
    }

    async fn submit_prepared(
        &self,
        label: &str,
        transaction: VersionedTransaction,
    ) -> Result<Signature, SubmitError> {
        // The prepared message carries its own recent blockhash, which is no
        // newer than ours, so our last valid height bounds it from above
        let (_, last_valid_block_height) = self
            .ledger
            .latest_blockhash()
            .await
            .map_err(|e| SubmitError::transient(e.to_string()))?;

        let transaction = VersionedTransaction::try_new(transaction.message, &[self.payer.as_ref()])
            .map_err(|e| SubmitError::rejected(format!("signing: {}", e)))?;

        self.send_and_confirm(label, transaction, last_valid_block_height)
            .await
    }
}

/// Logs what would be sent and reports success without touching the ledger
#[derive(Debug, Default)]
pub struct DryRunSubmitter;

#[async_trait]
impl TransactionSubmitter for DryRunSubmitter {
    async fn submit(&self, batch: &TransactionBatch) -> Result<Signature, SubmitError> {
        info!(
            "[dry run] {}: {} instructions, {} payouts totalling {}",
            batch.label,
            batch.len(),
            batch.records.len(),
            reflector_types::total_amount(&batch.records)
        );
        for record in &batch.records {
            debug!("[dry run]   {} <- {}", record.destination, record.amount);
        }
        Ok(Signature::default())
    }

    async fn submit_prepared(
        &self,
        label: &str,
        transaction: VersionedTransaction,
    ) -> Result<Signature, SubmitError> {
        info!(
            "[dry run] {}: prepared transaction with {} instructions",
            label,
            transaction.message.instructions().len()
        );
        Ok(Signature::default())
    }

    fn is_live(&self) -> bool {
        false
    }
}
