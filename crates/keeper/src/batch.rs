//! Batch builder
//!
//! Packs instructions into transactions bounded by an instruction count and,
//! optionally, by the serialized size of the resulting transaction.

use reflector_types::DisbursementRecord;
use solana_sdk::{
    instruction::Instruction, message::Message, pubkey::Pubkey, transaction::Transaction,
};
use tracing::{debug, warn};

/// An instruction plus the payout it carries out, if any
#[derive(Debug, Clone)]
pub struct PlannedInstruction {
    pub instruction: Instruction,
    pub record: Option<DisbursementRecord>,
}

impl PlannedInstruction {
    pub fn new(instruction: Instruction) -> Self {
        Self {
            instruction,
            record: None,
        }
    }

    pub fn with_record(instruction: Instruction, record: DisbursementRecord) -> Self {
        Self {
            instruction,
            record: Some(record),
        }
    }
}

impl From<Instruction> for PlannedInstruction {
    fn from(instruction: Instruction) -> Self {
        Self::new(instruction)
    }
}

/// Instructions submitted together as one transaction
#[derive(Debug, Clone)]
pub struct TransactionBatch {
    /// Stage the batch belongs to, for logs
    pub label: String,
    pub instructions: Vec<Instruction>,
    /// Payouts performed by this batch
    pub records: Vec<DisbursementRecord>,
}

impl TransactionBatch {
    pub fn new(label: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        Self {
            label: label.into(),
            instructions,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn destinations(&self) -> Vec<Pubkey> {
        self.records.iter().map(|r| r.destination).collect()
    }
}

/// Serialized size of a legacy transaction holding `instructions`, signatures included
pub fn estimate_transaction_size(instructions: &[Instruction], payer: &Pubkey) -> usize {
    let message = Message::new(instructions, Some(payer));
    let transaction = Transaction::new_unsigned(message);
    bincode::serialized_size(&transaction)
        .map(|size| size as usize)
        .unwrap_or(usize::MAX)
}

#[derive(Debug, Clone, Copy)]
struct SizeLimit {
    payer: Pubkey,
    max_bytes: usize,
}

/// Greedy batch packer
#[derive(Debug)]
pub struct BatchBuilder {
    label: String,
    max_instructions: usize,
    size_limit: Option<SizeLimit>,
    current: Vec<PlannedInstruction>,
    sealed: Vec<TransactionBatch>,
}

impl BatchBuilder {
    pub fn new(label: impl Into<String>, max_instructions: usize) -> Self {
        Self {
            label: label.into(),
            max_instructions: max_instructions.max(1),
            size_limit: None,
            current: Vec::new(),
            sealed: Vec::new(),
        }
    }

    /// Also seal when the serialized transaction would exceed `max_bytes`
    pub fn with_size_limit(mut self, payer: Pubkey, max_bytes: usize) -> Self {
        self.size_limit = Some(SizeLimit { payer, max_bytes });
        self
    }

    pub fn push(&mut self, planned: impl Into<PlannedInstruction>) {
        self.push_group(vec![planned.into()]);
    }

    /// Push instructions that must land in the same transaction, such as an
    /// account creation and the transfer into it
    pub fn push_group(&mut self, group: Vec<PlannedInstruction>) {
        if group.is_empty() {
            return;
        }

        if !self.current.is_empty() && !self.fits(&group) {
            self.seal();
        }

        if self.current.is_empty() && !self.fits(&group) {
            warn!(
                "{}: group of {} instructions exceeds one transaction (limit {} instructions{}), sending alone",
                self.label,
                group.len(),
                self.max_instructions,
                self.size_limit
                    .map(|limit| format!(", {} bytes", limit.max_bytes))
                    .unwrap_or_default()
            );
        }

        self.current.extend(group);
    }

    pub fn extend<I, P>(&mut self, instructions: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PlannedInstruction>,
    {
        for planned in instructions {
            self.push(planned);
        }
    }

    /// Seal the partial batch, if any, and return everything built
    pub fn finish(mut self) -> Vec<TransactionBatch> {
        if !self.current.is_empty() {
            self.seal();
        }
        debug!("{}: packed into {} batches", self.label, self.sealed.len());
        self.sealed
    }

    fn fits(&self, group: &[PlannedInstruction]) -> bool {
        if self.current.len() + group.len() > self.max_instructions {
            return false;
        }

        match self.size_limit {
            Some(limit) => {
                let instructions: Vec<Instruction> = self
                    .current
                    .iter()
                    .chain(group)
                    .map(|p| p.instruction.clone())
                    .collect();
                estimate_transaction_size(&instructions, &limit.payer) <= limit.max_bytes
            }
            None => true,
        }
    }

    fn seal(&mut self) {
        let planned = std::mem::take(&mut self.current);
        let mut batch = TransactionBatch::new(self.label.clone(), Vec::with_capacity(planned.len()));
        for p in planned {
            batch.instructions.push(p.instruction);
            if let Some(record) = p.record {
                batch.records.push(record);
            }
        }
        self.sealed.push(batch);
    }
}

/// Pack `instructions` into batches of at most `max_per_batch`
pub fn build_batches<P: Into<PlannedInstruction>>(
    label: &str,
    instructions: impl IntoIterator<Item = P>,
    max_per_batch: usize,
) -> Vec<TransactionBatch> {
    let mut builder = BatchBuilder::new(label, max_per_batch);
    builder.extend(instructions);
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflector_types::RecipientKind;
    use solana_sdk::system_instruction;

    fn transfers(n: usize) -> Vec<Instruction> {
        let from = Pubkey::new_unique();
        (0..n)
            .map(|i| system_instruction::transfer(&from, &Pubkey::new_unique(), i as u64 + 1))
            .collect()
    }

    #[test]
    fn test_empty_input_yields_no_batches() {
        assert!(build_batches("t", Vec::<Instruction>::new(), 18).is_empty());
    }

    #[test]
    fn test_exactly_max_is_one_batch() {
        let batches = build_batches("t", transfers(18), 18);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 18);
    }

    #[test]
    fn test_batches_respect_bound_and_preserve_order() {
        let instructions = transfers(41);
        let batches = build_batches("t", instructions.clone(), 18);

        assert_eq!(batches.iter().map(|b| b.len()).collect::<Vec<_>>(), vec![18, 18, 5]);
        assert!(batches.iter().all(|b| b.len() <= 18 && !b.is_empty()));

        let flattened: Vec<Instruction> =
            batches.into_iter().flat_map(|b| b.instructions).collect();
        assert_eq!(flattened, instructions);
    }

    #[test]
    fn test_records_follow_their_instructions() {
        let mut builder = BatchBuilder::new("reflect", 2);
        for ix in transfers(3) {
            let record =
                DisbursementRecord::direct(ix.accounts[1].pubkey, 1, RecipientKind::Wallet);
            builder.push(PlannedInstruction::with_record(ix, record));
        }
        builder.push(transfers(1).remove(0));

        let batches = builder.finish();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].records.len(), 2);
        assert_eq!(batches[1].records.len(), 1);
        assert_eq!(batches[1].len(), 2);
        assert_eq!(batches[1].destinations()[0], batches[1].instructions[0].accounts[1].pubkey);
    }

    #[test]
    fn test_size_limit_seals_before_count() {
        let payer = Pubkey::new_unique();
        let instructions: Vec<Instruction> = (0..40)
            .map(|_| system_instruction::transfer(&payer, &Pubkey::new_unique(), 1))
            .collect();

        let mut builder = BatchBuilder::new("t", 100).with_size_limit(payer, 1232);
        builder.extend(instructions.clone());
        let batches = builder.finish();

        assert!(batches.len() > 1);
        for batch in &batches {
            assert!(estimate_transaction_size(&batch.instructions, &payer) <= 1232);
        }
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, instructions.len());
    }

    #[test]
    fn test_group_is_never_split() {
        let mut builder = BatchBuilder::new("reflect", 3);
        builder.extend(transfers(2));
        let mut group: Vec<PlannedInstruction> =
            transfers(2).into_iter().map(PlannedInstruction::from).collect();
        let destination = group[1].instruction.accounts[1].pubkey;
        group[1].record = Some(DisbursementRecord::direct(destination, 5, RecipientKind::Wallet));
        builder.push_group(group);

        let batches = builder.finish();
        assert_eq!(batches.iter().map(|b| b.len()).collect::<Vec<_>>(), vec![2, 2]);
        assert_eq!(batches[1].destinations(), vec![destination]);
    }

    #[test]
    fn test_oversized_instruction_goes_alone() {
        let payer = Pubkey::new_unique();
        let big = Instruction::new_with_bytes(Pubkey::new_unique(), &[0u8; 1300], vec![]);

        let mut builder = BatchBuilder::new("t", 10).with_size_limit(payer, 1232);
        builder.push(transfers(1).remove(0));
        builder.push(big);
        builder.push(transfers(1).remove(0));
        let batches = builder.finish();

        assert_eq!(batches.iter().map(|b| b.len()).collect::<Vec<_>>(), vec![1, 1, 1]);
    }
}
