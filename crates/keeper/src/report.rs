//! Run output: the disbursement audit file and the end-of-run summary

use chrono::{DateTime, Utc};
use reflector_types::DisbursementRecord;
use serde::Serialize;
use std::{fmt, fs, path::Path};
use tracing::{error, info, warn};

use crate::{error::KeeperResult, queue::ExecutionReport};

/// Write `records` as a pretty-printed JSON array
pub fn write_disbursements(path: impl AsRef<Path>, records: &[DisbursementRecord]) -> KeeperResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(records)?)?;
    info!("Wrote {} disbursement records to {}", records.len(), path.display());
    Ok(())
}

pub fn read_disbursements(path: impl AsRef<Path>) -> KeeperResult<Vec<DisbursementRecord>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    Skipped(String),
    Failed(String),
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutcome::Completed => write!(f, "completed"),
            StageOutcome::Skipped(reason) => write!(f, "skipped ({})", reason),
            StageOutcome::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub name: String,
    pub outcome: StageOutcome,
    pub succeeded: usize,
    pub failed: usize,
}

/// What one distribution run did
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub collected: u64,
    pub dust: u64,
    pub disbursed: u64,
    pub records: usize,
    pub stages: Vec<StageReport>,
    pub output_path: String,
}

impl RunSummary {
    pub fn new(output_path: impl Into<String>) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            collected: 0,
            dust: 0,
            disbursed: 0,
            records: 0,
            stages: Vec::new(),
            output_path: output_path.into(),
        }
    }

    /// Record a stage driven through the execution queue
    pub fn record_execution(&mut self, name: &str, report: &ExecutionReport) {
        let outcome = if report.all_succeeded() {
            StageOutcome::Completed
        } else {
            StageOutcome::Failed(format!("{} batches dead-lettered", report.failed.len()))
        };
        self.stages.push(StageReport {
            name: name.to_string(),
            outcome,
            succeeded: report.succeeded.len(),
            failed: report.failed.len(),
        });
    }

    pub fn record_skipped(&mut self, name: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("Skipping {}: {}", name, reason);
        self.stages.push(StageReport {
            name: name.to_string(),
            outcome: StageOutcome::Skipped(reason),
            succeeded: 0,
            failed: 0,
        });
    }

    pub fn record_failed(&mut self, name: &str, reason: impl Into<String>) {
        let reason = reason.into();
        error!("{} failed: {}", name, reason);
        self.stages.push(StageReport {
            name: name.to_string(),
            outcome: StageOutcome::Failed(reason),
            succeeded: 0,
            failed: 1,
        });
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn succeeded_batches(&self) -> usize {
        self.stages.iter().map(|s| s.succeeded).sum()
    }

    pub fn failed_batches(&self) -> usize {
        self.stages.iter().map(|s| s.failed).sum()
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn log(&self) {
        let elapsed = self
            .finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
            .unwrap_or_default();
        info!(
            "Run finished in {}ms: collected {}, disbursed {} across {} records, dust {}",
            elapsed, self.collected, self.disbursed, self.records, self.dust
        );
        for stage in &self.stages {
            info!(
                "  {}: {} ({} ok, {} failed)",
                stage.name, stage.outcome, stage.succeeded, stage.failed
            );
        }
        info!(
            "Batches: {} succeeded, {} failed; records at {}",
            self.succeeded_batches(),
            self.failed_batches(),
            self.output_path
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflector_types::RecipientKind;
    use solana_sdk::pubkey::Pubkey;

    #[test]
    fn test_output_file_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("disbursements.json");
        let pool_account = Pubkey::new_unique();
        let records = vec![
            DisbursementRecord::direct(Pubkey::new_unique(), 100, RecipientKind::Wallet),
            DisbursementRecord::via_pool(Pubkey::new_unique(), 30, pool_account, 0.6),
        ];

        write_disbursements(&path, &records).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let entries = value.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["amount"], 100);
        assert!(entries[0].get("original_address").is_none());
        assert_eq!(entries[1]["original_address"], pool_account.to_string());
        assert_eq!(entries[1]["lp"], 0.6);

        let read_back = read_disbursements(&path).unwrap();
        assert_eq!(read_back[1].origin, Some(pool_account));
    }

    #[test]
    fn test_summary_counts_batches() {
        let mut summary = RunSummary::new("out.json");
        summary.record_execution(
            "reflect",
            &ExecutionReport {
                succeeded: vec![Default::default(), Default::default()],
                failed: vec![],
            },
        );
        summary.record_skipped("burn", "no burn mint configured");
        summary.finish();

        assert_eq!(summary.succeeded_batches(), 2);
        assert_eq!(summary.failed_batches(), 0);
        assert_eq!(summary.stage("reflect").unwrap().outcome, StageOutcome::Completed);
        assert!(matches!(summary.stage("burn").unwrap().outcome, StageOutcome::Skipped(_)));
    }
}
