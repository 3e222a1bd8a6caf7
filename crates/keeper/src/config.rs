use reflector_types::{
    serde_helpers::{option_pubkey_serde, pubkey_serde, pubkey_vec_serde},
    DEFAULT_AGGREGATOR_URL, DEFAULT_HOLDER_API_URL, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_HEAVY_PER_TX, DEFAULT_MAX_TRANSFERS_PER_TX, DEFAULT_RECLAIM_ACCOUNTS_PER_IX,
    DEFAULT_SIGNATURE_FEE_LAMPORTS, MAX_TRANSACTION_BYTES, SWAP_PROGRAM_ID, WSOL_MINT,
};
use serde::{Deserialize, Serialize};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey, pubkey::Pubkey};
use std::{fs, path::Path, str::FromStr};

use crate::error::{KeeperError, KeeperResult};

/// Distributor configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DistributorConfig {
    /// RPC endpoint of the cluster
    pub rpc_url: String,

    /// Commitment level used for reads and confirmations
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Mint whose transfer fees are collected
    #[serde(with = "pubkey_serde")]
    pub token_mint: Pubkey,

    /// Mint bought and burned with the burn share; no burn stage when unset
    #[serde(default, with = "option_pubkey_serde", skip_serializing_if = "Option::is_none")]
    pub burn_mint: Option<Pubkey>,

    /// Mint the burn share is first swapped into through the on-chain pool
    #[serde(default = "default_intermediary", with = "pubkey_serde")]
    pub intermediary_mint: Pubkey,

    /// Mint paid out to holders, defaults to `token_mint`
    #[serde(default, with = "option_pubkey_serde", skip_serializing_if = "Option::is_none")]
    pub reflection_mint: Option<Pubkey>,

    #[serde(with = "pubkey_serde")]
    pub dao_address: Pubkey,

    #[serde(with = "pubkey_serde")]
    pub dev_address: Pubkey,

    /// Token-swap program holding the pools
    #[serde(default = "default_swap_program", with = "pubkey_serde")]
    pub swap_program_id: Pubkey,

    /// Holder token accounts that never receive reflection
    #[serde(default, with = "pubkey_vec_serde")]
    pub exclude: Vec<Pubkey>,

    /// Where the run's disbursement records are written
    #[serde(default = "default_output_path")]
    pub output_path: String,

    #[serde(default)]
    pub fees: FeesConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub swap: SwapConfig,

    #[serde(default)]
    pub holders: HoldersConfig,
}

/// Fee split: every stream's numerator is taken over `total_pct`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeesConfig {
    pub total_pct: f64,
    pub dao_pct: f64,
    pub dev_pct: f64,
    pub burn_pct: f64,
    pub reflect_pct: f64,
}

/// Transaction packing limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Instruction cap for light transfer instructions
    pub max_transfers_per_tx: usize,

    /// Instruction cap for instructions with many accounts
    pub max_heavy_per_tx: usize,

    /// Source accounts per withdraw-withheld instruction
    pub reclaim_accounts_per_ix: usize,

    /// Seal batches on serialized size as well as instruction count
    pub estimate_size: bool,

    /// Serialized transaction ceiling in bytes
    pub max_tx_bytes: usize,
}

/// Retry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Attempts per transaction before it is dead-lettered
    pub max_attempts: u32,

    /// Base delay between retries in milliseconds
    pub base_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,

    /// Re-submit dead letters once after the primary pass
    pub retry_dead_letters: bool,

    /// Interval between confirmation polls in milliseconds
    pub confirm_poll_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SwapConfig {
    pub slippage_bps: u16,
    pub aggregator_url: String,
    /// Fee paid by the swap transaction, credited back to realized native output
    pub signature_fee_lamports: u64,
    pub skip_preflight: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HoldersConfig {
    pub api_url: String,
    pub page_size: usize,
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_intermediary() -> Pubkey {
    WSOL_MINT
}

fn default_swap_program() -> Pubkey {
    SWAP_PROGRAM_ID
}

fn default_output_path() -> String {
    "disbursements.json".to_string()
}

impl DistributorConfig {
    /// Load configuration from TOML file
    pub fn load(path: impl AsRef<Path>) -> KeeperResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            KeeperError::Io(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: DistributorConfig = toml::from_str(&content).map_err(|e| {
            KeeperError::InvalidConfig(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> KeeperResult<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> KeeperResult<()> {
        if self.rpc_url.is_empty() {
            return Err(invalid("rpc_url", "empty", "an RPC endpoint"));
        }

        self.commitment_config()?;

        if self.token_mint == Pubkey::default() {
            return Err(invalid("token_mint", "default pubkey", "a mint address"));
        }

        if self.output_path.is_empty() {
            return Err(invalid("output_path", "empty", "a file path"));
        }

        self.fees.validate()?;
        self.batch.validate()?;
        self.retry.validate()?;
        self.swap.validate()?;
        self.holders.validate()?;

        Ok(())
    }

    pub fn commitment_config(&self) -> KeeperResult<CommitmentConfig> {
        CommitmentConfig::from_str(&self.commitment)
            .map_err(|_| invalid("commitment", &self.commitment, "processed, confirmed or finalized"))
    }

    /// Mint paid out to holders
    pub fn reflection_mint(&self) -> Pubkey {
        self.reflection_mint.unwrap_or(self.token_mint)
    }
}

impl FeesConfig {
    /// Validate fee split
    fn validate(&self) -> KeeperResult<()> {
        if !(self.total_pct > 0.0) {
            return Err(invalid("fees.total_pct", &self.total_pct.to_string(), "greater than 0"));
        }

        let shares = [
            ("fees.dao_pct", self.dao_pct),
            ("fees.dev_pct", self.dev_pct),
            ("fees.burn_pct", self.burn_pct),
            ("fees.reflect_pct", self.reflect_pct),
        ];
        for (name, value) in shares {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(invalid(name, &value.to_string(), "a finite value >= 0"));
            }
        }

        let sum = self.dao_pct + self.dev_pct + self.burn_pct + self.reflect_pct;
        if sum > self.total_pct + 1e-9 {
            return Err(invalid(
                "fees",
                &sum.to_string(),
                &format!("shares summing to at most total_pct ({})", self.total_pct),
            ));
        }

        Ok(())
    }
}

impl BatchConfig {
    fn validate(&self) -> KeeperResult<()> {
        if self.max_transfers_per_tx == 0 {
            return Err(invalid("batch.max_transfers_per_tx", "0", "greater than 0"));
        }

        if self.max_heavy_per_tx == 0 {
            return Err(invalid("batch.max_heavy_per_tx", "0", "greater than 0"));
        }

        if self.reclaim_accounts_per_ix == 0 {
            return Err(invalid("batch.reclaim_accounts_per_ix", "0", "greater than 0"));
        }

        if self.max_tx_bytes == 0 || self.max_tx_bytes > MAX_TRANSACTION_BYTES {
            return Err(invalid(
                "batch.max_tx_bytes",
                &self.max_tx_bytes.to_string(),
                &format!("between 1 and {}", MAX_TRANSACTION_BYTES),
            ));
        }

        Ok(())
    }
}

impl RetryConfig {
    /// Validate retry configuration
    fn validate(&self) -> KeeperResult<()> {
        if self.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "0", "greater than 0"));
        }

        if self.base_delay_ms == 0 {
            return Err(invalid("retry.base_delay_ms", "0", "greater than 0"));
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err(invalid(
                "retry.max_delay_ms",
                &self.max_delay_ms.to_string(),
                &format!("greater than or equal to base_delay_ms ({})", self.base_delay_ms),
            ));
        }

        if self.backoff_multiplier <= 1.0 {
            return Err(invalid(
                "retry.backoff_multiplier",
                &self.backoff_multiplier.to_string(),
                "greater than 1.0",
            ));
        }

        Ok(())
    }

    /// Calculate delay for retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return self.base_delay_ms;
        }

        let exponential_delay =
            self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        (exponential_delay as u64).min(self.max_delay_ms)
    }
}

impl SwapConfig {
    fn validate(&self) -> KeeperResult<()> {
        if u64::from(self.slippage_bps) > reflector_types::BPS_DENOMINATOR {
            return Err(invalid(
                "swap.slippage_bps",
                &self.slippage_bps.to_string(),
                "at most 10000 (100%)",
            ));
        }

        if self.aggregator_url.is_empty() {
            return Err(invalid("swap.aggregator_url", "empty", "an aggregator base URL"));
        }

        Ok(())
    }
}

impl HoldersConfig {
    fn validate(&self) -> KeeperResult<()> {
        if self.api_url.is_empty() {
            return Err(invalid("holders.api_url", "empty", "a holder API base URL"));
        }

        if self.page_size == 0 {
            return Err(invalid("holders.page_size", "0", "greater than 0"));
        }

        Ok(())
    }
}

fn invalid(name: &str, value: &str, expected: &str) -> KeeperError {
    KeeperError::InvalidConfig(format!("{} = {}: expected {}", name, value, expected))
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            total_pct: 6.9,
            dao_pct: 0.1,
            dev_pct: 0.3,
            burn_pct: 1.5,
            reflect_pct: 5.0,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_transfers_per_tx: DEFAULT_MAX_TRANSFERS_PER_TX,
            max_heavy_per_tx: DEFAULT_MAX_HEAVY_PER_TX,
            reclaim_accounts_per_ix: DEFAULT_RECLAIM_ACCOUNTS_PER_IX,
            estimate_size: true,
            max_tx_bytes: MAX_TRANSACTION_BYTES,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            retry_dead_letters: true,
            confirm_poll_ms: 500,
        }
    }
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            slippage_bps: 50,
            aggregator_url: DEFAULT_AGGREGATOR_URL.to_string(),
            signature_fee_lamports: DEFAULT_SIGNATURE_FEE_LAMPORTS,
            skip_preflight: true,
        }
    }
}

impl Default for HoldersConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_HOLDER_API_URL.to_string(),
            page_size: 1000,
        }
    }
}

/// Create example configuration file
pub fn create_example_config(path: impl AsRef<Path>) -> KeeperResult<()> {
    let example_config = DistributorConfig {
        rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
        commitment: default_commitment(),
        token_mint: pubkey!("EJnCTVdGkYocPpei7rjTcuiWPkretrku8N1wvuvfL99F"),
        burn_mint: Some(pubkey!("DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263")),
        intermediary_mint: WSOL_MINT,
        reflection_mint: None,
        dao_address: pubkey!("DBR2ZUvjZTcgy6R9US64t96pBEZMyr9DPW6G2scrctQK"),
        dev_address: pubkey!("AZRMSXfBrGwpWHLC2ZPnbs4YdGD5ezvS1eAyDyRWt1E2"),
        swap_program_id: SWAP_PROGRAM_ID,
        exclude: vec![],
        output_path: default_output_path(),
        fees: FeesConfig::default(),
        batch: BatchConfig::default(),
        retry: RetryConfig::default(),
        swap: SwapConfig::default(),
        holders: HoldersConfig::default(),
    };

    example_config.save(path)?;
    Ok(())
}
