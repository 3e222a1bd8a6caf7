//! Ledger access
//!
//! Everything the reflector reads from or sends to the chain goes through the
//! [`Ledger`] trait so the pipeline can run against an in-memory double.

use async_trait::async_trait;
use solana_account_decoder::UiAccountEncoding;
use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcSendTransactionConfig},
    rpc_filter::{Memcmp, RpcFilterType},
};
use solana_sdk::{
    account::Account,
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use std::{str::FromStr, sync::Arc};
use tracing::debug;

use crate::{
    state::{unpack_mint, unpack_token_account, MintInfo, TokenAccountInfo},
    SdkError, SdkResult,
};

/// Byte comparison filter applied to a program's account space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFilter {
    pub offset: usize,
    pub bytes: Vec<u8>,
}

impl AccountFilter {
    pub fn pubkey_at(offset: usize, key: &Pubkey) -> Self {
        Self {
            offset,
            bytes: key.to_bytes().to_vec(),
        }
    }
}

/// Entry of a mint's largest-holders list
#[derive(Debug, Clone, PartialEq)]
pub struct TokenHolding {
    pub address: Pubkey,
    pub amount: u64,
    pub ui_amount: Option<f64>,
}

/// Where a sent signature stands against the configured commitment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Not known to the node
    Unknown,
    /// Landed, below the configured commitment
    Processed,
    Confirmed,
    /// Landed and failed during execution
    Failed(String),
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn account(&self, address: &Pubkey) -> SdkResult<Option<Account>>;

    async fn multiple_accounts(&self, addresses: &[Pubkey]) -> SdkResult<Vec<Option<Account>>>;

    async fn native_balance(&self, address: &Pubkey) -> SdkResult<u64>;

    async fn largest_token_holders(&self, mint: &Pubkey) -> SdkResult<Vec<TokenHolding>>;

    /// Accounts owned by `program` matching every filter
    async fn program_accounts(
        &self,
        program: &Pubkey,
        filters: Vec<AccountFilter>,
    ) -> SdkResult<Vec<(Pubkey, Account)>>;

    /// Latest blockhash and the last block height it stays valid for
    async fn latest_blockhash(&self) -> SdkResult<(Hash, u64)>;

    async fn block_height(&self) -> SdkResult<u64>;

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        skip_preflight: bool,
    ) -> SdkResult<Signature>;

    async fn signature_status(&self, signature: &Signature) -> SdkResult<SignatureStatus>;

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> SdkResult<u64>;

    /// Raw balance of a token account, `None` if the account does not exist
    async fn token_balance(&self, address: &Pubkey) -> SdkResult<Option<u64>> {
        match self.account(address).await? {
            Some(account) => Ok(Some(unpack_token_account(&account.data)?.amount)),
            None => Ok(None),
        }
    }

    async fn token_account(&self, address: &Pubkey) -> SdkResult<Option<TokenAccountInfo>> {
        match self.account(address).await? {
            Some(account) => Ok(Some(unpack_token_account(&account.data)?)),
            None => Ok(None),
        }
    }

    async fn mint(&self, mint: &Pubkey) -> SdkResult<MintInfo> {
        let account = self
            .account(mint)
            .await?
            .ok_or(SdkError::AccountNotFound(*mint))?;
        unpack_mint(&account)
    }
}

/// [`Ledger`] backed by a JSON-RPC node
pub struct RpcLedger {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl RpcLedger {
    pub fn new(rpc_url: String, commitment: CommitmentConfig) -> Self {
        Self {
            client: Arc::new(RpcClient::new_with_commitment(rpc_url, commitment)),
            commitment,
        }
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn account(&self, address: &Pubkey) -> SdkResult<Option<Account>> {
        let response = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await?;
        Ok(response.value)
    }

    async fn multiple_accounts(&self, addresses: &[Pubkey]) -> SdkResult<Vec<Option<Account>>> {
        let mut accounts = Vec::with_capacity(addresses.len());
        // getMultipleAccounts caps at 100 keys per request
        for chunk in addresses.chunks(100) {
            accounts.extend(self.client.get_multiple_accounts(chunk).await?);
        }
        Ok(accounts)
    }

    async fn native_balance(&self, address: &Pubkey) -> SdkResult<u64> {
        Ok(self.client.get_balance(address).await?)
    }

    async fn largest_token_holders(&self, mint: &Pubkey) -> SdkResult<Vec<TokenHolding>> {
        let balances = self.client.get_token_largest_accounts(mint).await?;
        balances
            .into_iter()
            .map(|entry| {
                let address = Pubkey::from_str(&entry.address)
                    .map_err(|e| SdkError::Deserialization(format!("{}: {}", entry.address, e)))?;
                let amount = entry.amount.amount.parse::<u64>().map_err(|e| {
                    SdkError::Deserialization(format!("amount {}: {}", entry.amount.amount, e))
                })?;
                Ok(TokenHolding {
                    address,
                    amount,
                    ui_amount: entry.amount.ui_amount,
                })
            })
            .collect()
    }

    async fn program_accounts(
        &self,
        program: &Pubkey,
        filters: Vec<AccountFilter>,
    ) -> SdkResult<Vec<(Pubkey, Account)>> {
        let filters = filters
            .iter()
            .map(|f| RpcFilterType::Memcmp(Memcmp::new_base58_encoded(f.offset, &f.bytes)))
            .collect();

        let config = RpcProgramAccountsConfig {
            filters: Some(filters),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(self.commitment),
                ..Default::default()
            },
            ..Default::default()
        };

        let accounts = self
            .client
            .get_program_accounts_with_config(program, config)
            .await?;
        debug!("{} accounts matched under program {}", accounts.len(), program);
        Ok(accounts)
    }

    async fn latest_blockhash(&self) -> SdkResult<(Hash, u64)> {
        Ok(self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await?)
    }

    async fn block_height(&self) -> SdkResult<u64> {
        Ok(self.client.get_block_height().await?)
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        skip_preflight: bool,
    ) -> SdkResult<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight,
            preflight_commitment: Some(self.commitment.commitment),
            ..Default::default()
        };
        Ok(self
            .client
            .send_transaction_with_config(transaction, config)
            .await?)
    }

    async fn signature_status(&self, signature: &Signature) -> SdkResult<SignatureStatus> {
        let response = self.client.get_signature_statuses(&[*signature]).await?;
        let status = match response.value.into_iter().next().flatten() {
            Some(status) => status,
            None => return Ok(SignatureStatus::Unknown),
        };

        if let Some(err) = status.err {
            return Ok(SignatureStatus::Failed(err.to_string()));
        }
        if status.satisfies_commitment(self.commitment) {
            Ok(SignatureStatus::Confirmed)
        } else {
            Ok(SignatureStatus::Processed)
        }
    }

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> SdkResult<u64> {
        Ok(self
            .client
            .get_minimum_balance_for_rent_exemption(data_len)
            .await?)
    }
}
