//! In-memory ledger for exercising the pipeline without a cluster

use async_trait::async_trait;
use solana_program::program_pack::Pack;
use solana_sdk::{
    account::Account, hash::Hash, pubkey::Pubkey, rent::Rent, signature::Signature,
    transaction::VersionedTransaction,
};
use spl_token_2022::{
    extension::{
        transfer_fee::TransferFeeAmount, BaseStateWithExtensionsMut, ExtensionType,
        StateWithExtensionsMut,
    },
    state::{Account as TokenAccount, AccountState, Mint},
};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use crate::{
    ledger::{AccountFilter, Ledger, SignatureStatus, TokenHolding},
    state::{is_token_program, unpack_token_account},
    SdkError, SdkResult,
};

/// Scripted result of the next `send_transaction`
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Accepted and confirmed on the first status poll
    Confirm,
    /// Rejected by the node before landing
    Reject(String),
    /// Landed but failed during execution
    FailOnChain(String),
    /// Accepted but never reaches the commitment level
    NeverConfirm,
    /// Landed, reported as processed for this many polls before confirming
    ConfirmAfterPolls(u32),
    /// Landed, unknown to status polls for this many polls before confirming
    VisibleAfterPolls(u32),
}

impl SendOutcome {
    fn lands(&self) -> bool {
        matches!(
            self,
            SendOutcome::Confirm
                | SendOutcome::ConfirmAfterPolls(_)
                | SendOutcome::VisibleAfterPolls(_)
        )
    }
}

/// Account updates applied when a transaction confirms
pub type SendHook = Arc<dyn Fn(&VersionedTransaction) -> Vec<(Pubkey, Account)> + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct MockLedger {
    accounts: Mutex<HashMap<Pubkey, Account>>,
    outcomes: Mutex<VecDeque<SendOutcome>>,
    statuses: Mutex<HashMap<Signature, (SendOutcome, u32)>>,
    sent: Mutex<Vec<VersionedTransaction>>,
    failing_mints: Mutex<HashSet<Pubkey>>,
    send_hook: Mutex<Option<SendHook>>,
    block_height: AtomicU64,
    validity_window: u64,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self::with_validity_window(150)
    }

    /// Blockhashes stay valid for `window` block-height reads
    pub fn with_validity_window(window: u64) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            outcomes: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            failing_mints: Mutex::new(HashSet::new()),
            send_hook: Mutex::new(None),
            block_height: AtomicU64::new(1),
            validity_window: window,
        }
    }

    pub fn set_account(&self, address: Pubkey, account: Account) {
        lock(&self.accounts).insert(address, account);
    }

    pub fn get_account(&self, address: &Pubkey) -> Option<Account> {
        lock(&self.accounts).get(address).cloned()
    }

    /// Queue outcomes for the next sends; once drained every send confirms
    pub fn push_outcomes(&self, outcomes: impl IntoIterator<Item = SendOutcome>) {
        lock(&self.outcomes).extend(outcomes);
    }

    /// Make `largest_token_holders` fail for `mint`
    pub fn fail_largest_holders(&self, mint: Pubkey) {
        lock(&self.failing_mints).insert(mint);
    }

    pub fn set_send_hook(&self, hook: SendHook) {
        *lock(&self.send_hook) = Some(hook);
    }

    /// Every transaction accepted by `send_transaction`, in order
    pub fn sent_transactions(&self) -> Vec<VersionedTransaction> {
        lock(&self.sent).clone()
    }

    pub fn send_count(&self) -> usize {
        lock(&self.sent).len()
    }

    /// Token balance currently stored for `address`, zero if absent
    pub fn balance_of(&self, address: &Pubkey) -> u64 {
        self.get_account(address)
            .and_then(|account| unpack_token_account(&account.data).ok())
            .map(|info| info.amount)
            .unwrap_or(0)
    }

    fn matches(account: &Account, filters: &[AccountFilter]) -> bool {
        filters.iter().all(|f| {
            account
                .data
                .get(f.offset..f.offset + f.bytes.len())
                .map(|window| window == f.bytes.as_slice())
                .unwrap_or(false)
        })
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn account(&self, address: &Pubkey) -> SdkResult<Option<Account>> {
        Ok(self.get_account(address))
    }

    async fn multiple_accounts(&self, addresses: &[Pubkey]) -> SdkResult<Vec<Option<Account>>> {
        let accounts = lock(&self.accounts);
        Ok(addresses.iter().map(|a| accounts.get(a).cloned()).collect())
    }

    async fn native_balance(&self, address: &Pubkey) -> SdkResult<u64> {
        Ok(self.get_account(address).map(|a| a.lamports).unwrap_or(0))
    }

    async fn largest_token_holders(&self, mint: &Pubkey) -> SdkResult<Vec<TokenHolding>> {
        if lock(&self.failing_mints).contains(mint) {
            return Err(SdkError::Rpc(format!("largest accounts unavailable for {}", mint)));
        }

        let accounts = lock(&self.accounts);
        let mut holdings: Vec<TokenHolding> = accounts
            .iter()
            .filter(|(_, account)| is_token_program(&account.owner))
            .filter_map(|(address, account)| {
                let info = unpack_token_account(&account.data).ok()?;
                (info.mint == *mint).then_some(TokenHolding {
                    address: *address,
                    amount: info.amount,
                    ui_amount: Some(info.amount as f64),
                })
            })
            .collect();
        holdings.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.address.cmp(&b.address)));
        holdings.truncate(20);
        Ok(holdings)
    }

    async fn program_accounts(
        &self,
        program: &Pubkey,
        filters: Vec<AccountFilter>,
    ) -> SdkResult<Vec<(Pubkey, Account)>> {
        let accounts = lock(&self.accounts);
        let mut matched: Vec<(Pubkey, Account)> = accounts
            .iter()
            .filter(|(_, account)| account.owner == *program && Self::matches(account, &filters))
            .map(|(address, account)| (*address, account.clone()))
            .collect();
        matched.sort_by_key(|(address, _)| *address);
        Ok(matched)
    }

    async fn latest_blockhash(&self) -> SdkResult<(Hash, u64)> {
        let height = self.block_height.load(Ordering::SeqCst);
        Ok((Hash::new_unique(), height + self.validity_window))
    }

    async fn block_height(&self) -> SdkResult<u64> {
        Ok(self.block_height.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        _skip_preflight: bool,
    ) -> SdkResult<Signature> {
        let outcome = lock(&self.outcomes).pop_front().unwrap_or(SendOutcome::Confirm);
        if let SendOutcome::Reject(reason) = &outcome {
            return Err(SdkError::Rpc(reason.clone()));
        }

        lock(&self.sent).push(transaction.clone());
        let signature = Signature::new_unique();

        if outcome.lands() {
            let hook = lock(&self.send_hook).clone();
            if let Some(hook) = hook {
                let updates = hook(transaction);
                let mut accounts = lock(&self.accounts);
                for (address, account) in updates {
                    accounts.insert(address, account);
                }
            }
        }

        lock(&self.statuses).insert(signature, (outcome, 0));
        Ok(signature)
    }

    async fn signature_status(&self, signature: &Signature) -> SdkResult<SignatureStatus> {
        let mut statuses = lock(&self.statuses);
        let Some((outcome, polls)) = statuses.get_mut(signature) else {
            return Ok(SignatureStatus::Unknown);
        };
        *polls += 1;
        let polls = *polls;
        Ok(match &*outcome {
            SendOutcome::Confirm => SignatureStatus::Confirmed,
            SendOutcome::FailOnChain(reason) => SignatureStatus::Failed(reason.clone()),
            SendOutcome::ConfirmAfterPolls(n) if polls <= *n => SignatureStatus::Processed,
            SendOutcome::VisibleAfterPolls(n) if polls <= *n => SignatureStatus::Unknown,
            SendOutcome::ConfirmAfterPolls(_) | SendOutcome::VisibleAfterPolls(_) => {
                SignatureStatus::Confirmed
            }
            SendOutcome::Reject(_) | SendOutcome::NeverConfirm => SignatureStatus::Unknown,
        })
    }

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> SdkResult<u64> {
        Ok(Rent::default().minimum_balance(data_len))
    }
}

// ============================================================================
// Account Fixtures
// ============================================================================

pub fn mint_account(supply: u64, decimals: u8, token_program: Pubkey) -> Account {
    let mint = Mint {
        supply,
        decimals,
        is_initialized: true,
        ..Default::default()
    };
    let mut data = vec![0u8; Mint::LEN];
    // Packing a fully initialized mint into a sized buffer cannot fail
    let _ = Mint::pack(mint, &mut data);
    Account {
        lamports: Rent::default().minimum_balance(Mint::LEN),
        data,
        owner: token_program,
        executable: false,
        rent_epoch: 0,
    }
}

pub fn token_account(mint: Pubkey, owner: Pubkey, amount: u64, token_program: Pubkey) -> Account {
    let state = TokenAccount {
        mint,
        owner,
        amount,
        state: AccountState::Initialized,
        ..Default::default()
    };
    let mut data = vec![0u8; TokenAccount::LEN];
    let _ = TokenAccount::pack(state, &mut data);
    Account {
        lamports: Rent::default().minimum_balance(TokenAccount::LEN),
        data,
        owner: token_program,
        executable: false,
        rent_epoch: 0,
    }
}

/// Token-2022 account carrying `withheld` transfer fees
pub fn token_account_with_withheld(
    mint: Pubkey,
    owner: Pubkey,
    amount: u64,
    withheld: u64,
) -> SdkResult<Account> {
    let len = ExtensionType::try_calculate_account_len::<TokenAccount>(&[
        ExtensionType::TransferFeeAmount,
    ])?;
    let mut data = vec![0u8; len];
    {
        let mut state = StateWithExtensionsMut::<TokenAccount>::unpack_uninitialized(&mut data)?;
        state.base = TokenAccount {
            mint,
            owner,
            amount,
            state: AccountState::Initialized,
            ..Default::default()
        };
        state.pack_base();
        state.init_account_type()?;
        let extension = state.init_extension::<TransferFeeAmount>(true)?;
        extension.withheld_amount = withheld.into();
    }
    Ok(Account {
        lamports: Rent::default().minimum_balance(len),
        data,
        owner: spl_token_2022::id(),
        executable: false,
        rent_epoch: 0,
    })
}

/// Plain system account holding `lamports`
pub fn wallet_account(lamports: u64) -> Account {
    Account {
        lamports,
        data: Vec::new(),
        owner: solana_sdk::system_program::id(),
        executable: false,
        rent_epoch: 0,
    }
}
