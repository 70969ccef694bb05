//! Test doubles shared by this crate's tests and the server's.

use raspa_types::casino::{Account, AccountId, Affiliate, BalanceSnapshot, LedgerEntry, Money};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::notify::Notifier;
use crate::state::{Memory, Store, StoreError};
use crate::{Casino, CasinoConfig};

/// Records every notification it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(AccountId, BalanceSnapshot)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(AccountId, BalanceSnapshot)> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, account: AccountId, balances: BalanceSnapshot) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((account, balances));
        }
    }
}

/// In-memory store whose commits can be made to fail on demand.
#[derive(Default)]
pub struct FlakyStore {
    inner: Memory,
    fail_commits: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn put(&self, account: Account) -> Result<(), StoreError> {
        self.inner.put(account)
    }
}

impl Store for FlakyStore {
    fn create_account(&self, real: Money, created_at_ms: u64) -> Result<Account, StoreError> {
        self.inner.create_account(real, created_at_ms)
    }

    fn load(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        self.inner.load(id)
    }

    fn commit(&self, account: &Account, ledger: &[LedgerEntry]) -> Result<(), StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }
        self.inner.commit(account, ledger)
    }

    fn ledger(&self, id: AccountId) -> Result<Vec<LedgerEntry>, StoreError> {
        self.inner.ledger(id)
    }

    fn create_session(
        &self,
        token: &str,
        account: AccountId,
        created_at_ms: u64,
    ) -> Result<(), StoreError> {
        self.inner.create_session(token, account, created_at_ms)
    }

    fn resolve_session(&self, token: &str) -> Result<Option<AccountId>, StoreError> {
        self.inner.resolve_session(token)
    }

    fn create_affiliate(
        &self,
        name: &str,
        referral_code: &str,
        bonus_amount: Money,
    ) -> Result<Affiliate, StoreError> {
        self.inner.create_affiliate(name, referral_code, bonus_amount)
    }

    fn find_affiliate(&self, referral_code: &str) -> Result<Option<Affiliate>, StoreError> {
        self.inner.find_affiliate(referral_code)
    }
}

/// Casino over a fresh in-memory store with a recording notifier.
pub fn create_casino(config: CasinoConfig) -> (Casino<Arc<Memory>>, Arc<Memory>, Arc<RecordingNotifier>) {
    let store = Arc::new(Memory::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let casino = Casino::with_notifier(store.clone(), config, notifier.clone());
    (casino, store, notifier)
}

/// Account with `real` spendable balance and no history.
pub fn funded_account(id: u64, real: Money) -> Account {
    Account::with_balance(AccountId(id), 0, real)
}
