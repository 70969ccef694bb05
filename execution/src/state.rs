use raspa_types::casino::{
    Account, AccountId, AccountInvariantError, Affiliate, AffiliateId, LedgerEntry, Money,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("account {0} does not exist")]
    MissingAccount(AccountId),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("refusing to persist invalid account: {0}")]
    Invariant(#[from] AccountInvariantError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("already exists: {0}")]
    Conflict(String),
}

/// Run synchronous store work on tokio's blocking pool so it never stalls a runtime worker.
pub async fn run_blocking<T, E, F>(work: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: From<StoreError> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(%err, "store task failed");
            Err(StoreError::Unavailable(format!("store task failed: {err}")).into())
        }
    }
}

/// Durable account storage.
///
/// Implementations never lock accounts themselves: serialisation of writers is the job of the
/// lock registry, the store only guarantees that [`Store::commit`] is all-or-nothing.
pub trait Store: Send + Sync {
    /// Allocate an id and persist a fresh account.
    fn create_account(&self, real: Money, created_at_ms: u64) -> Result<Account, StoreError>;

    fn load(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Write the account row and append its ledger entries in one atomic unit.
    fn commit(&self, account: &Account, ledger: &[LedgerEntry]) -> Result<(), StoreError>;

    fn ledger(&self, id: AccountId) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Bind a bearer token to an account. Tokens outlive the process that issued them.
    fn create_session(&self, token: &str, account: AccountId, created_at_ms: u64)
        -> Result<(), StoreError>;

    fn resolve_session(&self, token: &str) -> Result<Option<AccountId>, StoreError>;

    /// Register a referral partner. Fails with [`StoreError::Conflict`] on a reused code.
    fn create_affiliate(
        &self,
        name: &str,
        referral_code: &str,
        bonus_amount: Money,
    ) -> Result<Affiliate, StoreError>;

    fn find_affiliate(&self, referral_code: &str) -> Result<Option<Affiliate>, StoreError>;
}

impl<S: Store + ?Sized> Store for std::sync::Arc<S> {
    fn create_account(&self, real: Money, created_at_ms: u64) -> Result<Account, StoreError> {
        (**self).create_account(real, created_at_ms)
    }

    fn load(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        (**self).load(id)
    }

    fn commit(&self, account: &Account, ledger: &[LedgerEntry]) -> Result<(), StoreError> {
        (**self).commit(account, ledger)
    }

    fn ledger(&self, id: AccountId) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).ledger(id)
    }

    fn create_session(
        &self,
        token: &str,
        account: AccountId,
        created_at_ms: u64,
    ) -> Result<(), StoreError> {
        (**self).create_session(token, account, created_at_ms)
    }

    fn resolve_session(&self, token: &str) -> Result<Option<AccountId>, StoreError> {
        (**self).resolve_session(token)
    }

    fn create_affiliate(
        &self,
        name: &str,
        referral_code: &str,
        bonus_amount: Money,
    ) -> Result<Affiliate, StoreError> {
        (**self).create_affiliate(name, referral_code, bonus_amount)
    }

    fn find_affiliate(&self, referral_code: &str) -> Result<Option<Affiliate>, StoreError> {
        (**self).find_affiliate(referral_code)
    }
}

#[derive(Default)]
struct MemoryInner {
    accounts: BTreeMap<AccountId, Account>,
    ledger: Vec<LedgerEntry>,
    next_id: u64,
    sessions: HashMap<String, AccountId>,
    affiliates: BTreeMap<AffiliateId, Affiliate>,
}

/// Process-local store for tests and ephemeral runs.
#[derive(Default)]
pub struct Memory {
    inner: Mutex<MemoryInner>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Overwrite an account row without a ledger entry. Used to seed fixtures.
    pub fn put(&self, account: Account) -> Result<(), StoreError> {
        let mut inner = self.inner()?;
        inner.next_id = inner.next_id.max(account.id.0);
        inner.accounts.insert(account.id, account);
        Ok(())
    }
}

impl Store for Memory {
    fn create_account(&self, real: Money, created_at_ms: u64) -> Result<Account, StoreError> {
        let mut inner = self.inner()?;
        inner.next_id += 1;
        let account = Account::with_balance(AccountId(inner.next_id), created_at_ms, real);
        inner.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    fn load(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.inner()?.accounts.get(&id).cloned())
    }

    fn commit(&self, account: &Account, ledger: &[LedgerEntry]) -> Result<(), StoreError> {
        let mut inner = self.inner()?;
        let Some(row) = inner.accounts.get_mut(&account.id) else {
            return Err(StoreError::MissingAccount(account.id));
        };
        *row = account.clone();
        inner.ledger.extend_from_slice(ledger);
        Ok(())
    }

    fn ledger(&self, id: AccountId) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self
            .inner()?
            .ledger
            .iter()
            .filter(|entry| entry.account == id)
            .cloned()
            .collect())
    }

    fn create_session(
        &self,
        token: &str,
        account: AccountId,
        _created_at_ms: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner()?;
        if !inner.accounts.contains_key(&account) {
            return Err(StoreError::MissingAccount(account));
        }
        if inner.sessions.contains_key(token) {
            return Err(StoreError::Conflict("session token".to_string()));
        }
        inner.sessions.insert(token.to_string(), account);
        Ok(())
    }

    fn resolve_session(&self, token: &str) -> Result<Option<AccountId>, StoreError> {
        Ok(self.inner()?.sessions.get(token).copied())
    }

    fn create_affiliate(
        &self,
        name: &str,
        referral_code: &str,
        bonus_amount: Money,
    ) -> Result<Affiliate, StoreError> {
        let mut inner = self.inner()?;
        if inner
            .affiliates
            .values()
            .any(|affiliate| affiliate.referral_code == referral_code)
        {
            return Err(StoreError::Conflict(format!("referral code {referral_code:?}")));
        }
        let id = AffiliateId(inner.affiliates.len() as u64 + 1);
        let affiliate = Affiliate {
            id,
            name: name.to_string(),
            referral_code: referral_code.to_string(),
            bonus_amount,
        };
        inner.affiliates.insert(id, affiliate.clone());
        Ok(affiliate)
    }

    fn find_affiliate(&self, referral_code: &str) -> Result<Option<Affiliate>, StoreError> {
        Ok(self
            .inner()?
            .affiliates
            .values()
            .find(|affiliate| affiliate.referral_code == referral_code)
            .cloned())
    }
}
