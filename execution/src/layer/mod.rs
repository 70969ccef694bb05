use raspa_types::casino::{Account, AccountId, LedgerEntry, LedgerKind, Money};
use tracing::debug;

use crate::state::{Store, StoreError};

mod handlers;

pub use handlers::{apply_play, CouponReceipt, DepositError, DepositReceipt, PlayError};

/// Staged changes to one account.
///
/// A layer is opened while the caller holds the account's lock. Handlers mutate the staged copy
/// and queue ledger entries; nothing reaches the store until [`Layer::commit`]. Dropping a layer
/// discards every staged change, which is how failed operations roll back.
pub struct Layer<'a, S: Store> {
    store: &'a S,
    before: Account,
    account: Account,
    pending: Vec<LedgerEntry>,
    now_ms: u64,
}

impl<'a, S: Store> Layer<'a, S> {
    /// Read fresh state for `id`. Returns `None` when the account does not exist.
    pub fn open(store: &'a S, id: AccountId, now_ms: u64) -> Result<Option<Self>, StoreError> {
        let Some(account) = store.load(id)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            store,
            before: account.clone(),
            account,
            pending: Vec::new(),
            now_ms,
        }))
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn pending(&self) -> &[LedgerEntry] {
        &self.pending
    }

    fn record(&mut self, kind: LedgerKind, amount: Money, description: impl Into<String>) {
        self.pending.push(LedgerEntry::new(
            self.account.id,
            kind,
            amount,
            description,
            self.now_ms,
        ));
    }

    fn is_dirty(&self) -> bool {
        self.account != self.before || !self.pending.is_empty()
    }

    /// Persist the staged account and ledger entries atomically and return the committed row.
    pub fn commit(self) -> Result<Account, StoreError> {
        if !self.is_dirty() {
            return Ok(self.account);
        }
        self.account.validate_invariants()?;
        self.store.commit(&self.account, &self.pending)?;
        debug!(
            account_id = %self.account.id,
            entries = self.pending.len(),
            "committed account changes"
        );
        Ok(self.account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Memory;

    #[test]
    fn test_open_missing_account() {
        let store = Memory::new();
        assert!(Layer::open(&store, AccountId(1), 0).unwrap().is_none());
    }

    #[test]
    fn test_dropped_layer_leaves_store_untouched() {
        let store = Memory::new();
        let account = store.create_account(Money::from_units(10), 0).unwrap();
        {
            let mut layer = Layer::open(&store, account.id, 5).unwrap().unwrap();
            layer.account.balances.real = Money::ZERO;
            layer.record(LedgerKind::Withdrawal, Money::from_units(10), "payout");
        }
        assert_eq!(store.load(account.id).unwrap(), Some(account.clone()));
        assert!(store.ledger(account.id).unwrap().is_empty());
    }

    #[test]
    fn test_commit_rejects_broken_invariant() {
        let store = Memory::new();
        let account = store.create_account(Money::ZERO, 0).unwrap();
        let mut layer = Layer::open(&store, account.id, 0).unwrap().unwrap();
        layer.account.play.loss_streak = 3;
        assert!(matches!(layer.commit(), Err(StoreError::Invariant(_))));
        assert_eq!(store.load(account.id).unwrap(), Some(account));
    }

    #[test]
    fn test_clean_commit_skips_store() {
        let store = Memory::new();
        let account = store.create_account(Money::ZERO, 0).unwrap();
        let layer = Layer::open(&store, account.id, 0).unwrap().unwrap();
        assert_eq!(layer.commit().unwrap(), account);
    }
}
