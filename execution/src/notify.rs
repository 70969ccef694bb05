use raspa_types::casino::{AccountId, BalanceSnapshot};

/// Push channel for post-commit balance updates.
///
/// Called right after commit while the account lock is still held, so one account's
/// notifications arrive in commit order. Implementations must not block and must swallow their
/// own failures: a lost notification never affects the committed operation.
pub trait Notifier: Send + Sync {
    fn notify(&self, account: AccountId, balances: BalanceSnapshot);
}

/// Discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _account: AccountId, _balances: BalanceSnapshot) {}
}
