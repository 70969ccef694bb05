use raspa_types::api::WithdrawalStatus;
use raspa_types::casino::{Account, AccountId, BalanceSnapshot, LedgerEntry, Money, PlayOutcome};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

use crate::casino::FunnelConfig;
use crate::layer::{CouponReceipt, DepositError, DepositReceipt, Layer, PlayError};
use crate::locks::AccountLocks;
use crate::notify::{NoopNotifier, Notifier};
use crate::state::{run_blocking, Store, StoreError};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct CasinoConfig {
    pub funnel: FunnelConfig,
    /// How long an operation waits for the account lock before failing with `AccountBusy`.
    pub lock_timeout: Duration,
    /// Real balance granted to newly created accounts.
    pub starting_balance: Money,
}

impl Default for CasinoConfig {
    fn default() -> Self {
        Self {
            funnel: FunnelConfig::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            starting_balance: Money::ZERO,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Game transaction coordinator.
///
/// Every balance-affecting entry point follows the same shape: take the account lock, then hand
/// the lock to a blocking-pool task that opens a [`Layer`] on fresh state, runs one handler,
/// commits, notifies and finally releases the lock. Store I/O never runs on a runtime worker,
/// and notifications for one account leave in commit order.
pub struct Casino<S: Store + 'static> {
    store: Arc<S>,
    locks: AccountLocks,
    config: CasinoConfig,
    notifier: Arc<dyn Notifier>,
}

impl<S: Store + 'static> Casino<S> {
    pub fn new(store: S, config: CasinoConfig) -> Self {
        Self::with_notifier(store, config, Arc::new(NoopNotifier))
    }

    pub fn with_notifier(store: S, config: CasinoConfig, notifier: Arc<dyn Notifier>) -> Self {
        if let Err(err) = config.funnel.validate() {
            warn!(%err, "funnel config out of range; recovery draws will be clamped");
        }
        Self {
            store: Arc::new(store),
            locks: AccountLocks::new(config.lock_timeout),
            config,
            notifier,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &CasinoConfig {
        &self.config
    }

    pub fn locks(&self) -> &AccountLocks {
        &self.locks
    }

    pub async fn create_account(&self) -> Result<Account, StoreError> {
        let store = self.store.clone();
        let starting_balance = self.config.starting_balance;
        let account =
            run_blocking(move || store.create_account(starting_balance, now_ms())).await?;
        info!(account_id = %account.id, starting_balance = %account.balances.real, "account created");
        Ok(account)
    }

    /// Unlocked read of the latest committed state.
    pub async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let store = self.store.clone();
        run_blocking(move || store.load(id)).await
    }

    pub async fn ledger(&self, id: AccountId) -> Result<Vec<LedgerEntry>, StoreError> {
        let store = self.store.clone();
        run_blocking(move || store.ledger(id)).await
    }

    /// Play one scratch card for `stake`, drawing randomness from the OS.
    pub async fn play_game(&self, id: AccountId, stake: Money) -> Result<PlayOutcome, PlayError> {
        let mut rng = StdRng::from_entropy();
        self.play_game_with_rng(id, stake, &mut rng).await
    }

    pub async fn play_game_with_rng<R: Rng + ?Sized + Send>(
        &self,
        id: AccountId,
        stake: Money,
        rng: &mut R,
    ) -> Result<PlayOutcome, PlayError> {
        if stake.is_zero() {
            warn!(account_id = %id, "rejected zero stake");
            return Err(PlayError::InvalidStake(
                "stake must be greater than zero".to_string(),
            ));
        }
        // The blocking task owns its generator; seeding it from `rng` keeps seeded runs
        // reproducible.
        let mut task_rng = StdRng::from_seed(rng.gen());

        let guard = self
            .locks
            .acquire(id)
            .await
            .map_err(|_| PlayError::AccountBusy(id))?;
        let store = self.store.clone();
        let funnel = self.config.funnel.clone();
        let notifier = self.notifier.clone();
        let result = run_blocking(move || {
            let result = Layer::open(&*store, id, now_ms())
                .map_err(PlayError::from)
                .and_then(|layer| layer.ok_or(PlayError::AccountNotFound(id)))
                .and_then(|mut layer| {
                    let outcome = layer.handle_play(&funnel, stake, &mut task_rng)?;
                    layer.commit()?;
                    Ok(outcome)
                });
            if let Ok(outcome) = &result {
                notifier.notify(id, outcome.balances);
            }
            drop(guard);
            result
        })
        .await;

        match &result {
            Ok(outcome) => {
                info!(
                    account_id = %id,
                    stake = %stake,
                    prize = %outcome.decision.prize_amount(),
                    is_winner = outcome.is_winner(),
                    total_plays = outcome.total_plays,
                    loss_streak = outcome.loss_streak,
                    "play committed"
                );
            }
            Err(err @ (PlayError::Persistence(_) | PlayError::Overflow(_))) => {
                error!(account_id = %id, stake = %stake, %err, "play failed to persist");
            }
            Err(err) => {
                warn!(account_id = %id, stake = %stake, %err, "play rejected");
            }
        }
        result
    }

    /// Run one account handler under the account lock, commit its changes and notify.
    async fn with_account<T, F>(
        &self,
        id: AccountId,
        op: &'static str,
        handler: F,
    ) -> Result<(T, BalanceSnapshot), DepositError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Layer<'_, S>) -> Result<T, DepositError> + Send + 'static,
    {
        let guard = self
            .locks
            .acquire(id)
            .await
            .map_err(|_| DepositError::AccountBusy(id))?;
        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let result = run_blocking(move || {
            let result = Layer::open(&*store, id, now_ms())
                .map_err(DepositError::from)
                .and_then(|layer| layer.ok_or(DepositError::AccountNotFound(id)))
                .and_then(|mut layer| {
                    let value = handler(&mut layer)?;
                    let account = layer.commit()?;
                    Ok((value, account.snapshot()))
                });
            if let Ok((_, balances)) = &result {
                notifier.notify(id, *balances);
            }
            drop(guard);
            result
        })
        .await;

        match &result {
            Ok(_) => {}
            Err(err @ (DepositError::Persistence(_) | DepositError::Overflow(_))) => {
                error!(account_id = %id, op, %err, "account update failed to persist");
            }
            Err(err) => warn!(account_id = %id, op, %err, "account update rejected"),
        }
        result
    }

    /// Credit a confirmed deposit, applying first-deposit tiering and vault unlock.
    pub async fn credit_deposit(
        &self,
        id: AccountId,
        amount: Money,
    ) -> Result<DepositReceipt, DepositError> {
        let (receipt, _) = self
            .with_account(id, "deposit", move |layer| layer.handle_deposit(amount))
            .await?;
        info!(
            account_id = %id,
            amount = %amount,
            unlocked = %receipt.unlocked,
            tier = receipt.tier.as_str(),
            first_deposit = receipt.first_deposit,
            "deposit credited"
        );
        Ok(receipt)
    }

    pub async fn request_withdrawal(&self, id: AccountId) -> Result<WithdrawalStatus, DepositError> {
        let (status, _) = self
            .with_account(id, "withdrawal_request", |layer| {
                layer.handle_withdrawal_request()
            })
            .await?;
        Ok(status)
    }

    pub async fn withdraw(&self, id: AccountId, amount: Money) -> Result<BalanceSnapshot, DepositError> {
        let (balances, _) = self
            .with_account(id, "withdraw", move |layer| layer.handle_withdraw(amount))
            .await?;
        info!(account_id = %id, amount = %amount, "withdrawal debited");
        Ok(balances)
    }

    /// Apply an affiliate coupon: binds the account once and credits the affiliate's bonus.
    pub async fn apply_coupon(&self, id: AccountId, code: &str) -> Result<CouponReceipt, DepositError> {
        let code = code.to_string();
        let (receipt, _) = self
            .with_account(id, "apply_coupon", move |layer| layer.handle_apply_coupon(&code))
            .await?;
        info!(
            account_id = %id,
            affiliate_id = %receipt.affiliate.id,
            bonus = %receipt.affiliate.bonus_amount,
            "affiliate coupon applied"
        );
        Ok(receipt)
    }
}
