use super::super::*;
use raspa_types::api::WithdrawalStatus;
use raspa_types::casino::{
    AffiliateId, BalanceSnapshot, Tier, DEPOSIT_ROLLOVER_MULTIPLIER, STANDARD_UNLOCK_BPS, UNLOCK_OFFERS,
    VIP_DEPOSIT_THRESHOLD,
};
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum DepositError {
    #[error("account {0} not found")]
    AccountNotFound(AccountId),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("insufficient withdrawable balance: have {withdrawable}, requested {requested}")]
    InsufficientWithdrawable {
        withdrawable: Money,
        requested: Money,
    },
    #[error("invalid coupon: {0}")]
    InvalidCoupon(String),
    #[error("account already bound to affiliate {0}")]
    AlreadyAffiliated(AffiliateId),
    #[error("account {0} is busy, retry later")]
    AccountBusy(AccountId),
    #[error("arithmetic overflow updating {0}")]
    Overflow(&'static str),
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositReceipt {
    pub account: AccountId,
    pub amount: Money,
    /// Vault amount moved into the real balance by this deposit.
    pub unlocked: Money,
    pub first_deposit: bool,
    pub tier: Tier,
    pub balances: BalanceSnapshot,
}

fn add(field: &'static str, a: Money, b: Money) -> Result<Money, DepositError> {
    a.checked_add(b).ok_or(DepositError::Overflow(field))
}

/// Share of the vault a (non-first) deposit releases.
fn unlock_amount(tier: Tier, vault: Money, deposit: Money) -> Money {
    match tier {
        Tier::Vip if deposit >= VIP_DEPOSIT_THRESHOLD => vault,
        Tier::Vip => Money::ZERO,
        Tier::Standard => vault.bps(STANDARD_UNLOCK_BPS),
    }
}

impl<'a, S: Store> Layer<'a, S> {
    pub(crate) fn handle_deposit(&mut self, amount: Money) -> Result<DepositReceipt, DepositError> {
        if amount.is_zero() {
            return Err(DepositError::InvalidAmount(
                "deposit must be greater than zero".to_string(),
            ));
        }

        let first_deposit = self.account.is_first_deposit();
        let mut unlocked = Money::ZERO;
        if first_deposit {
            self.account.tier = if amount >= VIP_DEPOSIT_THRESHOLD {
                Tier::Vip
            } else {
                Tier::Standard
            };
        } else if !self.account.balances.bonus_vault.is_zero() {
            unlocked = unlock_amount(self.account.tier, self.account.balances.bonus_vault, amount);
        }

        let credited = add("real", amount, unlocked)?;
        let balances = &mut self.account.balances;
        balances.real = add("real", balances.real, credited)?;
        balances.bonus_vault = balances.bonus_vault.saturating_sub(unlocked);
        let deposits = &mut self.account.deposits;
        deposits.total_deposited = add("total_deposited", deposits.total_deposited, amount)?;
        deposits.last_deposit_amount = amount;
        self.account.rollover.deposit = Money::ZERO;

        self.record(LedgerKind::Deposit, amount, "pix deposit");
        if !unlocked.is_zero() {
            self.record(LedgerKind::VaultUnlock, unlocked, "vault unlock");
        }

        Ok(DepositReceipt {
            account: self.account.id,
            amount,
            unlocked,
            first_deposit,
            tier: self.account.tier,
            balances: self.account.snapshot(),
        })
    }

    /// Release the real balance for withdrawal once deposit rollover is met, then report what
    /// the player can do next.
    pub(crate) fn handle_withdrawal_request(&mut self) -> Result<WithdrawalStatus, DepositError> {
        let target = self
            .account
            .deposits
            .last_deposit_amount
            .checked_mul(DEPOSIT_ROLLOVER_MULTIPLIER)
            .ok_or(DepositError::Overflow("rollover_target"))?;
        let rollover_met = self.account.rollover.deposit >= target;
        let releasable = if rollover_met {
            self.account.balances.real
        } else {
            Money::ZERO
        };
        if !releasable.is_zero() && releasable != self.account.balances.withdrawable {
            self.account.balances.withdrawable = releasable;
        }

        let balances = &self.account.balances;
        if !balances.withdrawable.is_zero() {
            return Ok(WithdrawalStatus::ReadyToWithdraw {
                amount: balances.withdrawable,
            });
        }
        if !balances.bonus_vault.is_zero() {
            return Ok(WithdrawalStatus::UnlockVaultPrompt {
                vault_balance: balances.bonus_vault,
                offers: UNLOCK_OFFERS.to_vec(),
            });
        }
        Ok(WithdrawalStatus::NothingToWithdraw)
    }

    pub(crate) fn handle_withdraw(&mut self, amount: Money) -> Result<BalanceSnapshot, DepositError> {
        if amount.is_zero() {
            return Err(DepositError::InvalidAmount(
                "withdrawal must be greater than zero".to_string(),
            ));
        }
        let balances = &mut self.account.balances;
        let insufficient = DepositError::InsufficientWithdrawable {
            withdrawable: balances.withdrawable,
            requested: amount,
        };
        let (Some(withdrawable), Some(real)) = (
            balances.withdrawable.checked_sub(amount),
            balances.real.checked_sub(amount),
        ) else {
            return Err(insufficient);
        };
        balances.withdrawable = withdrawable;
        balances.real = real;

        self.record(LedgerKind::Withdrawal, amount, "pix withdrawal");
        Ok(self.account.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Memory;

    fn layer_for(store: &Memory, account: Account) -> Layer<'_, Memory> {
        let id = account.id;
        store.put(account).unwrap();
        Layer::open(store, id, 0).unwrap().unwrap()
    }

    #[test]
    fn test_first_deposit_sets_tier_without_unlock() {
        let store = Memory::new();
        let mut account = Account::new(AccountId(1), 0);
        account.balances.bonus_vault = Money::from_units(100);
        let mut layer = layer_for(&store, account);

        let receipt = layer.handle_deposit(Money::from_units(150)).unwrap();
        assert!(receipt.first_deposit);
        assert_eq!(receipt.tier, Tier::Vip);
        assert_eq!(receipt.unlocked, Money::ZERO);
        assert_eq!(receipt.balances.real_balance, Money::from_units(150));
        assert_eq!(receipt.balances.bonus_vault_balance, Money::from_units(100));
        assert_eq!(layer.pending().len(), 1);
    }

    #[test]
    fn test_small_first_deposit_is_standard() {
        let store = Memory::new();
        let mut layer = layer_for(&store, Account::new(AccountId(1), 0));
        let receipt = layer.handle_deposit(Money::from_cents(9_999)).unwrap();
        assert_eq!(receipt.tier, Tier::Standard);
    }

    #[test]
    fn test_standard_deposit_unlocks_ten_percent() {
        let store = Memory::new();
        let mut account = Account::new(AccountId(1), 0);
        account.deposits.total_deposited = Money::from_units(30);
        account.balances.bonus_vault = Money::from_units(105);
        account.rollover.deposit = Money::from_units(12);
        let mut layer = layer_for(&store, account);

        let receipt = layer.handle_deposit(Money::from_units(30)).unwrap();
        assert_eq!(receipt.unlocked, Money::from_cents(1_050));
        assert_eq!(receipt.balances.real_balance, Money::from_cents(4_050));
        assert_eq!(receipt.balances.bonus_vault_balance, Money::from_cents(9_450));
        assert_eq!(layer.account().rollover.deposit, Money::ZERO);
        assert_eq!(layer.account().deposits.last_deposit_amount, Money::from_units(30));
        assert_eq!(layer.account().deposits.total_deposited, Money::from_units(60));
        let kinds: Vec<_> = layer.pending().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![LedgerKind::Deposit, LedgerKind::VaultUnlock]);
    }

    #[test]
    fn test_vip_unlock_depends_on_deposit_size() {
        let store = Memory::new();
        let mut account = Account::new(AccountId(1), 0);
        account.tier = Tier::Vip;
        account.deposits.total_deposited = Money::from_units(100);
        account.balances.bonus_vault = Money::from_units(100);
        let mut layer = layer_for(&store, account);

        let small = layer.handle_deposit(Money::from_units(50)).unwrap();
        assert_eq!(small.unlocked, Money::ZERO);
        let large = layer.handle_deposit(Money::from_units(100)).unwrap();
        assert_eq!(large.unlocked, Money::from_units(100));
        assert_eq!(large.balances.bonus_vault_balance, Money::ZERO);
        assert_eq!(large.balances.real_balance, Money::from_units(250));
    }

    #[test]
    fn test_zero_deposit_rejected() {
        let store = Memory::new();
        let mut layer = layer_for(&store, Account::new(AccountId(1), 0));
        assert!(matches!(
            layer.handle_deposit(Money::ZERO),
            Err(DepositError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_withdrawal_request_before_rollover_prompts_unlock() {
        let store = Memory::new();
        let mut account = Account::with_balance(AccountId(1), 0, Money::from_units(40));
        account.deposits.last_deposit_amount = Money::from_units(30);
        account.rollover.deposit = Money::from_units(59);
        account.balances.bonus_vault = Money::from_units(100);
        let mut layer = layer_for(&store, account);

        assert_eq!(
            layer.handle_withdrawal_request().unwrap(),
            WithdrawalStatus::UnlockVaultPrompt {
                vault_balance: Money::from_units(100),
                offers: UNLOCK_OFFERS.to_vec(),
            }
        );
        assert_eq!(layer.account().balances.withdrawable, Money::ZERO);
    }

    #[test]
    fn test_withdrawal_request_after_rollover_releases_real() {
        let store = Memory::new();
        let mut account = Account::with_balance(AccountId(1), 0, Money::from_units(40));
        account.deposits.last_deposit_amount = Money::from_units(30);
        account.rollover.deposit = Money::from_units(60);
        let mut layer = layer_for(&store, account);

        assert_eq!(
            layer.handle_withdrawal_request().unwrap(),
            WithdrawalStatus::ReadyToWithdraw {
                amount: Money::from_units(40)
            }
        );
        assert_eq!(layer.account().balances.withdrawable, Money::from_units(40));
    }

    #[test]
    fn test_withdrawal_request_with_nothing() {
        let store = Memory::new();
        let mut account = Account::new(AccountId(1), 0);
        account.deposits.last_deposit_amount = Money::from_units(30);
        let mut layer = layer_for(&store, account);
        assert_eq!(
            layer.handle_withdrawal_request().unwrap(),
            WithdrawalStatus::NothingToWithdraw
        );
    }

    #[test]
    fn test_withdraw_debits_both_balances() {
        let store = Memory::new();
        let mut account = Account::with_balance(AccountId(1), 0, Money::from_units(40));
        account.balances.withdrawable = Money::from_units(40);
        let mut layer = layer_for(&store, account);

        let snapshot = layer.handle_withdraw(Money::from_units(15)).unwrap();
        assert_eq!(snapshot.real_balance, Money::from_units(25));
        assert_eq!(snapshot.withdrawable_balance, Money::from_units(25));
        assert_eq!(layer.pending()[0].kind, LedgerKind::Withdrawal);
    }

    #[test]
    fn test_withdraw_beyond_withdrawable_fails() {
        let store = Memory::new();
        let mut account = Account::with_balance(AccountId(1), 0, Money::from_units(40));
        account.balances.withdrawable = Money::from_units(10);
        let mut layer = layer_for(&store, account);

        assert!(matches!(
            layer.handle_withdraw(Money::from_units(11)),
            Err(DepositError::InsufficientWithdrawable { .. })
        ));
        assert!(layer.pending().is_empty());
    }

    #[test]
    fn test_withdraw_capped_by_real_balance() {
        let store = Memory::new();
        let mut account = Account::with_balance(AccountId(1), 0, Money::from_units(5));
        account.balances.withdrawable = Money::from_units(40);
        let mut layer = layer_for(&store, account);
        assert!(matches!(
            layer.handle_withdraw(Money::from_units(10)),
            Err(DepositError::InsufficientWithdrawable { .. })
        ));
    }
}
