use super::super::*;
use raspa_types::casino::{Decision, PlayOutcome};
use rand::Rng;
use thiserror::Error as ThisError;

use crate::casino::{decide, render, FunnelConfig};

#[derive(Debug, ThisError)]
pub enum PlayError {
    #[error("account {0} not found")]
    AccountNotFound(AccountId),
    #[error("invalid stake: {0}")]
    InvalidStake(String),
    #[error("insufficient balance: have {balance}, stake {stake}")]
    InsufficientBalance { balance: Money, stake: Money },
    #[error("account {0} is busy, retry later")]
    AccountBusy(AccountId),
    #[error("arithmetic overflow updating {0}")]
    Overflow(&'static str),
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

fn add(field: &'static str, a: Money, b: Money) -> Result<Money, PlayError> {
    a.checked_add(b).ok_or(PlayError::Overflow(field))
}

/// Next account state after one play with the given decision.
///
/// The stake is debited from the real balance, any prize goes to the vault, every rollover
/// accumulator grows by the stake, plays advance by one and the loss streak resets on a win.
pub fn apply_play(account: &Account, stake: Money, decision: &Decision) -> Result<Account, PlayError> {
    let real = account
        .balances
        .real
        .checked_sub(stake)
        .ok_or(PlayError::InsufficientBalance {
            balance: account.balances.real,
            stake,
        })?;

    let mut next = account.clone();
    next.balances.real = real;
    next.balances.bonus_vault = add("bonus_vault", account.balances.bonus_vault, decision.prize_amount())?;
    next.rollover.total_wagered = add("total_wagered", account.rollover.total_wagered, stake)?;
    next.rollover.deposit = add("deposit_rollover", account.rollover.deposit, stake)?;
    next.rollover.bonus = add("bonus_rollover", account.rollover.bonus, stake)?;
    next.play.total_plays = account
        .play
        .total_plays
        .checked_add(1)
        .ok_or(PlayError::Overflow("total_plays"))?;
    next.play.loss_streak = if decision.is_winner() {
        0
    } else {
        account
            .play
            .loss_streak
            .checked_add(1)
            .ok_or(PlayError::Overflow("loss_streak"))?
    };
    Ok(next)
}

impl<'a, S: Store> Layer<'a, S> {
    /// Stage one play against the locked account.
    pub(crate) fn handle_play<R: Rng + ?Sized>(
        &mut self,
        config: &FunnelConfig,
        stake: Money,
        rng: &mut R,
    ) -> Result<PlayOutcome, PlayError> {
        if stake.is_zero() {
            return Err(PlayError::InvalidStake("stake must be greater than zero".to_string()));
        }
        if self.account.balances.real < stake {
            return Err(PlayError::InsufficientBalance {
                balance: self.account.balances.real,
                stake,
            });
        }

        let decision = decide(config, &self.account, stake, rng);
        let next = apply_play(&self.account, stake, &decision)?;
        let grid = render(decision.is_winner(), rng);

        self.account = next;
        self.record(LedgerKind::GameBet, stake, "scratch card");
        if let Some(prize) = decision.prize() {
            self.record(LedgerKind::GameWin, prize.amount, prize.label.clone());
        }

        Ok(PlayOutcome {
            account: self.account.id,
            stake,
            grid,
            balances: self.account.snapshot(),
            total_plays: self.account.play.total_plays,
            loss_streak: self.account.play.loss_streak,
            decision,
        })
    }
}
