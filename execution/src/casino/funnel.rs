//! Funnel policy engine.
//!
//! Rules are evaluated in order and the first match wins:
//! 1. Hook: the 4th or 5th play of an account that has never won and holds less than the hook
//!    amount in its vault pays [`FunnelConfig::hook_amount`].
//! 2. Recovery: a play that would otherwise extend the loss streak to
//!    [`FunnelConfig::recovery_threshold`] pays a whole amount in `[1, recovery_max]`.
//! 3. Everything else loses.
//!
//! There is no base win probability. The only randomness is the recovery prize size.

use raspa_types::casino::{
    Account, Decision, Money, Prize, HOOK_AMOUNT, HOOK_WINDOW, RECOVERY_MAX, RECOVERY_THRESHOLD,
};
use rand::Rng;
use thiserror::Error as ThisError;

/// Largest recovery draw, in whole units, that still fits in cents.
pub const MAX_RECOVERY_UNITS: u64 = u64::MAX / 100;

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum FunnelConfigError {
    #[error("recovery_max must be in 1..={MAX_RECOVERY_UNITS} (got {0})")]
    RecoveryMax(u64),
    #[error("recovery_threshold must be > 0")]
    RecoveryThreshold,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunnelConfig {
    pub hook_amount: Money,
    /// Zero-based prior-play counts on which the hook may fire.
    pub hook_window: Vec<u64>,
    pub recovery_threshold: u32,
    /// Inclusive upper bound of the recovery draw, in whole units.
    pub recovery_max: u64,
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            hook_amount: HOOK_AMOUNT,
            hook_window: HOOK_WINDOW.to_vec(),
            recovery_threshold: RECOVERY_THRESHOLD,
            recovery_max: RECOVERY_MAX,
        }
    }
}

impl FunnelConfig {
    pub fn validate(&self) -> Result<(), FunnelConfigError> {
        if !(1..=MAX_RECOVERY_UNITS).contains(&self.recovery_max) {
            return Err(FunnelConfigError::RecoveryMax(self.recovery_max));
        }
        if self.recovery_threshold == 0 {
            return Err(FunnelConfigError::RecoveryThreshold);
        }
        Ok(())
    }

    fn hook_eligible(&self, account: &Account) -> bool {
        let never_won = u64::from(account.play.loss_streak) == account.play.total_plays;
        self.hook_window.contains(&account.play.total_plays)
            && never_won
            && account.balances.bonus_vault < self.hook_amount
    }

    fn recovery_due(&self, account: &Account) -> bool {
        account.play.loss_streak.saturating_add(1) >= self.recovery_threshold
    }
}

/// Decide the outcome of one play from the pre-play counters.
///
/// `stake` has already been validated as non-zero by the caller; it does not influence the
/// verdict. The account is never mutated.
pub fn decide<R: Rng + ?Sized>(
    config: &FunnelConfig,
    account: &Account,
    stake: Money,
    rng: &mut R,
) -> Decision {
    debug_assert!(!stake.is_zero(), "stake must be validated before deciding");

    if config.hook_eligible(account) {
        return Decision::Win(Prize::hook(config.hook_amount));
    }

    if config.recovery_due(account) {
        let units = rng.gen_range(1..=config.recovery_max.clamp(1, MAX_RECOVERY_UNITS));
        let amount = Money::checked_from_units(units).unwrap_or(Money::from_units(1));
        return Decision::Win(Prize::recovery(amount));
    }

    Decision::Loss
}
