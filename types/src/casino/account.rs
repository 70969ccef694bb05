use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error as ThisError;

use super::Money;

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum AccountInvariantError {
    #[error("loss_streak exceeds total_plays (streak={streak}, plays={plays})")]
    StreakExceedsPlays { streak: u32, plays: u64 },
}

/// Opaque, immutable account identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(AccountId)
    }
}

/// Affiliate (referral partner) identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AffiliateId(pub u64);

impl fmt::Display for AffiliateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Referral partner whose coupon code credits a one-time bonus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Affiliate {
    pub id: AffiliateId,
    pub name: String,
    pub referral_code: String,
    /// Credited to the real balance of an account that applies this code.
    pub bonus_amount: Money,
}

/// Player segment fixed by the first deposit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Standard,
    Vip,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Standard => "standard",
            Tier::Vip => "vip",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "standard" => Some(Tier::Standard),
            "vip" => Some(Tier::Vip),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct AccountBalances {
    /// Spendable balance; stakes are debited from here.
    pub real: Money,
    /// Locked prizes awaiting a deposit-triggered unlock.
    pub bonus_vault: Money,
    /// Real balance that cleared rollover and may be paid out.
    pub withdrawable: Money,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PlayCounters {
    /// Consecutive losing plays since the last win.
    pub loss_streak: u32,
    pub total_plays: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct RolloverProgress {
    pub total_wagered: Money,
    /// Wagered since the last deposit; reset by every deposit.
    pub deposit: Money,
    pub bonus: Money,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct DepositHistory {
    pub total_deposited: Money,
    pub last_deposit_amount: Money,
}

/// Durable per-player record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub tier: Tier,
    pub balances: AccountBalances,
    pub play: PlayCounters,
    pub rollover: RolloverProgress,
    pub deposits: DepositHistory,
    /// Set once, by the first coupon the account applies.
    pub affiliate: Option<AffiliateId>,
    pub created_at_ms: u64,
}

impl Account {
    pub fn new(id: AccountId, created_at_ms: u64) -> Self {
        Self {
            id,
            tier: Tier::Standard,
            balances: AccountBalances::default(),
            play: PlayCounters::default(),
            rollover: RolloverProgress::default(),
            deposits: DepositHistory::default(),
            affiliate: None,
            created_at_ms,
        }
    }

    /// Same as [`Account::new`] with an initial real balance.
    pub fn with_balance(id: AccountId, created_at_ms: u64, real: Money) -> Self {
        let mut account = Self::new(id, created_at_ms);
        account.balances.real = real;
        account
    }

    pub fn validate_invariants(&self) -> Result<(), AccountInvariantError> {
        if u64::from(self.play.loss_streak) > self.play.total_plays {
            return Err(AccountInvariantError::StreakExceedsPlays {
                streak: self.play.loss_streak,
                plays: self.play.total_plays,
            });
        }
        Ok(())
    }

    pub fn is_first_deposit(&self) -> bool {
        self.deposits.total_deposited.is_zero()
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot::from_account(self)
    }
}

/// Post-transaction balances pushed to clients and returned with every outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub real_balance: Money,
    pub bonus_vault_balance: Money,
    pub withdrawable_balance: Money,
}

impl BalanceSnapshot {
    pub fn from_account(account: &Account) -> Self {
        Self {
            real_balance: account.balances.real,
            bonus_vault_balance: account.balances.bonus_vault,
            withdrawable_balance: account.balances.withdrawable,
        }
    }
}
