use serde::{Deserialize, Serialize};

use super::{AccountId, Money};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Deposit,
    Withdrawal,
    GameBet,
    GameWin,
    VaultUnlock,
    AffiliateBonus,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Deposit => "deposit",
            LedgerKind::Withdrawal => "withdrawal",
            LedgerKind::GameBet => "game_bet",
            LedgerKind::GameWin => "game_win",
            LedgerKind::VaultUnlock => "vault_unlock",
            LedgerKind::AffiliateBonus => "affiliate_bonus",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "deposit" => Some(LedgerKind::Deposit),
            "withdrawal" => Some(LedgerKind::Withdrawal),
            "game_bet" => Some(LedgerKind::GameBet),
            "game_win" => Some(LedgerKind::GameWin),
            "vault_unlock" => Some(LedgerKind::VaultUnlock),
            "affiliate_bonus" => Some(LedgerKind::AffiliateBonus),
            _ => None,
        }
    }
}

/// Append-only money movement, committed atomically with the account row it touches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub account: AccountId,
    pub kind: LedgerKind,
    pub amount: Money,
    pub description: String,
    pub created_at_ms: u64,
}

impl LedgerEntry {
    pub fn new(
        account: AccountId,
        kind: LedgerKind,
        amount: Money,
        description: impl Into<String>,
        created_at_ms: u64,
    ) -> Self {
        Self {
            account,
            kind,
            amount,
            description: description.into(),
            created_at_ms,
        }
    }
}
