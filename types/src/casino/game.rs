use serde::{Deserialize, Serialize};

use super::{AccountId, BalanceSnapshot, Money, GRID_CELLS};

/// Scratch-card symbols.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Symbol {
    Gem,
    MoneyBag,
    Bell,
    Clover,
    Cherries,
    Lemon,
    Star,
}

impl Symbol {
    pub const ALL: [Symbol; 7] = [
        Symbol::Gem,
        Symbol::MoneyBag,
        Symbol::Bell,
        Symbol::Clover,
        Symbol::Cherries,
        Symbol::Lemon,
        Symbol::Star,
    ];
}

/// The 8 lines of a 3x3 card: rows, columns, diagonals.
pub const GRID_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Row-major 3x3 card. Cosmetic only: the win/loss decision never reads it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid(pub [Symbol; GRID_CELLS]);

impl Grid {
    pub fn cells(&self) -> &[Symbol; GRID_CELLS] {
        &self.0
    }

    /// Lines holding three equal symbols.
    pub fn winning_lines(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        GRID_LINES.into_iter().filter(|[a, b, c]| {
            self.0[*a] == self.0[*b] && self.0[*a] == self.0[*c]
        })
    }

    pub fn has_winning_line(&self) -> bool {
        self.winning_lines().next().is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrizeKind {
    /// One-off welcome prize in the first five plays.
    Hook,
    /// Backstop prize after a bounded losing streak.
    Recovery,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prize {
    pub kind: PrizeKind,
    pub amount: Money,
    pub label: String,
}

impl Prize {
    pub fn hook(amount: Money) -> Self {
        Self {
            kind: PrizeKind::Hook,
            amount,
            label: format!("welcome prize R$ {amount}"),
        }
    }

    pub fn recovery(amount: Money) -> Self {
        Self {
            kind: PrizeKind::Recovery,
            amount,
            label: format!("recovery prize R$ {amount}"),
        }
    }
}

/// Funnel policy verdict for a single play.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Win(Prize),
    Loss,
}

impl Decision {
    pub fn is_winner(&self) -> bool {
        matches!(self, Decision::Win(_))
    }

    pub fn prize(&self) -> Option<&Prize> {
        match self {
            Decision::Win(prize) => Some(prize),
            Decision::Loss => None,
        }
    }

    /// Amount credited to the vault (zero on a loss).
    pub fn prize_amount(&self) -> Money {
        self.prize().map(|prize| prize.amount).unwrap_or(Money::ZERO)
    }
}

/// Transient projection of a committed play.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayOutcome {
    pub account: AccountId,
    pub stake: Money,
    pub decision: Decision,
    pub grid: Grid,
    pub balances: BalanceSnapshot,
    pub total_plays: u64,
    pub loss_streak: u32,
}

impl PlayOutcome {
    pub fn is_winner(&self) -> bool {
        self.decision.is_winner()
    }
}
