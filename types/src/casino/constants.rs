use super::Money;

/// Welcome prize credited to the vault by the hook win.
pub const HOOK_AMOUNT: Money = Money::from_units(100);

/// Prior-play counts (zero-based) on which the hook win may fire: the 4th and 5th play.
pub const HOOK_WINDOW: [u64; 2] = [3, 4];

/// Loss streak length that forces a recovery win on the next play.
pub const RECOVERY_THRESHOLD: u32 = 5;

/// Upper bound (inclusive, whole units) of the recovery prize draw.
pub const RECOVERY_MAX: u64 = 5;

/// Number of symbols on a scratch card.
pub const GRID_CELLS: usize = 9;

/// Reject-resample budget for losing grids.
pub const MAX_GRID_ATTEMPTS: usize = 20;

/// First deposits at or above this amount mark the account as VIP.
pub const VIP_DEPOSIT_THRESHOLD: Money = Money::from_units(100);

/// Share of the vault a standard account unlocks per deposit (basis points).
pub const STANDARD_UNLOCK_BPS: u16 = 1_000; // 10%

/// Wager multiple of the last deposit required before real balance becomes withdrawable.
pub const DEPOSIT_ROLLOVER_MULTIPLIER: u64 = 2;

/// Deposit offers shown when a player with a locked vault asks to withdraw.
pub const UNLOCK_OFFERS: [UnlockOffer; 2] = [
    UnlockOffer {
        amount: Money::from_units(30),
        vip: false,
    },
    UnlockOffer {
        amount: Money::from_units(100),
        vip: true,
    },
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockOffer {
    pub amount: Money,
    #[serde(rename = "isVip")]
    pub vip: bool,
}
