//! JSON shapes exchanged with HTTP and WebSocket clients.

use serde::{Deserialize, Serialize};

use crate::casino::{
    Account, AccountId, Affiliate, AffiliateId, BalanceSnapshot, Grid, Money, PlayOutcome, Tier,
    UnlockOffer,
};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountResponse {
    pub account_id: AccountId,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: AccountId,
    pub player_tier: Tier,
    #[serde(flatten)]
    pub balances: BalanceSnapshot,
    pub total_plays: u64,
    pub loss_streak: u32,
    pub total_wagered: Money,
    pub total_deposited: Money,
    pub affiliate_id: Option<AffiliateId>,
}

impl From<&Account> for ProfileResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            player_tier: account.tier,
            balances: account.snapshot(),
            total_plays: account.play.total_plays,
            loss_streak: account.play.loss_streak,
            total_wagered: account.rollover.total_wagered,
            total_deposited: account.deposits.total_deposited,
            affiliate_id: account.affiliate,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    pub price: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrizeView {
    pub value: Money,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayResponse {
    pub success: bool,
    pub is_winner: bool,
    pub winning_prize: PrizeView,
    pub grid_symbols: Grid,
    pub new_balance: Money,
    pub new_bonus_vault_balance: Money,
    pub withdrawable_balance: Money,
    pub total_plays: u64,
}

impl From<&PlayOutcome> for PlayResponse {
    fn from(outcome: &PlayOutcome) -> Self {
        let winning_prize = match outcome.decision.prize() {
            Some(prize) => PrizeView {
                value: prize.amount,
                name: prize.label.clone(),
            },
            None => PrizeView {
                value: Money::ZERO,
                name: String::new(),
            },
        };
        Self {
            success: true,
            is_winner: outcome.is_winner(),
            winning_prize,
            grid_symbols: outcome.grid,
            new_balance: outcome.balances.real_balance,
            new_bonus_vault_balance: outcome.balances.bonus_vault_balance,
            withdrawable_balance: outcome.balances.withdrawable_balance,
            total_plays: outcome.total_plays,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount: serde_json::Value,
    #[serde(default, rename = "pixKey")]
    pub pix_key: Option<String>,
}

/// Answer to a withdrawal request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WithdrawalStatus {
    ReadyToWithdraw {
        amount: Money,
    },
    UnlockVaultPrompt {
        #[serde(rename = "vaultBalance")]
        vault_balance: Money,
        offers: Vec<UnlockOffer>,
    },
    NothingToWithdraw,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawResponse {
    pub success: bool,
    #[serde(flatten)]
    pub balances: BalanceSnapshot,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCouponRequest {
    pub coupon_code: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCouponResponse {
    pub success: bool,
    pub message: String,
    pub affiliate_id: AffiliateId,
    pub bonus_amount: Money,
    pub new_balance: Money,
}

fn default_affiliate_bonus() -> Money {
    Money::from_units(10)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAffiliateRequest {
    pub name: String,
    pub referral_code: String,
    #[serde(default = "default_affiliate_bonus")]
    pub bonus_amount: Money,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateResponse {
    pub success: bool,
    pub affiliate: Affiliate,
}

#[derive(Debug, Deserialize)]
pub struct DepositWebhook {
    pub event: String,
    pub data: DepositWebhookData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositWebhookData {
    pub account_id: AccountId,
    pub amount: Money,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Messages a WebSocket client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth { token: String },
}

/// Messages pushed to a WebSocket client.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Authenticated {
        #[serde(rename = "accountId")]
        account_id: AccountId,
    },
    Balance(BalanceSnapshot),
}
