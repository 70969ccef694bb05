use super::super::*;
use raspa_types::casino::{Affiliate, BalanceSnapshot};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CouponReceipt {
    pub account: AccountId,
    pub affiliate: Affiliate,
    pub balances: BalanceSnapshot,
}

impl<'a, S: Store> Layer<'a, S> {
    /// Bind the account to the affiliate behind `code` and credit its bonus to the real balance.
    /// An account binds at most once.
    pub(crate) fn handle_apply_coupon(&mut self, code: &str) -> Result<CouponReceipt, DepositError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(DepositError::InvalidCoupon("coupon code is empty".to_string()));
        }
        if let Some(existing) = self.account.affiliate {
            return Err(DepositError::AlreadyAffiliated(existing));
        }
        let affiliate = self
            .store
            .find_affiliate(code)?
            .ok_or_else(|| DepositError::InvalidCoupon(format!("unknown coupon {code:?}")))?;

        let balances = &mut self.account.balances;
        balances.real = balances
            .real
            .checked_add(affiliate.bonus_amount)
            .ok_or(DepositError::Overflow("real"))?;
        self.account.affiliate = Some(affiliate.id);
        if !affiliate.bonus_amount.is_zero() {
            self.record(
                LedgerKind::AffiliateBonus,
                affiliate.bonus_amount,
                format!("affiliate coupon {}", affiliate.referral_code),
            );
        }

        Ok(CouponReceipt {
            account: self.account.id,
            balances: self.account.snapshot(),
            affiliate,
        })
    }
}
