mod affiliate;
mod deposit;
mod game;

pub use affiliate::CouponReceipt;
pub use deposit::{DepositError, DepositReceipt};
pub use game::{apply_play, PlayError};
