//! Casino domain types.
//!
//! Defines money, account, grid/outcome and ledger types plus the funnel constants used by the
//! execution layer and the server.

mod account;
mod constants;
mod game;
mod ledger;
mod money;

pub use account::*;
pub use constants::*;
pub use game::*;
pub use ledger::*;
pub use money::*;
