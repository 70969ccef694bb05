//! Common types for the raspa scratch-card backend.
//!
//! [`casino`] holds the domain model (money, accounts, symbols, outcomes) shared by the
//! execution core and the server. [`api`] holds the JSON shapes exchanged with clients.

pub mod api;
pub mod casino;

pub use casino::{
    Account, AccountId, BalanceSnapshot, Decision, Grid, LedgerEntry, LedgerKind, Money,
    PlayOutcome, Prize, PrizeKind, Symbol, Tier,
};
