//! Raspa execution layer.
//!
//! This crate owns the balance-affecting game-play transaction and the deposit/withdrawal
//! operations that share its locking discipline. The primary entrypoint is [`Casino`].
//!
//! ## Transaction invariants
//! - Every operation on an account runs under that account's lock ([`locks::AccountLocks`]) and
//!   re-reads the account from the store after acquiring it. Nothing is cached across operations.
//! - Changes are staged in a [`Layer`] and reach the store through a single atomic
//!   [`Store::commit`] together with their ledger entries. A failure anywhere before commit drops
//!   the layer and leaves the stored account untouched.
//! - The read-modify-commit runs on tokio's blocking pool. The lock guard moves into that task
//!   and is released only after commit and notification, so pushes for one account leave in
//!   commit order. The funnel policy and grid renderer are pure in-memory computations.
//! - Money is integer cents; every addition is checked and overflow fails the operation.
//!
//! ## Minimal play (example)
//! ```rust,ignore
//! use raspa_execution::{Casino, CasinoConfig, Memory, Store};
//! use raspa_types::Money;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let casino = Casino::new(Memory::new(), CasinoConfig::default());
//! let account = casino.create_account().await?;
//! casino.credit_deposit(account.id, Money::from_units(30)).await?;
//! let outcome = casino.play_game(account.id, Money::from_units(1)).await?;
//! println!("winner={} grid={:?}", outcome.is_winner(), outcome.grid);
//! # Ok(())
//! # }
//! ```

pub mod casino;
pub mod locks;
pub mod notify;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

#[cfg(test)]
mod integration_tests;

mod coordinator;
mod layer;
mod sqlite;
mod state;

pub use casino::{decide, render, FunnelConfig, FunnelConfigError};
pub use coordinator::{Casino, CasinoConfig, DEFAULT_LOCK_TIMEOUT};
pub use layer::{apply_play, CouponReceipt, DepositError, DepositReceipt, Layer, PlayError};
pub use locks::{AccountGuard, AccountLocks, LockTimeout};
pub use notify::{NoopNotifier, Notifier};
pub use sqlite::SqliteStore;
pub use state::{run_blocking, Memory, Store, StoreError};
