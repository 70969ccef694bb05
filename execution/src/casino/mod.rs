//! Scratch-card game logic.
//!
//! [`funnel`] decides whether a play wins and what it pays; [`grid`] draws a card that agrees with
//! that decision. Neither touches storage or performs I/O, so both are safe to call while the
//! account lock is held.

pub mod funnel;
pub mod grid;

pub use funnel::{decide, FunnelConfig, FunnelConfigError, MAX_RECOVERY_UNITS};
pub use grid::render;
