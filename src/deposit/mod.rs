//! Deposit Module
//!
//! Two intake paths onto the ledger: fiat claims that an admin settles by
//! hand, and on-chain deposits that settle themselves once the chain has
//! confirmed them.

pub mod intake;
pub mod tracker;

pub use intake::DepositIntake;
pub use tracker::{ConfirmationAdvance, ConfirmationTracker, SweepReport};
