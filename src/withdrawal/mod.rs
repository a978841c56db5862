//! Withdrawal Module
//!
//! The full withdrawal lifecycle: request with escrow, admin review,
//! settlement or refund. Funds leave the spendable balance the moment
//! the request is accepted.

pub mod service;

pub use service::{IdentityCheck, WithdrawalLimits, WithdrawalService};

#[cfg(test)]
pub use service::MockIdentityCheck;
