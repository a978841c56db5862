//! Custody Sweep Module
//!
//! Moves confirmed on-chain deposits from per-user deposit addresses into
//! the platform custody address, and keeps the custody float ledger in
//! step with what actually moved.

pub mod engine;

pub use engine::{
    CustodyTransfer, SweepEngine, TransferError, TransferReceipt, TransferRequest,
};

#[cfg(test)]
pub use engine::MockCustodyTransfer;
