//! Wallet Module
//!
//! Per-user, per-currency balance custody. Every balance change goes
//! through the ledger; the wallet service is the only write path.

pub mod service;

pub use service::WalletService;
