//! Storage Layer Module
//!
//! Provides persistence for wallets, the ledger and the deposit,
//! sweep and withdrawal records.
//!
//! This module contains:
//! - Storage trait definitions for abstraction
//! - SQLite implementation for production
//! - In-memory implementation for testing

pub mod memory;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    AddressStore, CoreStore, DepositStore, IntakeStats, StorageError, StorageResult, SweepStore,
    WalletStore, WithdrawalStats, WithdrawalStore,
};
