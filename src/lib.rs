//! Custodia - Custodial Accounting Core
//!
//! The books of record for a multi-currency custodial platform. Every
//! user balance lives in a wallet, every balance change is a ledger
//! entry, and the services in this crate are the only write paths.
//!
//! ## Services
//!
//! 1. **Wallet Service** - Per-user, per-currency balances over an append-only ledger
//! 2. **Address Registry** - Deterministic deposit address assignment per chain
//! 3. **Deposit Intake** - Fiat claims (admin-settled) and on-chain deposits (confirmation-settled)
//! 4. **Confirmation Tracker** - Advances on-chain deposits to settlement as confirmations arrive
//! 5. **Sweep Engine** - Moves confirmed deposits into the platform custody address
//! 6. **Withdrawal Service** - Escrowed withdrawal lifecycle from request to payout
//!
//! ## External Boundaries
//!
//! Chain watching, payment rails and identity verification live outside
//! this crate. They come in through the [`sweep::CustodyTransfer`] and
//! [`withdrawal::IdentityCheck`] capabilities and the intake entry points.

// Core modules
pub mod config;
pub mod deposit;
pub mod error;
pub mod logging;
pub mod provision;
pub mod registry;
pub mod storage;
pub mod sweep;
pub mod types;
pub mod wallet;
pub mod withdrawal;

// Re-exports: errors
pub use error::{CustodiaError, Result};

// Re-exports: configuration
pub use config::{ChainConfig, CurrencyConfig, CustodiaConfig};

// Re-exports: wallet service
pub use wallet::WalletService;

// Re-exports: address registry
pub use registry::{AddressRegistry, KeyMaterial};

// Re-exports: deposit intake and confirmation tracking
pub use deposit::{ConfirmationAdvance, ConfirmationTracker, DepositIntake, SweepReport};

// Re-exports: custody sweep
pub use sweep::{CustodyTransfer, SweepEngine, TransferError, TransferReceipt, TransferRequest};

// Re-exports: withdrawals
pub use withdrawal::{IdentityCheck, WithdrawalLimits, WithdrawalService};

// Re-exports: provisioning
pub use provision::{ProvisionReport, Provisioner};

// Re-exports: storage
pub use storage::{CoreStore, MemoryStore, SqliteStore, StorageError};

// Re-exports: domain types
pub use types::{
    ChainDeposit, ChainDepositStatus, ChainType, ClaimStatus, Currency, EntryKind, EntryStatus,
    FiatDepositClaim, FiatMethod, LedgerEntry, PayoutSpec, Posting, SweepRecord, SweepStatus,
    SweepType, UserId, Wallet, WalletAddress, WalletStatus, WithdrawalRequest, WithdrawalStatus,
};
