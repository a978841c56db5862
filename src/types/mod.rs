//! Shared Types Module
//!
//! Data types shared across the custodia core.

pub mod address;
pub mod chain;
pub mod deposit;
pub mod ledger;
pub mod money;
pub mod sweep;
pub mod wallet;
pub mod withdrawal;

// Re-exports for convenience
pub use address::{AddressStatus, WalletAddress};
pub use chain::{is_valid_tx_hash, AddressScheme, ChainType};
pub use deposit::{
    ChainDeposit, ChainDepositStatus, ClaimStatus, FiatDepositClaim, FiatMethod, SweepType,
};
pub use ledger::{
    EntryDirection, EntryDraft, EntryKind, EntryStatus, LedgerEntry, PostError, Posting,
};
pub use money::{quantize, Currency, UserId};
pub use sweep::{SweepRecord, SweepStatus};
pub use wallet::{Wallet, WalletStatus};
pub use withdrawal::{
    PayoutMethod, PayoutSpec, WithdrawalRequest, WithdrawalStatus,
};
