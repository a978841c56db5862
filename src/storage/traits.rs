//! Storage Trait Definitions
//!
//! Abstract storage interfaces for wallets, the ledger, deposit addresses,
//! deposits, sweeps and withdrawals. Implementations can use SQLite
//! (production) or in-memory (testing).
//!
//! Compound operations (`post`, `approve_claim`, `confirm_deposit`,
//! `begin_sweep`, `complete_sweep`, `create_withdrawal`, the withdrawal
//! transitions) are the atomic units of the accounting core: each one
//! re-checks its preconditions and applies every write inside a single
//! transaction or lock scope, so balances and ledger entries can never
//! drift apart.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::types::address::WalletAddress;
use crate::types::chain::ChainType;
use crate::types::deposit::{ChainDeposit, ChainDepositStatus, ClaimStatus, FiatDepositClaim};
use crate::types::ledger::{EntryDraft, LedgerEntry, PostError, Posting};
use crate::types::money::{Currency, UserId};
use crate::types::sweep::{SweepRecord, SweepStatus};
use crate::types::wallet::{Wallet, WalletStatus};
use crate::types::withdrawal::{WithdrawalRequest, WithdrawalStatus};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// A precondition re-checked inside the atomic unit no longer held
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The ledger rejected a posting
    #[error("Posting rejected: {0}")]
    Ledger(#[from] PostError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Wallet and ledger storage interface
///
/// Implementations:
/// - `SqliteStore` - Production storage with SQLite
/// - `MemoryStore` - In-memory storage for testing
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Get the wallet for (user, currency), creating an empty active one
    /// if it does not exist yet
    async fn get_or_create_wallet(&self, user: UserId, currency: Currency)
        -> StorageResult<Wallet>;

    /// Get a wallet if it exists
    async fn wallet(&self, user: UserId, currency: Currency) -> StorageResult<Option<Wallet>>;

    /// All wallets owned by a user
    async fn wallets_for_user(&self, user: UserId) -> StorageResult<Vec<Wallet>>;

    /// Set a wallet's status
    async fn set_wallet_status(
        &self,
        user: UserId,
        currency: Currency,
        status: WalletStatus,
    ) -> StorageResult<Wallet>;

    /// Apply one entry draft atomically: mutate the wallet balance and
    /// append the ledger entry in the same unit. Creates the wallet lazily
    /// for credits to users that have never transacted.
    async fn post(&self, draft: EntryDraft) -> StorageResult<Posting>;

    /// Ledger entries for a user, newest first
    async fn entries_for_user(
        &self,
        user: UserId,
        currency: Option<Currency>,
        limit: usize,
    ) -> StorageResult<Vec<LedgerEntry>>;
}

/// Deposit address storage interface
#[async_trait]
pub trait AddressStore: Send + Sync {
    /// Insert a derived address; `Duplicate` if (user, chain) already has one
    async fn insert_address(&self, address: &WalletAddress) -> StorageResult<()>;

    /// Get the address assigned to (user, chain)
    async fn address_for(
        &self,
        user: UserId,
        chain: ChainType,
    ) -> StorageResult<Option<WalletAddress>>;

    /// All addresses assigned to a user
    async fn addresses_for_user(&self, user: UserId) -> StorageResult<Vec<WalletAddress>>;

    /// Stamp the address's last-used time
    async fn mark_address_used(&self, user: UserId, chain: ChainType) -> StorageResult<()>;
}

/// Deposit storage interface (fiat claims and chain deposits)
#[async_trait]
pub trait DepositStore: Send + Sync {
    /// Insert a new fiat deposit claim
    async fn insert_claim(&self, claim: &FiatDepositClaim) -> StorageResult<()>;

    /// Get a claim by ID
    async fn claim(&self, id: Uuid) -> StorageResult<Option<FiatDepositClaim>>;

    /// Claims filed by a user, newest first
    async fn claims_for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> StorageResult<Vec<FiatDepositClaim>>;

    /// All claims with a specific status
    async fn claims_by_status(&self, status: ClaimStatus) -> StorageResult<Vec<FiatDepositClaim>>;

    /// Atomic: re-check the claim is still pending, credit the user's fiat
    /// wallet and mark the claim approved
    async fn approve_claim(
        &self,
        id: Uuid,
        admin: UserId,
    ) -> StorageResult<(FiatDepositClaim, Posting)>;

    /// Atomic: re-check the claim is still pending and mark it rejected.
    /// No balance effect.
    async fn reject_claim(
        &self,
        id: Uuid,
        admin: UserId,
        reason: String,
    ) -> StorageResult<FiatDepositClaim>;

    /// Insert a new chain deposit; `Duplicate` if the tx hash is already known
    async fn insert_chain_deposit(&self, deposit: &ChainDeposit) -> StorageResult<()>;

    /// Get a chain deposit by ID
    async fn chain_deposit(&self, id: Uuid) -> StorageResult<Option<ChainDeposit>>;

    /// Get a chain deposit by transaction hash
    async fn chain_deposit_by_tx_hash(&self, tx_hash: &str)
        -> StorageResult<Option<ChainDeposit>>;

    /// Chain deposits observed for a user, newest first
    async fn chain_deposits_for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> StorageResult<Vec<ChainDeposit>>;

    /// All chain deposits with a specific status
    async fn chain_deposits_by_status(
        &self,
        status: ChainDepositStatus,
    ) -> StorageResult<Vec<ChainDeposit>>;

    /// Raise the stored confirmation count (monotonic, lower counts are
    /// ignored) and record the block number if given
    async fn record_confirmations(
        &self,
        id: Uuid,
        confirmations: u32,
        block_number: Option<u64>,
    ) -> StorageResult<ChainDeposit>;

    /// Atomic exactly-once settlement: re-check the deposit is still
    /// pending and at its confirmation threshold, mark it confirmed,
    /// credit the user's wallet and mirror the credit into the custody
    /// float account. Returns the user-facing posting.
    async fn confirm_deposit(&self, id: Uuid) -> StorageResult<(ChainDeposit, Posting)>;

    /// Aggregate intake counters
    async fn intake_stats(&self) -> StorageResult<IntakeStats>;
}

/// Sweep storage interface
#[async_trait]
pub trait SweepStore: Send + Sync {
    /// Atomically claim a confirmed deposit for sweeping: the deposit must
    /// be confirmed and have no active (pending or completed) sweep, then
    /// the pending record is inserted. A previously failed sweep does not
    /// block a retry.
    async fn begin_sweep(&self, record: &SweepRecord) -> StorageResult<()>;

    /// Atomic: mark the sweep completed, the deposit swept, and debit the
    /// custody float account. Returns the float posting.
    async fn complete_sweep(
        &self,
        sweep_id: Uuid,
        tx_hash: String,
        gas_fee: Decimal,
    ) -> StorageResult<(SweepRecord, ChainDeposit, Posting)>;

    /// Mark the sweep failed; the deposit stays confirmed for retry
    async fn fail_sweep(&self, sweep_id: Uuid, error: String) -> StorageResult<SweepRecord>;

    /// Get a sweep record by ID
    async fn sweep(&self, id: Uuid) -> StorageResult<Option<SweepRecord>>;

    /// All sweep attempts against a deposit, newest first
    async fn sweeps_for_deposit(&self, deposit_id: Uuid) -> StorageResult<Vec<SweepRecord>>;

    /// All sweep records with a specific status
    async fn sweeps_by_status(&self, status: SweepStatus) -> StorageResult<Vec<SweepRecord>>;
}

/// Withdrawal storage interface
#[async_trait]
pub trait WithdrawalStore: Send + Sync {
    /// Atomic escrow: debit amount + fee from the user's wallet (the escrow
    /// entry stays pending until the request settles) and insert the request
    async fn create_withdrawal(&self, request: &WithdrawalRequest) -> StorageResult<Posting>;

    /// Get a withdrawal request by ID
    async fn withdrawal(&self, id: Uuid) -> StorageResult<Option<WithdrawalRequest>>;

    /// Requests filed by a user, newest first
    async fn withdrawals_for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> StorageResult<Vec<WithdrawalRequest>>;

    /// All requests with a specific status
    async fn withdrawals_by_status(
        &self,
        status: WithdrawalStatus,
    ) -> StorageResult<Vec<WithdrawalRequest>>;

    /// Total amount requested today (UTC) by a user in cap-counted statuses
    async fn withdrawn_today(&self, user: UserId, currency: Currency) -> StorageResult<Decimal>;

    /// Pending -> approved
    async fn approve_withdrawal(
        &self,
        id: Uuid,
        admin: UserId,
        notes: Option<String>,
    ) -> StorageResult<WithdrawalRequest>;

    /// Approved -> processing
    async fn start_processing(&self, id: Uuid, admin: UserId) -> StorageResult<WithdrawalRequest>;

    /// Approved/processing -> completed; the escrow ledger entry advances to
    /// completed in the same unit
    async fn complete_withdrawal(
        &self,
        id: Uuid,
        admin: UserId,
        tx_hash: Option<String>,
        notes: Option<String>,
    ) -> StorageResult<WithdrawalRequest>;

    /// Pending -> rejected; the escrow is refunded (credit + refund entry)
    /// and the escrow entry advances to failed, all in the same unit
    async fn reject_withdrawal(
        &self,
        id: Uuid,
        admin: UserId,
        reason: String,
    ) -> StorageResult<(WithdrawalRequest, Posting)>;

    /// Pending/processing -> cancelled; same refund treatment as rejection,
    /// with the escrow entry advancing to cancelled
    async fn cancel_withdrawal(
        &self,
        id: Uuid,
        actor: Option<UserId>,
    ) -> StorageResult<(WithdrawalRequest, Posting)>;

    /// Aggregate withdrawal counters
    async fn withdrawal_stats(&self) -> StorageResult<WithdrawalStats>;
}

/// Everything the accounting services need from one backend
pub trait CoreStore:
    WalletStore + AddressStore + DepositStore + SweepStore + WithdrawalStore
{
}

impl<T> CoreStore for T where
    T: WalletStore + AddressStore + DepositStore + SweepStore + WithdrawalStore
{
}

/// Aggregate counters for deposit intake
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IntakeStats {
    pub claims_pending: u64,
    pub claims_approved: u64,
    pub claims_rejected: u64,
    pub deposits_pending: u64,
    pub deposits_confirmed: u64,
    pub deposits_swept: u64,
    /// Value of approved fiat claims
    pub total_fiat_approved: Decimal,
    /// Value of confirmed and swept chain deposits
    pub total_chain_confirmed: Decimal,
}

/// Aggregate counters for withdrawals
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WithdrawalStats {
    pub pending: u64,
    pub approved: u64,
    pub processing: u64,
    pub completed: u64,
    pub rejected: u64,
    pub cancelled: u64,
    /// Amount paid out via completed requests
    pub total_paid_out: Decimal,
    /// Fees collected on completed requests
    pub total_fees: Decimal,
}
