//! Common error types for the custodia core.
//!
//! One root error covers every service; storage keeps its own error type and
//! is mapped in here so callers only ever see `CustodiaError`.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::storage::traits::StorageError;
use crate::types::ledger::PostError;
use crate::types::wallet::WalletStatus;

/// Root error type for the custodia core
#[derive(Debug, Error)]
pub enum CustodiaError {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Logging errors
    #[error("logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),

    /// Malformed or out-of-range input
    #[error("validation error: {0}")]
    Validation(String),

    /// Debit larger than the spendable balance
    #[error("insufficient balance: need {needed}, available {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// Wallet is suspended or locked
    #[error("wallet not active (status: {status})")]
    WalletInactive { status: WalletStatus },

    /// Repeated transaction hash or re-submitted record
    #[error("duplicate transaction: {0}")]
    DuplicateTransaction(String),

    /// Action replayed against a record that already settled
    #[error("already processed: {0}")]
    AlreadyProcessed(String),

    /// Action against a record not in the required state
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Daily cap or min/max bound exceeded
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// The custody transfer dependency reported a failure
    #[error("external transfer failed: {0}")]
    ExternalTransferFailed(String),

    /// Storage backend fault
    #[error("storage error: {0}")]
    Storage(String),
}

impl CustodiaError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a duplicate-transaction error
    pub fn duplicate(what: impl Into<String>) -> Self {
        Self::DuplicateTransaction(what.into())
    }

    /// Create an already-processed error
    pub fn already_processed(what: impl Into<String>) -> Self {
        Self::AlreadyProcessed(what.into())
    }

    /// Create an invalid-state error
    pub fn invalid_state(expected: impl Into<String>, actual: impl ToString) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }

    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a limit-exceeded error
    pub fn limit_exceeded(msg: impl Into<String>) -> Self {
        Self::LimitExceeded(msg.into())
    }

    /// Check if this is a retryable error
    ///
    /// A failed custody transfer leaves the deposit confirmed and the sweep
    /// record failed, so the same request may be issued again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CustodiaError::Storage(_) | CustodiaError::ExternalTransferFailed(_)
        )
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            CustodiaError::Config(_) => "CONFIG_ERROR",
            CustodiaError::Logging(_) => "LOGGING_ERROR",
            CustodiaError::Validation(_) => "VALIDATION_ERROR",
            CustodiaError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            CustodiaError::WalletInactive { .. } => "WALLET_INACTIVE",
            CustodiaError::DuplicateTransaction(_) => "DUPLICATE_TRANSACTION",
            CustodiaError::AlreadyProcessed(_) => "ALREADY_PROCESSED",
            CustodiaError::InvalidState { .. } => "INVALID_STATE",
            CustodiaError::NotFound(_) => "NOT_FOUND",
            CustodiaError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            CustodiaError::ExternalTransferFailed(_) => "EXTERNAL_TRANSFER_FAILED",
            CustodiaError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<StorageError> for CustodiaError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => CustodiaError::NotFound(what),
            StorageError::Duplicate(what) => CustodiaError::DuplicateTransaction(what),
            // A conflict means a precondition re-checked inside the atomic
            // unit no longer held: someone else settled the record first.
            StorageError::Conflict(what) => CustodiaError::AlreadyProcessed(what),
            StorageError::Ledger(post) => match post {
                PostError::NonPositiveAmount(amount) => {
                    CustodiaError::Validation(format!("amount must be positive, got {}", amount))
                }
                PostError::WalletInactive(status) => CustodiaError::WalletInactive { status },
                PostError::InsufficientBalance { needed, available } => {
                    CustodiaError::InsufficientBalance { needed, available }
                }
                PostError::CurrencyMismatch { .. } => CustodiaError::Validation(post.to_string()),
            },
            other => CustodiaError::Storage(other.to_string()),
        }
    }
}

/// Result type alias using CustodiaError
pub type Result<T> = std::result::Result<T, CustodiaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CustodiaError::validation("amount out of range");
        assert!(err.to_string().contains("amount out of range"));
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(CustodiaError::ExternalTransferFailed("rpc timeout".into()).is_retryable());
        assert!(CustodiaError::Storage("pool exhausted".into()).is_retryable());
        assert!(!CustodiaError::validation("bad input").is_retryable());
        assert!(!CustodiaError::already_processed("claim settled").is_retryable());
    }

    #[test]
    fn test_storage_error_mapping() {
        let err: CustodiaError = StorageError::Duplicate("tx 0xabc".into()).into();
        assert_eq!(err.error_code(), "DUPLICATE_TRANSACTION");

        let err: CustodiaError = StorageError::Conflict("deposit already confirmed".into()).into();
        assert_eq!(err.error_code(), "ALREADY_PROCESSED");

        let err: CustodiaError = StorageError::Ledger(PostError::InsufficientBalance {
            needed: Decimal::new(100, 0),
            available: Decimal::new(5, 0),
        })
        .into();
        assert_eq!(err.error_code(), "INSUFFICIENT_BALANCE");
    }
}
