//! Deposit records: operator-reviewed fiat claims and observed chain
//! deposits.
//!
//! Chain deposit lifecycle: pending → confirmed (threshold reached, wallet
//! credited) → swept (custody transfer done). A failed sweep leaves the
//! deposit confirmed and retry-eligible.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::chain::ChainType;
use super::money::UserId;

/// Status of a fiat deposit claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl Default for ClaimStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ClaimStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown claim status: {}", other)),
        }
    }
}

/// How the user says the fiat payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiatMethod {
    BankTransfer,
    Upi,
}

impl fmt::Display for FiatMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BankTransfer => "bank_transfer",
            Self::Upi => "upi",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for FiatMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank_transfer" => Ok(Self::BankTransfer),
            "upi" => Ok(Self::Upi),
            other => Err(format!("unknown fiat method: {}", other)),
        }
    }
}

/// A user's assertion that an off-platform fiat payment was made.
///
/// Denominated in the platform's fiat currency; an operator approves it
/// (crediting the fiat wallet) or rejects it with a reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiatDepositClaim {
    pub id: Uuid,
    pub user_id: UserId,
    pub amount: Decimal,
    pub method: FiatMethod,
    /// Payment reference supplied by the user (UTR number, gateway id).
    pub evidence: Option<String>,
    pub status: ClaimStatus,
    pub processed_by: Option<UserId>,
    pub processed_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FiatDepositClaim {
    pub fn new(
        user_id: UserId,
        amount: Decimal,
        method: FiatMethod,
        evidence: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            method,
            evidence,
            status: ClaimStatus::Pending,
            processed_by: None,
            processed_at: None,
            admin_notes: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ClaimStatus::Pending
    }

    pub fn mark_approved(&mut self, admin: UserId) {
        self.status = ClaimStatus::Approved;
        self.processed_by = Some(admin);
        self.processed_at = Some(Utc::now());
    }

    pub fn mark_rejected(&mut self, admin: UserId, reason: String) {
        self.status = ClaimStatus::Rejected;
        self.processed_by = Some(admin);
        self.processed_at = Some(Utc::now());
        self.admin_notes = Some(reason);
    }
}

/// Status of an observed on-chain deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainDepositStatus {
    /// Seen on chain, waiting for the confirmation threshold.
    Pending,
    /// Threshold reached, wallet credited, not yet swept.
    Confirmed,
    /// Funds moved to custody.
    Swept,
    Failed,
    Cancelled,
}

impl Default for ChainDepositStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for ChainDepositStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Swept => "swept",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ChainDepositStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "swept" => Ok(Self::Swept),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown chain deposit status: {}", other)),
        }
    }
}

/// How a deposit's custody sweep is triggered.
///
/// Decided once at creation by comparing the amount to the chain's
/// auto-sweep threshold. `None` is the stored value for deposits on which
/// sweeping is administratively disabled; the creation rule only ever
/// assigns auto or manual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepType {
    Auto,
    Manual,
    None,
}

impl fmt::Display for SweepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::None => "none",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SweepType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            "none" => Ok(Self::None),
            other => Err(format!("unknown sweep type: {}", other)),
        }
    }
}

/// One observed stablecoin deposit, keyed globally by transaction hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDeposit {
    pub id: Uuid,
    pub user_id: UserId,
    pub chain: ChainType,
    pub amount: Decimal,
    /// Globally unique; the idempotency key for intake.
    pub tx_hash: String,
    pub from_address: String,
    pub to_address: String,
    pub status: ChainDepositStatus,
    pub confirmations: u32,
    /// Copied from chain config at creation so later config edits never
    /// change an in-flight deposit's threshold.
    pub required_confirmations: u32,
    pub sweep_type: SweepType,
    pub sweep_tx_hash: Option<String>,
    pub gas_fee: Option<Decimal>,
    /// Block the transaction was included in, as reported by the observer.
    pub block_number: Option<u64>,
    pub processed_by: Option<UserId>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChainDeposit {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        chain: ChainType,
        amount: Decimal,
        tx_hash: String,
        from_address: String,
        to_address: String,
        required_confirmations: u32,
        sweep_type: SweepType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            chain,
            amount,
            tx_hash,
            from_address,
            to_address,
            status: ChainDepositStatus::Pending,
            confirmations: 0,
            required_confirmations,
            sweep_type,
            sweep_tx_hash: None,
            gas_fee: None,
            block_number: None,
            processed_by: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Raise the confirmation count; counts never go down.
    pub fn update_confirmations(&mut self, confirmations: u32, block_number: Option<u64>) {
        if confirmations > self.confirmations {
            self.confirmations = confirmations;
        }
        if let Some(block) = block_number {
            self.block_number = Some(block);
        }
        self.touch();
    }

    /// Threshold reached while still pending.
    pub fn is_confirmable(&self) -> bool {
        self.status == ChainDepositStatus::Pending
            && self.confirmations >= self.required_confirmations
    }

    pub fn mark_confirmed(&mut self) {
        self.status = ChainDepositStatus::Confirmed;
        self.processed_at = Some(Utc::now());
        self.touch();
    }

    pub fn mark_swept(
        &mut self,
        sweep_tx_hash: String,
        gas_fee: Decimal,
        initiator: Option<UserId>,
    ) {
        self.status = ChainDepositStatus::Swept;
        self.sweep_tx_hash = Some(sweep_tx_hash);
        self.gas_fee = Some(gas_fee);
        if initiator.is_some() {
            self.processed_by = initiator;
        }
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposit(required: u32) -> ChainDeposit {
        ChainDeposit::new(
            UserId::new(),
            ChainType::Erc20,
            Decimal::new(30, 0),
            format!("0x{}", "ab".repeat(32)),
            format!("0x{}", "1".repeat(40)),
            format!("0x{}", "2".repeat(40)),
            required,
            SweepType::Auto,
        )
    }

    #[test]
    fn test_confirmations_are_monotonic() {
        let mut dep = deposit(12);
        dep.update_confirmations(5, Some(100));
        assert_eq!(dep.confirmations, 5);

        dep.update_confirmations(3, None);
        assert_eq!(dep.confirmations, 5);
        assert_eq!(dep.block_number, Some(100));

        dep.update_confirmations(12, Some(100));
        assert!(dep.is_confirmable());
    }

    #[test]
    fn test_confirm_then_sweep_transitions() {
        let mut dep = deposit(12);
        dep.update_confirmations(12, Some(90));
        dep.mark_confirmed();
        assert_eq!(dep.status, ChainDepositStatus::Confirmed);
        assert!(dep.processed_at.is_some());
        assert!(!dep.is_confirmable());

        let admin = UserId::new();
        dep.mark_swept(format!("0x{}", "cd".repeat(32)), Decimal::new(5, 3), Some(admin));
        assert_eq!(dep.status, ChainDepositStatus::Swept);
        assert_eq!(dep.processed_by, Some(admin));
        assert_eq!(dep.gas_fee, Some(Decimal::new(5, 3)));
    }

    #[test]
    fn test_claim_approval_audit_fields() {
        let mut claim = FiatDepositClaim::new(
            UserId::new(),
            Decimal::new(500, 0),
            FiatMethod::Upi,
            Some("UTR123".to_string()),
        );
        assert!(claim.is_pending());

        let admin = UserId::new();
        claim.mark_approved(admin);
        assert_eq!(claim.status, ClaimStatus::Approved);
        assert_eq!(claim.processed_by, Some(admin));
        assert!(claim.processed_at.is_some());
    }

    #[test]
    fn test_status_display_parse() {
        for status in [
            ChainDepositStatus::Pending,
            ChainDepositStatus::Confirmed,
            ChainDepositStatus::Swept,
            ChainDepositStatus::Failed,
            ChainDepositStatus::Cancelled,
        ] {
            let parsed: ChainDepositStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        for sweep_type in [SweepType::Auto, SweepType::Manual, SweepType::None] {
            let parsed: SweepType = sweep_type.to_string().parse().unwrap();
            assert_eq!(parsed, sweep_type);
        }
    }
}
