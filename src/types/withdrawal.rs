//! Withdrawal requests and their review state machine.
//!
//! Funds are escrowed (debited) the moment a request is accepted, so a
//! request always travels with the fee it locked in. Rejection and
//! cancellation refund `amount + fee`; completion settles the escrow.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::chain::ChainType;
use super::money::{Currency, UserId};

/// Review state of a withdrawal request.
///
/// pending → approved → (processing) → completed;
/// pending → rejected; pending/processing → cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Processing,
    Completed,
    Rejected,
    Cancelled,
}

impl WithdrawalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Cancelled)
    }

    /// Requests that hold or held funds today count toward the daily cap.
    /// Rejected and cancelled ones were refunded, so they do not.
    pub fn counts_toward_daily_cap(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Approved | Self::Processing | Self::Completed
        )
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for WithdrawalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown withdrawal status: {}", other)),
        }
    }
}

/// Payout rail, derived from the payout details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    BankTransfer,
    UsdtErc20,
    UsdtBep20,
}

impl fmt::Display for PayoutMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BankTransfer => "bank_transfer",
            Self::UsdtErc20 => "usdt_erc20",
            Self::UsdtBep20 => "usdt_bep20",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for PayoutMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank_transfer" => Ok(Self::BankTransfer),
            "usdt_erc20" => Ok(Self::UsdtErc20),
            "usdt_bep20" => Ok(Self::UsdtBep20),
            other => Err(format!("unknown payout method: {}", other)),
        }
    }
}

/// Destination for a withdrawal payout.
///
/// Bank rails pay out fiat; chain rails pay out the stablecoin. The
/// variant is the single source of truth for the payout method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PayoutSpec {
    BankTransfer {
        account_number: String,
        ifsc_code: String,
        account_holder_name: String,
        bank_name: String,
    },
    Chain { chain: ChainType, address: String },
}

impl PayoutSpec {
    pub fn method(&self) -> PayoutMethod {
        match self {
            Self::BankTransfer { .. } => PayoutMethod::BankTransfer,
            Self::Chain { chain, .. } => match chain {
                ChainType::Erc20 => PayoutMethod::UsdtErc20,
                ChainType::Bep20 => PayoutMethod::UsdtBep20,
            },
        }
    }

    /// Schema check: field formats plus the rail/currency pairing.
    pub fn validate_for(&self, currency: Currency) -> Result<(), String> {
        match self {
            Self::BankTransfer {
                account_number,
                ifsc_code,
                account_holder_name,
                bank_name,
            } => {
                if currency != Currency::Inr {
                    return Err(format!("bank transfer payout not available for {}", currency));
                }
                if account_number.len() < 9
                    || account_number.len() > 18
                    || !account_number.chars().all(|c| c.is_ascii_digit())
                {
                    return Err("account number must be 9 to 18 digits".to_string());
                }
                if !is_valid_ifsc(ifsc_code) {
                    return Err("invalid IFSC code".to_string());
                }
                if account_holder_name.trim().is_empty() {
                    return Err("account holder name is required".to_string());
                }
                if bank_name.trim().is_empty() {
                    return Err("bank name is required".to_string());
                }
                Ok(())
            }
            Self::Chain { chain, address } => {
                if currency != Currency::Usdt {
                    return Err(format!("chain payout not available for {}", currency));
                }
                if !chain.address_scheme().matches(address) {
                    return Err(format!("invalid {} address", chain));
                }
                Ok(())
            }
        }
    }
}

/// IFSC: four uppercase letters, a literal zero, six uppercase
/// alphanumerics.
fn is_valid_ifsc(code: &str) -> bool {
    let bytes = code.as_bytes();
    if bytes.len() != 11 || bytes[4] != b'0' {
        return false;
    }
    bytes[..4].iter().all(|b| b.is_ascii_uppercase())
        && bytes[5..]
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// One withdrawal request with its escrowed amount and locked-in fee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub user_id: UserId,
    pub currency: Currency,
    pub amount: Decimal,
    /// Computed from currency config at creation; never recomputed.
    pub fee: Decimal,
    pub payout: PayoutSpec,
    pub status: WithdrawalStatus,
    /// Hash of the settling transfer, required to complete chain payouts.
    pub settlement_tx_hash: Option<String>,
    pub processed_by: Option<UserId>,
    pub processed_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WithdrawalRequest {
    pub fn new(
        user_id: UserId,
        currency: Currency,
        amount: Decimal,
        fee: Decimal,
        payout: PayoutSpec,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            currency,
            amount,
            fee,
            payout,
            status: WithdrawalStatus::Pending,
            settlement_tx_hash: None,
            processed_by: None,
            processed_at: None,
            admin_notes: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// What was escrowed: payout amount plus fee.
    pub fn total(&self) -> Decimal {
        self.amount + self.fee
    }

    pub fn can_cancel(&self) -> bool {
        matches!(
            self.status,
            WithdrawalStatus::Pending | WithdrawalStatus::Processing
        )
    }

    /// `admin` is absent when the auto-approve ceiling applied.
    pub fn mark_approved(&mut self, admin: Option<UserId>) {
        self.status = WithdrawalStatus::Approved;
        if admin.is_some() {
            self.processed_by = admin;
        }
        self.processed_at = Some(Utc::now());
        self.touch();
    }

    pub fn mark_processing(&mut self) {
        self.status = WithdrawalStatus::Processing;
        self.touch();
    }

    pub fn mark_completed(&mut self, admin: UserId, settlement_tx_hash: Option<String>) {
        self.status = WithdrawalStatus::Completed;
        self.settlement_tx_hash = settlement_tx_hash;
        self.processed_by = Some(admin);
        self.processed_at = Some(Utc::now());
        self.touch();
    }

    pub fn mark_rejected(&mut self, admin: UserId, reason: String) {
        self.status = WithdrawalStatus::Rejected;
        self.rejection_reason = Some(reason);
        self.processed_by = Some(admin);
        self.processed_at = Some(Utc::now());
        self.touch();
    }

    /// `actor` is the operator for admin-initiated cancellations; absent
    /// when the user cancelled their own request.
    pub fn mark_cancelled(&mut self, actor: Option<UserId>) {
        self.status = WithdrawalStatus::Cancelled;
        if actor.is_some() {
            self.processed_by = actor;
        }
        self.processed_at = Some(Utc::now());
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank_payout() -> PayoutSpec {
        PayoutSpec::BankTransfer {
            account_number: "123456789012".to_string(),
            ifsc_code: "HDFC0001234".to_string(),
            account_holder_name: "Asha Rao".to_string(),
            bank_name: "HDFC Bank".to_string(),
        }
    }

    #[test]
    fn test_bank_payout_validation() {
        assert!(bank_payout().validate_for(Currency::Inr).is_ok());
        assert!(bank_payout().validate_for(Currency::Usdt).is_err());

        let short_account = PayoutSpec::BankTransfer {
            account_number: "12345".to_string(),
            ifsc_code: "HDFC0001234".to_string(),
            account_holder_name: "Asha Rao".to_string(),
            bank_name: "HDFC Bank".to_string(),
        };
        assert!(short_account.validate_for(Currency::Inr).is_err());

        let bad_ifsc = PayoutSpec::BankTransfer {
            account_number: "123456789012".to_string(),
            ifsc_code: "HDFC9001234".to_string(),
            account_holder_name: "Asha Rao".to_string(),
            bank_name: "HDFC Bank".to_string(),
        };
        assert!(bad_ifsc.validate_for(Currency::Inr).is_err());
    }

    #[test]
    fn test_chain_payout_validation() {
        let payout = PayoutSpec::Chain {
            chain: ChainType::Erc20,
            address: format!("0x{}", "a".repeat(40)),
        };
        assert!(payout.validate_for(Currency::Usdt).is_ok());
        assert!(payout.validate_for(Currency::Inr).is_err());
        assert_eq!(payout.method(), PayoutMethod::UsdtErc20);

        let bad_address = PayoutSpec::Chain {
            chain: ChainType::Bep20,
            address: "not-an-address".to_string(),
        };
        assert!(bad_address.validate_for(Currency::Usdt).is_err());
    }

    #[test]
    fn test_total_is_amount_plus_fee() {
        let req = WithdrawalRequest::new(
            UserId::new(),
            Currency::Inr,
            Decimal::new(10000, 2),
            Decimal::new(250, 2),
            bank_payout(),
        );
        assert_eq!(req.total(), Decimal::new(10250, 2));
        assert_eq!(req.status, WithdrawalStatus::Pending);
    }

    #[test]
    fn test_reject_records_reason_and_admin() {
        let mut req = WithdrawalRequest::new(
            UserId::new(),
            Currency::Inr,
            Decimal::new(500, 0),
            Decimal::ZERO,
            bank_payout(),
        );
        let admin = UserId::new();
        req.mark_rejected(admin, "name mismatch".to_string());

        assert_eq!(req.status, WithdrawalStatus::Rejected);
        assert!(req.status.is_terminal());
        assert!(!req.status.counts_toward_daily_cap());
        assert_eq!(req.processed_by, Some(admin));
        assert_eq!(req.rejection_reason.as_deref(), Some("name mismatch"));
    }

    #[test]
    fn test_cancel_boundaries() {
        let mut req = WithdrawalRequest::new(
            UserId::new(),
            Currency::Usdt,
            Decimal::new(50, 0),
            Decimal::new(25, 1),
            PayoutSpec::Chain {
                chain: ChainType::Erc20,
                address: format!("0x{}", "b".repeat(40)),
            },
        );
        assert!(req.can_cancel());

        req.mark_approved(None);
        assert!(!req.can_cancel());
        assert!(req.processed_by.is_none());

        req.mark_processing();
        assert!(req.can_cancel());

        req.mark_completed(UserId::new(), Some(format!("0x{}", "c".repeat(64))));
        assert!(!req.can_cancel());
        assert!(req.status.is_terminal());
    }
}
