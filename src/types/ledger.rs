//! Ledger entries and the posting rules that bind them to wallet balances.
//!
//! Every balance change is represented by exactly one entry, and
//! [`EntryDraft::apply_to`] is the only place balance arithmetic happens.
//! Storage backends call it inside their atomic unit, so a committed entry
//! and its balance change exist together or not at all.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::money::{Currency, UserId};
use super::wallet::{Wallet, WalletStatus};

/// Balance direction of an entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryDirection {
    Credit,
    Debit,
}

/// Kinds of balance-affecting events.
///
/// Closed set: adding a kind without classifying it in [`direction`]
/// fails to compile.
///
/// [`direction`]: EntryKind::direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Deposit,
    Withdrawal,
    Sweep,
    AdminCredit,
    AdminDebit,
    Refund,
    Investment,
    RoiCredit,
    ReferralBonus,
}

impl EntryKind {
    /// The fixed direction table.
    pub fn direction(&self) -> EntryDirection {
        match self {
            EntryKind::Deposit
            | EntryKind::AdminCredit
            | EntryKind::Refund
            | EntryKind::RoiCredit
            | EntryKind::ReferralBonus => EntryDirection::Credit,
            EntryKind::Withdrawal
            | EntryKind::Investment
            | EntryKind::Sweep
            | EntryKind::AdminDebit => EntryDirection::Debit,
        }
    }

    pub fn is_credit(&self) -> bool {
        self.direction() == EntryDirection::Credit
    }

    pub fn is_debit(&self) -> bool {
        self.direction() == EntryDirection::Debit
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deposit => write!(f, "deposit"),
            Self::Withdrawal => write!(f, "withdrawal"),
            Self::Sweep => write!(f, "sweep"),
            Self::AdminCredit => write!(f, "admin_credit"),
            Self::AdminDebit => write!(f, "admin_debit"),
            Self::Refund => write!(f, "refund"),
            Self::Investment => write!(f, "investment"),
            Self::RoiCredit => write!(f, "roi_credit"),
            Self::ReferralBonus => write!(f, "referral_bonus"),
        }
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            "sweep" => Ok(Self::Sweep),
            "admin_credit" => Ok(Self::AdminCredit),
            "admin_debit" => Ok(Self::AdminDebit),
            "refund" => Ok(Self::Refund),
            "investment" => Ok(Self::Investment),
            "roi_credit" => Ok(Self::RoiCredit),
            "referral_bonus" => Ok(Self::ReferralBonus),
            other => Err(format!("unknown entry kind: {}", other)),
        }
    }
}

/// Settlement status of an entry.
///
/// Advances at most once, `Pending` → terminal. A terminal status never
/// changes, and the balance effect of an entry is fixed at posting time
/// regardless of status; reversals are compensating entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl EntryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown entry status: {}", other)),
        }
    }
}

/// Immutable record of one balance-affecting event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub kind: EntryKind,
    pub currency: Currency,
    /// Always positive; `kind.direction()` gives the sign.
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub status: EntryStatus,
    /// Id of the record that caused this entry (claim, deposit, withdrawal,
    /// sweep) or an external transaction hash.
    pub reference_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Signed effect of this entry on the wallet balance.
    pub fn signed_amount(&self) -> Decimal {
        match self.kind.direction() {
            EntryDirection::Credit => self.amount,
            EntryDirection::Debit => -self.amount,
        }
    }
}

/// Rejection reasons for a posting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostError {
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("wallet not active (status: {0})")]
    WalletInactive(WalletStatus),

    #[error("insufficient balance: need {needed}, available {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    #[error("wallet holds {wallet}, entry denominated in {entry}")]
    CurrencyMismatch { wallet: Currency, entry: Currency },
}

/// A draft entry awaiting atomic application to a wallet.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub user_id: UserId,
    pub kind: EntryKind,
    pub currency: Currency,
    pub amount: Decimal,
    pub status: EntryStatus,
    pub reference_id: Option<String>,
    pub metadata: serde_json::Value,
}

impl EntryDraft {
    pub fn new(user_id: UserId, kind: EntryKind, currency: Currency, amount: Decimal) -> Self {
        Self {
            user_id,
            kind,
            currency,
            amount,
            status: EntryStatus::Completed,
            reference_id: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_status(mut self, status: EntryStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference_id = Some(reference.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Apply this draft to a wallet, producing the new balance and the entry.
    ///
    /// Pure; the caller persists both sides inside one atomic unit or not at
    /// all.
    pub fn apply_to(&self, wallet: &Wallet) -> Result<(Decimal, LedgerEntry), PostError> {
        if self.currency != wallet.currency {
            return Err(PostError::CurrencyMismatch {
                wallet: wallet.currency,
                entry: self.currency,
            });
        }
        if self.amount <= Decimal::ZERO {
            return Err(PostError::NonPositiveAmount(self.amount));
        }
        if !wallet.can_transact() {
            return Err(PostError::WalletInactive(wallet.status));
        }

        let before = wallet.balance;
        let after = match self.kind.direction() {
            EntryDirection::Credit => before + self.amount,
            EntryDirection::Debit => {
                if before < self.amount {
                    return Err(PostError::InsufficientBalance {
                        needed: self.amount,
                        available: before,
                    });
                }
                before - self.amount
            }
        };

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            kind: self.kind,
            currency: self.currency,
            amount: self.amount,
            balance_before: before,
            balance_after: after,
            status: self.status,
            reference_id: self.reference_id.clone(),
            metadata: self.metadata.clone(),
            created_at: Utc::now(),
        };

        Ok((after, entry))
    }
}

/// A committed balance change: the updated wallet plus its entry.
#[derive(Debug, Clone)]
pub struct Posting {
    pub wallet: Wallet,
    pub entry: LedgerEntry,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet_with(balance: &str) -> Wallet {
        let mut wallet = Wallet::new(UserId::new(), Currency::Inr);
        wallet.balance = balance.parse().unwrap();
        wallet
    }

    #[test]
    fn test_direction_table() {
        assert!(EntryKind::Deposit.is_credit());
        assert!(EntryKind::AdminCredit.is_credit());
        assert!(EntryKind::Refund.is_credit());
        assert!(EntryKind::RoiCredit.is_credit());
        assert!(EntryKind::ReferralBonus.is_credit());

        assert!(EntryKind::Withdrawal.is_debit());
        assert!(EntryKind::Investment.is_debit());
        assert!(EntryKind::Sweep.is_debit());
        assert!(EntryKind::AdminDebit.is_debit());
    }

    #[test]
    fn test_credit_arithmetic() {
        let wallet = wallet_with("100.00");
        let draft = EntryDraft::new(
            wallet.user_id,
            EntryKind::Deposit,
            Currency::Inr,
            Decimal::new(2550, 2),
        );

        let (after, entry) = draft.apply_to(&wallet).unwrap();
        assert_eq!(after, Decimal::new(12550, 2));
        assert_eq!(entry.balance_before, Decimal::new(10000, 2));
        assert_eq!(entry.balance_after, after);
        assert_eq!(entry.signed_amount(), Decimal::new(2550, 2));
    }

    #[test]
    fn test_debit_requires_funds() {
        let wallet = wallet_with("10.00");
        let draft = EntryDraft::new(
            wallet.user_id,
            EntryKind::Withdrawal,
            Currency::Inr,
            Decimal::new(2000, 2),
        );

        let err = draft.apply_to(&wallet).unwrap_err();
        assert_eq!(
            err,
            PostError::InsufficientBalance {
                needed: Decimal::new(2000, 2),
                available: Decimal::new(1000, 2),
            }
        );
    }

    #[test]
    fn test_debit_exact_balance_allowed() {
        let wallet = wallet_with("20.00");
        let draft = EntryDraft::new(
            wallet.user_id,
            EntryKind::Sweep,
            Currency::Inr,
            Decimal::new(2000, 2),
        );

        let (after, entry) = draft.apply_to(&wallet).unwrap();
        assert_eq!(after, Decimal::ZERO);
        assert_eq!(entry.signed_amount(), -Decimal::new(2000, 2));
    }

    #[test]
    fn test_inactive_wallet_rejected() {
        let mut wallet = wallet_with("50.00");
        wallet.set_status(WalletStatus::Locked);

        let draft = EntryDraft::new(
            wallet.user_id,
            EntryKind::Deposit,
            Currency::Inr,
            Decimal::ONE,
        );
        assert_eq!(
            draft.apply_to(&wallet).unwrap_err(),
            PostError::WalletInactive(WalletStatus::Locked)
        );
    }

    #[test]
    fn test_zero_and_negative_amounts_rejected() {
        let wallet = wallet_with("50.00");
        for amount in [Decimal::ZERO, Decimal::new(-5, 0)] {
            let draft =
                EntryDraft::new(wallet.user_id, EntryKind::Deposit, Currency::Inr, amount);
            assert!(matches!(
                draft.apply_to(&wallet),
                Err(PostError::NonPositiveAmount(_))
            ));
        }
    }

    #[test]
    fn test_currency_mismatch_rejected() {
        let wallet = wallet_with("50.00");
        let draft = EntryDraft::new(
            wallet.user_id,
            EntryKind::Deposit,
            Currency::Usdt,
            Decimal::ONE,
        );
        assert!(matches!(
            draft.apply_to(&wallet),
            Err(PostError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_kind_display_parse() {
        for kind in [
            EntryKind::Deposit,
            EntryKind::Withdrawal,
            EntryKind::Sweep,
            EntryKind::AdminCredit,
            EntryKind::AdminDebit,
            EntryKind::Refund,
            EntryKind::Investment,
            EntryKind::RoiCredit,
            EntryKind::ReferralBonus,
        ] {
            let parsed: EntryKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }
}
