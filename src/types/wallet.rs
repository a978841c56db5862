//! Wallet records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::money::{Currency, UserId};

/// Operational status of a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    Active,
    /// Temporarily barred from transacting (operator action).
    Suspended,
    /// Frozen pending investigation; no credits or debits.
    Locked,
}

impl Default for WalletStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Suspended => write!(f, "suspended"),
            Self::Locked => write!(f, "locked"),
        }
    }
}

impl FromStr for WalletStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "locked" => Ok(Self::Locked),
            other => Err(format!("unknown wallet status: {}", other)),
        }
    }
}

/// A per-user, per-currency balance record.
///
/// Exactly one wallet exists per (user, currency); wallets are created lazily
/// at zero balance and never deleted. The balance is only ever changed
/// through the atomic posting path, so it always equals the signed sum of the
/// wallet's ledger entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub currency: Currency,
    /// Spendable balance. Never negative.
    pub balance: Decimal,
    pub status: WalletStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: UserId, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            currency,
            balance: Decimal::ZERO,
            status: WalletStatus::Active,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Wallet may take credits and debits.
    pub fn can_transact(&self) -> bool {
        self.is_active && self.status == WalletStatus::Active
    }

    /// Set the operational status; anything but `Active` also drops the
    /// active flag.
    pub fn set_status(&mut self, status: WalletStatus) {
        self.status = status;
        self.is_active = status == WalletStatus::Active;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_wallet_is_zero_and_active() {
        let wallet = Wallet::new(UserId::new(), Currency::Inr);
        assert_eq!(wallet.balance, Decimal::ZERO);
        assert!(wallet.can_transact());
    }

    #[test]
    fn test_suspended_wallet_cannot_transact() {
        let mut wallet = Wallet::new(UserId::new(), Currency::Usdt);
        wallet.set_status(WalletStatus::Suspended);
        assert!(!wallet.can_transact());
        assert!(!wallet.is_active);

        wallet.set_status(WalletStatus::Active);
        assert!(wallet.can_transact());
    }

    #[test]
    fn test_status_display_parse() {
        for status in [
            WalletStatus::Active,
            WalletStatus::Suspended,
            WalletStatus::Locked,
        ] {
            let parsed: WalletStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}
