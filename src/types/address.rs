//! Deposit address records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::chain::ChainType;
use super::money::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressStatus {
    Active,
    /// Rotated out; kept for attribution of late deposits.
    Retired,
}

impl Default for AddressStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl fmt::Display for AddressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Retired => write!(f, "retired"),
        }
    }
}

impl FromStr for AddressStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "retired" => Ok(Self::Retired),
            other => Err(format!("unknown address status: {}", other)),
        }
    }
}

/// A user's deposit address on one chain.
///
/// One active address per (user, chain). Chains sharing an address scheme
/// carry the same address string in separate rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletAddress {
    pub user_id: UserId,
    pub chain: ChainType,
    pub address: String,
    pub status: AddressStatus,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WalletAddress {
    pub fn new(user_id: UserId, chain: ChainType, address: String) -> Self {
        Self {
            user_id,
            chain,
            address,
            status: AddressStatus::Active,
            last_used_at: None,
            created_at: Utc::now(),
        }
    }

    /// Record that a deposit arrived at this address.
    pub fn mark_used(&mut self) {
        self.last_used_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_address_active_and_unused() {
        let addr = WalletAddress::new(
            UserId::new(),
            ChainType::Erc20,
            format!("0x{}", "1".repeat(40)),
        );
        assert_eq!(addr.status, AddressStatus::Active);
        assert!(addr.last_used_at.is_none());
    }

    #[test]
    fn test_mark_used_sets_timestamp() {
        let mut addr = WalletAddress::new(
            UserId::new(),
            ChainType::Bep20,
            format!("0x{}", "2".repeat(40)),
        );
        addr.mark_used();
        assert!(addr.last_used_at.is_some());
    }
}
