//! Monetary primitives shared by every record family.
//!
//! Amounts are fixed-point `rust_decimal::Decimal` values, quantized to the
//! owning currency's precision at service boundaries. Balances and entry
//! amounts never use floats.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifies a platform user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Reserved system account owning the per-currency custody float wallets.
    ///
    /// Confirmed-but-unswept deposit funds are credited here at confirmation
    /// and debited at sweep, so sweeps never touch user-visible balances.
    pub const fn custody() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_custody(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Currencies the platform accounts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    /// Fiat leg, 2 fractional digits.
    Inr,
    /// Stablecoin leg, 6 fractional digits, settled on EVM chains.
    Usdt,
}

impl Currency {
    pub const ALL: [Currency; 2] = [Currency::Inr, Currency::Usdt];

    pub fn is_fiat(&self) -> bool {
        matches!(self, Currency::Inr)
    }

    /// Payouts in this currency settle on-chain and carry a settlement
    /// transaction hash.
    pub fn is_chain_settled(&self) -> bool {
        matches!(self, Currency::Usdt)
    }

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Inr => "INR",
            Currency::Usdt => "USDT",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inr" => Ok(Currency::Inr),
            "usdt" => Ok(Currency::Usdt),
            other => Err(format!("unknown currency: {}", other)),
        }
    }
}

/// Quantize `amount` to `precision` fractional digits.
///
/// Banker's rounding, matching the precision rules the per-currency
/// configuration declares (INR 2, USDT 6).
pub fn quantize(amount: Decimal, precision: u32) -> Decimal {
    amount.round_dp(precision)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custody_account_is_nil() {
        assert!(UserId::custody().is_custody());
        assert!(!UserId::new().is_custody());
    }

    #[test]
    fn test_currency_parse_roundtrip() {
        for currency in Currency::ALL {
            let parsed: Currency = currency.to_string().parse().unwrap();
            assert_eq!(parsed, currency);
        }
        assert!("doge".parse::<Currency>().is_err());
    }

    #[test]
    fn test_quantize_precision() {
        let amount: Decimal = "10.123456789".parse().unwrap();
        assert_eq!(quantize(amount, 2).to_string(), "10.12");
        assert_eq!(quantize(amount, 6).to_string(), "10.123457");
    }

    #[test]
    fn test_quantize_bankers_rounding() {
        let half: Decimal = "2.5".parse().unwrap();
        assert_eq!(quantize(half, 0).to_string(), "2");
        let next: Decimal = "3.5".parse().unwrap();
        assert_eq!(quantize(next, 0).to_string(), "4");
    }
}
