//! Chain identifiers and address schemes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// EVM-compatible chains the platform accepts stablecoin deposits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainType {
    /// Ethereum mainnet (ERC-20 token standard).
    Erc20,
    /// BNB Smart Chain (BEP-20 token standard).
    Bep20,
}

impl ChainType {
    pub const ALL: [ChainType; 2] = [ChainType::Erc20, ChainType::Bep20];

    /// Address format family. Chains sharing a scheme reuse one derived
    /// address per user — a business decision, one key material serves them
    /// all.
    pub fn address_scheme(&self) -> AddressScheme {
        match self {
            ChainType::Erc20 | ChainType::Bep20 => AddressScheme::Evm,
        }
    }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainType::Erc20 => write!(f, "erc20"),
            ChainType::Bep20 => write!(f, "bep20"),
        }
    }
}

impl FromStr for ChainType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "erc20" => Ok(ChainType::Erc20),
            "bep20" => Ok(ChainType::Bep20),
            other => Err(format!("unknown chain type: {}", other)),
        }
    }
}

/// Address format families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressScheme {
    /// `0x`-prefixed, 40 hex characters.
    Evm,
}

impl fmt::Display for AddressScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressScheme::Evm => write!(f, "evm"),
        }
    }
}

impl AddressScheme {
    /// Check the scheme's length/prefix pattern.
    pub fn matches(&self, address: &str) -> bool {
        match self {
            AddressScheme::Evm => {
                address.len() == 42
                    && address.starts_with("0x")
                    && address.as_bytes()[2..].iter().all(u8::is_ascii_hexdigit)
            }
        }
    }

    /// Tag mixed into deterministic derivation so schemes never collide.
    pub fn derivation_tag(&self) -> &'static str {
        match self {
            AddressScheme::Evm => "evm",
        }
    }
}

/// True for a well-formed EVM transaction hash (`0x` + 64 hex characters).
pub fn is_valid_tx_hash(hash: &str) -> bool {
    hash.len() == 66
        && hash.starts_with("0x")
        && hash.as_bytes()[2..].iter().all(u8::is_ascii_hexdigit)
}
