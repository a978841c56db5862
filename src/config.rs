//! Environment-based configuration for the custodia core.
//!
//! Every knob is loadable from a `CUSTODIA_*` environment variable and falls
//! back to a development default. Production deployments must pass
//! [`CustodiaConfig::validate_for_production`], which refuses the placeholder
//! custody addresses.
//!
//! # Environment Variables
//!
//! ## Chain Parameters
//! - `CUSTODIA_ERC20_CONFIRMATIONS` / `CUSTODIA_BEP20_CONFIRMATIONS` -
//!   confirmations required before a deposit is credited (default: 12 / 15)
//! - `CUSTODIA_ERC20_GAS_FEE` / `CUSTODIA_BEP20_GAS_FEE` - estimated gas cost
//!   of one sweep transfer (default: 0.005 / 0.0005)
//! - `CUSTODIA_ERC20_SWEEP_THRESHOLD` / `CUSTODIA_BEP20_SWEEP_THRESHOLD` -
//!   deposits at or below this amount sweep automatically (default: 50)
//! - `CUSTODIA_ERC20_CUSTODY_ADDRESS` / `CUSTODIA_BEP20_CUSTODY_ADDRESS` -
//!   cold wallet that sweeps pay into (required in production)
//!
//! ## Withdrawal Parameters (per currency, `INR` / `USDT`)
//! - `CUSTODIA_<CUR>_MIN_WITHDRAWAL`, `CUSTODIA_<CUR>_MAX_WITHDRAWAL`
//! - `CUSTODIA_<CUR>_FEE_PERCENT`, `CUSTODIA_<CUR>_FIXED_FEE`
//! - `CUSTODIA_<CUR>_DAILY_CAP`
//! - `CUSTODIA_<CUR>_AUTO_APPROVE_LIMIT` - zero disables auto-approval
//!
//! ## Fiat Claims
//! - `CUSTODIA_CLAIM_MIN_AMOUNT` / `CUSTODIA_CLAIM_MAX_AMOUNT`
//!
//! ## Optional Settings
//! - `CUSTODIA_DB_PATH` - SQLite database path (default: custodia.db)
//! - `CUSTODIA_LOG_LEVEL` - logging level (debug, info, warn, error)
//! - `CUSTODIA_LOG_JSON` - "true" for JSON log output (default: true)

use rust_decimal::Decimal;
use std::env;
use thiserror::Error;

use crate::types::chain::ChainType;
use crate::types::money::Currency;

/// Development placeholder custody addresses. Valid in format so the sweep
/// path works end to end in dev, rejected by the production check.
const DEV_CUSTODY_ERC20: &str = "0x000000000000000000000000000000000000c0de";
const DEV_CUSTODY_BEP20: &str = "0x000000000000000000000000000000000000cafe";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Per-chain deposit and sweep parameters
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Confirmations required before a deposit is credited
    pub required_confirmations: u32,

    /// Estimated gas cost of one sweep transfer, in native units
    pub gas_fee_estimate: Decimal,

    /// Deposits at or below this amount are swept automatically
    pub auto_sweep_threshold: Decimal,

    /// Custody (cold) wallet that sweeps pay into
    pub custody_address: String,
}

/// Per-currency withdrawal parameters
#[derive(Debug, Clone)]
pub struct CurrencyConfig {
    /// Decimal places amounts are quantized to
    pub precision: u32,

    pub min_withdrawal: Decimal,

    pub max_withdrawal: Decimal,

    /// Percentage fee, 0-100
    pub fee_percentage: Decimal,

    /// Flat fee added on top of the percentage fee
    pub fixed_fee: Decimal,

    /// Maximum total withdrawn per user per UTC day
    pub daily_cap: Decimal,

    /// Requests at or below this amount skip review; zero disables
    pub auto_approve_ceiling: Decimal,
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct CustodiaConfig {
    pub erc20: ChainConfig,
    pub bep20: ChainConfig,

    pub inr: CurrencyConfig,
    pub usdt: CurrencyConfig,

    /// Bounds for manually claimed fiat deposits
    pub claim_min_amount: Decimal,
    pub claim_max_amount: Decimal,

    /// SQLite database path
    pub db_path: String,

    /// Log level
    pub log_level: String,

    /// Emit JSON-formatted logs
    pub log_json: bool,
}

impl Default for CustodiaConfig {
    fn default() -> Self {
        Self {
            erc20: ChainConfig {
                required_confirmations: 12,
                gas_fee_estimate: Decimal::new(5, 3),
                auto_sweep_threshold: Decimal::from(50),
                custody_address: DEV_CUSTODY_ERC20.to_string(),
            },
            bep20: ChainConfig {
                required_confirmations: 15,
                gas_fee_estimate: Decimal::new(5, 4),
                auto_sweep_threshold: Decimal::from(50),
                custody_address: DEV_CUSTODY_BEP20.to_string(),
            },
            inr: CurrencyConfig {
                precision: 2,
                min_withdrawal: Decimal::from(100),
                max_withdrawal: Decimal::from(500_000),
                fee_percentage: Decimal::ZERO,
                fixed_fee: Decimal::ZERO,
                daily_cap: Decimal::from(500_000),
                auto_approve_ceiling: Decimal::ZERO,
            },
            usdt: CurrencyConfig {
                precision: 6,
                min_withdrawal: Decimal::from(10),
                max_withdrawal: Decimal::from(50_000),
                fee_percentage: Decimal::ONE,
                fixed_fee: Decimal::from(2),
                daily_cap: Decimal::from(50_000),
                auto_approve_ceiling: Decimal::from(100),
            },
            claim_min_amount: Decimal::from(100),
            claim_max_amount: Decimal::from(1_000_000),
            db_path: "custodia.db".to_string(),
            log_level: "info".to_string(),
            log_json: true,
        }
    }
}

impl CustodiaConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let d = Self::default();

        Ok(Self {
            erc20: ChainConfig {
                required_confirmations: env_u32(
                    "CUSTODIA_ERC20_CONFIRMATIONS",
                    d.erc20.required_confirmations,
                )?,
                gas_fee_estimate: env_decimal("CUSTODIA_ERC20_GAS_FEE", d.erc20.gas_fee_estimate)?,
                auto_sweep_threshold: env_decimal(
                    "CUSTODIA_ERC20_SWEEP_THRESHOLD",
                    d.erc20.auto_sweep_threshold,
                )?,
                custody_address: env_string(
                    "CUSTODIA_ERC20_CUSTODY_ADDRESS",
                    &d.erc20.custody_address,
                ),
            },
            bep20: ChainConfig {
                required_confirmations: env_u32(
                    "CUSTODIA_BEP20_CONFIRMATIONS",
                    d.bep20.required_confirmations,
                )?,
                gas_fee_estimate: env_decimal("CUSTODIA_BEP20_GAS_FEE", d.bep20.gas_fee_estimate)?,
                auto_sweep_threshold: env_decimal(
                    "CUSTODIA_BEP20_SWEEP_THRESHOLD",
                    d.bep20.auto_sweep_threshold,
                )?,
                custody_address: env_string(
                    "CUSTODIA_BEP20_CUSTODY_ADDRESS",
                    &d.bep20.custody_address,
                ),
            },
            inr: CurrencyConfig {
                precision: d.inr.precision,
                min_withdrawal: env_decimal("CUSTODIA_INR_MIN_WITHDRAWAL", d.inr.min_withdrawal)?,
                max_withdrawal: env_decimal("CUSTODIA_INR_MAX_WITHDRAWAL", d.inr.max_withdrawal)?,
                fee_percentage: env_decimal("CUSTODIA_INR_FEE_PERCENT", d.inr.fee_percentage)?,
                fixed_fee: env_decimal("CUSTODIA_INR_FIXED_FEE", d.inr.fixed_fee)?,
                daily_cap: env_decimal("CUSTODIA_INR_DAILY_CAP", d.inr.daily_cap)?,
                auto_approve_ceiling: env_decimal(
                    "CUSTODIA_INR_AUTO_APPROVE_LIMIT",
                    d.inr.auto_approve_ceiling,
                )?,
            },
            usdt: CurrencyConfig {
                precision: d.usdt.precision,
                min_withdrawal: env_decimal("CUSTODIA_USDT_MIN_WITHDRAWAL", d.usdt.min_withdrawal)?,
                max_withdrawal: env_decimal("CUSTODIA_USDT_MAX_WITHDRAWAL", d.usdt.max_withdrawal)?,
                fee_percentage: env_decimal("CUSTODIA_USDT_FEE_PERCENT", d.usdt.fee_percentage)?,
                fixed_fee: env_decimal("CUSTODIA_USDT_FIXED_FEE", d.usdt.fixed_fee)?,
                daily_cap: env_decimal("CUSTODIA_USDT_DAILY_CAP", d.usdt.daily_cap)?,
                auto_approve_ceiling: env_decimal(
                    "CUSTODIA_USDT_AUTO_APPROVE_LIMIT",
                    d.usdt.auto_approve_ceiling,
                )?,
            },
            claim_min_amount: env_decimal("CUSTODIA_CLAIM_MIN_AMOUNT", d.claim_min_amount)?,
            claim_max_amount: env_decimal("CUSTODIA_CLAIM_MAX_AMOUNT", d.claim_max_amount)?,
            db_path: env_string("CUSTODIA_DB_PATH", &d.db_path),
            log_level: env_string("CUSTODIA_LOG_LEVEL", &d.log_level),
            log_json: env_string("CUSTODIA_LOG_JSON", "true") == "true",
        })
    }

    /// Parameters for one supported chain
    pub fn chain(&self, chain: ChainType) -> &ChainConfig {
        match chain {
            ChainType::Erc20 => &self.erc20,
            ChainType::Bep20 => &self.bep20,
        }
    }

    /// Parameters for one supported currency
    pub fn currency(&self, currency: Currency) -> &CurrencyConfig {
        match currency {
            Currency::Inr => &self.inr,
            Currency::Usdt => &self.usdt,
        }
    }

    /// Validate internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        for chain in ChainType::ALL {
            let cfg = self.chain(chain);
            if cfg.required_confirmations == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{} required confirmations must be at least 1",
                    chain
                )));
            }
            if cfg.gas_fee_estimate < Decimal::ZERO {
                return Err(ConfigError::Invalid(format!(
                    "{} gas fee estimate must not be negative",
                    chain
                )));
            }
            if cfg.auto_sweep_threshold < Decimal::ZERO {
                return Err(ConfigError::Invalid(format!(
                    "{} auto-sweep threshold must not be negative",
                    chain
                )));
            }
            if !chain.address_scheme().matches(&cfg.custody_address) {
                return Err(ConfigError::Invalid(format!(
                    "{} custody address is not a valid {} address",
                    chain,
                    chain.address_scheme()
                )));
            }
        }

        for currency in Currency::ALL {
            let cfg = self.currency(currency);
            if cfg.min_withdrawal <= Decimal::ZERO {
                return Err(ConfigError::Invalid(format!(
                    "{} minimum withdrawal must be positive",
                    currency
                )));
            }
            if cfg.min_withdrawal > cfg.max_withdrawal {
                return Err(ConfigError::Invalid(format!(
                    "{} minimum withdrawal exceeds the maximum",
                    currency
                )));
            }
            if cfg.fee_percentage < Decimal::ZERO || cfg.fee_percentage > Decimal::from(100) {
                return Err(ConfigError::Invalid(format!(
                    "{} fee percentage must be between 0 and 100",
                    currency
                )));
            }
            if cfg.fixed_fee < Decimal::ZERO {
                return Err(ConfigError::Invalid(format!(
                    "{} fixed fee must not be negative",
                    currency
                )));
            }
            if cfg.daily_cap <= Decimal::ZERO {
                return Err(ConfigError::Invalid(format!(
                    "{} daily cap must be positive",
                    currency
                )));
            }
            if cfg.auto_approve_ceiling < Decimal::ZERO {
                return Err(ConfigError::Invalid(format!(
                    "{} auto-approve ceiling must not be negative",
                    currency
                )));
            }
            if cfg.precision > 18 {
                return Err(ConfigError::Invalid(format!(
                    "{} precision {} is out of range",
                    currency, cfg.precision
                )));
            }
        }

        if self.claim_min_amount <= Decimal::ZERO || self.claim_min_amount > self.claim_max_amount {
            return Err(ConfigError::Invalid(
                "claim amount bounds are inconsistent".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate configuration for production readiness
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        self.validate()?;

        if self.erc20.custody_address == DEV_CUSTODY_ERC20 {
            return Err(ConfigError::Invalid(
                "CUSTODIA_ERC20_CUSTODY_ADDRESS must be set in production".to_string(),
            ));
        }
        if self.bep20.custody_address == DEV_CUSTODY_BEP20 {
            return Err(ConfigError::Invalid(
                "CUSTODIA_BEP20_CUSTODY_ADDRESS must be set in production".to_string(),
            ));
        }

        Ok(())
    }

    /// Log a summary of the active configuration
    pub fn summary(&self) {
        tracing::info!(target: "custodia::config", "custodia configuration:");
        for chain in ChainType::ALL {
            let cfg = self.chain(chain);
            tracing::info!(
                target: "custodia::config",
                "  {}: {} confirmations, sweep threshold {}, custody {}",
                chain,
                cfg.required_confirmations,
                cfg.auto_sweep_threshold,
                cfg.custody_address,
            );
        }
        for currency in Currency::ALL {
            let cfg = self.currency(currency);
            tracing::info!(
                target: "custodia::config",
                "  {}: withdrawals {}-{}, fee {}% + {}, daily cap {}, auto-approve <= {}",
                currency,
                cfg.min_withdrawal,
                cfg.max_withdrawal,
                cfg.fee_percentage,
                cfg.fixed_fee,
                cfg.daily_cap,
                cfg.auto_approve_ceiling,
            );
        }
        tracing::info!(
            target: "custodia::config",
            "  fiat claims: {}-{}",
            self.claim_min_amount,
            self.claim_max_amount,
        );
        tracing::info!(target: "custodia::config", "  database: {}", self.db_path);
    }
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            var: name.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

fn env_decimal(name: &str, default: Decimal) -> Result<Decimal, ConfigError> {
    match env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            var: name.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = CustodiaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chain(ChainType::Erc20).required_confirmations, 12);
        assert_eq!(config.chain(ChainType::Bep20).required_confirmations, 15);
        assert_eq!(config.currency(Currency::Inr).precision, 2);
        assert_eq!(config.currency(Currency::Usdt).precision, 6);
    }

    #[test]
    fn test_production_rejects_placeholder_custody() {
        let config = CustodiaConfig::default();
        assert!(config.validate_for_production().is_err());

        let mut config = CustodiaConfig::default();
        config.erc20.custody_address = "0x1111111111111111111111111111111111111111".to_string();
        config.bep20.custody_address = "0x2222222222222222222222222222222222222222".to_string();
        assert!(config.validate_for_production().is_ok());
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let mut config = CustodiaConfig::default();
        config.usdt.min_withdrawal = Decimal::from(100_000);
        assert!(config.validate().is_err());

        let mut config = CustodiaConfig::default();
        config.inr.fee_percentage = Decimal::from(150);
        assert!(config.validate().is_err());

        let mut config = CustodiaConfig::default();
        config.erc20.custody_address = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }
}
