//! Sweep records: one row per attempt to move a confirmed deposit's funds
//! from its user deposit address into the custody wallet.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::chain::ChainType;
use super::deposit::{ChainDeposit, SweepType};
use super::money::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStatus {
    /// Claimed; the chain transfer is in flight.
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for SweepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SweepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown sweep status: {}", other)),
        }
    }
}

/// One sweep attempt against a confirmed deposit.
///
/// A pending or completed record blocks further attempts on the same
/// deposit; a failed record does not, so operators can retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRecord {
    pub id: Uuid,
    pub deposit_id: Uuid,
    pub user_id: UserId,
    pub chain: ChainType,
    pub from_address: String,
    pub to_address: String,
    pub amount: Decimal,
    pub gas_fee: Option<Decimal>,
    pub tx_hash: Option<String>,
    pub sweep_type: SweepType,
    pub status: SweepStatus,
    /// Operator for manual sweeps; absent for automatic ones.
    pub initiated_by: Option<UserId>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SweepRecord {
    pub fn new(
        deposit: &ChainDeposit,
        to_address: String,
        sweep_type: SweepType,
        initiated_by: Option<UserId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            deposit_id: deposit.id,
            user_id: deposit.user_id,
            chain: deposit.chain,
            from_address: deposit.to_address.clone(),
            to_address,
            amount: deposit.amount,
            gas_fee: None,
            tx_hash: None,
            sweep_type,
            status: SweepStatus::Pending,
            initiated_by,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Blocks a new attempt on the same deposit.
    pub fn is_active(&self) -> bool {
        matches!(self.status, SweepStatus::Pending | SweepStatus::Completed)
    }

    pub fn mark_completed(&mut self, tx_hash: String, gas_fee: Decimal) {
        self.status = SweepStatus::Completed;
        self.tx_hash = Some(tx_hash);
        self.gas_fee = Some(gas_fee);
        self.touch();
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = SweepStatus::Failed;
        self.error_message = Some(error);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed_deposit() -> ChainDeposit {
        let mut dep = ChainDeposit::new(
            UserId::new(),
            ChainType::Bep20,
            Decimal::new(100, 0),
            format!("0x{}", "ef".repeat(32)),
            format!("0x{}", "3".repeat(40)),
            format!("0x{}", "4".repeat(40)),
            15,
            SweepType::Manual,
        );
        dep.update_confirmations(15, Some(42));
        dep.mark_confirmed();
        dep
    }

    #[test]
    fn test_new_copies_deposit_fields() {
        let dep = confirmed_deposit();
        let admin = UserId::new();
        let sweep = SweepRecord::new(
            &dep,
            format!("0x{}", "9".repeat(40)),
            SweepType::Manual,
            Some(admin),
        );

        assert_eq!(sweep.deposit_id, dep.id);
        assert_eq!(sweep.user_id, dep.user_id);
        assert_eq!(sweep.from_address, dep.to_address);
        assert_eq!(sweep.amount, dep.amount);
        assert_eq!(sweep.status, SweepStatus::Pending);
        assert_eq!(sweep.initiated_by, Some(admin));
        assert!(sweep.is_active());
    }

    #[test]
    fn test_failed_sweep_is_not_active() {
        let dep = confirmed_deposit();
        let mut sweep =
            SweepRecord::new(&dep, format!("0x{}", "9".repeat(40)), SweepType::Auto, None);

        sweep.mark_failed("rpc timeout".to_string());
        assert_eq!(sweep.status, SweepStatus::Failed);
        assert!(!sweep.is_active());
        assert_eq!(sweep.error_message.as_deref(), Some("rpc timeout"));
    }

    #[test]
    fn test_completed_sweep_records_receipt() {
        let dep = confirmed_deposit();
        let mut sweep =
            SweepRecord::new(&dep, format!("0x{}", "9".repeat(40)), SweepType::Auto, None);

        sweep.mark_completed(format!("0x{}", "aa".repeat(32)), Decimal::new(5, 4));
        assert_eq!(sweep.status, SweepStatus::Completed);
        assert!(sweep.is_active());
        assert_eq!(sweep.gas_fee, Some(Decimal::new(5, 4)));
        assert!(sweep.tx_hash.is_some());
    }
}
