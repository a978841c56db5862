//! Sweep Engine
//!
//! Drives the sweep of a confirmed deposit to the custody address.
//!
//! # Flow:
//! 1. A sweep record is claimed in storage; a deposit can only carry one
//!    active sweep, so concurrent attempts lose here
//! 2. The custody transfer runs against the chain — no locks held
//! 3. Success releases the custody float and marks the deposit swept;
//!    failure marks the record failed and leaves the deposit confirmed,
//!    so the sweep can be retried
//!
//! The chain transfer itself sits behind [`CustodyTransfer`]; the engine
//! never touches keys or RPC endpoints directly.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::CustodiaConfig;
use crate::error::{CustodiaError, Result};
use crate::logging::log_sweep_event;
use crate::registry::{AddressRegistry, KeyMaterial};
use crate::storage::traits::CoreStore;
use crate::types::chain::ChainType;
use crate::types::deposit::{ChainDeposit, ChainDepositStatus, SweepType};
use crate::types::money::UserId;
use crate::types::sweep::{SweepRecord, SweepStatus};

/// A transfer order handed to the chain-side dependency
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub chain: ChainType,
    pub amount: Decimal,
    pub from_address: String,
    pub custody_address: String,
    pub key_material: KeyMaterial,
}

/// Outcome of a successful custody transfer
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub tx_hash: String,
    pub gas_fee: Decimal,
}

/// The transfer dependency reported a failure
#[derive(Debug, Error)]
#[error("custody transfer failed: {message}")]
pub struct TransferError {
    pub message: String,
}

impl TransferError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Chain-side executor that moves funds off a deposit address
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CustodyTransfer: Send + Sync {
    async fn transfer(&self, request: TransferRequest)
        -> std::result::Result<TransferReceipt, TransferError>;
}

/// Sweep engine
pub struct SweepEngine {
    /// Backing store
    store: Arc<dyn CoreStore>,

    /// Address registry (signing material)
    registry: Arc<AddressRegistry>,

    /// Chain-side transfer executor
    transfer: Arc<dyn CustodyTransfer>,

    /// Platform configuration (custody addresses)
    config: Arc<CustodiaConfig>,
}

impl SweepEngine {
    /// Create a new sweep engine
    pub fn new(
        store: Arc<dyn CoreStore>,
        registry: Arc<AddressRegistry>,
        transfer: Arc<dyn CustodyTransfer>,
        config: Arc<CustodiaConfig>,
    ) -> Self {
        Self {
            store,
            registry,
            transfer,
            config,
        }
    }

    /// Sweep a just-confirmed deposit automatically
    pub async fn auto_sweep(&self, deposit: &ChainDeposit) -> Result<SweepRecord> {
        self.execute(deposit, SweepType::Auto, None).await
    }

    /// Sweep a confirmed deposit on an admin's order
    pub async fn manual_sweep(&self, deposit_id: Uuid, admin: UserId) -> Result<SweepRecord> {
        let deposit = self
            .store
            .chain_deposit(deposit_id)
            .await?
            .ok_or_else(|| CustodiaError::not_found(format!("deposit {}", deposit_id)))?;

        match deposit.status {
            ChainDepositStatus::Confirmed => {}
            ChainDepositStatus::Swept => {
                return Err(CustodiaError::already_processed(format!(
                    "deposit {} already swept",
                    deposit_id
                )));
            }
            other => {
                return Err(CustodiaError::invalid_state("confirmed", other));
            }
        }

        self.execute(&deposit, SweepType::Manual, Some(admin)).await
    }

    async fn execute(
        &self,
        deposit: &ChainDeposit,
        sweep_type: SweepType,
        initiated_by: Option<UserId>,
    ) -> Result<SweepRecord> {
        let custody_address = self.config.chain(deposit.chain).custody_address.clone();
        let record = SweepRecord::new(deposit, custody_address.clone(), sweep_type, initiated_by);

        // Claim the sweep; a conflict means another sweep already holds
        // (or held) this deposit.
        self.store.begin_sweep(&record).await?;

        let request = TransferRequest {
            chain: deposit.chain,
            amount: deposit.amount,
            from_address: deposit.to_address.clone(),
            custody_address,
            key_material: self.registry.key_material(deposit.user_id),
        };

        match self.transfer.transfer(request).await {
            Ok(receipt) => {
                let (sweep, _, _) = self
                    .store
                    .complete_sweep(record.id, receipt.tx_hash, receipt.gas_fee)
                    .await?;
                log_sweep_event(
                    "sweep_completed",
                    &sweep.id.to_string(),
                    &deposit.id.to_string(),
                    &sweep.amount.to_string(),
                    true,
                    None,
                );
                Ok(sweep)
            }
            Err(err) => {
                if let Err(mark_err) = self
                    .store
                    .fail_sweep(record.id, err.message.clone())
                    .await
                {
                    log_sweep_event(
                        "sweep_fail_mark",
                        &record.id.to_string(),
                        &deposit.id.to_string(),
                        &record.amount.to_string(),
                        false,
                        Some(&mark_err.to_string()),
                    );
                }
                log_sweep_event(
                    "sweep_failed",
                    &record.id.to_string(),
                    &deposit.id.to_string(),
                    &record.amount.to_string(),
                    false,
                    Some(&err.message),
                );
                Err(CustodiaError::ExternalTransferFailed(err.message))
            }
        }
    }

    /// Look up a sweep record
    pub async fn sweep(&self, id: Uuid) -> Result<SweepRecord> {
        self.store
            .sweep(id)
            .await?
            .ok_or_else(|| CustodiaError::not_found(format!("sweep {}", id)))
    }

    /// All sweep attempts against a deposit, newest first
    pub async fn sweeps_for_deposit(&self, deposit_id: Uuid) -> Result<Vec<SweepRecord>> {
        Ok(self.store.sweeps_for_deposit(deposit_id).await?)
    }

    /// Sweeps in a given state, newest first
    pub async fn sweeps_by_status(&self, status: SweepStatus) -> Result<Vec<SweepRecord>> {
        Ok(self.store.sweeps_by_status(status).await?)
    }
}
