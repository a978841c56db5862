//! Confirmation Tracker
//!
//! Consumes confirmation observations for pending chain deposits and
//! settles each deposit exactly once when its threshold is reached.
//! Settlement credits the user and the custody float atomically; the
//! auto-sweep handoff happens after, and its failure never unwinds the
//! settlement.

use std::sync::Arc;
use uuid::Uuid;

use crate::error::{CustodiaError, Result};
use crate::logging::log_deposit_event;
use crate::storage::traits::{CoreStore, StorageError};
use crate::sweep::SweepEngine;
use crate::types::deposit::{ChainDeposit, ChainDepositStatus, SweepType};
use crate::types::ledger::Posting;
use crate::types::sweep::SweepRecord;

/// What happened to the sweep after a deposit settled
#[derive(Debug)]
pub enum SweepReport {
    /// Auto sweep ran to completion
    Swept(SweepRecord),
    /// Deposit is above the auto threshold; an admin orders the sweep
    Deferred,
    /// Auto sweep failed; the deposit stays confirmed and sweepable
    Failed(String),
}

/// Outcome of feeding one confirmation observation to the tracker
#[derive(Debug)]
pub enum ConfirmationAdvance {
    /// Still below the confirmation threshold
    Tracking { deposit: ChainDeposit },
    /// This observation settled the deposit
    Confirmed {
        deposit: ChainDeposit,
        credit: Posting,
        sweep: SweepReport,
    },
    /// The deposit settled earlier; replayed observations are no-ops
    AlreadySettled { deposit: ChainDeposit },
}

/// Confirmation tracker
pub struct ConfirmationTracker {
    /// Backing store
    store: Arc<dyn CoreStore>,

    /// Sweep engine for the auto-sweep handoff
    sweep: Arc<SweepEngine>,
}

impl ConfirmationTracker {
    /// Create a new confirmation tracker
    pub fn new(store: Arc<dyn CoreStore>, sweep: Arc<SweepEngine>) -> Self {
        Self { store, sweep }
    }

    /// Deposits still waiting on confirmations
    pub async fn pending_deposits(&self) -> Result<Vec<ChainDeposit>> {
        Ok(self
            .store
            .chain_deposits_by_status(ChainDepositStatus::Pending)
            .await?)
    }

    /// Record a confirmation observation for a deposit
    ///
    /// Confirmation counts only move up; stale or duplicate observations
    /// are absorbed. Crossing the threshold settles the deposit. If the
    /// wallet cannot take the credit the deposit stays pending and the
    /// observation can be replayed after the wallet is reactivated.
    pub async fn record_confirmation(
        &self,
        deposit_id: Uuid,
        confirmations: u32,
        block_number: Option<u64>,
    ) -> Result<ConfirmationAdvance> {
        let deposit = self
            .store
            .record_confirmations(deposit_id, confirmations, block_number)
            .await?;

        if deposit.status != ChainDepositStatus::Pending {
            return Ok(ConfirmationAdvance::AlreadySettled { deposit });
        }
        if !deposit.is_confirmable() {
            return Ok(ConfirmationAdvance::Tracking { deposit });
        }

        match self.store.confirm_deposit(deposit_id).await {
            Ok((confirmed, credit)) => {
                log_deposit_event(
                    "chain_deposit_confirmed",
                    &confirmed.id.to_string(),
                    &confirmed.amount.to_string(),
                    true,
                    None,
                );

                let sweep = if confirmed.sweep_type == SweepType::Auto {
                    match self.sweep.auto_sweep(&confirmed).await {
                        Ok(record) => SweepReport::Swept(record),
                        // The credit stands; the sweep can be re-run.
                        Err(err) => SweepReport::Failed(err.to_string()),
                    }
                } else {
                    SweepReport::Deferred
                };

                Ok(ConfirmationAdvance::Confirmed {
                    deposit: confirmed,
                    credit,
                    sweep,
                })
            }
            // Another observer settled the deposit between our check and
            // the atomic confirm.
            Err(StorageError::Conflict(_)) => {
                let deposit = self
                    .store
                    .chain_deposit(deposit_id)
                    .await?
                    .ok_or_else(|| {
                        CustodiaError::not_found(format!("deposit {}", deposit_id))
                    })?;
                Ok(ConfirmationAdvance::AlreadySettled { deposit })
            }
            Err(err) => {
                let err = CustodiaError::from(err);
                log_deposit_event(
                    "chain_deposit_confirmed",
                    &deposit_id.to_string(),
                    &deposit.amount.to_string(),
                    false,
                    Some(&err.to_string()),
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CustodiaConfig;
    use crate::registry::AddressRegistry;
    use crate::storage::memory::MemoryStore;
    use crate::storage::traits::{DepositStore, WalletStore};
    use crate::sweep::{MockCustodyTransfer, TransferError, TransferReceipt};
    use crate::types::chain::ChainType;
    use crate::types::money::{Currency, UserId};
    use crate::types::sweep::SweepStatus;
    use crate::types::wallet::WalletStatus;
    use rust_decimal::Decimal;

    fn tx_hash(byte: &str) -> String {
        format!("0x{}", byte.repeat(32))
    }

    fn evm_address(byte: &str) -> String {
        format!("0x{}", byte.repeat(40))
    }

    fn deposit(user: UserId, amount: Decimal, sweep_type: SweepType) -> ChainDeposit {
        ChainDeposit::new(
            user,
            ChainType::Erc20,
            amount,
            tx_hash("ab"),
            evm_address("1"),
            evm_address("2"),
            12,
            sweep_type,
        )
    }

    fn tracker(store: Arc<MemoryStore>, transfer: MockCustodyTransfer) -> ConfirmationTracker {
        let engine = SweepEngine::new(
            store.clone(),
            Arc::new(AddressRegistry::new(store.clone())),
            Arc::new(transfer),
            Arc::new(CustodiaConfig::default()),
        );
        ConfirmationTracker::new(store, Arc::new(engine))
    }

    fn completing_transfer() -> MockCustodyTransfer {
        let mut transfer = MockCustodyTransfer::new();
        transfer.expect_transfer().returning(|_| {
            Ok(TransferReceipt {
                tx_hash: format!("0x{}", "cd".repeat(32)),
                gas_fee: Decimal::new(5, 3),
            })
        });
        transfer
    }

    #[tokio::test]
    async fn test_below_threshold_keeps_tracking() {
        let store = Arc::new(MemoryStore::new());
        let dep = deposit(UserId::new(), Decimal::from(30), SweepType::Auto);
        store.insert_chain_deposit(&dep).await.unwrap();

        let tracker = tracker(store.clone(), MockCustodyTransfer::new());
        let advance = tracker
            .record_confirmation(dep.id, 6, Some(90))
            .await
            .unwrap();

        match advance {
            ConfirmationAdvance::Tracking { deposit } => {
                assert_eq!(deposit.confirmations, 6);
                assert_eq!(deposit.block_number, Some(90));
            }
            other => panic!("expected Tracking, got {:?}", other),
        }
        assert!(store
            .wallet(dep.user_id, Currency::Usdt)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_threshold_settles_and_auto_sweeps() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new();
        let dep = deposit(user, Decimal::from(30), SweepType::Auto);
        store.insert_chain_deposit(&dep).await.unwrap();

        let tracker = tracker(store.clone(), completing_transfer());
        let advance = tracker
            .record_confirmation(dep.id, 12, Some(96))
            .await
            .unwrap();

        match advance {
            ConfirmationAdvance::Confirmed {
                credit, sweep, ..
            } => {
                assert_eq!(credit.wallet.balance, Decimal::from(30));
                match sweep {
                    SweepReport::Swept(record) => {
                        assert_eq!(record.status, SweepStatus::Completed)
                    }
                    other => panic!("expected Swept, got {:?}", other),
                }
            }
            other => panic!("expected Confirmed, got {:?}", other),
        }

        let settled = store.chain_deposit(dep.id).await.unwrap().unwrap();
        assert_eq!(settled.status, ChainDepositStatus::Swept);

        // User keeps the credit; the float is released.
        let wallet = store.wallet(user, Currency::Usdt).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Decimal::from(30));
        let float = store
            .wallet(UserId::custody(), Currency::Usdt)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(float.balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_large_deposit_defers_sweep() {
        let store = Arc::new(MemoryStore::new());
        let dep = deposit(UserId::new(), Decimal::from(80), SweepType::Manual);
        store.insert_chain_deposit(&dep).await.unwrap();

        // Transfer must never run for a deferred sweep.
        let tracker = tracker(store.clone(), MockCustodyTransfer::new());
        let advance = tracker
            .record_confirmation(dep.id, 12, None)
            .await
            .unwrap();

        assert!(matches!(
            advance,
            ConfirmationAdvance::Confirmed {
                sweep: SweepReport::Deferred,
                ..
            }
        ));
        let settled = store.chain_deposit(dep.id).await.unwrap().unwrap();
        assert_eq!(settled.status, ChainDepositStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_replayed_observation_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new();
        let dep = deposit(user, Decimal::from(80), SweepType::Manual);
        store.insert_chain_deposit(&dep).await.unwrap();

        let tracker = tracker(store.clone(), MockCustodyTransfer::new());
        tracker
            .record_confirmation(dep.id, 12, Some(96))
            .await
            .unwrap();

        // Same and lower counts replay without a second credit.
        for confs in [12, 5] {
            let advance = tracker
                .record_confirmation(dep.id, confs, None)
                .await
                .unwrap();
            assert!(matches!(
                advance,
                ConfirmationAdvance::AlreadySettled { .. }
            ));
        }

        let wallet = store.wallet(user, Currency::Usdt).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Decimal::from(80));
        let entries = store.entries_for_user(user, None, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_failure_keeps_settlement() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new();
        let dep = deposit(user, Decimal::from(30), SweepType::Auto);
        store.insert_chain_deposit(&dep).await.unwrap();

        let mut failing = MockCustodyTransfer::new();
        failing
            .expect_transfer()
            .returning(|_| Err(TransferError::new("gas spike")));

        let tracker = tracker(store.clone(), failing);
        let advance = tracker
            .record_confirmation(dep.id, 12, None)
            .await
            .unwrap();

        match advance {
            ConfirmationAdvance::Confirmed { sweep, .. } => {
                assert!(matches!(sweep, SweepReport::Failed(_)));
            }
            other => panic!("expected Confirmed, got {:?}", other),
        }

        // Credit stands, deposit stays sweepable.
        let wallet = store.wallet(user, Currency::Usdt).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Decimal::from(30));
        let settled = store.chain_deposit(dep.id).await.unwrap().unwrap();
        assert_eq!(settled.status, ChainDepositStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_locked_wallet_defers_settlement() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new();
        let dep = deposit(user, Decimal::from(30), SweepType::Auto);
        store.insert_chain_deposit(&dep).await.unwrap();

        store.get_or_create_wallet(user, Currency::Usdt).await.unwrap();
        store
            .set_wallet_status(user, Currency::Usdt, WalletStatus::Locked)
            .await
            .unwrap();

        let tracker = tracker(store.clone(), completing_transfer());
        let result = tracker.record_confirmation(dep.id, 12, None).await;
        assert!(matches!(result, Err(CustodiaError::WalletInactive { .. })));

        // Deposit still pending with the count banked; unlock and replay.
        let pending = store.chain_deposit(dep.id).await.unwrap().unwrap();
        assert_eq!(pending.status, ChainDepositStatus::Pending);
        assert_eq!(pending.confirmations, 12);

        store
            .set_wallet_status(user, Currency::Usdt, WalletStatus::Active)
            .await
            .unwrap();
        let advance = tracker
            .record_confirmation(dep.id, 12, None)
            .await
            .unwrap();
        assert!(matches!(advance, ConfirmationAdvance::Confirmed { .. }));
    }
}
