//! Deposit Intake
//!
//! Validates and records incoming value before anything touches a wallet.
//! Fiat deposit claims wait for an admin decision; chain deposits are
//! recorded pending and handed to the confirmation tracker.

use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::CustodiaConfig;
use crate::error::{CustodiaError, Result};
use crate::logging::log_deposit_event;
use crate::registry::AddressRegistry;
use crate::storage::traits::{CoreStore, IntakeStats};
use crate::types::chain::{is_valid_tx_hash, ChainType};
use crate::types::deposit::{
    ChainDeposit, ChainDepositStatus, ClaimStatus, FiatDepositClaim, FiatMethod, SweepType,
};
use crate::types::ledger::Posting;
use crate::types::money::{quantize, Currency, UserId};

/// Deposit intake service
pub struct DepositIntake {
    /// Backing store
    store: Arc<dyn CoreStore>,

    /// Address registry (deposit address ownership)
    registry: Arc<AddressRegistry>,

    /// Platform configuration (claim bounds, chain parameters)
    config: Arc<CustodiaConfig>,
}

impl DepositIntake {
    /// Create a new deposit intake service
    pub fn new(
        store: Arc<dyn CoreStore>,
        registry: Arc<AddressRegistry>,
        config: Arc<CustodiaConfig>,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    // Fiat claims

    /// Record a user's claim of an off-platform fiat transfer
    pub async fn create_claim(
        &self,
        user: UserId,
        amount: Decimal,
        method: FiatMethod,
        evidence: Option<String>,
    ) -> Result<FiatDepositClaim> {
        let amount = quantize(amount, self.config.currency(Currency::Inr).precision);
        if amount < self.config.claim_min_amount || amount > self.config.claim_max_amount {
            return Err(CustodiaError::limit_exceeded(format!(
                "claim amount {} outside {}..={}",
                amount, self.config.claim_min_amount, self.config.claim_max_amount
            )));
        }

        let claim = FiatDepositClaim::new(user, amount, method, evidence);
        self.store.insert_claim(&claim).await?;

        log_deposit_event(
            "fiat_claim_created",
            &claim.id.to_string(),
            &claim.amount.to_string(),
            true,
            None,
        );
        Ok(claim)
    }

    /// Approve a pending claim: credits the user's fiat wallet
    pub async fn approve_claim(
        &self,
        id: Uuid,
        admin: UserId,
    ) -> Result<(FiatDepositClaim, Posting)> {
        let claim = self.require_pending_claim(id).await?;

        let (approved, posting) = self.store.approve_claim(claim.id, admin).await?;
        log_deposit_event(
            "fiat_claim_approved",
            &approved.id.to_string(),
            &approved.amount.to_string(),
            true,
            None,
        );
        Ok((approved, posting))
    }

    /// Reject a pending claim with a reason
    pub async fn reject_claim(
        &self,
        id: Uuid,
        admin: UserId,
        reason: impl Into<String>,
    ) -> Result<FiatDepositClaim> {
        let claim = self.require_pending_claim(id).await?;

        let rejected = self
            .store
            .reject_claim(claim.id, admin, reason.into())
            .await?;
        log_deposit_event(
            "fiat_claim_rejected",
            &rejected.id.to_string(),
            &rejected.amount.to_string(),
            true,
            None,
        );
        Ok(rejected)
    }

    /// Look up a claim
    pub async fn claim(&self, id: Uuid) -> Result<FiatDepositClaim> {
        self.store
            .claim(id)
            .await?
            .ok_or_else(|| CustodiaError::not_found(format!("claim {}", id)))
    }

    /// A user's claims, newest first
    pub async fn claims_for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<FiatDepositClaim>> {
        Ok(self.store.claims_for_user(user, limit).await?)
    }

    /// The admin review queue
    pub async fn pending_claims(&self) -> Result<Vec<FiatDepositClaim>> {
        Ok(self.store.claims_by_status(ClaimStatus::Pending).await?)
    }

    async fn require_pending_claim(&self, id: Uuid) -> Result<FiatDepositClaim> {
        let claim = self
            .store
            .claim(id)
            .await?
            .ok_or_else(|| CustodiaError::not_found(format!("claim {}", id)))?;
        if !claim.is_pending() {
            return Err(CustodiaError::already_processed(format!(
                "claim {} already {}",
                id, claim.status
            )));
        }
        Ok(claim)
    }

    // Chain deposits

    /// Record an observed on-chain transfer into a user's deposit address
    ///
    /// The deposit starts pending; the confirmation tracker settles it
    /// once the chain's confirmation threshold is reached.
    pub async fn create_chain_deposit(
        &self,
        user: UserId,
        chain: ChainType,
        amount: Decimal,
        tx_hash: String,
        from_address: String,
        to_address: String,
    ) -> Result<ChainDeposit> {
        let amount = quantize(amount, self.config.currency(Currency::Usdt).precision);
        if amount <= Decimal::ZERO {
            return Err(CustodiaError::validation(format!(
                "deposit amount must be positive, got {}",
                amount
            )));
        }
        if !is_valid_tx_hash(&tx_hash) {
            return Err(CustodiaError::validation(format!(
                "malformed transaction hash: {}",
                tx_hash
            )));
        }
        let scheme = chain.address_scheme();
        if !scheme.matches(&from_address) {
            return Err(CustodiaError::validation(format!(
                "malformed from address: {}",
                from_address
            )));
        }
        if !scheme.matches(&to_address) {
            return Err(CustodiaError::validation(format!(
                "malformed to address: {}",
                to_address
            )));
        }

        // The receiving address must be the one we assigned to this user.
        let assigned = self
            .registry
            .address_for(user, chain)
            .await?
            .ok_or_else(|| {
                CustodiaError::validation(format!(
                    "user {} has no deposit address on {}",
                    user, chain
                ))
            })?;
        if !assigned.address.eq_ignore_ascii_case(&to_address) {
            return Err(CustodiaError::validation(format!(
                "{} is not the deposit address assigned to user {} on {}",
                to_address, user, chain
            )));
        }

        if let Some(existing) = self.store.chain_deposit_by_tx_hash(&tx_hash).await? {
            return Err(CustodiaError::duplicate(format!(
                "tx {} already recorded as deposit {}",
                tx_hash, existing.id
            )));
        }

        let chain_config = self.config.chain(chain);
        let sweep_type = if amount <= chain_config.auto_sweep_threshold {
            SweepType::Auto
        } else {
            SweepType::Manual
        };

        let deposit = ChainDeposit::new(
            user,
            chain,
            amount,
            tx_hash,
            from_address,
            to_address,
            chain_config.required_confirmations,
            sweep_type,
        );
        self.store.insert_chain_deposit(&deposit).await?;
        self.registry.mark_used(user, chain).await?;

        log_deposit_event(
            "chain_deposit_recorded",
            &deposit.id.to_string(),
            &deposit.amount.to_string(),
            true,
            None,
        );
        Ok(deposit)
    }

    /// Look up a chain deposit
    pub async fn deposit(&self, id: Uuid) -> Result<ChainDeposit> {
        self.store
            .chain_deposit(id)
            .await?
            .ok_or_else(|| CustodiaError::not_found(format!("deposit {}", id)))
    }

    /// Look up a chain deposit by its transaction hash
    pub async fn deposit_by_tx_hash(&self, tx_hash: &str) -> Result<Option<ChainDeposit>> {
        Ok(self.store.chain_deposit_by_tx_hash(tx_hash).await?)
    }

    /// A user's chain deposits, newest first
    pub async fn deposits_for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<ChainDeposit>> {
        Ok(self.store.chain_deposits_for_user(user, limit).await?)
    }

    /// Chain deposits in a given state, newest first
    pub async fn deposits_by_status(
        &self,
        status: ChainDepositStatus,
    ) -> Result<Vec<ChainDeposit>> {
        Ok(self.store.chain_deposits_by_status(status).await?)
    }

    /// Intake counters across both paths
    pub async fn stats(&self) -> Result<IntakeStats> {
        Ok(self.store.intake_stats().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use crate::storage::traits::WalletStore;

    fn tx_hash(byte: &str) -> String {
        format!("0x{}", byte.repeat(32))
    }

    fn evm_address(byte: &str) -> String {
        format!("0x{}", byte.repeat(40))
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        registry: Arc<AddressRegistry>,
        intake: DepositIntake,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(AddressRegistry::new(store.clone()));
        let intake = DepositIntake::new(
            store.clone(),
            registry.clone(),
            Arc::new(CustodiaConfig::default()),
        );
        Fixture {
            store,
            registry,
            intake,
        }
    }

    #[tokio::test]
    async fn test_claim_bounds_enforced() {
        let f = fixture();
        let user = UserId::new();

        let too_small = f
            .intake
            .create_claim(user, Decimal::from(99), FiatMethod::Upi, None)
            .await;
        assert!(matches!(too_small, Err(CustodiaError::LimitExceeded(_))));

        let too_large = f
            .intake
            .create_claim(user, Decimal::from(1_000_001), FiatMethod::Upi, None)
            .await;
        assert!(matches!(too_large, Err(CustodiaError::LimitExceeded(_))));

        let ok = f
            .intake
            .create_claim(user, Decimal::from(100), FiatMethod::Upi, None)
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_approve_claim_credits_wallet_once() {
        let f = fixture();
        let user = UserId::new();
        let admin = UserId::new();

        let claim = f
            .intake
            .create_claim(
                user,
                Decimal::new(500_505, 3), // 500.505 -> 500.50 after quantize (banker's)
                FiatMethod::BankTransfer,
                Some("utr-443322".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(claim.amount, Decimal::new(50050, 2));

        let (approved, posting) = f.intake.approve_claim(claim.id, admin).await.unwrap();
        assert_eq!(approved.status, ClaimStatus::Approved);
        assert_eq!(approved.processed_by, Some(admin));
        assert_eq!(posting.wallet.balance, Decimal::new(50050, 2));
        assert_eq!(posting.entry.reference_id.as_deref(), Some(claim.id.to_string().as_str()));

        let replay = f.intake.approve_claim(claim.id, admin).await;
        assert!(matches!(replay, Err(CustodiaError::AlreadyProcessed(_))));
    }

    #[tokio::test]
    async fn test_reject_claim_leaves_balance_untouched() {
        let f = fixture();
        let user = UserId::new();
        let admin = UserId::new();

        let claim = f
            .intake
            .create_claim(user, Decimal::from(300), FiatMethod::Upi, None)
            .await
            .unwrap();
        let rejected = f
            .intake
            .reject_claim(claim.id, admin, "no matching transfer")
            .await
            .unwrap();
        assert_eq!(rejected.status, ClaimStatus::Rejected);
        assert_eq!(
            rejected.admin_notes.as_deref(),
            Some("no matching transfer")
        );

        assert!(f.store.wallet(user, Currency::Inr).await.unwrap().is_none());

        let approve_after = f.intake.approve_claim(claim.id, admin).await;
        assert!(matches!(
            approve_after,
            Err(CustodiaError::AlreadyProcessed(_))
        ));
    }

    #[tokio::test]
    async fn test_chain_deposit_requires_assigned_address() {
        let f = fixture();
        let user = UserId::new();

        // No address assigned yet.
        let result = f
            .intake
            .create_chain_deposit(
                user,
                ChainType::Erc20,
                Decimal::from(30),
                tx_hash("ab"),
                evm_address("1"),
                evm_address("2"),
            )
            .await;
        assert!(matches!(result, Err(CustodiaError::Validation(_))));

        let assigned = f
            .registry
            .get_or_create_address(user, ChainType::Erc20)
            .await
            .unwrap();

        // Wrong receiving address still fails.
        let result = f
            .intake
            .create_chain_deposit(
                user,
                ChainType::Erc20,
                Decimal::from(30),
                tx_hash("ab"),
                evm_address("1"),
                evm_address("2"),
            )
            .await;
        assert!(matches!(result, Err(CustodiaError::Validation(_))));

        // Address comparison ignores hex casing.
        let deposit = f
            .intake
            .create_chain_deposit(
                user,
                ChainType::Erc20,
                Decimal::from(30),
                tx_hash("ab"),
                evm_address("1"),
                assigned.address.to_uppercase().replace("0X", "0x"),
            )
            .await
            .unwrap();
        assert_eq!(deposit.status, ChainDepositStatus::Pending);
        assert_eq!(deposit.required_confirmations, 12);

        let used = f
            .registry
            .address_for(user, ChainType::Erc20)
            .await
            .unwrap()
            .unwrap();
        assert!(used.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_chain_deposit_rejects_malformed_input() {
        let f = fixture();
        let user = UserId::new();
        let assigned = f
            .registry
            .get_or_create_address(user, ChainType::Erc20)
            .await
            .unwrap();

        let bad_hash = f
            .intake
            .create_chain_deposit(
                user,
                ChainType::Erc20,
                Decimal::from(30),
                "0xshort".to_string(),
                evm_address("1"),
                assigned.address.clone(),
            )
            .await;
        assert!(matches!(bad_hash, Err(CustodiaError::Validation(_))));

        let bad_from = f
            .intake
            .create_chain_deposit(
                user,
                ChainType::Erc20,
                Decimal::from(30),
                tx_hash("ab"),
                "not-an-address".to_string(),
                assigned.address.clone(),
            )
            .await;
        assert!(matches!(bad_from, Err(CustodiaError::Validation(_))));

        let zero = f
            .intake
            .create_chain_deposit(
                user,
                ChainType::Erc20,
                Decimal::ZERO,
                tx_hash("ab"),
                evm_address("1"),
                assigned.address.clone(),
            )
            .await;
        assert!(matches!(zero, Err(CustodiaError::Validation(_))));
    }

    #[tokio::test]
    async fn test_duplicate_tx_hash_rejected() {
        let f = fixture();
        let user = UserId::new();
        let assigned = f
            .registry
            .get_or_create_address(user, ChainType::Erc20)
            .await
            .unwrap();

        f.intake
            .create_chain_deposit(
                user,
                ChainType::Erc20,
                Decimal::from(30),
                tx_hash("ab"),
                evm_address("1"),
                assigned.address.clone(),
            )
            .await
            .unwrap();

        let replay = f
            .intake
            .create_chain_deposit(
                user,
                ChainType::Erc20,
                Decimal::from(30),
                tx_hash("ab"),
                evm_address("1"),
                assigned.address,
            )
            .await;
        assert!(matches!(
            replay,
            Err(CustodiaError::DuplicateTransaction(_))
        ));
    }

    #[tokio::test]
    async fn test_sweep_type_follows_threshold() {
        let f = fixture();
        let user = UserId::new();
        let assigned = f
            .registry
            .get_or_create_address(user, ChainType::Erc20)
            .await
            .unwrap();

        // Default ERC-20 auto sweep threshold is 50: at the threshold the
        // sweep stays automatic, above it an admin has to order the sweep.
        let at_threshold = f
            .intake
            .create_chain_deposit(
                user,
                ChainType::Erc20,
                Decimal::from(50),
                tx_hash("aa"),
                evm_address("1"),
                assigned.address.clone(),
            )
            .await
            .unwrap();
        assert_eq!(at_threshold.sweep_type, SweepType::Auto);

        let above = f
            .intake
            .create_chain_deposit(
                user,
                ChainType::Erc20,
                Decimal::new(50_000001, 6),
                tx_hash("bb"),
                evm_address("1"),
                assigned.address,
            )
            .await
            .unwrap();
        assert_eq!(above.sweep_type, SweepType::Manual);
    }

    #[tokio::test]
    async fn test_intake_stats_roll_up() {
        let f = fixture();
        let user = UserId::new();
        let admin = UserId::new();

        let approved = f
            .intake
            .create_claim(user, Decimal::from(200), FiatMethod::Upi, None)
            .await
            .unwrap();
        f.intake.approve_claim(approved.id, admin).await.unwrap();
        f.intake
            .create_claim(user, Decimal::from(150), FiatMethod::Upi, None)
            .await
            .unwrap();

        let stats = f.intake.stats().await.unwrap();
        assert_eq!(stats.claims_approved, 1);
        assert_eq!(stats.claims_pending, 1);
        assert_eq!(stats.total_fiat_approved, Decimal::from(200));
    }
}
