//! In-Memory Storage Implementation
//!
//! Provides in-memory storage for testing and development.
//! Data is lost when the service restarts.
//!
//! The whole state sits behind one `RwLock`, so a compound operation takes
//! the write guard once and touches several record families under it. That
//! guard is the atomic unit here, matching what the SQLite backend gets
//! from a transaction.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::traits::{
    AddressStore, DepositStore, IntakeStats, StorageError, StorageResult, SweepStore, WalletStore,
    WithdrawalStats, WithdrawalStore,
};
use crate::types::address::WalletAddress;
use crate::types::chain::ChainType;
use crate::types::deposit::{ChainDeposit, ChainDepositStatus, ClaimStatus, FiatDepositClaim};
use crate::types::ledger::{EntryDraft, EntryKind, EntryStatus, LedgerEntry, Posting};
use crate::types::money::{Currency, UserId};
use crate::types::sweep::{SweepRecord, SweepStatus};
use crate::types::wallet::{Wallet, WalletStatus};
use crate::types::withdrawal::{WithdrawalRequest, WithdrawalStatus};

#[derive(Default)]
struct CoreState {
    wallets: HashMap<(UserId, Currency), Wallet>,
    /// Append-only, in posting order.
    entries: Vec<LedgerEntry>,
    addresses: HashMap<(UserId, ChainType), WalletAddress>,
    claims: HashMap<Uuid, FiatDepositClaim>,
    deposits: HashMap<Uuid, ChainDeposit>,
    /// Index: transaction hash -> deposit ID
    deposits_by_hash: HashMap<String, Uuid>,
    sweeps: HashMap<Uuid, SweepRecord>,
    withdrawals: HashMap<Uuid, WithdrawalRequest>,
}

impl CoreState {
    /// The single posting path: lazily create the wallet, apply the draft,
    /// append the entry. The draft fails before anything is written.
    fn post(&mut self, draft: &EntryDraft) -> StorageResult<Posting> {
        let wallet = self
            .wallets
            .entry((draft.user_id, draft.currency))
            .or_insert_with(|| Wallet::new(draft.user_id, draft.currency));

        let (after, entry) = draft.apply_to(wallet)?;
        wallet.balance = after;
        wallet.touch();

        let posting = Posting {
            wallet: wallet.clone(),
            entry: entry.clone(),
        };
        self.entries.push(entry);
        Ok(posting)
    }

    /// Apply several drafts all-or-nothing: every draft is staged against
    /// copies first, so one rejection leaves no partial writes.
    fn post_many(&mut self, drafts: &[EntryDraft]) -> StorageResult<Vec<Posting>> {
        let mut staged_wallets: HashMap<(UserId, Currency), Wallet> = HashMap::new();
        let mut staged: Vec<(Wallet, LedgerEntry)> = Vec::with_capacity(drafts.len());

        for draft in drafts {
            let key = (draft.user_id, draft.currency);
            let wallet = staged_wallets
                .get(&key)
                .cloned()
                .or_else(|| self.wallets.get(&key).cloned())
                .unwrap_or_else(|| Wallet::new(draft.user_id, draft.currency));

            let (after, entry) = draft.apply_to(&wallet)?;
            let mut updated = wallet;
            updated.balance = after;
            updated.touch();
            staged_wallets.insert(key, updated.clone());
            staged.push((updated, entry));
        }

        let mut postings = Vec::with_capacity(staged.len());
        for (wallet, entry) in staged {
            self.wallets
                .insert((wallet.user_id, wallet.currency), wallet.clone());
            postings.push(Posting {
                wallet,
                entry: entry.clone(),
            });
            self.entries.push(entry);
        }
        Ok(postings)
    }

    /// Advance the pending escrow entry that references a withdrawal.
    fn settle_escrow_entry(&mut self, withdrawal_id: Uuid, status: EntryStatus) {
        let reference = withdrawal_id.to_string();
        if let Some(entry) = self.entries.iter_mut().find(|e| {
            e.kind == EntryKind::Withdrawal
                && e.status == EntryStatus::Pending
                && e.reference_id.as_deref() == Some(reference.as_str())
        }) {
            entry.status = status;
        }
    }

    fn active_sweep_exists(&self, deposit_id: Uuid) -> bool {
        self.sweeps
            .values()
            .any(|s| s.deposit_id == deposit_id && s.is_active())
    }
}

/// In-memory accounting store
///
/// Thread-safe; uses Arc<RwLock<>> for concurrent access.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<CoreState>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn get_or_create_wallet(
        &self,
        user: UserId,
        currency: Currency,
    ) -> StorageResult<Wallet> {
        let mut state = self.state.write().await;
        let wallet = state
            .wallets
            .entry((user, currency))
            .or_insert_with(|| Wallet::new(user, currency));
        Ok(wallet.clone())
    }

    async fn wallet(&self, user: UserId, currency: Currency) -> StorageResult<Option<Wallet>> {
        let state = self.state.read().await;
        Ok(state.wallets.get(&(user, currency)).cloned())
    }

    async fn wallets_for_user(&self, user: UserId) -> StorageResult<Vec<Wallet>> {
        let state = self.state.read().await;
        let mut wallets: Vec<Wallet> = state
            .wallets
            .values()
            .filter(|w| w.user_id == user)
            .cloned()
            .collect();
        wallets.sort_by_key(|w| w.currency.code());
        Ok(wallets)
    }

    async fn set_wallet_status(
        &self,
        user: UserId,
        currency: Currency,
        status: WalletStatus,
    ) -> StorageResult<Wallet> {
        let mut state = self.state.write().await;
        let wallet = state
            .wallets
            .get_mut(&(user, currency))
            .ok_or_else(|| StorageError::NotFound(format!("wallet {}/{}", user, currency)))?;
        wallet.set_status(status);
        Ok(wallet.clone())
    }

    async fn post(&self, draft: EntryDraft) -> StorageResult<Posting> {
        let mut state = self.state.write().await;
        state.post(&draft)
    }

    async fn entries_for_user(
        &self,
        user: UserId,
        currency: Option<Currency>,
        limit: usize,
    ) -> StorageResult<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .rev()
            .filter(|e| e.user_id == user && currency.map_or(true, |c| e.currency == c))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AddressStore for MemoryStore {
    async fn insert_address(&self, address: &WalletAddress) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let key = (address.user_id, address.chain);
        if state.addresses.contains_key(&key) {
            return Err(StorageError::Duplicate(format!(
                "address for {}/{}",
                address.user_id, address.chain
            )));
        }
        state.addresses.insert(key, address.clone());
        Ok(())
    }

    async fn address_for(
        &self,
        user: UserId,
        chain: ChainType,
    ) -> StorageResult<Option<WalletAddress>> {
        let state = self.state.read().await;
        Ok(state.addresses.get(&(user, chain)).cloned())
    }

    async fn addresses_for_user(&self, user: UserId) -> StorageResult<Vec<WalletAddress>> {
        let state = self.state.read().await;
        let mut addresses: Vec<WalletAddress> = state
            .addresses
            .values()
            .filter(|a| a.user_id == user)
            .cloned()
            .collect();
        addresses.sort_by_key(|a| a.chain.to_string());
        Ok(addresses)
    }

    async fn mark_address_used(&self, user: UserId, chain: ChainType) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let address = state
            .addresses
            .get_mut(&(user, chain))
            .ok_or_else(|| StorageError::NotFound(format!("address for {}/{}", user, chain)))?;
        address.mark_used();
        Ok(())
    }
}

#[async_trait]
impl DepositStore for MemoryStore {
    async fn insert_claim(&self, claim: &FiatDepositClaim) -> StorageResult<()> {
        let mut state = self.state.write().await;
        if state.claims.contains_key(&claim.id) {
            return Err(StorageError::Duplicate(format!("claim {}", claim.id)));
        }
        state.claims.insert(claim.id, claim.clone());
        Ok(())
    }

    async fn claim(&self, id: Uuid) -> StorageResult<Option<FiatDepositClaim>> {
        let state = self.state.read().await;
        Ok(state.claims.get(&id).cloned())
    }

    async fn claims_for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> StorageResult<Vec<FiatDepositClaim>> {
        let state = self.state.read().await;
        let mut claims: Vec<FiatDepositClaim> = state
            .claims
            .values()
            .filter(|c| c.user_id == user)
            .cloned()
            .collect();
        claims.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        claims.truncate(limit);
        Ok(claims)
    }

    async fn claims_by_status(&self, status: ClaimStatus) -> StorageResult<Vec<FiatDepositClaim>> {
        let state = self.state.read().await;
        let mut claims: Vec<FiatDepositClaim> = state
            .claims
            .values()
            .filter(|c| c.status == status)
            .cloned()
            .collect();
        claims.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(claims)
    }

    async fn approve_claim(
        &self,
        id: Uuid,
        admin: UserId,
    ) -> StorageResult<(FiatDepositClaim, Posting)> {
        let mut state = self.state.write().await;
        let claim = state
            .claims
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("claim {}", id)))?;
        if claim.status != ClaimStatus::Pending {
            return Err(StorageError::Conflict(format!(
                "claim {} already {}",
                id, claim.status
            )));
        }

        // Fiat claims settle against the platform fiat wallet.
        let draft = EntryDraft::new(claim.user_id, EntryKind::Deposit, Currency::Inr, claim.amount)
            .with_reference(claim.id.to_string())
            .with_metadata(json!({
                "source": "fiat_claim",
                "fiat_method": claim.method.to_string(),
            }));
        let posting = state.post(&draft)?;

        let stored = state
            .claims
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("claim {}", id)))?;
        stored.mark_approved(admin);
        Ok((stored.clone(), posting))
    }

    async fn reject_claim(
        &self,
        id: Uuid,
        admin: UserId,
        reason: String,
    ) -> StorageResult<FiatDepositClaim> {
        let mut state = self.state.write().await;
        let claim = state
            .claims
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("claim {}", id)))?;
        if claim.status != ClaimStatus::Pending {
            return Err(StorageError::Conflict(format!(
                "claim {} already {}",
                id, claim.status
            )));
        }
        claim.mark_rejected(admin, reason);
        Ok(claim.clone())
    }

    async fn insert_chain_deposit(&self, deposit: &ChainDeposit) -> StorageResult<()> {
        let mut state = self.state.write().await;
        if state.deposits_by_hash.contains_key(&deposit.tx_hash) {
            return Err(StorageError::Duplicate(format!(
                "deposit with tx hash {}",
                deposit.tx_hash
            )));
        }
        if state.deposits.contains_key(&deposit.id) {
            return Err(StorageError::Duplicate(format!("deposit {}", deposit.id)));
        }
        state
            .deposits_by_hash
            .insert(deposit.tx_hash.clone(), deposit.id);
        state.deposits.insert(deposit.id, deposit.clone());
        Ok(())
    }

    async fn chain_deposit(&self, id: Uuid) -> StorageResult<Option<ChainDeposit>> {
        let state = self.state.read().await;
        Ok(state.deposits.get(&id).cloned())
    }

    async fn chain_deposit_by_tx_hash(
        &self,
        tx_hash: &str,
    ) -> StorageResult<Option<ChainDeposit>> {
        let state = self.state.read().await;
        let id = match state.deposits_by_hash.get(tx_hash) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(state.deposits.get(&id).cloned())
    }

    async fn chain_deposits_for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> StorageResult<Vec<ChainDeposit>> {
        let state = self.state.read().await;
        let mut deposits: Vec<ChainDeposit> = state
            .deposits
            .values()
            .filter(|d| d.user_id == user)
            .cloned()
            .collect();
        deposits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        deposits.truncate(limit);
        Ok(deposits)
    }

    async fn chain_deposits_by_status(
        &self,
        status: ChainDepositStatus,
    ) -> StorageResult<Vec<ChainDeposit>> {
        let state = self.state.read().await;
        let mut deposits: Vec<ChainDeposit> = state
            .deposits
            .values()
            .filter(|d| d.status == status)
            .cloned()
            .collect();
        deposits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(deposits)
    }

    async fn record_confirmations(
        &self,
        id: Uuid,
        confirmations: u32,
        block_number: Option<u64>,
    ) -> StorageResult<ChainDeposit> {
        let mut state = self.state.write().await;
        let deposit = state
            .deposits
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("deposit {}", id)))?;
        deposit.update_confirmations(confirmations, block_number);
        Ok(deposit.clone())
    }

    async fn confirm_deposit(&self, id: Uuid) -> StorageResult<(ChainDeposit, Posting)> {
        let mut state = self.state.write().await;
        let deposit = state
            .deposits
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("deposit {}", id)))?;
        if deposit.status != ChainDepositStatus::Pending {
            return Err(StorageError::Conflict(format!(
                "deposit {} already {}",
                id, deposit.status
            )));
        }
        if !deposit.is_confirmable() {
            return Err(StorageError::Conflict(format!(
                "deposit {} has {}/{} confirmations",
                id, deposit.confirmations, deposit.required_confirmations
            )));
        }

        let credit = EntryDraft::new(
            deposit.user_id,
            EntryKind::Deposit,
            Currency::Usdt,
            deposit.amount,
        )
        .with_reference(deposit.tx_hash.clone())
        .with_metadata(json!({
            "source": "chain_deposit",
            "deposit_id": deposit.id,
            "chain": deposit.chain.to_string(),
        }));
        // Mirror into the custody float so the funds sitting on the deposit
        // address stay accounted for until the sweep moves them.
        let float = EntryDraft::new(
            UserId::custody(),
            EntryKind::Deposit,
            Currency::Usdt,
            deposit.amount,
        )
        .with_reference(deposit.tx_hash.clone())
        .with_metadata(json!({
            "source": "custody_float",
            "deposit_id": deposit.id,
            "chain": deposit.chain.to_string(),
        }));

        let postings = state.post_many(&[credit, float])?;
        let user_posting = postings
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::Database("empty posting batch".to_string()))?;

        let stored = state
            .deposits
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("deposit {}", id)))?;
        stored.mark_confirmed();
        Ok((stored.clone(), user_posting))
    }

    async fn intake_stats(&self) -> StorageResult<IntakeStats> {
        let state = self.state.read().await;
        let mut stats = IntakeStats::default();

        for claim in state.claims.values() {
            match claim.status {
                ClaimStatus::Pending => stats.claims_pending += 1,
                ClaimStatus::Approved => {
                    stats.claims_approved += 1;
                    stats.total_fiat_approved += claim.amount;
                }
                ClaimStatus::Rejected | ClaimStatus::Cancelled => stats.claims_rejected += 1,
            }
        }

        for deposit in state.deposits.values() {
            match deposit.status {
                ChainDepositStatus::Pending => stats.deposits_pending += 1,
                ChainDepositStatus::Confirmed => {
                    stats.deposits_confirmed += 1;
                    stats.total_chain_confirmed += deposit.amount;
                }
                ChainDepositStatus::Swept => {
                    stats.deposits_swept += 1;
                    stats.total_chain_confirmed += deposit.amount;
                }
                ChainDepositStatus::Failed | ChainDepositStatus::Cancelled => {}
            }
        }

        Ok(stats)
    }
}

#[async_trait]
impl SweepStore for MemoryStore {
    async fn begin_sweep(&self, record: &SweepRecord) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let deposit = state
            .deposits
            .get(&record.deposit_id)
            .ok_or_else(|| StorageError::NotFound(format!("deposit {}", record.deposit_id)))?;
        if deposit.status != ChainDepositStatus::Confirmed {
            return Err(StorageError::Conflict(format!(
                "deposit {} is {}, not confirmed",
                record.deposit_id, deposit.status
            )));
        }
        if state.active_sweep_exists(record.deposit_id) {
            return Err(StorageError::Conflict(format!(
                "deposit {} already has an active sweep",
                record.deposit_id
            )));
        }
        if state.sweeps.contains_key(&record.id) {
            return Err(StorageError::Duplicate(format!("sweep {}", record.id)));
        }
        state.sweeps.insert(record.id, record.clone());
        Ok(())
    }

    async fn complete_sweep(
        &self,
        sweep_id: Uuid,
        tx_hash: String,
        gas_fee: Decimal,
    ) -> StorageResult<(SweepRecord, ChainDeposit, Posting)> {
        let mut state = self.state.write().await;
        let sweep = state
            .sweeps
            .get(&sweep_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("sweep {}", sweep_id)))?;
        if sweep.status != SweepStatus::Pending {
            return Err(StorageError::Conflict(format!(
                "sweep {} already {}",
                sweep_id, sweep.status
            )));
        }
        if !state.deposits.contains_key(&sweep.deposit_id) {
            return Err(StorageError::NotFound(format!(
                "deposit {}",
                sweep.deposit_id
            )));
        }

        // The float was credited at confirmation; the sweep releases it.
        let draft = EntryDraft::new(
            UserId::custody(),
            EntryKind::Sweep,
            Currency::Usdt,
            sweep.amount,
        )
        .with_reference(tx_hash.clone())
        .with_metadata(json!({
            "source": "custody_float",
            "deposit_id": sweep.deposit_id,
            "sweep_id": sweep.id,
            "chain": sweep.chain.to_string(),
        }));
        let posting = state.post(&draft)?;

        let updated_sweep = {
            let record = state
                .sweeps
                .get_mut(&sweep_id)
                .ok_or_else(|| StorageError::NotFound(format!("sweep {}", sweep_id)))?;
            record.mark_completed(tx_hash.clone(), gas_fee);
            record.clone()
        };
        let updated_deposit = {
            let deposit = state.deposits.get_mut(&sweep.deposit_id).ok_or_else(|| {
                StorageError::NotFound(format!("deposit {}", sweep.deposit_id))
            })?;
            deposit.mark_swept(tx_hash, gas_fee, sweep.initiated_by);
            deposit.clone()
        };

        Ok((updated_sweep, updated_deposit, posting))
    }

    async fn fail_sweep(&self, sweep_id: Uuid, error: String) -> StorageResult<SweepRecord> {
        let mut state = self.state.write().await;
        let sweep = state
            .sweeps
            .get_mut(&sweep_id)
            .ok_or_else(|| StorageError::NotFound(format!("sweep {}", sweep_id)))?;
        if sweep.status != SweepStatus::Pending {
            return Err(StorageError::Conflict(format!(
                "sweep {} already {}",
                sweep_id, sweep.status
            )));
        }
        sweep.mark_failed(error);
        Ok(sweep.clone())
    }

    async fn sweep(&self, id: Uuid) -> StorageResult<Option<SweepRecord>> {
        let state = self.state.read().await;
        Ok(state.sweeps.get(&id).cloned())
    }

    async fn sweeps_for_deposit(&self, deposit_id: Uuid) -> StorageResult<Vec<SweepRecord>> {
        let state = self.state.read().await;
        let mut sweeps: Vec<SweepRecord> = state
            .sweeps
            .values()
            .filter(|s| s.deposit_id == deposit_id)
            .cloned()
            .collect();
        sweeps.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sweeps)
    }

    async fn sweeps_by_status(&self, status: SweepStatus) -> StorageResult<Vec<SweepRecord>> {
        let state = self.state.read().await;
        let mut sweeps: Vec<SweepRecord> = state
            .sweeps
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        sweeps.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sweeps)
    }
}

#[async_trait]
impl WithdrawalStore for MemoryStore {
    async fn create_withdrawal(&self, request: &WithdrawalRequest) -> StorageResult<Posting> {
        let mut state = self.state.write().await;
        if state.withdrawals.contains_key(&request.id) {
            return Err(StorageError::Duplicate(format!("withdrawal {}", request.id)));
        }

        // Escrow: amount + fee leaves the balance now, entry stays pending
        // until the request settles.
        let draft = EntryDraft::new(
            request.user_id,
            EntryKind::Withdrawal,
            request.currency,
            request.total(),
        )
        .with_status(EntryStatus::Pending)
        .with_reference(request.id.to_string())
        .with_metadata(json!({
            "amount": request.amount,
            "fee": request.fee,
            "payout_method": request.payout.method().to_string(),
        }));
        let posting = state.post(&draft)?;

        state.withdrawals.insert(request.id, request.clone());
        Ok(posting)
    }

    async fn withdrawal(&self, id: Uuid) -> StorageResult<Option<WithdrawalRequest>> {
        let state = self.state.read().await;
        Ok(state.withdrawals.get(&id).cloned())
    }

    async fn withdrawals_for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> StorageResult<Vec<WithdrawalRequest>> {
        let state = self.state.read().await;
        let mut requests: Vec<WithdrawalRequest> = state
            .withdrawals
            .values()
            .filter(|w| w.user_id == user)
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        requests.truncate(limit);
        Ok(requests)
    }

    async fn withdrawals_by_status(
        &self,
        status: WithdrawalStatus,
    ) -> StorageResult<Vec<WithdrawalRequest>> {
        let state = self.state.read().await;
        let mut requests: Vec<WithdrawalRequest> = state
            .withdrawals
            .values()
            .filter(|w| w.status == status)
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn withdrawn_today(&self, user: UserId, currency: Currency) -> StorageResult<Decimal> {
        let state = self.state.read().await;
        let today = Utc::now().date_naive();
        Ok(state
            .withdrawals
            .values()
            .filter(|w| {
                w.user_id == user
                    && w.currency == currency
                    && w.status.counts_toward_daily_cap()
                    && w.created_at.date_naive() == today
            })
            .map(|w| w.amount)
            .sum())
    }

    async fn approve_withdrawal(
        &self,
        id: Uuid,
        admin: UserId,
        notes: Option<String>,
    ) -> StorageResult<WithdrawalRequest> {
        let mut state = self.state.write().await;
        let request = state
            .withdrawals
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("withdrawal {}", id)))?;
        if request.status != WithdrawalStatus::Pending {
            return Err(StorageError::Conflict(format!(
                "withdrawal {} is {}",
                id, request.status
            )));
        }
        request.mark_approved(Some(admin));
        if notes.is_some() {
            request.admin_notes = notes;
        }
        Ok(request.clone())
    }

    async fn start_processing(&self, id: Uuid, admin: UserId) -> StorageResult<WithdrawalRequest> {
        let mut state = self.state.write().await;
        let request = state
            .withdrawals
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("withdrawal {}", id)))?;
        if request.status != WithdrawalStatus::Approved {
            return Err(StorageError::Conflict(format!(
                "withdrawal {} is {}",
                id, request.status
            )));
        }
        request.mark_processing();
        request.processed_by = Some(admin);
        Ok(request.clone())
    }

    async fn complete_withdrawal(
        &self,
        id: Uuid,
        admin: UserId,
        tx_hash: Option<String>,
        notes: Option<String>,
    ) -> StorageResult<WithdrawalRequest> {
        let mut state = self.state.write().await;
        let request = state
            .withdrawals
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("withdrawal {}", id)))?;
        if !matches!(
            request.status,
            WithdrawalStatus::Approved | WithdrawalStatus::Processing
        ) {
            return Err(StorageError::Conflict(format!(
                "withdrawal {} is {}",
                id, request.status
            )));
        }

        state.settle_escrow_entry(id, EntryStatus::Completed);
        let stored = state
            .withdrawals
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("withdrawal {}", id)))?;
        stored.mark_completed(admin, tx_hash);
        if notes.is_some() {
            stored.admin_notes = notes;
        }
        Ok(stored.clone())
    }

    async fn reject_withdrawal(
        &self,
        id: Uuid,
        admin: UserId,
        reason: String,
    ) -> StorageResult<(WithdrawalRequest, Posting)> {
        let mut state = self.state.write().await;
        let request = state
            .withdrawals
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("withdrawal {}", id)))?;
        if request.status != WithdrawalStatus::Pending {
            return Err(StorageError::Conflict(format!(
                "withdrawal {} is {}",
                id, request.status
            )));
        }

        let refund = EntryDraft::new(
            request.user_id,
            EntryKind::Refund,
            request.currency,
            request.total(),
        )
        .with_reference(request.id.to_string())
        .with_metadata(json!({
            "outcome": "rejected",
            "reason": reason,
        }));
        let posting = state.post(&refund)?;

        state.settle_escrow_entry(id, EntryStatus::Failed);
        let stored = state
            .withdrawals
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("withdrawal {}", id)))?;
        stored.mark_rejected(admin, reason);
        Ok((stored.clone(), posting))
    }

    async fn cancel_withdrawal(
        &self,
        id: Uuid,
        actor: Option<UserId>,
    ) -> StorageResult<(WithdrawalRequest, Posting)> {
        let mut state = self.state.write().await;
        let request = state
            .withdrawals
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("withdrawal {}", id)))?;
        if !request.can_cancel() {
            return Err(StorageError::Conflict(format!(
                "withdrawal {} is {}",
                id, request.status
            )));
        }

        let refund = EntryDraft::new(
            request.user_id,
            EntryKind::Refund,
            request.currency,
            request.total(),
        )
        .with_reference(request.id.to_string())
        .with_metadata(json!({
            "outcome": "cancelled",
        }));
        let posting = state.post(&refund)?;

        state.settle_escrow_entry(id, EntryStatus::Cancelled);
        let stored = state
            .withdrawals
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("withdrawal {}", id)))?;
        stored.mark_cancelled(actor);
        Ok((stored.clone(), posting))
    }

    async fn withdrawal_stats(&self) -> StorageResult<WithdrawalStats> {
        let state = self.state.read().await;
        let mut stats = WithdrawalStats::default();
        for request in state.withdrawals.values() {
            match request.status {
                WithdrawalStatus::Pending => stats.pending += 1,
                WithdrawalStatus::Approved => stats.approved += 1,
                WithdrawalStatus::Processing => stats.processing += 1,
                WithdrawalStatus::Completed => {
                    stats.completed += 1;
                    stats.total_paid_out += request.amount;
                    stats.total_fees += request.fee;
                }
                WithdrawalStatus::Rejected => stats.rejected += 1,
                WithdrawalStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::deposit::SweepType;
    use crate::types::withdrawal::PayoutSpec;

    fn tx_hash(byte: &str) -> String {
        format!("0x{}", byte.repeat(32))
    }

    fn evm_address(byte: &str) -> String {
        format!("0x{}", byte.repeat(40))
    }

    fn chain_deposit(user: UserId, amount: Decimal, hash: String) -> ChainDeposit {
        ChainDeposit::new(
            user,
            ChainType::Erc20,
            amount,
            hash,
            evm_address("1"),
            evm_address("2"),
            12,
            SweepType::Auto,
        )
    }

    fn chain_payout() -> PayoutSpec {
        PayoutSpec::Chain {
            chain: ChainType::Erc20,
            address: evm_address("b"),
        }
    }

    #[tokio::test]
    async fn test_post_creates_wallet_lazily() {
        let store = MemoryStore::new();
        let user = UserId::new();

        let draft = EntryDraft::new(user, EntryKind::Deposit, Currency::Inr, Decimal::from(500));
        let posting = store.post(draft).await.unwrap();

        assert_eq!(posting.wallet.balance, Decimal::from(500));
        assert_eq!(posting.entry.balance_before, Decimal::ZERO);
        assert_eq!(posting.entry.balance_after, Decimal::from(500));

        let wallet = store.wallet(user, Currency::Inr).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Decimal::from(500));
    }

    #[tokio::test]
    async fn test_rejected_post_leaves_no_entry() {
        let store = MemoryStore::new();
        let user = UserId::new();

        let draft = EntryDraft::new(
            user,
            EntryKind::Withdrawal,
            Currency::Inr,
            Decimal::from(100),
        );
        let err = store.post(draft).await.unwrap_err();
        assert!(matches!(err, StorageError::Ledger(_)));

        let entries = store.entries_for_user(user, None, 10).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_tx_hash_rejected() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let hash = tx_hash("ab");

        let first = chain_deposit(user, Decimal::from(30), hash.clone());
        store.insert_chain_deposit(&first).await.unwrap();

        let second = chain_deposit(user, Decimal::from(30), hash);
        let err = store.insert_chain_deposit(&second).await.unwrap_err();
        assert!(matches!(err, StorageError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_confirm_deposit_exactly_once() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let mut deposit = chain_deposit(user, Decimal::from(30), tx_hash("cd"));
        deposit.confirmations = 12;
        store.insert_chain_deposit(&deposit).await.unwrap();

        let (confirmed, posting) = store.confirm_deposit(deposit.id).await.unwrap();
        assert_eq!(confirmed.status, ChainDepositStatus::Confirmed);
        assert_eq!(posting.wallet.balance, Decimal::from(30));

        // Custody float mirrors the credit.
        let float = store
            .wallet(UserId::custody(), Currency::Usdt)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(float.balance, Decimal::from(30));

        // Replays hit the status re-check.
        let err = store.confirm_deposit(deposit.id).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let wallet = store.wallet(user, Currency::Usdt).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Decimal::from(30));
    }

    #[tokio::test]
    async fn test_reject_withdrawal_refunds_and_settles_escrow() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let admin = UserId::new();

        store
            .post(EntryDraft::new(
                user,
                EntryKind::Deposit,
                Currency::Usdt,
                Decimal::from(1000),
            ))
            .await
            .unwrap();

        let request = WithdrawalRequest::new(
            user,
            Currency::Usdt,
            Decimal::from(100),
            Decimal::from(3),
            chain_payout(),
        );
        let posting = store.create_withdrawal(&request).await.unwrap();
        assert_eq!(posting.wallet.balance, Decimal::from(897));
        assert_eq!(posting.entry.status, EntryStatus::Pending);

        let (rejected, refund) = store
            .reject_withdrawal(request.id, admin, "name mismatch".to_string())
            .await
            .unwrap();
        assert_eq!(rejected.status, WithdrawalStatus::Rejected);
        assert_eq!(refund.wallet.balance, Decimal::from(1000));

        let entries = store.entries_for_user(user, None, 10).await.unwrap();
        let escrow = entries
            .iter()
            .find(|e| e.kind == EntryKind::Withdrawal)
            .unwrap();
        assert_eq!(escrow.status, EntryStatus::Failed);
        let refund_entry = entries.iter().find(|e| e.kind == EntryKind::Refund).unwrap();
        assert_eq!(refund_entry.status, EntryStatus::Completed);
    }

    #[tokio::test]
    async fn test_begin_sweep_blocks_double_claim() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let mut deposit = chain_deposit(user, Decimal::from(30), tx_hash("ef"));
        deposit.confirmations = 12;
        store.insert_chain_deposit(&deposit).await.unwrap();
        store.confirm_deposit(deposit.id).await.unwrap();

        let first = SweepRecord::new(&deposit, evm_address("c"), SweepType::Auto, None);
        store.begin_sweep(&first).await.unwrap();

        let second = SweepRecord::new(&deposit, evm_address("c"), SweepType::Manual, None);
        let err = store.begin_sweep(&second).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        // A failed attempt releases the claim.
        store
            .fail_sweep(first.id, "rpc timeout".to_string())
            .await
            .unwrap();
        store.begin_sweep(&second).await.unwrap();
    }

    #[tokio::test]
    async fn test_complete_sweep_releases_float() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let mut deposit = chain_deposit(user, Decimal::from(30), tx_hash("aa"));
        deposit.confirmations = 12;
        store.insert_chain_deposit(&deposit).await.unwrap();
        store.confirm_deposit(deposit.id).await.unwrap();

        let record = SweepRecord::new(&deposit, evm_address("c"), SweepType::Auto, None);
        store.begin_sweep(&record).await.unwrap();

        let (sweep, swept, _posting) = store
            .complete_sweep(record.id, tx_hash("bb"), Decimal::new(5, 3))
            .await
            .unwrap();
        assert_eq!(sweep.status, SweepStatus::Completed);
        assert_eq!(swept.status, ChainDepositStatus::Swept);
        assert_eq!(swept.sweep_tx_hash, Some(tx_hash("bb")));

        let float = store
            .wallet(UserId::custody(), Currency::Usdt)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(float.balance, Decimal::ZERO);

        // The user balance is untouched by the sweep.
        let wallet = store.wallet(user, Currency::Usdt).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Decimal::from(30));
    }

    #[tokio::test]
    async fn test_withdrawn_today_counts_cap_statuses_only() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let admin = UserId::new();

        store
            .post(EntryDraft::new(
                user,
                EntryKind::Deposit,
                Currency::Usdt,
                Decimal::from(10_000),
            ))
            .await
            .unwrap();

        let kept = WithdrawalRequest::new(
            user,
            Currency::Usdt,
            Decimal::from(100),
            Decimal::from(3),
            chain_payout(),
        );
        store.create_withdrawal(&kept).await.unwrap();

        let refunded = WithdrawalRequest::new(
            user,
            Currency::Usdt,
            Decimal::from(200),
            Decimal::from(4),
            chain_payout(),
        );
        store.create_withdrawal(&refunded).await.unwrap();
        store
            .reject_withdrawal(refunded.id, admin, "bad address".to_string())
            .await
            .unwrap();

        let used = store.withdrawn_today(user, Currency::Usdt).await.unwrap();
        assert_eq!(used, Decimal::from(100));
    }
}
