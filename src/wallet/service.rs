//! Wallet Service
//!
//! Post credits and debits against user wallets and read balances and
//! history back. Amounts are quantized to the currency precision before
//! they reach the ledger, so a caller can never store more decimal places
//! than the currency carries.

use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;

use crate::config::CustodiaConfig;
use crate::error::{CustodiaError, Result};
use crate::logging::{generate_correlation_id, log_ledger_event, log_security_event};
use crate::storage::traits::CoreStore;
use crate::types::ledger::{EntryDirection, EntryDraft, EntryKind, LedgerEntry, Posting};
use crate::types::money::{quantize, Currency, UserId};
use crate::types::wallet::{Wallet, WalletStatus};

/// Wallet service
pub struct WalletService {
    /// Backing store
    store: Arc<dyn CoreStore>,

    /// Platform configuration (currency precision)
    config: Arc<CustodiaConfig>,
}

impl WalletService {
    /// Create a new wallet service
    pub fn new(store: Arc<dyn CoreStore>, config: Arc<CustodiaConfig>) -> Self {
        Self { store, config }
    }

    /// Get a user's wallet for a currency, creating it at zero if absent
    pub async fn get_or_create(&self, user: UserId, currency: Currency) -> Result<Wallet> {
        Ok(self.store.get_or_create_wallet(user, currency).await?)
    }

    /// Get a user's wallet for a currency
    pub async fn get(&self, user: UserId, currency: Currency) -> Result<Wallet> {
        self.store
            .wallet(user, currency)
            .await?
            .ok_or_else(|| CustodiaError::not_found(format!("wallet {}/{}", user, currency)))
    }

    /// Get the spendable balance, zero if the wallet does not exist yet
    pub async fn balance(&self, user: UserId, currency: Currency) -> Result<Decimal> {
        Ok(self
            .store
            .wallet(user, currency)
            .await?
            .map(|w| w.balance)
            .unwrap_or(Decimal::ZERO))
    }

    /// All wallets held by a user
    pub async fn wallets(&self, user: UserId) -> Result<Vec<Wallet>> {
        Ok(self.store.wallets_for_user(user).await?)
    }

    /// Post a credit entry
    pub async fn credit(
        &self,
        user: UserId,
        kind: EntryKind,
        currency: Currency,
        amount: Decimal,
        reference: Option<String>,
        metadata: serde_json::Value,
    ) -> Result<Posting> {
        if kind.direction() != EntryDirection::Credit {
            return Err(CustodiaError::validation(format!(
                "{} is not a credit entry kind",
                kind
            )));
        }
        self.post(user, kind, currency, amount, reference, metadata)
            .await
    }

    /// Post a debit entry
    pub async fn debit(
        &self,
        user: UserId,
        kind: EntryKind,
        currency: Currency,
        amount: Decimal,
        reference: Option<String>,
        metadata: serde_json::Value,
    ) -> Result<Posting> {
        if kind.direction() != EntryDirection::Debit {
            return Err(CustodiaError::validation(format!(
                "{} is not a debit entry kind",
                kind
            )));
        }
        self.post(user, kind, currency, amount, reference, metadata)
            .await
    }

    /// Manual balance adjustment upward, attributed to an admin
    pub async fn admin_credit(
        &self,
        user: UserId,
        currency: Currency,
        amount: Decimal,
        admin: UserId,
        reason: impl Into<String>,
    ) -> Result<Posting> {
        let reason = reason.into();
        let posting = self
            .post(
                user,
                EntryKind::AdminCredit,
                currency,
                amount,
                None,
                json!({ "admin": admin, "reason": reason }),
            )
            .await?;

        log_security_event(
            "admin_credit",
            true,
            json!({
                "user_id": user,
                "currency": currency.code(),
                "amount": posting.entry.amount.to_string(),
                "admin": admin,
            }),
            Some(&posting.entry.id.to_string()),
        );
        Ok(posting)
    }

    /// Manual balance adjustment downward, attributed to an admin
    pub async fn admin_debit(
        &self,
        user: UserId,
        currency: Currency,
        amount: Decimal,
        admin: UserId,
        reason: impl Into<String>,
    ) -> Result<Posting> {
        let reason = reason.into();
        let posting = self
            .post(
                user,
                EntryKind::AdminDebit,
                currency,
                amount,
                None,
                json!({ "admin": admin, "reason": reason }),
            )
            .await?;

        log_security_event(
            "admin_debit",
            true,
            json!({
                "user_id": user,
                "currency": currency.code(),
                "amount": posting.entry.amount.to_string(),
                "admin": admin,
            }),
            Some(&posting.entry.id.to_string()),
        );
        Ok(posting)
    }

    /// Suspend, lock or reactivate a wallet
    pub async fn set_status(
        &self,
        user: UserId,
        currency: Currency,
        status: WalletStatus,
        admin: UserId,
    ) -> Result<Wallet> {
        let wallet = self.store.set_wallet_status(user, currency, status).await?;

        log_security_event(
            "wallet_status_changed",
            true,
            json!({
                "user_id": user,
                "currency": currency.code(),
                "status": status.to_string(),
                "admin": admin,
            }),
            None,
        );
        Ok(wallet)
    }

    /// Ledger history for a user, newest first
    pub async fn history(
        &self,
        user: UserId,
        currency: Option<Currency>,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>> {
        Ok(self.store.entries_for_user(user, currency, limit).await?)
    }

    async fn post(
        &self,
        user: UserId,
        kind: EntryKind,
        currency: Currency,
        amount: Decimal,
        reference: Option<String>,
        metadata: serde_json::Value,
    ) -> Result<Posting> {
        let amount = quantize(amount, self.config.currency(currency).precision);

        let mut draft = EntryDraft::new(user, kind, currency, amount).with_metadata(metadata);
        if let Some(reference) = reference {
            draft = draft.with_reference(reference);
        }

        match self.store.post(draft).await {
            Ok(posting) => {
                log_ledger_event(
                    &format!("ledger_{}", kind),
                    &posting.entry.id.to_string(),
                    &user.to_string(),
                    currency.code(),
                    &posting.entry.amount.to_string(),
                    true,
                    None,
                );
                Ok(posting)
            }
            Err(e) => {
                let err = CustodiaError::from(e);
                log_ledger_event(
                    &format!("ledger_{}", kind),
                    &generate_correlation_id(),
                    &user.to_string(),
                    currency.code(),
                    &amount.to_string(),
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
    use crate::storage::memory::MemoryStore;

    fn service() -> WalletService {
        WalletService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(CustodiaConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_credit_then_debit() {
        let service = service();
        let user = UserId::new();

        let posting = service
            .credit(
                user,
                EntryKind::Deposit,
                Currency::Inr,
                Decimal::from(500),
                Some("claim-7".to_string()),
                serde_json::Value::Null,
            )
            .await
            .unwrap();
        assert_eq!(posting.wallet.balance, Decimal::from(500));

        let posting = service
            .debit(
                user,
                EntryKind::Investment,
                Currency::Inr,
                Decimal::from(200),
                None,
                serde_json::Value::Null,
            )
            .await
            .unwrap();
        assert_eq!(posting.wallet.balance, Decimal::from(300));
        assert_eq!(service.balance(user, Currency::Inr).await.unwrap(), Decimal::from(300));
    }

    #[tokio::test]
    async fn test_kind_direction_enforced() {
        let service = service();
        let user = UserId::new();

        // Withdrawal is a debit kind; crediting with it must be refused.
        let result = service
            .credit(
                user,
                EntryKind::Withdrawal,
                Currency::Inr,
                Decimal::ONE,
                None,
                serde_json::Value::Null,
            )
            .await;
        assert!(matches!(result, Err(CustodiaError::Validation(_))));

        let result = service
            .debit(
                user,
                EntryKind::Deposit,
                Currency::Inr,
                Decimal::ONE,
                None,
                serde_json::Value::Null,
            )
            .await;
        assert!(matches!(result, Err(CustodiaError::Validation(_))));
    }

    #[tokio::test]
    async fn test_amounts_quantized_to_currency_precision() {
        let service = service();
        let user = UserId::new();

        // INR carries two decimal places; the third rounds away.
        let posting = service
            .credit(
                user,
                EntryKind::Deposit,
                Currency::Inr,
                Decimal::new(100_005, 3), // 100.005
                None,
                serde_json::Value::Null,
            )
            .await
            .unwrap();
        assert_eq!(posting.entry.amount, Decimal::new(10000, 2)); // 100.00

        let posting = service
            .credit(
                user,
                EntryKind::Deposit,
                Currency::Usdt,
                Decimal::new(1_0000005, 7), // 1.0000005
                None,
                serde_json::Value::Null,
            )
            .await
            .unwrap();
        assert_eq!(posting.entry.amount, Decimal::new(1, 0));
    }

    #[tokio::test]
    async fn test_insufficient_balance_maps_cleanly() {
        let service = service();
        let user = UserId::new();

        service
            .credit(
                user,
                EntryKind::Deposit,
                Currency::Usdt,
                Decimal::from(10),
                None,
                serde_json::Value::Null,
            )
            .await
            .unwrap();

        let result = service
            .debit(
                user,
                EntryKind::Investment,
                Currency::Usdt,
                Decimal::from(11),
                None,
                serde_json::Value::Null,
            )
            .await;
        assert!(matches!(
            result,
            Err(CustodiaError::InsufficientBalance { .. })
        ));
    }

    #[tokio::test]
    async fn test_suspended_wallet_blocks_posting() {
        let service = service();
        let user = UserId::new();
        let admin = UserId::new();

        service.get_or_create(user, Currency::Inr).await.unwrap();
        service
            .set_status(user, Currency::Inr, WalletStatus::Suspended, admin)
            .await
            .unwrap();

        let result = service
            .credit(
                user,
                EntryKind::Deposit,
                Currency::Inr,
                Decimal::ONE,
                None,
                serde_json::Value::Null,
            )
            .await;
        assert!(matches!(result, Err(CustodiaError::WalletInactive { .. })));
    }

    #[tokio::test]
    async fn test_admin_adjustments_carry_attribution() {
        let service = service();
        let user = UserId::new();
        let admin = UserId::new();

        service
            .admin_credit(user, Currency::Inr, Decimal::from(50), admin, "goodwill")
            .await
            .unwrap();
        service
            .admin_debit(user, Currency::Inr, Decimal::from(20), admin, "chargeback")
            .await
            .unwrap();

        let history = service.history(user, Some(Currency::Inr), 10).await.unwrap();
        assert_eq!(history.len(), 2);
        // Newest first.
        assert_eq!(history[0].kind, EntryKind::AdminDebit);
        assert_eq!(history[0].metadata["reason"], "chargeback");
        assert_eq!(history[1].kind, EntryKind::AdminCredit);
        assert_eq!(history[1].metadata["admin"], admin.to_string());
    }
}
