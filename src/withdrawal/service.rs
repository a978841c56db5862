//! Withdrawal Service
//!
//! Accepts withdrawal requests against verified users, escrows amount
//! plus fee at acceptance, and walks requests through the admin page:
//! approve, process, complete — or reject and cancel with an automatic
//! refund. Small requests inside the auto-approve ceiling skip the
//! manual review step.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::CustodiaConfig;
use crate::error::{CustodiaError, Result};
use crate::logging::log_withdrawal_event;
use crate::storage::traits::{CoreStore, WithdrawalStats};
use crate::types::chain::is_valid_tx_hash;
use crate::types::money::{quantize, Currency, UserId};
use crate::types::withdrawal::{PayoutSpec, WithdrawalRequest, WithdrawalStatus};

/// Verification gate consulted before a withdrawal is accepted
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityCheck: Send + Sync {
    async fn is_verified(&self, user: UserId) -> bool;
}

/// Per-user withdrawal limits and today's usage
#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalLimits {
    pub currency: Currency,
    pub min_withdrawal: Decimal,
    pub max_withdrawal: Decimal,
    pub fee_percentage: Decimal,
    pub fixed_fee: Decimal,
    pub daily_cap: Decimal,
    pub used_today: Decimal,
    pub remaining_today: Decimal,
    pub auto_approve_ceiling: Decimal,
}

/// Withdrawal service
pub struct WithdrawalService {
    /// Backing store
    store: Arc<dyn CoreStore>,

    /// Verification gate
    identity: Arc<dyn IdentityCheck>,

    /// Platform configuration (limits, fees)
    config: Arc<CustodiaConfig>,
}

impl WithdrawalService {
    /// Create a new withdrawal service
    pub fn new(
        store: Arc<dyn CoreStore>,
        identity: Arc<dyn IdentityCheck>,
        config: Arc<CustodiaConfig>,
    ) -> Self {
        Self {
            store,
            identity,
            config,
        }
    }

    /// Accept a withdrawal request, escrowing amount plus fee
    pub async fn create(
        &self,
        user: UserId,
        currency: Currency,
        amount: Decimal,
        payout: PayoutSpec,
    ) -> Result<WithdrawalRequest> {
        if !self.identity.is_verified(user).await {
            return Err(CustodiaError::validation(
                "user not verified for withdrawals",
            ));
        }
        payout
            .validate_for(currency)
            .map_err(CustodiaError::Validation)?;

        let limits = self.config.currency(currency);
        let amount = quantize(amount, limits.precision);
        if amount < limits.min_withdrawal {
            return Err(CustodiaError::limit_exceeded(format!(
                "amount {} below minimum {}",
                amount, limits.min_withdrawal
            )));
        }
        if amount > limits.max_withdrawal {
            return Err(CustodiaError::limit_exceeded(format!(
                "amount {} above maximum {}",
                amount, limits.max_withdrawal
            )));
        }

        let used_today = self.store.withdrawn_today(user, currency).await?;
        if used_today + amount > limits.daily_cap {
            return Err(CustodiaError::limit_exceeded(format!(
                "daily cap {} reached: {} used today, {} requested",
                limits.daily_cap, used_today, amount
            )));
        }

        let fee = self.fee_for(currency, amount);
        let mut request = WithdrawalRequest::new(user, currency, amount, fee, payout);

        // Small requests skip manual review. System approval carries no
        // admin id.
        let auto_approved = limits.auto_approve_ceiling > Decimal::ZERO
            && amount <= limits.auto_approve_ceiling;
        if auto_approved {
            request.mark_approved(None);
            request.admin_notes = Some("auto-approved within ceiling".to_string());
        }

        match self.store.create_withdrawal(&request).await {
            Ok(_) => {
                log_withdrawal_event(
                    if auto_approved {
                        "withdrawal_auto_approved"
                    } else {
                        "withdrawal_created"
                    },
                    &request.id.to_string(),
                    &request.amount.to_string(),
                    currency.code(),
                    true,
                    None,
                    None,
                );
                Ok(request)
            }
            Err(e) => {
                let err = CustodiaError::from(e);
                log_withdrawal_event(
                    "withdrawal_created",
                    &request.id.to_string(),
                    &request.amount.to_string(),
                    currency.code(),
                    false,
                    None,
                    Some(&err.to_string()),
                );
                Err(err)
            }
        }
    }

    /// Quote the fee for an amount
    pub fn fee_for(&self, currency: Currency, amount: Decimal) -> Decimal {
        let limits = self.config.currency(currency);
        quantize(
            amount * limits.fee_percentage / Decimal::ONE_HUNDRED + limits.fixed_fee,
            limits.precision,
        )
    }

    /// Limits and today's usage for a user
    pub async fn limits(&self, user: UserId, currency: Currency) -> Result<WithdrawalLimits> {
        let limits = self.config.currency(currency);
        let used_today = self.store.withdrawn_today(user, currency).await?;
        let remaining_today = (limits.daily_cap - used_today).max(Decimal::ZERO);

        Ok(WithdrawalLimits {
            currency,
            min_withdrawal: limits.min_withdrawal,
            max_withdrawal: limits.max_withdrawal,
            fee_percentage: limits.fee_percentage,
            fixed_fee: limits.fixed_fee,
            daily_cap: limits.daily_cap,
            used_today,
            remaining_today,
            auto_approve_ceiling: limits.auto_approve_ceiling,
        })
    }

    /// Approve a pending request
    pub async fn approve(
        &self,
        id: Uuid,
        admin: UserId,
        notes: Option<String>,
    ) -> Result<WithdrawalRequest> {
        self.require_state(id, &[WithdrawalStatus::Pending], "pending")
            .await?;

        let request = self.store.approve_withdrawal(id, admin, notes).await?;
        log_withdrawal_event(
            "withdrawal_approved",
            &request.id.to_string(),
            &request.amount.to_string(),
            request.currency.code(),
            true,
            None,
            None,
        );
        Ok(request)
    }

    /// Mark an approved request as being paid out
    pub async fn mark_processing(&self, id: Uuid, admin: UserId) -> Result<WithdrawalRequest> {
        self.require_state(id, &[WithdrawalStatus::Approved], "approved")
            .await?;

        let request = self.store.start_processing(id, admin).await?;
        log_withdrawal_event(
            "withdrawal_processing",
            &request.id.to_string(),
            &request.amount.to_string(),
            request.currency.code(),
            true,
            None,
            None,
        );
        Ok(request)
    }

    /// Complete a request after the payout settled
    ///
    /// Chain-settled currencies require the settlement transaction hash;
    /// fiat payouts carry their reference in the notes.
    pub async fn complete(
        &self,
        id: Uuid,
        admin: UserId,
        settlement_tx_hash: Option<String>,
        notes: Option<String>,
    ) -> Result<WithdrawalRequest> {
        let current = self
            .require_state(
                id,
                &[WithdrawalStatus::Approved, WithdrawalStatus::Processing],
                "approved or processing",
            )
            .await?;

        if current.currency.is_chain_settled() {
            match settlement_tx_hash.as_deref() {
                Some(hash) if is_valid_tx_hash(hash) => {}
                Some(hash) => {
                    return Err(CustodiaError::validation(format!(
                        "malformed settlement transaction hash: {}",
                        hash
                    )));
                }
                None => {
                    return Err(CustodiaError::validation(
                        "settlement transaction hash required for chain-settled payouts",
                    ));
                }
            }
        }

        let request = self
            .store
            .complete_withdrawal(id, admin, settlement_tx_hash, notes)
            .await?;
        log_withdrawal_event(
            "withdrawal_completed",
            &request.id.to_string(),
            &request.amount.to_string(),
            request.currency.code(),
            true,
            request.settlement_tx_hash.as_deref(),
            None,
        );
        Ok(request)
    }

    /// Reject a pending request, refunding the escrow
    pub async fn reject(
        &self,
        id: Uuid,
        admin: UserId,
        reason: impl Into<String>,
    ) -> Result<WithdrawalRequest> {
        self.require_state(id, &[WithdrawalStatus::Pending], "pending")
            .await?;

        let (request, _refund) = self
            .store
            .reject_withdrawal(id, admin, reason.into())
            .await?;
        log_withdrawal_event(
            "withdrawal_rejected",
            &request.id.to_string(),
            &request.amount.to_string(),
            request.currency.code(),
            true,
            None,
            None,
        );
        Ok(request)
    }

    /// Cancel a request, refunding the escrow
    ///
    /// Users cancel their own pending requests; an admin can also pull
    /// one back from processing. Approved requests are already queued
    /// for payout and cannot be cancelled.
    pub async fn cancel(&self, id: Uuid, actor: Option<UserId>) -> Result<WithdrawalRequest> {
        self.require_state(
            id,
            &[WithdrawalStatus::Pending, WithdrawalStatus::Processing],
            "pending or processing",
        )
        .await?;

        let (request, _refund) = self.store.cancel_withdrawal(id, actor).await?;
        log_withdrawal_event(
            "withdrawal_cancelled",
            &request.id.to_string(),
            &request.amount.to_string(),
            request.currency.code(),
            true,
            None,
            None,
        );
        Ok(request)
    }

    /// Look up a request
    pub async fn withdrawal(&self, id: Uuid) -> Result<WithdrawalRequest> {
        self.store
            .withdrawal(id)
            .await?
            .ok_or_else(|| CustodiaError::not_found(format!("withdrawal {}", id)))
    }

    /// A user's requests, newest first
    pub async fn withdrawals_for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<WithdrawalRequest>> {
        Ok(self.store.withdrawals_for_user(user, limit).await?)
    }

    /// Requests in a given state, newest first
    pub async fn withdrawals_by_status(
        &self,
        status: WithdrawalStatus,
    ) -> Result<Vec<WithdrawalRequest>> {
        Ok(self.store.withdrawals_by_status(status).await?)
    }

    /// Requests waiting on an operator decision
    pub async fn pending_review(&self) -> Result<Vec<WithdrawalRequest>> {
        self.withdrawals_by_status(WithdrawalStatus::Pending).await
    }

    /// Lifecycle counters and settled totals
    pub async fn stats(&self) -> Result<WithdrawalStats> {
        Ok(self.store.withdrawal_stats().await?)
    }

    async fn require_state(
        &self,
        id: Uuid,
        allowed: &[WithdrawalStatus],
        expected: &str,
    ) -> Result<WithdrawalRequest> {
        let request = self
            .store
            .withdrawal(id)
            .await?
            .ok_or_else(|| CustodiaError::not_found(format!("withdrawal {}", id)))?;

        if allowed.contains(&request.status) {
            return Ok(request);
        }
        if request.status.is_terminal() {
            return Err(CustodiaError::already_processed(format!(
                "withdrawal {} already {}",
                id, request.status
            )));
        }
        Err(CustodiaError::invalid_state(expected, request.status))
    }
}
