//! SQLite Persistent Storage
//!
//! Durable accounting store that survives service restarts. Uses connection
//! pooling via r2d2 for concurrent access.
//!
//! Every compound operation runs inside an immediate transaction: the
//! precondition re-checks, the balance update, the ledger entry and the
//! record transition commit together or roll back together.

use async_trait::async_trait;
use chrono::Utc;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;
use serde_json::json;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::traits::{
    AddressStore, DepositStore, IntakeStats, StorageError, StorageResult, SweepStore, WalletStore,
    WithdrawalStats, WithdrawalStore,
};
use crate::types::address::WalletAddress;
use crate::types::chain::ChainType;
use crate::types::deposit::{ChainDeposit, ChainDepositStatus, ClaimStatus, FiatDepositClaim};
use crate::types::ledger::{
    EntryDraft, EntryKind, EntryStatus, LedgerEntry, Posting,
};
use crate::types::money::{Currency, UserId};
use crate::types::sweep::{SweepRecord, SweepStatus};
use crate::types::wallet::{Wallet, WalletStatus};
use crate::types::withdrawal::{PayoutSpec, WithdrawalRequest, WithdrawalStatus};

/// Parse a TEXT column back into its typed form
fn parse_text<T: FromStr>(value: String, what: &str) -> rusqlite::Result<T> {
    value.parse::<T>().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("bad {}: {}", what, value).into(),
        )
    })
}

fn parse_opt<T: FromStr>(value: Option<String>, what: &str) -> rusqlite::Result<Option<T>> {
    value.map(|v| parse_text(v, what)).transpose()
}

fn parse_user(value: String) -> rusqlite::Result<UserId> {
    parse_text::<Uuid>(value, "user id").map(UserId::from)
}

fn parse_opt_user(value: Option<String>) -> rusqlite::Result<Option<UserId>> {
    value.map(parse_user).transpose()
}

fn parse_json(value: String) -> rusqlite::Result<serde_json::Value> {
    serde_json::from_str(&value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_payout(value: String) -> rusqlite::Result<PayoutSpec> {
    serde_json::from_str(&value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// SQLite-backed accounting store with connection pooling
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Create a new store with the given database path
    ///
    /// Creates the database file and runs migrations if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        // Immediate transactions from several pooled connections need a busy
        // timeout to queue instead of failing outright.
        let manager = SqliteConnectionManager::file(db_path)
            .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create an in-memory store (for testing)
    ///
    /// Pool size is pinned to one; every pooled connection would otherwise
    /// get its own private memory database.
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Get a connection from the pool
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS wallets (
                user_id TEXT NOT NULL,
                currency TEXT NOT NULL,
                balance TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, currency)
            );

            CREATE TABLE IF NOT EXISTS ledger_entries (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                currency TEXT NOT NULL,
                amount TEXT NOT NULL,
                balance_before TEXT NOT NULL,
                balance_after TEXT NOT NULL,
                status TEXT NOT NULL,
                reference_id TEXT,
                metadata TEXT NOT NULL DEFAULT 'null',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entries_user_currency
                ON ledger_entries(user_id, currency);
            CREATE INDEX IF NOT EXISTS idx_entries_reference
                ON ledger_entries(reference_id);

            CREATE TABLE IF NOT EXISTS wallet_addresses (
                user_id TEXT NOT NULL,
                chain TEXT NOT NULL,
                address TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                last_used_at TEXT,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_id, chain)
            );

            CREATE TABLE IF NOT EXISTS fiat_claims (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                amount TEXT NOT NULL,
                method TEXT NOT NULL,
                evidence TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                processed_by TEXT,
                processed_at TEXT,
                admin_notes TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_claims_user ON fiat_claims(user_id);
            CREATE INDEX IF NOT EXISTS idx_claims_status ON fiat_claims(status);

            CREATE TABLE IF NOT EXISTS chain_deposits (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                chain TEXT NOT NULL,
                amount TEXT NOT NULL,
                tx_hash TEXT NOT NULL UNIQUE,
                from_address TEXT NOT NULL,
                to_address TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                confirmations INTEGER NOT NULL DEFAULT 0,
                required_confirmations INTEGER NOT NULL,
                sweep_type TEXT NOT NULL,
                sweep_tx_hash TEXT,
                gas_fee TEXT,
                block_number INTEGER,
                processed_by TEXT,
                processed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_deposits_user ON chain_deposits(user_id);
            CREATE INDEX IF NOT EXISTS idx_deposits_status ON chain_deposits(status);

            CREATE TABLE IF NOT EXISTS sweep_records (
                id TEXT PRIMARY KEY,
                deposit_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                chain TEXT NOT NULL,
                from_address TEXT NOT NULL,
                to_address TEXT NOT NULL,
                amount TEXT NOT NULL,
                gas_fee TEXT,
                tx_hash TEXT,
                sweep_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                initiated_by TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sweeps_deposit ON sweep_records(deposit_id);
            CREATE INDEX IF NOT EXISTS idx_sweeps_status ON sweep_records(status);

            CREATE TABLE IF NOT EXISTS withdrawals (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                currency TEXT NOT NULL,
                amount TEXT NOT NULL,
                fee TEXT NOT NULL,
                payout TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                settlement_tx_hash TEXT,
                processed_by TEXT,
                processed_at TEXT,
                admin_notes TEXT,
                rejection_reason TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_withdrawals_user ON withdrawals(user_id);
            CREATE INDEX IF NOT EXISTS idx_withdrawals_status ON withdrawals(status);
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    fn map_insert_err(e: rusqlite::Error, what: String) -> StorageError {
        if let rusqlite::Error::SqliteFailure(ref err, _) = e {
            if err.extended_code == 1555 || err.extended_code == 2067 {
                return StorageError::Duplicate(what);
            }
        }
        StorageError::Database(e.to_string())
    }

    // Row mappers

    fn row_to_wallet(row: &rusqlite::Row) -> rusqlite::Result<Wallet> {
        Ok(Wallet {
            user_id: parse_user(row.get("user_id")?)?,
            currency: parse_text(row.get("currency")?, "currency")?,
            balance: parse_text(row.get("balance")?, "balance")?,
            status: parse_text(row.get("status")?, "wallet status")?,
            is_active: row.get("is_active")?,
            created_at: parse_text(row.get("created_at")?, "timestamp")?,
            updated_at: parse_text(row.get("updated_at")?, "timestamp")?,
        })
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<LedgerEntry> {
        Ok(LedgerEntry {
            id: parse_text(row.get("id")?, "entry id")?,
            user_id: parse_user(row.get("user_id")?)?,
            kind: parse_text(row.get("kind")?, "entry kind")?,
            currency: parse_text(row.get("currency")?, "currency")?,
            amount: parse_text(row.get("amount")?, "amount")?,
            balance_before: parse_text(row.get("balance_before")?, "balance")?,
            balance_after: parse_text(row.get("balance_after")?, "balance")?,
            status: parse_text(row.get("status")?, "entry status")?,
            reference_id: row.get("reference_id")?,
            metadata: parse_json(row.get("metadata")?)?,
            created_at: parse_text(row.get("created_at")?, "timestamp")?,
        })
    }

    fn row_to_address(row: &rusqlite::Row) -> rusqlite::Result<WalletAddress> {
        Ok(WalletAddress {
            user_id: parse_user(row.get("user_id")?)?,
            chain: parse_text(row.get("chain")?, "chain")?,
            address: row.get("address")?,
            status: parse_text(row.get("status")?, "address status")?,
            last_used_at: parse_opt(row.get("last_used_at")?, "timestamp")?,
            created_at: parse_text(row.get("created_at")?, "timestamp")?,
        })
    }

    fn row_to_claim(row: &rusqlite::Row) -> rusqlite::Result<FiatDepositClaim> {
        Ok(FiatDepositClaim {
            id: parse_text(row.get("id")?, "claim id")?,
            user_id: parse_user(row.get("user_id")?)?,
            amount: parse_text(row.get("amount")?, "amount")?,
            method: parse_text(row.get("method")?, "fiat method")?,
            evidence: row.get("evidence")?,
            status: parse_text(row.get("status")?, "claim status")?,
            processed_by: parse_opt_user(row.get("processed_by")?)?,
            processed_at: parse_opt(row.get("processed_at")?, "timestamp")?,
            admin_notes: row.get("admin_notes")?,
            created_at: parse_text(row.get("created_at")?, "timestamp")?,
        })
    }

    fn row_to_deposit(row: &rusqlite::Row) -> rusqlite::Result<ChainDeposit> {
        Ok(ChainDeposit {
            id: parse_text(row.get("id")?, "deposit id")?,
            user_id: parse_user(row.get("user_id")?)?,
            chain: parse_text(row.get("chain")?, "chain")?,
            amount: parse_text(row.get("amount")?, "amount")?,
            tx_hash: row.get("tx_hash")?,
            from_address: row.get("from_address")?,
            to_address: row.get("to_address")?,
            status: parse_text(row.get("status")?, "deposit status")?,
            confirmations: row.get::<_, i64>("confirmations")? as u32,
            required_confirmations: row.get::<_, i64>("required_confirmations")? as u32,
            sweep_type: parse_text(row.get("sweep_type")?, "sweep type")?,
            sweep_tx_hash: row.get("sweep_tx_hash")?,
            gas_fee: parse_opt(row.get("gas_fee")?, "gas fee")?,
            block_number: row.get::<_, Option<i64>>("block_number")?.map(|v| v as u64),
            processed_by: parse_opt_user(row.get("processed_by")?)?,
            processed_at: parse_opt(row.get("processed_at")?, "timestamp")?,
            created_at: parse_text(row.get("created_at")?, "timestamp")?,
            updated_at: parse_text(row.get("updated_at")?, "timestamp")?,
        })
    }

    fn row_to_sweep(row: &rusqlite::Row) -> rusqlite::Result<SweepRecord> {
        Ok(SweepRecord {
            id: parse_text(row.get("id")?, "sweep id")?,
            deposit_id: parse_text(row.get("deposit_id")?, "deposit id")?,
            user_id: parse_user(row.get("user_id")?)?,
            chain: parse_text(row.get("chain")?, "chain")?,
            from_address: row.get("from_address")?,
            to_address: row.get("to_address")?,
            amount: parse_text(row.get("amount")?, "amount")?,
            gas_fee: parse_opt(row.get("gas_fee")?, "gas fee")?,
            tx_hash: row.get("tx_hash")?,
            sweep_type: parse_text(row.get("sweep_type")?, "sweep type")?,
            status: parse_text(row.get("status")?, "sweep status")?,
            initiated_by: parse_opt_user(row.get("initiated_by")?)?,
            error_message: row.get("error_message")?,
            created_at: parse_text(row.get("created_at")?, "timestamp")?,
            updated_at: parse_text(row.get("updated_at")?, "timestamp")?,
        })
    }

    fn row_to_withdrawal(row: &rusqlite::Row) -> rusqlite::Result<WithdrawalRequest> {
        Ok(WithdrawalRequest {
            id: parse_text(row.get("id")?, "withdrawal id")?,
            user_id: parse_user(row.get("user_id")?)?,
            currency: parse_text(row.get("currency")?, "currency")?,
            amount: parse_text(row.get("amount")?, "amount")?,
            fee: parse_text(row.get("fee")?, "fee")?,
            payout: parse_payout(row.get("payout")?)?,
            status: parse_text(row.get("status")?, "withdrawal status")?,
            settlement_tx_hash: row.get("settlement_tx_hash")?,
            processed_by: parse_opt_user(row.get("processed_by")?)?,
            processed_at: parse_opt(row.get("processed_at")?, "timestamp")?,
            admin_notes: row.get("admin_notes")?,
            rejection_reason: row.get("rejection_reason")?,
            created_at: parse_text(row.get("created_at")?, "timestamp")?,
            updated_at: parse_text(row.get("updated_at")?, "timestamp")?,
        })
    }

    // Helpers shared by the transaction bodies. They take a plain connection
    // so the same code runs inside and outside a transaction scope.

    fn fetch_wallet(
        conn: &Connection,
        user: UserId,
        currency: Currency,
    ) -> Result<Option<Wallet>, StorageError> {
        conn.query_row(
            "SELECT * FROM wallets WHERE user_id = ?1 AND currency = ?2",
            params![user.to_string(), currency.to_string()],
            |row| Self::row_to_wallet(row),
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn insert_wallet(conn: &Connection, wallet: &Wallet) -> Result<(), StorageError> {
        conn.execute(
            r#"
            INSERT INTO wallets (
                user_id, currency, balance, status, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                wallet.user_id.to_string(),
                wallet.currency.to_string(),
                wallet.balance.to_string(),
                wallet.status.to_string(),
                wallet.is_active,
                wallet.created_at.to_rfc3339(),
                wallet.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            Self::map_insert_err(e, format!("wallet {}/{}", wallet.user_id, wallet.currency))
        })?;
        Ok(())
    }

    fn insert_entry(conn: &Connection, entry: &LedgerEntry) -> Result<(), StorageError> {
        conn.execute(
            r#"
            INSERT INTO ledger_entries (
                id, user_id, kind, currency, amount, balance_before,
                balance_after, status, reference_id, metadata, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                entry.id.to_string(),
                entry.user_id.to_string(),
                entry.kind.to_string(),
                entry.currency.to_string(),
                entry.amount.to_string(),
                entry.balance_before.to_string(),
                entry.balance_after.to_string(),
                entry.status.to_string(),
                entry.reference_id,
                entry.metadata.to_string(),
                entry.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    /// The single posting path: lazily create the wallet, apply the draft,
    /// persist the new balance and the entry.
    fn post_in(conn: &Connection, draft: &EntryDraft) -> Result<Posting, StorageError> {
        let wallet = match Self::fetch_wallet(conn, draft.user_id, draft.currency)? {
            Some(wallet) => wallet,
            None => {
                let wallet = Wallet::new(draft.user_id, draft.currency);
                Self::insert_wallet(conn, &wallet)?;
                wallet
            }
        };

        let (after, entry) = draft.apply_to(&wallet)?;
        let mut updated = wallet;
        updated.balance = after;
        updated.touch();

        conn.execute(
            "UPDATE wallets SET balance = ?3, updated_at = ?4 WHERE user_id = ?1 AND currency = ?2",
            params![
                updated.user_id.to_string(),
                updated.currency.to_string(),
                updated.balance.to_string(),
                updated.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Self::insert_entry(conn, &entry)?;
        Ok(Posting {
            wallet: updated,
            entry,
        })
    }

    /// Advance the pending escrow entry that references a withdrawal.
    fn settle_escrow(
        conn: &Connection,
        withdrawal_id: Uuid,
        status: EntryStatus,
    ) -> Result<(), StorageError> {
        conn.execute(
            r#"
            UPDATE ledger_entries SET status = ?1
            WHERE reference_id = ?2 AND kind = 'withdrawal' AND status = 'pending'
            "#,
            params![status.to_string(), withdrawal_id.to_string()],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    fn fetch_claim(conn: &Connection, id: Uuid) -> Result<Option<FiatDepositClaim>, StorageError> {
        conn.query_row(
            "SELECT * FROM fiat_claims WHERE id = ?1",
            params![id.to_string()],
            |row| Self::row_to_claim(row),
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn update_claim(conn: &Connection, claim: &FiatDepositClaim) -> Result<(), StorageError> {
        let rows = conn
            .execute(
                r#"
                UPDATE fiat_claims SET
                    status = ?2, processed_by = ?3, processed_at = ?4, admin_notes = ?5
                WHERE id = ?1
                "#,
                params![
                    claim.id.to_string(),
                    claim.status.to_string(),
                    claim.processed_by.map(|u| u.to_string()),
                    claim.processed_at.map(|t| t.to_rfc3339()),
                    claim.admin_notes,
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        if rows == 0 {
            return Err(StorageError::NotFound(format!("claim {}", claim.id)));
        }
        Ok(())
    }

    fn fetch_deposit(conn: &Connection, id: Uuid) -> Result<Option<ChainDeposit>, StorageError> {
        conn.query_row(
            "SELECT * FROM chain_deposits WHERE id = ?1",
            params![id.to_string()],
            |row| Self::row_to_deposit(row),
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn update_deposit(conn: &Connection, deposit: &ChainDeposit) -> Result<(), StorageError> {
        let rows = conn
            .execute(
                r#"
                UPDATE chain_deposits SET
                    status = ?2, confirmations = ?3, block_number = ?4,
                    sweep_tx_hash = ?5, gas_fee = ?6, processed_by = ?7,
                    processed_at = ?8, updated_at = ?9
                WHERE id = ?1
                "#,
                params![
                    deposit.id.to_string(),
                    deposit.status.to_string(),
                    deposit.confirmations as i64,
                    deposit.block_number.map(|v| v as i64),
                    deposit.sweep_tx_hash,
                    deposit.gas_fee.map(|g| g.to_string()),
                    deposit.processed_by.map(|u| u.to_string()),
                    deposit.processed_at.map(|t| t.to_rfc3339()),
                    deposit.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        if rows == 0 {
            return Err(StorageError::NotFound(format!("deposit {}", deposit.id)));
        }
        Ok(())
    }

    fn fetch_sweep(conn: &Connection, id: Uuid) -> Result<Option<SweepRecord>, StorageError> {
        conn.query_row(
            "SELECT * FROM sweep_records WHERE id = ?1",
            params![id.to_string()],
            |row| Self::row_to_sweep(row),
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn update_sweep(conn: &Connection, sweep: &SweepRecord) -> Result<(), StorageError> {
        let rows = conn
            .execute(
                r#"
                UPDATE sweep_records SET
                    status = ?2, gas_fee = ?3, tx_hash = ?4,
                    error_message = ?5, updated_at = ?6
                WHERE id = ?1
                "#,
                params![
                    sweep.id.to_string(),
                    sweep.status.to_string(),
                    sweep.gas_fee.map(|g| g.to_string()),
                    sweep.tx_hash,
                    sweep.error_message,
                    sweep.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        if rows == 0 {
            return Err(StorageError::NotFound(format!("sweep {}", sweep.id)));
        }
        Ok(())
    }

    fn fetch_withdrawal(
        conn: &Connection,
        id: Uuid,
    ) -> Result<Option<WithdrawalRequest>, StorageError> {
        conn.query_row(
            "SELECT * FROM withdrawals WHERE id = ?1",
            params![id.to_string()],
            |row| Self::row_to_withdrawal(row),
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn update_withdrawal(
        conn: &Connection,
        request: &WithdrawalRequest,
    ) -> Result<(), StorageError> {
        let rows = conn
            .execute(
                r#"
                UPDATE withdrawals SET
                    status = ?2, settlement_tx_hash = ?3, processed_by = ?4,
                    processed_at = ?5, admin_notes = ?6, rejection_reason = ?7,
                    updated_at = ?8
                WHERE id = ?1
                "#,
                params![
                    request.id.to_string(),
                    request.status.to_string(),
                    request.settlement_tx_hash,
                    request.processed_by.map(|u| u.to_string()),
                    request.processed_at.map(|t| t.to_rfc3339()),
                    request.admin_notes,
                    request.rejection_reason,
                    request.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        if rows == 0 {
            return Err(StorageError::NotFound(format!("withdrawal {}", request.id)));
        }
        Ok(())
    }

    // Synchronous bodies for the trait implementations

    fn get_or_create_wallet_sync(
        &self,
        user: UserId,
        currency: Currency,
    ) -> Result<Wallet, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let wallet = match Self::fetch_wallet(&tx, user, currency)? {
            Some(wallet) => wallet,
            None => {
                let wallet = Wallet::new(user, currency);
                Self::insert_wallet(&tx, &wallet)?;
                wallet
            }
        };

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(wallet)
    }

    fn wallet_sync(&self, user: UserId, currency: Currency) -> Result<Option<Wallet>, StorageError> {
        let conn = self.conn()?;
        Self::fetch_wallet(&conn, user, currency)
    }

    fn wallets_for_user_sync(&self, user: UserId) -> Result<Vec<Wallet>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM wallets WHERE user_id = ?1 ORDER BY currency ASC")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let wallets = stmt
            .query_map(params![user.to_string()], |row| Self::row_to_wallet(row))
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(wallets)
    }

    fn set_wallet_status_sync(
        &self,
        user: UserId,
        currency: Currency,
        status: WalletStatus,
    ) -> Result<Wallet, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut wallet = Self::fetch_wallet(&tx, user, currency)?
            .ok_or_else(|| StorageError::NotFound(format!("wallet {}/{}", user, currency)))?;
        wallet.set_status(status);

        tx.execute(
            r#"
            UPDATE wallets SET status = ?3, is_active = ?4, updated_at = ?5
            WHERE user_id = ?1 AND currency = ?2
            "#,
            params![
                user.to_string(),
                currency.to_string(),
                wallet.status.to_string(),
                wallet.is_active,
                wallet.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(wallet)
    }

    fn post_sync(&self, draft: &EntryDraft) -> Result<Posting, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let posting = Self::post_in(&tx, draft)?;

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(posting)
    }

    fn entries_for_user_sync(
        &self,
        user: UserId,
        currency: Option<Currency>,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, StorageError> {
        let conn = self.conn()?;

        // rowid order is insertion order; the ledger is append-only.
        let entries = match currency {
            Some(currency) => {
                let mut stmt = conn
                    .prepare(
                        r#"
                        SELECT * FROM ledger_entries
                        WHERE user_id = ?1 AND currency = ?2
                        ORDER BY rowid DESC LIMIT ?3
                        "#,
                    )
                    .map_err(|e| StorageError::Database(e.to_string()))?;
                let rows = stmt
                    .query_map(
                        params![user.to_string(), currency.to_string(), limit as i64],
                        |row| Self::row_to_entry(row),
                    )
                    .map_err(|e| StorageError::Database(e.to_string()))?
                    .collect::<Result<Vec<_>, _>>();
                rows
            }
            None => {
                let mut stmt = conn
                    .prepare(
                        r#"
                        SELECT * FROM ledger_entries
                        WHERE user_id = ?1
                        ORDER BY rowid DESC LIMIT ?2
                        "#,
                    )
                    .map_err(|e| StorageError::Database(e.to_string()))?;
                let rows = stmt
                    .query_map(params![user.to_string(), limit as i64], |row| {
                        Self::row_to_entry(row)
                    })
                    .map_err(|e| StorageError::Database(e.to_string()))?
                    .collect::<Result<Vec<_>, _>>();
                rows
            }
        }
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(entries)
    }

    fn insert_address_sync(&self, address: &WalletAddress) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO wallet_addresses (
                user_id, chain, address, status, last_used_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                address.user_id.to_string(),
                address.chain.to_string(),
                address.address,
                address.status.to_string(),
                address.last_used_at.map(|t| t.to_rfc3339()),
                address.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            Self::map_insert_err(
                e,
                format!("address for {}/{}", address.user_id, address.chain),
            )
        })?;
        Ok(())
    }

    fn address_for_sync(
        &self,
        user: UserId,
        chain: ChainType,
    ) -> Result<Option<WalletAddress>, StorageError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM wallet_addresses WHERE user_id = ?1 AND chain = ?2",
            params![user.to_string(), chain.to_string()],
            |row| Self::row_to_address(row),
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn addresses_for_user_sync(&self, user: UserId) -> Result<Vec<WalletAddress>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM wallet_addresses WHERE user_id = ?1 ORDER BY chain ASC")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let addresses = stmt
            .query_map(params![user.to_string()], |row| Self::row_to_address(row))
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(addresses)
    }

    fn mark_address_used_sync(&self, user: UserId, chain: ChainType) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE wallet_addresses SET last_used_at = ?3 WHERE user_id = ?1 AND chain = ?2",
                params![
                    user.to_string(),
                    chain.to_string(),
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        if rows == 0 {
            return Err(StorageError::NotFound(format!(
                "address for {}/{}",
                user, chain
            )));
        }
        Ok(())
    }

    fn insert_claim_sync(&self, claim: &FiatDepositClaim) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO fiat_claims (
                id, user_id, amount, method, evidence, status,
                processed_by, processed_at, admin_notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                claim.id.to_string(),
                claim.user_id.to_string(),
                claim.amount.to_string(),
                claim.method.to_string(),
                claim.evidence,
                claim.status.to_string(),
                claim.processed_by.map(|u| u.to_string()),
                claim.processed_at.map(|t| t.to_rfc3339()),
                claim.admin_notes,
                claim.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Self::map_insert_err(e, format!("claim {}", claim.id)))?;
        Ok(())
    }

    fn claim_sync(&self, id: Uuid) -> Result<Option<FiatDepositClaim>, StorageError> {
        let conn = self.conn()?;
        Self::fetch_claim(&conn, id)
    }

    fn claims_for_user_sync(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<FiatDepositClaim>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT * FROM fiat_claims WHERE user_id = ?1
                ORDER BY created_at DESC LIMIT ?2
                "#,
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let claims = stmt
            .query_map(params![user.to_string(), limit as i64], |row| {
                Self::row_to_claim(row)
            })
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(claims)
    }

    fn claims_by_status_sync(
        &self,
        status: ClaimStatus,
    ) -> Result<Vec<FiatDepositClaim>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM fiat_claims WHERE status = ?1 ORDER BY created_at DESC")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let claims = stmt
            .query_map(params![status.to_string()], |row| Self::row_to_claim(row))
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(claims)
    }

    fn approve_claim_sync(
        &self,
        id: Uuid,
        admin: UserId,
    ) -> Result<(FiatDepositClaim, Posting), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let claim = Self::fetch_claim(&tx, id)?
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
        let posting = Self::post_in(&tx, &draft)?;

        let mut updated = claim;
        updated.mark_approved(admin);
        Self::update_claim(&tx, &updated)?;

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok((updated, posting))
    }

    fn reject_claim_sync(
        &self,
        id: Uuid,
        admin: UserId,
        reason: String,
    ) -> Result<FiatDepositClaim, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut claim = Self::fetch_claim(&tx, id)?
            .ok_or_else(|| StorageError::NotFound(format!("claim {}", id)))?;
        if claim.status != ClaimStatus::Pending {
            return Err(StorageError::Conflict(format!(
                "claim {} already {}",
                id, claim.status
            )));
        }
        claim.mark_rejected(admin, reason);
        Self::update_claim(&tx, &claim)?;

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(claim)
    }

    fn insert_chain_deposit_sync(&self, deposit: &ChainDeposit) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO chain_deposits (
                id, user_id, chain, amount, tx_hash, from_address, to_address,
                status, confirmations, required_confirmations, sweep_type,
                sweep_tx_hash, gas_fee, block_number, processed_by,
                processed_at, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15,
                ?16, ?17, ?18
            )
            "#,
            params![
                deposit.id.to_string(),
                deposit.user_id.to_string(),
                deposit.chain.to_string(),
                deposit.amount.to_string(),
                deposit.tx_hash,
                deposit.from_address,
                deposit.to_address,
                deposit.status.to_string(),
                deposit.confirmations as i64,
                deposit.required_confirmations as i64,
                deposit.sweep_type.to_string(),
                deposit.sweep_tx_hash,
                deposit.gas_fee.map(|g| g.to_string()),
                deposit.block_number.map(|v| v as i64),
                deposit.processed_by.map(|u| u.to_string()),
                deposit.processed_at.map(|t| t.to_rfc3339()),
                deposit.created_at.to_rfc3339(),
                deposit.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Self::map_insert_err(e, format!("deposit with tx hash {}", deposit.tx_hash)))?;
        Ok(())
    }

    fn chain_deposit_sync(&self, id: Uuid) -> Result<Option<ChainDeposit>, StorageError> {
        let conn = self.conn()?;
        Self::fetch_deposit(&conn, id)
    }

    fn chain_deposit_by_tx_hash_sync(
        &self,
        tx_hash: &str,
    ) -> Result<Option<ChainDeposit>, StorageError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM chain_deposits WHERE tx_hash = ?1",
            params![tx_hash],
            |row| Self::row_to_deposit(row),
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn chain_deposits_for_user_sync(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<ChainDeposit>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT * FROM chain_deposits WHERE user_id = ?1
                ORDER BY created_at DESC LIMIT ?2
                "#,
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let deposits = stmt
            .query_map(params![user.to_string(), limit as i64], |row| {
                Self::row_to_deposit(row)
            })
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(deposits)
    }

    fn chain_deposits_by_status_sync(
        &self,
        status: ChainDepositStatus,
    ) -> Result<Vec<ChainDeposit>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM chain_deposits WHERE status = ?1 ORDER BY created_at DESC")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let deposits = stmt
            .query_map(params![status.to_string()], |row| Self::row_to_deposit(row))
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(deposits)
    }

    fn record_confirmations_sync(
        &self,
        id: Uuid,
        confirmations: u32,
        block_number: Option<u64>,
    ) -> Result<ChainDeposit, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut deposit = Self::fetch_deposit(&tx, id)?
            .ok_or_else(|| StorageError::NotFound(format!("deposit {}", id)))?;
        deposit.update_confirmations(confirmations, block_number);
        Self::update_deposit(&tx, &deposit)?;

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(deposit)
    }

    fn confirm_deposit_sync(&self, id: Uuid) -> Result<(ChainDeposit, Posting), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let deposit = Self::fetch_deposit(&tx, id)?
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

        let posting = Self::post_in(&tx, &credit)?;
        Self::post_in(&tx, &float)?;

        let mut updated = deposit;
        updated.mark_confirmed();
        Self::update_deposit(&tx, &updated)?;

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok((updated, posting))
    }

    fn intake_stats_sync(&self) -> Result<IntakeStats, StorageError> {
        let conn = self.conn()?;
        let mut stats = IntakeStats::default();

        let mut stmt = conn
            .prepare("SELECT status, amount FROM fiat_claims")
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| StorageError::Database(e.to_string()))?;
        for row in rows {
            let (status, amount) = row.map_err(|e| StorageError::Database(e.to_string()))?;
            let status: ClaimStatus = status.parse().map_err(StorageError::InvalidData)?;
            match status {
                ClaimStatus::Pending => stats.claims_pending += 1,
                ClaimStatus::Approved => {
                    stats.claims_approved += 1;
                    stats.total_fiat_approved += amount
                        .parse::<Decimal>()
                        .map_err(|e| StorageError::InvalidData(e.to_string()))?;
                }
                ClaimStatus::Rejected | ClaimStatus::Cancelled => stats.claims_rejected += 1,
            }
        }

        let mut stmt = conn
            .prepare("SELECT status, amount FROM chain_deposits")
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| StorageError::Database(e.to_string()))?;
        for row in rows {
            let (status, amount) = row.map_err(|e| StorageError::Database(e.to_string()))?;
            let status: ChainDepositStatus = status.parse().map_err(StorageError::InvalidData)?;
            match status {
                ChainDepositStatus::Pending => stats.deposits_pending += 1,
                ChainDepositStatus::Confirmed => {
                    stats.deposits_confirmed += 1;
                    stats.total_chain_confirmed += amount
                        .parse::<Decimal>()
                        .map_err(|e| StorageError::InvalidData(e.to_string()))?;
                }
                ChainDepositStatus::Swept => {
                    stats.deposits_swept += 1;
                    stats.total_chain_confirmed += amount
                        .parse::<Decimal>()
                        .map_err(|e| StorageError::InvalidData(e.to_string()))?;
                }
                ChainDepositStatus::Failed | ChainDepositStatus::Cancelled => {}
            }
        }

        Ok(stats)
    }

    fn begin_sweep_sync(&self, record: &SweepRecord) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let deposit = Self::fetch_deposit(&tx, record.deposit_id)?
            .ok_or_else(|| StorageError::NotFound(format!("deposit {}", record.deposit_id)))?;
        if deposit.status != ChainDepositStatus::Confirmed {
            return Err(StorageError::Conflict(format!(
                "deposit {} is {}, not confirmed",
                record.deposit_id, deposit.status
            )));
        }

        let active: i64 = tx
            .query_row(
                r#"
                SELECT COUNT(*) FROM sweep_records
                WHERE deposit_id = ?1 AND status IN ('pending', 'completed')
                "#,
                params![record.deposit_id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        if active > 0 {
            return Err(StorageError::Conflict(format!(
                "deposit {} already has an active sweep",
                record.deposit_id
            )));
        }

        tx.execute(
            r#"
            INSERT INTO sweep_records (
                id, deposit_id, user_id, chain, from_address, to_address,
                amount, gas_fee, tx_hash, sweep_type, status, initiated_by,
                error_message, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15
            )
            "#,
            params![
                record.id.to_string(),
                record.deposit_id.to_string(),
                record.user_id.to_string(),
                record.chain.to_string(),
                record.from_address,
                record.to_address,
                record.amount.to_string(),
                record.gas_fee.map(|g| g.to_string()),
                record.tx_hash,
                record.sweep_type.to_string(),
                record.status.to_string(),
                record.initiated_by.map(|u| u.to_string()),
                record.error_message,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Self::map_insert_err(e, format!("sweep {}", record.id)))?;

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    fn complete_sweep_sync(
        &self,
        sweep_id: Uuid,
        tx_hash: String,
        gas_fee: Decimal,
    ) -> Result<(SweepRecord, ChainDeposit, Posting), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let sweep = Self::fetch_sweep(&tx, sweep_id)?
            .ok_or_else(|| StorageError::NotFound(format!("sweep {}", sweep_id)))?;
        if sweep.status != SweepStatus::Pending {
            return Err(StorageError::Conflict(format!(
                "sweep {} already {}",
                sweep_id, sweep.status
            )));
        }
        let deposit = Self::fetch_deposit(&tx, sweep.deposit_id)?
            .ok_or_else(|| StorageError::NotFound(format!("deposit {}", sweep.deposit_id)))?;

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
        let posting = Self::post_in(&tx, &draft)?;

        let mut updated_sweep = sweep;
        updated_sweep.mark_completed(tx_hash.clone(), gas_fee);
        Self::update_sweep(&tx, &updated_sweep)?;

        let mut updated_deposit = deposit;
        updated_deposit.mark_swept(tx_hash, gas_fee, updated_sweep.initiated_by);
        Self::update_deposit(&tx, &updated_deposit)?;

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok((updated_sweep, updated_deposit, posting))
    }

    fn fail_sweep_sync(&self, sweep_id: Uuid, error: String) -> Result<SweepRecord, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut sweep = Self::fetch_sweep(&tx, sweep_id)?
            .ok_or_else(|| StorageError::NotFound(format!("sweep {}", sweep_id)))?;
        if sweep.status != SweepStatus::Pending {
            return Err(StorageError::Conflict(format!(
                "sweep {} already {}",
                sweep_id, sweep.status
            )));
        }
        sweep.mark_failed(error);
        Self::update_sweep(&tx, &sweep)?;

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(sweep)
    }

    fn sweep_record_sync(&self, id: Uuid) -> Result<Option<SweepRecord>, StorageError> {
        let conn = self.conn()?;
        Self::fetch_sweep(&conn, id)
    }

    fn sweeps_for_deposit_sync(&self, deposit_id: Uuid) -> Result<Vec<SweepRecord>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM sweep_records WHERE deposit_id = ?1 ORDER BY created_at DESC")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let sweeps = stmt
            .query_map(params![deposit_id.to_string()], |row| {
                Self::row_to_sweep(row)
            })
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(sweeps)
    }

    fn sweeps_by_status_sync(&self, status: SweepStatus) -> Result<Vec<SweepRecord>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM sweep_records WHERE status = ?1 ORDER BY created_at DESC")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let sweeps = stmt
            .query_map(params![status.to_string()], |row| Self::row_to_sweep(row))
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(sweeps)
    }

    fn create_withdrawal_sync(&self, request: &WithdrawalRequest) -> Result<Posting, StorageError> {
        let payout = serde_json::to_string(&request.payout)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;

        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(e.to_string()))?;

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
        let posting = Self::post_in(&tx, &draft)?;

        tx.execute(
            r#"
            INSERT INTO withdrawals (
                id, user_id, currency, amount, fee, payout, status,
                settlement_tx_hash, processed_by, processed_at, admin_notes,
                rejection_reason, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11,
                ?12, ?13, ?14
            )
            "#,
            params![
                request.id.to_string(),
                request.user_id.to_string(),
                request.currency.to_string(),
                request.amount.to_string(),
                request.fee.to_string(),
                payout,
                request.status.to_string(),
                request.settlement_tx_hash,
                request.processed_by.map(|u| u.to_string()),
                request.processed_at.map(|t| t.to_rfc3339()),
                request.admin_notes,
                request.rejection_reason,
                request.created_at.to_rfc3339(),
                request.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Self::map_insert_err(e, format!("withdrawal {}", request.id)))?;

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(posting)
    }

    fn withdrawal_sync(&self, id: Uuid) -> Result<Option<WithdrawalRequest>, StorageError> {
        let conn = self.conn()?;
        Self::fetch_withdrawal(&conn, id)
    }

    fn withdrawals_for_user_sync(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<WithdrawalRequest>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT * FROM withdrawals WHERE user_id = ?1
                ORDER BY created_at DESC LIMIT ?2
                "#,
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let requests = stmt
            .query_map(params![user.to_string(), limit as i64], |row| {
                Self::row_to_withdrawal(row)
            })
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(requests)
    }

    fn withdrawals_by_status_sync(
        &self,
        status: WithdrawalStatus,
    ) -> Result<Vec<WithdrawalRequest>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM withdrawals WHERE status = ?1 ORDER BY created_at DESC")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let requests = stmt
            .query_map(params![status.to_string()], |row| {
                Self::row_to_withdrawal(row)
            })
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(requests)
    }

    fn withdrawn_today_sync(
        &self,
        user: UserId,
        currency: Currency,
    ) -> Result<Decimal, StorageError> {
        let conn = self.conn()?;
        let today = Utc::now().format("%Y-%m-%d").to_string();

        // Sum in Decimal; SQL SUM over TEXT amounts would go through floats.
        let mut stmt = conn
            .prepare(
                r#"
                SELECT amount, status FROM withdrawals
                WHERE user_id = ?1 AND currency = ?2 AND substr(created_at, 1, 10) = ?3
                "#,
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(
                params![user.to_string(), currency.to_string(), today],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut total = Decimal::ZERO;
        for row in rows {
            let (amount, status) = row.map_err(|e| StorageError::Database(e.to_string()))?;
            let status: WithdrawalStatus = status.parse().map_err(StorageError::InvalidData)?;
            if status.counts_toward_daily_cap() {
                total += amount
                    .parse::<Decimal>()
                    .map_err(|e| StorageError::InvalidData(e.to_string()))?;
            }
        }
        Ok(total)
    }

    fn approve_withdrawal_sync(
        &self,
        id: Uuid,
        admin: UserId,
        notes: Option<String>,
    ) -> Result<WithdrawalRequest, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut request = Self::fetch_withdrawal(&tx, id)?
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
        Self::update_withdrawal(&tx, &request)?;

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(request)
    }

    fn start_processing_sync(
        &self,
        id: Uuid,
        admin: UserId,
    ) -> Result<WithdrawalRequest, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut request = Self::fetch_withdrawal(&tx, id)?
            .ok_or_else(|| StorageError::NotFound(format!("withdrawal {}", id)))?;
        if request.status != WithdrawalStatus::Approved {
            return Err(StorageError::Conflict(format!(
                "withdrawal {} is {}",
                id, request.status
            )));
        }
        request.mark_processing();
        request.processed_by = Some(admin);
        Self::update_withdrawal(&tx, &request)?;

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(request)
    }

    fn complete_withdrawal_sync(
        &self,
        id: Uuid,
        admin: UserId,
        tx_hash: Option<String>,
        notes: Option<String>,
    ) -> Result<WithdrawalRequest, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut request = Self::fetch_withdrawal(&tx, id)?
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

        Self::settle_escrow(&tx, id, EntryStatus::Completed)?;
        request.mark_completed(admin, tx_hash);
        if notes.is_some() {
            request.admin_notes = notes;
        }
        Self::update_withdrawal(&tx, &request)?;

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(request)
    }

    fn reject_withdrawal_sync(
        &self,
        id: Uuid,
        admin: UserId,
        reason: String,
    ) -> Result<(WithdrawalRequest, Posting), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let request = Self::fetch_withdrawal(&tx, id)?
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
        let posting = Self::post_in(&tx, &refund)?;

        Self::settle_escrow(&tx, id, EntryStatus::Failed)?;
        let mut updated = request;
        updated.mark_rejected(admin, reason);
        Self::update_withdrawal(&tx, &updated)?;

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok((updated, posting))
    }

    fn cancel_withdrawal_sync(
        &self,
        id: Uuid,
        actor: Option<UserId>,
    ) -> Result<(WithdrawalRequest, Posting), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let request = Self::fetch_withdrawal(&tx, id)?
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
        let posting = Self::post_in(&tx, &refund)?;

        Self::settle_escrow(&tx, id, EntryStatus::Cancelled)?;
        let mut updated = request;
        updated.mark_cancelled(actor);
        Self::update_withdrawal(&tx, &updated)?;

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok((updated, posting))
    }

    fn withdrawal_stats_sync(&self) -> Result<WithdrawalStats, StorageError> {
        let conn = self.conn()?;
        let mut stats = WithdrawalStats::default();

        let mut stmt = conn
            .prepare("SELECT status, amount, fee FROM withdrawals")
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| StorageError::Database(e.to_string()))?;

        for row in rows {
            let (status, amount, fee) = row.map_err(|e| StorageError::Database(e.to_string()))?;
            let status: WithdrawalStatus = status.parse().map_err(StorageError::InvalidData)?;
            match status {
                WithdrawalStatus::Pending => stats.pending += 1,
                WithdrawalStatus::Approved => stats.approved += 1,
                WithdrawalStatus::Processing => stats.processing += 1,
                WithdrawalStatus::Completed => {
                    stats.completed += 1;
                    stats.total_paid_out += amount
                        .parse::<Decimal>()
                        .map_err(|e| StorageError::InvalidData(e.to_string()))?;
                    stats.total_fees += fee
                        .parse::<Decimal>()
                        .map_err(|e| StorageError::InvalidData(e.to_string()))?;
                }
                WithdrawalStatus::Rejected => stats.rejected += 1,
                WithdrawalStatus::Cancelled => stats.cancelled += 1,
            }
        }

        Ok(stats)
    }
}

#[async_trait]
impl WalletStore for SqliteStore {
    async fn get_or_create_wallet(
        &self,
        user: UserId,
        currency: Currency,
    ) -> StorageResult<Wallet> {
        self.get_or_create_wallet_sync(user, currency)
    }

    async fn wallet(&self, user: UserId, currency: Currency) -> StorageResult<Option<Wallet>> {
        self.wallet_sync(user, currency)
    }

    async fn wallets_for_user(&self, user: UserId) -> StorageResult<Vec<Wallet>> {
        self.wallets_for_user_sync(user)
    }

    async fn set_wallet_status(
        &self,
        user: UserId,
        currency: Currency,
        status: WalletStatus,
    ) -> StorageResult<Wallet> {
        self.set_wallet_status_sync(user, currency, status)
    }

    async fn post(&self, draft: EntryDraft) -> StorageResult<Posting> {
        self.post_sync(&draft)
    }

    async fn entries_for_user(
        &self,
        user: UserId,
        currency: Option<Currency>,
        limit: usize,
    ) -> StorageResult<Vec<LedgerEntry>> {
        self.entries_for_user_sync(user, currency, limit)
    }
}

#[async_trait]
impl AddressStore for SqliteStore {
    async fn insert_address(&self, address: &WalletAddress) -> StorageResult<()> {
        self.insert_address_sync(address)
    }

    async fn address_for(
        &self,
        user: UserId,
        chain: ChainType,
    ) -> StorageResult<Option<WalletAddress>> {
        self.address_for_sync(user, chain)
    }

    async fn addresses_for_user(&self, user: UserId) -> StorageResult<Vec<WalletAddress>> {
        self.addresses_for_user_sync(user)
    }

    async fn mark_address_used(&self, user: UserId, chain: ChainType) -> StorageResult<()> {
        self.mark_address_used_sync(user, chain)
    }
}

#[async_trait]
impl DepositStore for SqliteStore {
    async fn insert_claim(&self, claim: &FiatDepositClaim) -> StorageResult<()> {
        self.insert_claim_sync(claim)
    }

    async fn claim(&self, id: Uuid) -> StorageResult<Option<FiatDepositClaim>> {
        self.claim_sync(id)
    }

    async fn claims_for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> StorageResult<Vec<FiatDepositClaim>> {
        self.claims_for_user_sync(user, limit)
    }

    async fn claims_by_status(&self, status: ClaimStatus) -> StorageResult<Vec<FiatDepositClaim>> {
        self.claims_by_status_sync(status)
    }

    async fn approve_claim(
        &self,
        id: Uuid,
        admin: UserId,
    ) -> StorageResult<(FiatDepositClaim, Posting)> {
        self.approve_claim_sync(id, admin)
    }

    async fn reject_claim(
        &self,
        id: Uuid,
        admin: UserId,
        reason: String,
    ) -> StorageResult<FiatDepositClaim> {
        self.reject_claim_sync(id, admin, reason)
    }

    async fn insert_chain_deposit(&self, deposit: &ChainDeposit) -> StorageResult<()> {
        self.insert_chain_deposit_sync(deposit)
    }

    async fn chain_deposit(&self, id: Uuid) -> StorageResult<Option<ChainDeposit>> {
        self.chain_deposit_sync(id)
    }

    async fn chain_deposit_by_tx_hash(
        &self,
        tx_hash: &str,
    ) -> StorageResult<Option<ChainDeposit>> {
        self.chain_deposit_by_tx_hash_sync(tx_hash)
    }

    async fn chain_deposits_for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> StorageResult<Vec<ChainDeposit>> {
        self.chain_deposits_for_user_sync(user, limit)
    }

    async fn chain_deposits_by_status(
        &self,
        status: ChainDepositStatus,
    ) -> StorageResult<Vec<ChainDeposit>> {
        self.chain_deposits_by_status_sync(status)
    }

    async fn record_confirmations(
        &self,
        id: Uuid,
        confirmations: u32,
        block_number: Option<u64>,
    ) -> StorageResult<ChainDeposit> {
        self.record_confirmations_sync(id, confirmations, block_number)
    }

    async fn confirm_deposit(&self, id: Uuid) -> StorageResult<(ChainDeposit, Posting)> {
        self.confirm_deposit_sync(id)
    }

    async fn intake_stats(&self) -> StorageResult<IntakeStats> {
        self.intake_stats_sync()
    }
}

#[async_trait]
impl SweepStore for SqliteStore {
    async fn begin_sweep(&self, record: &SweepRecord) -> StorageResult<()> {
        self.begin_sweep_sync(record)
    }

    async fn complete_sweep(
        &self,
        sweep_id: Uuid,
        tx_hash: String,
        gas_fee: Decimal,
    ) -> StorageResult<(SweepRecord, ChainDeposit, Posting)> {
        self.complete_sweep_sync(sweep_id, tx_hash, gas_fee)
    }

    async fn fail_sweep(&self, sweep_id: Uuid, error: String) -> StorageResult<SweepRecord> {
        self.fail_sweep_sync(sweep_id, error)
    }

    async fn sweep(&self, id: Uuid) -> StorageResult<Option<SweepRecord>> {
        self.sweep_record_sync(id)
    }

    async fn sweeps_for_deposit(&self, deposit_id: Uuid) -> StorageResult<Vec<SweepRecord>> {
        self.sweeps_for_deposit_sync(deposit_id)
    }

    async fn sweeps_by_status(&self, status: SweepStatus) -> StorageResult<Vec<SweepRecord>> {
        self.sweeps_by_status_sync(status)
    }
}

#[async_trait]
impl WithdrawalStore for SqliteStore {
    async fn create_withdrawal(&self, request: &WithdrawalRequest) -> StorageResult<Posting> {
        self.create_withdrawal_sync(request)
    }

    async fn withdrawal(&self, id: Uuid) -> StorageResult<Option<WithdrawalRequest>> {
        self.withdrawal_sync(id)
    }

    async fn withdrawals_for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> StorageResult<Vec<WithdrawalRequest>> {
        self.withdrawals_for_user_sync(user, limit)
    }

    async fn withdrawals_by_status(
        &self,
        status: WithdrawalStatus,
    ) -> StorageResult<Vec<WithdrawalRequest>> {
        self.withdrawals_by_status_sync(status)
    }

    async fn withdrawn_today(&self, user: UserId, currency: Currency) -> StorageResult<Decimal> {
        self.withdrawn_today_sync(user, currency)
    }

    async fn approve_withdrawal(
        &self,
        id: Uuid,
        admin: UserId,
        notes: Option<String>,
    ) -> StorageResult<WithdrawalRequest> {
        self.approve_withdrawal_sync(id, admin, notes)
    }

    async fn start_processing(&self, id: Uuid, admin: UserId) -> StorageResult<WithdrawalRequest> {
        self.start_processing_sync(id, admin)
    }

    async fn complete_withdrawal(
        &self,
        id: Uuid,
        admin: UserId,
        tx_hash: Option<String>,
        notes: Option<String>,
    ) -> StorageResult<WithdrawalRequest> {
        self.complete_withdrawal_sync(id, admin, tx_hash, notes)
    }

    async fn reject_withdrawal(
        &self,
        id: Uuid,
        admin: UserId,
        reason: String,
    ) -> StorageResult<(WithdrawalRequest, Posting)> {
        self.reject_withdrawal_sync(id, admin, reason)
    }

    async fn cancel_withdrawal(
        &self,
        id: Uuid,
        actor: Option<UserId>,
    ) -> StorageResult<(WithdrawalRequest, Posting)> {
        self.cancel_withdrawal_sync(id, actor)
    }

    async fn withdrawal_stats(&self) -> StorageResult<WithdrawalStats> {
        self.withdrawal_stats_sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::deposit::SweepType;

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

    #[tokio::test]
    async fn test_post_persists_wallet_and_entry() {
        let store = SqliteStore::in_memory().unwrap();
        let user = UserId::new();

        let draft = EntryDraft::new(
            user,
            EntryKind::Deposit,
            Currency::Inr,
            Decimal::new(50050, 2),
        )
        .with_reference("claim-1")
        .with_metadata(json!({"source": "fiat_claim"}));
        store.post(draft).await.unwrap();

        let wallet = store.wallet(user, Currency::Inr).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Decimal::new(50050, 2));

        let entries = store.entries_for_user(user, None, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reference_id.as_deref(), Some("claim-1"));
        assert_eq!(entries[0].metadata["source"], "fiat_claim");
        assert_eq!(entries[0].balance_after, Decimal::new(50050, 2));
    }

    #[tokio::test]
    async fn test_duplicate_tx_hash() {
        let store = SqliteStore::in_memory().unwrap();
        let user = UserId::new();
        let hash = tx_hash("ab");

        store
            .insert_chain_deposit(&chain_deposit(user, Decimal::from(30), hash.clone()))
            .await
            .unwrap();
        let result = store
            .insert_chain_deposit(&chain_deposit(user, Decimal::from(30), hash))
            .await;

        assert!(matches!(result, Err(StorageError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_confirm_deposit_once() {
        let store = SqliteStore::in_memory().unwrap();
        let user = UserId::new();
        let deposit = chain_deposit(user, Decimal::from(30), tx_hash("cd"));
        store.insert_chain_deposit(&deposit).await.unwrap();
        store
            .record_confirmations(deposit.id, 12, Some(100))
            .await
            .unwrap();

        let (confirmed, posting) = store.confirm_deposit(deposit.id).await.unwrap();
        assert_eq!(confirmed.status, ChainDepositStatus::Confirmed);
        assert_eq!(posting.wallet.balance, Decimal::from(30));

        let float = store
            .wallet(UserId::custody(), Currency::Usdt)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(float.balance, Decimal::from(30));

        let replay = store.confirm_deposit(deposit.id).await;
        assert!(matches!(replay, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_sweep_lifecycle_persists() {
        let store = SqliteStore::in_memory().unwrap();
        let user = UserId::new();
        let deposit = chain_deposit(user, Decimal::from(30), tx_hash("ef"));
        store.insert_chain_deposit(&deposit).await.unwrap();
        store
            .record_confirmations(deposit.id, 12, None)
            .await
            .unwrap();
        let (confirmed, _) = store.confirm_deposit(deposit.id).await.unwrap();

        let record = SweepRecord::new(&confirmed, evm_address("c"), SweepType::Auto, None);
        store.begin_sweep(&record).await.unwrap();

        let blocked = SweepRecord::new(&confirmed, evm_address("c"), SweepType::Manual, None);
        assert!(matches!(
            store.begin_sweep(&blocked).await,
            Err(StorageError::Conflict(_))
        ));

        let (sweep, swept, _) = store
            .complete_sweep(record.id, tx_hash("aa"), Decimal::new(5, 3))
            .await
            .unwrap();
        assert_eq!(sweep.status, SweepStatus::Completed);
        assert_eq!(swept.status, ChainDepositStatus::Swept);

        let float = store
            .wallet(UserId::custody(), Currency::Usdt)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(float.balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_withdrawal_reject_refunds() {
        let store = SqliteStore::in_memory().unwrap();
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

        let payout = PayoutSpec::Chain {
            chain: ChainType::Erc20,
            address: evm_address("b"),
        };
        let request = WithdrawalRequest::new(
            user,
            Currency::Usdt,
            Decimal::from(100),
            Decimal::from(3),
            payout.clone(),
        );
        let posting = store.create_withdrawal(&request).await.unwrap();
        assert_eq!(posting.wallet.balance, Decimal::from(897));

        // Payout details survive the round trip.
        let stored = store.withdrawal(request.id).await.unwrap().unwrap();
        assert_eq!(stored.payout, payout);

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
    }

    #[tokio::test]
    async fn test_locked_wallet_rejects_posting() {
        let store = SqliteStore::in_memory().unwrap();
        let user = UserId::new();

        store.get_or_create_wallet(user, Currency::Inr).await.unwrap();
        store
            .set_wallet_status(user, Currency::Inr, WalletStatus::Locked)
            .await
            .unwrap();

        let result = store
            .post(EntryDraft::new(
                user,
                EntryKind::Deposit,
                Currency::Inr,
                Decimal::ONE,
            ))
            .await;
        assert!(matches!(result, Err(StorageError::Ledger(_))));

        let entries = store.entries_for_user(user, None, 10).await.unwrap();
        assert!(entries.is_empty());
    }
}
