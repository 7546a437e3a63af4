//! PostgreSQL implementation of AccountStore.
//!
//! Row locks are `SELECT ... FOR UPDATE` inside a transaction; the
//! processed-event ledger is written in that same transaction.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::account::{Account, AccountParts, Plan, SubscriptionStatus};
use crate::domain::foundation::{
    AccountId, CustomerRef, DomainError, ErrorCode, EventId, SubscriptionRef,
};
use crate::ports::{AccountStore, AccountUnitOfWork, ProcessedEventRecord, SaveResult};

const ACCOUNT_COLUMNS: &str = "id, email, subscription_status, current_plan, total_amount_paid, \
     stripe_customer_id, stripe_subscription_id, created_at, updated_at";

/// PostgreSQL implementation of the AccountStore port.
pub struct PostgresAccountStore {
    pool: PgPool,
    lock_timeout: Option<Duration>,
}

impl PostgresAccountStore {
    /// Creates a new PostgresAccountStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: None,
        }
    }

    /// Bounds how long each unit of work waits for a row lock held by
    /// another transaction. `None` waits indefinitely.
    pub fn with_lock_timeout(mut self, lock_timeout: Option<Duration>) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}

/// `SET LOCAL` takes no bind parameters; the value is always an integer.
fn lock_timeout_statement(timeout: Duration) -> String {
    format!("SET LOCAL lock_timeout = '{}ms'", timeout.as_millis())
}

/// Database row representation of an account.
#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    subscription_status: String,
    current_plan: String,
    total_amount_paid: i64,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = DomainError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let subscription_status: SubscriptionStatus =
            row.subscription_status.parse().map_err(corrupt_row)?;
        let current_plan: Plan = row.current_plan.parse().map_err(corrupt_row)?;
        let customer_ref = row
            .stripe_customer_id
            .map(CustomerRef::new)
            .transpose()
            .map_err(corrupt_row)?;
        let subscription_ref = row
            .stripe_subscription_id
            .map(SubscriptionRef::new)
            .transpose()
            .map_err(corrupt_row)?;

        Account::restore(AccountParts {
            id: AccountId::from_uuid(row.id),
            email: row.email,
            subscription_status,
            current_plan,
            total_amount_paid: row.total_amount_paid,
            customer_ref,
            subscription_ref,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row representation of a ledger entry.
#[derive(Debug, sqlx::FromRow)]
struct ProcessedEventRow {
    event_id: String,
    event_type: String,
    account_id: Uuid,
    result: String,
    processed_at: DateTime<Utc>,
}

impl TryFrom<ProcessedEventRow> for ProcessedEventRecord {
    type Error = DomainError;

    fn try_from(row: ProcessedEventRow) -> Result<Self, Self::Error> {
        Ok(ProcessedEventRecord {
            event_id: EventId::new(row.event_id).map_err(corrupt_row)?,
            event_type: row.event_type,
            account_id: AccountId::from_uuid(row.account_id),
            result: row.result,
            processed_at: row.processed_at,
        })
    }
}

fn corrupt_row(err: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid account row: {}", err),
    )
}

/// SQLSTATE for `numeric_value_out_of_range`, raised when the lifetime value
/// increment overflows BIGINT.
const NUMERIC_OUT_OF_RANGE: &str = "22003";

fn is_out_of_range(sqlstate: Option<&str>) -> bool {
    sqlstate == Some(NUMERIC_OUT_OF_RANGE)
}

/// Maps constraint violations and overflow to domain errors; everything else
/// is a database error.
fn map_write_error(context: &str, e: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db_err) = &e {
        if is_out_of_range(db_err.code().as_deref()) {
            return DomainError::new(
                ErrorCode::InvariantViolation,
                format!("{}: lifetime value exceeds the storable range", context),
            );
        }
        match db_err.constraint() {
            Some("accounts_stripe_customer_id_key") => {
                return DomainError::new(
                    ErrorCode::CustomerRefConflict,
                    "Customer is already linked to another account",
                );
            }
            Some("accounts_active_requires_plan")
            | Some("accounts_total_amount_paid_non_negative") => {
                return DomainError::new(
                    ErrorCode::InvariantViolation,
                    format!("{}: {}", context, db_err.message()),
                );
            }
            _ => {}
        }
    }
    DomainError::database(format!("{}: {}", context, e))
}

fn to_cents_column(amount: u64) -> Result<i64, DomainError> {
    i64::try_from(amount).map_err(|_| {
        DomainError::new(
            ErrorCode::InvariantViolation,
            format!("Amount {} exceeds the storable range", amount),
        )
    })
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    async fn insert(&self, account: &Account) -> Result<(), DomainError> {
        account.check_invariants()?;

        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, email, subscription_status, current_plan, total_amount_paid,
                stripe_customer_id, stripe_subscription_id, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.email)
        .bind(account.subscription_status().as_str())
        .bind(account.current_plan().as_str())
        .bind(to_cents_column(account.total_amount_paid())?)
        .bind(account.customer_ref().map(CustomerRef::as_str))
        .bind(account.subscription_ref().map(SubscriptionRef::as_str))
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error("Failed to insert account", e))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, DomainError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find account: {}", e)))?;

        row.map(Account::try_from).transpose()
    }

    async fn find_by_customer_ref(
        &self,
        customer_ref: &CustomerRef,
    ) -> Result<Option<Account>, DomainError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE stripe_customer_id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(customer_ref.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find account: {}", e)))?;

        row.map(Account::try_from).transpose()
    }

    async fn clear_subscription_ref(
        &self,
        id: &AccountId,
        expected: &SubscriptionRef,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET stripe_subscription_id = NULL, updated_at = NOW()
            WHERE id = $1 AND stripe_subscription_id = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::database(format!("Failed to clear subscription reference: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn begin(&self) -> Result<Box<dyn AccountUnitOfWork>, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database(format!("Failed to begin transaction: {}", e)))?;

        if let Some(timeout) = self.lock_timeout {
            sqlx::query(&lock_timeout_statement(timeout))
                .execute(&mut *tx)
                .await
                .map_err(|e| DomainError::database(format!("Failed to set lock timeout: {}", e)))?;
        }

        Ok(Box::new(PostgresUnitOfWork {
            tx,
            locked: HashSet::new(),
        }))
    }

    async fn find_processed_event(
        &self,
        event_id: &EventId,
    ) -> Result<Option<ProcessedEventRecord>, DomainError> {
        let row: Option<ProcessedEventRow> = sqlx::query_as(
            r#"
            SELECT event_id, event_type, account_id, result, processed_at
            FROM processed_webhook_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find processed event: {}", e)))?;

        row.map(ProcessedEventRecord::try_from).transpose()
    }

    async fn purge_processed_events(&self, before: DateTime<Utc>) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM processed_webhook_events WHERE processed_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::database(format!("Failed to purge processed events: {}", e))
            })?;

        Ok(result.rows_affected())
    }
}

/// A transaction plus the accounts it holds row locks on.
struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
    locked: HashSet<AccountId>,
}

impl PostgresUnitOfWork {
    fn ensure_locked(&self, id: &AccountId) -> Result<(), DomainError> {
        if self.locked.contains(id) {
            Ok(())
        } else {
            Err(DomainError::new(
                ErrorCode::InternalError,
                "Account must be locked before it is written",
            )
            .with_detail("account_id", id.to_string()))
        }
    }

    fn track(&mut self, account: Option<Account>) -> Option<Account> {
        if let Some(account) = &account {
            self.locked.insert(account.id);
        }
        account
    }
}

#[async_trait]
impl AccountUnitOfWork for PostgresUnitOfWork {
    async fn lock_by_id(&mut self, id: &AccountId) -> Result<Option<Account>, DomainError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE id = $1 FOR UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to lock account: {}", e)))?;

        let account = row.map(Account::try_from).transpose()?;
        Ok(self.track(account))
    }

    async fn lock_by_customer_ref(
        &mut self,
        customer_ref: &CustomerRef,
    ) -> Result<Option<Account>, DomainError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE stripe_customer_id = $1 FOR UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(customer_ref.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to lock account: {}", e)))?;

        let account = row.map(Account::try_from).transpose()?;
        Ok(self.track(account))
    }

    async fn save(&mut self, account: &Account) -> Result<(), DomainError> {
        self.ensure_locked(&account.id)?;
        account.check_invariants()?;

        let result = sqlx::query(
            r#"
            UPDATE accounts SET
                email = $2,
                subscription_status = $3,
                current_plan = $4,
                stripe_customer_id = $5,
                stripe_subscription_id = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.email)
        .bind(account.subscription_status().as_str())
        .bind(account.current_plan().as_str())
        .bind(account.customer_ref().map(CustomerRef::as_str))
        .bind(account.subscription_ref().map(SubscriptionRef::as_str))
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_write_error("Failed to update account", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::AccountNotFound,
                "Account not found",
            ));
        }

        Ok(())
    }

    async fn increment_amount_paid(
        &mut self,
        id: &AccountId,
        amount_cents: u64,
    ) -> Result<u64, DomainError> {
        self.ensure_locked(id)?;
        let amount = to_cents_column(amount_cents)?;

        let total: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET total_amount_paid = total_amount_paid + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING total_amount_paid
            "#,
        )
        .bind(id.as_uuid())
        .bind(amount)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_write_error("Failed to increment amount paid", e))?;

        let total = total
            .ok_or_else(|| DomainError::new(ErrorCode::AccountNotFound, "Account not found"))?;
        u64::try_from(total).map_err(corrupt_row)
    }

    async fn record_processed_event(
        &mut self,
        record: ProcessedEventRecord,
    ) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_webhook_events (event_id, event_type, account_id, result, processed_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(record.event_id.as_str())
        .bind(&record.event_type)
        .bind(record.account_id.as_uuid())
        .bind(&record.result)
        .bind(record.processed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to record processed event: {}", e)))?;

        if result.rows_affected() == 0 {
            Ok(SaveResult::AlreadyExists)
        } else {
            Ok(SaveResult::Inserted)
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .commit()
            .await
            .map_err(|e| DomainError::database(format!("Failed to commit transaction: {}", e)))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DomainError::database(format!("Failed to roll back transaction: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> AccountRow {
        let now = Utc::now();
        AccountRow {
            id: Uuid::new_v4(),
            email: "a@example.com".to_string(),
            subscription_status: "active".to_string(),
            current_plan: "pro".to_string(),
            total_amount_paid: 2005,
            stripe_customer_id: Some("cus_1".to_string()),
            stripe_subscription_id: Some("sub_1".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn bigint_overflow_sqlstate_is_recognized() {
        assert!(is_out_of_range(Some("22003")));
        assert!(!is_out_of_range(Some("23505")));
        assert!(!is_out_of_range(None));
    }

    #[test]
    fn lock_timeout_is_set_in_milliseconds() {
        assert_eq!(
            lock_timeout_statement(Duration::from_secs(60)),
            "SET LOCAL lock_timeout = '60000ms'"
        );
    }

    #[test]
    fn oversized_amount_is_an_invariant_violation() {
        let err = to_cents_column(u64::MAX).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvariantViolation);
        assert_eq!(to_cents_column(1000).unwrap(), 1000);
    }

    #[test]
    fn row_converts_to_account() {
        let account = Account::try_from(row()).unwrap();
        assert!(account.is_subscription_active());
        assert_eq!(account.current_plan(), Plan::Pro);
        assert_eq!(account.total_amount_paid(), 2005);
        assert_eq!(account.customer_ref().map(CustomerRef::as_str), Some("cus_1"));
    }

    #[test]
    fn row_with_unknown_plan_is_rejected() {
        let mut bad = row();
        bad.current_plan = "gold".to_string();
        let err = Account::try_from(bad).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn row_with_bad_customer_id_is_rejected() {
        let mut bad = row();
        bad.stripe_customer_id = Some("acct_1".to_string());
        assert!(Account::try_from(bad).is_err());
    }

    #[test]
    fn row_breaking_invariant_is_rejected() {
        let mut bad = row();
        bad.current_plan = "none".to_string();
        assert!(Account::try_from(bad).is_err());
    }

    #[test]
    fn ledger_row_converts_to_record() {
        let record = ProcessedEventRecord::try_from(ProcessedEventRow {
            event_id: "evt_1".to_string(),
            event_type: "invoice.paid".to_string(),
            account_id: Uuid::new_v4(),
            result: "applied".to_string(),
            processed_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(record.event_id.as_str(), "evt_1");
    }

    #[test]
    fn cents_beyond_i64_are_rejected() {
        assert!(to_cents_column(u64::MAX).is_err());
        assert_eq!(to_cents_column(1000).unwrap(), 1000);
    }
}
