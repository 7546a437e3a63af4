//! AccountStore port - Persistence for accounts and the processed-event ledger.
//!
//! Reads outside a unit of work see committed state and take no locks. Every
//! mutation of an account's subscription fields happens inside an
//! [`AccountUnitOfWork`], which holds an exclusive row lock on each account
//! it has locked until it commits or rolls back.
//!
//! ## Lock discipline
//!
//! - A unit of work must lock an account before saving it
//! - The processed-event ledger is written in the same unit of work as the
//!   account change it records, so a redelivered event is either fully
//!   applied once or not at all
//! - Dropping a unit of work without committing discards its writes

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::account::Account;
use crate::domain::foundation::{AccountId, CustomerRef, DomainError, EventId, SubscriptionRef};

/// Record of a processed webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEventRecord {
    /// Provider event ID (evt_xxx format).
    pub event_id: EventId,

    /// Type of provider event (e.g., "invoice.paid").
    pub event_type: String,

    /// Account the event was applied to.
    pub account_id: AccountId,

    /// Result of processing: "applied" or "logged".
    pub result: String,

    /// When the event was processed.
    pub processed_at: DateTime<Utc>,
}

impl ProcessedEventRecord {
    /// Creates a record for an event that changed the account.
    pub fn applied(event_id: EventId, event_type: impl Into<String>, account_id: AccountId) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            account_id,
            result: "applied".to_string(),
            processed_at: Utc::now(),
        }
    }

    /// Creates a record for an event that was only logged.
    pub fn logged(event_id: EventId, event_type: impl Into<String>, account_id: AccountId) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            account_id,
            result: "logged".to_string(),
            processed_at: Utc::now(),
        }
    }
}

/// Result of attempting to record a processed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// Record was inserted (first time seeing this event).
    Inserted,
    /// Record already exists (duplicate event).
    AlreadyExists,
}

/// Port for account persistence.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a newly registered account.
    ///
    /// # Errors
    ///
    /// Returns `CustomerRefConflict` if another account already holds the
    /// same customer reference.
    async fn insert(&self, account: &Account) -> Result<(), DomainError>;

    /// Find an account by ID, without locking.
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, DomainError>;

    /// Find an account by provider customer, without locking.
    async fn find_by_customer_ref(
        &self,
        customer_ref: &CustomerRef,
    ) -> Result<Option<Account>, DomainError>;

    /// Clear a stale subscription reference as its own atomic unit.
    ///
    /// Only clears if the stored reference still equals `expected`, so a
    /// reference written concurrently by someone else is never lost.
    /// Returns whether a row was changed.
    async fn clear_subscription_ref(
        &self,
        id: &AccountId,
        expected: &SubscriptionRef,
    ) -> Result<bool, DomainError>;

    /// Start a unit of work.
    async fn begin(&self) -> Result<Box<dyn AccountUnitOfWork>, DomainError>;

    /// Find a previously processed event.
    async fn find_processed_event(
        &self,
        event_id: &EventId,
    ) -> Result<Option<ProcessedEventRecord>, DomainError>;

    /// Delete ledger records processed before `before`.
    ///
    /// Returns the number of records deleted.
    async fn purge_processed_events(&self, before: DateTime<Utc>) -> Result<u64, DomainError>;
}

/// A single atomic unit of account changes.
#[async_trait]
pub trait AccountUnitOfWork: Send {
    /// Lock an account by ID, waiting for any other holder to finish.
    ///
    /// Returns the account as of lock acquisition, or `None` if it does not
    /// exist.
    async fn lock_by_id(&mut self, id: &AccountId) -> Result<Option<Account>, DomainError>;

    /// Lock the account linked to a provider customer.
    async fn lock_by_customer_ref(
        &mut self,
        customer_ref: &CustomerRef,
    ) -> Result<Option<Account>, DomainError>;

    /// Stage an update of a locked account.
    ///
    /// Never writes `total_amount_paid`; use `increment_amount_paid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the account is not locked by this unit of work or
    /// if the account breaks an invariant.
    async fn save(&mut self, account: &Account) -> Result<(), DomainError>;

    /// Atomically add `amount_cents` to a locked account's lifetime value.
    ///
    /// Returns the new total.
    async fn increment_amount_paid(
        &mut self,
        id: &AccountId,
        amount_cents: u64,
    ) -> Result<u64, DomainError>;

    /// Record an event in the processed-event ledger.
    async fn record_processed_event(
        &mut self,
        record: ProcessedEventRecord,
    ) -> Result<SaveResult, DomainError>;

    /// Make all staged changes visible and release the locks.
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    /// Discard all staged changes and release the locks.
    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn AccountStore) {}
    }

    #[test]
    fn unit_of_work_is_object_safe() {
        fn _accepts_box(_uow: Box<dyn AccountUnitOfWork>) {}
    }

    #[test]
    fn applied_record_has_applied_result() {
        let record = ProcessedEventRecord::applied(
            EventId::new("evt_1").unwrap(),
            "invoice.paid",
            AccountId::new(),
        );
        assert_eq!(record.result, "applied");
        assert_eq!(record.event_type, "invoice.paid");
    }

    #[test]
    fn logged_record_has_logged_result() {
        let record = ProcessedEventRecord::logged(
            EventId::new("evt_1").unwrap(),
            "invoice.payment_failed",
            AccountId::new(),
        );
        assert_eq!(record.result, "logged");
    }
}
