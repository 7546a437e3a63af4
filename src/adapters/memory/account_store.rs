//! In-memory account store implementation.
//!
//! This adapter provides an in-process implementation of the `AccountStore`
//! port with the same locking behavior as the PostgreSQL one. Useful for:
//! - Unit and integration tests
//! - Operator tooling that runs without a database
//!
//! Each account has its own async mutex standing in for a row lock. A unit
//! of work stages its writes and applies them all at once on commit.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{OwnedMutexGuard, RwLock};

use crate::domain::account::Account;
use crate::domain::foundation::{
    AccountId, CustomerRef, DomainError, ErrorCode, EventId, SubscriptionRef,
};
use crate::ports::{AccountStore, AccountUnitOfWork, ProcessedEventRecord, SaveResult};

/// In-memory implementation of the AccountStore port.
///
/// Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct InMemoryAccountStore {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    accounts: RwLock<HashMap<AccountId, Account>>,
    ledger: RwLock<HashMap<EventId, ProcessedEventRecord>>,
    row_locks: Mutex<HashMap<AccountId, Arc<tokio::sync::Mutex<()>>>>,
    fail_next_commit: AtomicBool,
}

impl Shared {
    fn row_lock(&self, id: &AccountId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(*id).or_default().clone()
    }

    async fn lock_row(&self, id: &AccountId) -> OwnedMutexGuard<()> {
        self.row_lock(id).lock_owned().await
    }
}

impl InMemoryAccountStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commit fail after all staged writes, as a lost
    /// connection would. The unit of work's changes are discarded.
    pub fn fail_next_commit(&self) {
        self.shared.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Committed state of an account.
    pub async fn get(&self, id: &AccountId) -> Option<Account> {
        self.shared.accounts.read().await.get(id).cloned()
    }

    /// Number of ledger entries.
    pub async fn processed_event_count(&self) -> usize {
        self.shared.ledger.read().await.len()
    }
}

fn customer_conflict(customer_ref: &CustomerRef) -> DomainError {
    DomainError::new(
        ErrorCode::CustomerRefConflict,
        "Customer is already linked to another account",
    )
    .with_detail("customer_ref", customer_ref.as_str())
}

fn not_found(id: &AccountId) -> DomainError {
    DomainError::new(ErrorCode::AccountNotFound, "Account not found")
        .with_detail("account_id", id.to_string())
}

/// Returns the account, other than `except`, that holds `customer_ref`.
fn holder_of<'a>(
    accounts: impl Iterator<Item = &'a Account>,
    customer_ref: &CustomerRef,
    except: &AccountId,
) -> Option<AccountId> {
    accounts
        .filter(|a| &a.id != except && a.customer_ref() == Some(customer_ref))
        .map(|a| a.id)
        .next()
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn insert(&self, account: &Account) -> Result<(), DomainError> {
        account.check_invariants()?;
        let mut accounts = self.shared.accounts.write().await;

        if accounts.contains_key(&account.id) {
            return Err(DomainError::new(
                ErrorCode::InvariantViolation,
                "Account already exists",
            ));
        }
        if let Some(customer_ref) = account.customer_ref() {
            if holder_of(accounts.values(), customer_ref, &account.id).is_some() {
                return Err(customer_conflict(customer_ref));
            }
        }

        accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, DomainError> {
        Ok(self.shared.accounts.read().await.get(id).cloned())
    }

    async fn find_by_customer_ref(
        &self,
        customer_ref: &CustomerRef,
    ) -> Result<Option<Account>, DomainError> {
        let accounts = self.shared.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.customer_ref() == Some(customer_ref))
            .cloned())
    }

    async fn clear_subscription_ref(
        &self,
        id: &AccountId,
        expected: &SubscriptionRef,
    ) -> Result<bool, DomainError> {
        let _row = self.shared.lock_row(id).await;
        let mut accounts = self.shared.accounts.write().await;

        match accounts.get_mut(id) {
            Some(account) if account.subscription_ref() == Some(expected) => {
                account.clear_subscription_ref();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn begin(&self) -> Result<Box<dyn AccountUnitOfWork>, DomainError> {
        Ok(Box::new(InMemoryUnitOfWork {
            shared: Arc::clone(&self.shared),
            guards: HashMap::new(),
            staged: HashMap::new(),
            staged_events: Vec::new(),
        }))
    }

    async fn find_processed_event(
        &self,
        event_id: &EventId,
    ) -> Result<Option<ProcessedEventRecord>, DomainError> {
        Ok(self.shared.ledger.read().await.get(event_id).cloned())
    }

    async fn purge_processed_events(&self, before: DateTime<Utc>) -> Result<u64, DomainError> {
        let mut ledger = self.shared.ledger.write().await;
        let count_before = ledger.len();
        ledger.retain(|_, record| record.processed_at >= before);
        Ok((count_before - ledger.len()) as u64)
    }
}

/// Staged writes plus the row locks they are made under.
struct InMemoryUnitOfWork {
    shared: Arc<Shared>,
    guards: HashMap<AccountId, OwnedMutexGuard<()>>,
    staged: HashMap<AccountId, Account>,
    staged_events: Vec<ProcessedEventRecord>,
}

impl InMemoryUnitOfWork {
    async fn acquire(&mut self, id: &AccountId) {
        if !self.guards.contains_key(id) {
            let guard = self.shared.lock_row(id).await;
            self.guards.insert(*id, guard);
        }
    }

    /// The account as this unit of work sees it.
    async fn current(&self, id: &AccountId) -> Option<Account> {
        match self.staged.get(id) {
            Some(account) => Some(account.clone()),
            None => self.shared.accounts.read().await.get(id).cloned(),
        }
    }

    fn ensure_locked(&self, id: &AccountId) -> Result<(), DomainError> {
        if self.guards.contains_key(id) {
            Ok(())
        } else {
            Err(DomainError::new(
                ErrorCode::InternalError,
                "Account must be locked before it is written",
            )
            .with_detail("account_id", id.to_string()))
        }
    }
}

#[async_trait]
impl AccountUnitOfWork for InMemoryUnitOfWork {
    async fn lock_by_id(&mut self, id: &AccountId) -> Result<Option<Account>, DomainError> {
        self.acquire(id).await;
        let account = self.current(id).await;
        if account.is_none() {
            self.guards.remove(id);
        }
        Ok(account)
    }

    async fn lock_by_customer_ref(
        &mut self,
        customer_ref: &CustomerRef,
    ) -> Result<Option<Account>, DomainError> {
        loop {
            let candidate = {
                let accounts = self.shared.accounts.read().await;
                let staged = self
                    .staged
                    .values()
                    .find(|a| a.customer_ref() == Some(customer_ref))
                    .map(|a| a.id);
                staged.or_else(|| {
                    accounts
                        .values()
                        .find(|a| a.customer_ref() == Some(customer_ref))
                        .map(|a| a.id)
                })
            };

            let Some(id) = candidate else {
                return Ok(None);
            };

            let newly_locked = !self.guards.contains_key(&id);
            self.acquire(&id).await;

            // The link may have moved while we waited for the lock.
            match self.current(&id).await {
                Some(account) if account.customer_ref() == Some(customer_ref) => {
                    return Ok(Some(account));
                }
                _ if newly_locked => {
                    self.guards.remove(&id);
                }
                _ => return Ok(None),
            }
        }
    }

    async fn save(&mut self, account: &Account) -> Result<(), DomainError> {
        self.ensure_locked(&account.id)?;
        account.check_invariants()?;

        let current = self
            .current(&account.id)
            .await
            .ok_or_else(|| not_found(&account.id))?;

        let mut staged = account.clone();
        staged.sync_amount_paid(current.total_amount_paid());
        self.staged.insert(account.id, staged);
        Ok(())
    }

    async fn increment_amount_paid(
        &mut self,
        id: &AccountId,
        amount_cents: u64,
    ) -> Result<u64, DomainError> {
        self.ensure_locked(id)?;

        let mut account = self.current(id).await.ok_or_else(|| not_found(id))?;
        let total = account.credit_payment(amount_cents)?;
        if i64::try_from(total).is_err() {
            return Err(DomainError::new(
                ErrorCode::InvariantViolation,
                "Lifetime value exceeds the storable range",
            )
            .with_detail("account_id", id.to_string()));
        }

        self.staged.insert(*id, account);
        Ok(total)
    }

    async fn record_processed_event(
        &mut self,
        record: ProcessedEventRecord,
    ) -> Result<SaveResult, DomainError> {
        let already_staged = self
            .staged_events
            .iter()
            .any(|r| r.event_id == record.event_id);
        if already_staged || self.shared.ledger.read().await.contains_key(&record.event_id) {
            return Ok(SaveResult::AlreadyExists);
        }

        self.staged_events.push(record);
        Ok(SaveResult::Inserted)
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        if self.shared.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(DomainError::database("Failed to commit transaction: connection lost"));
        }

        let InMemoryUnitOfWork {
            shared,
            guards,
            staged,
            staged_events,
        } = *self;

        {
            let mut accounts = shared.accounts.write().await;

            for account in staged.values() {
                if let Some(customer_ref) = account.customer_ref() {
                    let others = accounts.values().filter(|a| !staged.contains_key(&a.id));
                    let staged_others = staged.values();
                    if holder_of(others.chain(staged_others), customer_ref, &account.id).is_some()
                    {
                        return Err(customer_conflict(customer_ref));
                    }
                }
            }

            let mut ledger = shared.ledger.write().await;
            let mut seen = HashSet::new();
            for record in &staged_events {
                if ledger.contains_key(&record.event_id) || !seen.insert(record.event_id.clone()) {
                    return Err(DomainError::database(format!(
                        "duplicate key value violates unique constraint: {}",
                        record.event_id
                    )));
                }
            }

            for (id, account) in staged {
                accounts.insert(id, account);
            }
            for record in staged_events {
                ledger.insert(record.event_id.clone(), record);
            }
        }

        drop(guards);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}
