//! GetAccountStatusHandler - Query handler for an account's subscription state.

use std::sync::Arc;

use crate::domain::account::{AccountSnapshot, SubscriptionError};
use crate::domain::foundation::AccountId;
use crate::ports::AccountStore;

/// Query for an account's current subscription state.
#[derive(Debug, Clone)]
pub struct GetAccountStatusQuery {
    pub account_id: AccountId,
}

/// Handler for account status queries. Reads committed state, takes no lock.
pub struct GetAccountStatusHandler {
    store: Arc<dyn AccountStore>,
}

impl GetAccountStatusHandler {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    pub async fn handle(
        &self,
        query: GetAccountStatusQuery,
    ) -> Result<AccountSnapshot, SubscriptionError> {
        let account = self
            .store
            .find_by_id(&query.account_id)
            .await?
            .ok_or(SubscriptionError::AccountNotFound(query.account_id))?;

        Ok(AccountSnapshot::from(&account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryAccountStore;
    use crate::domain::account::{Account, Plan, SubscriptionStatus};

    #[tokio::test]
    async fn returns_snapshot_of_committed_state() {
        let store = InMemoryAccountStore::new();
        let account = Account::register(AccountId::new(), "a@example.com").unwrap();
        store.insert(&account).await.unwrap();
        let handler = GetAccountStatusHandler::new(Arc::new(store));

        let snapshot = handler
            .handle(GetAccountStatusQuery { account_id: account.id })
            .await
            .unwrap();

        assert_eq!(snapshot.account_id, account.id);
        assert_eq!(snapshot.subscription_status, SubscriptionStatus::Inactive);
        assert_eq!(snapshot.current_plan, Plan::None);
        assert_eq!(snapshot.lifetime_value, "0.00");
    }

    #[tokio::test]
    async fn missing_account_is_not_found() {
        let handler = GetAccountStatusHandler::new(Arc::new(InMemoryAccountStore::new()));
        let id = AccountId::new();

        let err = handler
            .handle(GetAccountStatusQuery { account_id: id })
            .await
            .unwrap_err();

        assert_eq!(err, SubscriptionError::AccountNotFound(id));
    }
}
