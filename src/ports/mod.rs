//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Provider Ports
//!
//! - `PaymentGateway` - Customer and subscription operations at the provider
//!
//! ## Persistence Ports
//!
//! - `AccountStore` - Account reads, stale-reference clearing, ledger retention
//! - `AccountUnitOfWork` - Locked, atomic account changes plus ledger writes

mod account_store;
mod payment_gateway;

pub use account_store::{AccountStore, AccountUnitOfWork, ProcessedEventRecord, SaveResult};
pub use payment_gateway::{
    CreateCustomerRequest, CreateSubscriptionRequest, DeleteOutcome, ModifySubscriptionRequest,
    PaymentBehavior, PaymentError, PaymentErrorCode, PaymentGateway, ProrationBehavior,
    RemoteLookup, RemoteSubscription, SavePaymentMethod,
};
