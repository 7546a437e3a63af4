//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `postgres` - Account store on PostgreSQL (sqlx)
//! - `stripe` - Payment gateway over the Stripe REST API, plus a mock
//! - `memory` - In-process account store with the same locking rules

pub mod memory;
pub mod postgres;
pub mod stripe;

pub use memory::InMemoryAccountStore;
pub use postgres::PostgresAccountStore;
pub use stripe::{MockPaymentGateway, StripeConfig, StripePaymentGateway};
