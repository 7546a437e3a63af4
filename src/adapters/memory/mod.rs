//! In-process adapters for tests and database-less tooling.

mod account_store;

pub use account_store::InMemoryAccountStore;
