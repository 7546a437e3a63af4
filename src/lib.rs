//! Subscription Reconciler - Subscription lifecycle engine
//!
//! Keeps local account subscription state consistent with a payment
//! provider. Plan changes create, update or cancel the remote subscription
//! under a per-account row lock, and provider webhooks are reconciled back
//! into the account store exactly once per event.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
