//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, errors)
//! - `account` - Local subscription state and its transitions
//! - `webhook` - Provider events and webhook errors

pub mod account;
pub mod foundation;
pub mod webhook;
