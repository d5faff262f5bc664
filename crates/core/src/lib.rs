//! Minishops Core - Shared types library.
//!
//! This crate provides common types used across all Minishops components:
//! - `market` - Marketplace backend (catalog, cart, checkout, ledger)
//! - `integration-tests` - End-to-end checkout scenarios
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money amounts,
//!   countries, and the platform fee rate

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
