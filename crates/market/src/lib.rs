//! Minishops marketplace backend library.
//!
//! This crate holds the money-bearing core of the marketplace: the
//! catalog read path, cart pricing, stock reconciliation, and the
//! checkout orchestrator that charges one aggregate payment and fans the
//! proceeds out to vendor accounts.
//!
//! # Architecture
//!
//! - Persistence is consumed through injected store traits
//!   ([`catalog::CatalogStore`], [`users::UserStore`], [`ledger::Ledger`])
//!   with in-memory backends under [`store::memory`] for tests and
//!   development.
//! - The payment processor sits behind [`payment::PaymentGateway`]; all
//!   amounts cross that boundary as integer minor units.
//! - [`checkout::CheckoutService`] ties the pieces together and is the
//!   only writer of orders, payment records, and shop order indices.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod ledger;
pub mod payment;
pub mod stock;
pub mod store;
pub mod telemetry;
pub mod users;
