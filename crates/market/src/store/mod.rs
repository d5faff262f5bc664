//! Store backends.
//!
//! Production deployments implement the [`crate::catalog::CatalogStore`],
//! [`crate::users::UserStore`], and [`crate::ledger::Ledger`] traits
//! against their persistence of choice. The [`memory`] backend keeps
//! everything in process and backs the test suites and local
//! development.

pub mod memory;
