//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! reimbursement verification test suite.
//!
//! # Modules
//!
//! - `fixtures`: Receipt texts, images and amounts used across tests
//! - `builders`: Builders for claims and fully wired verification pipelines
//! - `database`: Database test helpers and container management
//! - `assertions`: Custom assertion helpers for verdicts and warnings
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
