//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for reimbursement claims using SQLx.
//!
//! # Tables
//!
//! - `reimbursements`: one row per claim, including the verification outcome,
//!   the fingerprint and operation number used for duplicate detection, and
//!   the week/month/year reporting buckets
//! - `audit_logs`: append-only trail of agent and auditor actions
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresClaimStore};
//!
//! let pool = create_pool(DatabaseConfig::new(url)).await?;
//! run_migrations(&pool).await?;
//! let store = Arc::new(PostgresClaimStore::new(pool));
//! ```

pub mod pool;
pub mod error;
pub mod rows;
pub mod store;

pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use error::DatabaseError;
pub use store::PostgresClaimStore;
