//! Core Kernel - Foundational types shared by every crate in the workspace
//!
//! This crate provides:
//! - Money types with precise decimal arithmetic
//! - Calendar helpers keyed to the organisation's timezone
//! - Strongly typed identifiers
//! - Port abstractions for the hexagonal architecture

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod error;
pub mod ports;

pub use money::{Money, Currency, MoneyError, Rate};
pub use temporal::{Timezone, TemporalError, ReportingPeriod, days_between};
pub use identifiers::{ClaimId, AuditEventId};
pub use error::CoreError;
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth,
};
