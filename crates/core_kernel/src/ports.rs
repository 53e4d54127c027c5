//! Ports and Adapters Infrastructure
//!
//! The verification pipeline talks to every outside system (record store,
//! evidence storage, OCR engines) through port traits. This module holds the
//! pieces shared by all of them: the unified error type, the marker trait,
//! and health reporting.
//!
//! ```text
//!   ┌──────────────────────────────┐
//!   │     Verification pipeline    │
//!   └──────────────────────────────┘
//!        │          │          │
//!        ▼          ▼          ▼
//!   ClaimStore  HistoryPort  OcrProvider ...   (port traits, domain crate)
//!        ▲          ▲          ▲
//!   ┌────┴────┐ ┌───┴────┐ ┌───┴──────────┐
//!   │ Postgres│ │Postgres│ │ engine process│   (adapters, infra crates)
//!   └─────────┘ └────────┘ └──────────────┘
//! ```

use std::fmt;
use thiserror::Error;
use serde::{Deserialize, Serialize};

/// Failure reported by any port adapter
///
/// Adapters map their own errors into this type so the pipeline can decide
/// between retrying, escalating and parking a claim without knowing which
/// system failed.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("Not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: String,
        id: String,
    },

    /// Input the adapter refused to act on
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Conflict: {message}")]
    Conflict {
        message: String,
    },

    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
    },

    /// The backing process or service could not be reached at all
    #[error("Service unavailable: {service}")]
    ServiceUnavailable {
        service: String,
    },

    /// Bytes or rows that could not be turned into domain values
    #[error("Decoding error: {message}")]
    Decoding {
        message: String,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        PortError::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    pub fn decoding(message: impl Into<String>) -> Self {
        PortError::Decoding {
            message: message.into(),
        }
    }

    /// True for failures worth retrying later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::Connection { .. }
                | PortError::Timeout { .. }
                | PortError::ServiceUnavailable { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, PortError::Conflict { .. })
    }
}

/// Supertrait of every port; adapters are shared across tasks
pub trait DomainPort: Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    /// Answering, but slowly
    Degraded,
    Unhealthy,
}

/// Outcome of one adapter probe, as served by the readiness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub adapter_id: String,
    pub status: AdapterHealth,
    pub latency_ms: u64,
    pub message: Option<String>,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

/// Adapters that can probe their backing system
#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}
