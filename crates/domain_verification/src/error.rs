//! Verification domain errors

use thiserror::Error;

use core_kernel::{ClaimId, MoneyError, PortError};

/// Errors that can occur while verifying a claim
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Provider {provider} failed: {message}")]
    ProviderFailure { provider: String, message: String },

    #[error("Provider {provider} timed out after {timeout_ms}ms")]
    ProviderTimeout { provider: String, timeout_ms: u64 },

    #[error("Evidence unavailable: {0}")]
    EvidenceUnavailable(String),

    #[error("Store error: {0}")]
    Store(#[from] PortError),

    #[error("Invalid claim: {0}")]
    InvalidClaim(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Claim {0} already has a verification pass running")]
    PassInProgress(ClaimId),

    #[error("Rejecting a claim requires an auditor comment")]
    AuditCommentRequired,

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),
}

impl VerificationError {
    /// Returns true for failures a later provider tier or a retry may recover from
    pub fn is_transient(&self) -> bool {
        match self {
            VerificationError::ProviderFailure { .. }
            | VerificationError::ProviderTimeout { .. }
            | VerificationError::EvidenceUnavailable(_) => true,
            VerificationError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}
