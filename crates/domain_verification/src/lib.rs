//! Reimbursement Verification Domain
//!
//! This crate verifies expense-reimbursement claims against the receipt
//! images attached to them: recognized text is turned into an amount,
//! operation number and date, the receipt is classified, fraud checks run
//! against claim history, and the decision engine settles the claim.
//!
//! # Verification Pass
//!
//! ```text
//! evidence -> tier 1 -> extract + classify -> fraud (once) -> decide
//!                 \-> tier 2 -> ... -> manual audit
//! ```
//!
//! # Claim Lifecycle
//!
//! ```text
//! PENDING_OCR -> APPROVED | REJECTED | PENDING_AUDIT -> APPROVED | REJECTED
//! ```

pub mod claim;
pub mod warning;
pub mod extraction;
pub mod classifier;
pub mod fingerprint;
pub mod fraud;
pub mod decision;
pub mod budget;
pub mod orchestrator;
pub mod ports;
pub mod config;
pub mod error;

pub use claim::{Claim, ClaimStatus, ClaimType, Evidence, EvidenceSlot, VerificationOutcome};
pub use warning::{Action, FraudWarning, Severity, WarningDetail, WarningKind};
pub use extraction::{AmountRange, ExtractedFields, FieldExtractor};
pub use classifier::{Classification, ReceiptClassifier, ReceiptType};
pub use fingerprint::{fingerprint, stretch_contrast, Fingerprint, FingerprintError};
pub use fraud::{FraudAssessment, FraudDetector};
pub use decision::{Basis, DecisionEngine, Verdict};
pub use budget::DailyCallBudget;
pub use orchestrator::{
    EscalationPolicy, JoinStrategy, OcrAttempt, PassState, Tier, TierOutcome,
    VerificationPipeline,
};
pub use ports::{
    AuditEvent, ClaimStore, ClaimUpdate, EvidenceSource, HistoryPort, ImagePreprocessor,
    OcrProvider, PriorClaim, Recognition,
};
pub use config::VerificationConfig;
pub use error::VerificationError;
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::{MockClaimStore, MockEvidenceSource, MockOcrProvider, MockPreprocessor};
