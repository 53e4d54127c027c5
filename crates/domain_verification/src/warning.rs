//! Fraud and validity warnings
//!
//! Warnings are immutable once raised. The classifier and fraud detector both
//! produce them; the claim carries the accumulated list so an auditor can see
//! why a claim was rejected or parked for review.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::ClaimId;

/// Warning severity, ordered from least to most serious
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Kind of warning raised during verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningKind {
    DuplicateImage,
    DuplicateOperation,
    MissingOperationNumber,
    DateMismatch,
    FutureDate,
    NegotiationScreenshot,
    SearchingDriver,
    EstimatedFare,
    NoCompletionProof,
    /// No OCR tier produced a usable amount
    AmountNotDetected,
    /// An amount was detected but did not agree with the reported one
    AmountMismatch,
    /// The cloud tier was skipped because the daily budget ran out
    BudgetExhausted,
    /// None of the evidence references could be resolved
    NoEvidence,
    /// The pass failed unexpectedly and was routed to manual audit
    ProcessingError,
    /// Recorded when an auditor rejects a claim by hand
    AuditorDecision,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::DuplicateImage => "DUPLICATE_IMAGE",
            WarningKind::DuplicateOperation => "DUPLICATE_OPERATION",
            WarningKind::MissingOperationNumber => "MISSING_OPERATION_NUMBER",
            WarningKind::DateMismatch => "DATE_MISMATCH",
            WarningKind::FutureDate => "FUTURE_DATE",
            WarningKind::NegotiationScreenshot => "NEGOTIATION_SCREENSHOT",
            WarningKind::SearchingDriver => "SEARCHING_DRIVER",
            WarningKind::EstimatedFare => "ESTIMATED_FARE",
            WarningKind::NoCompletionProof => "NO_COMPLETION_PROOF",
            WarningKind::AmountNotDetected => "AMOUNT_NOT_DETECTED",
            WarningKind::AmountMismatch => "AMOUNT_MISMATCH",
            WarningKind::BudgetExhausted => "BUDGET_EXHAUSTED",
            WarningKind::NoEvidence => "NO_EVIDENCE",
            WarningKind::ProcessingError => "PROCESSING_ERROR",
            WarningKind::AuditorDecision => "AUDITOR_DECISION",
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured context attached to a warning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarningDetail {
    /// Another claim already used the same image or operation number
    PriorClaim {
        claim_id: ClaimId,
        created_at: DateTime<Utc>,
        reported_amount: Decimal,
        status: String,
    },
    /// Distance between receipt date and reported expense date
    DaysApart { days: i64 },
    /// The receipt family inferred from its text
    DetectedType { receipt_type: String },
    /// Free-form note (auditor comments, error text)
    Note { text: String },
}

/// A single warning raised against a claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudWarning {
    #[serde(rename = "type")]
    pub kind: WarningKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<WarningDetail>,
}

impl FraudWarning {
    pub fn new(kind: WarningKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: WarningDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// What the automated checks recommend doing with a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Approve,
    ManualReview,
    Reject,
}

impl Action {
    /// Receipt-type reduction: only CRITICAL and HIGH warnings change the action
    pub fn for_receipt(warnings: &[FraudWarning]) -> Self {
        match max_severity(warnings) {
            Some(Severity::Critical) => Action::Reject,
            Some(Severity::High) => Action::ManualReview,
            _ => Action::Approve,
        }
    }

    /// Fraud reduction: any warning at all sends the claim to review
    pub fn for_fraud(warnings: &[FraudWarning]) -> Self {
        match max_severity(warnings) {
            Some(Severity::Critical) => Action::Reject,
            Some(_) => Action::ManualReview,
            None => Action::Approve,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Approve => "APPROVE",
            Action::ManualReview => "MANUAL_REVIEW",
            Action::Reject => "REJECT",
        }
    }
}

fn max_severity(warnings: &[FraudWarning]) -> Option<Severity> {
    warnings.iter().map(|w| w.severity).max()
}

/// Appends warnings not already present (same kind and message)
pub fn merge_warnings(into: &mut Vec<FraudWarning>, from: &[FraudWarning]) {
    for warning in from {
        let seen = into
            .iter()
            .any(|w| w.kind == warning.kind && w.message == warning.message);
        if !seen {
            into.push(warning.clone());
        }
    }
}
