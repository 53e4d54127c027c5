//! Claim aggregate

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{ClaimId, Currency, Money, ReportingPeriod};
use crate::classifier::ReceiptType;
use crate::decision::Verdict;
use crate::error::VerificationError;
use crate::warning::{FraudWarning, Severity, WarningDetail, WarningKind};

/// Expense category chosen by the employee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimType {
    #[serde(rename = "taxi")]
    Taxi,
    #[serde(rename = "transporte")]
    Transport,
    #[serde(rename = "otros")]
    Other,
}

impl ClaimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimType::Taxi => "taxi",
            ClaimType::Transport => "transporte",
            ClaimType::Other => "otros",
        }
    }
}

impl FromStr for ClaimType {
    type Err = VerificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "taxi" => Ok(ClaimType::Taxi),
            "transporte" => Ok(ClaimType::Transport),
            "otros" => Ok(ClaimType::Other),
            other => Err(VerificationError::InvalidClaim(format!(
                "unknown claim type '{}'",
                other
            ))),
        }
    }
}

/// Claim lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    /// Submitted, waiting for the verification agent
    PendingOcr,
    /// Parked for a human auditor
    PendingAudit,
    /// Approved for reimbursement
    Approved,
    /// Rejected, with at least one warning explaining why
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::PendingOcr => "PENDING_OCR",
            ClaimStatus::PendingAudit => "PENDING_AUDIT",
            ClaimStatus::Approved => "APPROVED",
            ClaimStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ClaimStatus::Approved | ClaimStatus::Rejected)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = VerificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_OCR" => Ok(ClaimStatus::PendingOcr),
            "PENDING_AUDIT" => Ok(ClaimStatus::PendingAudit),
            "APPROVED" => Ok(ClaimStatus::Approved),
            "REJECTED" => Ok(ClaimStatus::Rejected),
            other => Err(VerificationError::InvalidClaim(format!(
                "unknown status '{}'",
                other
            ))),
        }
    }
}

/// Result of comparing the reported amount with the detected one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationOutcome {
    Match,
    Uncertain,
    Mismatch,
}

impl VerificationOutcome {
    /// Label persisted in the `ai_result` column
    pub fn label(&self) -> &'static str {
        match self {
            VerificationOutcome::Match => "COINCIDE",
            VerificationOutcome::Uncertain => "DUDOSO",
            VerificationOutcome::Mismatch => "NO_COINCIDE",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationOutcome::Match => "MATCH",
            VerificationOutcome::Uncertain => "UNCERTAIN",
            VerificationOutcome::Mismatch => "MISMATCH",
        }
    }
}

impl FromStr for VerificationOutcome {
    type Err = VerificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MATCH" => Ok(VerificationOutcome::Match),
            "UNCERTAIN" => Ok(VerificationOutcome::Uncertain),
            "MISMATCH" => Ok(VerificationOutcome::Mismatch),
            other => Err(VerificationError::InvalidClaim(format!(
                "unknown outcome '{}'",
                other
            ))),
        }
    }
}

/// Named evidence slots on a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSlot {
    TransportImage,
    CostScreenshot,
    Receipt,
}

/// Storage references for the uploaded evidence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub transport_image: Option<String>,
    pub cost_screenshot: Option<String>,
    pub receipt: Option<String>,
}

impl Evidence {
    /// Non-empty references in slot order; the first one is the primary image
    pub fn references(&self) -> Vec<(EvidenceSlot, &str)> {
        [
            (EvidenceSlot::TransportImage, self.transport_image.as_deref()),
            (EvidenceSlot::CostScreenshot, self.cost_screenshot.as_deref()),
            (EvidenceSlot::Receipt, self.receipt.as_deref()),
        ]
        .into_iter()
        .filter_map(|(slot, r)| r.filter(|s| !s.trim().is_empty()).map(|s| (slot, s)))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.references().is_empty()
    }
}

/// A reimbursement claim moving through verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    /// Unique identifier
    pub id: ClaimId,
    /// Expense category
    pub claim_type: ClaimType,
    /// Amount the employee says they paid
    pub reported_amount: Money,
    /// Date the expense happened
    pub expense_date: NaiveDate,
    /// Uploaded evidence
    pub evidence: Evidence,
    /// Lifecycle status
    pub status: ClaimStatus,
    /// Amount read from the receipt
    pub detected_amount: Option<Money>,
    /// Outcome of the amount comparison
    pub outcome: Option<VerificationOutcome>,
    /// Persisted result label or rejection message
    pub ai_result: Option<String>,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Receipt family
    pub receipt_type: ReceiptType,
    /// Operation / reference number printed on the receipt
    pub operation_number: Option<String>,
    /// Date printed on the receipt
    pub receipt_date: Option<NaiveDate>,
    /// Fingerprint of the primary evidence image
    pub image_fingerprint: Option<String>,
    /// Accumulated warnings
    pub warnings: Vec<FraudWarning>,
    /// Comment left by the human auditor
    pub auditor_comment: Option<String>,
    /// When the auditor decided
    pub audited_at: Option<DateTime<Utc>>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Claim {
    /// Creates a claim awaiting verification
    pub fn submit(
        claim_type: ClaimType,
        reported_amount: Money,
        expense_date: NaiveDate,
        evidence: Evidence,
    ) -> Result<Self, VerificationError> {
        if !reported_amount.is_positive() {
            return Err(VerificationError::InvalidClaim(format!(
                "reported amount must be positive, got {}",
                reported_amount
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: ClaimId::new_v7(),
            claim_type,
            reported_amount,
            expense_date,
            evidence,
            status: ClaimStatus::PendingOcr,
            detected_amount: None,
            outcome: None,
            ai_result: None,
            confidence: 0.0,
            receipt_type: ReceiptType::Unknown,
            operation_number: None,
            receipt_date: None,
            image_fingerprint: None,
            warnings: Vec::new(),
            auditor_comment: None,
            audited_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Currency used when nothing else is known
    pub fn currency(&self) -> Currency {
        self.reported_amount.currency()
    }

    /// Writes the outcome of a verification pass onto the claim
    pub fn record_verification(&mut self, verdict: &Verdict) -> Result<(), VerificationError> {
        if self.status != ClaimStatus::PendingOcr {
            return Err(VerificationError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: verdict.status.to_string(),
            });
        }
        if verdict.status == ClaimStatus::Rejected && verdict.warnings.is_empty() {
            return Err(VerificationError::InvalidClaim(
                "a rejection must carry at least one warning".to_string(),
            ));
        }
        self.transition_to(verdict.status)?;

        self.detected_amount = verdict.detected_amount;
        self.outcome = Some(verdict.outcome);
        self.ai_result = Some(verdict.ai_result());
        self.confidence = verdict.confidence.clamp(0.0, 1.0);
        self.receipt_type = verdict.receipt_type;
        self.operation_number = verdict.operation_number.clone();
        self.receipt_date = verdict.receipt_date;
        self.image_fingerprint = verdict.fingerprint.as_ref().map(|f| f.to_string());
        self.warnings = verdict.warnings.clone();
        Ok(())
    }

    /// Applies a human auditor's decision to a claim parked for audit
    pub fn apply_audit_decision(
        &mut self,
        decision: ClaimStatus,
        comment: Option<String>,
    ) -> Result<(), VerificationError> {
        if !decision.is_terminal() || self.status != ClaimStatus::PendingAudit {
            return Err(VerificationError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: decision.to_string(),
            });
        }
        let comment = comment.filter(|c| !c.trim().is_empty());
        if decision == ClaimStatus::Rejected {
            let text = comment.clone().ok_or(VerificationError::AuditCommentRequired)?;
            self.warnings.push(
                FraudWarning::new(
                    WarningKind::AuditorDecision,
                    Severity::High,
                    "Rejected by auditor",
                )
                .with_detail(WarningDetail::Note { text }),
            );
        }
        self.transition_to(decision)?;
        self.auditor_comment = comment;
        self.audited_at = Some(self.updated_at);
        Ok(())
    }

    /// Sends a claim parked for audit back through the pipeline
    pub fn reset_for_reprocessing(&mut self) -> Result<(), VerificationError> {
        self.transition_to(ClaimStatus::PendingOcr)?;
        self.detected_amount = None;
        self.outcome = None;
        self.ai_result = None;
        self.confidence = 0.0;
        self.warnings.clear();
        Ok(())
    }

    /// Reporting buckets of the expense date
    pub fn reporting_period(&self) -> ReportingPeriod {
        ReportingPeriod::of(self.expense_date)
    }

    fn transition_to(&mut self, target: ClaimStatus) -> Result<(), VerificationError> {
        if !self.can_transition_to(target) {
            return Err(VerificationError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Checks if transition is valid
    fn can_transition_to(&self, target: ClaimStatus) -> bool {
        use ClaimStatus::*;
        matches!(
            (self.status, target),
            (PendingOcr, PendingAudit) |
            (PendingOcr, Approved) |
            (PendingOcr, Rejected) |
            (PendingAudit, Approved) |
            (PendingAudit, Rejected) |
            (PendingAudit, PendingOcr)
        )
    }
}
