//! Decision engine
//!
//! Compares reported and detected amounts and reduces every signal of a
//! verification pass into a [`Verdict`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::{Money, Rate};
use crate::claim::{ClaimStatus, VerificationOutcome};
use crate::classifier::ReceiptType;
use crate::fingerprint::Fingerprint;
use crate::warning::{Action, FraudWarning};

/// Prefix of the `ai_result` stored on rejected claims
pub const REJECTION_PREFIX: &str = "FRAUDE/RECIBO INVÁLIDO: ";

/// Why a pass ended the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Basis {
    /// Amount matched and the provider was above its confidence threshold
    ConfidentMatch,
    /// Amount matched below the threshold; the agreement itself is the evidence
    CorroboratedMatch,
    /// A REJECT-level warning was raised
    Rejected,
    /// Every tier ran without a match
    TiersExhausted,
    /// No evidence could be loaded
    NoEvidence,
    /// The pass failed unexpectedly
    Failure,
}

/// Final result of one verification pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: ClaimStatus,
    pub outcome: VerificationOutcome,
    pub basis: Basis,
    pub confidence: f64,
    pub detected_amount: Option<Money>,
    pub receipt_type: ReceiptType,
    pub operation_number: Option<String>,
    pub receipt_date: Option<NaiveDate>,
    pub fingerprint: Option<Fingerprint>,
    pub warnings: Vec<FraudWarning>,
    /// Provider whose attempt decided the pass
    pub provider: Option<String>,
}

impl Verdict {
    /// A verdict carrying no extracted data, parked for audit
    pub fn manual(basis: Basis, confidence: f64, warnings: Vec<FraudWarning>) -> Self {
        Self {
            status: ClaimStatus::PendingAudit,
            outcome: VerificationOutcome::Uncertain,
            basis,
            confidence,
            detected_amount: None,
            receipt_type: ReceiptType::Unknown,
            operation_number: None,
            receipt_date: None,
            fingerprint: None,
            warnings,
            provider: None,
        }
    }

    /// Label persisted as `ai_result`
    pub fn ai_result(&self) -> String {
        if self.status == ClaimStatus::Rejected {
            let messages: Vec<&str> = self.warnings.iter().map(|w| w.message.as_str()).collect();
            format!("{}{}", REJECTION_PREFIX, messages.join(" | "))
        } else {
            self.outcome.label().to_string()
        }
    }
}

/// Amount comparison and outcome policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionEngine {
    tolerance: Rate,
    confidence_floor: f64,
    high_confidence: f64,
    mismatch_difference: Decimal,
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self {
            tolerance: Rate::new(dec!(0.03)),
            confidence_floor: 0.5,
            high_confidence: 0.8,
            mismatch_difference: dec!(0.20),
        }
    }
}

impl DecisionEngine {
    pub fn new(
        tolerance: Rate,
        confidence_floor: f64,
        high_confidence: f64,
        mismatch_difference: Decimal,
    ) -> Self {
        Self {
            tolerance,
            confidence_floor,
            high_confidence,
            mismatch_difference,
        }
    }

    pub fn tolerance(&self) -> Rate {
        self.tolerance
    }

    /// True iff both amounts are positive and differ by at most the tolerance
    pub fn amounts_match(&self, reported: &Money, detected: &Money) -> bool {
        if !reported.is_positive() || !detected.is_positive() {
            return false;
        }
        reported
            .relative_difference(detected)
            .map(|diff| diff <= self.tolerance.as_decimal())
            .unwrap_or(false)
    }

    /// Outcome of comparing a reported amount with what the receipt shows
    pub fn classify(
        &self,
        reported: &Money,
        detected: Option<&Money>,
        confidence: f64,
    ) -> VerificationOutcome {
        let Some(detected) = detected else {
            return VerificationOutcome::Uncertain;
        };
        if self.amounts_match(reported, detected) {
            return VerificationOutcome::Match;
        }
        if confidence < self.confidence_floor {
            return VerificationOutcome::Uncertain;
        }
        if confidence >= self.high_confidence {
            let far_apart = reported
                .relative_difference(detected)
                .map(|diff| diff > self.mismatch_difference)
                .unwrap_or(false);
            if far_apart {
                return VerificationOutcome::Mismatch;
            }
        }
        VerificationOutcome::Uncertain
    }

    /// Claim status for an outcome given the receipt and fraud actions
    pub fn status_for(&self, outcome: VerificationOutcome, receipt: Action, fraud: Action) -> ClaimStatus {
        if receipt == Action::Reject || fraud == Action::Reject {
            return ClaimStatus::Rejected;
        }
        match outcome {
            VerificationOutcome::Match
                if receipt != Action::ManualReview && fraud != Action::ManualReview =>
            {
                ClaimStatus::Approved
            }
            _ => ClaimStatus::PendingAudit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use crate::warning::{Severity, WarningKind};

    fn pen(amount: Decimal) -> Money {
        Money::new(amount, Currency::PEN)
    }

    #[test]
    fn test_amounts_match_boundary_is_inclusive() {
        let engine = DecisionEngine::default();
        assert!(engine.amounts_match(&pen(dec!(100)), &pen(dec!(97))));
        assert!(engine.amounts_match(&pen(dec!(97)), &pen(dec!(100))));
        assert!(!engine.amounts_match(&pen(dec!(100)), &pen(dec!(96.9))));
    }

    #[test]
    fn test_amounts_match_requires_positive() {
        let engine = DecisionEngine::default();
        assert!(!engine.amounts_match(&pen(dec!(0)), &pen(dec!(0))));
        assert!(!engine.amounts_match(&pen(dec!(10)), &pen(dec!(-10))));
    }

    #[test]
    fn test_amounts_match_rejects_other_currency() {
        let engine = DecisionEngine::default();
        let usd = Money::new(dec!(20), Currency::USD);
        assert!(!engine.amounts_match(&pen(dec!(20)), &usd));
    }

    #[test]
    fn test_exact_match_overrides_low_confidence() {
        let engine = DecisionEngine::default();
        let reported = pen(dec!(100));
        assert_eq!(
            engine.classify(&reported, Some(&pen(dec!(100))), 0.2),
            VerificationOutcome::Match
        );
    }

    #[test]
    fn test_high_confidence_large_difference_is_mismatch() {
        let engine = DecisionEngine::default();
        assert_eq!(
            engine.classify(&pen(dec!(100)), Some(&pen(dec!(150))), 0.9),
            VerificationOutcome::Mismatch
        );
    }

    #[test]
    fn test_high_confidence_small_difference_is_uncertain() {
        let engine = DecisionEngine::default();
        assert_eq!(
            engine.classify(&pen(dec!(100)), Some(&pen(dec!(115))), 0.9),
            VerificationOutcome::Uncertain
        );
    }

    #[test]
    fn test_missing_amount_is_uncertain() {
        let engine = DecisionEngine::default();
        assert_eq!(engine.classify(&pen(dec!(100)), None, 0.9), VerificationOutcome::Uncertain);
    }

    #[test]
    fn test_mid_confidence_is_uncertain() {
        let engine = DecisionEngine::default();
        assert_eq!(
            engine.classify(&pen(dec!(100)), Some(&pen(dec!(300))), 0.6),
            VerificationOutcome::Uncertain
        );
        assert_eq!(
            engine.classify(&pen(dec!(100)), Some(&pen(dec!(300))), 0.3),
            VerificationOutcome::Uncertain
        );
    }

    #[test]
    fn test_status_mapping() {
        let engine = DecisionEngine::default();
        use Action::*;
        assert_eq!(engine.status_for(VerificationOutcome::Match, Approve, Approve), ClaimStatus::Approved);
        assert_eq!(engine.status_for(VerificationOutcome::Match, Approve, ManualReview), ClaimStatus::PendingAudit);
        assert_eq!(engine.status_for(VerificationOutcome::Match, ManualReview, Approve), ClaimStatus::PendingAudit);
        assert_eq!(engine.status_for(VerificationOutcome::Uncertain, Approve, Approve), ClaimStatus::PendingAudit);
        assert_eq!(engine.status_for(VerificationOutcome::Match, Approve, Reject), ClaimStatus::Rejected);
        assert_eq!(engine.status_for(VerificationOutcome::Mismatch, Reject, Approve), ClaimStatus::Rejected);
    }

    #[test]
    fn test_rejection_ai_result_joins_messages() {
        let mut verdict = Verdict::manual(Basis::Rejected, 0.9, vec![
            FraudWarning::new(WarningKind::DuplicateImage, Severity::Critical, "Image already used"),
            FraudWarning::new(WarningKind::FutureDate, Severity::High, "Receipt dated in the future"),
        ]);
        verdict.status = ClaimStatus::Rejected;
        assert_eq!(
            verdict.ai_result(),
            "FRAUDE/RECIBO INVÁLIDO: Image already used | Receipt dated in the future"
        );
    }

    #[test]
    fn test_ai_result_uses_outcome_label() {
        let verdict = Verdict::manual(Basis::TiersExhausted, 0.4, Vec::new());
        assert_eq!(verdict.ai_result(), "DUDOSO");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use core_kernel::Currency;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn match_iff_within_tolerance(
            reported in 1i64..1_000_000i64,
            detected in 1i64..1_000_000i64
        ) {
            let engine = DecisionEngine::default();
            let r = Money::new(Decimal::new(reported, 2), Currency::PEN);
            let d = Money::new(Decimal::new(detected, 2), Currency::PEN);
            let diff = r.relative_difference(&d).unwrap();
            prop_assert_eq!(engine.amounts_match(&r, &d), diff <= dec!(0.03));
        }

        #[test]
        fn match_is_symmetric(
            reported in 1i64..1_000_000i64,
            detected in 1i64..1_000_000i64
        ) {
            let engine = DecisionEngine::default();
            let r = Money::new(Decimal::new(reported, 2), Currency::PEN);
            let d = Money::new(Decimal::new(detected, 2), Currency::PEN);
            prop_assert_eq!(engine.amounts_match(&r, &d), engine.amounts_match(&d, &r));
        }

        #[test]
        fn matching_amounts_always_classify_as_match(
            cents in 100i64..1_000_000i64,
            confidence in 0.0f64..=1.0f64
        ) {
            let engine = DecisionEngine::default();
            let m = Money::new(Decimal::new(cents, 2), Currency::PEN);
            prop_assert_eq!(engine.classify(&m, Some(&m), confidence), VerificationOutcome::Match);
        }
    }
}
