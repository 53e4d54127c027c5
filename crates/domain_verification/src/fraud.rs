//! Fraud detection
//!
//! Runs once per verification pass, on the first provider's attempt. Every
//! check is executed; the resulting warnings are reduced to a single
//! [`Action`].

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use core_kernel::days_between;

use crate::claim::Claim;
use crate::error::VerificationError;
use crate::extraction::ExtractedFields;
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::ports::{HistoryPort, PriorClaim};
use crate::warning::{merge_warnings, Action, FraudWarning, Severity, WarningDetail, WarningKind};

/// Words that mark a receipt family which must carry an operation number
const OPERATION_REQUIRED_MARKERS: [&str; 4] = ["yape", "boleta", "factura", "ruc"];
const RIDE_HAILING_MARKERS: [&str; 3] = ["didi", "beat", "uber"];

/// Result of the fraud checks for one claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAssessment {
    pub warnings: Vec<FraudWarning>,
    pub fingerprint: Option<Fingerprint>,
    /// Operation number of the assessed attempt
    pub operation_number: Option<String>,
    pub receipt_date: Option<NaiveDate>,
    pub action: Action,
}

/// Duplicate and date-plausibility checks against claim history
#[derive(Clone)]
pub struct FraudDetector {
    history: Arc<dyn HistoryPort>,
    date_gap_days: i64,
}

impl FraudDetector {
    pub fn new(history: Arc<dyn HistoryPort>, date_gap_days: i64) -> Self {
        Self {
            history,
            date_gap_days,
        }
    }

    /// Assesses a claim given the text and fields of its first attempt
    ///
    /// History failures are returned as errors. A primary image that cannot
    /// be decoded only leaves the fingerprint empty.
    #[instrument(skip(self, claim, text, fields, classifier_warnings, primary_image), fields(claim_id = %claim.id))]
    pub async fn assess(
        &self,
        claim: &Claim,
        text: &str,
        fields: &ExtractedFields,
        classifier_warnings: &[FraudWarning],
        primary_image: Option<&[u8]>,
    ) -> Result<FraudAssessment, VerificationError> {
        let mut warnings = classifier_warnings.to_vec();

        let fingerprint = match primary_image {
            Some(bytes) => compute_fingerprint(bytes.to_vec()).await,
            None => None,
        };
        let operation_number = fields.operation_number.as_deref();

        self.history
            .publish_identity(claim.id, fingerprint.as_ref(), operation_number)
            .await?;

        if let Some(fp) = &fingerprint {
            if let Some(prior) = self.history.find_by_fingerprint(fp, claim.id).await? {
                warnings.push(
                    FraudWarning::new(
                        WarningKind::DuplicateImage,
                        Severity::Critical,
                        format!("Image already used by claim {}", prior.id),
                    )
                    .with_detail(prior_detail(&prior)),
                );
            }
        }

        match operation_number {
            Some(number) => {
                if let Some(prior) = self
                    .history
                    .find_by_operation_number(number, claim.id)
                    .await?
                {
                    warnings.push(
                        FraudWarning::new(
                            WarningKind::DuplicateOperation,
                            Severity::Critical,
                            format!("Operation number {} already used by claim {}", number, prior.id),
                        )
                        .with_detail(prior_detail(&prior)),
                    );
                }
            }
            None => {
                let already_flagged = warnings
                    .iter()
                    .any(|w| w.kind == WarningKind::MissingOperationNumber);
                if !already_flagged && requires_operation_number(text) {
                    warnings.push(FraudWarning::new(
                        WarningKind::MissingOperationNumber,
                        Severity::High,
                        "Receipt type requires an operation number but none was found",
                    ));
                }
            }
        }

        if let Some(receipt_date) = fields.receipt_date {
            let days = days_between(receipt_date, claim.expense_date);
            if days > self.date_gap_days {
                warnings.push(
                    FraudWarning::new(
                        WarningKind::DateMismatch,
                        Severity::Medium,
                        format!(
                            "Receipt date {} is {} days away from expense date {}",
                            receipt_date, days, claim.expense_date
                        ),
                    )
                    .with_detail(WarningDetail::DaysApart { days }),
                );
            }
            if receipt_date > claim.expense_date {
                warnings.push(
                    FraudWarning::new(
                        WarningKind::FutureDate,
                        Severity::High,
                        format!(
                            "Receipt date {} is after expense date {}",
                            receipt_date, claim.expense_date
                        ),
                    )
                    .with_detail(WarningDetail::DaysApart { days }),
                );
            }
        }

        let mut merged = Vec::with_capacity(warnings.len());
        merge_warnings(&mut merged, &warnings);
        let action = Action::for_fraud(&merged);

        Ok(FraudAssessment {
            warnings: merged,
            fingerprint,
            operation_number: fields.operation_number.clone(),
            receipt_date: fields.receipt_date,
            action,
        })
    }
}

fn requires_operation_number(text: &str) -> bool {
    let lower = text.to_lowercase();
    OPERATION_REQUIRED_MARKERS.iter().any(|m| lower.contains(m))
        && !RIDE_HAILING_MARKERS.iter().any(|m| lower.contains(m))
}

fn prior_detail(prior: &PriorClaim) -> WarningDetail {
    WarningDetail::PriorClaim {
        claim_id: prior.id,
        created_at: prior.created_at,
        reported_amount: prior.reported_amount,
        status: prior.status.to_string(),
    }
}

/// Fingerprints on the blocking pool; decode failures degrade to `None`
async fn compute_fingerprint(bytes: Vec<u8>) -> Option<Fingerprint> {
    match tokio::task::spawn_blocking(move || fingerprint(&bytes)).await {
        Ok(Ok(fp)) => Some(fp),
        Ok(Err(e)) => {
            warn!(error = %e, "Could not fingerprint primary image");
            None
        }
        Err(e) => {
            warn!(error = %e, "Fingerprint task failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::{ClaimStatus, ClaimType, Evidence};
    use crate::ports::mock::MockClaimStore;
    use core_kernel::{Currency, Money};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    fn claim_on(date: NaiveDate) -> Claim {
        Claim::submit(
            ClaimType::Taxi,
            Money::new(dec!(20), Currency::PEN),
            date,
            Evidence::default(),
        )
        .unwrap()
    }

    fn png(seed: u8) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 96, |x, y| {
            let v = ((x * 5 + y) as u8).wrapping_add(seed);
            Rgb([v, 255 - v, v / 3])
        }));
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn detector_with(claims: Vec<Claim>) -> (FraudDetector, Arc<MockClaimStore>) {
        let store = Arc::new(MockClaimStore::with_claims(claims).await);
        (FraudDetector::new(store.clone(), 30), store)
    }

    #[tokio::test]
    async fn test_clean_claim_is_approved() {
        let claim = claim_on(date(2025, 11, 13));
        let (detector, _) = detector_with(vec![claim.clone()]).await;

        let fields = ExtractedFields {
            receipt_date: Some(date(2025, 11, 13)),
            ..Default::default()
        };
        let result = detector
            .assess(&claim, "Viaje finalizado", &fields, &[], Some(&png(1)))
            .await
            .unwrap();

        assert!(result.warnings.is_empty());
        assert_eq!(result.action, Action::Approve);
        assert!(result.fingerprint.is_some());
    }

    #[tokio::test]
    async fn test_second_upload_of_same_image_is_critical() {
        let first = claim_on(date(2025, 11, 13));
        let second = claim_on(date(2025, 11, 14));
        let (detector, _) = detector_with(vec![first.clone(), second.clone()]).await;
        let image = png(7);
        let fields = ExtractedFields::default();

        let a = detector.assess(&first, "", &fields, &[], Some(&image)).await.unwrap();
        assert_eq!(a.action, Action::Approve);

        let b = detector.assess(&second, "", &fields, &[], Some(&image)).await.unwrap();
        assert_eq!(b.action, Action::Reject);
        let dup = &b.warnings[0];
        assert_eq!(dup.kind, WarningKind::DuplicateImage);
        assert!(matches!(
            dup.detail,
            Some(WarningDetail::PriorClaim { claim_id, .. }) if claim_id == first.id
        ));
    }

    #[tokio::test]
    async fn test_duplicate_operation_number_is_critical() {
        let mut prior = claim_on(date(2025, 11, 1));
        prior.operation_number = Some("07397334".to_string());
        prior.status = ClaimStatus::Approved;
        let claim = claim_on(date(2025, 11, 13));
        let (detector, _) = detector_with(vec![prior, claim.clone()]).await;

        let fields = ExtractedFields {
            operation_number: Some("07397334".to_string()),
            ..Default::default()
        };
        let result = detector.assess(&claim, "Yape", &fields, &[], None).await.unwrap();

        assert_eq!(result.action, Action::Reject);
        assert_eq!(result.warnings[0].kind, WarningKind::DuplicateOperation);
    }

    #[tokio::test]
    async fn test_missing_operation_number_on_wallet_text() {
        let claim = claim_on(date(2025, 11, 13));
        let (detector, _) = detector_with(vec![claim.clone()]).await;

        let result = detector
            .assess(&claim, "Yapeaste S/ 20", &ExtractedFields::default(), &[], None)
            .await
            .unwrap();
        assert_eq!(result.action, Action::ManualReview);
        assert_eq!(result.warnings[0].kind, WarningKind::MissingOperationNumber);
        assert_eq!(result.warnings[0].severity, Severity::High);

        let ride = detector
            .assess(&claim, "Uber boleta S/ 20", &ExtractedFields::default(), &[], None)
            .await
            .unwrap();
        assert!(ride.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_missing_operation_number_not_duplicated() {
        let claim = claim_on(date(2025, 11, 13));
        let (detector, _) = detector_with(vec![claim.clone()]).await;
        let from_classifier = FraudWarning::new(
            WarningKind::MissingOperationNumber,
            Severity::High,
            "YAPE must show an operation number",
        );

        let result = detector
            .assess(&claim, "Yapeaste", &ExtractedFields::default(), &[from_classifier], None)
            .await
            .unwrap();
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_old_receipt_is_medium_and_future_receipt_is_high() {
        let claim = claim_on(date(2025, 11, 13));
        let (detector, _) = detector_with(vec![claim.clone()]).await;

        let old = ExtractedFields {
            receipt_date: Some(date(2025, 9, 1)),
            ..Default::default()
        };
        let result = detector.assess(&claim, "", &old, &[], None).await.unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, WarningKind::DateMismatch);
        assert_eq!(result.warnings[0].severity, Severity::Medium);
        assert_eq!(result.action, Action::ManualReview);

        let future = ExtractedFields {
            receipt_date: Some(date(2025, 12, 31)),
            ..Default::default()
        };
        let result = detector.assess(&claim, "", &future, &[], None).await.unwrap();
        let kinds: Vec<_> = result.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::DateMismatch, WarningKind::FutureDate]);
    }

    #[tokio::test]
    async fn test_undecodable_image_degrades_to_no_fingerprint() {
        let claim = claim_on(date(2025, 11, 13));
        let (detector, _) = detector_with(vec![claim.clone()]).await;

        let result = detector
            .assess(&claim, "", &ExtractedFields::default(), &[], Some(b"%PDF-1.4"))
            .await
            .unwrap();
        assert!(result.fingerprint.is_none());
        assert_eq!(result.action, Action::Approve);
    }

    #[tokio::test]
    async fn test_history_failure_is_an_error() {
        let claim = claim_on(date(2025, 11, 13));
        let (detector, store) = detector_with(vec![claim.clone()]).await;
        store.fail_history(true);

        let err = detector
            .assess(&claim, "", &ExtractedFields::default(), &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::Store(_)));
    }
}
