//! OCR escalation orchestrator
//!
//! A verification pass walks an ordered list of provider tiers. After each
//! tier the [`EscalationPolicy`] folds the tier's outcome into a
//! [`PassState`]; the pass stops as soon as the state is terminal. Fraud
//! checks run once, on the first tier that produced text.
//!
//! ```text
//! Init ──tier──▶ ProviderDone(n) ──tier──▶ ProviderDone(n+1) ── … ──finish──▶ EscalatedManual
//!   │                 │
//!   └──reject/match──▶ Concluded
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use core_kernel::{ClaimId, Money};

use crate::budget::DailyCallBudget;
use crate::claim::{Claim, ClaimStatus, EvidenceSlot, VerificationOutcome};
use crate::classifier::{Classification, ReceiptClassifier};
use crate::config::VerificationConfig;
use crate::decision::{Basis, DecisionEngine, Verdict};
use crate::error::VerificationError;
use crate::extraction::{ExtractedFields, FieldExtractor};
use crate::fraud::{FraudAssessment, FraudDetector};
use crate::ports::{
    AuditEvent, ClaimStore, ClaimUpdate, EvidenceSource, HistoryPort, ImagePreprocessor, OcrProvider,
    Recognition,
};
use crate::warning::{merge_warnings, Action, FraudWarning, Severity, WarningDetail, WarningKind};

const TEXT_SAMPLE_CHARS: usize = 200;

/// Text, confidence and fields of one provider pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrAttempt {
    pub provider: String,
    pub text: String,
    pub confidence: f64,
    pub fields: ExtractedFields,
}

/// How a tier combines the recognitions of several evidence images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    /// Evaluate each image on its own and keep the best attempt
    BestOf,
    /// Join all texts and average confidences before extraction
    Concatenate,
}

/// One provider in the escalation chain
#[derive(Clone)]
pub struct Tier {
    provider: Arc<dyn OcrProvider>,
    threshold: f64,
    join: JoinStrategy,
    budget: Option<Arc<DailyCallBudget>>,
}

impl Tier {
    pub fn new(provider: Arc<dyn OcrProvider>, threshold: f64, join: JoinStrategy) -> Self {
        Self {
            provider,
            threshold,
            join,
            budget: None,
        }
    }

    /// Gates the tier behind a shared daily budget; one unit per pass
    pub fn with_budget(mut self, budget: Arc<DailyCallBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// A tier's attempt after extraction, classification and amount comparison
#[derive(Debug, Clone, PartialEq)]
pub struct TierEvaluation {
    pub attempt: OcrAttempt,
    pub classification: Classification,
    /// Provider confidence, reduced when the amount came from a heuristic
    pub confidence: f64,
    pub threshold: f64,
    pub detected: Option<Money>,
    pub amount_matches: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BudgetExhausted,
}

/// What running one tier produced
#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    Evaluated(TierEvaluation),
    Failed { provider: String, error: String },
    Skipped { provider: String, reason: SkipReason },
}

/// Accumulated signal of the tiers run so far
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    pub tiers_run: usize,
    pub max_confidence: f64,
    pub latest: Option<TierEvaluation>,
    /// Most recent evaluation that extracted an amount
    pub latest_with_amount: Option<TierEvaluation>,
    pub notes: Vec<FraudWarning>,
}

/// Stage of a single claim's verification pass
#[derive(Debug, Clone, PartialEq)]
pub enum PassState {
    Init,
    ProviderDone(Progress),
    Concluded(Verdict),
    EscalatedManual(Verdict),
}

impl PassState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PassState::Concluded(_) | PassState::EscalatedManual(_))
    }

    pub fn into_verdict(self) -> Option<Verdict> {
        match self {
            PassState::Concluded(v) | PassState::EscalatedManual(v) => Some(v),
            _ => None,
        }
    }
}

/// Pure transition rules of the escalation chain
#[derive(Debug, Clone, Copy, Default)]
pub struct EscalationPolicy {
    engine: DecisionEngine,
}

impl EscalationPolicy {
    pub fn new(engine: DecisionEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Folds one tier outcome into the pass state
    pub fn step(
        &self,
        state: PassState,
        outcome: TierOutcome,
        reported: &Money,
        fraud: Option<&FraudAssessment>,
    ) -> PassState {
        let mut progress = match state {
            PassState::Init => Progress::default(),
            PassState::ProviderDone(progress) => progress,
            terminal => return terminal,
        };
        progress.tiers_run += 1;

        let eval = match outcome {
            TierOutcome::Evaluated(eval) => eval,
            TierOutcome::Failed { .. } => return PassState::ProviderDone(progress),
            TierOutcome::Skipped { provider, reason } => {
                match reason {
                    SkipReason::BudgetExhausted => progress.notes.push(FraudWarning::new(
                        WarningKind::BudgetExhausted,
                        Severity::Medium,
                        format!("{} skipped: daily call budget exhausted", provider),
                    )),
                }
                return PassState::ProviderDone(progress);
            }
        };

        progress.max_confidence = progress.max_confidence.max(eval.confidence);
        let receipt_action = eval.classification.action;
        let fraud_action = fraud.map(|f| f.action).unwrap_or(Action::Approve);

        if receipt_action == Action::Reject || fraud_action == Action::Reject {
            let outcome = self
                .engine
                .classify(reported, eval.detected.as_ref(), eval.confidence);
            let warnings = collect_warnings(fraud, &eval, &progress.notes, None);
            return PassState::Concluded(build_verdict(
                ClaimStatus::Rejected,
                outcome,
                Basis::Rejected,
                &eval,
                fraud,
                warnings,
            ));
        }

        if eval.amount_matches {
            let basis = if eval.confidence >= eval.threshold {
                Basis::ConfidentMatch
            } else {
                Basis::CorroboratedMatch
            };
            let status =
                self.engine
                    .status_for(VerificationOutcome::Match, receipt_action, fraud_action);
            let warnings = collect_warnings(fraud, &eval, &progress.notes, None);
            return PassState::Concluded(build_verdict(
                status,
                VerificationOutcome::Match,
                basis,
                &eval,
                fraud,
                warnings,
            ));
        }

        if eval.detected.is_some() {
            progress.latest_with_amount = Some(eval.clone());
        }
        progress.latest = Some(eval);
        PassState::ProviderDone(progress)
    }

    /// Closes a pass whose tiers are all spent
    pub fn finish(
        &self,
        state: PassState,
        reported: &Money,
        fraud: Option<&FraudAssessment>,
    ) -> PassState {
        let progress = match state {
            PassState::Init => Progress::default(),
            PassState::ProviderDone(progress) => progress,
            terminal => return terminal,
        };

        let fraud_action = fraud.map(|f| f.action).unwrap_or(Action::Approve);

        if let Some(eval) = &progress.latest_with_amount {
            let outcome = self
                .engine
                .classify(reported, eval.detected.as_ref(), eval.confidence);
            let status = self
                .engine
                .status_for(outcome, eval.classification.action, fraud_action);
            let severity = match outcome {
                VerificationOutcome::Mismatch => Severity::High,
                _ => Severity::Medium,
            };
            let detected = eval.detected.map(|m| m.to_string()).unwrap_or_default();
            let mismatch = FraudWarning::new(
                WarningKind::AmountMismatch,
                severity,
                format!("Detected amount {} does not match reported {}", detected, reported),
            );
            let warnings = collect_warnings(fraud, eval, &progress.notes, Some(mismatch));
            return PassState::EscalatedManual(build_verdict(
                status,
                outcome,
                Basis::TiersExhausted,
                eval,
                fraud,
                warnings,
            ));
        }

        let not_detected = FraudWarning::new(
            WarningKind::AmountNotDetected,
            Severity::Medium,
            "No provider could read an amount from the evidence",
        );
        let mut verdict = match &progress.latest {
            Some(eval) => {
                let warnings = collect_warnings(fraud, eval, &progress.notes, Some(not_detected));
                build_verdict(
                    ClaimStatus::PendingAudit,
                    VerificationOutcome::Uncertain,
                    Basis::TiersExhausted,
                    eval,
                    fraud,
                    warnings,
                )
            }
            None => {
                let mut warnings = progress.notes.clone();
                warnings.push(not_detected);
                Verdict::manual(Basis::TiersExhausted, 0.0, warnings)
            }
        };
        verdict.detected_amount = None;
        verdict.confidence = progress.max_confidence;
        PassState::EscalatedManual(verdict)
    }
}

fn collect_warnings(
    fraud: Option<&FraudAssessment>,
    eval: &TierEvaluation,
    notes: &[FraudWarning],
    extra: Option<FraudWarning>,
) -> Vec<FraudWarning> {
    let mut warnings = fraud.map(|f| f.warnings.clone()).unwrap_or_default();
    merge_warnings(&mut warnings, &eval.classification.warnings);
    merge_warnings(&mut warnings, notes);
    if let Some(extra) = extra {
        merge_warnings(&mut warnings, &[extra]);
    }
    warnings
}

fn build_verdict(
    status: ClaimStatus,
    outcome: VerificationOutcome,
    basis: Basis,
    eval: &TierEvaluation,
    fraud: Option<&FraudAssessment>,
    warnings: Vec<FraudWarning>,
) -> Verdict {
    let fields = &eval.attempt.fields;
    Verdict {
        status,
        outcome,
        basis,
        confidence: eval.confidence,
        detected_amount: eval.detected,
        receipt_type: eval.classification.receipt_type,
        operation_number: fraud
            .and_then(|f| f.operation_number.clone())
            .or_else(|| fields.operation_number.clone()),
        receipt_date: fraud.and_then(|f| f.receipt_date).or(fields.receipt_date),
        fingerprint: fraud.and_then(|f| f.fingerprint.clone()),
        warnings,
        provider: Some(eval.attempt.provider.clone()),
    }
}

/// An evidence image ready for recognition
#[derive(Debug, Clone)]
struct EvidenceImage {
    slot: EvidenceSlot,
    raw: Vec<u8>,
    normalized: Vec<u8>,
}

/// Claims with a pass running in this process
#[derive(Debug, Default)]
struct InFlight(Mutex<HashSet<ClaimId>>);

impl InFlight {
    fn enter(&self, id: ClaimId) -> Option<PassGuard<'_>> {
        let mut claims = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        claims.insert(id).then(|| PassGuard { in_flight: self, id })
    }

    fn contains(&self, id: ClaimId) -> bool {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&id)
    }
}

/// Releases the claim when the pass ends, however it ends
struct PassGuard<'a> {
    in_flight: &'a InFlight,
    id: ClaimId,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.id);
    }
}

/// Runs verification passes against the configured tiers
pub struct VerificationPipeline {
    tiers: Vec<Tier>,
    extractor: FieldExtractor,
    classifier: ReceiptClassifier,
    fraud: FraudDetector,
    policy: EscalationPolicy,
    store: Arc<dyn ClaimStore>,
    evidence: Arc<dyn EvidenceSource>,
    preprocessor: Arc<dyn ImagePreprocessor>,
    provider_timeout: Duration,
    heuristic_factor: f64,
    in_flight: InFlight,
}

impl VerificationPipeline {
    pub fn new(
        config: &VerificationConfig,
        tiers: Vec<Tier>,
        store: Arc<dyn ClaimStore>,
        history: Arc<dyn HistoryPort>,
        evidence: Arc<dyn EvidenceSource>,
        preprocessor: Arc<dyn ImagePreprocessor>,
    ) -> Self {
        Self {
            tiers,
            extractor: config.field_extractor(),
            classifier: ReceiptClassifier::new(),
            fraud: FraudDetector::new(history, config.date_gap_days),
            policy: EscalationPolicy::new(config.decision_engine()),
            store,
            evidence,
            preprocessor,
            provider_timeout: config.provider_timeout(),
            heuristic_factor: config.heuristic_confidence_factor,
            in_flight: InFlight::default(),
        }
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// True while a pass for `id` is running in this pipeline
    pub fn is_verifying(&self, id: ClaimId) -> bool {
        self.in_flight.contains(id)
    }

    fn enter(&self, id: ClaimId) -> Result<PassGuard<'_>, VerificationError> {
        self.in_flight
            .enter(id)
            .ok_or(VerificationError::PassInProgress(id))
    }

    /// Verifies a pending claim and writes the verdict back to the store
    ///
    /// Unexpected failures inside the pass park the claim for audit with
    /// confidence 0. Only failures to persist the verdict are returned; a
    /// claim that left PENDING_OCR in the store meanwhile is a conflict.
    #[instrument(skip(self, claim), fields(claim_id = %claim.id, reported = %claim.reported_amount))]
    pub async fn process(&self, claim: &mut Claim) -> Result<Verdict, VerificationError> {
        if claim.status != ClaimStatus::PendingOcr {
            return Err(VerificationError::InvalidStatusTransition {
                from: claim.status.to_string(),
                to: "verification".to_string(),
            });
        }
        let _pass = self.enter(claim.id)?;
        self.verify(claim, ClaimStatus::PendingOcr).await
    }

    /// Sends a claim parked for audit back through one pass
    ///
    /// The reset happens in memory only. The stored claim stays
    /// PENDING_AUDIT, out of the worker's queue, until the new verdict
    /// replaces it.
    #[instrument(skip(self), fields(claim_id = %id))]
    pub async fn reprocess(&self, id: ClaimId, requested_by: &str) -> Result<Verdict, VerificationError> {
        let _pass = self.enter(id)?;
        let mut claim = self.store.get(id).await?;
        claim.reset_for_reprocessing()?;
        let event = AuditEvent::by(id, requested_by, "REPROCESS_REQUESTED", json!({}));
        if let Err(e) = self.store.append_audit_event(&event).await {
            warn!(error = %e, "Failed to record reprocess request");
        }
        self.verify(&mut claim, ClaimStatus::PendingAudit).await
    }

    /// Runs one pass and writes the verdict over a stored claim in `stored`
    async fn verify(&self, claim: &mut Claim, stored: ClaimStatus) -> Result<Verdict, VerificationError> {
        let verdict = match self.run_pass(claim).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(error = %e, "Verification pass failed, routing to audit");
                self.audit(claim.id, "PROCESSING_ERROR", json!({ "error": e.to_string() }))
                    .await;
                Verdict::manual(
                    Basis::Failure,
                    0.0,
                    vec![FraudWarning::new(
                        WarningKind::ProcessingError,
                        Severity::High,
                        "Automatic verification failed",
                    )
                    .with_detail(WarningDetail::Note {
                        text: e.to_string(),
                    })],
                )
            }
        };

        claim.record_verification(&verdict)?;
        self.store
            .update(claim.id, stored, &ClaimUpdate::from(&*claim))
            .await?;

        info!(
            status = %verdict.status,
            outcome = verdict.outcome.label(),
            basis = ?verdict.basis,
            confidence = verdict.confidence,
            detected = ?verdict.detected_amount.map(|m| m.amount()),
            provider = ?verdict.provider,
            warnings = verdict.warnings.len(),
            "Claim verified"
        );
        Ok(verdict)
    }

    async fn run_pass(&self, claim: &Claim) -> Result<Verdict, VerificationError> {
        let images = self.load_evidence(claim).await;
        if images.is_empty() {
            warn!("No evidence could be loaded");
            self.audit(
                claim.id,
                "NO_EVIDENCE",
                json!({ "references": claim.evidence.references().len() }),
            )
            .await;
            return Ok(Verdict::manual(
                Basis::NoEvidence,
                0.0,
                vec![FraudWarning::new(
                    WarningKind::NoEvidence,
                    Severity::High,
                    "No evidence image could be loaded",
                )],
            ));
        }

        let reported = claim.reported_amount;
        let mut fraud: Option<FraudAssessment> = None;
        let mut state = PassState::Init;

        for tier in &self.tiers {
            let outcome = self.run_tier(tier, &images, claim).await;

            match &outcome {
                TierOutcome::Evaluated(eval) => {
                    self.audit_attempt(claim.id, eval).await;
                    if fraud.is_none() {
                        let primary = images.first().map(|i| i.raw.as_slice());
                        let assessment = self
                            .fraud
                            .assess(
                                claim,
                                &eval.attempt.text,
                                &eval.attempt.fields,
                                &eval.classification.warnings,
                                primary,
                            )
                            .await?;
                        self.audit(
                            claim.id,
                            "FRAUD_VALIDATION",
                            json!({
                                "action": assessment.action.as_str(),
                                "fingerprint": assessment.fingerprint,
                                "warnings": assessment.warnings,
                            }),
                        )
                        .await;
                        fraud = Some(assessment);
                    }
                }
                TierOutcome::Failed { provider, error } => {
                    warn!(provider = %provider, error = %error, "Provider tier failed, escalating");
                }
                TierOutcome::Skipped { provider, reason } => {
                    warn!(provider = %provider, reason = ?reason, "Provider tier skipped");
                    self.audit(
                        claim.id,
                        "BUDGET_EXHAUSTED",
                        json!({ "provider": provider }),
                    )
                    .await;
                }
            }

            state = self.policy.step(state, outcome, &reported, fraud.as_ref());
            if state.is_terminal() {
                break;
            }
        }

        self.policy
            .finish(state, &reported, fraud.as_ref())
            .into_verdict()
            .ok_or_else(|| VerificationError::InvalidClaim("pass ended without a verdict".to_string()))
    }

    async fn load_evidence(&self, claim: &Claim) -> Vec<EvidenceImage> {
        let mut images = Vec::new();
        for (slot, reference) in claim.evidence.references() {
            let raw = match self.evidence.fetch(reference).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(?slot, reference, error = %e, "Skipping unreadable evidence");
                    continue;
                }
            };
            let normalized = match self.preprocessor.normalize(&raw).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(?slot, error = %e, "Preprocessing failed, using source bytes");
                    raw.clone()
                }
            };
            images.push(EvidenceImage {
                slot,
                raw,
                normalized,
            });
        }
        images
    }

    #[instrument(skip(self, tier, images, claim), fields(provider = tier.name()))]
    async fn run_tier(&self, tier: &Tier, images: &[EvidenceImage], claim: &Claim) -> TierOutcome {
        let provider = tier.name().to_string();

        if let Some(budget) = &tier.budget {
            if !budget.try_acquire().await {
                return TierOutcome::Skipped {
                    provider,
                    reason: SkipReason::BudgetExhausted,
                };
            }
        }

        let results = join_all(
            images
                .iter()
                .map(|image| self.recognize(tier.provider.as_ref(), &image.normalized)),
        )
        .await;

        let mut recognitions = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (image, result) in images.iter().zip(results) {
            match result {
                Ok(recognition) => recognitions.push(recognition),
                Err(e) => {
                    warn!(slot = ?image.slot, error = %e, "Recognition failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if recognitions.is_empty() {
            return TierOutcome::Failed {
                provider,
                error: first_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no recognitions".to_string()),
            };
        }

        let attempt = match tier.join {
            JoinStrategy::BestOf => self.best_of(&provider, recognitions),
            JoinStrategy::Concatenate => self.concatenate(&provider, recognitions),
        };
        TierOutcome::Evaluated(self.evaluate(attempt, tier.threshold, claim))
    }

    async fn recognize(
        &self,
        provider: &dyn OcrProvider,
        image: &[u8],
    ) -> Result<Recognition, VerificationError> {
        match tokio::time::timeout(self.provider_timeout, provider.recognize(image)).await {
            Ok(Ok(recognition)) => Ok(Recognition::new(recognition.text, recognition.confidence)),
            Ok(Err(e)) => Err(VerificationError::ProviderFailure {
                provider: provider.name().to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(VerificationError::ProviderTimeout {
                provider: provider.name().to_string(),
                timeout_ms: self.provider_timeout.as_millis() as u64,
            }),
        }
    }

    /// Highest confidence among attempts with an amount, else highest overall
    fn best_of(&self, provider: &str, recognitions: Vec<Recognition>) -> OcrAttempt {
        let attempts: Vec<OcrAttempt> = recognitions
            .into_iter()
            .map(|r| OcrAttempt {
                provider: provider.to_string(),
                fields: self.extractor.extract(&r.text),
                text: r.text,
                confidence: r.confidence,
            })
            .collect();

        let by_confidence = |a: &&OcrAttempt, b: &&OcrAttempt| a.confidence.total_cmp(&b.confidence);
        let best = attempts
            .iter()
            .filter(|a| a.fields.amount.is_some())
            .max_by(by_confidence)
            .or_else(|| attempts.iter().max_by(by_confidence))
            .cloned();

        best.unwrap_or_else(|| OcrAttempt {
            provider: provider.to_string(),
            text: String::new(),
            confidence: 0.0,
            fields: ExtractedFields::default(),
        })
    }

    fn concatenate(&self, provider: &str, recognitions: Vec<Recognition>) -> OcrAttempt {
        let count = recognitions.len().max(1) as f64;
        let confidence = recognitions.iter().map(|r| r.confidence).sum::<f64>() / count;
        let text = recognitions
            .into_iter()
            .map(|r| r.text)
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        OcrAttempt {
            provider: provider.to_string(),
            fields: self.extractor.extract(&text),
            text,
            confidence,
        }
    }

    fn evaluate(&self, attempt: OcrAttempt, threshold: f64, claim: &Claim) -> TierEvaluation {
        let classification = self.classifier.classify(&attempt.text, &attempt.fields);
        let confidence = if attempt.fields.amount_is_heuristic() {
            attempt.confidence * self.heuristic_factor
        } else {
            attempt.confidence
        };
        let detected = attempt
            .fields
            .amount_value()
            .map(|value| Money::new(value, claim.currency()));
        let amount_matches = detected
            .as_ref()
            .is_some_and(|d| self.policy.engine().amounts_match(&claim.reported_amount, d));

        debug!(
            provider = %attempt.provider,
            confidence,
            threshold,
            detected = ?detected.map(|m| m.amount()),
            amount_matches,
            receipt_type = classification.receipt_type.as_str(),
            "Evaluated provider attempt"
        );

        TierEvaluation {
            attempt,
            classification,
            confidence,
            threshold,
            detected,
            amount_matches,
        }
    }

    async fn audit_attempt(&self, claim_id: ClaimId, eval: &TierEvaluation) {
        let sample: String = eval.attempt.text.chars().take(TEXT_SAMPLE_CHARS).collect();
        self.audit(
            claim_id,
            format!("{}_RESULT", eval.attempt.provider.to_uppercase()),
            json!({
                "confidence": eval.confidence,
                "amount": eval.detected.map(|m| m.amount()),
                "receipt_type": eval.classification.receipt_type.as_str(),
                "is_valid": eval.classification.is_valid,
                "text_sample": sample,
            }),
        )
        .await;
    }

    async fn audit(&self, claim_id: ClaimId, action: impl Into<String>, detail: serde_json::Value) {
        let event = AuditEvent::agent(claim_id, action, detail);
        if let Err(e) = self.store.append_audit_event(&event).await {
            warn!(action = %event.action, error = %e, "Failed to append audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::classifier::ReceiptType;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    fn pen(v: rust_decimal::Decimal) -> Money {
        Money::new(v, Currency::PEN)
    }

    fn eval(confidence: f64, detected: Option<Money>, matches: bool, action: Action) -> TierEvaluation {
        let warnings = match action {
            Action::Reject => vec![FraudWarning::new(
                WarningKind::EstimatedFare,
                Severity::Critical,
                "Estimated fare screenshot is not proof of a trip",
            )],
            Action::ManualReview => vec![FraudWarning::new(
                WarningKind::NoCompletionProof,
                Severity::High,
                "No trip or payment completion confirmation found",
            )],
            Action::Approve => Vec::new(),
        };
        TierEvaluation {
            attempt: OcrAttempt {
                provider: "tesseract".to_string(),
                text: "S/ 20.00".to_string(),
                confidence,
                fields: ExtractedFields {
                    operation_number: Some("11112222".to_string()),
                    ..Default::default()
                },
            },
            classification: Classification {
                receipt_type: ReceiptType::DidiCompleted,
                is_valid: action == Action::Approve,
                warnings,
                action,
            },
            confidence,
            threshold: 0.85,
            detected,
            amount_matches: matches,
        }
    }

    fn fraud(action: Action) -> FraudAssessment {
        let warnings = match action {
            Action::Approve => Vec::new(),
            Action::ManualReview => vec![FraudWarning::new(
                WarningKind::DateMismatch,
                Severity::Medium,
                "Receipt date is 45 days away from expense date",
            )],
            Action::Reject => vec![FraudWarning::new(
                WarningKind::DuplicateImage,
                Severity::Critical,
                "Image already used",
            )],
        };
        FraudAssessment {
            warnings,
            fingerprint: Some(Fingerprint::from_stored("ab12")),
            operation_number: Some("99998888".to_string()),
            receipt_date: None,
            action,
        }
    }

    fn policy() -> EscalationPolicy {
        EscalationPolicy::default()
    }

    #[test]
    fn test_confident_match_concludes_approved() {
        let reported = pen(dec!(20));
        let state = policy().step(
            PassState::Init,
            TierOutcome::Evaluated(eval(0.9, Some(reported), true, Action::Approve)),
            &reported,
            Some(&fraud(Action::Approve)),
        );
        let PassState::Concluded(verdict) = state else {
            panic!("expected concluded, got {:?}", state);
        };
        assert_eq!(verdict.status, ClaimStatus::Approved);
        assert_eq!(verdict.outcome, VerificationOutcome::Match);
        assert_eq!(verdict.basis, Basis::ConfidentMatch);
        assert_eq!(verdict.operation_number.as_deref(), Some("99998888"));
        assert_eq!(verdict.fingerprint, Some(Fingerprint::from_stored("ab12")));
    }

    #[test]
    fn test_low_confidence_match_is_corroborated() {
        let reported = pen(dec!(20));
        let state = policy().step(
            PassState::Init,
            TierOutcome::Evaluated(eval(0.3, Some(reported), true, Action::Approve)),
            &reported,
            None,
        );
        let verdict = state.into_verdict().unwrap();
        assert_eq!(verdict.basis, Basis::CorroboratedMatch);
        assert_eq!(verdict.status, ClaimStatus::Approved);
    }

    #[test]
    fn test_match_with_review_flag_parks_for_audit() {
        let reported = pen(dec!(20));
        let verdict = policy()
            .step(
                PassState::Init,
                TierOutcome::Evaluated(eval(0.9, Some(reported), true, Action::Approve)),
                &reported,
                Some(&fraud(Action::ManualReview)),
            )
            .into_verdict()
            .unwrap();
        assert_eq!(verdict.outcome, VerificationOutcome::Match);
        assert_eq!(verdict.status, ClaimStatus::PendingAudit);
        assert_eq!(verdict.warnings.len(), 1);
    }

    #[test]
    fn test_reject_overrides_match() {
        let reported = pen(dec!(20));
        let verdict = policy()
            .step(
                PassState::Init,
                TierOutcome::Evaluated(eval(0.95, Some(reported), true, Action::Approve)),
                &reported,
                Some(&fraud(Action::Reject)),
            )
            .into_verdict()
            .unwrap();
        assert_eq!(verdict.status, ClaimStatus::Rejected);
        assert_eq!(verdict.basis, Basis::Rejected);
        assert_eq!(verdict.ai_result(), "FRAUDE/RECIBO INVÁLIDO: Image already used");
    }

    #[test]
    fn test_invalid_receipt_rejects() {
        let reported = pen(dec!(20));
        let verdict = policy()
            .step(
                PassState::Init,
                TierOutcome::Evaluated(eval(0.9, Some(reported), true, Action::Reject)),
                &reported,
                None,
            )
            .into_verdict()
            .unwrap();
        assert_eq!(verdict.status, ClaimStatus::Rejected);
        assert!(!verdict.warnings.is_empty());
    }

    #[test]
    fn test_no_match_escalates() {
        let reported = pen(dec!(20));
        let state = policy().step(
            PassState::Init,
            TierOutcome::Evaluated(eval(0.9, Some(pen(dec!(35))), false, Action::Approve)),
            &reported,
            None,
        );
        let PassState::ProviderDone(progress) = &state else {
            panic!("expected escalation");
        };
        assert_eq!(progress.tiers_run, 1);
        assert!(progress.latest_with_amount.is_some());
    }

    #[test]
    fn test_failed_tier_escalates_without_signal() {
        let reported = pen(dec!(20));
        let state = policy().step(
            PassState::Init,
            TierOutcome::Failed {
                provider: "tesseract".to_string(),
                error: "timeout".to_string(),
            },
            &reported,
            None,
        );
        assert_eq!(
            state,
            PassState::ProviderDone(Progress {
                tiers_run: 1,
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_terminal_state_absorbs_further_outcomes() {
        let reported = pen(dec!(20));
        let concluded = PassState::Concluded(Verdict::manual(Basis::Failure, 0.0, Vec::new()));
        let next = policy().step(
            concluded.clone(),
            TierOutcome::Evaluated(eval(0.9, Some(reported), true, Action::Approve)),
            &reported,
            None,
        );
        assert_eq!(next, concluded);
    }

    #[test]
    fn test_finish_with_far_amount_is_mismatch() {
        let reported = pen(dec!(100));
        let state = policy().step(
            PassState::Init,
            TierOutcome::Evaluated(eval(0.9, Some(pen(dec!(150))), false, Action::Approve)),
            &reported,
            None,
        );
        let verdict = policy().finish(state, &reported, None).into_verdict().unwrap();
        assert_eq!(verdict.outcome, VerificationOutcome::Mismatch);
        assert_eq!(verdict.status, ClaimStatus::PendingAudit);
        assert_eq!(verdict.basis, Basis::TiersExhausted);
        assert!(verdict.warnings.iter().any(|w| w.kind == WarningKind::AmountMismatch));
    }

    #[test]
    fn test_finish_without_amount_records_max_confidence() {
        let reported = pen(dec!(20));
        let p = policy();
        let mut state = p.step(
            PassState::Init,
            TierOutcome::Evaluated(eval(0.4, None, false, Action::Approve)),
            &reported,
            None,
        );
        state = p.step(
            state,
            TierOutcome::Evaluated(eval(0.7, None, false, Action::Approve)),
            &reported,
            None,
        );
        let verdict = p.finish(state, &reported, None).into_verdict().unwrap();
        assert_eq!(verdict.status, ClaimStatus::PendingAudit);
        assert_eq!(verdict.outcome, VerificationOutcome::Uncertain);
        assert_eq!(verdict.confidence, 0.7);
        assert!(verdict.detected_amount.is_none());
        assert!(verdict.warnings.iter().any(|w| w.kind == WarningKind::AmountNotDetected));
    }

    #[test]
    fn test_finish_with_no_tiers_has_zero_confidence() {
        let reported = pen(dec!(20));
        let verdict = policy()
            .finish(PassState::Init, &reported, None)
            .into_verdict()
            .unwrap();
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.status, ClaimStatus::PendingAudit);
    }

    #[test]
    fn test_skipped_tier_leaves_budget_note() {
        let reported = pen(dec!(20));
        let state = policy().step(
            PassState::Init,
            TierOutcome::Skipped {
                provider: "gemini".to_string(),
                reason: SkipReason::BudgetExhausted,
            },
            &reported,
            None,
        );
        let verdict = policy().finish(state, &reported, None).into_verdict().unwrap();
        assert!(verdict.warnings.iter().any(|w| w.kind == WarningKind::BudgetExhausted));
    }

    #[test]
    fn test_in_flight_admits_one_pass_per_claim() {
        let in_flight = InFlight::default();
        let id = ClaimId::new_v7();

        let guard = in_flight.enter(id);
        assert!(guard.is_some());
        assert!(in_flight.enter(id).is_none());
        assert!(in_flight.enter(ClaimId::new_v7()).is_some());

        drop(guard);
        assert!(!in_flight.contains(id));
        assert!(in_flight.enter(id).is_some());
    }
}
