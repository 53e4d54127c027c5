//! Verification Domain Ports
//!
//! The pipeline reaches every collaborator through the traits in this module:
//!
//! - `OcrProvider`: an opaque engine turning image bytes into text + confidence
//! - `ImagePreprocessor`: normalizes image bytes before recognition
//! - `EvidenceSource`: resolves an evidence reference to bytes
//! - `HistoryPort`: looks up earlier claims sharing an image or operation number
//! - `ClaimStore`: pending-claim queue, claim updates and the audit trail
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_verification::ports::ClaimStore;
//! use std::sync::Arc;
//!
//! pub struct Worker {
//!     store: Arc<dyn ClaimStore>,
//! }
//!
//! impl Worker {
//!     pub async fn next_batch(&self) -> Result<Vec<Claim>, PortError> {
//!         self.store.fetch_pending(5).await
//!     }
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{
    AuditEventId, ClaimId, Currency, DomainPort, HealthCheckable, Money, PortError, ReportingPeriod,
};

use crate::claim::{Claim, ClaimStatus, VerificationOutcome};
use crate::classifier::ReceiptType;
use crate::fingerprint::Fingerprint;
use crate::warning::FraudWarning;

/// Actor recorded on audit events written by the pipeline
pub const AGENT_ACTOR: &str = "AGENT_SYSTEM";

/// Raw output of one recognition call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    /// Provider-defined confidence in [0, 1]
    pub confidence: f64,
}

impl Recognition {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Nothing recognizable in the image
    pub fn empty() -> Self {
        Self::new("", 0.0)
    }
}

/// An OCR or vision engine
#[async_trait]
pub trait OcrProvider: DomainPort {
    /// Short stable name, used in logs and audit event names
    fn name(&self) -> &str;

    /// Recognizes text in an image. Absence of text is `Recognition::empty()`,
    /// not an error.
    async fn recognize(&self, image: &[u8]) -> Result<Recognition, PortError>;
}

/// Image normalization ahead of recognition
#[async_trait]
pub trait ImagePreprocessor: DomainPort {
    /// Returns normalized image bytes. Callers fall back to the source bytes
    /// when this fails.
    async fn normalize(&self, image: &[u8]) -> Result<Vec<u8>, PortError>;
}

/// Resolves evidence references to image bytes
#[async_trait]
pub trait EvidenceSource: DomainPort {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, PortError>;
}

/// Summary of an earlier claim found by a history lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorClaim {
    pub id: ClaimId,
    pub created_at: DateTime<Utc>,
    pub reported_amount: Decimal,
    pub status: ClaimStatus,
}

/// Duplicate lookups against previously processed claims
#[async_trait]
pub trait HistoryPort: DomainPort {
    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        exclude: ClaimId,
    ) -> Result<Option<PriorClaim>, PortError>;

    async fn find_by_operation_number(
        &self,
        operation_number: &str,
        exclude: ClaimId,
    ) -> Result<Option<PriorClaim>, PortError>;

    /// Makes a claim's fingerprint and operation number visible to lookups
    /// from other claims before its own pass has finished
    async fn publish_identity(
        &self,
        claim_id: ClaimId,
        fingerprint: Option<&Fingerprint>,
        operation_number: Option<&str>,
    ) -> Result<(), PortError>;
}

/// One entry of the claim audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub claim_id: ClaimId,
    pub actor: String,
    pub action: String,
    pub detail: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    /// An event recorded by the verification agent
    pub fn agent(claim_id: ClaimId, action: impl Into<String>, detail: serde_json::Value) -> Self {
        Self::by(claim_id, AGENT_ACTOR, action, detail)
    }

    pub fn by(
        claim_id: ClaimId,
        actor: impl Into<String>,
        action: impl Into<String>,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            id: AuditEventId::new_v7(),
            claim_id,
            actor: actor.into(),
            action: action.into(),
            detail,
            recorded_at: Utc::now(),
        }
    }
}

/// Fields written back to the store after a pass or an audit decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimUpdate {
    pub status: ClaimStatus,
    pub detected_amount: Option<Decimal>,
    pub detected_currency: Currency,
    pub outcome: Option<VerificationOutcome>,
    pub ai_result: Option<String>,
    pub confidence: f64,
    pub receipt_type: ReceiptType,
    pub operation_number: Option<String>,
    pub receipt_date: Option<NaiveDate>,
    pub image_fingerprint: Option<String>,
    pub warnings: Vec<FraudWarning>,
    pub period: ReportingPeriod,
    pub auditor_comment: Option<String>,
    pub audited_at: Option<DateTime<Utc>>,
}

impl From<&Claim> for ClaimUpdate {
    fn from(claim: &Claim) -> Self {
        Self {
            status: claim.status,
            detected_amount: claim.detected_amount.map(|m| m.amount()),
            detected_currency: claim
                .detected_amount
                .map(|m| m.currency())
                .unwrap_or_else(|| claim.currency()),
            outcome: claim.outcome,
            ai_result: claim.ai_result.clone(),
            confidence: claim.confidence,
            receipt_type: claim.receipt_type,
            operation_number: claim.operation_number.clone(),
            receipt_date: claim.receipt_date,
            image_fingerprint: claim.image_fingerprint.clone(),
            warnings: claim.warnings.clone(),
            period: claim.reporting_period(),
            auditor_comment: claim.auditor_comment.clone(),
            audited_at: claim.audited_at,
        }
    }
}

impl ClaimUpdate {
    /// Copies the update onto an in-memory claim
    pub fn apply_to(&self, claim: &mut Claim) {
        claim.status = self.status;
        claim.detected_amount = self
            .detected_amount
            .map(|a| Money::new(a, self.detected_currency));
        claim.outcome = self.outcome;
        claim.ai_result = self.ai_result.clone();
        claim.confidence = self.confidence;
        claim.receipt_type = self.receipt_type;
        claim.operation_number = self.operation_number.clone();
        claim.receipt_date = self.receipt_date;
        claim.image_fingerprint = self.image_fingerprint.clone();
        claim.warnings = self.warnings.clone();
        claim.auditor_comment = self.auditor_comment.clone();
        claim.audited_at = self.audited_at;
        claim.updated_at = Utc::now();
    }
}

/// The record store holding claims and their audit trail
#[async_trait]
pub trait ClaimStore: DomainPort + HealthCheckable {
    /// Claims waiting for verification, oldest first
    async fn fetch_pending(&self, limit: u32) -> Result<Vec<Claim>, PortError>;

    async fn get(&self, id: ClaimId) -> Result<Claim, PortError>;

    /// Writes `update` only while the stored claim is still in `expected`.
    /// A claim that has moved on is a `PortError::Conflict`.
    async fn update(
        &self,
        id: ClaimId,
        expected: ClaimStatus,
        update: &ClaimUpdate,
    ) -> Result<(), PortError>;

    async fn append_audit_event(&self, event: &AuditEvent) -> Result<(), PortError>;
}

// ============================================================================
// Mock Implementations (for testing)
// ============================================================================

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::RwLock;

    use core_kernel::{AdapterHealth, HealthCheckResult};

    /// In-memory claim store that also answers history lookups
    #[derive(Debug, Default)]
    pub struct MockClaimStore {
        claims: Arc<RwLock<HashMap<ClaimId, Claim>>>,
        events: Arc<RwLock<Vec<AuditEvent>>>,
        history_down: AtomicBool,
    }

    impl MockClaimStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-populates with claims for testing
        pub async fn with_claims(claims: Vec<Claim>) -> Self {
            let store = Self::new();
            for claim in claims {
                store.insert(claim).await;
            }
            store
        }

        pub async fn insert(&self, claim: Claim) {
            self.claims.write().await.insert(claim.id, claim);
        }

        /// Makes every history lookup fail with a connection error
        pub fn fail_history(&self, down: bool) {
            self.history_down.store(down, Ordering::SeqCst);
        }

        pub async fn events(&self) -> Vec<AuditEvent> {
            self.events.read().await.clone()
        }

        pub async fn events_for(&self, claim_id: ClaimId) -> Vec<AuditEvent> {
            self.events
                .read()
                .await
                .iter()
                .filter(|e| e.claim_id == claim_id)
                .cloned()
                .collect()
        }

        fn check_history(&self) -> Result<(), PortError> {
            if self.history_down.load(Ordering::SeqCst) {
                return Err(PortError::connection("history unavailable"));
            }
            Ok(())
        }

        async fn find_where<F>(&self, exclude: ClaimId, pred: F) -> Option<PriorClaim>
        where
            F: Fn(&Claim) -> bool,
        {
            let claims = self.claims.read().await;
            let mut hits: Vec<&Claim> = claims
                .values()
                .filter(|c| c.id != exclude && pred(c))
                .collect();
            hits.sort_by_key(|c| c.created_at);
            hits.first().map(|c| PriorClaim {
                id: c.id,
                created_at: c.created_at,
                reported_amount: c.reported_amount.amount(),
                status: c.status,
            })
        }
    }

    impl DomainPort for MockClaimStore {}

    #[async_trait]
    impl HealthCheckable for MockClaimStore {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult {
                adapter_id: "mock-claim-store".to_string(),
                status: AdapterHealth::Healthy,
                latency_ms: 0,
                message: Some("Mock adapter always healthy".to_string()),
                checked_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl ClaimStore for MockClaimStore {
        async fn fetch_pending(&self, limit: u32) -> Result<Vec<Claim>, PortError> {
            let claims = self.claims.read().await;
            let mut pending: Vec<Claim> = claims
                .values()
                .filter(|c| c.status == ClaimStatus::PendingOcr)
                .cloned()
                .collect();
            pending.sort_by_key(|c| c.created_at);
            pending.truncate(limit as usize);
            Ok(pending)
        }

        async fn get(&self, id: ClaimId) -> Result<Claim, PortError> {
            self.claims
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Claim", id))
        }

        async fn update(
            &self,
            id: ClaimId,
            expected: ClaimStatus,
            update: &ClaimUpdate,
        ) -> Result<(), PortError> {
            let mut claims = self.claims.write().await;
            let claim = claims
                .get_mut(&id)
                .ok_or_else(|| PortError::not_found("Claim", id))?;
            if claim.status != expected {
                return Err(PortError::conflict(format!(
                    "claim {} is {}, expected {}",
                    id, claim.status, expected
                )));
            }
            update.apply_to(claim);
            Ok(())
        }

        async fn append_audit_event(&self, event: &AuditEvent) -> Result<(), PortError> {
            self.events.write().await.push(event.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl HistoryPort for MockClaimStore {
        async fn find_by_fingerprint(
            &self,
            fingerprint: &Fingerprint,
            exclude: ClaimId,
        ) -> Result<Option<PriorClaim>, PortError> {
            self.check_history()?;
            Ok(self
                .find_where(exclude, |c| {
                    c.image_fingerprint.as_deref() == Some(fingerprint.as_str())
                })
                .await)
        }

        async fn find_by_operation_number(
            &self,
            operation_number: &str,
            exclude: ClaimId,
        ) -> Result<Option<PriorClaim>, PortError> {
            self.check_history()?;
            Ok(self
                .find_where(exclude, |c| c.operation_number.as_deref() == Some(operation_number))
                .await)
        }

        async fn publish_identity(
            &self,
            claim_id: ClaimId,
            fingerprint: Option<&Fingerprint>,
            operation_number: Option<&str>,
        ) -> Result<(), PortError> {
            self.check_history()?;
            let mut claims = self.claims.write().await;
            if let Some(claim) = claims.get_mut(&claim_id) {
                if let Some(fp) = fingerprint {
                    claim.image_fingerprint = Some(fp.to_string());
                }
                if let Some(number) = operation_number {
                    claim.operation_number = Some(number.to_string());
                }
            }
            Ok(())
        }
    }

    #[derive(Debug, Clone)]
    enum Behaviour {
        Respond,
        Fail,
        Hang(Duration),
    }

    /// Scripted OCR provider
    ///
    /// Responses are handed out in call order, repeating the last one.
    #[derive(Debug)]
    pub struct MockOcrProvider {
        name: String,
        responses: Vec<Recognition>,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl MockOcrProvider {
        pub fn returning(name: &str, text: &str, confidence: f64) -> Self {
            Self::scripted(name, vec![Recognition::new(text, confidence)])
        }

        pub fn scripted(name: &str, responses: Vec<Recognition>) -> Self {
            Self {
                name: name.to_string(),
                responses,
                behaviour: Behaviour::Respond,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(name: &str) -> Self {
            Self {
                behaviour: Behaviour::Fail,
                ..Self::scripted(name, Vec::new())
            }
        }

        /// Sleeps before answering, for timeout tests
        pub fn hanging(name: &str, delay: Duration) -> Self {
            Self {
                behaviour: Behaviour::Hang(delay),
                ..Self::scripted(name, vec![Recognition::new("late", 1.0)])
            }
        }

        /// Answers as scripted, but only after `delay`
        pub fn delayed(mut self, delay: Duration) -> Self {
            self.behaviour = Behaviour::Hang(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DomainPort for MockOcrProvider {}

    #[async_trait]
    impl OcrProvider for MockOcrProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn recognize(&self, _image: &[u8]) -> Result<Recognition, PortError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Fail => {
                    return Err(PortError::ServiceUnavailable {
                        service: self.name.clone(),
                    })
                }
                Behaviour::Hang(delay) => tokio::time::sleep(*delay).await,
                Behaviour::Respond => {}
            }
            let index = call.min(self.responses.len().saturating_sub(1));
            Ok(self
                .responses
                .get(index)
                .cloned()
                .unwrap_or_else(Recognition::empty))
        }
    }

    /// Evidence source backed by a map of reference to bytes
    #[derive(Debug, Clone, Default)]
    pub struct MockEvidenceSource {
        files: HashMap<String, Vec<u8>>,
    }

    impl MockEvidenceSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_file(mut self, reference: &str, bytes: Vec<u8>) -> Self {
            self.files.insert(reference.to_string(), bytes);
            self
        }
    }

    impl DomainPort for MockEvidenceSource {}

    #[async_trait]
    impl EvidenceSource for MockEvidenceSource {
        async fn fetch(&self, reference: &str) -> Result<Vec<u8>, PortError> {
            self.files
                .get(reference)
                .cloned()
                .ok_or_else(|| PortError::not_found("Evidence", reference))
        }
    }

    /// Preprocessor that returns its input, or always fails
    #[derive(Debug, Clone, Default)]
    pub struct MockPreprocessor {
        fail: bool,
    }

    impl MockPreprocessor {
        pub fn passthrough() -> Self {
            Self { fail: false }
        }

        pub fn failing() -> Self {
            Self { fail: true }
        }
    }

    impl DomainPort for MockPreprocessor {}

    #[async_trait]
    impl ImagePreprocessor for MockPreprocessor {
        async fn normalize(&self, image: &[u8]) -> Result<Vec<u8>, PortError> {
            if self.fail {
                return Err(PortError::decoding("unsupported image"));
            }
            Ok(image.to_vec())
        }
    }
}
