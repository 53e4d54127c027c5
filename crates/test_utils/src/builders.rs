//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use chrono::NaiveDate;
use core_kernel::{Money, Timezone};
use domain_verification::{
    Claim, ClaimStatus, ClaimType, DailyCallBudget, Evidence, JoinStrategy, MockClaimStore,
    MockEvidenceSource, MockOcrProvider, MockPreprocessor, Tier, VerificationConfig,
    VerificationPipeline,
};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::fixtures::{MoneyFixtures, TemporalFixtures};

/// Builder for constructing test claims
pub struct ClaimBuilder {
    claim_type: ClaimType,
    reported_amount: Money,
    expense_date: NaiveDate,
    evidence: Evidence,
    status: ClaimStatus,
    operation_number: Option<String>,
    image_fingerprint: Option<String>,
}

impl Default for ClaimBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimBuilder {
    /// Creates a taxi claim for S/ 20.00 with one transport image
    pub fn new() -> Self {
        Self {
            claim_type: ClaimType::Taxi,
            reported_amount: MoneyFixtures::pen_20(),
            expense_date: TemporalFixtures::expense_date(),
            evidence: Evidence {
                transport_image: Some("uploads/transport.jpg".to_string()),
                cost_screenshot: None,
                receipt: None,
            },
            status: ClaimStatus::PendingOcr,
            operation_number: None,
            image_fingerprint: None,
        }
    }

    pub fn with_claim_type(mut self, claim_type: ClaimType) -> Self {
        self.claim_type = claim_type;
        self
    }

    /// Sets the reported amount in PEN
    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.reported_amount = MoneyFixtures::pen(amount);
        self
    }

    pub fn with_expense_date(mut self, date: NaiveDate) -> Self {
        self.expense_date = date;
        self
    }

    pub fn with_transport_image(mut self, reference: impl Into<String>) -> Self {
        self.evidence.transport_image = Some(reference.into());
        self
    }

    pub fn with_cost_screenshot(mut self, reference: impl Into<String>) -> Self {
        self.evidence.cost_screenshot = Some(reference.into());
        self
    }

    pub fn with_receipt(mut self, reference: impl Into<String>) -> Self {
        self.evidence.receipt = Some(reference.into());
        self
    }

    /// Removes every evidence reference
    pub fn without_evidence(mut self) -> Self {
        self.evidence = Evidence::default();
        self
    }

    pub fn with_status(mut self, status: ClaimStatus) -> Self {
        self.status = status;
        self
    }

    /// Marks the claim as having already used an operation number
    pub fn with_operation_number(mut self, number: impl Into<String>) -> Self {
        self.operation_number = Some(number.into());
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.image_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn build(self) -> Claim {
        let mut claim = Claim::submit(
            self.claim_type,
            self.reported_amount,
            self.expense_date,
            self.evidence,
        )
        .expect("Test claim must be valid");
        claim.status = self.status;
        claim.operation_number = self.operation_number;
        claim.image_fingerprint = self.image_fingerprint;
        claim
    }
}

/// Wires a verification pipeline to in-memory adapters
pub struct PipelineHarness {
    pub store: Arc<MockClaimStore>,
    pub config: VerificationConfig,
    evidence: MockEvidenceSource,
    preprocessor: MockPreprocessor,
    tiers: Vec<Tier>,
}

impl Default for PipelineHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineHarness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MockClaimStore::new()),
            config: VerificationConfig::default(),
            evidence: MockEvidenceSource::new(),
            preprocessor: MockPreprocessor::passthrough(),
            tiers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: VerificationConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers evidence bytes under a reference
    pub fn with_evidence(mut self, reference: &str, bytes: Vec<u8>) -> Self {
        self.evidence = self.evidence.with_file(reference, bytes);
        self
    }

    pub fn with_failing_preprocessor(mut self) -> Self {
        self.preprocessor = MockPreprocessor::failing();
        self
    }

    /// Appends a tier that keeps the best per-image attempt
    pub fn with_tier(mut self, provider: Arc<MockOcrProvider>, threshold: f64) -> Self {
        self.tiers.push(Tier::new(provider, threshold, JoinStrategy::BestOf));
        self
    }

    /// Appends a tier that concatenates per-image texts
    pub fn with_concatenating_tier(mut self, provider: Arc<MockOcrProvider>, threshold: f64) -> Self {
        self.tiers.push(Tier::new(provider, threshold, JoinStrategy::Concatenate));
        self
    }

    /// Appends a tier gated by a daily budget
    pub fn with_budgeted_tier(
        mut self,
        provider: Arc<MockOcrProvider>,
        threshold: f64,
        budget: Arc<DailyCallBudget>,
    ) -> Self {
        self.tiers
            .push(Tier::new(provider, threshold, JoinStrategy::Concatenate).with_budget(budget));
        self
    }

    /// A budget in the configured timezone
    pub fn budget(limit: u32) -> Arc<DailyCallBudget> {
        Arc::new(DailyCallBudget::new(limit, Timezone::default()))
    }

    /// The registered evidence, for wiring a pipeline to another store
    pub fn evidence_source(&self) -> Arc<MockEvidenceSource> {
        Arc::new(self.evidence.clone())
    }

    pub fn preprocessor(&self) -> Arc<MockPreprocessor> {
        Arc::new(self.preprocessor.clone())
    }

    pub fn build(self) -> VerificationPipeline {
        VerificationPipeline::new(
            &self.config,
            self.tiers,
            self.store.clone(),
            self.store,
            Arc::new(self.evidence),
            Arc::new(self.preprocessor),
        )
    }

    /// Builds the pipeline and keeps a handle on the store
    pub fn build_with_store(self) -> (VerificationPipeline, Arc<MockClaimStore>) {
        let store = self.store.clone();
        (self.build(), store)
    }
}
