//! Worker and HTTP surface tests against in-memory adapters

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::watch;

use core_kernel::{
    AdapterHealth, ClaimId, DomainPort, HealthCheckResult, HealthCheckable, PortError,
};
use domain_verification::{
    AuditEvent, Claim, ClaimStatus, ClaimStore, ClaimUpdate, MockClaimStore, MockOcrProvider,
    VerificationPipeline,
};
use interface_agent::{create_router, AppState, Worker, WorkerSettings};
use test_utils::{ClaimBuilder, ImageFixtures, PipelineHarness, ReceiptTexts};

const UPLOADS: u8 = 8;

fn upload(n: u8) -> String {
    format!("uploads/claim-{}.jpg", n)
}

/// Pipeline whose only tier confidently reads 20.00 from every upload
fn approving_pipeline() -> (Arc<VerificationPipeline>, Arc<MockClaimStore>) {
    let tesseract = Arc::new(MockOcrProvider::returning(
        "tesseract",
        &ReceiptTexts::didi_completed("20.00"),
        0.9,
    ));
    let harness = (0..UPLOADS).fold(PipelineHarness::new(), |harness, n| {
        harness.with_evidence(&upload(n), ImageFixtures::receipt_png(n * 20))
    });
    let (pipeline, store) = harness.with_tier(tesseract, 0.85).build_with_store();
    (Arc::new(pipeline), store)
}

/// A pending claim with its own image, so duplicate checks stay quiet
fn pending_claim(n: u8) -> Claim {
    ClaimBuilder::new().with_transport_image(upload(n)).build()
}

fn quick_settings(batch_size: u32) -> WorkerSettings {
    WorkerSettings {
        batch_size,
        claim_pause: Duration::ZERO,
        poll_interval: Duration::from_millis(10),
        error_backoff: Duration::from_millis(10),
    }
}

/// Store whose every operation fails as if the database were down
struct UnreachableStore;

impl DomainPort for UnreachableStore {}

#[async_trait]
impl HealthCheckable for UnreachableStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            adapter_id: "unreachable".to_string(),
            status: AdapterHealth::Unhealthy,
            latency_ms: 0,
            message: Some("connection refused".to_string()),
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ClaimStore for UnreachableStore {
    async fn fetch_pending(&self, _limit: u32) -> Result<Vec<Claim>, PortError> {
        Err(PortError::connection("connection refused"))
    }

    async fn get(&self, _id: ClaimId) -> Result<Claim, PortError> {
        Err(PortError::connection("connection refused"))
    }

    async fn update(
        &self,
        _id: ClaimId,
        _expected: ClaimStatus,
        _update: &ClaimUpdate,
    ) -> Result<(), PortError> {
        Err(PortError::connection("connection refused"))
    }

    async fn append_audit_event(&self, _event: &AuditEvent) -> Result<(), PortError> {
        Err(PortError::connection("connection refused"))
    }
}

async fn wait_for_status(store: &MockClaimStore, id: ClaimId, status: ClaimStatus) -> Claim {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let claim = store.get(id).await.unwrap();
            if claim.status == status {
                return claim;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("claim never reached the expected status")
}

mod worker {
    use super::*;

    #[tokio::test]
    async fn test_batch_is_bounded_and_verified() {
        let (pipeline, store) = approving_pipeline();
        for n in 0..3 {
            store.insert(pending_claim(n)).await;
        }
        store
            .insert(ClaimBuilder::new().with_status(ClaimStatus::Approved).build())
            .await;

        let worker = Worker::new(pipeline, store.clone(), quick_settings(2));
        let (_tx, rx) = watch::channel(false);
        let report = worker.run_batch(&rx).await.unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(report.verified, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(store.fetch_pending(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_leaves_batch_untouched() {
        let (pipeline, store) = approving_pipeline();
        store.insert(pending_claim(0)).await;

        let worker = Worker::new(pipeline, store.clone(), quick_settings(5));
        let (_tx, rx) = watch::channel(true);
        let report = worker.run_batch(&rx).await.unwrap();

        assert_eq!(report.fetched, 1);
        assert_eq!(report.verified, 0);
        assert_eq!(store.fetch_pending(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_returned() {
        let (pipeline, _) = approving_pipeline();
        let worker = Worker::new(pipeline, Arc::new(UnreachableStore), quick_settings(5));
        let (_tx, rx) = watch::channel(false);

        let err = worker.run_batch(&rx).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_loop_drains_queue_and_stops_on_shutdown() {
        let (pipeline, store) = approving_pipeline();
        let mut ids = Vec::new();
        for n in 0..4 {
            let claim = pending_claim(n);
            ids.push(claim.id);
            store.insert(claim).await;
        }

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Worker::new(pipeline, store.clone(), quick_settings(3)).run(rx));

        for id in ids {
            wait_for_status(&store, id, ClaimStatus::Approved).await;
        }
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_loop_survives_store_outage() {
        let (pipeline, _) = approving_pipeline();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(
            Worker::new(pipeline, Arc::new(UnreachableStore), quick_settings(5)).run(rx),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}

mod health {
    use super::*;

    #[tokio::test]
    async fn test_liveness() {
        let (pipeline, store) = approving_pipeline();
        let server = TestServer::new(create_router(AppState::new(pipeline, store))).unwrap();

        let response = server.get("/health").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "healthy");
        assert!(!response.header("x-request-id").is_empty());
    }

    #[tokio::test]
    async fn test_caller_request_id_is_echoed() {
        let (pipeline, store) = approving_pipeline();
        let server = TestServer::new(create_router(AppState::new(pipeline, store))).unwrap();

        let response = server
            .get("/health")
            .add_header(
                axum::http::HeaderName::from_static("x-request-id"),
                axum::http::HeaderValue::from_static("req-42"),
            )
            .await;
        assert_eq!(response.header("x-request-id"), "req-42");
    }

    #[tokio::test]
    async fn test_ready_reports_store_check() {
        let (pipeline, store) = approving_pipeline();
        let server = TestServer::new(create_router(AppState::new(pipeline, store))).unwrap();

        let response = server.get("/health/ready").await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["status"], "ready");
        assert_eq!(body["checks"][0]["adapter_id"], "mock-claim-store");
    }

    #[tokio::test]
    async fn test_not_ready_while_store_is_down() {
        let (pipeline, _) = approving_pipeline();
        let state = AppState::new(pipeline, Arc::new(UnreachableStore));
        let server = TestServer::new(create_router(state)).unwrap();

        let response = server.get("/health/ready").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.json::<Value>()["checks"][0]["status"], "unhealthy");
    }
}

mod reprocess {
    use super::*;

    fn parked_claim() -> Claim {
        ClaimBuilder::new()
            .with_transport_image(upload(5))
            .with_status(ClaimStatus::PendingAudit)
            .build()
    }

    /// Pipeline whose single tier takes a while to answer
    fn slow_pipeline() -> (Arc<VerificationPipeline>, Arc<MockClaimStore>, Arc<MockOcrProvider>) {
        let tesseract = Arc::new(
            MockOcrProvider::returning("tesseract", &ReceiptTexts::didi_completed("20.00"), 0.9)
                .delayed(Duration::from_millis(300)),
        );
        let (pipeline, store) = PipelineHarness::new()
            .with_evidence(&upload(5), ImageFixtures::receipt_png(100))
            .with_tier(tesseract.clone(), 0.85)
            .build_with_store();
        (Arc::new(pipeline), store, tesseract)
    }

    #[tokio::test]
    async fn test_worker_batch_never_picks_up_claim_being_reprocessed() {
        let (pipeline, store, tesseract) = slow_pipeline();
        let claim = parked_claim();
        store.insert(claim.clone()).await;

        let id = claim.id;
        let reprocess = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.reprocess(id, "AUDITOR").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let worker = Worker::new(pipeline.clone(), store.clone(), quick_settings(10));
        let (_tx, rx) = watch::channel(false);
        let report = worker.run_batch(&rx).await.unwrap();
        assert_eq!(report.fetched, 0);

        reprocess.await.unwrap().unwrap();
        assert_eq!(tesseract.calls(), 1);
        let passes = store
            .events_for(id)
            .await
            .into_iter()
            .filter(|e| e.action == "TESSERACT_RESULT")
            .count();
        assert_eq!(passes, 1);
        assert_eq!(store.get(id).await.unwrap().status, ClaimStatus::Approved);
    }

    #[tokio::test]
    async fn test_reprocess_while_running_is_conflict() {
        let (pipeline, store, tesseract) = slow_pipeline();
        let claim = parked_claim();
        store.insert(claim.clone()).await;
        let server =
            TestServer::new(create_router(AppState::new(pipeline, store.clone()))).unwrap();
        let path = format!("/api/v1/claims/{}/reprocess", claim.id.as_uuid());

        server.post(&path).await.assert_status(StatusCode::ACCEPTED);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let response = server.post(&path).await;
        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(response.json::<Value>()["error"], "conflict");

        wait_for_status(&store, claim.id, ClaimStatus::Approved).await;
        assert_eq!(tesseract.calls(), 1);
    }

    #[tokio::test]
    async fn test_parked_claim_is_accepted_and_verified() {
        let (pipeline, store) = approving_pipeline();
        let claim = parked_claim();
        store.insert(claim.clone()).await;
        let server =
            TestServer::new(create_router(AppState::new(pipeline, store.clone()))).unwrap();

        let response = server
            .post(&format!("/api/v1/claims/{}/reprocess", claim.id.as_uuid()))
            .json(&json!({ "requested_by": "auditor@example.com" }))
            .await;
        response.assert_status(StatusCode::ACCEPTED);
        assert_eq!(response.json::<Value>()["status"], "PENDING_OCR");

        wait_for_status(&store, claim.id, ClaimStatus::Approved).await;
        let events = store.events_for(claim.id).await;
        let request = events
            .iter()
            .find(|e| e.action == "REPROCESS_REQUESTED")
            .unwrap();
        assert_eq!(request.actor, "auditor@example.com");
    }

    #[tokio::test]
    async fn test_requester_defaults_without_body() {
        let (pipeline, store) = approving_pipeline();
        let claim = parked_claim();
        store.insert(claim.clone()).await;
        let server =
            TestServer::new(create_router(AppState::new(pipeline, store.clone()))).unwrap();

        server
            .post(&format!("/api/v1/claims/{}/reprocess", claim.id.as_uuid()))
            .await
            .assert_status(StatusCode::ACCEPTED);

        wait_for_status(&store, claim.id, ClaimStatus::Approved).await;
        let events = store.events_for(claim.id).await;
        assert!(events
            .iter()
            .any(|e| e.action == "REPROCESS_REQUESTED" && e.actor == "AUDITOR"));
    }

    #[tokio::test]
    async fn test_unknown_claim_is_not_found() {
        let (pipeline, store) = approving_pipeline();
        let server = TestServer::new(create_router(AppState::new(pipeline, store))).unwrap();

        let response = server
            .post(&format!("/api/v1/claims/{}/reprocess", uuid::Uuid::now_v7()))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["error"], "not_found");
    }

    #[tokio::test]
    async fn test_settled_claim_is_conflict() {
        let (pipeline, store) = approving_pipeline();
        let claim = ClaimBuilder::new().with_status(ClaimStatus::Approved).build();
        store.insert(claim.clone()).await;
        let server =
            TestServer::new(create_router(AppState::new(pipeline, store.clone()))).unwrap();

        server
            .post(&format!("/api/v1/claims/{}/reprocess", claim.id.as_uuid()))
            .await
            .assert_status(StatusCode::CONFLICT);
        assert_eq!(store.get(claim.id).await.unwrap().status, ClaimStatus::Approved);
    }

    #[tokio::test]
    async fn test_malformed_id_is_rejected() {
        let (pipeline, store) = approving_pipeline();
        let server = TestServer::new(create_router(AppState::new(pipeline, store))).unwrap();

        server
            .post("/api/v1/claims/not-a-uuid/reprocess")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
