//! Adapter tests against real processes and files
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use core_kernel::PortError;
use domain_verification::{
    ClaimStatus, ClaimStore, EvidenceSource, ImagePreprocessor, JoinStrategy, MockClaimStore,
    OcrProvider, Tier, VerificationConfig, VerificationPipeline,
};
use infra_ocr::{CommandOcrConfig, CommandOcrProvider, FsEvidenceSource, ImageNormalizer};
use test_utils::{ClaimBuilder, ImageFixtures};

/// An engine that prints `json` once it sees a non-empty image file
fn shell_engine(name: &str, json: &str) -> CommandOcrProvider {
    let script = format!("test -s \"$0\" && printf '%s' '{}'", json);
    CommandOcrProvider::new(CommandOcrConfig::new(name, "sh").arg("-c").arg(script))
}

mod command_engine {
    use super::*;

    #[tokio::test]
    async fn test_reads_engine_json() {
        let engine = shell_engine("tesseract", r#"{"text": "Total S/ 20.00", "confidence": 0.88}"#);
        let recognition = engine.recognize(&ImageFixtures::receipt_png(1)).await.unwrap();
        assert_eq!(recognition.text, "Total S/ 20.00");
        assert_eq!(recognition.confidence, 0.88);
        assert_eq!(engine.name(), "tesseract");
    }

    #[tokio::test]
    async fn test_failing_exit_status_is_an_error() {
        let engine = CommandOcrProvider::new(
            CommandOcrConfig::new("easyocr", "sh").arg("-c").arg("echo 'no model' >&2; exit 3"),
        );
        let err = engine.recognize(b"bytes").await.unwrap_err();
        assert!(err.to_string().contains("no model"));
    }

    #[tokio::test]
    async fn test_slow_engine_times_out() {
        let engine = CommandOcrProvider::new(
            CommandOcrConfig::new("paddle", "sh")
                .arg("-c")
                .arg("sleep 5")
                .timeout(Duration::from_millis(200)),
        );
        let err = engine.recognize(b"bytes").await.unwrap_err();
        assert!(matches!(err, PortError::Timeout { duration_ms: 200, .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let engine = CommandOcrProvider::new(CommandOcrConfig::new(
            "gemini",
            "/nonexistent/ocr-engine",
        ));
        let err = engine.recognize(b"bytes").await.unwrap_err();
        assert!(matches!(err, PortError::ServiceUnavailable { .. }));
    }
}

mod evidence_store {
    use super::*;

    #[tokio::test]
    async fn test_fetches_files_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("uploads")).unwrap();
        std::fs::write(dir.path().join("uploads/receipt.png"), b"png-bytes").unwrap();

        let source = FsEvidenceSource::new(dir.path());
        assert_eq!(source.fetch("uploads/receipt.png").await.unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsEvidenceSource::new(dir.path()).fetch("uploads/none.jpg").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_traversal_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsEvidenceSource::new(dir.path()).fetch("../outside.jpg").await.unwrap_err();
        assert!(matches!(err, PortError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_normalized_evidence_round_trips_through_engine() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("shot.png"), ImageFixtures::receipt_png(5)).unwrap();

        let bytes = FsEvidenceSource::new(dir.path()).fetch("shot.png").await.unwrap();
        let normalized = ImageNormalizer::default().normalize(&bytes).await.unwrap();
        assert_eq!(image::guess_format(&normalized).unwrap(), image::ImageFormat::Png);
    }
}

mod wired_pipeline {
    use super::*;

    #[tokio::test]
    async fn test_claim_is_approved_through_real_adapters() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("uploads")).unwrap();
        std::fs::write(dir.path().join("uploads/transport.jpg"), ImageFixtures::receipt_png(7))
            .unwrap();

        let engine = shell_engine(
            "tesseract",
            r#"{"text": "DiDi\nGracias por viajar\nTotal S/ 20.00", "confidence": 0.93}"#,
        );
        let store = Arc::new(MockClaimStore::new());
        let pipeline = VerificationPipeline::new(
            &VerificationConfig::default(),
            vec![Tier::new(Arc::new(engine), 0.85, JoinStrategy::BestOf)],
            store.clone(),
            store.clone(),
            Arc::new(FsEvidenceSource::new(dir.path())),
            Arc::new(ImageNormalizer::default()),
        );

        let mut claim = ClaimBuilder::new().build();
        store.insert(claim.clone()).await;
        let verdict = pipeline.process(&mut claim).await.unwrap();

        assert_eq!(verdict.status, ClaimStatus::Approved);
        let stored = store.get(claim.id).await.unwrap();
        assert_eq!(stored.status, ClaimStatus::Approved);
        assert!(stored.image_fingerprint.is_some());
    }
}
