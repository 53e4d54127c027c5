//! Verification Agent
//!
//! The long-running process around the verification pipeline: a polling
//! worker that drains claims waiting for verification, and a small HTTP
//! surface for probes and audit-driven reprocessing.
//!
//! # Routes
//!
//! - `GET /health` liveness
//! - `GET /health/ready` claim store reachable
//! - `POST /api/v1/claims/:id/reprocess` send a parked claim back through a pass
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_agent::{create_router, AppState};
//!
//! let app = create_router(AppState::new(pipeline, store));
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod telemetry;
pub mod wiring;
pub mod worker;

use std::sync::Arc;

use axum::{
    http::HeaderName,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use domain_verification::{ClaimStore, VerificationPipeline};

use crate::handlers::{claims, health};

pub use config::{AgentConfig, AgentConfigError};
pub use error::ApiError;
pub use worker::{BatchReport, Worker, WorkerSettings};

/// State shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<VerificationPipeline>,
    pub store: Arc<dyn ClaimStore>,
}

impl AppState {
    pub fn new(pipeline: Arc<VerificationPipeline>, store: Arc<dyn ClaimStore>) -> Self {
        Self { pipeline, store }
    }
}

/// Header carrying the per-request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Creates the agent router
///
/// Every response echoes an `x-request-id`, generated when the caller sent none.
pub fn create_router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let claim_routes = Router::new().route("/:id/reprocess", post(claims::reprocess_claim));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .nest("/api/v1/claims", claim_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .with_state(state)
}
