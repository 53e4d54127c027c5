//! Claim handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use core_kernel::ClaimId;
use domain_verification::{ClaimStatus, ClaimStore};

use crate::error::ApiError;
use crate::AppState;

/// Actor recorded when the caller does not name one
pub const DEFAULT_REQUESTER: &str = "AUDITOR";

#[derive(Debug, Default, Deserialize)]
pub struct ReprocessRequest {
    pub requested_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReprocessAccepted {
    pub claim_id: String,
    pub status: ClaimStatus,
}

/// Sends a claim parked for audit back through verification
///
/// Answers once the claim is known to be eligible; the pass itself runs in
/// the background. The reported status is the one the pass starts from; the
/// stored claim keeps PENDING_AUDIT until the new verdict is written.
pub async fn reprocess_claim(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ReprocessRequest>>,
) -> Result<(StatusCode, Json<ReprocessAccepted>), ApiError> {
    let claim_id = ClaimId::from_uuid(id);
    let claim = state.store.get(claim_id).await?;
    if claim.status != ClaimStatus::PendingAudit {
        return Err(ApiError::Conflict(format!(
            "Claim {} is {}, only claims pending audit can be reprocessed",
            claim_id, claim.status
        )));
    }
    if state.pipeline.is_verifying(claim_id) {
        return Err(ApiError::Conflict(format!(
            "Claim {} is already being verified",
            claim_id
        )));
    }

    let requested_by = body
        .and_then(|Json(req)| req.requested_by)
        .filter(|who| !who.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REQUESTER.to_string());
    info!(claim_id = %claim_id, requested_by = %requested_by, "Reprocess requested");

    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        if let Err(e) = pipeline.reprocess(claim_id, &requested_by).await {
            error!(claim_id = %claim_id, error = %e, "Reprocess failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(ReprocessAccepted {
            claim_id: claim_id.to_string(),
            status: ClaimStatus::PendingOcr,
        }),
    ))
}
