//! PostgreSQL claim store
//!
//! Implements both the record store and the duplicate-history port over the
//! `reimbursements` table, and appends to `audit_logs`. Queries are built at
//! runtime so the crate compiles without a live database.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{
    AdapterHealth, ClaimId, DomainPort, HealthCheckResult, HealthCheckable, PortError,
};
use domain_verification::{
    AuditEvent, Claim, ClaimStatus, ClaimStore, ClaimUpdate, Fingerprint, HistoryPort, PriorClaim,
};

use crate::error::DatabaseError;
use crate::rows::{AuditLogRow, PriorClaimRow, ReimbursementRow, CLAIM_COLUMNS};

const ADAPTER_ID: &str = "postgres-claim-store";
/// Probes slower than this report the store as degraded
const SLOW_PROBE_MS: u64 = 500;

/// `ClaimStore` and `HistoryPort` backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PostgresClaimStore {
    pool: PgPool,
}

impl PostgresClaimStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Inserts a newly submitted claim
    #[instrument(skip(self, claim), fields(claim_id = %claim.id))]
    pub async fn insert(&self, claim: &Claim) -> Result<(), DatabaseError> {
        let period = claim.reporting_period();
        sqlx::query(
            r#"
            INSERT INTO reimbursements (
                id, type, reported_amount, currency, gasto_date,
                transport_image_url, cost_screenshot_url, receipt_url, status,
                operation_number, image_hash, fraud_warnings, week, month, year,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(claim.id.as_uuid())
        .bind(claim.claim_type.as_str())
        .bind(claim.reported_amount.amount())
        .bind(claim.currency().code())
        .bind(claim.expense_date)
        .bind(claim.evidence.transport_image.as_deref())
        .bind(claim.evidence.cost_screenshot.as_deref())
        .bind(claim.evidence.receipt.as_deref())
        .bind(claim.status.as_str())
        .bind(claim.operation_number.as_deref())
        .bind(claim.image_fingerprint.as_deref())
        .bind(Json(&claim.warnings))
        .bind(period.week as i32)
        .bind(period.month as i32)
        .bind(period.year)
        .bind(claim.created_at)
        .bind(claim.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, id: ClaimId) -> Result<Claim, DatabaseError> {
        let row: ReimbursementRow = sqlx::query_as(&format!(
            "SELECT {} FROM reimbursements WHERE id = $1",
            CLAIM_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Reimbursement", id))?;
        Claim::try_from(row)
    }

    /// Compare-and-set on the claim status; `Ok(false)` when the row exists
    /// but is no longer in `expected`
    async fn write(
        &self,
        id: ClaimId,
        expected: ClaimStatus,
        update: &ClaimUpdate,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE reimbursements SET
                status = $2,
                detected_amount = $3,
                detected_currency = $4,
                ai_outcome = $5,
                ai_result = $6,
                ai_confidence = $7,
                receipt_type = $8,
                operation_number = $9,
                receipt_date = $10,
                image_hash = $11,
                fraud_warnings = $12,
                week = $13,
                month = $14,
                year = $15,
                auditor_comment = $16,
                audited_at = $17,
                updated_at = $18
            WHERE id = $1 AND status = $19
            "#,
        )
        .bind(id.as_uuid())
        .bind(update.status.as_str())
        .bind(update.detected_amount)
        .bind(update.detected_amount.map(|_| update.detected_currency.code()))
        .bind(update.outcome.map(|o| o.as_str()))
        .bind(update.ai_result.as_deref())
        .bind(update.confidence)
        .bind(update.receipt_type.as_str())
        .bind(update.operation_number.as_deref())
        .bind(update.receipt_date)
        .bind(update.image_fingerprint.as_deref())
        .bind(Json(&update.warnings))
        .bind(update.period.week as i32)
        .bind(update.period.month as i32)
        .bind(update.period.year)
        .bind(update.auditor_comment.as_deref())
        .bind(update.audited_at)
        .bind(Utc::now())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM reimbursements WHERE id = $1)")
                .bind(id.as_uuid())
                .fetch_one(&self.pool)
                .await?;
        if !exists {
            return Err(DatabaseError::not_found("Reimbursement", id));
        }
        Ok(false)
    }

    async fn find_prior(
        &self,
        column: &'static str,
        value: &str,
        exclude: ClaimId,
    ) -> Result<Option<PriorClaim>, DatabaseError> {
        let row: Option<PriorClaimRow> = sqlx::query_as(&format!(
            "SELECT id, created_at, reported_amount, status FROM reimbursements \
             WHERE {} = $1 AND id <> $2 ORDER BY created_at ASC LIMIT 1",
            column
        ))
        .bind(value)
        .bind(exclude.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(PriorClaim::try_from).transpose()
    }

    /// Audit trail of one claim, oldest first
    pub async fn audit_trail(&self, id: ClaimId) -> Result<Vec<AuditEvent>, DatabaseError> {
        let rows: Vec<AuditLogRow> = sqlx::query_as(
            "SELECT id, reimbursement_id, actor, action, detail, created_at \
             FROM audit_logs WHERE reimbursement_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AuditEvent::from).collect())
    }
}

impl DomainPort for PostgresClaimStore {}

#[async_trait]
impl HealthCheckable for PostgresClaimStore {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();
        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (status, message) = match result {
            Ok(_) if latency_ms > SLOW_PROBE_MS => (
                AdapterHealth::Degraded,
                Some(format!("Probe took {}ms", latency_ms)),
            ),
            Ok(_) => (AdapterHealth::Healthy, None),
            Err(e) => (AdapterHealth::Unhealthy, Some(format!("Database error: {}", e))),
        };
        HealthCheckResult {
            adapter_id: ADAPTER_ID.to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ClaimStore for PostgresClaimStore {
    #[instrument(skip(self))]
    async fn fetch_pending(&self, limit: u32) -> Result<Vec<Claim>, PortError> {
        let rows: Vec<ReimbursementRow> = sqlx::query_as(&format!(
            "SELECT {} FROM reimbursements WHERE status = 'PENDING_OCR' \
             ORDER BY created_at ASC LIMIT $1",
            CLAIM_COLUMNS
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        debug!(count = rows.len(), "Fetched pending claims");
        rows.into_iter()
            .map(|row| Claim::try_from(row).map_err(PortError::from))
            .collect()
    }

    async fn get(&self, id: ClaimId) -> Result<Claim, PortError> {
        Ok(self.load(id).await?)
    }

    #[instrument(skip(self, update), fields(status = %update.status))]
    async fn update(
        &self,
        id: ClaimId,
        expected: ClaimStatus,
        update: &ClaimUpdate,
    ) -> Result<(), PortError> {
        if self.write(id, expected, update).await? {
            Ok(())
        } else {
            Err(PortError::conflict(format!(
                "reimbursement {} is no longer {}",
                id, expected
            )))
        }
    }

    #[instrument(skip(self, event), fields(claim_id = %event.claim_id, action = %event.action))]
    async fn append_audit_event(&self, event: &AuditEvent) -> Result<(), PortError> {
        sqlx::query(
            "INSERT INTO audit_logs (id, reimbursement_id, actor, action, detail, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.id.as_uuid())
        .bind(event.claim_id.as_uuid())
        .bind(&event.actor)
        .bind(&event.action)
        .bind(&event.detail)
        .bind(event.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(())
    }
}

#[async_trait]
impl HistoryPort for PostgresClaimStore {
    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        exclude: ClaimId,
    ) -> Result<Option<PriorClaim>, PortError> {
        Ok(self.find_prior("image_hash", fingerprint.as_str(), exclude).await?)
    }

    async fn find_by_operation_number(
        &self,
        operation_number: &str,
        exclude: ClaimId,
    ) -> Result<Option<PriorClaim>, PortError> {
        Ok(self.find_prior("operation_number", operation_number, exclude).await?)
    }

    #[instrument(skip(self, fingerprint))]
    async fn publish_identity(
        &self,
        claim_id: ClaimId,
        fingerprint: Option<&Fingerprint>,
        operation_number: Option<&str>,
    ) -> Result<(), PortError> {
        sqlx::query(
            "UPDATE reimbursements SET \
                image_hash = COALESCE($2, image_hash), \
                operation_number = COALESCE($3, operation_number), \
                updated_at = now() \
             WHERE id = $1",
        )
        .bind(claim_id.as_uuid())
        .bind(fingerprint.map(|f| f.as_str()))
        .bind(operation_number)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(())
    }
}
