//! Row types of the `reimbursements` and `audit_logs` tables

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use core_kernel::{AuditEventId, ClaimId, Currency, Money};
use domain_verification::{
    AuditEvent, Claim, ClaimStatus, ClaimType, Evidence, FraudWarning, PriorClaim, ReceiptType,
    VerificationOutcome,
};

use crate::error::DatabaseError;

/// Column list shared by every query returning a full claim
pub(crate) const CLAIM_COLUMNS: &str = "id, type, reported_amount, currency, gasto_date, \
    transport_image_url, cost_screenshot_url, receipt_url, status, detected_amount, \
    detected_currency, ai_outcome, ai_result, ai_confidence, receipt_type, operation_number, \
    receipt_date, image_hash, fraud_warnings, auditor_comment, audited_at, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct ReimbursementRow {
    pub id: Uuid,
    #[sqlx(rename = "type")]
    pub claim_type: String,
    pub reported_amount: Decimal,
    pub currency: String,
    pub gasto_date: NaiveDate,
    pub transport_image_url: Option<String>,
    pub cost_screenshot_url: Option<String>,
    pub receipt_url: Option<String>,
    pub status: String,
    pub detected_amount: Option<Decimal>,
    pub detected_currency: Option<String>,
    pub ai_outcome: Option<String>,
    pub ai_result: Option<String>,
    pub ai_confidence: f64,
    pub receipt_type: String,
    pub operation_number: Option<String>,
    pub receipt_date: Option<NaiveDate>,
    pub image_hash: Option<String>,
    pub fraud_warnings: Json<Vec<FraudWarning>>,
    pub auditor_comment: Option<String>,
    pub audited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn decode<T, E: std::fmt::Display>(field: &str, result: Result<T, E>) -> Result<T, DatabaseError> {
    result.map_err(|e| DatabaseError::SerializationError(format!("{}: {}", field, e)))
}

impl TryFrom<ReimbursementRow> for Claim {
    type Error = DatabaseError;

    fn try_from(row: ReimbursementRow) -> Result<Self, Self::Error> {
        let currency: Currency = decode("currency", row.currency.parse())?;
        let detected_currency = match row.detected_currency.as_deref() {
            Some(code) => decode("detected_currency", code.parse::<Currency>())?,
            None => currency,
        };
        let outcome = row
            .ai_outcome
            .as_deref()
            .map(|o| decode("ai_outcome", o.parse::<VerificationOutcome>()))
            .transpose()?;

        Ok(Claim {
            id: ClaimId::from_uuid(row.id),
            claim_type: decode("type", row.claim_type.parse::<ClaimType>())?,
            reported_amount: Money::new(row.reported_amount, currency),
            expense_date: row.gasto_date,
            evidence: Evidence {
                transport_image: row.transport_image_url,
                cost_screenshot: row.cost_screenshot_url,
                receipt: row.receipt_url,
            },
            status: decode("status", row.status.parse::<ClaimStatus>())?,
            detected_amount: row.detected_amount.map(|a| Money::new(a, detected_currency)),
            outcome,
            ai_result: row.ai_result,
            confidence: row.ai_confidence,
            receipt_type: decode("receipt_type", row.receipt_type.parse::<ReceiptType>())?,
            operation_number: row.operation_number,
            receipt_date: row.receipt_date,
            image_fingerprint: row.image_hash,
            warnings: row.fraud_warnings.0,
            auditor_comment: row.auditor_comment,
            audited_at: row.audited_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Summary columns read by duplicate lookups
#[derive(Debug, Clone, FromRow)]
pub struct PriorClaimRow {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub reported_amount: Decimal,
    pub status: String,
}

impl TryFrom<PriorClaimRow> for PriorClaim {
    type Error = DatabaseError;

    fn try_from(row: PriorClaimRow) -> Result<Self, Self::Error> {
        Ok(PriorClaim {
            id: ClaimId::from_uuid(row.id),
            created_at: row.created_at,
            reported_amount: row.reported_amount,
            status: decode("status", row.status.parse::<ClaimStatus>())?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AuditLogRow {
    pub id: Uuid,
    pub reimbursement_id: Uuid,
    pub actor: String,
    pub action: String,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<AuditLogRow> for AuditEvent {
    fn from(row: AuditLogRow) -> Self {
        AuditEvent {
            id: AuditEventId::from_uuid(row.id),
            claim_id: ClaimId::from_uuid(row.reimbursement_id),
            actor: row.actor,
            action: row.action,
            detail: row.detail,
            recorded_at: row.created_at,
        }
    }
}
