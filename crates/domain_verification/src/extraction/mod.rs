//! Field extraction from recognized receipt text
//!
//! Turns raw OCR output into the three structured fields the rest of the
//! pipeline needs: an amount, an operation number and a receipt date.
//! Extraction never fails; a field that cannot be found is `None`, which
//! callers treat as "insufficient signal" rather than zero.

pub mod amount;
pub mod date;
pub mod operation;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub use amount::{AmountCandidate, AmountExtractor, InvoiceBreakdown};
pub use date::extract_receipt_date;
pub use operation::extract_operation_number;

/// Inclusive range of amounts considered typical for a reimbursable trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min: Decimal,
    pub max: Decimal,
}

impl AmountRange {
    pub fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: Decimal) -> bool {
        value >= self.min && value <= self.max
    }
}

impl Default for AmountRange {
    fn default() -> Self {
        Self::new(dec!(5), dec!(200))
    }
}

/// Structured fields extracted from one piece of recognized text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    /// Winning amount candidate
    pub amount: Option<AmountCandidate>,
    /// Invoice breakdown when the text looked like a formal invoice
    pub invoice: Option<InvoiceBreakdown>,
    pub operation_number: Option<String>,
    pub receipt_date: Option<NaiveDate>,
}

impl ExtractedFields {
    pub fn amount_value(&self) -> Option<Decimal> {
        self.amount.as_ref().map(|a| a.value)
    }

    /// True when the amount came from the 3-digit rescaling fallback
    pub fn amount_is_heuristic(&self) -> bool {
        self.amount.as_ref().is_some_and(|a| a.heuristic)
    }
}

/// Runs all field extractors over a text
#[derive(Debug, Clone, Default)]
pub struct FieldExtractor {
    amounts: AmountExtractor,
}

impl FieldExtractor {
    pub fn new(typical_range: AmountRange) -> Self {
        Self {
            amounts: AmountExtractor::new(typical_range),
        }
    }

    pub fn amounts(&self) -> &AmountExtractor {
        &self.amounts
    }

    pub fn extract(&self, text: &str) -> ExtractedFields {
        let invoice = self.amounts.invoice_breakdown(text);
        let amount = self.amounts.best(text);
        let fields = ExtractedFields {
            amount,
            invoice,
            operation_number: extract_operation_number(text),
            receipt_date: extract_receipt_date(text),
        };
        tracing::debug!(
            amount = ?fields.amount_value(),
            rule = fields.amount.as_ref().map(|a| a.rule.as_str()),
            operation_number = ?fields.operation_number,
            receipt_date = ?fields.receipt_date,
            "Extracted receipt fields"
        );
        fields
    }
}

/// Collapses every whitespace run into a single space
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses an OCR number that may use a comma as decimal separator
pub(crate) fn parse_amount(raw: &str) -> Option<Decimal> {
    Decimal::from_str(&raw.replacen(',', ".", 1)).ok()
}
