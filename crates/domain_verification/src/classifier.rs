//! Receipt type classification
//!
//! Separates proof of a completed transaction from screenshots taken before
//! the transaction happened (price negotiation, driver search, fare
//! estimates). Detection is keyword based and runs in two ordered groups:
//!
//! 1. Pre-transaction detectors. Any hit marks the receipt invalid with a
//!    CRITICAL warning and the completed-transaction group is skipped.
//! 2. Completed-transaction detectors. The last one that fires sets the label.
//!
//! A valid receipt must then also show a completion phrase, and wallet or
//! invoice receipts must show an operation number.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::extraction::{collapse_whitespace, ExtractedFields};
use crate::warning::{Action, FraudWarning, Severity, WarningKind};

/// Receipt family inferred from the recognized text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiptType {
    #[default]
    Unknown,
    DidiNegotiation,
    DidiSearching,
    BeatNegotiation,
    UberEstimate,
    DidiAccepted,
    DidiCompleted,
    BeatCompleted,
    UberReceipt,
    YapeTransaction,
    Invoice,
}

impl ReceiptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptType::Unknown => "UNKNOWN",
            ReceiptType::DidiNegotiation => "DIDI_NEGOTIATION",
            ReceiptType::DidiSearching => "DIDI_SEARCHING",
            ReceiptType::BeatNegotiation => "BEAT_NEGOTIATION",
            ReceiptType::UberEstimate => "UBER_ESTIMATE",
            ReceiptType::DidiAccepted => "DIDI_ACCEPTED",
            ReceiptType::DidiCompleted => "DIDI_COMPLETED",
            ReceiptType::BeatCompleted => "BEAT_COMPLETED",
            ReceiptType::UberReceipt => "UBER_RECEIPT",
            ReceiptType::YapeTransaction => "YAPE_TRANSACTION",
            ReceiptType::Invoice => "INVOICE",
        }
    }

    /// Wallet transfers and formal invoices always print a reference number
    pub fn requires_operation_number(&self) -> bool {
        matches!(self, ReceiptType::YapeTransaction | ReceiptType::Invoice)
    }

    pub fn is_ride_hailing(&self) -> bool {
        matches!(
            self,
            ReceiptType::DidiAccepted
                | ReceiptType::DidiCompleted
                | ReceiptType::BeatCompleted
                | ReceiptType::UberReceipt
        )
    }
}

impl fmt::Display for ReceiptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReceiptType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = match s {
            "UNKNOWN" => ReceiptType::Unknown,
            "DIDI_NEGOTIATION" => ReceiptType::DidiNegotiation,
            "DIDI_SEARCHING" => ReceiptType::DidiSearching,
            "BEAT_NEGOTIATION" => ReceiptType::BeatNegotiation,
            "UBER_ESTIMATE" => ReceiptType::UberEstimate,
            "DIDI_ACCEPTED" => ReceiptType::DidiAccepted,
            "DIDI_COMPLETED" => ReceiptType::DidiCompleted,
            "BEAT_COMPLETED" => ReceiptType::BeatCompleted,
            "UBER_RECEIPT" => ReceiptType::UberReceipt,
            "YAPE_TRANSACTION" => ReceiptType::YapeTransaction,
            "INVOICE" => ReceiptType::Invoice,
            other => return Err(format!("unknown receipt type '{}'", other)),
        };
        Ok(t)
    }
}

/// Result of classifying one text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub receipt_type: ReceiptType,
    pub is_valid: bool,
    pub warnings: Vec<FraudWarning>,
    pub action: Action,
}

struct PreTransaction {
    phrases: &'static [&'static str],
    receipt_type: ReceiptType,
    kind: WarningKind,
    message: &'static str,
}

static PRE_TRANSACTION: [PreTransaction; 4] = [
    PreTransaction {
        phrases: &["pon tu precio", "negocia", "elige"],
        receipt_type: ReceiptType::DidiNegotiation,
        kind: WarningKind::NegotiationScreenshot,
        message: "Price negotiation screenshot is not proof of a trip",
    },
    PreTransaction {
        phrases: &["buscando conductor", "esperando conductor"],
        receipt_type: ReceiptType::DidiSearching,
        kind: WarningKind::SearchingDriver,
        message: "Driver search screenshot is not proof of a trip",
    },
    PreTransaction {
        phrases: &["hacer oferta", "proponer precio", "tu oferta"],
        receipt_type: ReceiptType::BeatNegotiation,
        kind: WarningKind::NegotiationScreenshot,
        message: "Fare offer screenshot is not proof of a trip",
    },
    PreTransaction {
        phrases: &["tarifa estimada", "precio estimado"],
        receipt_type: ReceiptType::UberEstimate,
        kind: WarningKind::EstimatedFare,
        message: "Estimated fare screenshot is not proof of a trip",
    },
];

static COMPLETION_PHRASES: [&str; 9] = [
    "viaje completado",
    "viaje finalizado",
    "gracias por viajar",
    "califica tu viaje",
    "trip completed",
    "viaje realizado",
    "transacción exitosa",
    "yapeo exitoso",
    "operación exitosa",
];

/// Plates such as AMY061 or A1-2345
static VEHICLE_PLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[a-z]{3}\d{3,4}|[a-z]\d{1,2}-\d{4}").expect("Invalid vehicle plate regex")
});

/// Classifies recognized receipt text
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiptClassifier;

impl ReceiptClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str, fields: &ExtractedFields) -> Classification {
        let clean = collapse_whitespace(text).to_lowercase();
        let mut warnings = Vec::new();

        let mut receipt_type = ReceiptType::Unknown;
        let mut is_valid = false;

        for detector in PRE_TRANSACTION.iter() {
            if contains_any(&clean, detector.phrases) {
                if receipt_type == ReceiptType::Unknown {
                    receipt_type = detector.receipt_type;
                }
                warnings.push(FraudWarning::new(
                    detector.kind,
                    Severity::Critical,
                    detector.message,
                ));
            }
        }

        if warnings.is_empty() {
            if let Some(completed) = completed_type(&clean, text) {
                receipt_type = completed;
                is_valid = true;
            }
        }

        if is_valid && !contains_any(&clean, &COMPLETION_PHRASES) {
            is_valid = false;
            warnings.push(FraudWarning::new(
                WarningKind::NoCompletionProof,
                Severity::High,
                "No trip or payment completion confirmation found",
            ));
        }

        if receipt_type.requires_operation_number() && fields.operation_number.is_none() {
            warnings.push(FraudWarning::new(
                WarningKind::MissingOperationNumber,
                Severity::High,
                format!("{} must show an operation number", receipt_type),
            ));
        }

        let action = Action::for_receipt(&warnings);
        tracing::debug!(
            receipt_type = receipt_type.as_str(),
            is_valid,
            warnings = warnings.len(),
            action = action.as_str(),
            amount = ?fields.amount_value(),
            "Classified receipt"
        );

        Classification {
            receipt_type,
            is_valid,
            warnings,
            action,
        }
    }
}

/// Completed-transaction detectors in order; later detectors override earlier ones
fn completed_type(clean: &str, raw: &str) -> Option<ReceiptType> {
    let has_driver = contains_any(clean, &["conductor", "chofer", "driver"]);
    let has_route = clean.contains("min") && clean.contains("km");
    let has_vehicle = VEHICLE_PLATE.is_match(raw);
    let has_trip_count = clean.contains("viajes");

    let detectors: [(bool, ReceiptType); 6] = [
        (
            has_driver && (has_route || has_vehicle || has_trip_count),
            ReceiptType::DidiAccepted,
        ),
        (
            contains_any(clean, &["viaje completado", "gracias por viajar", "califica tu viaje"]),
            ReceiptType::DidiCompleted,
        ),
        (
            clean.contains("viaje finalizado")
                || (clean.contains("tu viaje") && clean.contains("finalizado")),
            ReceiptType::BeatCompleted,
        ),
        (
            contains_any(clean, &["recibo", "tu viaje con"]),
            ReceiptType::UberReceipt,
        ),
        (
            contains_any(clean, &["yapeaste", "yapeo exitoso"]),
            ReceiptType::YapeTransaction,
        ),
        (
            contains_any(clean, &["ruc", "boleta", "factura"]),
            ReceiptType::Invoice,
        ),
    ];

    detectors
        .iter()
        .rev()
        .find(|(hit, _)| *hit)
        .map(|(_, receipt_type)| *receipt_type)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Classification {
        ReceiptClassifier::new().classify(text, &ExtractedFields::default())
    }

    fn classify_with_operation(text: &str) -> Classification {
        let fields = ExtractedFields {
            operation_number: Some("07397334".to_string()),
            ..Default::default()
        };
        ReceiptClassifier::new().classify(text, &fields)
    }

    #[test]
    fn test_estimated_fare_is_rejected() {
        let c = classify("UberX Tarifa estimada S/ 18.50");
        assert_eq!(c.receipt_type, ReceiptType::UberEstimate);
        assert!(!c.is_valid);
        assert_eq!(c.action, Action::Reject);
        assert!(c.warnings.iter().any(|w| w.kind == WarningKind::EstimatedFare && w.is_critical()));
    }

    #[test]
    fn test_estimate_wins_over_completion_phrase() {
        let c = classify("Viaje completado. Gracias por viajar. Tarifa estimada S/ 20");
        assert!(!c.is_valid);
        assert_eq!(c.receipt_type, ReceiptType::UberEstimate);
        assert_eq!(c.action, Action::Reject);
    }

    #[test]
    fn test_negotiation_screenshot() {
        let c = classify("DiDi Pon tu precio S/ 12");
        assert_eq!(c.receipt_type, ReceiptType::DidiNegotiation);
        assert_eq!(c.action, Action::Reject);
    }

    #[test]
    fn test_searching_driver() {
        let c = classify("Buscando conductor cerca de ti...");
        assert_eq!(c.receipt_type, ReceiptType::DidiSearching);
        assert_eq!(c.warnings[0].kind, WarningKind::SearchingDriver);
    }

    #[test]
    fn test_completed_trip_is_valid() {
        let c = classify("DiDi Viaje completado S/ 14.00 Califica tu viaje");
        assert_eq!(c.receipt_type, ReceiptType::DidiCompleted);
        assert!(c.is_valid);
        assert!(c.warnings.is_empty());
        assert_eq!(c.action, Action::Approve);
    }

    #[test]
    fn test_accepted_trip_without_completion_needs_review() {
        let c = classify("Tu conductor Luis llega en 3 min - 2.1 km Toyota AMY061");
        assert_eq!(c.receipt_type, ReceiptType::DidiAccepted);
        assert!(!c.is_valid);
        assert_eq!(c.action, Action::ManualReview);
        assert_eq!(c.warnings[0].kind, WarningKind::NoCompletionProof);
    }

    #[test]
    fn test_yape_requires_operation_number() {
        let without = classify("¡Yapeaste! S/ 20 Yapeo exitoso");
        assert_eq!(without.receipt_type, ReceiptType::YapeTransaction);
        assert!(without
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::MissingOperationNumber));
        assert_eq!(without.action, Action::ManualReview);

        let with = classify_with_operation("¡Yapeaste! S/ 20 Yapeo exitoso");
        assert!(with.warnings.is_empty());
        assert_eq!(with.action, Action::Approve);
    }

    #[test]
    fn test_ride_hailing_does_not_need_operation_number() {
        let c = classify("Beat Viaje finalizado S/ 9.50");
        assert_eq!(c.receipt_type, ReceiptType::BeatCompleted);
        assert!(c.receipt_type.is_ride_hailing());
        assert!(c
            .warnings
            .iter()
            .all(|w| w.kind != WarningKind::MissingOperationNumber));
    }

    #[test]
    fn test_later_detector_overrides_label() {
        // invoice keywords come last and win over the trip receipt label
        let c = classify_with_operation("Recibo electronico RUC 20100000001 Operación exitosa");
        assert_eq!(c.receipt_type, ReceiptType::Invoice);
        assert!(c.is_valid);
    }

    #[test]
    fn test_unknown_text_is_not_valid_but_not_flagged() {
        let c = classify("hola mundo");
        assert_eq!(c.receipt_type, ReceiptType::Unknown);
        assert!(!c.is_valid);
        assert!(c.warnings.is_empty());
        assert_eq!(c.action, Action::Approve);
    }

    #[test]
    fn test_receipt_type_parses_its_label() {
        assert_eq!("UBER_RECEIPT".parse::<ReceiptType>().unwrap(), ReceiptType::UberReceipt);
        assert!("TAXI".parse::<ReceiptType>().is_err());
    }
}
