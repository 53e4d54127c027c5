//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for verdicts, warnings and the
//! audit trail that give more meaningful error messages than standard
//! assertions.

use core_kernel::Money;
use domain_verification::{
    AuditEvent, ClaimStatus, FraudWarning, Severity, Verdict, VerificationOutcome, WarningKind,
};
use rust_decimal::Decimal;

/// Asserts that two Money values are approximately equal within a tolerance
///
/// # Panics
///
/// Panics if the currencies don't match or the amounts differ by more than tolerance
pub fn assert_money_approx_eq(actual: &Money, expected: &Money, tolerance: Decimal) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );

    let diff = (actual.amount() - expected.amount()).abs();
    assert!(
        diff <= tolerance,
        "Money amounts differ by more than tolerance: actual={}, expected={}, diff={}, tolerance={}",
        actual.amount(),
        expected.amount(),
        diff,
        tolerance
    );
}

/// Asserts the status and outcome of a verdict
pub fn assert_verdict(verdict: &Verdict, status: ClaimStatus, outcome: VerificationOutcome) {
    assert_eq!(
        (verdict.status, verdict.outcome),
        (status, outcome),
        "Unexpected verdict (basis {:?}, warnings {:?})",
        verdict.basis,
        verdict.warnings
    );
}

/// Asserts that a warning of the given kind was raised and returns it
pub fn assert_has_warning(warnings: &[FraudWarning], kind: WarningKind) -> &FraudWarning {
    warnings
        .iter()
        .find(|w| w.kind == kind)
        .unwrap_or_else(|| panic!("Expected a {} warning, got {:?}", kind, warnings))
}

/// Asserts that a warning of the given kind and severity was raised
pub fn assert_has_warning_with_severity(
    warnings: &[FraudWarning],
    kind: WarningKind,
    severity: Severity,
) {
    let warning = assert_has_warning(warnings, kind);
    assert_eq!(
        warning.severity, severity,
        "Wrong severity for {}: {:?}",
        kind, warning
    );
}

/// Asserts that no warning of the given kind was raised
pub fn assert_no_warning(warnings: &[FraudWarning], kind: WarningKind) {
    assert!(
        warnings.iter().all(|w| w.kind != kind),
        "Unexpected {} warning in {:?}",
        kind,
        warnings
    );
}

/// Asserts that the audit trail contains each action, in any order
pub fn assert_audit_actions(events: &[AuditEvent], actions: &[&str]) {
    let recorded: Vec<&str> = events.iter().map(|e| e.action.as_str()).collect();
    for action in actions {
        assert!(
            recorded.contains(action),
            "Missing audit action {}, recorded {:?}",
            action,
            recorded
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_approx_eq_within_tolerance() {
        let a = Money::new(dec!(20.00), Currency::PEN);
        let b = Money::new(dec!(20.01), Currency::PEN);
        assert_money_approx_eq(&a, &b, dec!(0.01));
    }

    #[test]
    #[should_panic(expected = "Expected a DUPLICATE_IMAGE warning")]
    fn test_missing_warning_panics() {
        assert_has_warning(&[], WarningKind::DuplicateImage);
    }
}
