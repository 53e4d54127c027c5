//! Tests for core_kernel error types

use core_kernel::error::CoreError;
use core_kernel::money::MoneyError;
use core_kernel::temporal::TemporalError;
use core_kernel::Timezone;

#[test]
fn test_core_error_validation() {
    let error = CoreError::validation("reported amount must be positive");

    match error {
        CoreError::Validation(msg) => assert!(msg.contains("positive")),
        _ => panic!("Expected Validation error"),
    }
}

#[test]
fn test_core_error_configuration() {
    let error = CoreError::configuration("tolerance out of range");
    assert_eq!(error.to_string(), "Configuration error: tolerance out of range");
}

#[test]
fn test_core_error_from_money_error() {
    let money_error = MoneyError::CurrencyMismatch("PEN".to_string(), "USD".to_string());
    let core_error: CoreError = money_error.into();

    assert!(matches!(core_error, CoreError::Money(_)));
    assert!(core_error.to_string().contains("PEN"));
}

#[test]
fn test_core_error_from_temporal_error() {
    let temporal_error = "Nowhere/Special".parse::<Timezone>().unwrap_err();
    assert_eq!(
        temporal_error,
        TemporalError::InvalidTimezone("Nowhere/Special".to_string())
    );

    let core_error: CoreError = temporal_error.into();
    assert!(matches!(core_error, CoreError::Temporal(_)));
}
