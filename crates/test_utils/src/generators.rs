//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use core_kernel::{Currency, Money};
use domain_verification::ClaimType;
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for generating valid claim types
pub fn claim_type_strategy() -> impl Strategy<Value = ClaimType> {
    prop_oneof![
        Just(ClaimType::Taxi),
        Just(ClaimType::Transport),
        Just(ClaimType::Other),
    ]
}

/// Strategy for amounts in the typical fare range (5.00 to 200.00)
pub fn typical_amount_strategy() -> impl Strategy<Value = Decimal> {
    (500i64..=20_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for generating PEN Money values in the typical fare range
pub fn pen_money_strategy() -> impl Strategy<Value = Money> {
    typical_amount_strategy().prop_map(|amount| Money::new(amount, Currency::PEN))
}

/// Strategy for provider confidences
pub fn confidence_strategy() -> impl Strategy<Value = f64> {
    0.0f64..=1.0f64
}

/// An amount together with one of the ways receipts print it
pub fn rendered_amount_strategy() -> impl Strategy<Value = (Decimal, String)> {
    typical_amount_strategy().prop_flat_map(|amount| {
        let dotted = format!("{:.2}", amount);
        let comma = dotted.replace('.', ",");
        (
            Just(amount),
            prop_oneof![
                Just(format!("S/ {}", dotted)),
                Just(format!("S/{}", comma)),
                Just(format!("Total: S/ {}", dotted)),
                Just(format!("Monto S/. {}", dotted)),
                Just(format!("{} soles", dotted)),
                Just(format!("PEN {}", dotted)),
            ],
        )
    })
}

/// Words without digits to pad receipt texts
pub fn receipt_noise_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-z]{2,8}", 0..6).prop_map(|words| words.join(" "))
}
