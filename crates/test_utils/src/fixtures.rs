//! Pre-built Test Fixtures
//!
//! Recognized receipt texts in the shapes the OCR engines actually return,
//! plus small encoded images for fingerprinting tests.

use chrono::NaiveDate;
use core_kernel::{Currency, Money};
use fake::faker::lorem::en::Word;
use fake::Fake;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::io::Cursor;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// The usual taxi fare used in end-to-end scenarios
    pub fn pen_20() -> Money {
        Money::new(dec!(20.00), Currency::PEN)
    }

    pub fn pen(amount: Decimal) -> Money {
        Money::new(amount, Currency::PEN)
    }

    /// Creates a USD amount for currency mismatch tests
    pub fn usd_20() -> Money {
        Money::new(dec!(20.00), Currency::USD)
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Expense date matching the wallet receipt fixture (11 Sep 2025)
    pub fn expense_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 11).unwrap()
    }

    /// More than 30 days before the expense date
    pub fn stale_receipt_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }
}

/// Recognized text of common receipt screenshots
pub struct ReceiptTexts;

impl ReceiptTexts {
    /// Completed ride-hailing trip with a driver and plate
    pub fn didi_completed(amount: &str) -> String {
        format!(
            "DiDi\nGracias por viajar\nTotal S/ {}\nConductor: Carlos AMY061\n12 min 4.5 km",
            amount
        )
    }

    /// Wallet transfer dated 11 Sep 2025
    pub fn yape(amount: &str, operation: &str) -> String {
        format!(
            "¡Yapeaste!\nS/ {}\nJuan Perez\n11 set 2025 - 08:42 p.m.\nYapeo exitoso\nNro. de operación\n{}",
            amount, operation
        )
    }

    /// Wallet transfer with the operation number cropped out
    pub fn yape_without_operation(amount: &str) -> String {
        format!("¡Yapeaste!\nS/ {}\nJuan Perez\nYapeo exitoso", amount)
    }

    /// Fare estimate that also mentions a completed trip
    pub fn uber_estimate(amount: &str) -> String {
        format!("Uber\nTarifa estimada\nS/ {}\nViaje completado", amount)
    }

    /// Electronic sales receipt with an explicit tax breakdown
    pub fn invoice() -> String {
        "BOLETA DE VENTA ELECTRONICA\nRUC 20123456789\nOP. GRAVADA S/ 16.95\nIGV S/ 3.05\nIMPORTE TOTAL S/ 20.00"
            .to_string()
    }

    /// What an engine returns for an unreadable photo
    pub fn illegible() -> String {
        "~~ ## @@ ilegible".to_string()
    }
}

/// Encoded images for tests that decode or fingerprint evidence
pub struct ImageFixtures;

impl ImageFixtures {
    /// A synthetic receipt-sized PNG; different seeds give different images
    pub fn receipt_png(seed: u8) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(120, 240, |x, y| {
            let v = ((x * 3 + y * 7) as u8).wrapping_add(seed);
            Rgb([v, 255 - v, v / 2])
        }));
        let mut buf = Cursor::new(Vec::new());
        image
            .write_to(&mut buf, ImageFormat::Png)
            .expect("Failed to encode fixture image");
        buf.into_inner()
    }

    /// A random evidence reference such as `uploads/taxi-lorem.jpg`
    pub fn reference(prefix: &str) -> String {
        let word: String = Word().fake();
        format!("uploads/{}-{}.jpg", prefix, word)
    }
}
