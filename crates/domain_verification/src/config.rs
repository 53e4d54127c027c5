//! Verification pipeline configuration

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::time::Duration;

use core_kernel::{CoreError, Rate, Timezone};

use crate::decision::DecisionEngine;
use crate::extraction::{AmountRange, FieldExtractor};

/// Thresholds and limits of a verification pass
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// High-confidence threshold of the first (local) tier
    pub primary_threshold: f64,
    /// High-confidence threshold of the second (neural) tier
    pub secondary_threshold: f64,
    /// High-confidence threshold of the optional cloud tier
    pub cloud_threshold: f64,
    /// Maximum relative difference still counted as a match
    pub tolerance: Decimal,
    /// Below this confidence a disagreement is never called a mismatch
    pub confidence_floor: f64,
    pub high_confidence: f64,
    pub mismatch_difference: Decimal,
    pub typical_range: AmountRange,
    pub date_gap_days: i64,
    pub provider_timeout_ms: u64,
    pub cloud_daily_budget: u32,
    pub budget_timezone: Timezone,
    /// Multiplier applied to the confidence of rescaled 3-digit amounts
    pub heuristic_confidence_factor: f64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            primary_threshold: 0.85,
            secondary_threshold: 0.90,
            cloud_threshold: 0.80,
            tolerance: dec!(0.03),
            confidence_floor: 0.5,
            high_confidence: 0.8,
            mismatch_difference: dec!(0.20),
            typical_range: AmountRange::default(),
            date_gap_days: 30,
            provider_timeout_ms: 60_000,
            cloud_daily_budget: 100,
            budget_timezone: Timezone::default(),
            heuristic_confidence_factor: 0.5,
        }
    }
}

impl VerificationConfig {
    /// Checks ranges; returns the first problem found
    pub fn validate(&self) -> Result<(), CoreError> {
        let unit = [
            ("primary_threshold", self.primary_threshold),
            ("secondary_threshold", self.secondary_threshold),
            ("cloud_threshold", self.cloud_threshold),
            ("confidence_floor", self.confidence_floor),
            ("high_confidence", self.high_confidence),
            ("heuristic_confidence_factor", self.heuristic_confidence_factor),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(CoreError::configuration(format!(
                    "{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }
        if self.confidence_floor > self.high_confidence {
            return Err(CoreError::configuration(
                "confidence_floor must not exceed high_confidence",
            ));
        }
        if self.tolerance < Decimal::ZERO || self.tolerance >= Decimal::ONE {
            return Err(CoreError::configuration(format!(
                "tolerance must be in [0, 1), got {}",
                self.tolerance
            )));
        }
        if self.mismatch_difference <= Decimal::ZERO {
            return Err(CoreError::configuration("mismatch_difference must be positive"));
        }
        if self.typical_range.min > self.typical_range.max {
            return Err(CoreError::configuration("typical_range min exceeds max"));
        }
        if self.date_gap_days < 0 {
            return Err(CoreError::configuration("date_gap_days must not be negative"));
        }
        if self.provider_timeout_ms == 0 {
            return Err(CoreError::configuration("provider_timeout_ms must be positive"));
        }
        Ok(())
    }

    pub fn decision_engine(&self) -> DecisionEngine {
        DecisionEngine::new(
            Rate::new(self.tolerance),
            self.confidence_floor,
            self.high_confidence,
            self.mismatch_difference,
        )
    }

    pub fn field_extractor(&self) -> FieldExtractor {
        FieldExtractor::new(self.typical_range)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = VerificationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.decision_engine(), DecisionEngine::default());
        assert_eq!(config.provider_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: VerificationConfig =
            serde_json::from_str(r#"{"primary_threshold": 0.7, "budget_timezone": "UTC"}"#).unwrap();
        assert_eq!(config.primary_threshold, 0.7);
        assert_eq!(config.secondary_threshold, 0.90);
        assert_eq!(config.budget_timezone, "UTC".parse::<Timezone>().unwrap());
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let config = VerificationConfig {
            secondary_threshold: 1.5,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("secondary_threshold"));
    }

    #[test]
    fn test_inverted_confidence_bounds_rejected() {
        let config = VerificationConfig {
            confidence_floor: 0.9,
            high_confidence: 0.6,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tolerance_of_one_rejected() {
        let config = VerificationConfig {
            tolerance: Decimal::ONE,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
