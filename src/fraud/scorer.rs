use crate::fraud::types::{
    DeviceInfo, FraudConfig, PaymentAttributes, RiskAssessment, RiskLevel, UserSignals,
};
use thiserror::Error;

const TEST_CARD_BINS: &[&str] = &["411111", "424242", "400000", "555555"];

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("review threshold {review} must be below block threshold {block}")]
    InvalidThresholds { review: f64, block: f64 },
    #[error("amount is not a finite number")]
    InvalidAmount,
}

#[derive(Clone)]
pub struct FraudScorer {
    config: FraudConfig,
}

impl FraudScorer {
    pub fn new(config: FraudConfig) -> Self {
        FraudScorer { config }
    }

    pub fn score(
        &self,
        payment: &PaymentAttributes,
        user: &UserSignals,
        device: &DeviceInfo,
    ) -> RiskAssessment {
        match self.evaluate(payment, user, device) {
            Ok(assessment) => assessment,
            Err(e) => {
                tracing::warn!(error = %e, "risk scoring failed, applying neutral assessment");
                RiskAssessment::neutral()
            }
        }
    }

    fn evaluate(
        &self,
        payment: &PaymentAttributes,
        user: &UserSignals,
        device: &DeviceInfo,
    ) -> Result<RiskAssessment, ScoringError> {
        if self.config.review_threshold >= self.config.block_threshold {
            return Err(ScoringError::InvalidThresholds {
                review: self.config.review_threshold,
                block: self.config.block_threshold,
            });
        }
        if !payment.amount.is_finite() || payment.amount < 0.0 {
            return Err(ScoringError::InvalidAmount);
        }

        let mut score = 0.0;
        let mut factors = Vec::new();
        let mut hit = |points: f64, factor: &str| {
            score += points;
            factors.push(factor.to_string());
        };

        if payment.amount >= 10_000.0 {
            hit(30.0, "very_high_amount");
        } else if payment.amount >= 5_000.0 {
            hit(20.0, "high_amount");
        } else if payment.amount >= 2_000.0 {
            hit(10.0, "elevated_amount");
        }

        if user.is_new_user {
            hit(15.0, "new_user");
        }

        if user.failed_attempts >= 3 {
            hit(25.0, "repeated_failures");
        } else if user.failed_attempts >= 1 {
            hit(10.0, "prior_failures");
        }

        if let Some(seconds) = user.seconds_since_last_txn {
            if seconds < 60 {
                hit(20.0, "rapid_repeat");
            }
        }

        if device.fingerprint.is_none() {
            hit(10.0, "missing_device_fingerprint");
        }

        if let Some(bin) = &payment.card_bin {
            if TEST_CARD_BINS.iter().any(|t| bin.starts_with(t)) {
                hit(25.0, "test_card_bin");
            }
        }

        if let Some(hour) = payment.hour_of_day {
            if hour < 6 {
                hit(5.0, "night_hours");
            }
        }

        if !payment.currency.eq_ignore_ascii_case("MXN") {
            hit(10.0, "foreign_currency");
        }

        let score = score.clamp(0.0, 100.0);
        let block = score >= self.config.block_threshold;
        let flag = score >= self.config.review_threshold;
        let level = if block {
            RiskLevel::High
        } else if flag {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        Ok(RiskAssessment {
            risk_score: score,
            risk_level: level,
            risk_factors: factors,
            flagged_for_review: flag,
            block_transaction: block,
        })
    }
}
