use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
    pub flagged_for_review: bool,
    pub block_transaction: bool,
}

impl RiskAssessment {
    // fallback when scoring itself fails: never block revenue on a scorer bug
    pub fn neutral() -> Self {
        RiskAssessment {
            risk_score: 0.0,
            risk_level: RiskLevel::Error,
            risk_factors: Vec::new(),
            flagged_for_review: false,
            block_transaction: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentAttributes {
    pub amount: f64,
    pub currency: String,
    pub card_bin: Option<String>,
    pub hour_of_day: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserSignals {
    pub is_new_user: bool,
    pub failed_attempts: u32,
    pub seconds_since_last_txn: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceInfo {
    pub fingerprint: Option<String>,
    pub ip_country: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FraudConfig {
    pub review_threshold: f64,
    pub block_threshold: f64,
}

impl Default for FraudConfig {
    fn default() -> Self {
        FraudConfig {
            review_threshold: 40.0,
            block_threshold: 75.0,
        }
    }
}
