use crate::domain::charge::PaymentMethod;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Success,
    Declined,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentEvent {
    pub method: PaymentMethod,
    pub amount: f64,
    pub outcome: PaymentOutcome,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl PaymentEvent {
    pub fn now(method: PaymentMethod, amount: f64, outcome: PaymentOutcome, duration_ms: u64) -> Self {
        PaymentEvent {
            method,
            amount,
            outcome,
            duration_ms,
            timestamp: Utc::now(),
        }
    }
}
