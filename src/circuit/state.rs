use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub half_open_success_threshold: u32,
}

impl BreakerConfig {
    pub fn for_operation(operation: &str) -> Self {
        match operation {
            // charge creation failures are costly to retry blindly: trip fast,
            // stay open longer
            "card_payment" | "oxxo_payment" | "spei_payment" => BreakerConfig {
                failure_threshold: 3,
                reset_timeout: Duration::from_secs(60),
                half_open_success_threshold: 2,
            },
            // customer lookups are idempotent and low risk
            "customer_operations" | "webhook_processing" => BreakerConfig {
                failure_threshold: 5,
                reset_timeout: Duration::from_secs(30),
                half_open_success_threshold: 2,
            },
            _ => BreakerConfig {
                failure_threshold: 5,
                reset_timeout: Duration::from_secs(30),
                half_open_success_threshold: 2,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub operation: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub half_open_successes: u32,
    pub open_remaining_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_operations_trip_faster_than_customer_lookups() {
        let card = BreakerConfig::for_operation("card_payment");
        let customers = BreakerConfig::for_operation("customer_operations");
        assert!(card.failure_threshold < customers.failure_threshold);
        assert!(card.reset_timeout > customers.reset_timeout);
    }
}
