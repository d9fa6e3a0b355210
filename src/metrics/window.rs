use crate::metrics::event::{PaymentEvent, PaymentOutcome};
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

pub fn prune(events: &mut VecDeque<PaymentEvent>, now: DateTime<Utc>, window: Duration, cap: usize) {
    let cutoff = now - window;
    while let Some(front) = events.front() {
        if front.timestamp < cutoff {
            events.pop_front();
        } else {
            break;
        }
    }
    while events.len() > cap {
        events.pop_front();
    }
}

pub fn failure_rate(events: &VecDeque<PaymentEvent>) -> f64 {
    if events.is_empty() {
        return 0.0;
    }
    let failed = events
        .iter()
        .filter(|e| e.outcome == PaymentOutcome::Error)
        .count();
    failed as f64 / events.len() as f64
}
