use crate::domain::charge::PaymentMethod;
use crate::metrics::event::{PaymentEvent, PaymentOutcome};
use crate::metrics::window::{failure_rate, prune};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

const EVENT_CAP: usize = 10_000;

#[derive(Debug, Clone, Default, Serialize)]
pub struct MethodCounters {
    pub attempts: u64,
    pub successes: u64,
    pub declines: u64,
    pub failures: u64,
    pub total_duration_ms: u64,
    pub max_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsAlert {
    pub raised_at: DateTime<Utc>,
    pub failure_rate: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<PaymentMethod, MethodCounters>,
    pub window_failure_rate: f64,
    pub window_samples: usize,
    pub avg_duration_ms: u64,
    pub alerts: Vec<MetricsAlert>,
    pub generated_at: DateTime<Utc>,
}

struct CollectorInner {
    counters: HashMap<PaymentMethod, MethodCounters>,
    events: VecDeque<PaymentEvent>,
    alerts: Vec<MetricsAlert>,
}

#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<CollectorInner>>,
    window: Duration,
    failure_alert_threshold: f64,
    min_alert_samples: usize,
}

impl MetricsCollector {
    pub fn new(window_minutes: i64, failure_alert_threshold: f64, min_alert_samples: usize) -> Self {
        MetricsCollector {
            inner: Arc::new(Mutex::new(CollectorInner {
                counters: HashMap::new(),
                events: VecDeque::new(),
                alerts: Vec::new(),
            })),
            window: Duration::minutes(window_minutes),
            failure_alert_threshold,
            min_alert_samples,
        }
    }

    pub fn record(&self, event: PaymentEvent) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());

        let counters = inner.counters.entry(event.method).or_default();
        counters.attempts += 1;
        counters.total_duration_ms += event.duration_ms;
        counters.max_duration_ms = counters.max_duration_ms.max(event.duration_ms);
        match event.outcome {
            PaymentOutcome::Success => counters.successes += 1,
            PaymentOutcome::Declined => counters.declines += 1,
            PaymentOutcome::Error => counters.failures += 1,
        }

        let now = event.timestamp;
        inner.events.push_back(event);
        prune(&mut inner.events, now, self.window, EVENT_CAP);

        let rate = failure_rate(&inner.events);
        let samples = inner.events.len();
        if samples >= self.min_alert_samples && rate >= self.failure_alert_threshold {
            tracing::warn!(
                failure_rate = rate,
                samples,
                "payment failure rate above alert threshold"
            );
            inner.alerts.push(MetricsAlert {
                raised_at: now,
                failure_rate: rate,
                samples,
            });
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let now = Utc::now();
        prune(&mut inner.events, now, self.window, EVENT_CAP);

        let total_attempts: u64 = inner.counters.values().map(|c| c.attempts).sum();
        let total_duration: u64 = inner.counters.values().map(|c| c.total_duration_ms).sum();

        MetricsSnapshot {
            counters: inner.counters.clone(),
            window_failure_rate: failure_rate(&inner.events),
            window_samples: inner.events.len(),
            avg_duration_ms: if total_attempts == 0 {
                0
            } else {
                total_duration / total_attempts
            },
            alerts: inner.alerts.clone(),
            generated_at: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(60, 0.5, 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_per_method_outcomes() {
        let collector = MetricsCollector::default();
        collector.record(PaymentEvent::now(PaymentMethod::Card, 150.0, PaymentOutcome::Success, 90));
        collector.record(PaymentEvent::now(PaymentMethod::Card, 250.0, PaymentOutcome::Declined, 80));
        collector.record(PaymentEvent::now(PaymentMethod::OxxoCash, 150.0, PaymentOutcome::Success, 200));

        let snapshot = collector.snapshot();
        let card = &snapshot.counters[&PaymentMethod::Card];
        assert_eq!(card.attempts, 2);
        assert_eq!(card.successes, 1);
        assert_eq!(card.declines, 1);
        assert_eq!(snapshot.counters[&PaymentMethod::OxxoCash].attempts, 1);
        assert_eq!(snapshot.window_samples, 3);
    }

    #[test]
    fn raises_alert_past_failure_threshold() {
        let collector = MetricsCollector::new(60, 0.5, 4);
        for _ in 0..2 {
            collector.record(PaymentEvent::now(PaymentMethod::Card, 100.0, PaymentOutcome::Success, 50));
        }
        for _ in 0..2 {
            collector.record(PaymentEvent::now(PaymentMethod::Card, 100.0, PaymentOutcome::Error, 50));
        }

        let snapshot = collector.snapshot();
        assert!(!snapshot.alerts.is_empty());
        assert!(snapshot.window_failure_rate >= 0.5);
    }

    #[test]
    fn no_alert_below_min_samples() {
        let collector = MetricsCollector::new(60, 0.5, 10);
        collector.record(PaymentEvent::now(PaymentMethod::Card, 100.0, PaymentOutcome::Error, 50));
        assert!(collector.snapshot().alerts.is_empty());
    }
}
