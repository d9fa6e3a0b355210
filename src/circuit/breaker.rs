use crate::circuit::state::{BreakerConfig, BreakerSnapshot, BreakerState};
use crate::error::GatewayError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub type FailurePredicate = Arc<dyn Fn(&GatewayError) -> bool + Send + Sync>;

struct Inner {
    state: BreakerState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    half_open_successes: u32,
    probe_in_flight: bool,
}

pub struct CircuitBreaker {
    operation: String,
    config: BreakerConfig,
    is_failure: FailurePredicate,
    inner: Mutex<Inner>,
}

enum Admission {
    Allow,
    Probe,
    Reject { remaining_ms: u64 },
}

impl CircuitBreaker {
    pub fn new(operation: &str, config: BreakerConfig) -> Self {
        Self::with_failure_predicate(operation, config, Arc::new(|_| true))
    }

    pub fn with_failure_predicate(
        operation: &str,
        config: BreakerConfig,
        is_failure: FailurePredicate,
    ) -> Self {
        CircuitBreaker {
            operation: operation.to_string(),
            config,
            is_failure,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure_at: None,
                half_open_successes: 0,
                probe_in_flight: false,
            }),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub async fn execute<T, F, Fut>(&self, action: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let was_probe = match self.admit() {
            Admission::Allow => false,
            Admission::Probe => true,
            Admission::Reject { remaining_ms } => {
                return Err(GatewayError::CircuitOpen {
                    operation: self.operation.clone(),
                    remaining_ms,
                });
            }
        };

        let result = action().await;
        match &result {
            Ok(_) => self.record_success(was_probe),
            Err(e) if (self.is_failure)(e) => self.record_failure(was_probe),
            // non-qualifying errors (declines) count as operational successes
            Err(_) => self.record_success(was_probe),
        }
        result
    }

    fn admit(&self) -> Admission {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match inner.state {
            BreakerState::Closed => Admission::Allow,
            BreakerState::Open => {
                let elapsed = inner.last_failure_at.map(|t| t.elapsed());
                match elapsed {
                    Some(elapsed) if elapsed >= self.config.reset_timeout => {
                        inner.state = BreakerState::HalfOpen;
                        inner.half_open_successes = 0;
                        inner.probe_in_flight = true;
                        tracing::info!(operation = %self.operation, "circuit half-open, admitting probe");
                        Admission::Probe
                    }
                    Some(elapsed) => Admission::Reject {
                        remaining_ms: (self.config.reset_timeout - elapsed).as_millis() as u64,
                    },
                    None => Admission::Reject {
                        remaining_ms: self.config.reset_timeout.as_millis() as u64,
                    },
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Admission::Reject { remaining_ms: 0 }
                } else {
                    inner.probe_in_flight = true;
                    Admission::Probe
                }
            }
        }
    }

    fn record_success(&self, was_probe: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if was_probe {
            inner.probe_in_flight = false;
        }
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count = 0;
            }
            BreakerState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.failure_count = 0;
                    inner.half_open_successes = 0;
                    inner.last_failure_at = None;
                    tracing::info!(operation = %self.operation, "circuit closed after successful probes");
                }
            }
            BreakerState::Open => {}
        }
    }

    fn record_failure(&self, was_probe: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if was_probe {
            inner.probe_in_flight = false;
        }
        inner.last_failure_at = Some(Instant::now());
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.half_open_successes = 0;
                    tracing::warn!(
                        operation = %self.operation,
                        failures = inner.failure_count,
                        "circuit opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.half_open_successes = 0;
                tracing::warn!(operation = %self.operation, "probe failed, circuit re-opened");
            }
            BreakerState::Open => {}
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let open_remaining_ms = match inner.state {
            BreakerState::Open => inner.last_failure_at.map(|t| {
                self.config
                    .reset_timeout
                    .saturating_sub(t.elapsed())
                    .as_millis() as u64
            }),
            _ => None,
        };
        BreakerSnapshot {
            operation: self.operation.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            half_open_successes: inner.half_open_successes,
            open_remaining_ms,
        }
    }
}

pub struct BreakerRegistry {
    default_predicate: FailurePredicate,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(default_predicate: FailurePredicate) -> Self {
        BreakerRegistry {
            default_predicate,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(Arc::new(|e: &GatewayError| e.is_infrastructure()))
    }

    pub fn get(&self, operation: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(|p| p.into_inner());
        breakers
            .entry(operation.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::with_failure_predicate(
                    operation,
                    BreakerConfig::for_operation(operation),
                    self.default_predicate.clone(),
                ))
            })
            .clone()
    }

    pub fn insert(&self, breaker: CircuitBreaker) {
        let mut breakers = self.breakers.lock().unwrap_or_else(|p| p.into_inner());
        breakers.insert(breaker.operation().to_string(), Arc::new(breaker));
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let breakers = self.breakers.lock().unwrap_or_else(|p| p.into_inner());
        let mut all: Vec<BreakerSnapshot> = breakers.values().map(|b| b.snapshot()).collect();
        all.sort_by(|a, b| a.operation.cmp(&b.operation));
        all
    }
}
