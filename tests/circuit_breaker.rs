use permit_payments::circuit::breaker::{BreakerRegistry, CircuitBreaker};
use permit_payments::circuit::state::{BreakerConfig, BreakerState};
use permit_payments::domain::charge::ChargeStatus;
use permit_payments::error::GatewayError;
use permit_payments::gateways::mock::MockGateway;
use permit_payments::gateways::{OrderMethod, OrderRequest, PaymentGateway};
use permit_payments::retry::executor::GatewayExecutor;
use permit_payments::retry::policy::RetryOptions;
use std::sync::Arc;
use std::time::Duration;

fn fast_breaker(failure_threshold: u32) -> CircuitBreaker {
    CircuitBreaker::with_failure_predicate(
        "card_payment",
        BreakerConfig {
            failure_threshold,
            reset_timeout: Duration::from_millis(50),
            half_open_success_threshold: 2,
        },
        Arc::new(|e: &GatewayError| e.is_infrastructure()),
    )
}

async fn fail(breaker: &CircuitBreaker) -> Result<(), GatewayError> {
    breaker
        .execute(|| async { Err::<(), _>(GatewayError::Timeout) })
        .await
}

async fn succeed(breaker: &CircuitBreaker) -> Result<(), GatewayError> {
    breaker.execute(|| async { Ok(()) }).await
}

#[tokio::test]
async fn opens_after_consecutive_failures_and_fails_fast() {
    let breaker = fast_breaker(3);

    for _ in 0..3 {
        assert!(matches!(fail(&breaker).await, Err(GatewayError::Timeout)));
    }
    assert_eq!(breaker.snapshot().state, BreakerState::Open);

    let err = succeed(&breaker).await.unwrap_err();
    assert!(matches!(err, GatewayError::CircuitOpen { .. }));
    if let GatewayError::CircuitOpen { operation, remaining_ms } = err {
        assert_eq!(operation, "card_payment");
        assert!(remaining_ms <= 50);
    }
}

#[tokio::test]
async fn success_resets_the_consecutive_failure_count() {
    let breaker = fast_breaker(3);

    fail(&breaker).await.ok();
    fail(&breaker).await.ok();
    succeed(&breaker).await.unwrap();
    fail(&breaker).await.ok();
    fail(&breaker).await.ok();

    // never three in a row
    assert_eq!(breaker.snapshot().state, BreakerState::Closed);
}

#[tokio::test]
async fn declines_do_not_trip_the_breaker() {
    let breaker = fast_breaker(3);

    for _ in 0..5 {
        let result = breaker
            .execute(|| async {
                Err::<(), _>(GatewayError::Declined {
                    code: "insufficient_funds".to_string(),
                    message: "declined".to_string(),
                })
            })
            .await;
        assert!(matches!(result, Err(GatewayError::Declined { .. })));
    }
    assert_eq!(breaker.snapshot().state, BreakerState::Closed);
    assert_eq!(breaker.snapshot().failure_count, 0);
}

#[tokio::test]
async fn half_open_closes_after_enough_probe_successes() {
    let breaker = fast_breaker(2);

    fail(&breaker).await.ok();
    fail(&breaker).await.ok();
    assert_eq!(breaker.snapshot().state, BreakerState::Open);

    tokio::time::sleep(Duration::from_millis(60)).await;

    succeed(&breaker).await.unwrap();
    assert_eq!(breaker.snapshot().state, BreakerState::HalfOpen);
    succeed(&breaker).await.unwrap();
    assert_eq!(breaker.snapshot().state, BreakerState::Closed);
}

#[tokio::test]
async fn failed_probe_reopens_immediately() {
    let breaker = fast_breaker(2);

    fail(&breaker).await.ok();
    fail(&breaker).await.ok();
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(fail(&breaker).await.is_err());
    assert_eq!(breaker.snapshot().state, BreakerState::Open);
}

#[tokio::test]
async fn half_open_admits_exactly_one_probe() {
    let breaker = Arc::new(fast_breaker(2));

    fail(&breaker).await.ok();
    fail(&breaker).await.ok();
    tokio::time::sleep(Duration::from_millis(60)).await;

    let slow_probe = breaker.execute(|| async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, GatewayError>(())
    });
    let rejected = breaker.execute(|| async { Ok::<_, GatewayError>(()) });

    let (first, second) = tokio::join!(slow_probe, rejected);
    assert!(first.is_ok());
    assert!(matches!(second, Err(GatewayError::CircuitOpen { .. })));
}

fn order_request() -> OrderRequest {
    OrderRequest {
        reference_id: "PERMIT-1".to_string(),
        application_id: "app-1".to_string(),
        amount: 150.0,
        currency: "MXN".to_string(),
        method: OrderMethod::Card {
            token: "tok_visa".to_string(),
        },
        customer_id: "cus_1".to_string(),
        customer_name: "María López".to_string(),
        customer_email: "maria@example.com".to_string(),
        customer_phone: "+525512345678".to_string(),
        environment: "test".to_string(),
        risk: None,
    }
}

fn executor_for(gateway: Arc<MockGateway>) -> GatewayExecutor {
    let factory_gateway = gateway.clone() as Arc<dyn PaymentGateway>;
    GatewayExecutor::new(
        Arc::new(move || Ok(factory_gateway.clone())),
        Arc::new(BreakerRegistry::with_defaults()),
    )
}

fn fast_retry(key: &str) -> RetryOptions {
    RetryOptions {
        max_retries: 1,
        retry_delay: Duration::from_millis(10),
        idempotency_key: key.to_string(),
    }
}

#[tokio::test]
async fn executor_retries_transient_failures_with_the_same_key() {
    let gateway = Arc::new(MockGateway::new());
    gateway.script_error(GatewayError::Timeout);
    let executor = executor_for(gateway.clone());

    let request = order_request();
    let order = executor
        .execute("card_payment", &fast_retry("order-PERMIT-1-k1"), |gw, key| {
            let request = request.clone();
            async move { gw.create_order(&request, &key).await }
        })
        .await
        .unwrap();

    assert_eq!(gateway.order_calls(), 2);
    assert_eq!(gateway.created_orders(), 1);
    assert!(!order.order_id.is_empty());
}

#[tokio::test]
async fn executor_does_not_retry_declines() {
    let gateway = Arc::new(MockGateway::with_status(ChargeStatus::Declined));
    let executor = executor_for(gateway.clone());

    let request = order_request();
    let err = executor
        .execute("card_payment", &fast_retry("order-PERMIT-1-k2"), |gw, key| {
            let request = request.clone();
            async move { gw.create_order(&request, &key).await }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Declined { .. }));
    assert_eq!(gateway.order_calls(), 1);
}

#[tokio::test]
async fn executor_fails_fast_once_the_circuit_opens() {
    let gateway = Arc::new(MockGateway::new());
    for _ in 0..3 {
        gateway.script_error(GatewayError::Timeout);
    }
    let executor = executor_for(gateway.clone());
    let request = order_request();

    // two attempts consume two timeouts
    let err = executor
        .execute("card_payment", &fast_retry("order-PERMIT-1-k3"), |gw, key| {
            let request = request.clone();
            async move { gw.create_order(&request, &key).await }
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Timeout));

    // third timeout trips the breaker; the retry is rejected without a call
    let err = executor
        .execute("card_payment", &fast_retry("order-PERMIT-1-k4"), |gw, key| {
            let request = request.clone();
            async move { gw.create_order(&request, &key).await }
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::CircuitOpen { .. }));
    assert_eq!(gateway.order_calls(), 3);

    // subsequent calls are rejected while the circuit stays open
    let err = executor
        .execute("card_payment", &fast_retry("order-PERMIT-1-k5"), |gw, key| {
            let request = request.clone();
            async move { gw.create_order(&request, &key).await }
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::CircuitOpen { .. }));
    assert_eq!(gateway.order_calls(), 3);
}

#[tokio::test]
async fn executor_rebuilds_the_client_after_initialization_failure() {
    let gateway = Arc::new(MockGateway::new()) as Arc<dyn PaymentGateway>;
    let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let factory_attempts = attempts.clone();
    let factory_gateway = gateway.clone();
    let executor = GatewayExecutor::new(
        Arc::new(move || {
            if factory_attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Err(GatewayError::NotInitialized)
            } else {
                Ok(factory_gateway.clone())
            }
        }),
        Arc::new(BreakerRegistry::with_defaults()),
    );

    let found = executor
        .execute("customer_operations", &fast_retry("customer-k1"), |gw, _key| {
            async move { gw.find_customer("maria@example.com").await }
        })
        .await
        .unwrap();

    assert!(found.is_none());
    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
}
