use crate::circuit::breaker::BreakerRegistry;
use crate::error::GatewayError;
use crate::gateways::PaymentGateway;
use crate::retry::policy::RetryOptions;
use std::future::Future;
use std::sync::Arc;

pub type GatewayFactory =
    Arc<dyn Fn() -> Result<Arc<dyn PaymentGateway>, GatewayError> + Send + Sync>;

pub struct GatewayExecutor {
    factory: GatewayFactory,
    // memoized lazy handle; the async mutex makes concurrent first callers
    // await the same initialization instead of racing their own
    handle: tokio::sync::Mutex<Option<Arc<dyn PaymentGateway>>>,
    breakers: Arc<BreakerRegistry>,
}

impl GatewayExecutor {
    pub fn new(factory: GatewayFactory, breakers: Arc<BreakerRegistry>) -> Self {
        GatewayExecutor {
            factory,
            handle: tokio::sync::Mutex::new(None),
            breakers,
        }
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub async fn client(&self) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        let mut guard = self.handle.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let built = (self.factory)()?;
        tracing::info!(gateway = built.name(), "gateway client initialized");
        *guard = Some(built.clone());
        Ok(built)
    }

    async fn reset_client(&self) {
        *self.handle.lock().await = None;
    }

    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        opts: &RetryOptions,
        call: F,
    ) -> Result<T, GatewayError>
    where
        F: Fn(Arc<dyn PaymentGateway>, String) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let breaker = self.breakers.get(operation);
        let mut attempt: u32 = 0;

        loop {
            let outcome = match self.client().await {
                Ok(client) => {
                    // the idempotency key is fixed for the whole logical
                    // attempt; every retry replays the same key
                    breaker
                        .execute(|| call(client, opts.idempotency_key.clone()))
                        .await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e @ GatewayError::CircuitOpen { .. }) => return Err(e),
                Err(e) => {
                    if !e.is_retryable() || attempt >= opts.max_retries {
                        return Err(e);
                    }
                    if matches!(e, GatewayError::NotInitialized) {
                        self.reset_client().await;
                    }
                    attempt += 1;
                    tracing::warn!(
                        operation,
                        attempt,
                        max_retries = opts.max_retries,
                        error = %e,
                        "gateway call failed, retrying"
                    );
                    tokio::time::sleep(opts.retry_delay).await;
                }
            }
        }
    }
}
