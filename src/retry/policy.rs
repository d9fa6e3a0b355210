use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub idempotency_key: String,
}

impl RetryOptions {
    // charge creation is retried sparingly: provider-side idempotency is
    // best effort, and a duplicate charge is worse than a failed one
    pub fn charge(idempotency_key: String) -> Self {
        RetryOptions {
            max_retries: 1,
            retry_delay: Duration::from_millis(1000),
            idempotency_key,
        }
    }

    pub fn lookup(idempotency_key: String) -> Self {
        RetryOptions {
            max_retries: 2,
            retry_delay: Duration::from_millis(500),
            idempotency_key,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

fn token_prefix(token: &str) -> String {
    token.chars().take(8).collect()
}

fn nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn customer_key(email: &str) -> String {
    format!("customer-{}-{}", email, nonce())
}

pub fn order_key(reference_id: &str, token: &str) -> String {
    format!("order-{}-{}-{}", reference_id, token_prefix(token), nonce())
}

pub fn oxxo_key(reference_id: &str) -> String {
    format!("oxxo-{}-{}", reference_id, nonce())
}

pub fn spei_key(reference_id: &str) -> String {
    format!("spei-{}-{}", reference_id, nonce())
}
