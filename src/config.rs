use crate::fraud::types::FraudConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Conekta,
    Stripe,
}

#[derive(Clone)]
pub struct PaymentConfig {
    pub provider: Provider,
    pub conekta_base_url: String,
    pub conekta_api_key: String,
    pub stripe_base_url: String,
    pub stripe_secret_key: String,
    pub webhook_secret: Option<String>,
    pub gateway_timeout_ms: u64,
    pub environment: String,
    // settles pending_payment immediately; explicit flag, never inferred from
    // the environment name
    pub test_mode_settles_pending: bool,
    pub default_phone: String,
    pub voucher_expiry_days: i64,
    pub default_currency: String,
    pub fraud: FraudConfig,
}

impl PaymentConfig {
    pub fn from_env() -> Self {
        Self {
            provider: match std::env::var("PAYMENT_PROVIDER").as_deref() {
                Ok("stripe") => Provider::Stripe,
                _ => Provider::Conekta,
            },
            conekta_base_url: std::env::var("CONEKTA_BASE_URL")
                .unwrap_or_else(|_| "https://api.conekta.io".to_string()),
            conekta_api_key: std::env::var("CONEKTA_API_KEY").unwrap_or_default(),
            stripe_base_url: std::env::var("STRIPE_BASE_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            stripe_secret_key: std::env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            webhook_secret: std::env::var("PAYMENT_WEBHOOK_SECRET").ok(),
            gateway_timeout_ms: std::env::var("GATEWAY_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(10_000),
            environment: std::env::var("APP_ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            test_mode_settles_pending: std::env::var("PAYMENT_TEST_MODE_SETTLES_PENDING")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            default_phone: std::env::var("PAYMENT_DEFAULT_PHONE")
                .unwrap_or_else(|_| "+525500000000".to_string()),
            voucher_expiry_days: std::env::var("OXXO_EXPIRY_DAYS")
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(2),
            default_currency: std::env::var("PAYMENT_CURRENCY")
                .unwrap_or_else(|_| "MXN".to_string()),
            fraud: FraudConfig {
                review_threshold: std::env::var("FRAUD_REVIEW_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(40.0),
                block_threshold: std::env::var("FRAUD_BLOCK_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(75.0),
            },
        }
    }

    pub fn for_tests() -> Self {
        Self {
            provider: Provider::Conekta,
            conekta_base_url: "https://api.conekta.io".to_string(),
            conekta_api_key: "key_test".to_string(),
            stripe_base_url: "https://api.stripe.com".to_string(),
            stripe_secret_key: "sk_test".to_string(),
            webhook_secret: Some("whsec_test".to_string()),
            gateway_timeout_ms: 1_000,
            environment: "test".to_string(),
            test_mode_settles_pending: false,
            default_phone: "+525500000000".to_string(),
            voucher_expiry_days: 2,
            default_currency: "MXN".to_string(),
            fraud: FraudConfig::default(),
        }
    }
}
