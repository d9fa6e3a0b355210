use crate::domain::charge::{ChargeStatus, PaymentMethod};
use crate::domain::customer::{Customer, CustomerRequest};
use crate::error::GatewayError;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod conekta;
pub mod mock;
pub mod stripe;

#[derive(Debug, Clone, Serialize)]
pub struct RiskAnnotation {
    pub risk_score: f64,
    pub risk_factors: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum OrderMethod {
    Card { token: String },
    OxxoCash { expires_at: DateTime<Utc> },
    Spei { expires_at: DateTime<Utc> },
}

impl OrderMethod {
    pub fn payment_method(&self) -> PaymentMethod {
        match self {
            OrderMethod::Card { .. } => PaymentMethod::Card,
            OrderMethod::OxxoCash { .. } => PaymentMethod::OxxoCash,
            OrderMethod::Spei { .. } => PaymentMethod::Spei,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub reference_id: String,
    pub application_id: String,
    // major currency units; adapters convert to minor units at the wire
    pub amount: f64,
    pub currency: String,
    pub method: OrderMethod,
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub environment: String,
    pub risk: Option<RiskAnnotation>,
}

#[derive(Debug, Clone)]
pub struct VoucherDetails {
    pub reference: String,
    pub barcode_url: Option<String>,
    pub hosted_voucher_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct TransferDetails {
    pub clabe: Option<String>,
    pub reference: Option<String>,
    pub bank: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayOrder {
    pub order_id: String,
    pub charge_id: Option<String>,
    pub status: ChargeStatus,
    pub amount_minor: i64,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub oxxo: Option<VoucherDetails>,
    pub spei: Option<TransferDetails>,
}

pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

pub fn to_major_units(amount_minor: i64) -> f64 {
    amount_minor as f64 / 100.0
}

#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn find_customer(&self, email: &str) -> Result<Option<Customer>, GatewayError>;

    async fn create_customer(
        &self,
        request: &CustomerRequest,
        idempotency_key: &str,
    ) -> Result<Customer, GatewayError>;

    async fn create_order(
        &self,
        request: &OrderRequest,
        idempotency_key: &str,
    ) -> Result<GatewayOrder, GatewayError>;

    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_unit_conversion_rounds_cents() {
        assert_eq!(to_minor_units(150.0), 15_000);
        assert_eq!(to_minor_units(99.99), 9_999);
        assert_eq!(to_minor_units(0.1 + 0.2), 30);
        assert_eq!(to_major_units(15_000), 150.0);
    }
}
