use crate::domain::application::ApplicationStatus;
use crate::fraud::types::{DeviceInfo, UserSignals};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    OxxoCash,
    Spei,
}

impl PaymentMethod {
    pub fn operation_name(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card_payment",
            PaymentMethod::OxxoCash => "oxxo_payment",
            PaymentMethod::Spei => "spei_payment",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::OxxoCash => "oxxo_cash",
            PaymentMethod::Spei => "spei",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeStatus {
    Paid,
    PendingPayment,
    Declined,
    Expired,
    Canceled,
    Unknown(String),
}

impl ChargeStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "paid" | "succeeded" => ChargeStatus::Paid,
            "pending_payment" | "pending" | "processing" | "requires_action" => {
                ChargeStatus::PendingPayment
            }
            "declined" | "failed" => ChargeStatus::Declined,
            "expired" => ChargeStatus::Expired,
            "canceled" | "cancelled" => ChargeStatus::Canceled,
            other => ChargeStatus::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ChargeStatus::Paid => "paid",
            ChargeStatus::PendingPayment => "pending_payment",
            ChargeStatus::Declined => "declined",
            ChargeStatus::Expired => "expired",
            ChargeStatus::Canceled => "canceled",
            ChargeStatus::Unknown(raw) => raw.as_str(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardChargeRequest {
    pub application_id: String,
    pub reference_id: String,
    pub token: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub amount: f64,
    pub currency: Option<String>,
    // BIN prefix only, never the full PAN
    pub card_bin: Option<String>,
    pub device_fingerprint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoucherChargeRequest {
    pub application_id: String,
    pub reference_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub amount: f64,
    pub currency: Option<String>,
    pub expires_in_days: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferChargeRequest {
    pub application_id: String,
    pub reference_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub amount: f64,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ChargeOptions {
    pub user: UserSignals,
    pub device: DeviceInfo,
    pub idempotency_key: Option<String>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChargeResult {
    pub success: bool,
    pub order_id: Option<String>,
    pub charge_id: Option<String>,
    pub payment_status: Option<ApplicationStatus>,
    pub provider_status: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub error_code: Option<String>,
    pub failure_message: Option<String>,
    pub flagged_for_review: bool,
}

impl ChargeResult {
    pub fn failure(
        amount: f64,
        currency: &str,
        error_code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ChargeResult {
            success: false,
            order_id: None,
            charge_id: None,
            payment_status: None,
            provider_status: None,
            amount,
            currency: currency.to_string(),
            error_code: Some(error_code.into()),
            failure_message: Some(message.into()),
            flagged_for_review: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VoucherResult {
    pub success: bool,
    pub order_id: Option<String>,
    pub oxxo_reference: Option<String>,
    pub barcode_url: Option<String>,
    pub hosted_voucher_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub payment_status: Option<ApplicationStatus>,
    pub amount: f64,
    pub currency: String,
    pub error_code: Option<String>,
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub success: bool,
    pub order_id: Option<String>,
    pub clabe: Option<String>,
    pub spei_reference: Option<String>,
    pub bank: Option<String>,
    pub payment_status: Option<ApplicationStatus>,
    pub amount: f64,
    pub currency: String,
    pub error_code: Option<String>,
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub order_id: String,
    pub provider_status: String,
    pub payment_status: ApplicationStatus,
    pub paid: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_statuses() {
        assert_eq!(ChargeStatus::parse("paid"), ChargeStatus::Paid);
        assert_eq!(ChargeStatus::parse("succeeded"), ChargeStatus::Paid);
        assert_eq!(ChargeStatus::parse("pending_payment"), ChargeStatus::PendingPayment);
        assert_eq!(ChargeStatus::parse("declined"), ChargeStatus::Declined);
        assert_eq!(
            ChargeStatus::parse("under_review"),
            ChargeStatus::Unknown("under_review".to_string())
        );
    }

    #[test]
    fn operation_names_match_breaker_registry() {
        assert_eq!(PaymentMethod::Card.operation_name(), "card_payment");
        assert_eq!(PaymentMethod::OxxoCash.operation_name(), "oxxo_payment");
        assert_eq!(PaymentMethod::Spei.operation_name(), "spei_payment");
    }
}
