use crate::domain::charge::{ChargeStatus, PaymentMethod};
use crate::domain::customer::{Customer, CustomerRequest};
use crate::error::GatewayError;
use crate::gateways::{
    to_minor_units, GatewayOrder, OrderMethod, OrderRequest, PaymentGateway, TransferDetails,
    VoucherDetails,
};
use chrono::{TimeZone, Utc};
use serde_json::Value;

pub struct StripeGateway {
    pub base_url: String,
    pub secret_key: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(base_url: String, secret_key: String, timeout_ms: u64) -> Self {
        StripeGateway {
            base_url,
            secret_key,
            timeout_ms,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Network(e.to_string())
    }
}

async fn error_from_response(resp: reqwest::Response) -> GatewayError {
    let status = resp.status().as_u16();
    let body: Value = resp.json().await.unwrap_or_default();
    classify_error(status, &body)
}

fn classify_error(status: u16, body: &Value) -> GatewayError {
    let error = body.get("error").cloned().unwrap_or_default();
    let error_type = error.get("type").and_then(Value::as_str).unwrap_or_default();
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("provider rejected the request")
        .to_string();

    if error_type == "card_error" {
        let code = error
            .get("decline_code")
            .or_else(|| error.get("code"))
            .and_then(Value::as_str)
            .unwrap_or("card_declined")
            .to_string();
        return GatewayError::Declined { code, message };
    }

    match status {
        409 => GatewayError::AlreadyExists {
            id: error
                .get("payment_intent")
                .and_then(|p| p.get("id"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        429 => GatewayError::RateLimited,
        status => GatewayError::Provider {
            status,
            code: error.get("code").and_then(Value::as_str).map(str::to_string),
            message,
        },
    }
}

fn parse_customer(v: &Value, existing: bool) -> Result<Customer, GatewayError> {
    let id = v
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::InvalidResponse("customer without id".to_string()))?;
    Ok(Customer {
        id: id.to_string(),
        name: v.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        email: v.get("email").and_then(Value::as_str).unwrap_or_default().to_string(),
        phone: v.get("phone").and_then(Value::as_str).unwrap_or_default().to_string(),
        existing,
    })
}

fn parse_intent(v: &Value) -> Result<GatewayOrder, GatewayError> {
    let order_id = v
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::InvalidResponse("payment intent without id".to_string()))?;

    let method = v
        .get("payment_method_types")
        .and_then(|t| t.get(0))
        .and_then(Value::as_str)
        .map(|t| match t {
            "oxxo" => PaymentMethod::OxxoCash,
            "customer_balance" | "spei" => PaymentMethod::Spei,
            _ => PaymentMethod::Card,
        })
        .unwrap_or(PaymentMethod::Card);

    let next_action = v.get("next_action");

    let oxxo = next_action
        .and_then(|n| n.get("oxxo_display_details"))
        .map(|d| VoucherDetails {
            reference: d
                .get("number")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            barcode_url: None,
            hosted_voucher_url: d
                .get("hosted_voucher_url")
                .and_then(Value::as_str)
                .map(str::to_string),
            expires_at: d
                .get("expires_after")
                .and_then(Value::as_i64)
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        });

    let spei = next_action
        .and_then(|n| n.get("display_bank_transfer_instructions"))
        .map(|d| TransferDetails {
            clabe: d
                .get("financial_addresses")
                .and_then(|a| a.get(0))
                .and_then(|a| a.get("spei"))
                .and_then(|s| s.get("clabe"))
                .and_then(Value::as_str)
                .map(str::to_string),
            reference: d.get("reference").and_then(Value::as_str).map(str::to_string),
            bank: d
                .get("financial_addresses")
                .and_then(|a| a.get(0))
                .and_then(|a| a.get("spei"))
                .and_then(|s| s.get("bank_name"))
                .and_then(Value::as_str)
                .map(str::to_string),
        });

    Ok(GatewayOrder {
        order_id: order_id.to_string(),
        charge_id: v
            .get("latest_charge")
            .and_then(Value::as_str)
            .map(str::to_string),
        status: ChargeStatus::parse(v.get("status").and_then(Value::as_str).unwrap_or("processing")),
        amount_minor: v.get("amount").and_then(Value::as_i64).unwrap_or(0),
        currency: v
            .get("currency")
            .and_then(Value::as_str)
            .unwrap_or("mxn")
            .to_uppercase(),
        payment_method: method,
        oxxo,
        spei,
    })
}

fn intent_form(request: &OrderRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("amount".to_string(), to_minor_units(request.amount).to_string()),
        ("currency".to_string(), request.currency.to_lowercase()),
        ("customer".to_string(), request.customer_id.clone()),
        ("confirm".to_string(), "true".to_string()),
        ("metadata[reference_id]".to_string(), request.reference_id.clone()),
        ("metadata[application_id]".to_string(), request.application_id.clone()),
        ("metadata[environment]".to_string(), request.environment.clone()),
    ];

    if let Some(risk) = &request.risk {
        form.push(("metadata[risk_score]".to_string(), risk.risk_score.to_string()));
        form.push(("metadata[risk_factors]".to_string(), risk.risk_factors.join(",")));
    }

    match &request.method {
        OrderMethod::Card { token } => {
            form.push(("payment_method_types[0]".to_string(), "card".to_string()));
            form.push(("payment_method_data[type]".to_string(), "card".to_string()));
            form.push(("payment_method_data[card][token]".to_string(), token.clone()));
        }
        OrderMethod::OxxoCash { expires_at } => {
            let days = (*expires_at - Utc::now()).num_days().max(1);
            form.push(("payment_method_types[0]".to_string(), "oxxo".to_string()));
            form.push(("payment_method_data[type]".to_string(), "oxxo".to_string()));
            form.push((
                "payment_method_options[oxxo][expires_after_days]".to_string(),
                days.to_string(),
            ));
        }
        OrderMethod::Spei { .. } => {
            form.push((
                "payment_method_types[0]".to_string(),
                "customer_balance".to_string(),
            ));
            form.push((
                "payment_method_data[type]".to_string(),
                "customer_balance".to_string(),
            ));
            form.push((
                "payment_method_options[customer_balance][funding_type]".to_string(),
                "bank_transfer".to_string(),
            ));
            form.push((
                "payment_method_options[customer_balance][bank_transfer][type]".to_string(),
                "mx_bank_transfer".to_string(),
            ));
        }
    }

    form
}

#[async_trait::async_trait]
impl PaymentGateway for StripeGateway {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn find_customer(&self, email: &str) -> Result<Option<Customer>, GatewayError> {
        let resp = self
            .request(reqwest::Method::GET, "/v1/customers")
            .query(&[("email", email), ("limit", "1")])
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let body: Value = resp.json().await.map_err(transport_error)?;
        match body.get("data").and_then(|d| d.get(0)) {
            Some(customer) => Ok(Some(parse_customer(customer, true)?)),
            None => Ok(None),
        }
    }

    async fn create_customer(
        &self,
        request: &CustomerRequest,
        idempotency_key: &str,
    ) -> Result<Customer, GatewayError> {
        let mut form = vec![
            ("name".to_string(), request.name.clone()),
            ("email".to_string(), request.email.clone()),
        ];
        if let Some(phone) = &request.phone {
            form.push(("phone".to_string(), phone.clone()));
        }

        let resp = self
            .request(reqwest::Method::POST, "/v1/customers")
            .header("Idempotency-Key", idempotency_key)
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let body: Value = resp.json().await.map_err(transport_error)?;
        parse_customer(&body, false)
    }

    async fn create_order(
        &self,
        request: &OrderRequest,
        idempotency_key: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let resp = self
            .request(reqwest::Method::POST, "/v1/payment_intents")
            .header("Idempotency-Key", idempotency_key)
            .form(&intent_form(request))
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let body: Value = resp.json().await.map_err(transport_error)?;
        parse_intent(&body)
    }

    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/v1/payment_intents/{order_id}"))
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let body: Value = resp.json().await.map_err(transport_error)?;
        parse_intent(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn card_errors_map_to_declines() {
        let body = json!({
            "error": {
                "type": "card_error",
                "code": "card_declined",
                "decline_code": "insufficient_funds",
                "message": "Your card has insufficient funds."
            }
        });
        let error = classify_error(402, &body);
        match error {
            GatewayError::Declined { code, .. } => assert_eq!(code, "insufficient_funds"),
            other => panic!("expected decline, got {other:?}"),
        }
    }

    #[test]
    fn rate_limit_and_5xx_are_infrastructure() {
        assert!(matches!(
            classify_error(429, &json!({})),
            GatewayError::RateLimited
        ));
        let e = classify_error(503, &json!({"error": {"message": "unavailable"}}));
        assert!(e.is_retryable());
    }

    #[test]
    fn parses_succeeded_intent() {
        let body = json!({
            "id": "pi_123",
            "status": "succeeded",
            "amount": 15000,
            "currency": "mxn",
            "latest_charge": "ch_456",
            "payment_method_types": ["card"]
        });
        let order = parse_intent(&body).unwrap();
        assert_eq!(order.order_id, "pi_123");
        assert_eq!(order.status, ChargeStatus::Paid);
        assert_eq!(order.charge_id.as_deref(), Some("ch_456"));
        assert_eq!(order.currency, "MXN");
        assert_eq!(order.payment_method, PaymentMethod::Card);
    }

    #[test]
    fn oxxo_intent_exposes_voucher_details() {
        let body = json!({
            "id": "pi_789",
            "status": "requires_action",
            "amount": 15000,
            "currency": "mxn",
            "payment_method_types": ["oxxo"],
            "next_action": {
                "oxxo_display_details": {
                    "number": "93000987654321",
                    "hosted_voucher_url": "https://pay.example/voucher",
                    "expires_after": 1_700_172_800
                }
            }
        });
        let order = parse_intent(&body).unwrap();
        assert_eq!(order.status, ChargeStatus::PendingPayment);
        let oxxo = order.oxxo.unwrap();
        assert_eq!(oxxo.reference, "93000987654321");
        assert!(oxxo.hosted_voucher_url.is_some());
    }
}
