use crate::domain::charge::{ChargeStatus, PaymentMethod};
use crate::domain::customer::{Customer, CustomerRequest};
use crate::error::GatewayError;
use crate::gateways::{
    to_minor_units, GatewayOrder, OrderMethod, OrderRequest, PaymentGateway, TransferDetails,
    VoucherDetails,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

pub struct ConektaGateway {
    pub base_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

impl ConektaGateway {
    pub fn new(base_url: String, api_key: String, timeout_ms: u64) -> Self {
        ConektaGateway {
            base_url,
            api_key,
            timeout_ms,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .basic_auth(&self.api_key, None::<&str>)
            .header(reqwest::header::ACCEPT, "application/vnd.conekta-v2.1.0+json")
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

fn detail_message(body: &Value) -> String {
    body.get("details")
        .and_then(|d| d.get(0))
        .and_then(|d| d.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("provider rejected the request")
        .to_string()
}

fn decline_code(body: &Value) -> String {
    // conekta codes look like "conekta.errors.processing.bank.insufficient_funds"
    body.get("details")
        .and_then(|d| d.get(0))
        .and_then(|d| d.get("code"))
        .and_then(Value::as_str)
        .and_then(|c| c.rsplit('.').next())
        .unwrap_or("card_declined")
        .to_string()
}

async fn error_from_response(resp: reqwest::Response) -> GatewayError {
    let status = resp.status().as_u16();
    let body: Value = resp.json().await.unwrap_or_default();
    match status {
        402 => GatewayError::Declined {
            code: decline_code(&body),
            message: detail_message(&body),
        },
        409 => GatewayError::AlreadyExists {
            id: body
                .get("data")
                .and_then(|d| d.get("id"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        429 => GatewayError::RateLimited,
        status => GatewayError::Provider {
            status,
            code: body
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_string),
            message: detail_message(&body),
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

fn parse_order(v: &Value) -> Result<GatewayOrder, GatewayError> {
    let order_id = v
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::InvalidResponse("order without id".to_string()))?;

    let charge = v
        .get("charges")
        .and_then(|c| c.get("data"))
        .and_then(|d| d.get(0));

    let payment_method = charge.and_then(|c| c.get("payment_method"));
    let method_type = payment_method
        .and_then(|m| m.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("card");

    let method = match method_type {
        "oxxo_cash" | "oxxo" => PaymentMethod::OxxoCash,
        "spei" => PaymentMethod::Spei,
        _ => PaymentMethod::Card,
    };

    let expires_at = payment_method
        .and_then(|m| m.get("expires_at"))
        .and_then(Value::as_i64)
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single());

    let oxxo = if method == PaymentMethod::OxxoCash {
        payment_method
            .and_then(|m| m.get("reference"))
            .and_then(Value::as_str)
            .map(|reference| VoucherDetails {
                reference: reference.to_string(),
                barcode_url: payment_method
                    .and_then(|m| m.get("barcode_url"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                hosted_voucher_url: payment_method
                    .and_then(|m| m.get("hosted_voucher_url"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                expires_at,
            })
    } else {
        None
    };

    let spei = if method == PaymentMethod::Spei {
        Some(TransferDetails {
            clabe: payment_method
                .and_then(|m| m.get("clabe"))
                .and_then(Value::as_str)
                .map(str::to_string),
            reference: payment_method
                .and_then(|m| m.get("reference"))
                .and_then(Value::as_str)
                .map(str::to_string),
            bank: payment_method
                .and_then(|m| m.get("receiving_bank"))
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    } else {
        None
    };

    Ok(GatewayOrder {
        order_id: order_id.to_string(),
        charge_id: charge
            .and_then(|c| c.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string),
        status: ChargeStatus::parse(
            v.get("payment_status")
                .and_then(Value::as_str)
                .unwrap_or("pending_payment"),
        ),
        amount_minor: v.get("amount").and_then(Value::as_i64).unwrap_or(0),
        currency: v
            .get("currency")
            .and_then(Value::as_str)
            .unwrap_or("MXN")
            .to_string(),
        payment_method: method,
        oxxo,
        spei,
    })
}

fn order_body(request: &OrderRequest) -> Value {
    let payment_method = match &request.method {
        OrderMethod::Card { token } => json!({
            "type": "card",
            "token_id": token,
        }),
        OrderMethod::OxxoCash { expires_at } => json!({
            "type": "oxxo_cash",
            "expires_at": expires_at.timestamp(),
        }),
        OrderMethod::Spei { expires_at } => json!({
            "type": "spei",
            "expires_at": expires_at.timestamp(),
        }),
    };

    let mut metadata = json!({
        "reference_id": request.reference_id,
        "application_id": request.application_id,
        "environment": request.environment,
    });
    if let Some(risk) = &request.risk {
        metadata["risk_score"] = json!(risk.risk_score);
        metadata["risk_factors"] = json!(risk.risk_factors.join(","));
    }

    json!({
        "currency": request.currency,
        "customer_info": { "customer_id": request.customer_id },
        "line_items": [{
            "name": format!("Permiso {}", request.reference_id),
            "unit_price": to_minor_units(request.amount),
            "quantity": 1,
        }],
        "metadata": metadata,
        "charges": [{ "payment_method": payment_method }],
    })
}

#[async_trait::async_trait]
impl PaymentGateway for ConektaGateway {
    fn name(&self) -> &'static str {
        "conekta"
    }

    async fn find_customer(&self, email: &str) -> Result<Option<Customer>, GatewayError> {
        let resp = self
            .request(reqwest::Method::GET, "/customers")
            .query(&[("email", email)])
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
        let resp = self
            .request(reqwest::Method::POST, "/customers")
            .header("Idempotency-Key", idempotency_key)
            .json(&json!({
                "name": request.name,
                "email": request.email,
                "phone": request.phone,
            }))
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
            .request(reqwest::Method::POST, "/orders")
            .header("Idempotency-Key", idempotency_key)
            .json(&order_body(request))
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let body: Value = resp.json().await.map_err(transport_error)?;
        parse_order(&body)
    }

    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/orders/{order_id}"))
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let body: Value = resp.json().await.map_err(transport_error)?;
        parse_order(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_decline_code_from_error_details() {
        let body = json!({
            "type": "processing_error",
            "details": [{
                "code": "conekta.errors.processing.bank.insufficient_funds",
                "message": "Fondos insuficientes."
            }]
        });
        assert_eq!(decline_code(&body), "insufficient_funds");
        assert_eq!(detail_message(&body), "Fondos insuficientes.");
    }

    #[test]
    fn parses_oxxo_order_payload() {
        let body = json!({
            "id": "ord_2abc",
            "payment_status": "pending_payment",
            "amount": 15000,
            "currency": "MXN",
            "charges": { "data": [{
                "id": "chg_1",
                "status": "pending_payment",
                "payment_method": {
                    "type": "oxxo_cash",
                    "reference": "93000123456789",
                    "barcode_url": "https://pay.example/barcode.png",
                    "expires_at": 1_700_172_800
                }
            }]}
        });

        let order = parse_order(&body).unwrap();
        assert_eq!(order.order_id, "ord_2abc");
        assert_eq!(order.status, ChargeStatus::PendingPayment);
        assert_eq!(order.payment_method, PaymentMethod::OxxoCash);
        let oxxo = order.oxxo.unwrap();
        assert_eq!(oxxo.reference, "93000123456789");
        assert!(oxxo.barcode_url.is_some());
    }

    #[test]
    fn order_body_carries_risk_annotations() {
        let request = OrderRequest {
            reference_id: "APP-1".to_string(),
            application_id: "app-1".to_string(),
            amount: 150.0,
            currency: "MXN".to_string(),
            method: OrderMethod::Card {
                token: "tok_test".to_string(),
            },
            customer_id: "cus_1".to_string(),
            customer_name: "Maria".to_string(),
            customer_email: "maria@example.com".to_string(),
            customer_phone: "+525512345678".to_string(),
            environment: "production".to_string(),
            risk: Some(crate::gateways::RiskAnnotation {
                risk_score: 52.0,
                risk_factors: vec!["high_amount".to_string(), "new_user".to_string()],
            }),
        };

        let body = order_body(&request);
        assert_eq!(body["line_items"][0]["unit_price"], 15000);
        assert_eq!(body["metadata"]["risk_score"], 52.0);
        assert_eq!(body["metadata"]["risk_factors"], "high_amount,new_user");
        assert_eq!(body["charges"][0]["payment_method"]["type"], "card");
    }
}
