use crate::domain::application::ApplicationStatus;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub object: WebhookObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookObject {
    pub id: String,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl WebhookEvent {
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    pub fn order_id(&self) -> &str {
        &self.data.object.id
    }

    pub fn application_id(&self) -> Option<&str> {
        self.data
            .object
            .metadata
            .get("application_id")
            .map(String::as_str)
    }
}

// payment-relevant provider events; anything else is ignored by the handler
pub fn status_for_event(event_type: &str) -> Option<ApplicationStatus> {
    match event_type {
        "order.paid" | "charge.paid" => Some(ApplicationStatus::PaymentReceived),
        "order.pending_payment" | "charge.pending" => Some(ApplicationStatus::PaymentProcessing),
        "order.declined" | "charge.declined" | "order.expired" | "charge.expired" => {
            Some(ApplicationStatus::PaymentFailed)
        }
        "order.canceled" | "order.cancelled" => Some(ApplicationStatus::Cancelled),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_event_envelope() {
        let raw = br#"{
            "type": "order.paid",
            "data": { "object": {
                "id": "ord_2abc",
                "payment_status": "paid",
                "metadata": { "application_id": "app-42", "environment": "production" }
            }}
        }"#;
        let event = WebhookEvent::parse(raw).unwrap();
        assert_eq!(event.event_type, "order.paid");
        assert_eq!(event.order_id(), "ord_2abc");
        assert_eq!(event.application_id(), Some("app-42"));
    }

    #[test]
    fn maps_payment_events_to_statuses() {
        assert_eq!(
            status_for_event("order.paid"),
            Some(ApplicationStatus::PaymentReceived)
        );
        assert_eq!(
            status_for_event("order.expired"),
            Some(ApplicationStatus::PaymentFailed)
        );
        assert_eq!(
            status_for_event("order.canceled"),
            Some(ApplicationStatus::Cancelled)
        );
        assert_eq!(status_for_event("customer.updated"), None);
    }
}
