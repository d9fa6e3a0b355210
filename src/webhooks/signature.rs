use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const TOLERANCE_SECONDS: i64 = 300;

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    tolerance_seconds: i64,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>) -> Self {
        WebhookVerifier {
            secret: secret.filter(|s| !s.is_empty()),
            tolerance_seconds: TOLERANCE_SECONDS,
        }
    }

    pub fn verify(&self, signature_header: &str, payload: &[u8]) -> bool {
        self.verify_at(signature_header, payload, Utc::now())
    }

    pub fn verify_at(&self, signature_header: &str, payload: &[u8], now: DateTime<Utc>) -> bool {
        let Some(secret) = &self.secret else {
            tracing::error!("webhook secret not configured, rejecting webhook");
            return false;
        };

        let mut timestamp: Option<&str> = None;
        let mut signature: Option<&str> = None;
        for pair in signature_header.split(',') {
            match pair.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signature = Some(value),
                _ => {}
            }
        }

        let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
            tracing::warn!("webhook signature header missing t or v1 component");
            return false;
        };

        let Ok(timestamp) = timestamp.parse::<i64>() else {
            tracing::warn!("webhook signature timestamp is not an integer");
            return false;
        };

        let skew = (now.timestamp() - timestamp).abs();
        if skew > self.tolerance_seconds {
            tracing::warn!(skew_seconds = skew, "webhook timestamp outside tolerance window");
            return false;
        }

        let Ok(received) = hex::decode(signature) else {
            tracing::warn!("webhook signature is not valid hex");
            return false;
        };

        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            tracing::error!("webhook secret rejected by hmac");
            return false;
        };
        mac.update(payload);

        // verify_slice is constant-time over the signature bytes
        if mac.verify_slice(&received).is_err() {
            tracing::warn!("webhook signature mismatch");
            return false;
        }
        true
    }
}

pub fn sign(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
