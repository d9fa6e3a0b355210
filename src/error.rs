use thiserror::Error;

use crate::states::TransitionError;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),
    #[error("gateway timeout")]
    Timeout,
    #[error("rate limited by provider")]
    RateLimited,
    #[error("provider error {status}: {message}")]
    Provider {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("payment declined ({code}): {message}")]
    Declined { code: String, message: String },
    #[error("customer already exists at provider: {id}")]
    AlreadyExists { id: String },
    #[error("gateway client not initialized")]
    NotInitialized,
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
    #[error("circuit open for {operation}, retry in {remaining_ms}ms")]
    CircuitOpen { operation: String, remaining_ms: u64 },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Network(_)
            | GatewayError::Timeout
            | GatewayError::RateLimited
            | GatewayError::NotInitialized => true,
            GatewayError::Provider { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_infrastructure(&self) -> bool {
        match self {
            GatewayError::Network(_)
            | GatewayError::Timeout
            | GatewayError::RateLimited
            | GatewayError::NotInitialized
            | GatewayError::InvalidResponse(_) => true,
            GatewayError::Provider { status, .. } => *status >= 500,
            GatewayError::Declined { .. }
            | GatewayError::AlreadyExists { .. }
            | GatewayError::CircuitOpen { .. } => false,
        }
    }

    pub fn error_code(&self) -> String {
        match self {
            GatewayError::Network(_) => "network_error".to_string(),
            GatewayError::Timeout => "gateway_timeout".to_string(),
            GatewayError::RateLimited => "rate_limited".to_string(),
            GatewayError::Provider { .. } => "provider_error".to_string(),
            GatewayError::Declined { code, .. } => code.clone(),
            GatewayError::AlreadyExists { .. } => "customer_exists".to_string(),
            GatewayError::NotInitialized => "gateway_not_initialized".to_string(),
            GatewayError::InvalidResponse(_) => "invalid_provider_response".to_string(),
            GatewayError::CircuitOpen { .. } => "circuit_open".to_string(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Declined { code, .. } => decline_message(code).to_string(),
            GatewayError::CircuitOpen { .. } => {
                "El servicio de pagos no está disponible temporalmente. Intenta de nuevo en unos minutos.".to_string()
            }
            _ => "No pudimos procesar tu pago en este momento. Intenta de nuevo más tarde.".to_string(),
        }
    }
}

pub fn decline_message(code: &str) -> &'static str {
    match code {
        "insufficient_funds" => "La tarjeta no tiene fondos suficientes.",
        "expired_card" => "La tarjeta ha expirado.",
        "card_declined" => "La tarjeta fue rechazada por el banco emisor.",
        "invalid_cvc" | "incorrect_cvc" => "El código de seguridad de la tarjeta es incorrecto.",
        "processing_error" => "Ocurrió un error al procesar la tarjeta.",
        _ => "El pago fue rechazado. Verifica los datos de tu tarjeta.",
    }
}

#[derive(Debug, Clone, Error)]
pub enum RepoError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("application not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },
    #[error(transparent)]
    Repository(#[from] RepoError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),
}

impl PaymentError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        PaymentError::Validation {
            field,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classes() {
        assert!(GatewayError::Timeout.is_retryable());
        assert!(GatewayError::RateLimited.is_retryable());
        assert!(GatewayError::Network("reset".to_string()).is_retryable());
        assert!(GatewayError::NotInitialized.is_retryable());
        assert!(GatewayError::Provider {
            status: 503,
            code: None,
            message: "unavailable".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn declines_are_not_retryable_and_not_infrastructure() {
        let declined = GatewayError::Declined {
            code: "card_declined".to_string(),
            message: "declined".to_string(),
        };
        assert!(!declined.is_retryable());
        assert!(!declined.is_infrastructure());
        assert_eq!(declined.error_code(), "card_declined");
    }

    #[test]
    fn circuit_open_fails_fast() {
        let open = GatewayError::CircuitOpen {
            operation: "card_payment".to_string(),
            remaining_ms: 1500,
        };
        assert!(!open.is_retryable());
        assert!(!open.is_infrastructure());
        assert_eq!(open.error_code(), "circuit_open");
    }

    #[test]
    fn provider_4xx_is_terminal() {
        let bad_request = GatewayError::Provider {
            status: 422,
            code: Some("invalid_parameter".to_string()),
            message: "bad amount".to_string(),
        };
        assert!(!bad_request.is_retryable());
        assert!(!bad_request.is_infrastructure());
    }
}
