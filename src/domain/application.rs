use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    AwaitingPayment,
    AwaitingOxxoPayment,
    PaymentProcessing,
    PaymentReceived,
    PaymentFailed,
    GeneratingPermit,
    ErrorGeneratingPermit,
    PermitReady,
    Completed,
    Cancelled,
    Expired,
    RenewalPending,
    RenewalApproved,
    RenewalRejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::AwaitingPayment => "AWAITING_PAYMENT",
            ApplicationStatus::AwaitingOxxoPayment => "AWAITING_OXXO_PAYMENT",
            ApplicationStatus::PaymentProcessing => "PAYMENT_PROCESSING",
            ApplicationStatus::PaymentReceived => "PAYMENT_RECEIVED",
            ApplicationStatus::PaymentFailed => "PAYMENT_FAILED",
            ApplicationStatus::GeneratingPermit => "GENERATING_PERMIT",
            ApplicationStatus::ErrorGeneratingPermit => "ERROR_GENERATING_PERMIT",
            ApplicationStatus::PermitReady => "PERMIT_READY",
            ApplicationStatus::Completed => "COMPLETED",
            ApplicationStatus::Cancelled => "CANCELLED",
            ApplicationStatus::Expired => "EXPIRED",
            ApplicationStatus::RenewalPending => "RENEWAL_PENDING",
            ApplicationStatus::RenewalApproved => "RENEWAL_APPROVED",
            ApplicationStatus::RenewalRejected => "RENEWAL_REJECTED",
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ApplicationSnapshot {
    pub id: String,
    pub status: ApplicationStatus,
    pub order_id: Option<String>,
    pub email: Option<String>,
}
