use crate::domain::application::{ApplicationSnapshot, ApplicationStatus};
use serde::Serialize;
use thiserror::Error;

use ApplicationStatus::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionCode {
    InvalidTransition,
    TerminalState,
    PaymentRequired,
}

impl TransitionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionCode::InvalidTransition => "INVALID_TRANSITION",
            TransitionCode::TerminalState => "TERMINAL_STATE",
            TransitionCode::PaymentRequired => "PAYMENT_REQUIRED",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{} moving {} -> {}", .code.as_str(), .from.as_str(), .to.as_str())]
pub struct TransitionError {
    pub code: TransitionCode,
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    pub valid_next: Vec<ApplicationStatus>,
}

pub fn allowed_transitions(from: ApplicationStatus) -> &'static [ApplicationStatus] {
    match from {
        AwaitingPayment => &[
            PaymentProcessing,
            PaymentReceived,
            PaymentFailed,
            AwaitingOxxoPayment,
            Cancelled,
            Expired,
        ],
        AwaitingOxxoPayment => &[
            PaymentProcessing,
            PaymentReceived,
            PaymentFailed,
            AwaitingPayment,
            Cancelled,
            Expired,
        ],
        PaymentProcessing => &[PaymentReceived, PaymentFailed, Cancelled],
        PaymentReceived => &[GeneratingPermit, Cancelled],
        PaymentFailed => &[AwaitingPayment, Cancelled],
        GeneratingPermit => &[PermitReady, ErrorGeneratingPermit],
        ErrorGeneratingPermit => &[GeneratingPermit, Cancelled],
        PermitReady => &[Completed, Expired],
        Completed => &[Expired],
        Cancelled => &[],
        Expired => &[RenewalPending],
        RenewalPending => &[RenewalApproved, RenewalRejected],
        RenewalApproved => &[GeneratingPermit],
        RenewalRejected => &[],
    }
}

pub fn is_terminal(status: ApplicationStatus) -> bool {
    matches!(status, Cancelled | RenewalRejected)
}

pub fn requires_payment(status: ApplicationStatus) -> bool {
    matches!(status, PaymentReceived | GeneratingPermit | PermitReady | Completed)
}

pub fn can_transition(from: ApplicationStatus, to: ApplicationStatus) -> bool {
    from == to || allowed_transitions(from).contains(&to)
}

pub fn validate_transition(
    application: &ApplicationSnapshot,
    to: ApplicationStatus,
) -> Result<(), TransitionError> {
    let from = application.status;

    // re-applying the current state is always allowed
    if from == to {
        return Ok(());
    }

    if is_terminal(from) {
        return Err(TransitionError {
            code: TransitionCode::TerminalState,
            from,
            to,
            valid_next: Vec::new(),
        });
    }

    let valid = allowed_transitions(from);
    if !valid.contains(&to) {
        return Err(TransitionError {
            code: TransitionCode::InvalidTransition,
            from,
            to,
            valid_next: valid.to_vec(),
        });
    }

    if requires_payment(to) && application.order_id.is_none() {
        return Err(TransitionError {
            code: TransitionCode::PaymentRequired,
            from,
            to,
            valid_next: valid.to_vec(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(status: ApplicationStatus, order_id: Option<&str>) -> ApplicationSnapshot {
        ApplicationSnapshot {
            id: "app-1".to_string(),
            status,
            order_id: order_id.map(str::to_string),
            email: None,
        }
    }

    #[test]
    fn reflexive_transitions_are_valid() {
        for status in [AwaitingPayment, Cancelled, RenewalRejected, Completed] {
            assert!(validate_transition(&app(status, None), status).is_ok());
        }
    }

    #[test]
    fn terminal_states_reject_everything_else() {
        for terminal in [Cancelled, RenewalRejected] {
            let err = validate_transition(&app(terminal, Some("ord_1")), AwaitingPayment)
                .expect_err("terminal state must reject");
            assert_eq!(err.code, TransitionCode::TerminalState);
            assert!(err.valid_next.is_empty());
        }
    }

    #[test]
    fn payment_required_states_need_an_order() {
        let err = validate_transition(&app(AwaitingPayment, None), PaymentReceived)
            .expect_err("missing order id");
        assert_eq!(err.code, TransitionCode::PaymentRequired);

        assert!(validate_transition(&app(AwaitingPayment, Some("ord_1")), PaymentReceived).is_ok());
    }

    #[test]
    fn invalid_transition_reports_valid_next_states() {
        let err = validate_transition(&app(PermitReady, Some("ord_1")), AwaitingPayment)
            .expect_err("permit ready cannot go back to awaiting payment");
        assert_eq!(err.code, TransitionCode::InvalidTransition);
        assert_eq!(err.valid_next, vec![Completed, Expired]);
    }

    #[test]
    fn failed_payment_can_retry() {
        assert!(can_transition(PaymentFailed, AwaitingPayment));
        assert!(can_transition(PaymentFailed, Cancelled));
        assert!(!can_transition(PaymentFailed, PermitReady));
    }

    #[test]
    fn renewal_cycle() {
        assert!(can_transition(Expired, RenewalPending));
        assert!(can_transition(RenewalPending, RenewalApproved));
        assert!(can_transition(RenewalPending, RenewalRejected));
        assert!(can_transition(RenewalApproved, GeneratingPermit));
    }
}
