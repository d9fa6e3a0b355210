use crate::circuit::breaker::BreakerRegistry;
use crate::circuit::state::BreakerSnapshot;
use crate::config::{PaymentConfig, Provider};
use crate::domain::application::{ApplicationSnapshot, ApplicationStatus};
use crate::domain::charge::{
    CardChargeRequest, ChargeOptions, ChargeResult, ChargeStatus, PaymentMethod, StatusResult,
    TransferChargeRequest, TransferResult, VoucherChargeRequest, VoucherResult,
};
use crate::domain::customer::{normalize_email, normalize_phone, Customer, CustomerRequest};
use crate::error::{decline_message, GatewayError, PaymentError, RepoError};
use crate::fraud::scorer::FraudScorer;
use crate::fraud::types::PaymentAttributes;
use crate::gateways::conekta::ConektaGateway;
use crate::gateways::stripe::StripeGateway;
use crate::gateways::{OrderMethod, OrderRequest, PaymentGateway, RiskAnnotation};
use crate::metrics::collector::{MetricsCollector, MetricsSnapshot};
use crate::metrics::event::{PaymentEvent, PaymentOutcome};
use crate::repo::{ApplicationRepository, Notifier, PaymentRepository};
use crate::retry::executor::{GatewayExecutor, GatewayFactory};
use crate::retry::policy::{self, RetryOptions};
use crate::states::validate_transition;
use crate::webhooks::event::{status_for_event, WebhookEvent};
use crate::webhooks::signature::WebhookVerifier;
use chrono::{Duration, Timelike, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

const SEEN_WEBHOOK_CAP: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed {
        application_id: String,
        status: ApplicationStatus,
    },
    Ignored {
        reason: &'static str,
    },
}

pub struct PaymentService {
    config: PaymentConfig,
    executor: GatewayExecutor,
    fraud: FraudScorer,
    verifier: WebhookVerifier,
    metrics: MetricsCollector,
    applications: Arc<dyn ApplicationRepository>,
    payments: Arc<dyn PaymentRepository>,
    notifier: Option<Arc<dyn Notifier>>,
    seen_webhooks: Mutex<HashSet<(String, String)>>,
}

impl PaymentService {
    pub fn new(
        config: PaymentConfig,
        applications: Arc<dyn ApplicationRepository>,
        payments: Arc<dyn PaymentRepository>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        let factory = factory_for(&config);
        Self::with_factory(config, factory, applications, payments, notifier)
    }

    // injection point for tests and alternative gateway wiring
    pub fn with_gateway(
        config: PaymentConfig,
        gateway: Arc<dyn PaymentGateway>,
        applications: Arc<dyn ApplicationRepository>,
        payments: Arc<dyn PaymentRepository>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        let factory: GatewayFactory = Arc::new(move || Ok(gateway.clone()));
        Self::with_factory(config, factory, applications, payments, notifier)
    }

    fn with_factory(
        config: PaymentConfig,
        factory: GatewayFactory,
        applications: Arc<dyn ApplicationRepository>,
        payments: Arc<dyn PaymentRepository>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        let breakers = Arc::new(BreakerRegistry::with_defaults());
        PaymentService {
            fraud: FraudScorer::new(config.fraud.clone()),
            verifier: WebhookVerifier::new(config.webhook_secret.clone()),
            metrics: MetricsCollector::default(),
            executor: GatewayExecutor::new(factory, breakers),
            config,
            applications,
            payments,
            notifier,
            seen_webhooks: Mutex::new(HashSet::new()),
        }
    }

    pub async fn create_customer(
        &self,
        request: CustomerRequest,
    ) -> Result<Customer, PaymentError> {
        require_nonempty("name", &request.name)?;
        require_email(&request.email)?;

        let normalized = CustomerRequest {
            name: request.name.trim().to_string(),
            email: normalize_email(&request.email),
            phone: Some(normalize_phone(
                request.phone.as_deref(),
                &self.config.default_phone,
            )),
        };

        let opts = RetryOptions::lookup(policy::customer_key(&normalized.email));
        self.ensure_customer(&normalized, &opts)
            .await
            .map_err(PaymentError::Gateway)
    }

    pub async fn charge_with_card(
        &self,
        request: CardChargeRequest,
        opts: ChargeOptions,
    ) -> Result<ChargeResult, PaymentError> {
        let started = Instant::now();
        require_nonempty("token", &request.token)?;
        require_nonempty("name", &request.name)?;
        require_email(&request.email)?;
        require_amount(request.amount)?;

        let currency = request
            .currency
            .clone()
            .unwrap_or_else(|| self.config.default_currency.clone());
        let email = normalize_email(&request.email);
        let phone = normalize_phone(request.phone.as_deref(), &self.config.default_phone);

        // fraud gate runs before any gateway traffic, customer creation
        // included
        let attributes = PaymentAttributes {
            amount: request.amount,
            currency: currency.clone(),
            card_bin: request.card_bin.clone(),
            hour_of_day: Some(Utc::now().hour()),
        };
        let mut device = opts.device.clone();
        if device.fingerprint.is_none() {
            device.fingerprint = request.device_fingerprint.clone();
        }
        let assessment = self.fraud.score(&attributes, &opts.user, &device);
        if assessment.block_transaction {
            tracing::warn!(
                application_id = %request.application_id,
                risk_score = assessment.risk_score,
                factors = ?assessment.risk_factors,
                "transaction blocked by risk scoring"
            );
            self.log_event(
                &request.application_id,
                "payment.blocked",
                json!({
                    "risk_score": assessment.risk_score,
                    "risk_factors": assessment.risk_factors,
                }),
            )
            .await;
            self.record(PaymentMethod::Card, request.amount, PaymentOutcome::Declined, started);
            return Ok(ChargeResult::failure(
                request.amount,
                &currency,
                "high_risk_transaction",
                "La transacción fue rechazada por motivos de seguridad.",
            ));
        }

        let customer_request = CustomerRequest {
            name: request.name.trim().to_string(),
            email: email.clone(),
            phone: Some(phone.clone()),
        };
        let customer_opts = RetryOptions::lookup(policy::customer_key(&email));
        let customer = match self.ensure_customer(&customer_request, &customer_opts).await {
            Ok(customer) => customer,
            Err(e) => {
                tracing::warn!(error = %e, "customer setup failed before charge");
                self.record(PaymentMethod::Card, request.amount, PaymentOutcome::Error, started);
                return Ok(ChargeResult::failure(
                    request.amount,
                    &currency,
                    e.error_code(),
                    e.user_message(),
                ));
            }
        };

        let idempotency_key = opts
            .idempotency_key
            .clone()
            .unwrap_or_else(|| policy::order_key(&request.reference_id, &request.token));
        let mut retry_opts = RetryOptions::charge(idempotency_key);
        if let Some(max_retries) = opts.max_retries {
            retry_opts.max_retries = max_retries;
        }

        let order_request = OrderRequest {
            reference_id: request.reference_id.clone(),
            application_id: request.application_id.clone(),
            amount: request.amount,
            currency: currency.clone(),
            method: OrderMethod::Card {
                token: request.token.clone(),
            },
            customer_id: customer.id.clone(),
            customer_name: customer_request.name.clone(),
            customer_email: email.clone(),
            customer_phone: phone,
            environment: self.config.environment.clone(),
            risk: assessment.flagged_for_review.then(|| RiskAnnotation {
                risk_score: assessment.risk_score,
                risk_factors: assessment.risk_factors.clone(),
            }),
        };

        let outcome = self
            .executor
            .execute("card_payment", &retry_opts, |gw, key| {
                let order_request = order_request.clone();
                async move { gw.create_order(&order_request, &key).await }
            })
            .await;

        match outcome {
            Ok(order) => {
                let status = self.map_charge_status(&order.status, PaymentMethod::Card);
                // a replayed or settled order can come back declined in the
                // body rather than as an error; both shapes are declines
                let declined = matches!(
                    status,
                    ApplicationStatus::PaymentFailed | ApplicationStatus::Cancelled
                );
                self.apply_status(
                    &request.application_id,
                    status,
                    Some(&order.order_id),
                    json!({
                        "order_id": order.order_id,
                        "charge_id": order.charge_id,
                        "payment_method": "card",
                    }),
                )
                .await?;
                self.log_event(
                    &request.application_id,
                    "payment.card_charged",
                    json!({
                        "order_id": order.order_id,
                        "provider_status": order.status.as_str(),
                        "amount": request.amount,
                    }),
                )
                .await;
                if status == ApplicationStatus::PaymentReceived {
                    self.advance_after_payment(&request.application_id, Some(&order.order_id))
                        .await;
                }
                let outcome = if declined {
                    PaymentOutcome::Declined
                } else {
                    PaymentOutcome::Success
                };
                self.record(PaymentMethod::Card, request.amount, outcome, started);
                Ok(ChargeResult {
                    success: !declined,
                    order_id: Some(order.order_id),
                    charge_id: order.charge_id,
                    payment_status: Some(status),
                    provider_status: Some(order.status.as_str().to_string()),
                    amount: request.amount,
                    currency,
                    error_code: declined.then(|| "card_declined".to_string()),
                    failure_message: declined
                        .then(|| decline_message("card_declined").to_string()),
                    flagged_for_review: assessment.flagged_for_review,
                })
            }
            Err(GatewayError::Declined { code, message }) => {
                tracing::info!(
                    application_id = %request.application_id,
                    code = %code,
                    provider_message = %message,
                    "card charge declined"
                );
                self.apply_status(
                    &request.application_id,
                    ApplicationStatus::PaymentFailed,
                    None,
                    json!({ "decline_code": code }),
                )
                .await?;
                self.log_event(
                    &request.application_id,
                    "payment.declined",
                    json!({ "decline_code": code }),
                )
                .await;
                self.record(PaymentMethod::Card, request.amount, PaymentOutcome::Declined, started);
                Ok(ChargeResult {
                    success: false,
                    order_id: None,
                    charge_id: None,
                    payment_status: Some(ApplicationStatus::PaymentFailed),
                    provider_status: Some("declined".to_string()),
                    amount: request.amount,
                    currency,
                    error_code: Some(code.clone()),
                    failure_message: Some(decline_message(&code).to_string()),
                    flagged_for_review: assessment.flagged_for_review,
                })
            }
            Err(e) => {
                tracing::warn!(
                    application_id = %request.application_id,
                    error = %e,
                    "card charge failed"
                );
                self.record(PaymentMethod::Card, request.amount, PaymentOutcome::Error, started);
                Ok(ChargeResult::failure(
                    request.amount,
                    &currency,
                    e.error_code(),
                    e.user_message(),
                ))
            }
        }
    }

    pub async fn charge_with_cash_voucher(
        &self,
        request: VoucherChargeRequest,
        opts: ChargeOptions,
    ) -> Result<VoucherResult, PaymentError> {
        let started = Instant::now();
        require_nonempty("name", &request.name)?;
        require_email(&request.email)?;
        require_amount(request.amount)?;

        let currency = request
            .currency
            .clone()
            .unwrap_or_else(|| self.config.default_currency.clone());
        let email = normalize_email(&request.email);
        let phone = normalize_phone(request.phone.as_deref(), &self.config.default_phone);
        let expires_at = Utc::now()
            + Duration::days(
                request
                    .expires_in_days
                    .unwrap_or(self.config.voucher_expiry_days),
            );

        let customer_request = CustomerRequest {
            name: request.name.trim().to_string(),
            email: email.clone(),
            phone: Some(phone.clone()),
        };
        let customer_opts = RetryOptions::lookup(policy::customer_key(&email));
        let customer = match self.ensure_customer(&customer_request, &customer_opts).await {
            Ok(customer) => customer,
            Err(e) => {
                self.record(PaymentMethod::OxxoCash, request.amount, PaymentOutcome::Error, started);
                return Ok(voucher_failure(request.amount, &currency, &e));
            }
        };

        let idempotency_key = opts
            .idempotency_key
            .clone()
            .unwrap_or_else(|| policy::oxxo_key(&request.reference_id));
        let mut retry_opts = RetryOptions::charge(idempotency_key);
        if let Some(max_retries) = opts.max_retries {
            retry_opts.max_retries = max_retries;
        }

        let order_request = OrderRequest {
            reference_id: request.reference_id.clone(),
            application_id: request.application_id.clone(),
            amount: request.amount,
            currency: currency.clone(),
            method: OrderMethod::OxxoCash { expires_at },
            customer_id: customer.id.clone(),
            customer_name: customer_request.name.clone(),
            customer_email: email,
            customer_phone: phone,
            environment: self.config.environment.clone(),
            risk: None,
        };

        let outcome = self
            .executor
            .execute("oxxo_payment", &retry_opts, |gw, key| {
                let order_request = order_request.clone();
                async move { gw.create_order(&order_request, &key).await }
            })
            .await;

        match outcome {
            Ok(order) => {
                let status = self.map_charge_status(&order.status, PaymentMethod::OxxoCash);
                self.apply_status(
                    &request.application_id,
                    status,
                    Some(&order.order_id),
                    json!({
                        "order_id": order.order_id,
                        "payment_method": "oxxo_cash",
                        "expires_at": expires_at,
                    }),
                )
                .await?;
                self.log_event(
                    &request.application_id,
                    "payment.oxxo_created",
                    json!({
                        "order_id": order.order_id,
                        "oxxo_reference": order.oxxo.as_ref().map(|o| o.reference.clone()),
                    }),
                )
                .await;
                self.record(PaymentMethod::OxxoCash, request.amount, PaymentOutcome::Success, started);

                let oxxo = order.oxxo;
                Ok(VoucherResult {
                    success: true,
                    order_id: Some(order.order_id),
                    oxxo_reference: oxxo.as_ref().map(|o| o.reference.clone()),
                    barcode_url: oxxo.as_ref().and_then(|o| o.barcode_url.clone()),
                    hosted_voucher_url: oxxo.as_ref().and_then(|o| o.hosted_voucher_url.clone()),
                    expires_at: oxxo.as_ref().and_then(|o| o.expires_at).or(Some(expires_at)),
                    payment_status: Some(status),
                    amount: request.amount,
                    currency,
                    error_code: None,
                    failure_message: None,
                })
            }
            Err(e) => {
                tracing::warn!(
                    application_id = %request.application_id,
                    error = %e,
                    "oxxo voucher creation failed"
                );
                self.record(PaymentMethod::OxxoCash, request.amount, PaymentOutcome::Error, started);
                Ok(voucher_failure(request.amount, &currency, &e))
            }
        }
    }

    pub async fn charge_with_bank_transfer(
        &self,
        request: TransferChargeRequest,
        opts: ChargeOptions,
    ) -> Result<TransferResult, PaymentError> {
        let started = Instant::now();
        require_nonempty("name", &request.name)?;
        require_email(&request.email)?;
        require_amount(request.amount)?;

        let currency = request
            .currency
            .clone()
            .unwrap_or_else(|| self.config.default_currency.clone());
        let email = normalize_email(&request.email);
        let phone = normalize_phone(request.phone.as_deref(), &self.config.default_phone);
        let expires_at = Utc::now() + Duration::days(self.config.voucher_expiry_days);

        let customer_request = CustomerRequest {
            name: request.name.trim().to_string(),
            email: email.clone(),
            phone: Some(phone.clone()),
        };
        let customer_opts = RetryOptions::lookup(policy::customer_key(&email));
        let customer = match self.ensure_customer(&customer_request, &customer_opts).await {
            Ok(customer) => customer,
            Err(e) => {
                self.record(PaymentMethod::Spei, request.amount, PaymentOutcome::Error, started);
                return Ok(transfer_failure(request.amount, &currency, &e));
            }
        };

        let idempotency_key = opts
            .idempotency_key
            .clone()
            .unwrap_or_else(|| policy::spei_key(&request.reference_id));
        let mut retry_opts = RetryOptions::charge(idempotency_key);
        if let Some(max_retries) = opts.max_retries {
            retry_opts.max_retries = max_retries;
        }

        let order_request = OrderRequest {
            reference_id: request.reference_id.clone(),
            application_id: request.application_id.clone(),
            amount: request.amount,
            currency: currency.clone(),
            method: OrderMethod::Spei { expires_at },
            customer_id: customer.id.clone(),
            customer_name: customer_request.name.clone(),
            customer_email: email,
            customer_phone: phone,
            environment: self.config.environment.clone(),
            risk: None,
        };

        let outcome = self
            .executor
            .execute("spei_payment", &retry_opts, |gw, key| {
                let order_request = order_request.clone();
                async move { gw.create_order(&order_request, &key).await }
            })
            .await;

        match outcome {
            Ok(order) => {
                let status = self.map_charge_status(&order.status, PaymentMethod::Spei);
                self.apply_status(
                    &request.application_id,
                    status,
                    Some(&order.order_id),
                    json!({
                        "order_id": order.order_id,
                        "payment_method": "spei",
                    }),
                )
                .await?;
                self.log_event(
                    &request.application_id,
                    "payment.spei_created",
                    json!({ "order_id": order.order_id }),
                )
                .await;
                self.record(PaymentMethod::Spei, request.amount, PaymentOutcome::Success, started);

                let spei = order.spei;
                Ok(TransferResult {
                    success: true,
                    order_id: Some(order.order_id),
                    clabe: spei.as_ref().and_then(|s| s.clabe.clone()),
                    spei_reference: spei.as_ref().and_then(|s| s.reference.clone()),
                    bank: spei.as_ref().and_then(|s| s.bank.clone()),
                    payment_status: Some(status),
                    amount: request.amount,
                    currency,
                    error_code: None,
                    failure_message: None,
                })
            }
            Err(e) => {
                tracing::warn!(
                    application_id = %request.application_id,
                    error = %e,
                    "spei reference creation failed"
                );
                self.record(PaymentMethod::Spei, request.amount, PaymentOutcome::Error, started);
                Ok(transfer_failure(request.amount, &currency, &e))
            }
        }
    }

    pub async fn check_status(
        &self,
        order_id: &str,
        method: PaymentMethod,
    ) -> Result<StatusResult, PaymentError> {
        let opts = RetryOptions::lookup(format!(
            "status-{}-{}",
            order_id,
            Utc::now().timestamp_millis()
        ));
        let order = self
            .executor
            .execute(method.operation_name(), &opts, |gw, _key| {
                let order_id = order_id.to_string();
                async move { gw.fetch_order(&order_id).await }
            })
            .await
            .map_err(PaymentError::Gateway)?;

        let status = self.map_charge_status(&order.status, order.payment_method);

        if let Some(application) = self.applications.find_by_order(order_id).await? {
            if application.status != status {
                let mut snapshot = application.clone();
                snapshot.order_id = snapshot.order_id.or_else(|| Some(order_id.to_string()));
                match validate_transition(&snapshot, status) {
                    Ok(()) => {
                        self.applications
                            .update_status(
                                &application.id,
                                status,
                                json!({ "source": "status_check", "order_id": order_id }),
                            )
                            .await?;
                        self.log_event(
                            &application.id,
                            "payment.status_checked",
                            json!({
                                "order_id": order_id,
                                "provider_status": order.status.as_str(),
                                "status": status,
                            }),
                        )
                        .await;
                        if status == ApplicationStatus::PaymentReceived {
                            self.advance_after_payment(&application.id, Some(order_id)).await;
                        }
                    }
                    Err(e) => {
                        // the application may have progressed past the payment
                        // lifecycle; report the derived status without forcing it
                        tracing::warn!(
                            application_id = %application.id,
                            code = e.code.as_str(),
                            "status check skipped stale transition"
                        );
                    }
                }
            }
        }

        Ok(StatusResult {
            order_id: order_id.to_string(),
            provider_status: order.status.as_str().to_string(),
            payment_status: status,
            paid: order.status == ChargeStatus::Paid,
        })
    }

    pub async fn handle_webhook(
        &self,
        signature: &str,
        raw_payload: &[u8],
    ) -> Result<WebhookOutcome, PaymentError> {
        if !self.verifier.verify(signature, raw_payload) {
            // reject silently: the caller responds as if processed
            return Ok(WebhookOutcome::Ignored {
                reason: "invalid_signature",
            });
        }

        let event = match WebhookEvent::parse(raw_payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "webhook payload is not a valid event");
                return Ok(WebhookOutcome::Ignored {
                    reason: "invalid_payload",
                });
            }
        };

        let Some(payload_status) = status_for_event(&event.event_type) else {
            return Ok(WebhookOutcome::Ignored {
                reason: "unhandled_event",
            });
        };

        let dedup_key = (event.order_id().to_string(), event.event_type.clone());
        if self
            .seen_webhooks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&dedup_key)
        {
            tracing::debug!(
                order_id = %event.order_id(),
                event_type = %event.event_type,
                "duplicate webhook delivery ignored"
            );
            return Ok(WebhookOutcome::Ignored {
                reason: "duplicate_delivery",
            });
        }

        // confirm against the gateway rather than trusting the payload body;
        // fall back to the signed payload if the provider is unreachable
        let confirm_opts = RetryOptions::lookup(format!(
            "webhook-{}-{}",
            event.order_id(),
            Utc::now().timestamp_millis()
        ));
        let target = match self
            .executor
            .execute("webhook_processing", &confirm_opts, |gw, _key| {
                let order_id = event.order_id().to_string();
                async move { gw.fetch_order(&order_id).await }
            })
            .await
        {
            Ok(order) => self.map_charge_status(&order.status, order.payment_method),
            Err(e) => {
                tracing::warn!(error = %e, "order confirmation failed, using signed payload");
                payload_status
            }
        };

        let application = match self.applications.find_by_order(event.order_id()).await? {
            Some(application) => Some(application),
            None => match event.application_id() {
                Some(id) => self.applications.find_by_id(id).await?,
                None => None,
            },
        };
        let Some(application) = application else {
            tracing::warn!(order_id = %event.order_id(), "webhook for unknown application");
            return Ok(WebhookOutcome::Ignored {
                reason: "unknown_application",
            });
        };

        if application.status == target {
            self.remember_webhook(dedup_key);
            return Ok(WebhookOutcome::Ignored {
                reason: "already_applied",
            });
        }

        let mut snapshot = application.clone();
        snapshot.order_id = snapshot
            .order_id
            .or_else(|| Some(event.order_id().to_string()));
        if let Err(e) = validate_transition(&snapshot, target) {
            tracing::warn!(
                application_id = %application.id,
                code = e.code.as_str(),
                from = application.status.as_str(),
                to = target.as_str(),
                "webhook transition rejected"
            );
            self.remember_webhook(dedup_key);
            return Ok(WebhookOutcome::Ignored {
                reason: "invalid_transition",
            });
        }

        self.applications
            .update_status(
                &application.id,
                target,
                json!({
                    "source": "webhook",
                    "event_type": event.event_type,
                    "order_id": event.order_id(),
                }),
            )
            .await?;
        self.log_event(
            &application.id,
            "webhook.processed",
            json!({
                "event_type": event.event_type,
                "order_id": event.order_id(),
                "status": target,
            }),
        )
        .await;
        self.remember_webhook(dedup_key);

        if target == ApplicationStatus::PaymentReceived {
            self.advance_after_payment(&application.id, Some(event.order_id()))
                .await;
        }

        Ok(WebhookOutcome::Processed {
            application_id: application.id,
            status: target,
        })
    }

    pub async fn mark_permit_ready(&self, application_id: &str) -> Result<(), PaymentError> {
        let Some(application) = self.applications.find_by_id(application_id).await? else {
            return Err(RepoError::NotFound(application_id.to_string()).into());
        };

        self.apply_status(
            application_id,
            ApplicationStatus::PermitReady,
            None,
            json!({ "source": "permit_pipeline" }),
        )
        .await?;
        self.log_event(application_id, "permit.ready", json!({})).await;

        if let (Some(notifier), Some(email)) = (&self.notifier, &application.email) {
            if let Err(e) = notifier.send_permit_ready(application_id, email).await {
                tracing::warn!(application_id, error = %e, "permit-ready notification failed");
            }
        }
        Ok(())
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn breaker_status(&self) -> Vec<BreakerSnapshot> {
        self.executor.breakers().snapshots()
    }

    async fn ensure_customer(
        &self,
        request: &CustomerRequest,
        opts: &RetryOptions,
    ) -> Result<Customer, GatewayError> {
        let found = self
            .executor
            .execute("customer_operations", opts, |gw, _key| {
                let email = request.email.clone();
                async move { gw.find_customer(&email).await }
            })
            .await?;
        if let Some(customer) = found {
            return Ok(customer);
        }

        let created = self
            .executor
            .execute("customer_operations", opts, |gw, key| {
                let request = request.clone();
                async move { gw.create_customer(&request, &key).await }
            })
            .await;

        match created {
            Ok(customer) => Ok(customer),
            // lost a creation race; the customer exists now, fetch it
            Err(GatewayError::AlreadyExists { .. }) => {
                let refetched = self
                    .executor
                    .execute("customer_operations", opts, |gw, _key| {
                        let email = request.email.clone();
                        async move { gw.find_customer(&email).await }
                    })
                    .await?;
                refetched.ok_or_else(|| {
                    GatewayError::InvalidResponse(
                        "provider reported an existing customer but lookup is empty".to_string(),
                    )
                })
            }
            Err(e) => Err(e),
        }
    }

    fn map_charge_status(&self, status: &ChargeStatus, method: PaymentMethod) -> ApplicationStatus {
        match status {
            ChargeStatus::Paid => ApplicationStatus::PaymentReceived,
            ChargeStatus::PendingPayment => match method {
                PaymentMethod::OxxoCash => ApplicationStatus::AwaitingOxxoPayment,
                _ if self.config.test_mode_settles_pending => ApplicationStatus::PaymentReceived,
                _ => ApplicationStatus::PaymentProcessing,
            },
            ChargeStatus::Declined | ChargeStatus::Expired => ApplicationStatus::PaymentFailed,
            ChargeStatus::Canceled => ApplicationStatus::Cancelled,
            ChargeStatus::Unknown(raw) => {
                tracing::warn!(provider_status = %raw, "unrecognized provider status");
                ApplicationStatus::PaymentProcessing
            }
        }
    }

    async fn apply_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
        order_id: Option<&str>,
        meta: serde_json::Value,
    ) -> Result<(), PaymentError> {
        let Some(application) = self.applications.find_by_id(application_id).await? else {
            return Err(RepoError::NotFound(application_id.to_string()).into());
        };

        if application.status == status {
            return Ok(());
        }

        let snapshot = ApplicationSnapshot {
            order_id: application
                .order_id
                .clone()
                .or_else(|| order_id.map(str::to_string)),
            ..application
        };
        validate_transition(&snapshot, status)?;

        self.applications
            .update_status(application_id, status, meta)
            .await?;
        Ok(())
    }

    async fn advance_after_payment(&self, application_id: &str, order_id: Option<&str>) {
        match self
            .apply_status(
                application_id,
                ApplicationStatus::GeneratingPermit,
                order_id,
                json!({ "source": "payment_confirmed" }),
            )
            .await
        {
            Ok(()) => {
                self.log_event(application_id, "permit.generation_started", json!({}))
                    .await;
            }
            Err(e) => {
                // the permit pipeline owns recovery from here
                tracing::warn!(application_id, error = %e, "could not start permit generation");
            }
        }
    }

    async fn log_event(&self, application_id: &str, event_type: &str, data: serde_json::Value) {
        if let Err(e) = self.payments.log_event(application_id, event_type, data).await {
            tracing::warn!(
                application_id,
                event_type,
                error = %e,
                "failed to log payment event"
            );
        }
    }

    fn record(
        &self,
        method: PaymentMethod,
        amount: f64,
        outcome: PaymentOutcome,
        started: Instant,
    ) {
        self.metrics.record(PaymentEvent::now(
            method,
            amount,
            outcome,
            started.elapsed().as_millis() as u64,
        ));
    }

    fn remember_webhook(&self, key: (String, String)) {
        let mut seen = self.seen_webhooks.lock().unwrap_or_else(|p| p.into_inner());
        if seen.len() >= SEEN_WEBHOOK_CAP {
            seen.clear();
        }
        seen.insert(key);
    }
}

fn factory_for(config: &PaymentConfig) -> GatewayFactory {
    let config = config.clone();
    Arc::new(move || match config.provider {
        Provider::Conekta => {
            if config.conekta_api_key.is_empty() {
                return Err(GatewayError::NotInitialized);
            }
            Ok(Arc::new(ConektaGateway::new(
                config.conekta_base_url.clone(),
                config.conekta_api_key.clone(),
                config.gateway_timeout_ms,
            )) as Arc<dyn PaymentGateway>)
        }
        Provider::Stripe => {
            if config.stripe_secret_key.is_empty() {
                return Err(GatewayError::NotInitialized);
            }
            Ok(Arc::new(StripeGateway::new(
                config.stripe_base_url.clone(),
                config.stripe_secret_key.clone(),
                config.gateway_timeout_ms,
            )) as Arc<dyn PaymentGateway>)
        }
    })
}

fn voucher_failure(amount: f64, currency: &str, e: &GatewayError) -> VoucherResult {
    VoucherResult {
        success: false,
        order_id: None,
        oxxo_reference: None,
        barcode_url: None,
        hosted_voucher_url: None,
        expires_at: None,
        payment_status: None,
        amount,
        currency: currency.to_string(),
        error_code: Some(e.error_code()),
        failure_message: Some(e.user_message()),
    }
}

fn transfer_failure(amount: f64, currency: &str, e: &GatewayError) -> TransferResult {
    TransferResult {
        success: false,
        order_id: None,
        clabe: None,
        spei_reference: None,
        bank: None,
        payment_status: None,
        amount,
        currency: currency.to_string(),
        error_code: Some(e.error_code()),
        failure_message: Some(e.user_message()),
    }
}

fn require_nonempty(field: &'static str, value: &str) -> Result<(), PaymentError> {
    if value.trim().is_empty() {
        return Err(PaymentError::validation(field, "is required"));
    }
    Ok(())
}

fn require_email(value: &str) -> Result<(), PaymentError> {
    if value.trim().is_empty() || !value.contains('@') {
        return Err(PaymentError::validation("email", "a valid email is required"));
    }
    Ok(())
}

fn require_amount(amount: f64) -> Result<(), PaymentError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(PaymentError::validation("amount", "must be greater than zero"));
    }
    Ok(())
}
