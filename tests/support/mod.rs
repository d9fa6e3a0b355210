use permit_payments::config::PaymentConfig;
use permit_payments::domain::application::{ApplicationSnapshot, ApplicationStatus};
use permit_payments::error::RepoError;
use permit_payments::gateways::mock::MockGateway;
use permit_payments::gateways::PaymentGateway;
use permit_payments::repo::{ApplicationRepository, Notifier, PaymentRepository};
use permit_payments::service::payment_service::PaymentService;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct InMemoryApplications {
    apps: Mutex<HashMap<String, ApplicationSnapshot>>,
}

impl InMemoryApplications {
    pub fn seed(&self, app: ApplicationSnapshot) {
        self.apps.lock().unwrap().insert(app.id.clone(), app);
    }

    pub fn status_of(&self, application_id: &str) -> Option<ApplicationStatus> {
        self.apps
            .lock()
            .unwrap()
            .get(application_id)
            .map(|a| a.status)
    }
}

#[async_trait::async_trait]
impl ApplicationRepository for InMemoryApplications {
    async fn find_by_id(
        &self,
        application_id: &str,
    ) -> Result<Option<ApplicationSnapshot>, RepoError> {
        Ok(self.apps.lock().unwrap().get(application_id).cloned())
    }

    async fn find_by_order(
        &self,
        order_id: &str,
    ) -> Result<Option<ApplicationSnapshot>, RepoError> {
        Ok(self
            .apps
            .lock()
            .unwrap()
            .values()
            .find(|a| a.order_id.as_deref() == Some(order_id))
            .cloned())
    }

    async fn update_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
        meta: serde_json::Value,
    ) -> Result<(), RepoError> {
        let mut apps = self.apps.lock().unwrap();
        let app = apps
            .get_mut(application_id)
            .ok_or_else(|| RepoError::NotFound(application_id.to_string()))?;
        app.status = status;
        if let Some(order_id) = meta.get("order_id").and_then(|v| v.as_str()) {
            app.order_id = Some(order_id.to_string());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPayments {
    pub events: Mutex<Vec<(String, String, serde_json::Value)>>,
}

impl InMemoryPayments {
    pub fn event_types(&self, application_id: &str) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| id == application_id)
            .map(|(_, t, _)| t.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl PaymentRepository for InMemoryPayments {
    async fn log_event(
        &self,
        application_id: &str,
        event_type: &str,
        data: serde_json::Value,
    ) -> Result<(), RepoError> {
        self.events.lock().unwrap().push((
            application_id.to_string(),
            event_type.to_string(),
            data,
        ));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send_permit_ready(&self, application_id: &str, email: &str) -> Result<(), RepoError> {
        self.sent
            .lock()
            .unwrap()
            .push((application_id.to_string(), email.to_string()));
        Ok(())
    }
}

pub fn application(
    id: &str,
    status: ApplicationStatus,
    order_id: Option<&str>,
) -> ApplicationSnapshot {
    ApplicationSnapshot {
        id: id.to_string(),
        status,
        order_id: order_id.map(str::to_string),
        email: Some("maria@example.com".to_string()),
    }
}

pub struct Harness {
    pub service: PaymentService,
    pub gateway: Arc<MockGateway>,
    pub applications: Arc<InMemoryApplications>,
    pub payments: Arc<InMemoryPayments>,
    pub notifier: Arc<RecordingNotifier>,
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn harness(gateway: MockGateway, config: PaymentConfig) -> Harness {
    init_tracing();
    let gateway = Arc::new(gateway);
    let applications = Arc::new(InMemoryApplications::default());
    let payments = Arc::new(InMemoryPayments::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = PaymentService::with_gateway(
        config,
        gateway.clone() as Arc<dyn PaymentGateway>,
        applications.clone(),
        payments.clone(),
        Some(notifier.clone()),
    );
    Harness {
        service,
        gateway,
        applications,
        payments,
        notifier,
    }
}
