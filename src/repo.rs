use crate::domain::application::{ApplicationSnapshot, ApplicationStatus};
use crate::error::RepoError;

#[async_trait::async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn find_by_id(&self, application_id: &str)
        -> Result<Option<ApplicationSnapshot>, RepoError>;

    async fn find_by_order(&self, order_id: &str)
        -> Result<Option<ApplicationSnapshot>, RepoError>;

    async fn update_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
        meta: serde_json::Value,
    ) -> Result<(), RepoError>;
}

#[async_trait::async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn log_event(
        &self,
        application_id: &str,
        event_type: &str,
        data: serde_json::Value,
    ) -> Result<(), RepoError>;
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send_permit_ready(&self, application_id: &str, email: &str) -> Result<(), RepoError>;
}
