use async_trait::async_trait;

use crate::models::payment::PaymentProvider;

/// Provider event ids that were fully handled, so redeliveries can short-circuit.
#[async_trait]
pub trait WebhookEventLogRepository: Send + Sync {
    async fn has_processed_event(
        &self,
        provider: PaymentProvider,
        event_id: &str,
    ) -> Result<bool, sqlx::Error>;

    async fn record_event(
        &self,
        provider: PaymentProvider,
        event_id: &str,
        event_type: &str,
    ) -> Result<(), sqlx::Error>;
}
