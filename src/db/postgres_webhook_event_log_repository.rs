use crate::db::webhook_event_log_repository::WebhookEventLogRepository;
use crate::models::payment::PaymentProvider;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres};

pub struct PostgresWebhookEventLogRepository {
    pub pool: PgPool,
}

#[async_trait]
impl WebhookEventLogRepository for PostgresWebhookEventLogRepository {
    async fn has_processed_event(
        &self,
        provider: PaymentProvider,
        event_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let exists = sqlx::query_scalar::<Postgres, i32>(
            "SELECT 1 FROM webhook_event_log WHERE provider = $1 AND event_id = $2",
        )
        .bind(provider)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?
        .is_some();

        Ok(exists)
    }

    async fn record_event(
        &self,
        provider: PaymentProvider,
        event_id: &str,
        event_type: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query::<Postgres>(
            r#"
            INSERT INTO webhook_event_log (provider, event_id, event_type)
            VALUES ($1, $2, $3)
            ON CONFLICT (provider, event_id) DO NOTHING
            "#,
        )
        .bind(provider)
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
