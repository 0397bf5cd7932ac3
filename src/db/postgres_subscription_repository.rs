use crate::db::subscription_repository::SubscriptionRepository;
use crate::models::{
    plan::Plan,
    subscription::{Subscription, SubscriptionUpsert, UpsertOutcome},
};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;

pub struct PostgresSubscriptionRepository {
    pub pool: PgPool,
}

/// Upsert shared with the payment repository, which runs it inside its own
/// transaction for one-off subscription purchases.
pub(crate) async fn upsert_subscription_on(
    conn: &mut PgConnection,
    upsert: &SubscriptionUpsert,
) -> Result<UpsertOutcome, sqlx::Error> {
    // xmax = 0 only for freshly inserted tuples
    let inserted = sqlx::query_scalar::<_, bool>(
        r#"
        INSERT INTO subscriptions (
            id,
            user_id,
            plan_id,
            status,
            provider_subscription_id,
            provider,
            billing_interval,
            current_period_start,
            current_period_end,
            canceled_at,
            last_event_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (provider_subscription_id) DO UPDATE SET
            user_id = EXCLUDED.user_id,
            plan_id = EXCLUDED.plan_id,
            status = EXCLUDED.status,
            billing_interval = EXCLUDED.billing_interval,
            current_period_start = EXCLUDED.current_period_start,
            current_period_end = EXCLUDED.current_period_end,
            canceled_at = COALESCE(EXCLUDED.canceled_at, subscriptions.canceled_at),
            last_event_at = COALESCE(EXCLUDED.last_event_at, subscriptions.last_event_at),
            updated_at = now()
        WHERE subscriptions.status <> 'CANCELED'
          AND (
                subscriptions.current_period_end < EXCLUDED.current_period_end
             OR (
                    subscriptions.current_period_end = EXCLUDED.current_period_end
                AND (
                        subscriptions.last_event_at IS NULL
                     OR EXCLUDED.last_event_at IS NULL
                     OR subscriptions.last_event_at <= EXCLUDED.last_event_at
                    )
                )
              )
        RETURNING (xmax = 0) AS inserted
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&upsert.user_id)
    .bind(&upsert.plan_id)
    .bind(upsert.status)
    .bind(&upsert.provider_subscription_id)
    .bind(upsert.provider)
    .bind(upsert.billing_interval)
    .bind(upsert.current_period_start)
    .bind(upsert.current_period_end)
    .bind(upsert.canceled_at)
    .bind(upsert.event_at)
    .fetch_optional(conn)
    .await?;

    Ok(match inserted {
        Some(true) => UpsertOutcome::Created,
        Some(false) => UpsertOutcome::Updated,
        None => UpsertOutcome::Stale,
    })
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn find_plan_by_name(&self, name: &str) -> Result<Option<Plan>, sqlx::Error> {
        sqlx::query_as::<_, Plan>("SELECT id, name FROM plans WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id,
                   user_id,
                   plan_id,
                   status,
                   provider_subscription_id,
                   provider,
                   billing_interval,
                   current_period_start,
                   current_period_end,
                   canceled_at,
                   last_event_at,
                   created_at,
                   updated_at
            FROM subscriptions
            WHERE provider_subscription_id = $1
            "#,
        )
        .bind(provider_subscription_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn upsert_subscription(
        &self,
        upsert: &SubscriptionUpsert,
    ) -> Result<UpsertOutcome, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        upsert_subscription_on(&mut conn, upsert).await
    }

    async fn mark_canceled(
        &self,
        provider_subscription_id: &str,
        canceled_at: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'CANCELED',
                canceled_at = COALESCE(canceled_at, $2),
                updated_at = now()
            WHERE provider_subscription_id = $1
            "#,
        )
        .bind(provider_subscription_id)
        .bind(canceled_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_past_due(
        &self,
        provider_subscription_id: &str,
        event_at: Option<OffsetDateTime>,
    ) -> Result<bool, sqlx::Error> {
        // GREATEST skips NULLs
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'PAST_DUE',
                last_event_at = GREATEST(last_event_at, $2),
                updated_at = now()
            WHERE provider_subscription_id = $1
              AND status <> 'CANCELED'
            "#,
        )
        .bind(provider_subscription_id)
        .bind(event_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
