use async_trait::async_trait;
use time::OffsetDateTime;

use crate::models::{
    plan::Plan,
    subscription::{Subscription, SubscriptionUpsert, UpsertOutcome},
};

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn find_plan_by_name(&self, name: &str) -> Result<Option<Plan>, sqlx::Error>;

    async fn find_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, sqlx::Error>;

    /// Creates or updates the row keyed by `provider_subscription_id`. Existing rows
    /// only move forward (see [`Subscription::is_superseded_by`]); otherwise `Stale`.
    async fn upsert_subscription(
        &self,
        upsert: &SubscriptionUpsert,
    ) -> Result<UpsertOutcome, sqlx::Error>;

    async fn mark_canceled(
        &self,
        provider_subscription_id: &str,
        canceled_at: OffsetDateTime,
    ) -> Result<bool, sqlx::Error>;

    /// Sets PAST_DUE and advances `last_event_at`, nothing else. Canceled rows are
    /// left alone.
    async fn mark_past_due(
        &self,
        provider_subscription_id: &str,
        event_at: Option<OffsetDateTime>,
    ) -> Result<bool, sqlx::Error>;
}
