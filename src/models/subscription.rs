use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};

use super::payment::PaymentProvider;

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "subscription_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
    Pending,
}

impl SubscriptionStatus {
    /// Maps a provider lifecycle status onto the internal enum. Anything the
    /// table does not know lands on `Pending`.
    pub fn from_provider_status(status: &str) -> Self {
        match status {
            "active" | "trialing" => SubscriptionStatus::Active,
            "past_due" | "unpaid" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::PastDue => "PAST_DUE",
            SubscriptionStatus::Canceled => "CANCELED",
            SubscriptionStatus::Pending => "PENDING",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Canceled)
    }
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "billing_interval", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingInterval {
    Monthly,
    Annual,
}

impl BillingInterval {
    /// Parses the `billingInterval` metadata value (`MONTHLY` / `ANNUAL`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MONTHLY" => Some(BillingInterval::Monthly),
            "ANNUAL" | "YEARLY" => Some(BillingInterval::Annual),
            _ => None,
        }
    }

    /// Parses a Stripe price `recurring.interval`.
    pub fn from_recurring_interval(value: &str) -> Option<Self> {
        match value {
            "month" => Some(BillingInterval::Monthly),
            "year" => Some(BillingInterval::Annual),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Monthly => "MONTHLY",
            BillingInterval::Annual => "ANNUAL",
        }
    }

    /// Period granted by a one-off (crypto) subscription payment.
    pub fn period_length(&self) -> Duration {
        match self {
            BillingInterval::Monthly => Duration::days(30),
            BillingInterval::Annual => Duration::days(365),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub provider_subscription_id: String,
    pub provider: PaymentProvider,
    pub billing_interval: BillingInterval,
    pub current_period_start: OffsetDateTime,
    pub current_period_end: OffsetDateTime,
    pub canceled_at: Option<OffsetDateTime>,
    /// `created` of the newest provider event applied to this row.
    pub last_event_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Subscription {
    /// Whether `upsert` may overwrite this row. Canceled rows never change. A later
    /// period end always wins; within the same period the newer event wins, and
    /// an event without a timestamp is let through.
    pub fn is_superseded_by(&self, upsert: &SubscriptionUpsert) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if self.current_period_end != upsert.current_period_end {
            return self.current_period_end < upsert.current_period_end;
        }
        match (self.last_event_at, upsert.event_at) {
            (Some(stored), Some(incoming)) => stored <= incoming,
            _ => true,
        }
    }
}

/// Desired state of a subscription row, keyed by `provider_subscription_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpsert {
    pub user_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub provider_subscription_id: String,
    pub provider: PaymentProvider,
    pub billing_interval: BillingInterval,
    pub current_period_start: OffsetDateTime,
    pub current_period_end: OffsetDateTime,
    pub canceled_at: Option<OffsetDateTime>,
    pub event_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// The stored row is newer than the event, or already canceled.
    Stale,
}
