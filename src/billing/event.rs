//! Typed view of the Stripe payload objects the reconciler reads.
//!
//! Only the fields we act on are modeled. Expandable references (`customer`,
//! `payment_intent`, `subscription`) arrive either as an id string or as the
//! expanded object; both collapse to the id.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::models::subscription::BillingInterval;
use crate::services::stripe::StripeEvent;

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub payment_intent: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub customer: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "metadata_map")]
    pub metadata: BTreeMap<String, String>,
}

impl CheckoutSessionObject {
    /// The payment intent is the settlement id; sessions without one (free or
    /// subscription checkouts) fall back to the session id.
    pub fn transaction_id(&self) -> &str {
        self.payment_intent.as_deref().unwrap_or(&self.id)
    }

    pub fn is_unpaid(&self) -> bool {
        self.payment_status.as_deref() == Some("unpaid")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    #[serde(default, deserialize_with = "expandable_id")]
    pub customer: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub canceled_at: Option<i64>,
    #[serde(default, deserialize_with = "metadata_map")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub items: Option<SubscriptionItems>,
    /// `created` of the enclosing event, not part of the object itself.
    #[serde(skip)]
    pub event_created: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    #[serde(default)]
    pub price: Option<PriceObject>,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceObject {
    #[serde(default)]
    pub recurring: Option<RecurringObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecurringObject {
    pub interval: String,
}

impl SubscriptionObject {
    fn first_item(&self) -> Option<&SubscriptionItem> {
        self.items.as_ref().and_then(|items| items.data.first())
    }

    /// Interval of the first price, used when metadata carries none.
    pub fn item_interval(&self) -> Option<BillingInterval> {
        self.first_item()
            .and_then(|item| item.price.as_ref())
            .and_then(|price| price.recurring.as_ref())
            .and_then(|recurring| BillingInterval::from_recurring_interval(&recurring.interval))
    }

    /// Newer API versions only report the period on subscription items.
    pub fn period(&self) -> Option<(i64, i64)> {
        let start = self
            .current_period_start
            .or_else(|| self.first_item().and_then(|i| i.current_period_start))?;
        let end = self
            .current_period_end
            .or_else(|| self.first_item().and_then(|i| i.current_period_end))?;
        Some((start, end))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    #[serde(default, deserialize_with = "expandable_id")]
    pub subscription: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub customer: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(skip)]
    pub event_created: Option<i64>,
}

impl InvoiceObject {
    pub fn transaction_id(&self) -> &str {
        self.payment_intent.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargeObject {
    pub id: String,
    #[serde(default, deserialize_with = "expandable_id")]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub refunded: bool,
    #[serde(default)]
    pub amount_refunded: i64,
}

impl ChargeObject {
    pub fn transaction_id(&self) -> &str {
        self.payment_intent.as_deref().unwrap_or(&self.id)
    }
}

/// The Stripe events the reconciler acts on.
#[derive(Debug, Clone)]
pub enum BillingEvent {
    CheckoutCompleted(CheckoutSessionObject),
    SubscriptionChanged(SubscriptionObject),
    SubscriptionDeleted(SubscriptionObject),
    InvoicePaid(InvoiceObject),
    InvoicePaymentFailed(InvoiceObject),
    ChargeRefunded(ChargeObject),
    Unhandled(String),
}

impl BillingEvent {
    pub fn from_stripe(event: &StripeEvent) -> Result<Self, serde_json::Error> {
        let object = || {
            event
                .payload
                .get("data")
                .and_then(|d| d.get("object"))
                .cloned()
                .unwrap_or(Value::Null)
        };

        let created = event.payload.get("created").and_then(Value::as_i64);
        let subscription = || -> Result<SubscriptionObject, serde_json::Error> {
            let mut sub: SubscriptionObject = serde_json::from_value(object())?;
            sub.event_created = created;
            Ok(sub)
        };
        let invoice = || -> Result<InvoiceObject, serde_json::Error> {
            let mut invoice: InvoiceObject = serde_json::from_value(object())?;
            invoice.event_created = created;
            Ok(invoice)
        };

        let parsed = match event.r#type.as_str() {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                BillingEvent::CheckoutCompleted(serde_json::from_value(object())?)
            }
            "customer.subscription.created" | "customer.subscription.updated" => {
                BillingEvent::SubscriptionChanged(subscription()?)
            }
            "customer.subscription.deleted" => {
                BillingEvent::SubscriptionDeleted(subscription()?)
            }
            "invoice.paid" | "invoice.payment_succeeded" => {
                BillingEvent::InvoicePaid(invoice()?)
            }
            "invoice.payment_failed" => {
                BillingEvent::InvoicePaymentFailed(invoice()?)
            }
            "charge.refunded" => BillingEvent::ChargeRefunded(serde_json::from_value(object())?),
            other => BillingEvent::Unhandled(other.to_string()),
        };
        Ok(parsed)
    }
}

fn expandable_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Object(obj)) => obj
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    })
}

/// Stripe metadata values are always strings; anything else is dropped.
fn metadata_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    if let Some(Value::Object(map)) = value {
        for (key, val) in map {
            if let Value::String(s) = val {
                out.insert(key, s);
            }
        }
    }
    Ok(out)
}
