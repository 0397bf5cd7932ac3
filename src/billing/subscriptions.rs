//! Subscription lifecycle: status sync, cancellation, renewals and dunning.

use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, warn};

use super::entitlements::forward_to_accounting;
use super::event::{ChargeObject, InvoiceObject, SubscriptionObject};
use super::{Outcome, ReconcileError};
use crate::db::payment_repository::RecordOutcome;
use crate::models::{
    money::Amount,
    payment::{NewPayment, PaymentProvider, PaymentStatus, PaymentType},
    purchase::{META_BILLING_INTERVAL, META_PLAN_ID, META_USER_ID},
    subscription::{BillingInterval, SubscriptionStatus, SubscriptionUpsert, UpsertOutcome},
};
use crate::state::AppState;

fn timestamp(secs: i64) -> Result<OffsetDateTime, ReconcileError> {
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| ReconcileError::Unresolvable(format!("bad timestamp {secs}: {e}")))
}

fn meta<'a>(sub: &'a SubscriptionObject, key: &str) -> Option<&'a str> {
    sub.metadata
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

async fn resolve_user(
    state: &AppState,
    metadata_user: Option<&str>,
    customer: Option<&str>,
) -> Result<Option<String>, ReconcileError> {
    if let Some(user_id) = metadata_user {
        return Ok(Some(user_id.to_string()));
    }
    match customer {
        Some(customer_id) => Ok(state
            .users
            .find_user_id_by_stripe_customer_id(customer_id)
            .await?),
        None => Ok(None),
    }
}

fn event_time(secs: Option<i64>) -> Result<Option<OffsetDateTime>, ReconcileError> {
    secs.map(timestamp).transpose()
}

/// Resolves user, plan, interval and period for a Stripe subscription object.
async fn subscription_upsert(
    state: &AppState,
    sub: &SubscriptionObject,
    status: SubscriptionStatus,
) -> Result<SubscriptionUpsert, ReconcileError> {
    let user_id = resolve_user(state, meta(sub, META_USER_ID), sub.customer.as_deref())
        .await?
        .ok_or_else(|| {
            ReconcileError::Unresolvable(format!("no user for subscription {}", sub.id))
        })?;

    let plan_name = meta(sub, META_PLAN_ID).ok_or_else(|| {
        ReconcileError::Unresolvable(format!("subscription {} has no plan", sub.id))
    })?;
    let plan = state
        .subscriptions
        .find_plan_by_name(plan_name)
        .await?
        .ok_or_else(|| ReconcileError::Unresolvable(format!("unknown plan `{plan_name}`")))?;

    let interval = meta(sub, META_BILLING_INTERVAL)
        .and_then(BillingInterval::parse)
        .or_else(|| sub.item_interval())
        .ok_or_else(|| {
            ReconcileError::Unresolvable(format!("subscription {} has no billing interval", sub.id))
        })?;

    let (start, end) = sub.period().ok_or_else(|| {
        ReconcileError::Unresolvable(format!("subscription {} has no billing period", sub.id))
    })?;

    let canceled_at = match (status, sub.canceled_at) {
        (SubscriptionStatus::Canceled, Some(ts)) => Some(timestamp(ts)?),
        (SubscriptionStatus::Canceled, None) => Some(OffsetDateTime::now_utc()),
        _ => None,
    };

    Ok(SubscriptionUpsert {
        user_id,
        plan_id: plan.id,
        status,
        provider_subscription_id: sub.id.clone(),
        provider: PaymentProvider::Stripe,
        billing_interval: interval,
        current_period_start: timestamp(start)?,
        current_period_end: timestamp(end)?,
        canceled_at,
        event_at: event_time(sub.event_created)?,
    })
}

/// `customer.subscription.created` / `customer.subscription.updated`.
pub async fn sync_subscription(
    state: &AppState,
    sub: &SubscriptionObject,
) -> Result<Outcome, ReconcileError> {
    let status = SubscriptionStatus::from_provider_status(&sub.status);
    let upsert = subscription_upsert(state, sub, status).await?;

    match state.subscriptions.upsert_subscription(&upsert).await? {
        UpsertOutcome::Created | UpsertOutcome::Updated => {
            info!(
                subscription_id = %sub.id,
                user_id = %upsert.user_id,
                status = status.as_str(),
                "subscription synced"
            );
            Ok(Outcome::Applied)
        }
        UpsertOutcome::Stale => {
            info!(subscription_id = %sub.id, "ignoring out-of-order subscription update");
            Ok(Outcome::Stale)
        }
    }
}

/// `customer.subscription.deleted`. A deletion that overtakes the creation
/// inserts the row as CANCELED, so the late create/update comes back stale.
pub async fn cancel_subscription(
    state: &AppState,
    sub: &SubscriptionObject,
) -> Result<Outcome, ReconcileError> {
    let canceled_at = match sub.canceled_at {
        Some(ts) => timestamp(ts)?,
        None => OffsetDateTime::now_utc(),
    };
    if state
        .subscriptions
        .mark_canceled(&sub.id, canceled_at)
        .await?
    {
        info!(subscription_id = %sub.id, "subscription canceled");
        return Ok(Outcome::Applied);
    }

    let mut upsert = subscription_upsert(state, sub, SubscriptionStatus::Canceled).await?;
    upsert.canceled_at = Some(canceled_at);
    match state.subscriptions.upsert_subscription(&upsert).await? {
        UpsertOutcome::Created | UpsertOutcome::Updated => {
            info!(
                subscription_id = %sub.id,
                user_id = %upsert.user_id,
                "cancellation arrived first; stored as canceled"
            );
            Ok(Outcome::Applied)
        }
        UpsertOutcome::Stale => Ok(Outcome::Stale),
    }
}

/// `invoice.payment_failed`: dunning only touches the status.
pub async fn mark_past_due(
    state: &AppState,
    invoice: &InvoiceObject,
) -> Result<Outcome, ReconcileError> {
    let Some(subscription_id) = invoice.subscription.as_deref() else {
        info!(invoice_id = %invoice.id, "failed invoice without subscription");
        return Ok(Outcome::Ignored);
    };
    let event_at = event_time(invoice.event_created)?;
    if state
        .subscriptions
        .mark_past_due(subscription_id, event_at)
        .await?
    {
        warn!(%subscription_id, invoice_id = %invoice.id, "subscription past due");
        Ok(Outcome::Applied)
    } else {
        info!(%subscription_id, "payment failure for unknown or canceled subscription");
        Ok(Outcome::Ignored)
    }
}

/// `invoice.paid`: records the renewal charge in the ledger.
pub async fn record_invoice_payment(
    state: &AppState,
    invoice: &InvoiceObject,
) -> Result<Outcome, ReconcileError> {
    let Some(subscription_id) = invoice.subscription.as_deref() else {
        info!(invoice_id = %invoice.id, "paid invoice without subscription");
        return Ok(Outcome::Ignored);
    };
    if invoice.amount_paid <= 0 {
        info!(invoice_id = %invoice.id, %subscription_id, "zero-amount invoice, nothing to record");
        return Ok(Outcome::Ignored);
    }

    let existing = state
        .subscriptions
        .find_by_provider_subscription_id(subscription_id)
        .await?;
    let user_id = match existing.as_ref() {
        Some(sub) => Some(sub.user_id.clone()),
        None => resolve_user(state, None, invoice.customer.as_deref()).await?,
    }
    .ok_or_else(|| {
        ReconcileError::Unresolvable(format!("no user for invoice {}", invoice.id))
    })?;

    let mut metadata = json!({
        "provider": PaymentProvider::Stripe.to_string(),
        "subscriptionId": subscription_id,
        "invoiceId": invoice.id,
    });
    if let Some(sub) = existing.as_ref() {
        metadata["planId"] = json!(sub.plan_id);
    }

    let payment = NewPayment {
        user_id,
        amount: Amount::from_minor(
            invoice.amount_paid,
            invoice.currency.as_deref().unwrap_or("usd"),
        ),
        status: PaymentStatus::Completed,
        provider: PaymentProvider::Stripe,
        provider_transaction_id: invoice.transaction_id().to_string(),
        payment_type: PaymentType::Subscription,
        metadata,
    };

    match state.payments.record_payment(payment).await? {
        RecordOutcome::Recorded(payment) => {
            info!(payment_id = %payment.id, %subscription_id, "subscription payment recorded");
            forward_to_accounting(state, &payment, None, None).await;
            Ok(Outcome::Applied)
        }
        RecordOutcome::Duplicate => Ok(Outcome::Duplicate),
    }
}

/// `charge.refunded`: only a full refund flips the ledger row.
pub async fn refund_charge(
    state: &AppState,
    charge: &ChargeObject,
) -> Result<Outcome, ReconcileError> {
    if !charge.refunded {
        info!(
            charge_id = %charge.id,
            amount_refunded = charge.amount_refunded,
            "partial refund left payment status unchanged"
        );
        return Ok(Outcome::Ignored);
    }
    let updated = state
        .payments
        .update_payment_status(
            PaymentProvider::Stripe,
            charge.transaction_id(),
            PaymentStatus::Refunded,
        )
        .await?;
    if updated {
        info!(charge_id = %charge.id, "payment refunded");
        Ok(Outcome::Applied)
    } else {
        info!(charge_id = %charge.id, "refund for unknown payment");
        Ok(Outcome::Ignored)
    }
}
