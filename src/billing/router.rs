use tracing::info;

use super::event::BillingEvent;
use super::{crypto, entitlements, subscriptions, Outcome, ReconcileError};
use crate::services::crypto::CryptoPaymentNotification;
use crate::services::stripe::StripeEvent;
use crate::state::AppState;

/// Sends a verified Stripe event to its single handler.
pub async fn dispatch_stripe(
    state: &AppState,
    event: &StripeEvent,
) -> Result<Outcome, ReconcileError> {
    let parsed = BillingEvent::from_stripe(event).map_err(|err| {
        ReconcileError::Unresolvable(format!("malformed {} payload: {err}", event.r#type))
    })?;

    match parsed {
        BillingEvent::CheckoutCompleted(session) => {
            entitlements::handle_stripe_checkout(state, &session).await
        }
        BillingEvent::SubscriptionChanged(sub) => subscriptions::sync_subscription(state, &sub).await,
        BillingEvent::SubscriptionDeleted(sub) => {
            subscriptions::cancel_subscription(state, &sub).await
        }
        BillingEvent::InvoicePaid(invoice) => {
            subscriptions::record_invoice_payment(state, &invoice).await
        }
        BillingEvent::InvoicePaymentFailed(invoice) => {
            subscriptions::mark_past_due(state, &invoice).await
        }
        BillingEvent::ChargeRefunded(charge) => subscriptions::refund_charge(state, &charge).await,
        BillingEvent::Unhandled(event_type) => {
            info!(%event_type, event_id = %event.id, "unhandled stripe event");
            Ok(Outcome::Ignored)
        }
    }
}

pub async fn dispatch_crypto(
    state: &AppState,
    notification: &CryptoPaymentNotification,
) -> Result<Outcome, ReconcileError> {
    crypto::handle_notification(state, notification).await
}
