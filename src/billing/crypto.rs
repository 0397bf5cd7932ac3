//! Crypto processor IPN lifecycle.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{info, warn};

use super::entitlements::{apply_checkout, CompletedCheckout};
use super::{Outcome, ReconcileError};
use crate::models::{
    money::Amount,
    payment::{PaymentProvider, PaymentStatus},
    purchase::{MetadataError, Purchase},
};
use crate::services::crypto::CryptoPaymentNotification;
use crate::state::AppState;

const ORDER_DESCRIPTION: &str = "order_description";

/// The purchase metadata bag travels JSON-encoded in `order_description`.
pub fn order_metadata(
    notification: &CryptoPaymentNotification,
) -> Result<BTreeMap<String, String>, MetadataError> {
    let raw = notification
        .order_description
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or(MetadataError::Missing(ORDER_DESCRIPTION))?;

    let parsed: serde_json::Map<String, Value> =
        serde_json::from_str(raw).map_err(|_| MetadataError::Invalid {
            field: ORDER_DESCRIPTION,
            value: raw.to_string(),
        })?;

    Ok(parsed
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key, s)),
            Value::Number(n) => Some((key, n.to_string())),
            _ => None,
        })
        .collect())
}

pub async fn handle_notification(
    state: &AppState,
    notification: &CryptoPaymentNotification,
) -> Result<Outcome, ReconcileError> {
    let payment_id = notification.payment_id.as_str();
    match notification.payment_status.as_str() {
        "finished" => settle(state, notification).await,
        "failed" | "expired" => {
            set_status(state, payment_id, PaymentStatus::Failed).await
        }
        "refunded" => set_status(state, payment_id, PaymentStatus::Refunded).await,
        "partially_paid" => {
            warn!(
                %payment_id,
                actually_paid = ?notification.actually_paid,
                pay_amount = ?notification.pay_amount,
                "crypto payment underpaid; no entitlement granted"
            );
            Ok(Outcome::Ignored)
        }
        status => {
            info!(%payment_id, %status, "crypto payment pending");
            Ok(Outcome::Ignored)
        }
    }
}

async fn settle(
    state: &AppState,
    notification: &CryptoPaymentNotification,
) -> Result<Outcome, ReconcileError> {
    let purchase = Purchase::from_metadata(&order_metadata(notification)?)?;
    let amount = Amount::from_major(notification.price_amount, &notification.price_currency)
        .ok_or_else(|| {
            ReconcileError::Unresolvable(format!(
                "invalid price amount {} {}",
                notification.price_amount, notification.price_currency
            ))
        })?;

    let crypto_paid = match (notification.crypto_amount(), notification.pay_currency.as_ref()) {
        (Some(paid), Some(currency)) => Some((paid, currency.clone())),
        _ => None,
    };

    apply_checkout(
        state,
        CompletedCheckout {
            provider: PaymentProvider::Crypto,
            transaction_id: notification.payment_id.clone(),
            amount,
            purchase,
            crypto_paid,
        },
    )
    .await
}

async fn set_status(
    state: &AppState,
    payment_id: &str,
    status: PaymentStatus,
) -> Result<Outcome, ReconcileError> {
    if state
        .payments
        .update_payment_status(PaymentProvider::Crypto, payment_id, status)
        .await?
    {
        info!(%payment_id, status = status.as_str(), "crypto payment status updated");
        Ok(Outcome::Applied)
    } else {
        info!(%payment_id, status = status.as_str(), "no recorded payment for crypto status change");
        Ok(Outcome::Ignored)
    }
}
