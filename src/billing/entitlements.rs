//! Entitlement writes for completed checkouts, shared by both providers.

use time::OffsetDateTime;
use tracing::{info, warn};

use super::event::CheckoutSessionObject;
use super::{Outcome, ReconcileError};
use crate::db::payment_repository::RecordOutcome;
use crate::models::{
    media_purchase::NewMediaPurchase,
    message::{MessagePaymentType, NewMessagePayment},
    money::Amount,
    payment::{NewPayment, Payment, PaymentProvider, PaymentStatus},
    purchase::Purchase,
    subscription::{SubscriptionStatus, SubscriptionUpsert},
};
use crate::services::accounting::AccountingRecord;
use crate::state::AppState;

/// A settled checkout from either provider, ready to be turned into entitlements.
#[derive(Debug, Clone)]
pub struct CompletedCheckout {
    pub provider: PaymentProvider,
    pub transaction_id: String,
    pub amount: Amount,
    pub purchase: Purchase,
    /// Amount and currency the payer actually sent, for crypto settlements.
    pub crypto_paid: Option<(f64, String)>,
}

pub async fn handle_stripe_checkout(
    state: &AppState,
    session: &CheckoutSessionObject,
) -> Result<Outcome, ReconcileError> {
    if session.is_unpaid() {
        info!(session_id = %session.id, "checkout completed without payment yet; waiting for async result");
        return Ok(Outcome::Ignored);
    }

    let purchase = Purchase::from_metadata(&session.metadata)?;

    if let Some(customer_id) = session.customer.as_deref() {
        if let Err(err) = state
            .users
            .set_user_stripe_customer_id(purchase.user_id(), customer_id)
            .await
        {
            warn!(?err, user_id = %purchase.user_id(), %customer_id, "failed to persist stripe customer id");
        }
    }

    let checkout = CompletedCheckout {
        provider: PaymentProvider::Stripe,
        transaction_id: session.transaction_id().to_string(),
        amount: Amount::from_minor(
            session.amount_total.unwrap_or(0),
            session.currency.as_deref().unwrap_or("usd"),
        ),
        purchase,
        crypto_paid: None,
    };
    apply_checkout(state, checkout).await
}

pub async fn apply_checkout(
    state: &AppState,
    checkout: CompletedCheckout,
) -> Result<Outcome, ReconcileError> {
    let CompletedCheckout {
        provider,
        transaction_id,
        amount,
        purchase,
        crypto_paid,
    } = checkout;

    let payment = NewPayment {
        user_id: purchase.user_id().to_string(),
        amount: amount.clone(),
        status: PaymentStatus::Completed,
        provider,
        provider_transaction_id: transaction_id.clone(),
        payment_type: purchase.payment_type(),
        metadata: purchase.audit_metadata(provider),
    };

    let mut product_name = None;
    let recorded = match &purchase {
        Purchase::Subscription {
            user_id,
            plan_name,
            billing_interval,
        } => {
            if provider == PaymentProvider::Stripe {
                info!(%user_id, %transaction_id, "subscription checkout completed; state follows subscription events");
                return Ok(Outcome::Ignored);
            }
            let plan_name = plan_name
                .as_deref()
                .ok_or_else(|| ReconcileError::Unresolvable("subscription without plan".into()))?;
            let plan = state
                .subscriptions
                .find_plan_by_name(plan_name)
                .await?
                .ok_or_else(|| ReconcileError::Unresolvable(format!("unknown plan `{plan_name}`")))?;
            let interval = billing_interval.ok_or_else(|| {
                ReconcileError::Unresolvable("subscription without billing interval".into())
            })?;

            let now = OffsetDateTime::now_utc();
            let upsert = SubscriptionUpsert {
                user_id: user_id.clone(),
                plan_id: plan.id.clone(),
                status: SubscriptionStatus::Active,
                provider_subscription_id: format!("crypto:{transaction_id}"),
                provider,
                billing_interval: interval,
                current_period_start: now,
                current_period_end: now + interval.period_length(),
                canceled_at: None,
                event_at: None,
            };
            product_name = Some(format!("{} ({})", plan.name, interval.as_str()));
            state
                .payments
                .record_subscription_purchase(upsert, payment)
                .await?
        }
        Purchase::Media { user_id, media_id } => {
            let media = NewMediaPurchase {
                user_id: user_id.clone(),
                media_id: media_id.clone(),
                amount: amount.clone(),
                provider,
                provider_transaction_id: transaction_id.clone(),
                status: PaymentStatus::Completed,
            };
            state.payments.record_media_purchase(media, payment).await?
        }
        Purchase::PpvUnlock {
            user_id,
            message_id,
        } => {
            if state.payments.find_message(message_id).await?.is_none() {
                return Err(ReconcileError::Unresolvable(format!(
                    "ppv message `{message_id}` not found"
                )));
            }
            let unlock = NewMessagePayment {
                message_id: message_id.clone(),
                user_id: user_id.clone(),
                payment_type: MessagePaymentType::PpvUnlock,
                amount: amount.clone(),
                status: PaymentStatus::Completed,
                provider,
            };
            state.payments.record_ppv_unlock(unlock, payment).await?
        }
        Purchase::Tip {
            user_id,
            message_id,
            ..
        } => {
            let mut tip = None;
            if let Some(message_id) = message_id {
                if state.payments.find_message(message_id).await?.is_some() {
                    tip = Some(NewMessagePayment {
                        message_id: message_id.clone(),
                        user_id: user_id.clone(),
                        payment_type: MessagePaymentType::Tip,
                        amount: amount.clone(),
                        status: PaymentStatus::Completed,
                        provider,
                    });
                } else {
                    warn!(%user_id, %message_id, "tipped message not found; recording payment only");
                }
            }
            state.payments.record_tip(tip, payment).await?
        }
    };

    match recorded {
        RecordOutcome::Recorded(payment) => {
            info!(
                payment_id = %payment.id,
                user_id = %payment.user_id,
                kind = purchase.kind(),
                %provider,
                "checkout reconciled"
            );
            forward_to_accounting(state, &payment, product_name, crypto_paid).await;
            Ok(Outcome::Applied)
        }
        RecordOutcome::Duplicate => {
            info!(%provider, %transaction_id, "checkout already reconciled");
            Ok(Outcome::Duplicate)
        }
    }
}

/// Hands a freshly recorded payment to the accounting forwarder. Never fails.
pub async fn forward_to_accounting(
    state: &AppState,
    payment: &Payment,
    product_name: Option<String>,
    crypto_paid: Option<(f64, String)>,
) {
    let email = match state.users.find_user_by_id(&payment.user_id).await {
        Ok(Some(user)) => Some(user.email),
        Ok(None) => {
            warn!(user_id = %payment.user_id, "no user email for accounting record");
            None
        }
        Err(err) => {
            warn!(?err, user_id = %payment.user_id, "failed to load user for accounting record");
            None
        }
    };

    let mut record = AccountingRecord::for_payment(payment, email, product_name);
    if let Some((amount, currency)) = crypto_paid {
        record = record.with_crypto(amount, &currency);
    }
    state.accounting.forward(record);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::test_support::harness;
    use crate::db::mock_db::MockDb;
    use crate::models::payment::PaymentType;
    use crate::models::subscription::BillingInterval;
    use std::collections::BTreeMap;

    fn session(id: &str, intent: &str, amount: i64, meta: &[(&str, &str)]) -> CheckoutSessionObject {
        CheckoutSessionObject {
            id: id.into(),
            payment_status: Some("paid".into()),
            payment_intent: Some(intent.into()),
            customer: Some("cus_1".into()),
            amount_total: Some(amount),
            currency: Some("usd".into()),
            metadata: meta
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[tokio::test]
    async fn media_purchase_writes_one_purchase_and_one_payment() {
        let h = harness(MockDb::default().with_user("u1", "fan@example.com"));
        let s = session(
            "cs_1",
            "pi_1",
            1299,
            &[("userId", "u1"), ("type", "media_purchase"), ("mediaId", "media_9")],
        );

        let outcome = handle_stripe_checkout(&h.state, &s).await.unwrap();
        assert_eq!(outcome, Outcome::Applied);

        let store = h.db.snapshot();
        assert_eq!(store.media_purchases.len(), 1);
        assert_eq!(store.media_purchases[0].media_id, "media_9");
        assert_eq!(store.media_purchases[0].amount_minor, 1299);
        assert_eq!(store.payments.len(), 1);
        assert_eq!(store.payments[0].payment_type, PaymentType::MediaPurchase);
        assert_eq!(store.payments[0].provider_transaction_id, "pi_1");
        assert_eq!(store.payments[0].amount().major(), 12.99);
        assert_eq!(store.payments[0].metadata["mediaId"], "media_9");
        assert_eq!(
            store.users[0].stripe_customer_id.as_deref(),
            Some("cus_1")
        );
    }

    #[tokio::test]
    async fn ppv_unlock_appends_payer_once_across_replays() {
        let h = harness(
            MockDb::default()
                .with_user("u1", "fan@example.com")
                .with_message("m1", "creator"),
        );
        let s = session(
            "cs_1",
            "pi_1",
            300,
            &[("userId", "u1"), ("type", "ppv_unlock"), ("messageId", "m1")],
        );

        assert_eq!(handle_stripe_checkout(&h.state, &s).await.unwrap(), Outcome::Applied);
        assert_eq!(handle_stripe_checkout(&h.state, &s).await.unwrap(), Outcome::Duplicate);

        let message = h.db.message("m1").unwrap();
        assert_eq!(message.unlocked_by.0, vec!["u1".to_string()]);
        let store = h.db.snapshot();
        assert_eq!(store.message_payments.len(), 1);
        assert_eq!(store.payments.len(), 1);
        assert_eq!(h.accounting.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ppv_unlock_for_missing_message_is_recoverable() {
        let h = harness(MockDb::default().with_user("u1", "fan@example.com"));
        let s = session(
            "cs_1",
            "pi_1",
            300,
            &[("userId", "u1"), ("type", "ppv_unlock"), ("messageId", "gone")],
        );

        let err = handle_stripe_checkout(&h.state, &s).await.unwrap_err();
        assert!(err.is_recoverable());
        assert!(h.db.snapshot().payments.is_empty());
    }

    #[tokio::test]
    async fn tip_with_message_bumps_total_and_forwards_accounting() {
        let h = harness(
            MockDb::default()
                .with_user("u1", "fan@example.com")
                .with_message("m1", "u2"),
        );
        let s = session(
            "cs_tip",
            "pi_tip",
            500,
            &[
                ("userId", "u1"),
                ("type", "tip"),
                ("messageId", "m1"),
                ("recipientId", "u2"),
            ],
        );

        assert_eq!(handle_stripe_checkout(&h.state, &s).await.unwrap(), Outcome::Applied);

        let store = h.db.snapshot();
        assert_eq!(store.payments.len(), 1);
        let payment = &store.payments[0];
        assert_eq!(payment.user_id, "u1");
        assert_eq!(payment.payment_type, PaymentType::Tip);
        assert_eq!(payment.amount().major(), 5.0);
        assert_eq!(payment.metadata["recipientId"], "u2");
        assert_eq!(
            store
                .message_payments
                .iter()
                .filter(|mp| mp.payment_type == MessagePaymentType::Tip)
                .count(),
            1
        );
        assert_eq!(h.db.message("m1").unwrap().tip_total_minor, 500);

        let records = h.accounting.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount_usd, 5.0);
        assert_eq!(records[0].product_type, "TIP");
        assert_eq!(records[0].user_email.as_deref(), Some("fan@example.com"));
    }

    #[tokio::test]
    async fn tip_for_unknown_message_records_payment_only() {
        let h = harness(MockDb::default().with_user("u1", "fan@example.com"));
        let s = session(
            "cs_tip",
            "pi_tip",
            500,
            &[("userId", "u1"), ("type", "tip"), ("messageId", "missing")],
        );

        assert_eq!(handle_stripe_checkout(&h.state, &s).await.unwrap(), Outcome::Applied);
        let store = h.db.snapshot();
        assert_eq!(store.payments.len(), 1);
        assert!(store.message_payments.is_empty());
    }

    #[tokio::test]
    async fn stripe_subscription_checkout_defers_to_subscription_events() {
        let h = harness(MockDb::default().with_user("u1", "fan@example.com"));
        let s = session(
            "cs_sub",
            "pi_sub",
            999,
            &[("userId", "u1"), ("type", "subscription"), ("planId", "VIP")],
        );

        assert_eq!(handle_stripe_checkout(&h.state, &s).await.unwrap(), Outcome::Ignored);
        let store = h.db.snapshot();
        assert!(store.payments.is_empty());
        assert!(store.subscriptions.is_empty());
    }

    #[tokio::test]
    async fn unpaid_session_is_skipped_and_bad_metadata_is_recoverable() {
        let h = harness(MockDb::default());
        let mut s = session("cs_1", "pi_1", 100, &[("userId", "u1"), ("type", "tip")]);
        s.payment_status = Some("unpaid".into());
        assert_eq!(handle_stripe_checkout(&h.state, &s).await.unwrap(), Outcome::Ignored);

        let s = session("cs_2", "pi_2", 100, &[("type", "tip")]);
        let err = handle_stripe_checkout(&h.state, &s).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Metadata(_)));
        assert!(h.db.snapshot().payments.is_empty());
    }

    #[tokio::test]
    async fn crypto_subscription_creates_active_subscription_and_payment() {
        let h = harness(
            MockDb::default()
                .with_user("u1", "fan@example.com")
                .with_plan("plan_vip", "VIP"),
        );
        let checkout = CompletedCheckout {
            provider: PaymentProvider::Crypto,
            transaction_id: "5077".into(),
            amount: Amount::from_minor(2500, "usd"),
            purchase: Purchase::Subscription {
                user_id: "u1".into(),
                plan_name: Some("VIP".into()),
                billing_interval: Some(BillingInterval::Annual),
            },
            crypto_paid: Some((0.0004, "btc".into())),
        };

        assert_eq!(apply_checkout(&h.state, checkout).await.unwrap(), Outcome::Applied);

        let store = h.db.snapshot();
        assert_eq!(store.subscriptions.len(), 1);
        let sub = &store.subscriptions[0];
        assert_eq!(sub.provider_subscription_id, "crypto:5077");
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.plan_id, "plan_vip");
        assert_eq!(
            (sub.current_period_end - sub.current_period_start).whole_days(),
            365
        );
        assert_eq!(store.payments[0].payment_type, PaymentType::Subscription);

        let records = h.accounting.records.lock().unwrap();
        assert_eq!(records[0].crypto_currency, "BTC");
        assert_eq!(records[0].amount_usd, 25.0);
        assert_eq!(records[0].product_name.as_deref(), Some("VIP (ANNUAL)"));
    }

    #[tokio::test]
    async fn database_failure_is_not_recoverable() {
        let h = harness(MockDb::failing());
        let s = session(
            "cs_1",
            "pi_1",
            100,
            &[("userId", "u1"), ("type", "media_purchase"), ("mediaId", "x")],
        );
        let err = handle_stripe_checkout(&h.state, &s).await.unwrap_err();
        assert!(!err.is_recoverable());
        assert!(h.accounting.records.lock().unwrap().is_empty());
    }
}
