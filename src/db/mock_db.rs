use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sqlx::types::Json;
use time::OffsetDateTime;

use crate::db::{
    payment_repository::{PaymentRepository, RecordOutcome},
    subscription_repository::SubscriptionRepository,
    user_repository::UserRepository,
};
use crate::models::{
    media_purchase::{MediaPurchase, NewMediaPurchase},
    message::{Message, MessagePayment, NewMessagePayment},
    payment::{NewPayment, Payment, PaymentProvider, PaymentStatus},
    plan::Plan,
    subscription::{Subscription, SubscriptionStatus, SubscriptionUpsert, UpsertOutcome},
    user::User,
};

/// Every table the reconciliation code touches, behind one lock so each
/// repository call is atomic like its Postgres counterpart.
#[derive(Default, Clone)]
pub struct MockStore {
    pub users: Vec<User>,
    pub plans: Vec<Plan>,
    pub messages: Vec<Message>,
    pub payments: Vec<Payment>,
    pub media_purchases: Vec<MediaPurchase>,
    pub message_payments: Vec<MessagePayment>,
    pub subscriptions: Vec<Subscription>,
}

impl MockStore {
    fn has_payment(&self, payment: &NewPayment) -> bool {
        self.payments.iter().any(|p| {
            p.provider == payment.provider
                && p.provider_transaction_id == payment.provider_transaction_id
        })
    }

    fn upsert(&mut self, upsert: &SubscriptionUpsert) -> UpsertOutcome {
        let now = OffsetDateTime::now_utc();
        match self
            .subscriptions
            .iter_mut()
            .find(|s| s.provider_subscription_id == upsert.provider_subscription_id)
        {
            Some(existing) => {
                if !existing.is_superseded_by(upsert) {
                    return UpsertOutcome::Stale;
                }
                existing.user_id = upsert.user_id.clone();
                existing.plan_id = upsert.plan_id.clone();
                existing.status = upsert.status;
                existing.billing_interval = upsert.billing_interval;
                existing.current_period_start = upsert.current_period_start;
                existing.current_period_end = upsert.current_period_end;
                existing.canceled_at = upsert.canceled_at.or(existing.canceled_at);
                existing.last_event_at = upsert.event_at.or(existing.last_event_at);
                existing.updated_at = now;
                UpsertOutcome::Updated
            }
            None => {
                self.subscriptions.push(Subscription {
                    id: uuid::Uuid::new_v4().to_string(),
                    user_id: upsert.user_id.clone(),
                    plan_id: upsert.plan_id.clone(),
                    status: upsert.status,
                    provider_subscription_id: upsert.provider_subscription_id.clone(),
                    provider: upsert.provider,
                    billing_interval: upsert.billing_interval,
                    current_period_start: upsert.current_period_start,
                    current_period_end: upsert.current_period_end,
                    canceled_at: upsert.canceled_at,
                    last_event_at: upsert.event_at,
                    created_at: now,
                    updated_at: now,
                });
                UpsertOutcome::Created
            }
        }
    }
}

#[derive(Default)]
pub struct MockDb {
    pub store: Mutex<MockStore>,
    pub should_fail: bool,
}

impl MockDb {
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn with_user(self, id: &str, email: &str) -> Self {
        self.store.lock().unwrap().users.push(User {
            id: id.into(),
            email: email.into(),
            stripe_customer_id: None,
        });
        self
    }

    pub fn with_customer(self, user_id: &str, customer_id: &str) -> Self {
        if let Some(user) = self
            .store
            .lock()
            .unwrap()
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
        {
            user.stripe_customer_id = Some(customer_id.into());
        }
        self
    }

    pub fn with_plan(self, id: &str, name: &str) -> Self {
        self.store.lock().unwrap().plans.push(Plan {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    pub fn with_message(self, id: &str, sender_id: &str) -> Self {
        self.store.lock().unwrap().messages.push(Message {
            id: id.into(),
            sender_id: sender_id.into(),
            unlocked_by: Json(Vec::new()),
            tip_total_minor: 0,
        });
        self
    }

    pub fn with_subscription(self, subscription: Subscription) -> Self {
        self.store.lock().unwrap().subscriptions.push(subscription);
        self
    }

    pub fn snapshot(&self) -> MockStore {
        self.store.lock().unwrap().clone()
    }

    pub fn message(&self, id: &str) -> Option<Message> {
        self.snapshot().messages.into_iter().find(|m| m.id == id)
    }

    fn guard(&self) -> Result<MutexGuard<'_, MockStore>, sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("Mock DB failure".into()));
        }
        Ok(self.store.lock().unwrap())
    }
}

#[async_trait]
impl PaymentRepository for MockDb {
    async fn find_message(&self, message_id: &str) -> Result<Option<Message>, sqlx::Error> {
        let store = self.guard()?;
        Ok(store.messages.iter().find(|m| m.id == message_id).cloned())
    }

    async fn record_payment(&self, payment: NewPayment) -> Result<RecordOutcome, sqlx::Error> {
        let mut store = self.guard()?;
        if store.has_payment(&payment) {
            return Ok(RecordOutcome::Duplicate);
        }
        let row = payment.into_payment(OffsetDateTime::now_utc());
        store.payments.push(row.clone());
        Ok(RecordOutcome::Recorded(row))
    }

    async fn record_media_purchase(
        &self,
        purchase: NewMediaPurchase,
        payment: NewPayment,
    ) -> Result<RecordOutcome, sqlx::Error> {
        let mut store = self.guard()?;
        if store.has_payment(&payment) {
            return Ok(RecordOutcome::Duplicate);
        }
        let row = payment.into_payment(OffsetDateTime::now_utc());
        store.payments.push(row.clone());
        store
            .media_purchases
            .push(purchase.into_purchase(row.created_at));
        Ok(RecordOutcome::Recorded(row))
    }

    async fn record_ppv_unlock(
        &self,
        unlock: NewMessagePayment,
        payment: NewPayment,
    ) -> Result<RecordOutcome, sqlx::Error> {
        let mut store = self.guard()?;
        if store.has_payment(&payment) {
            return Ok(RecordOutcome::Duplicate);
        }
        let row = payment.into_payment(OffsetDateTime::now_utc());
        store.payments.push(row.clone());
        if let Some(message) = store.messages.iter_mut().find(|m| m.id == unlock.message_id) {
            if !message.is_unlocked_for(&unlock.user_id) {
                message.unlocked_by.0.push(unlock.user_id.clone());
            }
        }
        store
            .message_payments
            .push(unlock.into_message_payment(row.created_at));
        Ok(RecordOutcome::Recorded(row))
    }

    async fn record_tip(
        &self,
        tip: Option<NewMessagePayment>,
        payment: NewPayment,
    ) -> Result<RecordOutcome, sqlx::Error> {
        let mut store = self.guard()?;
        if store.has_payment(&payment) {
            return Ok(RecordOutcome::Duplicate);
        }
        let row = payment.into_payment(OffsetDateTime::now_utc());
        store.payments.push(row.clone());
        if let Some(tip) = tip {
            if let Some(message) = store.messages.iter_mut().find(|m| m.id == tip.message_id) {
                message.tip_total_minor += tip.amount.minor;
            }
            store
                .message_payments
                .push(tip.into_message_payment(row.created_at));
        }
        Ok(RecordOutcome::Recorded(row))
    }

    async fn record_subscription_purchase(
        &self,
        subscription: SubscriptionUpsert,
        payment: NewPayment,
    ) -> Result<RecordOutcome, sqlx::Error> {
        let mut store = self.guard()?;
        if store.has_payment(&payment) {
            return Ok(RecordOutcome::Duplicate);
        }
        let row = payment.into_payment(OffsetDateTime::now_utc());
        store.payments.push(row.clone());
        store.upsert(&subscription);
        Ok(RecordOutcome::Recorded(row))
    }

    async fn update_payment_status(
        &self,
        provider: PaymentProvider,
        provider_transaction_id: &str,
        status: PaymentStatus,
    ) -> Result<bool, sqlx::Error> {
        let mut store = self.guard()?;
        let mut updated = false;
        for payment in store.payments.iter_mut().filter(|p| {
            p.provider == provider
                && p.provider_transaction_id == provider_transaction_id
                && status.reachable_from().contains(&p.status)
        }) {
            payment.status = status;
            updated = true;
        }
        Ok(updated)
    }
}

#[async_trait]
impl SubscriptionRepository for MockDb {
    async fn find_plan_by_name(&self, name: &str) -> Result<Option<Plan>, sqlx::Error> {
        let store = self.guard()?;
        Ok(store.plans.iter().find(|p| p.name == name).cloned())
    }

    async fn find_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let store = self.guard()?;
        Ok(store
            .subscriptions
            .iter()
            .find(|s| s.provider_subscription_id == provider_subscription_id)
            .cloned())
    }

    async fn upsert_subscription(
        &self,
        upsert: &SubscriptionUpsert,
    ) -> Result<UpsertOutcome, sqlx::Error> {
        let mut store = self.guard()?;
        Ok(store.upsert(upsert))
    }

    async fn mark_canceled(
        &self,
        provider_subscription_id: &str,
        canceled_at: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        let mut store = self.guard()?;
        match store
            .subscriptions
            .iter_mut()
            .find(|s| s.provider_subscription_id == provider_subscription_id)
        {
            Some(sub) => {
                sub.status = SubscriptionStatus::Canceled;
                sub.canceled_at = sub.canceled_at.or(Some(canceled_at));
                sub.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_past_due(
        &self,
        provider_subscription_id: &str,
        event_at: Option<OffsetDateTime>,
    ) -> Result<bool, sqlx::Error> {
        let mut store = self.guard()?;
        match store.subscriptions.iter_mut().find(|s| {
            s.provider_subscription_id == provider_subscription_id && !s.status.is_terminal()
        }) {
            Some(sub) => {
                sub.status = SubscriptionStatus::PastDue;
                sub.last_event_at = sub.last_event_at.max(event_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl UserRepository for MockDb {
    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>, sqlx::Error> {
        let store = self.guard()?;
        Ok(store.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn find_user_id_by_stripe_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<String>, sqlx::Error> {
        let store = self.guard()?;
        Ok(store
            .users
            .iter()
            .find(|u| u.stripe_customer_id.as_deref() == Some(customer_id))
            .map(|u| u.id.clone()))
    }

    async fn set_user_stripe_customer_id(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> Result<(), sqlx::Error> {
        let mut store = self.guard()?;
        if let Some(user) = store.users.iter_mut().find(|u| u.id == user_id) {
            user.stripe_customer_id = Some(customer_id.into());
        }
        Ok(())
    }
}
