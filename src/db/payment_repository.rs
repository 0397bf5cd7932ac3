use async_trait::async_trait;

use crate::models::{
    media_purchase::NewMediaPurchase,
    message::{Message, NewMessagePayment},
    payment::{NewPayment, Payment, PaymentProvider, PaymentStatus},
    subscription::SubscriptionUpsert,
};

/// Result of an idempotent ledger write.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    Recorded(Payment),
    /// A payment with the same `(provider, provider_transaction_id)` already exists;
    /// nothing was written.
    Duplicate,
}

/// Ledger and entitlement writes. Every `record_*` call is one transaction that
/// starts with a conditional Payment insert, so replaying a provider event is a no-op.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn find_message(&self, message_id: &str) -> Result<Option<Message>, sqlx::Error>;

    async fn record_payment(&self, payment: NewPayment) -> Result<RecordOutcome, sqlx::Error>;

    async fn record_media_purchase(
        &self,
        purchase: NewMediaPurchase,
        payment: NewPayment,
    ) -> Result<RecordOutcome, sqlx::Error>;

    /// Adds the payer to the message's unlocked-by set (no duplicates) and writes the
    /// PPV message payment.
    async fn record_ppv_unlock(
        &self,
        unlock: NewMessagePayment,
        payment: NewPayment,
    ) -> Result<RecordOutcome, sqlx::Error>;

    /// With a message payment, also bumps that message's tip total by its amount.
    async fn record_tip(
        &self,
        tip: Option<NewMessagePayment>,
        payment: NewPayment,
    ) -> Result<RecordOutcome, sqlx::Error>;

    /// One-off subscription purchase: upserts the subscription with the payment.
    async fn record_subscription_purchase(
        &self,
        subscription: SubscriptionUpsert,
        payment: NewPayment,
    ) -> Result<RecordOutcome, sqlx::Error>;

    /// Moves the payment to `status` when its current status allows it
    /// ([`PaymentStatus::reachable_from`]). Returns whether a row changed.
    async fn update_payment_status(
        &self,
        provider: PaymentProvider,
        provider_transaction_id: &str,
        status: PaymentStatus,
    ) -> Result<bool, sqlx::Error>;
}
