use crate::config::Config;
use crate::db::{
    payment_repository::PaymentRepository, subscription_repository::SubscriptionRepository,
    user_repository::UserRepository, webhook_event_log_repository::WebhookEventLogRepository,
};
use crate::services::accounting::AccountingForwarder;
use crate::services::crypto::CryptoPaymentService;
use crate::services::stripe::StripeService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub payments: Arc<dyn PaymentRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub users: Arc<dyn UserRepository>,
    pub event_log: Arc<dyn WebhookEventLogRepository>,
    pub stripe: Arc<dyn StripeService>,
    pub crypto: Arc<dyn CryptoPaymentService>,
    pub accounting: Arc<dyn AccountingForwarder>,
    pub config: Arc<Config>,
}
