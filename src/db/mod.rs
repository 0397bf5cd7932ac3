pub mod payment_repository;
pub mod postgres_payment_repository;
pub mod postgres_subscription_repository;
pub mod postgres_user_repository;
pub mod postgres_webhook_event_log_repository;
pub mod subscription_repository;
pub mod user_repository;
pub mod webhook_event_log_repository;

#[cfg(test)]
pub mod mock_db;
#[cfg(test)]
pub mod mock_webhook_event_log_repository;
