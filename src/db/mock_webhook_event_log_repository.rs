use crate::db::webhook_event_log_repository::WebhookEventLogRepository;
use crate::models::payment::PaymentProvider;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MockWebhookEventLogRepository {
    events: Arc<Mutex<HashSet<(PaymentProvider, String)>>>,
    pub checks: Arc<Mutex<usize>>,
    pub inserts: Arc<Mutex<usize>>,
}

impl MockWebhookEventLogRepository {
    pub fn recorded_events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, id)| id.clone())
            .collect()
    }

    pub fn seed(&self, provider: PaymentProvider, event_id: &str) {
        self.events
            .lock()
            .unwrap()
            .insert((provider, event_id.to_string()));
    }
}

#[async_trait]
impl WebhookEventLogRepository for MockWebhookEventLogRepository {
    async fn has_processed_event(
        &self,
        provider: PaymentProvider,
        event_id: &str,
    ) -> Result<bool, sqlx::Error> {
        *self.checks.lock().unwrap() += 1;
        Ok(self
            .events
            .lock()
            .unwrap()
            .contains(&(provider, event_id.to_string())))
    }

    async fn record_event(
        &self,
        provider: PaymentProvider,
        event_id: &str,
        _event_type: &str,
    ) -> Result<(), sqlx::Error> {
        *self.inserts.lock().unwrap() += 1;
        self.events
            .lock()
            .unwrap()
            .insert((provider, event_id.to_string()));
        Ok(())
    }
}
