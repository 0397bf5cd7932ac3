use super::{
    CheckoutSession, CreateCheckoutSessionRequest, StripeEvent, StripeService, StripeServiceError,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Records outbound calls and trusts every webhook body unless built with
/// `rejecting()`. The signature header is never inspected.
#[derive(Default)]
pub struct MockStripeService {
    pub checkout_requests: Arc<Mutex<Vec<CreateCheckoutSessionRequest>>>,
    /// `(email, user_id)` per created customer.
    pub created_customers: Arc<Mutex<Vec<(String, String)>>>,
    pub reject_signatures: bool,
    seq: AtomicUsize,
}

impl MockStripeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            reject_signatures: true,
            ..Self::default()
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_mock_{}", self.seq.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl StripeService for MockStripeService {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError> {
        self.checkout_requests.lock().unwrap().push(req);
        let id = self.next_id("cs");
        Ok(CheckoutSession {
            url: Some(format!("https://checkout.example.test/{id}")),
            id,
        })
    }

    async fn create_customer(
        &self,
        email: &str,
        user_id: &str,
    ) -> Result<String, StripeServiceError> {
        self.created_customers
            .lock()
            .unwrap()
            .push((email.to_string(), user_id.to_string()));
        Ok(self.next_id("cus"))
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        _signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError> {
        if self.reject_signatures {
            return Err(StripeServiceError::Webhook(
                "No signatures found matching the expected signature for payload".into(),
            ));
        }
        let payload: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        let field = |key: &str| {
            payload
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        Ok(StripeEvent {
            id: field("id").unwrap_or_else(|| self.next_id("evt")),
            r#type: field("type").unwrap_or_default(),
            payload,
        })
    }
}
