//! Stripe client seam. The live client wraps async-stripe; tests use the mock.
//!
//! async-stripe is built with `checkout`, `webhook-events` and `connect` only, so
//! anything outside checkout sessions, customers and webhook parsing needs a
//! Cargo feature first.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::money::Amount;

#[derive(Debug, thiserror::Error)]
pub enum StripeServiceError {
    #[error("stripe request failed: {0}")]
    Api(String),
    #[error("stripe signature rejected: {0}")]
    Webhook(String),
    #[error("stripe payload unreadable: {0}")]
    Serde(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<stripe::StripeError> for StripeServiceError {
    fn from(err: stripe::StripeError) -> Self {
        StripeServiceError::Api(err.to_string())
    }
}

impl From<stripe::WebhookError> for StripeServiceError {
    fn from(err: stripe::WebhookError) -> Self {
        StripeServiceError::Webhook(err.to_string())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    Payment,
    Subscription,
}

/// What the buyer pays for. Plans are catalog prices; creator-priced items
/// (media, PPV messages, tips) are priced inline per checkout.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CheckoutLineItem {
    Price { price_id: String },
    Inline { name: String, amount: Amount },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateCheckoutSessionRequest {
    pub success_url: String,
    pub cancel_url: String,
    pub mode: CheckoutMode,
    pub line_item: CheckoutLineItem,
    pub client_reference_id: String,
    pub customer: String,
    /// Copied onto the session, and in subscription mode onto the subscription
    /// so lifecycle events carry it too.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// A webhook event whose signature has been checked.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    pub r#type: String,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait StripeService: Send + Sync {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError>;

    /// Returns the new customer id.
    async fn create_customer(&self, email: &str, user_id: &str)
        -> Result<String, StripeServiceError>;

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError>;
}

mod live;
#[cfg(test)]
mod mock;

pub use live::LiveStripeService;
#[cfg(test)]
pub use mock::MockStripeService;
