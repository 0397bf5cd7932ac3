//! Opening provider checkouts that carry the purchase metadata bag.
//!
//! This service exposes no checkout route. These functions are library entry
//! points for the host application, which authenticates the buyer, builds the
//! [`Purchase`] and calls them with its own [`AppState`]. The webhooks served
//! here then settle whatever they opened.

use tracing::{info, warn};

use crate::models::purchase::Purchase;
use crate::services::crypto::{CreateInvoiceRequest, CryptoInvoice, CryptoServiceError};
use crate::services::stripe::{
    CheckoutLineItem, CheckoutMode, CheckoutSession, CreateCheckoutSessionRequest,
    StripeServiceError,
};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("user `{0}` not found")]
    UnknownUser(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Stripe(#[from] StripeServiceError),
    #[error(transparent)]
    Crypto(#[from] CryptoServiceError),
    #[error("metadata could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct StripeCheckoutOptions {
    pub line_item: CheckoutLineItem,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone)]
pub struct CryptoCheckoutOptions {
    pub price_amount: f64,
    pub price_currency: String,
    pub order_id: String,
    pub ipn_callback_url: Option<String>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

/// Ensures the buyer has a Stripe customer, then opens a checkout session whose
/// metadata round-trips back through the webhook.
///
/// Called by the host application once it has authenticated `purchase.user_id()`.
pub async fn start_checkout(
    state: &AppState,
    purchase: &Purchase,
    options: StripeCheckoutOptions,
) -> Result<CheckoutSession, CheckoutError> {
    let user_id = purchase.user_id();
    let user = state
        .users
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| CheckoutError::UnknownUser(user_id.to_string()))?;

    let customer_id = match user.stripe_customer_id {
        Some(id) => id,
        None => {
            let id = state.stripe.create_customer(&user.email, user_id).await?;
            if let Err(err) = state.users.set_user_stripe_customer_id(user_id, &id).await {
                warn!(?err, %user_id, customer_id = %id, "failed to persist new stripe customer");
            }
            id
        }
    };

    let mode = match purchase {
        Purchase::Subscription { .. } => CheckoutMode::Subscription,
        _ => CheckoutMode::Payment,
    };

    let session = state
        .stripe
        .create_checkout_session(CreateCheckoutSessionRequest {
            success_url: options.success_url,
            cancel_url: options.cancel_url,
            mode,
            line_item: options.line_item,
            client_reference_id: user_id.to_string(),
            customer: customer_id,
            metadata: purchase.to_metadata(),
        })
        .await?;

    info!(%user_id, session_id = %session.id, kind = purchase.kind(), "checkout session created");
    Ok(session)
}

/// Creates a crypto invoice with the metadata bag JSON-encoded in the order description.
///
/// Host-application entry point, like [`start_checkout`]. Point `ipn_callback_url`
/// at this service's `/api/crypto/webhook`.
pub async fn start_crypto_checkout(
    state: &AppState,
    purchase: &Purchase,
    options: CryptoCheckoutOptions,
) -> Result<CryptoInvoice, CheckoutError> {
    let description = serde_json::to_string(&purchase.to_metadata())?;
    let invoice = state
        .crypto
        .create_invoice(CreateInvoiceRequest {
            price_amount: options.price_amount,
            price_currency: options.price_currency,
            order_id: options.order_id,
            order_description: Some(description),
            ipn_callback_url: options.ipn_callback_url,
            success_url: options.success_url,
            cancel_url: options.cancel_url,
        })
        .await?;

    info!(user_id = %purchase.user_id(), invoice_id = %invoice.id, "crypto invoice created");
    Ok(invoice)
}
