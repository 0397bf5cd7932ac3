use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use super::{already_processed, finish_event, WebhookError};
use crate::billing::router::dispatch_stripe;
use crate::models::payment::PaymentProvider;
use crate::responses::JsonResponse;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "Stripe-Signature";

// POST /api/stripe/webhook
pub async fn webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let sig = match headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
    {
        Some(s) => s,
        None => return WebhookError::MissingSignature(SIGNATURE_HEADER).into_response(),
    };

    let evt = match app_state.stripe.verify_webhook(&body, sig) {
        Ok(e) => e,
        Err(err) => {
            warn!(?err, "stripe webhook verification failed");
            return WebhookError::InvalidSignature.into_response();
        }
    };

    match already_processed(&app_state, PaymentProvider::Stripe, &evt.id).await {
        Ok(true) => {
            info!(event_id = %evt.id, event_type = %evt.r#type, "duplicate stripe event");
            return JsonResponse::received().into_response();
        }
        Ok(false) => {}
        Err(resp) => return resp,
    }

    let result = dispatch_stripe(&app_state, &evt).await;
    finish_event(
        &app_state,
        PaymentProvider::Stripe,
        &evt.id,
        &evt.r#type,
        result,
    )
    .await
}
