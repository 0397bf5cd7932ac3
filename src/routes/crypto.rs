use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use super::{already_processed, finish_event, WebhookError};
use crate::billing::router::dispatch_crypto;
use crate::models::payment::PaymentProvider;
use crate::responses::JsonResponse;
use crate::services::crypto::{CryptoServiceError, SIGNATURE_HEADER};
use crate::state::AppState;

// POST /api/crypto/webhook
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

    let notification = match app_state.crypto.verify_ipn(&body, sig) {
        Ok(n) => n,
        Err(CryptoServiceError::Webhook(reason)) => {
            warn!(%reason, "crypto ipn verification failed");
            return WebhookError::InvalidSignature.into_response();
        }
        Err(err) => {
            warn!(?err, "crypto ipn body rejected");
            return WebhookError::Payload.into_response();
        }
    };

    let event_id = notification.event_id();
    match already_processed(&app_state, PaymentProvider::Crypto, &event_id).await {
        Ok(true) => {
            info!(%event_id, "duplicate crypto ipn");
            return JsonResponse::received().into_response();
        }
        Ok(false) => {}
        Err(resp) => return resp,
    }

    let result = dispatch_crypto(&app_state, &notification).await;
    finish_event(
        &app_state,
        PaymentProvider::Crypto,
        &event_id,
        &notification.payment_status,
        result,
    )
    .await
}
