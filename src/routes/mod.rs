pub mod crypto;
pub mod stripe;

use axum::{
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::billing::{Outcome, ReconcileError};
use crate::models::payment::PaymentProvider;
use crate::responses::JsonResponse;
use crate::state::AppState;

/// Failures before an event is trusted. All of them are the sender's fault.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("missing {0} header")]
    MissingSignature(&'static str),
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("invalid webhook payload")]
    Payload,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        JsonResponse::bad_request(&self.to_string()).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/stripe/webhook", post(stripe::webhook))
        .route("/api/crypto/webhook", post(crypto::webhook))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

// GET /health
pub async fn health() -> Response {
    JsonResponse::success("ok").into_response()
}

/// Short-circuits redeliveries of events that were already handled.
async fn already_processed(
    state: &AppState,
    provider: PaymentProvider,
    event_id: &str,
) -> Result<bool, Response> {
    state
        .event_log
        .has_processed_event(provider, event_id)
        .await
        .map_err(|err| {
            error!(?err, %provider, %event_id, "failed to read webhook event log");
            JsonResponse::server_error("database error").into_response()
        })
}

/// Maps a reconcile result to the provider-facing response and marks the event
/// processed unless the provider should retry it.
async fn finish_event(
    state: &AppState,
    provider: PaymentProvider,
    event_id: &str,
    event_type: &str,
    result: Result<Outcome, ReconcileError>,
) -> Response {
    match result {
        Ok(outcome) => {
            info!(%provider, %event_id, %event_type, outcome = outcome.as_str(), "webhook handled");
        }
        Err(err) if err.is_recoverable() => {
            warn!(%err, %provider, %event_id, %event_type, "webhook acknowledged without changes");
        }
        Err(err) => {
            error!(%err, %provider, %event_id, %event_type, "webhook failed; provider will retry");
            return JsonResponse::server_error("database error").into_response();
        }
    }

    if let Err(err) = state
        .event_log
        .record_event(provider, event_id, event_type)
        .await
    {
        // Writes are idempotent, so a redelivery is harmless.
        error!(?err, %provider, %event_id, "failed to record processed webhook event");
    }
    JsonResponse::received().into_response()
}
