use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::domain::response::NewResponse;
use crate::startup::WebhookSecret;
use crate::storage;
use crate::webhook::payload::parse_inbound_payload;
use crate::webhook::signature::verify_signature;

/// Ingests a subscriber reply delivered by the email provider. The gates run
/// in strict order: signature verification over the exact request bytes,
/// then JSON parsing and normalization, then storage. Nothing reaches
/// storage unless the delivery authenticated and carried a sender and a body.
#[tracing::instrument(
    name = "Ingesting an inbound webhook delivery",
    skip(request, body, db_pool, webhook_secret)
)]
pub async fn handle_inbound_webhook(
    request: HttpRequest,
    body: web::Bytes,
    db_pool: web::Data<PgPool>,
    webhook_secret: web::Data<WebhookSecret>,
) -> Result<HttpResponse, InboundWebhookError> {
    let verified = verify_signature(&body, request.headers(), webhook_secret.0.expose_secret());

    if !verified {
        return Err(InboundWebhookError::InvalidSignature);
    }

    let payload: serde_json::Value =
        serde_json::from_slice(&body).map_err(InboundWebhookError::PayloadParse)?;
    let inbound = parse_inbound_payload(&payload);

    if inbound.from_email.is_empty() || inbound.body_text.is_empty() {
        return Err(InboundWebhookError::MissingPayloadFields);
    }

    tracing::info!(
        event_type = inbound.event_type.as_deref().unwrap_or("unknown"),
        "Verified inbound delivery"
    );

    let subscriber = storage::resolve_subscriber(&db_pool, &inbound.from_email)
        .await
        .map_err(InboundWebhookError::Storage)?;

    storage::create_response(
        &db_pool,
        &NewResponse {
            subscriber_id: subscriber.id,
            prompt_id: None,
            provider_message_id: inbound.provider_message_id,
            from_email: inbound.from_email,
            subject: inbound.subject,
            body_text: inbound.body_text,
            received_at: inbound.received_at,
        },
    )
    .await
    .map_err(InboundWebhookError::Storage)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

#[derive(thiserror::Error)]
pub enum InboundWebhookError {
    // Deliberately silent about which scheme or header failed
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Missing inbound payload fields")]
    MissingPayloadFields,
    #[error("Failed to parse the webhook payload as JSON.")]
    PayloadParse(#[source] serde_json::Error),
    #[error("Failed to persist the inbound response.")]
    Storage(#[source] sqlx::Error),
}

impl std::fmt::Debug for InboundWebhookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

impl ResponseError for InboundWebhookError {
    fn status_code(&self) -> StatusCode {
        match self {
            InboundWebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            InboundWebhookError::MissingPayloadFields => StatusCode::BAD_REQUEST,
            InboundWebhookError::PayloadParse(_) | InboundWebhookError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            InboundWebhookError::InvalidSignature => {
                HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "Invalid signature"
                }))
            }
            InboundWebhookError::MissingPayloadFields => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "Missing inbound payload fields"
                }))
            }
            InboundWebhookError::PayloadParse(err) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Webhook processing failed",
                    "detail": err.to_string()
                }))
            }
            InboundWebhookError::Storage(err) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Webhook processing failed",
                    "detail": err.to_string()
                }))
            }
        }
    }
}
