use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use futures::future;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::Deserialize;
use sqlx::PgPool;

use crate::domain::prompt::PromptText;
use crate::domain::subscriber_email::SubscriberEmail;
use crate::email_client::{
    weekly_prompt_subject, weekly_prompt_text, EmailClient, SendOutcome,
};
use crate::startup::ManualSendSecret;
use crate::storage;

const MANUAL_SEND_HEADER: &str = "x-manual-send-secret";

#[derive(Deserialize, Debug)]
pub struct SendWeeklyBody {
    #[serde(rename = "promptText")]
    pub prompt_text: String,
}

/// Creates this week's prompt and fans it out to every active subscriber.
/// Triggered by the scheduler (or manually, which is what the shared-secret
/// header protects against).
#[tracing::instrument(
    name = "Sending the weekly prompt",
    skip(request, body, db_pool, email_client, manual_send_secret)
)]
pub async fn handle_send_weekly(
    request: HttpRequest,
    body: web::Json<SendWeeklyBody>,
    db_pool: web::Data<PgPool>,
    email_client: web::Data<EmailClient>,
    manual_send_secret: web::Data<ManualSendSecret>,
) -> Result<HttpResponse, SendWeeklyError> {
    let expected_token = manual_send_secret.0.expose_secret();
    if !expected_token.is_empty() {
        let token = request
            .headers()
            .get(MANUAL_SEND_HEADER)
            .and_then(|value| value.to_str().ok());

        if token != Some(expected_token.as_str()) {
            return Err(SendWeeklyError::Unauthorized);
        }
    }

    let prompt_text = PromptText::parse(body.prompt_text.clone())
        .map_err(|_| SendWeeklyError::MissingPromptText)?;

    let prompt = storage::create_prompt(&db_pool, &prompt_text)
        .await
        .map_err(SendWeeklyError::Storage)?;
    let subscribers = storage::get_active_subscribers(&db_pool)
        .await
        .map_err(SendWeeklyError::Storage)?;

    let subject = weekly_prompt_subject(prompt_text.as_ref());
    let text = weekly_prompt_text(prompt_text.as_ref());

    let mut skipped = 0;
    let mut sends = Vec::with_capacity(subscribers.len());
    for subscriber in &subscribers {
        match SubscriberEmail::parse(subscriber.email.clone()) {
            Ok(recipient) => sends.push(email_client.send_email(recipient, &subject, &text)),
            // Subscribers created from inbound replies can carry sender
            // values that are not deliverable addresses
            Err(err) => {
                tracing::warn!("Skipping undeliverable subscriber: {}", err);
                skipped += 1;
            }
        }
    }

    let mut sent = 0;
    for outcome in future::join_all(sends).await {
        match outcome.map_err(SendWeeklyError::SendEmail)? {
            SendOutcome::Sent => sent += 1,
            SendOutcome::Skipped => skipped += 1,
        }
    }

    let subscriber_ids: Vec<_> = subscribers.iter().map(|subscriber| subscriber.id).collect();
    storage::set_last_prompt_sent_at(&db_pool, &subscriber_ids, prompt.sent_at)
        .await
        .map_err(SendWeeklyError::Storage)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "prompt_id": prompt.id,
        "recipients": subscribers.len(),
        "sent": sent,
        "skipped": skipped
    })))
}

#[derive(thiserror::Error)]
pub enum SendWeeklyError {
    #[error("Missing or wrong manual send token.")]
    Unauthorized,
    #[error("promptText is required")]
    MissingPromptText,
    #[error("Failed to prepare the weekly prompt.")]
    Storage(#[source] sqlx::Error),
    #[error("Failed to send the weekly prompt to a subscriber.")]
    SendEmail(#[source] reqwest::Error),
}

impl std::fmt::Debug for SendWeeklyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

impl ResponseError for SendWeeklyError {
    fn status_code(&self) -> StatusCode {
        match self {
            SendWeeklyError::Unauthorized => StatusCode::UNAUTHORIZED,
            SendWeeklyError::MissingPromptText => StatusCode::BAD_REQUEST,
            SendWeeklyError::Storage(_) | SendWeeklyError::SendEmail(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            SendWeeklyError::Unauthorized => HttpResponse::Unauthorized().json(
                serde_json::json!({ "error": "Unauthorized" }),
            ),
            SendWeeklyError::MissingPromptText => HttpResponse::BadRequest().json(
                serde_json::json!({ "error": "promptText is required" }),
            ),
            SendWeeklyError::Storage(err) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to send weekly prompt",
                    "detail": err.to_string()
                }))
            }
            SendWeeklyError::SendEmail(err) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to send weekly prompt",
                    "detail": err.to_string()
                }))
            }
        }
    }
}
