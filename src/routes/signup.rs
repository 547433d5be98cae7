use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use serde::Deserialize;
use sqlx::PgPool;

use crate::domain::subscriber_email::SubscriberEmail;
use crate::email_client::{
    welcome_email_subject, welcome_email_text, EmailClient, SendOutcome,
};
use crate::storage;

#[derive(Deserialize, Debug)]
pub struct SignupBody {
    pub email: String,
}

#[tracing::instrument(
    name = "Signing up a new subscriber",
    skip(body, db_pool, email_client),
    fields(subscriber_email = %body.email)
)]
pub async fn handle_signup(
    body: web::Json<SignupBody>,
    db_pool: web::Data<PgPool>,
    email_client: web::Data<EmailClient>,
) -> Result<HttpResponse, SignupError> {
    let email = SubscriberEmail::parse(body.email.clone()).map_err(SignupError::InvalidEmail)?;

    let subscriber = storage::upsert_subscriber(&db_pool, email.as_ref())
        .await
        .map_err(SignupError::Storage)?;

    let outcome = email_client
        .send_email(email, welcome_email_subject(), &welcome_email_text())
        .await
        .map_err(SignupError::SendEmail)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "subscriber_id": subscriber.id,
        "welcome_email_sent": outcome == SendOutcome::Sent
    })))
}

#[derive(thiserror::Error)]
pub enum SignupError {
    #[error("{0} is not a valid email address.")]
    InvalidEmail(String),
    #[error("Failed to upsert the subscriber.")]
    Storage(#[source] sqlx::Error),
    #[error("Failed to send the welcome email.")]
    SendEmail(#[source] reqwest::Error),
}

impl std::fmt::Debug for SignupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

impl ResponseError for SignupError {
    fn status_code(&self) -> StatusCode {
        match self {
            SignupError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
            SignupError::Storage(_) | SignupError::SendEmail(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            SignupError::InvalidEmail(_) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid email"
            })),
            SignupError::Storage(_) | SignupError::SendEmail(_) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to sign up"
                }))
            }
        }
    }
}
