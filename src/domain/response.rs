use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Insert payload for a subscriber's reply to a weekly question.
/// One row is written per accepted webhook delivery; provider retries
/// produce additional rows (see the provider_message_id column).
#[derive(Debug)]
pub struct NewResponse {
    pub subscriber_id: Uuid,
    pub prompt_id: Option<Uuid>,
    pub provider_message_id: Option<String>,
    pub from_email: String,
    pub subject: String,
    pub body_text: String,
    pub received_at: DateTime<Utc>,
}
