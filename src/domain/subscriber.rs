use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::subscriber_status::SubscriberStatus;

/// A stored subscriber. The email is kept as the normalized string it was
/// resolved with: inbound replies may carry sender values that are not
/// RFC-valid addresses, and they still get a subscriber row.
#[derive(Debug, serde::Serialize)]
pub struct Subscriber {
    pub id: Uuid,
    pub email: String,
    pub status: SubscriberStatus,
    pub subscribed_at: DateTime<Utc>,
    pub last_prompt_sent_at: Option<DateTime<Utc>>,
}
