use chrono::{DateTime, Utc};
use serde_json::Value;

/// Canonical view of a provider webhook payload, extracted before anything
/// touches storage. `from_email` and `body_text` must both be non-empty for
/// the message to be accepted downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub event_type: Option<String>,
    pub provider_message_id: Option<String>,
    pub from_email: String,
    pub subject: String,
    pub body_text: String,
    pub received_at: DateTime<Utc>,
}

/// Normalizes a provider webhook envelope. The provider sometimes nests the
/// event under a `data` field and sometimes sends it flat; both shapes are
/// accepted. A missing or unparseable `created_at` falls back to the current
/// time rather than failing.
pub fn parse_inbound_payload(payload: &Value) -> InboundMessage {
    let event = payload
        .get("data")
        .filter(|data| data.is_object())
        .unwrap_or(payload);

    let text_body = string_field(event, "text").or_else(|| string_field(event, "text_body"));
    let html_body = string_field(event, "html").or_else(|| string_field(event, "html_body"));
    let body_text = match text_body {
        Some(text) => text,
        None => html_body.as_deref().map(strip_html_tags).unwrap_or_default(),
    };

    InboundMessage {
        event_type: string_field(payload, "type"),
        provider_message_id: string_field(event, "email_id"),
        from_email: extract_sender_email(&string_field(event, "from").unwrap_or_default()),
        subject: string_field(event, "subject").unwrap_or_default(),
        body_text,
        received_at: received_at(event),
    }
}

/// `Display Name <address>` values yield the bracketed address, anything else
/// is taken verbatim. The result is always trimmed and lower-cased.
fn extract_sender_email(raw_from: &str) -> String {
    let bracketed = raw_from.find('<').and_then(|start| {
        raw_from[start + 1..]
            .find('>')
            .map(|end| &raw_from[start + 1..start + 1 + end])
            .filter(|address| !address.is_empty())
    });

    bracketed.unwrap_or(raw_from).trim().to_lowercase()
}

/// Collapses every tag to a single space and trims the result. Good enough
/// for the fallback path; replies with a plain-text part never get here.
fn strip_html_tags(html: &str) -> String {
    let mut stripped = String::with_capacity(html.len());
    let mut in_tag = false;

    for character in html.chars() {
        match character {
            '<' if !in_tag => {
                in_tag = true;
                stripped.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => stripped.push(character),
            _ => {}
        }
    }

    stripped.trim().to_string()
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|field| !field.is_empty())
        .map(str::to_owned)
}

fn received_at(event: &Value) -> DateTime<Utc> {
    event
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
