use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use std::time;

use crate::domain::subscriber_email::SubscriberEmail;

const REQUEST_TIMEOUT: time::Duration = time::Duration::from_secs(10);

pub struct EmailClient {
    http_client: Client,
    base_url: String,
    sender: SubscriberEmail,
    api_key: Secret<String>,
}

/// Whether a send actually went out. Sends are skipped when no API key is
/// configured, which keeps local development working without a provider
/// account.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SendOutcome {
    Sent,
    Skipped,
}

#[derive(serde::Serialize)]
struct SendEmailBody {
    from: String,
    to: String,
    subject: String,
    text: String,
    reply_to: String,
}

impl EmailClient {
    pub fn new(
        base_url: String,
        sender: SubscriberEmail,
        api_key: Secret<String>,
        timeout: Option<time::Duration>,
    ) -> EmailClient {
        let http_client = Client::builder()
            .timeout(timeout.unwrap_or(REQUEST_TIMEOUT))
            .build()
            .unwrap();

        EmailClient {
            http_client,
            base_url,
            sender,
            api_key,
        }
    }

    pub async fn send_email(
        &self,
        recipient: SubscriberEmail,
        subject: &str,
        text_content: &str,
    ) -> Result<SendOutcome, reqwest::Error> {
        if self.api_key.expose_secret().is_empty() {
            return Ok(SendOutcome::Skipped);
        }

        let url = format!("{}/emails", self.base_url);
        let body = SendEmailBody {
            from: String::from(self.sender.as_ref()),
            to: String::from(recipient.as_ref()),
            subject: String::from(subject),
            text: String::from(text_content),
            // Replies to any message land back on the inbound webhook
            reply_to: String::from(self.sender.as_ref()),
        };

        self.http_client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await?
            .error_for_status()?; // return an error when server response status code is 4xx or 5xx

        Ok(SendOutcome::Sent)
    }
}

pub fn welcome_email_subject() -> &'static str {
    "🌍 Quick question — where are you from?"
}

pub fn welcome_email_text() -> String {
    [
        "Welcome to Project Connect.",
        "Each week, we share one question and real answers from around the world.",
        "",
        "Reply in any format. Short is fine.",
        "",
        "1) What country are you from (and what city if you want)?",
        "2) What is considered rude in your culture?",
        "3) What do outsiders usually misunderstand?",
        "",
        "Thanks for being here.",
        "Landon",
    ]
    .join("\n")
}

pub fn weekly_prompt_subject(prompt_text: &str) -> String {
    format!("🌎 This week's question: {}", prompt_text)
}

pub fn weekly_prompt_text(prompt_text: &str) -> String {
    [
        "This week, one simple question:",
        "",
        prompt_text,
        "",
        "Reply with your answer.",
        "",
        "Landon",
    ]
    .join("\n")
}
