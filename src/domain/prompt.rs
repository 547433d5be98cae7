use chrono::{DateTime, Utc};
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

const MAX_CHAR_LENGHT: usize = 512;

/// A weekly question that went out to subscribers. Immutable once created.
#[derive(Debug, serde::Serialize)]
pub struct Prompt {
    pub id: Uuid,
    pub prompt_text: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct PromptText(String);

impl PromptText {
    pub fn parse(text: String) -> Result<PromptText, String> {
        let trimmed = text.trim();
        let is_too_long = trimmed.graphemes(true).count() > MAX_CHAR_LENGHT;

        if trimmed.is_empty() || is_too_long {
            return Err(format!("{} is not a valid prompt text", text));
        }

        Ok(Self(trimmed.to_string()))
    }
}

impl AsRef<str> for PromptText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
