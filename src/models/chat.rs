use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted chat message
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub username: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Chat message as sent over the wire
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatLine {
    pub username: String,
    pub text: String,
}

impl From<&ChatMessage> for ChatLine {
    fn from(message: &ChatMessage) -> Self {
        Self {
            username: message.username.clone(),
            text: message.text.clone(),
        }
    }
}
