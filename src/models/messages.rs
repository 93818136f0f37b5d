use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ChatLine;

/// Raw inbound frame: `{"event": "...", "data": ..., "ack": 7}`
#[derive(Deserialize, Debug)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    ack: Option<u64>,
}

/// Payload of a `send-message` frame
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OutgoingChat {
    #[serde(default)]
    pub username: String,
    pub text: String,
}

/// Events a client can send
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    RegisterUsername(String),
    CodeChange(String),
    SendMessage(OutgoingChat),
    ChatTyping,
    ChatStopTyping,
    RunPython { code: String, ack: Option<u64> },
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("invalid payload for '{event}': {source}")]
    InvalidPayload {
        event: String,
        source: serde_json::Error,
    },
}

impl ClientEvent {
    /// Parse a text frame received from a client
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let frame: RawFrame = serde_json::from_str(text)?;
        let RawFrame { event, data, ack } = frame;

        let payload = |data: serde_json::Value| -> Result<String, FrameError> {
            serde_json::from_value(data).map_err(|source| FrameError::InvalidPayload {
                event: event.clone(),
                source,
            })
        };

        match event.as_str() {
            "register-username" => Ok(ClientEvent::RegisterUsername(payload(data)?)),
            "code-change" => Ok(ClientEvent::CodeChange(payload(data)?)),
            "send-message" => serde_json::from_value(data)
                .map(ClientEvent::SendMessage)
                .map_err(|source| FrameError::InvalidPayload {
                    event: event.clone(),
                    source,
                }),
            "chat-typing" => Ok(ClientEvent::ChatTyping),
            "chat-stop-typing" => Ok(ClientEvent::ChatStopTyping),
            "run-python" => Ok(ClientEvent::RunPython {
                code: payload(data)?,
                ack,
            }),
            _ => Err(FrameError::UnknownEvent(event.clone())),
        }
    }
}

/// Payload of the `init` event
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct InitPayload {
    pub code: String,
    pub messages: Vec<ChatLine>,
}

/// Outcome of a code execution request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RunResult {
    Output(String),
    Error(String),
}

/// Reply to a `run-python` request, addressed by its ack id
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AckReply {
    pub ack: u64,
    #[serde(flatten)]
    pub result: RunResult,
}

/// Events the server sends to clients
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    Init(InitPayload),
    CodeUpdate(String),
    ReceiveMessage(ChatLine),
    OnlineUsers(Vec<String>),
    TypingUsers(Vec<String>),
    Ack(AckReply),
}
