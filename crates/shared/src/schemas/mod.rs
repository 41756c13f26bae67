// crates/shared/src/schemas/mod.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::routes;

/// The two independent conversational contexts.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    Video,
    General,
}

impl Track {
    pub const ALL: [Track; 2] = [Track::Video, Track::General];

    pub fn chat_path(self) -> &'static str {
        match self {
            Track::Video => routes::VIDEO_CHAT,
            Track::General => routes::GENERAL_CHAT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Track::Video => "video",
            Track::General => "general",
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Chat endpoint (both tracks)
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default)]
    pub query: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConversationResponse {
    pub conversation_id: String,
    pub video_id: String,
    pub video_title: String,
    pub user_message: String,
    pub assistant_message: String,
    pub message_index: u32,
    pub created_at: String,
}

impl ConversationResponse {
    /// The fields the UI cannot work without. The human turn sits at `message_index - 1`,
    /// so an index of zero or one with no successor is not a usable exchange.
    pub fn is_well_formed(&self) -> bool {
        !self.conversation_id.is_empty()
            && !self.video_id.is_empty()
            && !self.video_title.is_empty()
            && (1..u32::MAX).contains(&self.message_index)
    }
}

// Conversation history
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConversationMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_index: Option<u32>,
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

// Session probe
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SessionPayload {
    pub authenticated: bool,
    #[serde(default)]
    pub user: Option<Value>,
}

// Credentials
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LoginResponse {
    pub ok: bool,
    pub token_type: String,
    #[serde(default)]
    pub scopes: Value,
    #[serde(default)]
    pub exp: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SignupRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// `{ error, detail? }` as returned by the gateway, or `{ detail }` as returned by the backend.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ErrorEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            detail: None,
        }
    }

    /// Parse an error body; anything that is not a JSON object yields an empty envelope.
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    fn error_text(&self) -> Option<String> {
        self.error.clone().filter(|e| !e.is_empty())
    }

    /// `error`, then `detail`, then a generic status line.
    pub fn message_or_status(&self, status: u16) -> String {
        self.error_text()
            .or_else(|| self.detail_text())
            .unwrap_or_else(|| format!("Request failed (status {})", status))
    }

    /// `detail`, then `error`, then a generic status line. Backend bodies put the reason in `detail`.
    pub fn detail_or_status(&self, status: u16) -> String {
        self.detail_text()
            .or_else(|| self.error_text())
            .unwrap_or_else(|| format!("Request failed (status {})", status))
    }
}
