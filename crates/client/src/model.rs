use augustus_shared::time::parse_timestamp_or_now;
use augustus_shared::{ConversationMessage, ConversationResponse, GENERAL_VIDEO_ID, Track};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which track a cached conversation belongs to. Stored as the backend's `video_id`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum TrackKey {
    Video(String),
    General,
}

impl TrackKey {
    pub fn track(&self) -> Track {
        match self {
            TrackKey::Video(_) => Track::Video,
            TrackKey::General => Track::General,
        }
    }

    pub fn video_id(&self) -> Option<&str> {
        match self {
            TrackKey::Video(id) => Some(id),
            TrackKey::General => None,
        }
    }
}

impl From<String> for TrackKey {
    fn from(raw: String) -> Self {
        if raw == GENERAL_VIDEO_ID {
            TrackKey::General
        } else {
            TrackKey::Video(raw)
        }
    }
}

impl From<TrackKey> for String {
    fn from(key: TrackKey) -> Self {
        match key {
            TrackKey::Video(id) => id,
            TrackKey::General => GENERAL_VIDEO_ID.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Human,
    Ai,
    System,
    Tool,
}

impl Role {
    /// Backend history uses `user`/`assistant`; the UI vocabulary is `human`/`ai`.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "user" | "human" => Role::Human,
            "assistant" | "ai" => Role::Ai,
            "tool" => Role::Tool,
            _ => Role::System,
        }
    }

    fn id_prefix(self) -> &'static str {
        match self {
            Role::Human => "user",
            Role::Ai => "ai",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

/// Message identity. The three variants never render to the same string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Server-acknowledged, derived from the per-conversation message index.
    Canonical { role: Role, index: u32 },
    /// Optimistic human message awaiting acknowledgment.
    Provisional(Uuid),
    /// Locally synthesized error bubble.
    Notice(Uuid),
}

impl MessageId {
    pub fn provisional() -> Self {
        MessageId::Provisional(Uuid::new_v4())
    }

    pub fn notice() -> Self {
        MessageId::Notice(Uuid::new_v4())
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, MessageId::Provisional(_))
    }

    pub fn index(&self) -> Option<u32> {
        match self {
            MessageId::Canonical { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Canonical { role, index } => write!(f, "{}_{}", role.id_prefix(), index),
            MessageId::Provisional(id) => write!(f, "tmp_{}", id.simple()),
            MessageId::Notice(id) => write!(f, "notice_{}", id.simple()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub tool_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn provisional(prompt: &str) -> Self {
        Self {
            id: MessageId::provisional(),
            role: Role::Human,
            content: prompt.to_string(),
            tool_name: None,
            created_at: Utc::now(),
        }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::notice(),
            role: Role::Ai,
            content: text.into(),
            tool_name: None,
            created_at: Utc::now(),
        }
    }

    /// The human/ai pair for one acknowledged exchange.
    pub fn exchange(response: &ConversationResponse) -> [ChatMessage; 2] {
        let created_at = parse_timestamp_or_now(&response.created_at);
        let human_index = response.message_index.saturating_sub(1);
        [
            ChatMessage {
                id: MessageId::Canonical {
                    role: Role::Human,
                    index: human_index,
                },
                role: Role::Human,
                content: response.user_message.clone(),
                tool_name: None,
                created_at,
            },
            ChatMessage {
                id: MessageId::Canonical {
                    role: Role::Ai,
                    index: response.message_index,
                },
                role: Role::Ai,
                content: response.assistant_message.clone(),
                tool_name: None,
                created_at,
            },
        ]
    }

    /// Convert a history listing, keeping index order.
    pub fn from_history(messages: Vec<ConversationMessage>) -> Vec<ChatMessage> {
        let mut converted: Vec<ChatMessage> = messages
            .into_iter()
            .enumerate()
            .map(|(position, msg)| {
                let role = Role::from_wire(&msg.role);
                let index = msg.message_index.unwrap_or(position as u32);
                ChatMessage {
                    id: MessageId::Canonical { role, index },
                    role,
                    content: msg.content,
                    tool_name: msg.tool_name,
                    created_at: msg
                        .created_at
                        .as_deref()
                        .map(parse_timestamp_or_now)
                        .unwrap_or_else(Utc::now),
                }
            })
            .collect();
        converted.sort_by_key(|m| m.id.index());
        converted
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConversationSummary {
    pub conversation_id: ConversationId,
    #[serde(rename = "video_id")]
    pub track_key: TrackKey,
    #[serde(rename = "video_title")]
    pub title: String,
    pub last_message_at: DateTime<Utc>,
    pub message_count: u32,
    #[serde(default)]
    pub last_user_message: Option<String>,
    #[serde(default)]
    pub last_assistant_message: Option<String>,
    #[serde(default)]
    pub pinned: bool,
}

impl ConversationSummary {
    /// Summary for a conversation the backend just acknowledged for the first time.
    pub fn from_first_response(response: &ConversationResponse) -> Self {
        Self {
            conversation_id: ConversationId::new(&response.conversation_id),
            track_key: TrackKey::from(response.video_id.clone()),
            title: response.video_title.clone(),
            last_message_at: parse_timestamp_or_now(&response.created_at),
            message_count: response.message_index.saturating_add(1),
            last_user_message: Some(response.user_message.clone()),
            last_assistant_message: Some(response.assistant_message.clone()),
            pinned: false,
        }
    }

    pub fn track(&self) -> Track {
        self.track_key.track()
    }

    pub fn apply(&mut self, patch: SummaryPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(at) = patch.last_message_at {
            self.last_message_at = at;
        }
        if let Some(count) = patch.message_count {
            self.message_count = self.message_count.max(count);
        }
        if let Some(text) = patch.last_user_message {
            self.last_user_message = Some(text);
        }
        if let Some(text) = patch.last_assistant_message {
            self.last_assistant_message = Some(text);
        }
        if let Some(pinned) = patch.pinned {
            self.pinned = pinned;
        }
    }
}

/// Partial update for [`ConversationSummary`]; `None` leaves a field as is.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SummaryPatch {
    pub title: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub message_count: Option<u32>,
    pub last_user_message: Option<String>,
    pub last_assistant_message: Option<String>,
    pub pinned: Option<bool>,
}

impl SummaryPatch {
    pub fn from_response(response: &ConversationResponse) -> Self {
        Self {
            last_message_at: Some(parse_timestamp_or_now(&response.created_at)),
            message_count: Some(response.message_index.saturating_add(1)),
            last_user_message: Some(response.user_message.clone()),
            last_assistant_message: Some(response.assistant_message.clone()),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoReference {
    pub video_id: String,
    pub url: Option<String>,
}

/// What a fresh conversation is started from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Seed {
    Video(VideoReference),
    General,
}

impl Seed {
    pub fn track(&self) -> Track {
        match self {
            Seed::Video(_) => Track::Video,
            Seed::General => Track::General,
        }
    }

    pub fn from_track_key(key: &TrackKey) -> Self {
        match key {
            TrackKey::Video(id) => Seed::Video(VideoReference {
                video_id: id.clone(),
                url: None,
            }),
            TrackKey::General => Seed::General,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(index: u32) -> ConversationResponse {
        ConversationResponse {
            conversation_id: "conv-1".to_string(),
            video_id: "dQw4w9WgXcQ".to_string(),
            video_title: "Never Gonna".to_string(),
            user_message: "what happens?".to_string(),
            assistant_message: "a song".to_string(),
            message_index: index,
            created_at: "2025-02-01T10:00:00Z".to_string(),
        }
    }

    #[test]
    fn exchange_ids_follow_message_index() {
        let [human, ai] = ChatMessage::exchange(&response(3));
        assert_eq!(human.id.to_string(), "user_2");
        assert_eq!(ai.id.to_string(), "ai_3");
        assert_eq!(human.role, Role::Human);
        assert_eq!(ai.content, "a song");
    }

    #[test]
    fn message_count_saturates_at_the_top_index() {
        let summary = ConversationSummary::from_first_response(&response(u32::MAX));
        assert_eq!(summary.message_count, u32::MAX);
        assert_eq!(SummaryPatch::from_response(&response(u32::MAX)).message_count, Some(u32::MAX));
    }

    #[test]
    fn provisional_ids_never_look_canonical() {
        let id = MessageId::provisional().to_string();
        assert!(id.starts_with("tmp_"));
        assert!(!id.starts_with("user_") && !id.starts_with("ai_"));
        assert!(MessageId::notice().to_string().starts_with("notice_"));
    }

    #[test]
    fn track_key_round_trips_the_general_sentinel() {
        assert_eq!(TrackKey::from("GENERAL".to_string()), TrackKey::General);
        assert_eq!(String::from(TrackKey::General), "GENERAL");
        assert_eq!(TrackKey::from("abc123".to_string()).track(), Track::Video);
    }

    #[test]
    fn summary_serializes_with_wire_field_names() {
        let summary = ConversationSummary::from_first_response(&response(1));
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["video_id"], "dQw4w9WgXcQ");
        assert_eq!(value["video_title"], "Never Gonna");
        assert_eq!(value["message_count"], 2);
        assert_eq!(value["pinned"], false);
    }

    #[test]
    fn patch_never_lowers_message_count() {
        let mut summary = ConversationSummary::from_first_response(&response(5));
        summary.apply(SummaryPatch {
            message_count: Some(2),
            ..Default::default()
        });
        assert_eq!(summary.message_count, 6);
    }

    #[test]
    fn history_maps_roles_and_orders_by_index() {
        let history = vec![
            ConversationMessage {
                id: None,
                message_index: Some(1),
                role: "assistant".to_string(),
                content: "hi there".to_string(),
                tool_name: Some("transcript_search".to_string()),
                created_at: None,
            },
            ConversationMessage {
                id: None,
                message_index: Some(0),
                role: "user".to_string(),
                content: "hello".to_string(),
                tool_name: None,
                created_at: Some("2025-01-01T00:00:00".to_string()),
            },
        ];
        let messages = ChatMessage::from_history(history);
        assert_eq!(messages[0].id.to_string(), "user_0");
        assert_eq!(messages[1].id.to_string(), "ai_1");
        assert_eq!(messages[1].tool_name.as_deref(), Some("transcript_search"));
    }
}
