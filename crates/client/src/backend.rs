use async_trait::async_trait;
use augustus_shared::{
    ChatRequest, ConversationMessage, ConversationResponse, LoginResponse, SessionPayload, Track,
};
use serde_json::Value;

use crate::error::ApiError;

/// Everything the client core needs from the gateway.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn session(&self) -> Result<SessionPayload, ApiError>;

    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError>;

    async fn signup(&self, username: &str, email: &str, password: &str) -> Result<Value, ApiError>;

    async fn logout(&self) -> Result<(), ApiError>;

    async fn send(&self, track: Track, request: &ChatRequest) -> Result<ConversationResponse, ApiError>;

    /// Ordered canonical messages. Unknown conversations yield an empty list.
    async fn history(&self, conversation_id: &str) -> Result<Vec<ConversationMessage>, ApiError>;

    async fn health(&self) -> Result<Value, ApiError>;
}
