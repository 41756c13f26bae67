//! Optimistic send bookkeeping: provisional message in, canonical pair or
//! error bubble out.

use augustus_shared::{ConversationResponse, Track};

use crate::error::ApiError;
use crate::model::{ChatMessage, ConversationId, ConversationSummary, MessageId, Seed, SummaryPatch};

/// One in-flight send, captured when the provisional message was appended.
#[derive(Clone, Debug)]
pub struct SendTicket {
    pub track: Track,
    pub epoch: u64,
    pub provisional: MessageId,
    /// `None` when this send starts a new conversation.
    pub conversation_id: Option<ConversationId>,
    pub seed: Option<Seed>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    SessionExpired,
    StaleConversation,
    Transient,
}

/// How an acknowledged exchange lands in the cache.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheUpdate {
    Insert(ConversationSummary),
    Patch(ConversationId, SummaryPatch),
}

pub const SESSION_EXPIRED_TEXT: &str = "Your session has expired. Redirecting to sign in...";
pub const STALE_CONVERSATION_TEXT: &str =
    "This conversation is no longer available. Your next message will start a new conversation.";

/// Append the provisional human message.
pub fn begin(messages: &mut Vec<ChatMessage>, prompt: &str) -> MessageId {
    let message = ChatMessage::provisional(prompt);
    let id = message.id.clone();
    messages.push(message);
    id
}

/// Swap the provisional message for the canonical human/ai pair.
pub fn reconcile(messages: &mut Vec<ChatMessage>, ticket: &SendTicket, response: &ConversationResponse) {
    messages.retain(|m| m.id != ticket.provisional);
    for message in ChatMessage::exchange(response) {
        if !messages.iter().any(|m| m.id == message.id) {
            messages.push(message);
        }
    }
}

/// Swap the provisional message for an error bubble.
pub fn roll_back(messages: &mut Vec<ChatMessage>, ticket: &SendTicket, text: &str) {
    messages.retain(|m| m.id != ticket.provisional);
    messages.push(ChatMessage::notice(text));
}

pub fn classify(ticket: &SendTicket, error: &ApiError) -> FailureKind {
    match error {
        ApiError::Unauthorized(_) => FailureKind::SessionExpired,
        ApiError::NotFound(_) if ticket.conversation_id.is_some() => FailureKind::StaleConversation,
        _ => FailureKind::Transient,
    }
}

pub fn failure_text(kind: FailureKind, error: &ApiError) -> String {
    match kind {
        FailureKind::SessionExpired => SESSION_EXPIRED_TEXT.to_string(),
        FailureKind::StaleConversation => STALE_CONVERSATION_TEXT.to_string(),
        FailureKind::Transient => format!("Error: {}", error.user_message()),
    }
}

/// A new conversation inserts its summary; an existing one is patched, unless
/// it has fallen out of the cache, in which case the full summary is inserted.
pub fn cache_update(
    ticket: &SendTicket,
    response: &ConversationResponse,
    cached: Option<&ConversationSummary>,
) -> CacheUpdate {
    match (&ticket.conversation_id, cached) {
        (Some(_), Some(existing)) => CacheUpdate::Patch(
            existing.conversation_id.clone(),
            SummaryPatch::from_response(response),
        ),
        _ => CacheUpdate::Insert(ConversationSummary::from_first_response(response)),
    }
}
