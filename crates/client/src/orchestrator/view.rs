use augustus_shared::Track;

use crate::model::{ChatMessage, ConversationId, ConversationSummary, Seed};

/// Where one track is in its conversation lifecycle.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackPhase {
    NoConversation { intake_form: bool },
    /// Seed chosen, no conversation acknowledged yet. `query` is the pending first question.
    Intake { seed: Seed, query: Option<String> },
    Active { conversation_id: ConversationId },
}

impl TrackPhase {
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            TrackPhase::Active { conversation_id } => Some(conversation_id),
            _ => None,
        }
    }
}

impl Default for TrackPhase {
    fn default() -> Self {
        TrackPhase::NoConversation { intake_form: false }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Panel {
    Chat,
    IntakeForm,
    Empty,
}

/// Which panel a track shows. Depends on the phase alone.
///
/// `Intake` shows the chat panel even without a pending query: that is the phase a track
/// drops back to after a stale-conversation 404, and the error bubble has to stay on screen
/// while the next send starts a fresh conversation from the same seed.
pub fn panel(phase: &TrackPhase) -> Panel {
    match phase {
        TrackPhase::Active { .. } | TrackPhase::Intake { .. } => Panel::Chat,
        TrackPhase::NoConversation { intake_form: true } => Panel::IntakeForm,
        TrackPhase::NoConversation { intake_form: false } => Panel::Empty,
    }
}

/// Snapshot of what the active tab should render.
#[derive(Clone, Debug)]
pub struct ViewState {
    pub active_track: Track,
    pub panel: Panel,
    pub phase: TrackPhase,
    pub conversation_id: Option<ConversationId>,
    pub messages: Vec<ChatMessage>,
    pub busy: bool,
    pub loading_history: bool,
    pub conversations: Vec<ConversationSummary>,
}
