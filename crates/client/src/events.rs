use augustus_shared::Track;
use tokio::sync::broadcast;

use crate::session::SessionStatus;

/// Notifications for whatever is rendering the orchestrator's state.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewEvent {
    MessagesChanged { track: Track },
    PanelChanged { track: Track },
    ConversationsChanged,
    Banner { message: String },
    SessionChanged { status: SessionStatus },
    Navigate { to: String },
}

/// Cloneable sender half; sends are dropped when nobody is listening.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: broadcast::Sender<ViewEvent>,
}

impl EventSender {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.tx.subscribe()
    }

    pub fn send(&self, event: ViewEvent) {
        let _ = self.tx.send(event);
    }

    pub fn messages_changed(&self, track: Track) {
        self.send(ViewEvent::MessagesChanged { track });
    }

    pub fn panel_changed(&self, track: Track) {
        self.send(ViewEvent::PanelChanged { track });
    }

    pub fn conversations_changed(&self) {
        self.send(ViewEvent::ConversationsChanged);
    }

    pub fn banner(&self, message: impl Into<String>) {
        self.send(ViewEvent::Banner {
            message: message.into(),
        });
    }

    pub fn navigate(&self, to: impl Into<String>) {
        self.send(ViewEvent::Navigate { to: to.into() });
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new(100)
    }
}
