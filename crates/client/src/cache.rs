use augustus_shared::Track;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::{ConversationId, ConversationSummary, SummaryPatch};
use crate::storage::KeyValueStore;

/// Storage key of the persisted summary list.
pub const CACHE_KEY: &str = "augustus_conversations";

pub const DEFAULT_CAPACITY: usize = 5;

/// Bounded, recency-ordered conversation summaries shared by both tracks.
///
/// Every mutation is a read-modify-write under one lock and is flushed to the
/// store before returning. If the store rejects a write, the intended list is
/// kept in memory and served until a later write succeeds.
pub struct ConversationCache {
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
    session_only: Mutex<Option<Vec<ConversationSummary>>>,
}

impl ConversationCache {
    pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            session_only: Mutex::new(None),
        }
    }

    /// All summaries, newest first.
    pub fn list(&self) -> Vec<ConversationSummary> {
        let guard = self.session_only.lock();
        self.read(&guard)
    }

    pub fn list_for_track(&self, track: Track) -> Vec<ConversationSummary> {
        self.list()
            .into_iter()
            .filter(|s| s.track() == track)
            .collect()
    }

    pub fn get(&self, id: &ConversationId) -> Option<ConversationSummary> {
        self.list().into_iter().find(|s| &s.conversation_id == id)
    }

    pub fn upsert(&self, summary: ConversationSummary) {
        let mut guard = self.session_only.lock();
        let mut items = self.read(&guard);

        let mut summary = summary;
        if let Some(pos) = items.iter().position(|s| s.conversation_id == summary.conversation_id) {
            let existing = items.remove(pos);
            summary.message_count = summary.message_count.max(existing.message_count);
        }
        debug!(conversation_id = %summary.conversation_id, "upserting conversation summary");
        items.push(summary);

        self.write(&mut guard, items);
    }

    /// Merge `patch` into an existing summary. Absent ids are ignored.
    pub fn patch(&self, id: &ConversationId, patch: SummaryPatch) {
        let mut guard = self.session_only.lock();
        let mut items = self.read(&guard);

        let Some(existing) = items.iter_mut().find(|s| &s.conversation_id == id) else {
            debug!(conversation_id = %id, "patch for uncached conversation ignored");
            return;
        };
        existing.apply(patch);

        self.write(&mut guard, items);
    }

    pub fn clear(&self) {
        let mut guard = self.session_only.lock();
        match self.store.remove(CACHE_KEY) {
            Ok(()) => *guard = None,
            Err(e) => {
                warn!(error = %e, "failed to clear persisted conversations; clearing for this session only");
                *guard = Some(Vec::new());
            }
        }
    }

    /// True while writes are failing and the cache lives in memory only.
    pub fn is_session_only(&self) -> bool {
        self.session_only.lock().is_some()
    }

    fn read(&self, session_only: &Option<Vec<ConversationSummary>>) -> Vec<ConversationSummary> {
        if let Some(items) = session_only {
            return items.clone();
        }

        let raw = match self.store.get(CACHE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to read persisted conversations; treating as empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<ConversationSummary>>(&raw) {
            Ok(mut items) => {
                self.normalize(&mut items);
                items
            }
            Err(e) => {
                warn!(error = %e, "persisted conversations are corrupt; treating as empty");
                Vec::new()
            }
        }
    }

    fn write(&self, session_only: &mut Option<Vec<ConversationSummary>>, mut items: Vec<ConversationSummary>) {
        self.normalize(&mut items);

        let result = serde_json::to_string(&items)
            .map_err(crate::error::StorageError::from)
            .and_then(|raw| self.store.set(CACHE_KEY, &raw));

        match result {
            Ok(()) => {
                if session_only.take().is_some() {
                    debug!("conversation cache writes recovered");
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to persist conversations; keeping them for this session only");
                *session_only = Some(items);
            }
        }
    }

    fn normalize(&self, items: &mut Vec<ConversationSummary>) {
        items.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        items.truncate(self.capacity);
    }
}
