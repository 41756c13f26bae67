mod view;

pub use view::{Panel, TrackPhase, ViewState, panel};

use augustus_shared::{ChatRequest, ConversationMessage, ConversationResponse, GENERAL_VIDEO_ID, MAX_QUERY_LENGTH, Track, routes};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::cache::ConversationCache;
use crate::error::ApiError;
use crate::events::{EventSender, ViewEvent};
use crate::model::{ChatMessage, ConversationId, Seed};
use crate::reconcile::{self, CacheUpdate, FailureKind, SendTicket};
use crate::session::SessionGate;

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub max_query_length: usize,
    pub sign_out_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_query_length: MAX_QUERY_LENGTH,
            sign_out_delay: Duration::from_millis(1500),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendRejection {
    InFlight,
    DuplicateIntake,
    EmptyQuery,
    QueryTooLong,
    MissingSeed,
    SignedOut,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SendOutcome {
    Reconciled { conversation_id: ConversationId },
    RolledBack { kind: FailureKind, message: String },
    Rejected(SendRejection),
    /// The result arrived after its view was abandoned or the orchestrator was dropped.
    Discarded,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SelectOutcome {
    Loaded { messages: usize },
    LoadFailed,
    UnknownConversation,
    SignedOut,
    Discarded,
}

/// Identity of an intake submission; the same key is sent at most once.
#[derive(Clone, Debug, PartialEq)]
struct IntakeKey {
    seed: Seed,
    query: String,
}

#[derive(Default)]
struct TrackState {
    phase: TrackPhase,
    messages: Vec<ChatMessage>,
    /// Bumped whenever the track's view is replaced; late results for an older epoch skip the view.
    epoch: u64,
    in_flight: bool,
    last_intake: Option<IntakeKey>,
    loading_history: bool,
}

impl TrackState {
    fn reset(&mut self, phase: TrackPhase) {
        self.phase = phase;
        self.messages.clear();
        self.epoch += 1;
        self.loading_history = false;
        self.last_intake = None;
    }
}

struct CoreState {
    active_track: Track,
    video: TrackState,
    general: TrackState,
}

impl CoreState {
    fn track(&self, track: Track) -> &TrackState {
        match track {
            Track::Video => &self.video,
            Track::General => &self.general,
        }
    }

    fn track_mut(&mut self, track: Track) -> &mut TrackState {
        match track {
            Track::Video => &mut self.video,
            Track::General => &mut self.general,
        }
    }
}

struct Shared {
    backend: Arc<dyn Backend>,
    cache: Arc<ConversationCache>,
    session: Arc<SessionGate>,
    events: EventSender,
    config: OrchestratorConfig,
    state: Mutex<CoreState>,
}

/// Dual-track conversation state machine.
///
/// State sits behind a lock that is never held across a backend call. Work
/// resumed after a call reaches the state through a weak reference, so a
/// dropped orchestrator turns late results into no-ops.
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn Backend>,
        cache: Arc<ConversationCache>,
        session: Arc<SessionGate>,
        events: EventSender,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                cache,
                session,
                events,
                config,
                state: Mutex::new(CoreState {
                    active_track: Track::Video,
                    video: TrackState::default(),
                    general: TrackState::default(),
                }),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<ConversationCache> {
        &self.shared.cache
    }

    pub fn session(&self) -> &Arc<SessionGate> {
        &self.shared.session
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.shared.events.subscribe()
    }

    pub fn active_track(&self) -> Track {
        self.shared.state.lock().active_track
    }

    pub fn phase(&self, track: Track) -> TrackPhase {
        self.shared.state.lock().track(track).phase.clone()
    }

    pub fn messages(&self, track: Track) -> Vec<ChatMessage> {
        self.shared.state.lock().track(track).messages.clone()
    }

    /// The track's messages together with its view epoch, read under one lock.
    /// The epoch changes whenever the list is replaced by another conversation.
    pub fn transcript(&self, track: Track) -> (u64, Vec<ChatMessage>) {
        let state = self.shared.state.lock();
        let ts = state.track(track);
        (ts.epoch, ts.messages.clone())
    }

    pub fn view(&self) -> ViewState {
        let (active_track, phase, messages, busy, loading_history) = {
            let state = self.shared.state.lock();
            let ts = state.track(state.active_track);
            (
                state.active_track,
                ts.phase.clone(),
                ts.messages.clone(),
                ts.in_flight,
                ts.loading_history,
            )
        };

        ViewState {
            active_track,
            panel: panel(&phase),
            conversation_id: phase.conversation_id().cloned(),
            phase,
            messages,
            busy,
            loading_history,
            conversations: self.shared.cache.list_for_track(active_track),
        }
    }

    /// Reopen the most recent conversation, preferring the video track.
    pub async fn restore(&self) -> Option<SelectOutcome> {
        let cache = &self.shared.cache;
        let latest = cache
            .list_for_track(Track::Video)
            .into_iter()
            .next()
            .or_else(|| cache.list_for_track(Track::General).into_iter().next())?;

        info!(conversation_id = %latest.conversation_id, "restoring last conversation");
        Some(self.select_conversation(latest.conversation_id).await)
    }

    pub fn switch_track(&self, track: Track) {
        {
            let mut state = self.shared.state.lock();
            state.active_track = track;
            let ts = state.track_mut(track);
            if let TrackPhase::NoConversation { intake_form } = &mut ts.phase {
                *intake_form = true;
            }
        }
        self.shared.events.panel_changed(track);
    }

    pub fn start_new_conversation(&self, track: Track) {
        {
            let mut state = self.shared.state.lock();
            state.active_track = track;
            state
                .track_mut(track)
                .reset(TrackPhase::NoConversation { intake_form: true });
        }
        debug!(%track, "started new conversation");
        self.shared.events.panel_changed(track);
        self.shared.events.messages_changed(track);
    }

    pub async fn select_conversation(&self, conversation_id: ConversationId) -> SelectOutcome {
        Shared::select(Arc::downgrade(&self.shared), conversation_id).await
    }

    pub async fn send(&self, track: Track, prompt: &str) -> SendOutcome {
        Shared::send(Arc::downgrade(&self.shared), track, prompt.to_string()).await
    }

    pub async fn submit_intake(&self, track: Track, seed: Seed, query: &str) -> SendOutcome {
        Shared::submit_intake(Arc::downgrade(&self.shared), track, seed, query.to_string()).await
    }

    /// Run a send in the background; the task holds no strong reference.
    pub fn spawn_send(&self, track: Track, prompt: String) -> JoinHandle<SendOutcome> {
        tokio::spawn(Shared::send(Arc::downgrade(&self.shared), track, prompt))
    }

    pub fn spawn_submit_intake(&self, track: Track, seed: Seed, query: String) -> JoinHandle<SendOutcome> {
        tokio::spawn(Shared::submit_intake(Arc::downgrade(&self.shared), track, seed, query))
    }
}

type Prepared = (Arc<dyn Backend>, SendTicket, ChatRequest);

impl Shared {
    fn validate_query(&self, query: &str) -> Result<(), SendRejection> {
        if query.is_empty() {
            return Err(SendRejection::EmptyQuery);
        }
        if query.chars().count() > self.config.max_query_length {
            return Err(SendRejection::QueryTooLong);
        }
        if !self.session.ensure_authenticated(routes::DEFAULT_APP_PAGE) {
            return Err(SendRejection::SignedOut);
        }
        Ok(())
    }

    async fn send(weak: Weak<Shared>, track: Track, prompt: String) -> SendOutcome {
        let (backend, ticket, request) = {
            let Some(shared) = weak.upgrade() else {
                return SendOutcome::Discarded;
            };
            match shared.begin_send(track, prompt.trim()) {
                Ok(prepared) => prepared,
                Err(rejection) => {
                    debug!(%track, ?rejection, "send rejected");
                    return SendOutcome::Rejected(rejection);
                }
            }
        };

        let result = backend.send(track, &request).await;

        let Some(shared) = weak.upgrade() else {
            debug!(%track, "orchestrator dropped before send resolved");
            return SendOutcome::Discarded;
        };
        shared.finish_send(ticket, result)
    }

    fn begin_send(&self, track: Track, query: &str) -> Result<Prepared, SendRejection> {
        self.validate_query(query)?;

        let ticket = {
            let mut state = self.state.lock();
            let ts = state.track_mut(track);
            if ts.in_flight {
                return Err(SendRejection::InFlight);
            }

            let (conversation_id, seed) = match &ts.phase {
                TrackPhase::Active { conversation_id } => (
                    Some(conversation_id.clone()),
                    self.cache
                        .get(conversation_id)
                        .map(|s| Seed::from_track_key(&s.track_key)),
                ),
                TrackPhase::Intake { seed, .. } => (None, Some(seed.clone())),
                TrackPhase::NoConversation { .. } => match track {
                    Track::General => (None, Some(Seed::General)),
                    Track::Video => return Err(SendRejection::MissingSeed),
                },
            };

            ts.in_flight = true;
            SendTicket {
                track,
                epoch: ts.epoch,
                provisional: reconcile::begin(&mut ts.messages, query),
                conversation_id,
                seed,
            }
        };
        self.events.messages_changed(track);

        let (video_id, video_url) = match &ticket.seed {
            Some(Seed::Video(reference)) => (Some(reference.video_id.clone()), reference.url.clone()),
            _ => (None, None),
        };
        let request = ChatRequest {
            conversation_id: ticket.conversation_id.as_ref().map(|id| id.to_string()),
            video_id,
            video_url,
            query: query.to_string(),
        };

        debug!(%track, provisional = %ticket.provisional, "optimistic message appended");
        Ok((Arc::clone(&self.backend), ticket, request))
    }

    fn finish_send(&self, ticket: SendTicket, result: Result<ConversationResponse, ApiError>) -> SendOutcome {
        match result {
            Ok(response) if response.is_well_formed() => self.acknowledge(ticket, response),
            Ok(response) => {
                let detail = format!(
                    "unusable chat response for {:?} (message_index {})",
                    response.conversation_id, response.message_index
                );
                self.fail(ticket, ApiError::Malformed(detail))
            }
            Err(error) => self.fail(ticket, error),
        }
    }

    fn acknowledge(&self, ticket: SendTicket, response: ConversationResponse) -> SendOutcome {
        let track = ticket.track;
        if track == Track::General && response.video_id != GENERAL_VIDEO_ID {
            warn!(video_id = %response.video_id, "general conversation answered with a video id");
        }

        let cached = ticket.conversation_id.as_ref().and_then(|id| self.cache.get(id));
        match reconcile::cache_update(&ticket, &response, cached.as_ref()) {
            CacheUpdate::Insert(summary) => self.cache.upsert(summary),
            CacheUpdate::Patch(id, patch) => self.cache.patch(&id, patch),
        }
        self.events.conversations_changed();

        let conversation_id = ConversationId::new(&response.conversation_id);
        let applied = {
            let mut state = self.state.lock();
            let ts = state.track_mut(track);
            ts.in_flight = false;
            if ts.epoch == ticket.epoch {
                reconcile::reconcile(&mut ts.messages, &ticket, &response);
                ts.phase = TrackPhase::Active {
                    conversation_id: conversation_id.clone(),
                };
                true
            } else {
                false
            }
        };

        if !applied {
            debug!(%track, %conversation_id, "send acknowledged after its view was replaced");
            return SendOutcome::Discarded;
        }

        debug!(%track, %conversation_id, message_index = response.message_index, "send reconciled");
        self.events.messages_changed(track);
        self.events.panel_changed(track);
        SendOutcome::Reconciled { conversation_id }
    }

    fn fail(&self, ticket: SendTicket, error: ApiError) -> SendOutcome {
        let track = ticket.track;
        let kind = reconcile::classify(&ticket, &error);
        let message = reconcile::failure_text(kind, &error);

        match kind {
            FailureKind::SessionExpired => {
                info!(%track, "send rejected as unauthorized; signing out");
                self.session.mark_expired();
                self.session.schedule_sign_out(self.config.sign_out_delay);
            }
            FailureKind::StaleConversation => {
                warn!(%track, conversation_id = ?ticket.conversation_id, "conversation no longer recognised; starting fresh on next send");
            }
            FailureKind::Transient => match &error {
                ApiError::Malformed(detail) => error!(%track, detail = %detail, "malformed chat response"),
                _ => warn!(%track, error = %error, "send failed"),
            },
        }

        let stale_seed = match kind {
            FailureKind::StaleConversation => ticket.seed.clone().or(match track {
                Track::General => Some(Seed::General),
                Track::Video => None,
            }),
            _ => None,
        };

        let applied = {
            let mut state = self.state.lock();
            let ts = state.track_mut(track);
            ts.in_flight = false;
            if ts.epoch == ticket.epoch {
                reconcile::roll_back(&mut ts.messages, &ticket, &message);
                if kind == FailureKind::StaleConversation {
                    ts.phase = match stale_seed {
                        Some(seed) => TrackPhase::Intake { seed, query: None },
                        None => TrackPhase::NoConversation { intake_form: true },
                    };
                }
                true
            } else {
                false
            }
        };

        if applied {
            self.events.messages_changed(track);
            if kind == FailureKind::StaleConversation {
                self.events.panel_changed(track);
            }
        }
        if kind == FailureKind::SessionExpired {
            self.events.banner(message.clone());
        }

        SendOutcome::RolledBack { kind, message }
    }

    async fn submit_intake(weak: Weak<Shared>, track: Track, seed: Seed, query: String) -> SendOutcome {
        let query = query.trim().to_string();
        let key = IntakeKey {
            seed: seed.clone(),
            query: query.clone(),
        };

        {
            let Some(shared) = weak.upgrade() else {
                return SendOutcome::Discarded;
            };
            if let Err(rejection) = shared.begin_intake(track, seed, &key) {
                debug!(%track, ?rejection, "intake rejected");
                return SendOutcome::Rejected(rejection);
            }
        }

        let outcome = Shared::send(weak.clone(), track, query).await;

        if let SendOutcome::Rejected(_) = outcome {
            if let Some(shared) = weak.upgrade() {
                let mut state = shared.state.lock();
                let ts = state.track_mut(track);
                if ts.last_intake.as_ref() == Some(&key) {
                    ts.last_intake = None;
                }
            }
        }
        outcome
    }

    fn begin_intake(&self, track: Track, seed: Seed, key: &IntakeKey) -> Result<(), SendRejection> {
        if seed.track() != track {
            return Err(SendRejection::MissingSeed);
        }
        self.validate_query(&key.query)?;

        {
            let mut state = self.state.lock();
            let ts = state.track_mut(track);
            if ts.last_intake.as_ref() == Some(key) {
                return Err(SendRejection::DuplicateIntake);
            }
            if ts.in_flight {
                return Err(SendRejection::InFlight);
            }
            ts.reset(TrackPhase::Intake {
                seed,
                query: Some(key.query.clone()),
            });
            ts.last_intake = Some(key.clone());
            state.active_track = track;
        }

        self.events.panel_changed(track);
        self.events.messages_changed(track);
        Ok(())
    }

    async fn select(weak: Weak<Shared>, conversation_id: ConversationId) -> SelectOutcome {
        let (backend, track, epoch) = {
            let Some(shared) = weak.upgrade() else {
                return SelectOutcome::Discarded;
            };
            match shared.begin_select(&conversation_id) {
                Ok(started) => started,
                Err(outcome) => return outcome,
            }
        };

        let result = backend.history(conversation_id.as_str()).await;

        let Some(shared) = weak.upgrade() else {
            return SelectOutcome::Discarded;
        };
        shared.finish_select(track, epoch, &conversation_id, result)
    }

    fn begin_select(&self, conversation_id: &ConversationId) -> Result<(Arc<dyn Backend>, Track, u64), SelectOutcome> {
        if !self.session.ensure_authenticated(routes::DEFAULT_APP_PAGE) {
            return Err(SelectOutcome::SignedOut);
        }
        let Some(summary) = self.cache.get(conversation_id) else {
            warn!(%conversation_id, "selected conversation is not cached");
            return Err(SelectOutcome::UnknownConversation);
        };
        let track = summary.track();

        let epoch = {
            let mut state = self.state.lock();
            state.active_track = track;
            let ts = state.track_mut(track);
            ts.reset(TrackPhase::Active {
                conversation_id: conversation_id.clone(),
            });
            ts.loading_history = true;
            ts.epoch
        };

        debug!(%track, %conversation_id, "conversation selected; loading history");
        self.events.panel_changed(track);
        self.events.messages_changed(track);
        Ok((Arc::clone(&self.backend), track, epoch))
    }

    fn finish_select(
        &self,
        track: Track,
        epoch: u64,
        conversation_id: &ConversationId,
        result: Result<Vec<ConversationMessage>, ApiError>,
    ) -> SelectOutcome {
        let loaded = result.map(ChatMessage::from_history);

        let outcome = {
            let mut state = self.state.lock();
            let ts = state.track_mut(track);
            if ts.epoch != epoch {
                return SelectOutcome::Discarded;
            }
            ts.loading_history = false;
            match &loaded {
                Ok(messages) => {
                    ts.messages = messages.clone();
                    SelectOutcome::Loaded {
                        messages: messages.len(),
                    }
                }
                Err(_) => {
                    ts.messages.clear();
                    SelectOutcome::LoadFailed
                }
            }
        };

        if let Err(error) = &loaded {
            warn!(%conversation_id, error = %error, "failed to load conversation history");
            if matches!(error, ApiError::Unauthorized(_)) {
                self.session.mark_expired();
                self.session.schedule_sign_out(self.config.sign_out_delay);
            }
            self.events.banner(format!("Could not load conversation history: {}", error.user_message()));
        }
        self.events.messages_changed(track);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_CAPACITY;
    use crate::model::{ConversationSummary, Role, TrackKey, VideoReference};
    use crate::session::SessionStatus;
    use crate::storage::MemoryStore;
    use crate::testing::{FakeBackend, Reply, history_message};
    use chrono::Utc;

    struct Harness {
        backend: Arc<FakeBackend>,
        orchestrator: Orchestrator,
        events: EventSender,
    }

    fn harness() -> Harness {
        let backend = Arc::new(FakeBackend::signed_in());
        let events = EventSender::default();
        let cache = Arc::new(ConversationCache::new(Arc::new(MemoryStore::new()), DEFAULT_CAPACITY));
        let session = Arc::new(SessionGate::new(backend.clone(), events.clone()));
        let orchestrator = Orchestrator::new(
            backend.clone(),
            cache,
            session,
            events.clone(),
            OrchestratorConfig::default(),
        );
        Harness {
            backend,
            orchestrator,
            events,
        }
    }

    fn video_seed(id: &str) -> Seed {
        Seed::Video(VideoReference {
            video_id: id.to_string(),
            url: Some(format!("https://www.youtube.com/watch?v={}", id)),
        })
    }

    fn response(conversation_id: &str, index: u32) -> ConversationResponse {
        ConversationResponse {
            conversation_id: conversation_id.to_string(),
            video_id: "GENERAL".to_string(),
            video_title: "General".to_string(),
            user_message: "hello".to_string(),
            assistant_message: "hi".to_string(),
            message_index: index,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    async fn wait_for_send(backend: &FakeBackend, calls: usize) {
        while backend.send_calls() < calls {
            tokio::task::yield_now().await;
        }
    }

    async fn start_general(h: &Harness) -> ConversationId {
        match h.orchestrator.submit_intake(Track::General, Seed::General, "first").await {
            SendOutcome::Reconciled { conversation_id } => conversation_id,
            other => panic!("expected reconcile, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn second_send_while_in_flight_is_rejected() {
        let h = harness();
        h.orchestrator.switch_track(Track::General);
        h.backend.hold_sends();

        let first = h.orchestrator.spawn_send(Track::General, "one".to_string());
        wait_for_send(&h.backend, 1).await;

        let messages = h.orchestrator.messages(Track::General);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].id.is_provisional());
        assert!(h.orchestrator.view().busy);

        let second = h.orchestrator.send(Track::General, "two").await;
        assert_eq!(second, SendOutcome::Rejected(SendRejection::InFlight));
        assert_eq!(h.orchestrator.messages(Track::General).len(), 1);

        h.backend.release_send();
        assert!(matches!(first.await.unwrap(), SendOutcome::Reconciled { .. }));

        let messages = h.orchestrator.messages(Track::General);
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| !m.id.is_provisional()));
        assert_eq!(h.backend.send_calls(), 1);
    }

    #[tokio::test]
    async fn tracks_do_not_share_the_single_flight_slot() {
        let h = harness();
        h.orchestrator
            .submit_intake(Track::Video, video_seed("abc"), "video q")
            .await;
        h.backend.hold_sends();

        let general = h.orchestrator.spawn_send(Track::General, "g".to_string());
        wait_for_send(&h.backend, 2).await;
        let video = h.orchestrator.spawn_send(Track::Video, "v".to_string());
        wait_for_send(&h.backend, 3).await;

        h.backend.release_send();
        h.backend.release_send();
        assert!(matches!(general.await.unwrap(), SendOutcome::Reconciled { .. }));
        assert!(matches!(video.await.unwrap(), SendOutcome::Reconciled { .. }));
    }

    #[tokio::test]
    async fn acknowledged_ids_follow_message_index() {
        let h = harness();
        h.backend.push_reply(Reply::Respond(response("c9", 3)));

        let outcome = h.orchestrator.send(Track::General, "hello").await;
        assert_eq!(
            outcome,
            SendOutcome::Reconciled {
                conversation_id: ConversationId::new("c9")
            }
        );

        let ids: Vec<String> = h
            .orchestrator
            .messages(Track::General)
            .iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(ids, vec!["user_2", "ai_3"]);
        assert_eq!(
            h.orchestrator.phase(Track::General),
            TrackPhase::Active {
                conversation_id: ConversationId::new("c9")
            }
        );
    }

    #[tokio::test]
    async fn out_of_range_index_rolls_back_and_frees_the_track() {
        let h = harness();
        h.backend.push_reply(Reply::Respond(response("cmax", u32::MAX)));

        let outcome = h.orchestrator.spawn_send(Track::General, "hello".to_string()).await.unwrap();
        assert!(matches!(
            outcome,
            SendOutcome::RolledBack {
                kind: FailureKind::Transient,
                ..
            }
        ));
        assert!(h.orchestrator.cache().get(&ConversationId::new("cmax")).is_none());

        let messages = h.orchestrator.messages(Track::General);
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].id.is_provisional());
        assert_eq!(messages[0].role, Role::Ai);

        let retry = h.orchestrator.send(Track::General, "hello again").await;
        assert!(matches!(retry, SendOutcome::Reconciled { .. }));
    }

    #[tokio::test]
    async fn first_acknowledgment_creates_the_summary_and_later_ones_patch_it() {
        let h = harness();
        let id = start_general(&h).await;
        let cache = h.orchestrator.cache();

        let summary = cache.get(&id).unwrap();
        assert_eq!(summary.track_key, TrackKey::General);
        assert_eq!(summary.message_count, 2);

        h.orchestrator.send(Track::General, "again").await;
        let summary = cache.get(&id).unwrap();
        assert_eq!(summary.message_count, 4);
        assert_eq!(summary.last_user_message.as_deref(), Some("again"));
        assert_eq!(cache.list().len(), 1);

        let (_, request) = h.backend.requests().pop().unwrap();
        assert_eq!(request.conversation_id.as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn evicted_conversation_is_reinserted_on_reply() {
        let h = harness();
        let id = start_general(&h).await;
        h.orchestrator.cache().clear();

        h.orchestrator.send(Track::General, "still here?").await;
        let summary = h.orchestrator.cache().get(&id).unwrap();
        assert_eq!(summary.message_count, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_send_bubbles_once_then_signs_out_later() {
        let h = harness();
        start_general(&h).await;
        let before = h.orchestrator.messages(Track::General).len();

        h.backend.push_reply(Reply::Status(401, "Unauthorized".to_string()));
        let outcome = h.orchestrator.send(Track::General, "are you there").await;
        assert!(matches!(
            outcome,
            SendOutcome::RolledBack {
                kind: FailureKind::SessionExpired,
                ..
            }
        ));

        let messages = h.orchestrator.messages(Track::General);
        assert_eq!(messages.len(), before + 1);
        assert!(messages.last().unwrap().id.to_string().starts_with("notice_"));
        assert_eq!(h.backend.logout_calls(), 0);

        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert_eq!(h.backend.logout_calls(), 1);
        assert_eq!(h.orchestrator.session().status(), SessionStatus::Unauthenticated);

        let blocked = h.orchestrator.send(Track::General, "hello?").await;
        assert_eq!(blocked, SendOutcome::Rejected(SendRejection::SignedOut));
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(h.backend.logout_calls(), 1);
    }

    #[tokio::test]
    async fn stale_conversation_clears_pointer_but_keeps_summary() {
        let h = harness();
        h.orchestrator
            .submit_intake(Track::Video, video_seed("abc"), "what is this?")
            .await;
        let id = h.orchestrator.phase(Track::Video).conversation_id().cloned().unwrap();

        h.backend.push_reply(Reply::Status(404, "Conversation not found".to_string()));
        let outcome = h.orchestrator.send(Track::Video, "and then?").await;
        assert!(matches!(
            outcome,
            SendOutcome::RolledBack {
                kind: FailureKind::StaleConversation,
                ..
            }
        ));

        let phase = h.orchestrator.phase(Track::Video);
        assert_eq!(phase.conversation_id(), None);
        assert!(matches!(&phase, TrackPhase::Intake { seed: Seed::Video(r), query: None } if r.video_id == "abc"));
        assert!(h.orchestrator.cache().get(&id).is_some());
        assert_eq!(h.orchestrator.view().panel, Panel::Chat);

        h.orchestrator.send(Track::Video, "fresh start").await;
        let (_, request) = h.backend.requests().pop().unwrap();
        assert_eq!(request.conversation_id, None);
        assert_eq!(request.video_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn transient_failure_leaves_pointer_and_cache_alone() {
        let h = harness();
        let id = start_general(&h).await;
        let cached = h.orchestrator.cache().get(&id).unwrap();

        h.backend.push_reply(Reply::Status(503, "Service temporarily unavailable.".to_string()));
        let outcome = h.orchestrator.send(Track::General, "retry me").await;
        assert_eq!(
            outcome,
            SendOutcome::RolledBack {
                kind: FailureKind::Transient,
                message: "Error: Service temporarily unavailable.".to_string()
            }
        );

        assert_eq!(h.orchestrator.phase(Track::General).conversation_id(), Some(&id));
        assert_eq!(h.orchestrator.cache().get(&id).unwrap(), cached);
        assert!(matches!(
            h.orchestrator.send(Track::General, "retry me").await,
            SendOutcome::Reconciled { .. }
        ));
    }

    #[tokio::test]
    async fn failed_history_keeps_the_selection() {
        let h = harness();
        let id = start_general(&h).await;
        h.orchestrator.start_new_conversation(Track::General);
        h.backend.set_history(id.as_str(), Err(500));
        let mut rx = h.events.subscribe();

        let outcome = h.orchestrator.select_conversation(id.clone()).await;
        assert_eq!(outcome, SelectOutcome::LoadFailed);
        assert_eq!(h.orchestrator.phase(Track::General).conversation_id(), Some(&id));
        assert!(h.orchestrator.messages(Track::General).is_empty());

        let mut saw_banner = false;
        while let Ok(event) = rx.try_recv() {
            saw_banner |= matches!(event, ViewEvent::Banner { .. });
        }
        assert!(saw_banner);
    }

    #[tokio::test]
    async fn selecting_loads_history_in_index_order() {
        let h = harness();
        let id = start_general(&h).await;
        h.backend.set_history(
            id.as_str(),
            Ok(vec![
                history_message(1, "assistant", "hi"),
                history_message(0, "user", "hello"),
            ]),
        );

        let outcome = h.orchestrator.select_conversation(id).await;
        assert_eq!(outcome, SelectOutcome::Loaded { messages: 2 });
        let ids: Vec<String> = h
            .orchestrator
            .messages(Track::General)
            .iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(ids, vec!["user_0", "ai_1"]);
    }

    #[tokio::test]
    async fn unknown_conversation_is_not_selected() {
        let h = harness();
        let outcome = h.orchestrator.select_conversation(ConversationId::new("nope")).await;
        assert_eq!(outcome, SelectOutcome::UnknownConversation);
        assert_eq!(h.backend.history_calls(), 0);
    }

    #[tokio::test]
    async fn repeated_intake_sends_once() {
        let h = harness();
        let first = h
            .orchestrator
            .submit_intake(Track::General, Seed::General, "hello")
            .await;
        let second = h
            .orchestrator
            .submit_intake(Track::General, Seed::General, "hello")
            .await;

        assert!(matches!(first, SendOutcome::Reconciled { .. }));
        assert_eq!(second, SendOutcome::Rejected(SendRejection::DuplicateIntake));
        assert_eq!(h.backend.send_calls(), 1);
    }

    #[tokio::test]
    async fn intake_can_be_repeated_after_starting_over() {
        let h = harness();
        h.orchestrator
            .submit_intake(Track::General, Seed::General, "hello")
            .await;
        h.orchestrator.start_new_conversation(Track::General);
        h.orchestrator
            .submit_intake(Track::General, Seed::General, "hello")
            .await;
        assert_eq!(h.backend.send_calls(), 2);
    }

    #[tokio::test]
    async fn invalid_sends_never_reach_the_network() {
        let h = harness();
        assert_eq!(
            h.orchestrator.send(Track::General, "   ").await,
            SendOutcome::Rejected(SendRejection::EmptyQuery)
        );
        assert_eq!(
            h.orchestrator.send(Track::General, &"x".repeat(2001)).await,
            SendOutcome::Rejected(SendRejection::QueryTooLong)
        );
        assert_eq!(
            h.orchestrator.send(Track::Video, "no video yet").await,
            SendOutcome::Rejected(SendRejection::MissingSeed)
        );
        assert_eq!(
            h.orchestrator
                .submit_intake(Track::General, video_seed("abc"), "wrong track")
                .await,
            SendOutcome::Rejected(SendRejection::MissingSeed)
        );
        assert_eq!(h.backend.send_calls(), 0);
        assert!(h.orchestrator.messages(Track::General).is_empty());
    }

    #[tokio::test]
    async fn dropped_orchestrator_ignores_late_results() {
        let h = harness();
        h.backend.hold_sends();
        let pending = h.orchestrator.spawn_send(Track::General, "late".to_string());
        wait_for_send(&h.backend, 1).await;

        let Harness { backend, orchestrator, .. } = h;
        drop(orchestrator);
        backend.release_send();

        assert_eq!(pending.await.unwrap(), SendOutcome::Discarded);
    }

    #[tokio::test]
    async fn abandoned_view_skips_messages_but_caches_the_summary() {
        let h = harness();
        h.backend.hold_sends();
        let pending = h.orchestrator.spawn_submit_intake(Track::General, Seed::General, "first".to_string());
        wait_for_send(&h.backend, 1).await;

        h.orchestrator.start_new_conversation(Track::General);
        assert_eq!(
            h.orchestrator.send(Track::General, "second").await,
            SendOutcome::Rejected(SendRejection::InFlight)
        );

        h.backend.release_send();
        assert_eq!(pending.await.unwrap(), SendOutcome::Discarded);

        assert!(h.orchestrator.messages(Track::General).is_empty());
        assert_eq!(
            h.orchestrator.phase(Track::General),
            TrackPhase::NoConversation { intake_form: true }
        );
        assert_eq!(h.orchestrator.cache().list().len(), 1);
        assert!(!h.orchestrator.view().busy);
    }

    #[tokio::test]
    async fn switching_tabs_leaves_the_other_track_alone() {
        let h = harness();
        let id = start_general(&h).await;

        h.orchestrator.switch_track(Track::Video);
        let view = h.orchestrator.view();
        assert_eq!(view.active_track, Track::Video);
        assert_eq!(view.panel, Panel::IntakeForm);
        assert!(view.conversations.is_empty());

        h.orchestrator.start_new_conversation(Track::Video);
        assert_eq!(h.orchestrator.phase(Track::General).conversation_id(), Some(&id));
        assert_eq!(h.orchestrator.messages(Track::General).len(), 2);
    }

    #[tokio::test]
    async fn restore_prefers_the_latest_video_conversation() {
        let h = harness();
        assert_eq!(h.orchestrator.restore().await, None);

        let cache = h.orchestrator.cache();
        let mut video = ConversationSummary::from_first_response(&response("v1", 1));
        video.track_key = TrackKey::Video("abc".to_string());
        video.last_message_at = Utc::now() - chrono::Duration::hours(1);
        cache.upsert(video);
        cache.upsert(ConversationSummary::from_first_response(&response("g1", 1)));

        let outcome = h.orchestrator.restore().await;
        assert_eq!(outcome, Some(SelectOutcome::Loaded { messages: 0 }));
        assert_eq!(h.orchestrator.active_track(), Track::Video);
        assert_eq!(
            h.orchestrator.phase(Track::Video).conversation_id(),
            Some(&ConversationId::new("v1"))
        );
    }
}
