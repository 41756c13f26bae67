// In-memory backend for unit tests.
use async_trait::async_trait;
use augustus_shared::{
    ChatRequest, ConversationMessage, ConversationResponse, GENERAL_VIDEO_ID, LoginResponse,
    SessionPayload, Track,
};
use chrono::{Duration, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

use crate::backend::Backend;
use crate::error::ApiError;

pub enum Reply {
    Status(u16, String),
    Respond(ConversationResponse),
}

#[derive(Default)]
pub struct FakeBackend {
    authenticated: AtomicBool,
    session_error: Mutex<Option<u16>>,
    logout_fails: AtomicBool,
    logout_calls: AtomicUsize,
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<(Track, ChatRequest)>>,
    indices: Mutex<HashMap<String, u32>>,
    hold: AtomicBool,
    release: Notify,
    histories: Mutex<HashMap<String, Result<Vec<ConversationMessage>, u16>>>,
    history_calls: AtomicUsize,
    health: Mutex<VecDeque<Result<Value, u16>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in() -> Self {
        let backend = Self::default();
        backend.authenticated.store(true, Ordering::SeqCst);
        backend
    }

    pub fn set_session_error(&self, status: u16) {
        *self.session_error.lock() = Some(status);
    }

    pub fn fail_logout(&self) {
        self.logout_fails.store(true, Ordering::SeqCst);
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn push_reply(&self, reply: Reply) {
        self.replies.lock().push_back(reply);
    }

    /// Sends block until [`FakeBackend::release_send`] is called.
    pub fn hold_sends(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    pub fn release_send(&self) {
        self.release.notify_one();
    }

    pub fn send_calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<(Track, ChatRequest)> {
        self.requests.lock().clone()
    }

    pub fn set_history(&self, conversation_id: &str, history: Result<Vec<ConversationMessage>, u16>) {
        self.histories.lock().insert(conversation_id.to_string(), history);
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub fn push_health(&self, reply: Result<Value, u16>) {
        self.health.lock().push_back(reply);
    }

    fn auto_reply(&self, track: Track, request: &ChatRequest) -> ConversationResponse {
        let mut indices = self.indices.lock();
        let conversation_id = request
            .conversation_id
            .clone()
            .unwrap_or_else(|| format!("conv-{}", indices.len() + 1));
        let index = indices
            .entry(conversation_id.clone())
            .and_modify(|i| *i += 2)
            .or_insert(1);

        let video_id = match track {
            Track::General => GENERAL_VIDEO_ID.to_string(),
            Track::Video => request.video_id.clone().unwrap_or_else(|| "vid".to_string()),
        };
        let created_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
            + Duration::minutes(i64::from(*index));

        ConversationResponse {
            conversation_id,
            video_title: format!("Title of {}", video_id),
            video_id,
            user_message: request.query.clone(),
            assistant_message: format!("answer to {}", request.query),
            message_index: *index,
            created_at: created_at.to_rfc3339(),
        }
    }
}

pub fn history_message(index: u32, role: &str, content: &str) -> ConversationMessage {
    ConversationMessage {
        id: None,
        message_index: Some(index),
        role: role.to_string(),
        content: content.to_string(),
        tool_name: None,
        created_at: None,
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn session(&self) -> Result<SessionPayload, ApiError> {
        if let Some(status) = *self.session_error.lock() {
            return Err(ApiError::from_status(status, "session check failed".to_string()));
        }
        let authenticated = self.authenticated.load(Ordering::SeqCst);
        Ok(SessionPayload {
            authenticated,
            user: authenticated.then(|| json!({ "username": "ada" })),
        })
    }

    async fn login(&self, _username: &str, _password: &str) -> Result<LoginResponse, ApiError> {
        self.authenticated.store(true, Ordering::SeqCst);
        Ok(LoginResponse {
            ok: true,
            token_type: "bearer".to_string(),
            scopes: json!(["read", "write"]),
            exp: None,
        })
    }

    async fn signup(&self, username: &str, email: &str, _password: &str) -> Result<Value, ApiError> {
        Ok(json!({ "ok": true, "user": { "username": username, "email": email } }))
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.authenticated.store(false, Ordering::SeqCst);
        if self.logout_fails.load(Ordering::SeqCst) {
            return Err(ApiError::from_status(500, "logout failed".to_string()));
        }
        Ok(())
    }

    async fn send(&self, track: Track, request: &ChatRequest) -> Result<ConversationResponse, ApiError> {
        self.requests.lock().push((track, request.clone()));

        if self.hold.load(Ordering::SeqCst) {
            self.release.notified().await;
        }

        let scripted = self.replies.lock().pop_front();
        match scripted {
            Some(Reply::Status(status, message)) => Err(ApiError::from_status(status, message)),
            Some(Reply::Respond(response)) => Ok(response),
            None => Ok(self.auto_reply(track, request)),
        }
    }

    async fn history(&self, conversation_id: &str) -> Result<Vec<ConversationMessage>, ApiError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        match self.histories.lock().get(conversation_id) {
            Some(Ok(messages)) => Ok(messages.clone()),
            Some(Err(status)) => Err(ApiError::from_status(*status, "history failed".to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn health(&self) -> Result<Value, ApiError> {
        match self.health.lock().pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(status)) => Err(ApiError::from_status(status, "unhealthy".to_string())),
            None => Ok(json!({ "status": "ok" })),
        }
    }
}
