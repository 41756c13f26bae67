pub use augustus_shared::routes::{post_sign_in_target, sign_in_route};
use augustus_shared::routes;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::error::ApiError;
use crate::events::{EventSender, ViewEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Unknown,
    Authenticated,
    Unauthenticated,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionState {
    pub status: SessionStatus,
    pub user: Option<Value>,
}

impl SessionState {
    fn unauthenticated() -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            user: None,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: SessionStatus::Unknown,
            user: None,
        }
    }
}

/// Source of truth for whether the acting user is signed in.
pub struct SessionGate {
    backend: Arc<dyn Backend>,
    events: EventSender,
    state: watch::Sender<SessionState>,
    sign_out_pending: AtomicBool,
}

impl SessionGate {
    pub fn new(backend: Arc<dyn Backend>, events: EventSender) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            backend,
            events,
            state,
            sign_out_pending: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Ask the gateway who we are. Any failure resolves to unauthenticated.
    pub async fn probe(&self) -> SessionState {
        let next = match self.backend.session().await {
            Ok(payload) if payload.authenticated => SessionState {
                status: SessionStatus::Authenticated,
                user: payload.user,
            },
            Ok(_) => SessionState::unauthenticated(),
            Err(e) => {
                warn!(error = %e, "session probe failed; treating as signed out");
                SessionState::unauthenticated()
            }
        };
        self.set(next.clone());
        next
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<SessionState, ApiError> {
        self.backend.login(username, password).await?;
        info!(username, "signed in");
        Ok(self.probe().await)
    }

    pub async fn signup(&self, username: &str, email: &str, password: &str) -> Result<Value, ApiError> {
        let body = self.backend.signup(username, email, password).await?;
        info!(username, "account created");
        Ok(body)
    }

    /// Best-effort logout, then local sign-out and navigation to sign-in.
    pub async fn sign_out(&self) {
        if let Err(e) = self.backend.logout().await {
            warn!(error = %e, "logout request failed; signing out locally");
        }
        self.set(SessionState::unauthenticated());
        self.events.navigate(routes::SIGN_IN_PAGE);
    }

    /// Record an authentication failure without navigating yet.
    pub fn mark_expired(&self) {
        self.set(SessionState::unauthenticated());
    }

    /// Sign out after `delay`. Returns false when one is already pending.
    pub fn schedule_sign_out(self: &Arc<Self>, delay: Duration) -> bool {
        if self.sign_out_pending.swap(true, Ordering::SeqCst) {
            debug!("sign-out already scheduled");
            return false;
        }

        let gate = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            gate.sign_out().await;
            gate.sign_out_pending.store(false, Ordering::SeqCst);
        });
        true
    }

    /// False (after navigating to sign-in) when the user is known to be signed out.
    pub fn ensure_authenticated(&self, path: &str) -> bool {
        if self.status() == SessionStatus::Unauthenticated {
            self.events.navigate(sign_in_route(Some(path)));
            return false;
        }
        true
    }

    fn set(&self, next: SessionState) {
        let changed = self.state.borrow().status != next.status;
        let status = next.status;
        self.state.send_replace(next);
        if changed {
            debug!(?status, "session status changed");
            self.events.send(ViewEvent::SessionChanged { status });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    fn gate(backend: Arc<FakeBackend>) -> (Arc<SessionGate>, EventSender) {
        let events = EventSender::default();
        (Arc::new(SessionGate::new(backend, events.clone())), events)
    }

    #[tokio::test]
    async fn probe_is_fail_closed() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_session_error(503);
        let (gate, _) = gate(backend);

        assert_eq!(gate.status(), SessionStatus::Unknown);
        assert_eq!(gate.probe().await.status, SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn login_reprobes_into_authenticated() {
        let backend = Arc::new(FakeBackend::new());
        let (gate, events) = gate(backend);
        let mut rx = events.subscribe();

        let state = gate.login("ada", "pw").await.unwrap();
        assert_eq!(state.status, SessionStatus::Authenticated);
        assert_eq!(
            rx.recv().await.unwrap(),
            ViewEvent::SessionChanged {
                status: SessionStatus::Authenticated
            }
        );
    }

    #[tokio::test]
    async fn sign_out_survives_logout_failure() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail_logout();
        let (gate, events) = gate(backend.clone());
        let mut rx = events.subscribe();
        gate.probe().await;

        gate.sign_out().await;
        assert_eq!(gate.status(), SessionStatus::Unauthenticated);
        assert_eq!(backend.logout_calls(), 1);

        let mut navigated = false;
        while let Ok(event) = rx.try_recv() {
            if event == (ViewEvent::Navigate { to: "/auth/sign-in".to_string() }) {
                navigated = true;
            }
        }
        assert!(navigated);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_sign_out_is_delayed_and_deduplicated() {
        let backend = Arc::new(FakeBackend::new());
        let (gate, _) = gate(backend.clone());

        assert!(gate.schedule_sign_out(Duration::from_millis(1500)));
        assert!(!gate.schedule_sign_out(Duration::from_millis(1500)));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(backend.logout_calls(), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(backend.logout_calls(), 1);
    }

    #[tokio::test]
    async fn unknown_status_does_not_block() {
        let backend = Arc::new(FakeBackend::new());
        let (gate, events) = gate(backend);
        let mut rx = events.subscribe();

        assert!(gate.ensure_authenticated("/app/query"));
        gate.mark_expired();
        assert!(!gate.ensure_authenticated("/app/query"));

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        assert_eq!(
            last,
            Some(ViewEvent::Navigate {
                to: "/auth/sign-in?next=%2Fapp%2Fquery".to_string()
            })
        );
    }
}
