pub mod backend;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod ingest;
pub mod model;
pub mod orchestrator;
pub mod reconcile;
pub mod session;
pub mod storage;
pub mod ui;
pub mod video;

#[cfg(test)]
mod testing;

pub use backend::Backend;
pub use cache::ConversationCache;
pub use client::ApiClient;
pub use config::ClientConfig;
pub use error::{ApiError, ConfigError, StorageError};
pub use events::{EventSender, ViewEvent};
pub use orchestrator::{Orchestrator, OrchestratorConfig, SendOutcome};
pub use session::{SessionGate, SessionState, SessionStatus};
