pub mod routes;
pub mod schemas;
pub mod time;

pub use schemas::{
    ChatRequest, ConversationMessage, ConversationResponse, ErrorEnvelope, LoginRequest,
    LoginResponse, SessionPayload, SignupRequest, Track,
};

/// Name of the httpOnly cookie carrying the backend access token.
pub const TOKEN_COOKIE: &str = "augustus_token";

/// `video_id` the backend reports for cross-corpus conversations.
pub const GENERAL_VIDEO_ID: &str = "GENERAL";

pub const MAX_QUERY_LENGTH: usize = 2000;
