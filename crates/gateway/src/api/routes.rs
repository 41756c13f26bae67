use augustus_shared::routes;
use axum::{
    Router, middleware,
    routing::{get, post},
};

use super::handlers;
use super::middleware::guard_app_routes;
use super::types::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(routes::HEALTH, get(handlers::health))
        .route(routes::SESSION, get(handlers::session))
        .route(routes::LOGIN, post(handlers::login))
        .route(routes::SIGNUP, post(handlers::signup))
        .route(routes::LOGOUT, post(handlers::logout))
        .route(routes::ME, get(handlers::me))
        .route(routes::VIDEO_CHAT, post(handlers::video_chat))
        .route(routes::GENERAL_CHAT, post(handlers::general_chat))
        .route(
            "/api/chat/conversations/{conversation_id}/messages",
            get(handlers::conversation_messages),
        )
        .fallback(handlers::not_found)
        .layer(middleware::from_fn(guard_app_routes))
        .with_state(state)
}
