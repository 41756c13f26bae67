use augustus_shared::{
    GENERAL_VIDEO_ID, LoginRequest, LoginResponse, MAX_QUERY_LENGTH, SessionPayload, SignupRequest,
    TOKEN_COOKIE, Track,
};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use super::types::{AppState, TokenResponse};
use crate::error::GatewayError;

type ApiResult<T> = Result<T, GatewayError>;

fn session_token(jar: &CookieJar) -> Option<String> {
    jar.get(TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

fn require_token(jar: &CookieJar) -> ApiResult<String> {
    session_token(jar).ok_or(GatewayError::MissingToken)
}

fn token_cookie(state: &AppState, value: String) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, value))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.secure_cookies)
        .path("/")
        .build()
}

pub async fn health(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let unreachable = || GatewayError::BadGateway("Health check failed. Backend unreachable.".to_string());

    let response = state.upstream.get("/health", None).await.map_err(|_| unreachable())?;
    if !response.is_success() {
        let message = response
            .envelope()
            .detail_text()
            .unwrap_or_else(|| "Health check failed.".to_string());
        return Err(GatewayError::upstream(response.status, message));
    }
    response.json::<Value>().map(Json).ok_or_else(unreachable)
}

/// Fail-closed: only a successful backend `/me` counts as signed in.
pub async fn session(State(state): State<AppState>, jar: CookieJar) -> Json<SessionPayload> {
    let Some(token) = session_token(&jar) else {
        return Json(SessionPayload::default());
    };

    match state.upstream.get("/me", Some(&token)).await {
        Ok(response) if response.is_success() => match response.json::<Value>() {
            Some(user) => Json(SessionPayload {
                authenticated: true,
                user: Some(user),
            }),
            None => {
                warn!("backend /me returned a non-JSON body; treating session as signed out");
                Json(SessionPayload::default())
            }
        },
        Ok(response) => {
            debug!(status = response.status.as_u16(), "session token rejected by backend");
            Json(SessionPayload::default())
        }
        Err(_) => Json(SessionPayload::default()),
    }
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<(CookieJar, Json<LoginResponse>)> {
    let credentials = body.map(|Json(body)| body).unwrap_or_default();
    if credentials.username.is_empty() || credentials.password.is_empty() {
        return Err(GatewayError::BadRequest("Username and password are required.".to_string()));
    }

    let failed = || GatewayError::Internal("Login failed. Please try again.".to_string());
    let form = [
        ("username", credentials.username.as_str()),
        ("password", credentials.password.as_str()),
    ];
    let response = state.upstream.post_form("/token", &form).await.map_err(|_| failed())?;

    if !response.is_success() {
        let message = response
            .envelope()
            .detail_text()
            .unwrap_or_else(|| "Invalid credentials.".to_string());
        return Err(GatewayError::upstream(response.status, message));
    }

    let token: TokenResponse = match response.json::<Value>() {
        Some(Value::Object(map)) => serde_json::from_value(Value::Object(map)).unwrap_or_default(),
        Some(_) => {
            return Err(GatewayError::BadGateway("Invalid response format from backend.".to_string()));
        }
        None => return Err(failed()),
    };
    let Some(access_token) = token.access_token.filter(|t| !t.is_empty()) else {
        return Err(GatewayError::BadGateway("Token not returned by backend.".to_string()));
    };

    let mut cookie = token_cookie(&state, access_token);
    if let Some(expires) = token
        .exp
        .filter(|exp| *exp > 0)
        .and_then(|exp| OffsetDateTime::from_unix_timestamp(exp).ok())
    {
        cookie.set_expires(expires);
    }

    info!(username = %credentials.username, "signed in");
    let body = LoginResponse {
        ok: true,
        token_type: token.token_type.unwrap_or_else(|| "bearer".to_string()),
        scopes: token.scopes.unwrap_or_else(|| json!([])),
        exp: token.exp,
    };
    Ok((jar.add(cookie), Json(body)))
}

/// Creates the account only; the caller signs in separately.
pub async fn signup(
    State(state): State<AppState>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = body.map(|Json(body)| body).unwrap_or_default();
    if request.username.is_empty() || request.email.is_empty() || request.password.is_empty() {
        return Err(GatewayError::BadRequest(
            "Username, email, and password are required.".to_string(),
        ));
    }

    let failed = || GatewayError::Internal("Sign-up failed. Please try again.".to_string());
    let response = state
        .upstream
        .post_json("/signup", None, &request)
        .await
        .map_err(|_| failed())?;

    if !response.is_success() {
        let message = response
            .envelope()
            .detail_text()
            .unwrap_or_else(|| "Sign-up failed.".to_string());
        return Err(GatewayError::upstream(response.status, message));
    }

    let user = response.json::<Value>().ok_or_else(failed)?;
    Ok(Json(json!({ "ok": true, "user": user })))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<Value>) {
    let mut cookie = token_cookie(&state, String::new());
    cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
    (jar.add(cookie), Json(json!({ "ok": true })))
}

pub async fn me(State(state): State<AppState>, jar: CookieJar) -> ApiResult<Json<Value>> {
    let token = require_token(&jar)?;

    let response = state.upstream.get("/me", Some(&token)).await.map_err(|_| {
        GatewayError::Internal("Failed to fetch user info. Please try again.".to_string())
    })?;
    let Some(data) = response.json::<Value>() else {
        error!(status = response.status.as_u16(), "backend /me returned a non-JSON body");
        return Err(GatewayError::BadGateway("Invalid response from backend.".to_string()));
    };

    if !response.is_success() {
        let message = response
            .envelope()
            .detail_text()
            .unwrap_or_else(|| "Failed to fetch user info.".to_string());
        return Err(GatewayError::upstream(response.status, message));
    }
    Ok(Json(data))
}

pub async fn video_chat(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    forward_chat(&state, &jar, Track::Video, body).await
}

pub async fn general_chat(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    forward_chat(&state, &jar, Track::General, body).await
}

async fn forward_chat(
    state: &AppState,
    jar: &CookieJar,
    track: Track,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Ok(Json(body)) = body else {
        return Err(GatewayError::BadRequest("Invalid request body. Expected JSON.".to_string()));
    };
    let forwarded = chat_body(track, &body)?;
    let token = require_token(jar)?;

    let path = format!("/api/v2/chat/{}", track);
    let response = state
        .upstream
        .post_json(&path, Some(&token), &forwarded)
        .await
        .map_err(|_| {
            GatewayError::BadGateway(format!(
                "Cannot connect to backend server at {}. Please ensure the backend is running.",
                state.upstream.base()
            ))
        })?;

    if !response.is_success() {
        let envelope = response.envelope();
        let detail = envelope.detail_or_status(response.status.as_u16());
        error!(%track, status = response.status.as_u16(), detail = %detail, "backend rejected chat request");
        return Err(GatewayError::upstream(response.status, chat_error_message(response.status, detail)));
    }

    let data = response.json::<Value>().unwrap_or(Value::Null);
    if !has_identity_fields(&data) {
        error!(%track, body = %String::from_utf8_lossy(&response.body), "chat response is missing identity fields");
        return Err(GatewayError::BadGateway("Invalid response format from backend.".to_string()));
    }

    if track == Track::General {
        let video_id = data.get("video_id").and_then(Value::as_str).unwrap_or_default();
        if video_id != GENERAL_VIDEO_ID {
            warn!(video_id, "general chat answered with a non-general video id");
        }
    }
    Ok(Json(data))
}

/// Validate the query and keep only the fields defined for `track`.
fn chat_body(track: Track, body: &Value) -> ApiResult<Value> {
    let query = match body.get("query").and_then(Value::as_str) {
        Some(query) if !query.is_empty() => query,
        _ => {
            return Err(GatewayError::BadRequest("Field `query` (string) is required.".to_string()));
        }
    };
    let length = query.chars().count();
    if length > MAX_QUERY_LENGTH {
        return Err(GatewayError::BadRequest(format!(
            "Query too long ({}/{max} characters). Maximum length is {max} characters.",
            length,
            max = MAX_QUERY_LENGTH
        )));
    }

    let fields: &[&str] = match track {
        Track::Video => &["conversation_id", "video_id", "video_url"],
        Track::General => &["conversation_id"],
    };
    let mut forwarded = Map::new();
    forwarded.insert("query".to_string(), Value::String(query.to_string()));
    for field in fields {
        if let Some(value) = body.get(*field).filter(|v| is_defined(v)) {
            forwarded.insert(field.to_string(), value.clone());
        }
    }
    Ok(Value::Object(forwarded))
}

fn is_defined(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn chat_error_message(status: StatusCode, detail: String) -> String {
    match status.as_u16() {
        401 => "Unauthorized: invalid or expired token.".to_string(),
        403 => "Forbidden: missing 'write' scope.".to_string(),
        503 => "Service temporarily unavailable.".to_string(),
        504 => "Request timed out. The query may be too complex. Please try again.".to_string(),
        _ => detail,
    }
}

fn has_identity_fields(data: &Value) -> bool {
    ["conversation_id", "video_id", "video_title"].iter().all(|field| {
        data.get(*field)
            .and_then(Value::as_str)
            .is_some_and(|value| !value.is_empty())
    })
}

pub async fn conversation_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    jar: CookieJar,
) -> ApiResult<Json<Value>> {
    let token = require_token(&jar)?;

    let path = format!("/chat/conversations/{}/messages", urlencoding::encode(&conversation_id));
    let response = state.upstream.get(&path, Some(&token)).await.map_err(|_| {
        GatewayError::BadGateway(format!(
            "Cannot connect to backend server. Please ensure the backend is running at {}",
            state.upstream.base()
        ))
    })?;

    if !response.is_success() {
        let message = response.envelope().detail_or_status(response.status.as_u16());
        match response.status.as_u16() {
            404 => warn!(%conversation_id, "backend has no messages endpoint for this conversation"),
            401 | 403 => error!(%conversation_id, status = response.status.as_u16(), detail = %message, "history request refused"),
            _ => {}
        }
        return Err(GatewayError::upstream(response.status, message));
    }

    let messages = response
        .json::<Value>()
        .ok_or_else(|| GatewayError::BadGateway("Invalid response from backend.".to_string()))?;
    debug!(%conversation_id, count = messages.as_array().map(Vec::len).unwrap_or(0), "history fetched");
    Ok(Json(messages))
}

pub async fn not_found() -> GatewayError {
    GatewayError::upstream(StatusCode::NOT_FOUND, "Not found.")
}
