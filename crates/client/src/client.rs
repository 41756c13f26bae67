use async_trait::async_trait;
use augustus_shared::{
    ChatRequest, ConversationMessage, ConversationResponse, ErrorEnvelope, LoginRequest,
    LoginResponse, MAX_QUERY_LENGTH, SessionPayload, SignupRequest, Track, routes,
};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::backend::Backend;
use crate::error::ApiError;

/// HTTP client for the gateway. The session cookie lives in reqwest's jar.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let message = ErrorEnvelope::from_body(&bytes).message_or_status(status.as_u16());
            return Err(ApiError::from_status(status.as_u16(), message));
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            error!(
                status = status.as_u16(),
                body = %String::from_utf8_lossy(&bytes),
                "unexpected response body: {}", e
            );
            ApiError::Malformed(e.to_string())
        })
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn session(&self) -> Result<SessionPayload, ApiError> {
        let response = self.client.get(self.url(routes::SESSION)).send().await?;
        Self::decode(response).await
    }

    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = self
            .client
            .post(self.url(routes::LOGIN))
            .json(&body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn signup(&self, username: &str, email: &str, password: &str) -> Result<Value, ApiError> {
        let body = SignupRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self
            .client
            .post(self.url(routes::SIGNUP))
            .json(&body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        let response = self.client.post(self.url(routes::LOGOUT)).send().await?;
        let _: Value = Self::decode(response).await?;
        Ok(())
    }

    async fn send(&self, track: Track, request: &ChatRequest) -> Result<ConversationResponse, ApiError> {
        if request.query.chars().count() > MAX_QUERY_LENGTH {
            return Err(ApiError::QueryTooLong);
        }

        debug!(%track, conversation_id = ?request.conversation_id, "sending chat query");
        let response = self
            .client
            .post(self.url(track.chat_path()))
            .json(request)
            .send()
            .await?;

        let body: ConversationResponse = Self::decode(response).await?;
        if !body.is_well_formed() {
            error!(?body, "chat response is missing required fields");
            return Err(ApiError::Malformed("response missing required fields".to_string()));
        }
        Ok(body)
    }

    async fn history(&self, conversation_id: &str) -> Result<Vec<ConversationMessage>, ApiError> {
        let response = self
            .client
            .get(self.url(&routes::conversation_messages(conversation_id)))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                warn!(conversation_id, "history endpoint returned 404; showing an empty conversation");
                Ok(Vec::new())
            }
            StatusCode::FORBIDDEN => {
                warn!(conversation_id, "history fetch forbidden; showing an empty conversation");
                Ok(Vec::new())
            }
            _ => Self::decode(response).await,
        }
    }

    async fn health(&self) -> Result<Value, ApiError> {
        let response = self.client.get(self.url(routes::HEALTH)).send().await?;
        Self::decode(response).await
    }
}
