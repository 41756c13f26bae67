use augustus_shared::ErrorEnvelope;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::GatewayConfig;

/// Status and raw body of a backend reply.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::from_body(&self.body)
    }
}

/// The backend as seen from the gateway.
#[derive(Clone)]
pub struct Upstream {
    client: Client,
    config: Arc<GatewayConfig>,
}

impl Upstream {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn base(&self) -> &str {
        &self.config.api_base
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<UpstreamResponse, reqwest::Error> {
        let request = self.client.get(self.config.backend_url(path));
        self.execute(with_bearer(request, token), path).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &T,
    ) -> Result<UpstreamResponse, reqwest::Error> {
        let request = self.client.post(self.config.backend_url(path)).json(body);
        self.execute(with_bearer(request, token), path).await
    }

    pub async fn post_form<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<UpstreamResponse, reqwest::Error> {
        let request = self.client.post(self.config.backend_url(path)).form(body);
        self.execute(request, path).await
    }

    async fn execute(&self, request: RequestBuilder, path: &str) -> Result<UpstreamResponse, reqwest::Error> {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(base = %self.config.api_base, path, error = %e, "backend unreachable");
                return Err(e);
            }
        };
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        debug!(path, status = status.as_u16(), "backend replied");
        Ok(UpstreamResponse { status, body })
    }
}

fn with_bearer(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}
