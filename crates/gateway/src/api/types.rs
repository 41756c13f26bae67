use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::upstream::Upstream;
use crate::config::GatewayConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub upstream: Upstream,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Self {
        let config = Arc::new(config);
        Self {
            upstream: Upstream::new(Arc::clone(&config)),
            config,
        }
    }
}

// Backend `/token` reply
#[derive(Deserialize, Debug, Default)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scopes: Option<Value>,
    #[serde(default)]
    pub exp: Option<i64>,
}
