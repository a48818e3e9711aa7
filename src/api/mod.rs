//! Backend API: shared HTTP plumbing for profile submission and forecasts.
//!
//! `ApiClient` owns the `reqwest::Client`, the base URL and the bearer token
//! handed over by the surrounding session layer. A 401 on any non-auth
//! endpoint is reported to the `SessionListener` and surfaced to the caller;
//! it is never handled here.

pub mod prediction;
pub mod submission;

use std::sync::Arc;

use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};

use crate::config::ClientConfig;
use crate::error::{ApiError, ConfigError};

pub use prediction::{
    CyclePhase, ForecastBoard, ForecastState, MoodForecast, PredictionClient, PredictionResult,
};
pub use submission::{SubmissionClient, SubmissionOutcome};

/// Paths whose 401s belong to the login flow itself.
const AUTH_ROUTES: &[&str] = &["/auth/login", "/auth/register"];

/// Receives session-expiry signals. Implemented by whatever owns the token.
pub trait SessionListener: Send + Sync {
    fn session_expired(&self, endpoint: &str);
}

/// HTTP client bound to one backend.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
    session: Option<Arc<dyn SessionListener>>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
            session: None,
        })
    }

    /// Attach the collaborator notified on 401s.
    pub fn with_session_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.session = Some(listener);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.get(self.url(path)))
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.post(self.url(path)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    /// Send `request`. Transport problems and 401s become errors; every other
    /// status is returned for the caller to interpret.
    pub(crate) async fn send(
        &self,
        request: RequestBuilder,
        endpoint: &str,
    ) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout {
                    endpoint: endpoint.to_string(),
                }
            } else {
                ApiError::Transport {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        if response.status() == StatusCode::UNAUTHORIZED && !is_auth_route(endpoint) {
            tracing::warn!(endpoint, "Backend rejected credentials");
            if let Some(listener) = &self.session {
                listener.session_expired(endpoint);
            }
            return Err(ApiError::Unauthorized {
                endpoint: endpoint.to_string(),
            });
        }

        Ok(response)
    }
}

fn is_auth_route(endpoint: &str) -> bool {
    AUTH_ROUTES.iter().any(|route| endpoint.contains(route))
}
