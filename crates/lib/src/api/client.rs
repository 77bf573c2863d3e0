//! HTTP client for the Digital Twin backend (http://127.0.0.1:8000 by default).

use crate::api::types::{
    ChatReply, ChatRequest, Conversation, DeleteOutcome, LoginResponse, NewPersona, Persona,
    PersonaPage, PersonaQuery, PersonaUpdate, RegisterRequest, RegisteredUser,
};
use crate::api::Backend;
use crate::config::{self, Config};
use crate::session::SessionStore;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

/// Client for the backend HTTP API. Reads the bearer token from the shared session store on
/// every call.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    api_key: Option<String>,
    session: SessionStore,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// HTTP 401 on an authenticated call, or no session to authenticate with.
    #[error("not authorized; please log in again")]
    Unauthorized,
    /// Any other non-2xx. `reason` is the body's `detail` when present.
    #[error("{reason}")]
    RequestFailed { status: u16, reason: String },
    #[error("could not reach the server")]
    Network(#[source] reqwest::Error),
    #[error("unexpected response from server: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::RequestFailed { status: 404, .. })
    }
}

/// Which credential a request carries.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Credential {
    /// The interviewer's bearer token from the session store.
    Session,
    /// The configured account-endpoint key (login/register), if any.
    AccountKey,
}

/// Pull a human-readable reason out of an error body: FastAPI sends `{"detail": "..."}`, or a list
/// of validation errors with `msg` fields.
fn error_reason(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| match v.get("detail") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Array(items)) => items
                .first()
                .and_then(|i| i.get("msg"))
                .and_then(|m| m.as_str())
                .map(String::from),
            Some(other) if !other.is_null() => Some(other.to_string()),
            _ => None,
        });
    detail.unwrap_or_else(|| {
        status
            .canonical_reason()
            .map(|r| format!("{} {}", status.as_u16(), r))
            .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()))
    })
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))
}

fn delete_outcome(status: StatusCode, body: &str) -> DeleteOutcome {
    if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
        return DeleteOutcome {
            success: true,
            body: None,
        };
    }
    DeleteOutcome {
        success: true,
        body: serde_json::from_str(body).ok(),
    }
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: SessionStore) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            api_key: None,
            session,
            client: reqwest::Client::new(),
        }
    }

    /// Client for the configured base URL and account key.
    pub fn from_config(config: &Config, session: SessionStore) -> Self {
        Self::new(config::resolve_base_url(config), session)
            .with_api_key(config::resolve_api_key(config))
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send one request and return the status and body of a 2xx response.
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        credential: Credential,
    ) -> Result<(StatusCode, String), ApiError> {
        let request = match credential {
            Credential::Session => {
                let token = self.session.token().ok_or(ApiError::Unauthorized)?;
                request.bearer_auth(token)
            }
            Credential::AccountKey => match self.api_key {
                Some(ref key) => request.bearer_auth(key),
                None => request,
            },
        };
        let res = request.send().await.map_err(ApiError::Network)?;
        let status = res.status();
        let body = res.text().await.map_err(ApiError::Network)?;
        if status.is_success() {
            return Ok((status, body));
        }
        if status == StatusCode::UNAUTHORIZED && credential == Credential::Session {
            log::warn!("backend rejected the session token; signing out");
            if let Err(e) = self.session.clear() {
                log::warn!("failed to clear session: {}", e);
            }
            return Err(ApiError::Unauthorized);
        }
        let reason = error_reason(status, &body);
        log::debug!("request failed: {} {}", status.as_u16(), reason);
        Err(ApiError::RequestFailed {
            status: status.as_u16(),
            reason,
        })
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        log::info!("login requested for {}", username);
        let request = self
            .client
            .post(self.url("/auth/login"))
            .form(&[("username", username), ("password", password)]);
        let (_, body) = self.execute(request, Credential::AccountKey).await?;
        decode(&body)
    }

    async fn register(&self, request: &RegisterRequest) -> Result<RegisteredUser, ApiError> {
        log::info!("register requested for {}", request.username);
        let request = self.client.post(self.url("/auth/register")).json(request);
        let (_, body) = self.execute(request, Credential::AccountKey).await?;
        decode(&body)
    }

    async fn list_conversations(&self, interviewer_id: i64) -> Result<Vec<Conversation>, ApiError> {
        let url = self.url(&format!("/chat/conversations/by-interviewer/{}", interviewer_id));
        let (_, body) = self.execute(self.client.get(url), Credential::Session).await?;
        decode(&body)
    }

    async fn get_conversation(&self, session_id: &str) -> Result<Conversation, ApiError> {
        let url = self.url(&format!("/chat/conversations/by-session/{}", session_id));
        let (_, body) = self.execute(self.client.get(url), Credential::Session).await?;
        decode(&body)
    }

    async fn delete_conversation(&self, session_id: &str) -> Result<DeleteOutcome, ApiError> {
        log::info!("deleting conversation {}", session_id);
        let url = self.url(&format!("/chat/conversations/delete/{}", session_id));
        let (status, body) = self.execute(self.client.delete(url), Credential::Session).await?;
        Ok(delete_outcome(status, &body))
    }

    async fn respond(&self, request: &ChatRequest) -> Result<ChatReply, ApiError> {
        log::debug!(
            "respond: persona={} session={}",
            request.persona,
            request.session_id.as_deref().unwrap_or("<new>")
        );
        let request = self.client.post(self.url("/chat/respond")).json(request);
        let (_, body) = self.execute(request, Credential::Session).await?;
        decode(&body)
    }

    async fn list_personas(&self, query: &PersonaQuery) -> Result<PersonaPage, ApiError> {
        let request = self.client.get(self.url("/personas")).query(&query.to_pairs());
        let (_, body) = self.execute(request, Credential::Session).await?;
        decode(&body)
    }

    async fn get_persona(&self, id: i64) -> Result<Persona, ApiError> {
        let url = self.url(&format!("/personas/{}", id));
        let (_, body) = self.execute(self.client.get(url), Credential::Session).await?;
        decode(&body)
    }

    async fn create_persona(&self, persona: &NewPersona) -> Result<Persona, ApiError> {
        log::info!("creating persona {}", persona.name);
        let request = self.client.post(self.url("/personas")).json(persona);
        let (_, body) = self.execute(request, Credential::Session).await?;
        decode(&body)
    }

    async fn update_persona(&self, id: i64, update: &PersonaUpdate) -> Result<Persona, ApiError> {
        log::info!("updating persona {}", id);
        let request = self.client.put(self.url(&format!("/personas/{}", id))).json(update);
        let (_, body) = self.execute(request, Credential::Session).await?;
        decode(&body)
    }

    async fn delete_persona(&self, id: i64) -> Result<DeleteOutcome, ApiError> {
        log::info!("deleting persona {}", id);
        let url = self.url(&format!("/personas/{}", id));
        let (status, body) = self.execute(self.client.delete(url), Credential::Session).await?;
        Ok(delete_outcome(status, &body))
    }
}
