//! The backend seam: one async method per API operation.

use crate::api::{
    ApiError, ChatReply, ChatRequest, Conversation, DeleteOutcome, LoginResponse, NewPersona,
    Persona, PersonaPage, PersonaQuery, PersonaUpdate, RegisterRequest, RegisteredUser,
};
use async_trait::async_trait;

/// Operations the chat client needs from the backend. Implemented by [`crate::api::ApiClient`]
/// over HTTP; the controller only sees this trait.
#[async_trait]
pub trait Backend: Send + Sync {
    /// POST /auth/login. A 401 here means bad credentials, reported as `RequestFailed`.
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError>;

    /// POST /auth/register.
    async fn register(&self, request: &RegisterRequest) -> Result<RegisteredUser, ApiError>;

    /// GET /chat/conversations/by-interviewer/{id}.
    async fn list_conversations(&self, interviewer_id: i64) -> Result<Vec<Conversation>, ApiError>;

    /// GET /chat/conversations/by-session/{session_id}.
    async fn get_conversation(&self, session_id: &str) -> Result<Conversation, ApiError>;

    /// DELETE /chat/conversations/delete/{session_id}.
    async fn delete_conversation(&self, session_id: &str) -> Result<DeleteOutcome, ApiError>;

    /// POST /chat/respond.
    async fn respond(&self, request: &ChatRequest) -> Result<ChatReply, ApiError>;

    /// GET /personas.
    async fn list_personas(&self, query: &PersonaQuery) -> Result<PersonaPage, ApiError>;

    /// GET /personas/{id}.
    async fn get_persona(&self, id: i64) -> Result<Persona, ApiError>;

    /// POST /personas.
    async fn create_persona(&self, persona: &NewPersona) -> Result<Persona, ApiError>;

    /// PUT /personas/{id}. Fields left unset keep their stored value.
    async fn update_persona(&self, id: i64, update: &PersonaUpdate) -> Result<Persona, ApiError>;

    /// DELETE /personas/{id}.
    async fn delete_persona(&self, id: i64) -> Result<DeleteOutcome, ApiError>;
}
