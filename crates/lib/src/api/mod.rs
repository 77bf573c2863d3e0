//! Backend API gateway: wire types, the `Backend` seam, and the reqwest client.
//!
//! Every call is fire-once: no retries and no timeouts.

mod backend;
mod client;
mod types;

pub use backend::Backend;
pub use client::{ApiClient, ApiError};
pub use types::{
    ChatReply, ChatRequest, Conversation, DeleteOutcome, LoginResponse, Message, NewPersona,
    Persona, PersonaPage, PersonaQuery, PersonaUpdate, RegisterRequest, RegisteredUser, Role,
};
