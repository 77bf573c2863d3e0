//! Wire types for the backend API.

use serde::{Deserialize, Deserializer, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Parse a wire role. LangChain's "human"/"ai" names are accepted as user/assistant.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Some(Role::System),
            "user" | "human" => Some(Role::User),
            "assistant" | "ai" => Some(Role::Assistant),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Role::from_wire(&s).ok_or_else(|| {
            serde::de::Error::unknown_variant(&s, &["system", "user", "assistant"])
        })
    }
}

/// One chat message (role + text).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, alias = "text")]
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Messages column is stored as JSON on the backend and may be an object or contain
/// tool/function entries; keep only entries that decode as a chat message.
fn lenient_messages<'de, D>(deserializer: D) -> Result<Vec<Message>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// A conversation row as returned by the by-interviewer and by-session endpoints.
///
/// The backend also sends a numeric `id` and `interviewer_id`; they are not decoded because the
/// session id is the only key the API accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub session_id: String,
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_messages")]
    pub messages: Vec<Message>,
}

/// Body of POST /chat/respond.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub persona: String,
    /// `None` asks the backend to open a new conversation.
    pub session_id: Option<String>,
    pub messages: Vec<Message>,
}

/// Response of POST /chat/respond: the saved conversation, or a bare `{reply}` on older backends.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default, deserialize_with = "lenient_messages")]
    pub messages: Vec<Message>,
}

impl ChatReply {
    /// The assistant's answer: `reply` when present, else the last assistant message.
    pub fn assistant_text(&self) -> Option<&str> {
        self.reply
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .or_else(|| {
                self.messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::Assistant)
                    .map(|m| m.content.as_str())
            })
    }
}

/// A persona as listed by GET /personas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub education: String,
    #[serde(default)]
    pub tech_skills: String,
    #[serde(default)]
    pub soft_skills: String,
    /// Wire name keeps the backend column's spelling.
    #[serde(default)]
    pub strenghts: String,
    #[serde(default)]
    pub weaknesses: String,
    #[serde(default)]
    pub goals: String,
    #[serde(default)]
    pub hobbies: String,
    #[serde(default)]
    pub personality: String,
}

impl Persona {
    /// Conversations reference their persona by name (or by id on some backends).
    pub fn matches(&self, label: &str) -> bool {
        self.name == label || self.id.to_string() == label
    }
}

/// Body of POST /personas.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPersona {
    pub name: String,
    pub age: u32,
    pub location: String,
    pub description: String,
    pub education: String,
    pub tech_skills: String,
    pub soft_skills: String,
    pub strenghts: String,
    pub weaknesses: String,
    pub goals: String,
    pub hobbies: String,
    pub personality: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Body of PUT /personas/{id}. Only the fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersonaUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub education: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tech_skills: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soft_skills: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strenghts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weaknesses: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goals: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hobbies: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personality: Option<String>,
}

impl PersonaUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Paging and search for GET /personas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaQuery {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
}

impl Default for PersonaQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 50,
            search: None,
        }
    }
}

impl PersonaQuery {
    pub(crate) fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("page", self.page.to_string()), ("limit", self.limit.to_string())];
        if let Some(search) = self.search.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        pairs
    }
}

/// Response of GET /personas.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PersonaPage {
    pub items: Vec<Persona>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub has_next: bool,
    #[serde(default)]
    pub has_prev: bool,
}

/// Response of POST /auth/login.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Interviewer id; conversations are listed by it.
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Body of POST /auth/register.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
}

/// Response of POST /auth/register.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RegisteredUser {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Result of a DELETE call. A 204 with no body is `success: true, body: None`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOutcome {
    pub success: bool,
    pub body: Option<serde_json::Value>,
}
