//! In-memory backend for controller and flow tests.

use crate::api::{
    ApiError, Backend, ChatReply, ChatRequest, Conversation, DeleteOutcome, LoginResponse, Message,
    NewPersona, Persona, PersonaPage, PersonaQuery, PersonaUpdate, RegisterRequest, RegisteredUser,
};
use crate::session::{Session, SessionStore};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

pub const USER_ID: i64 = 1;

struct User {
    id: i64,
    username: String,
    password: String,
}

struct Row {
    interviewer_id: i64,
    conversation: Conversation,
}

#[derive(Default)]
struct State {
    users: Vec<User>,
    personas: Vec<Persona>,
    rows: Vec<Row>,
    requests: Vec<String>,
    next_session: u32,
    reply: String,
    unauthorized: bool,
    fail_respond: bool,
    fail_delete_persona: bool,
    fail_delete_sessions: HashSet<String>,
    fail_list: bool,
    fail_list_after_delete: bool,
    deleted_any: bool,
    /// Seed messages (no session id) land in this existing conversation instead of a new one.
    new_chats_in: Option<String>,
}

/// Backend double that keeps users, personas, and conversations in memory and records every call.
pub struct FakeBackend {
    state: Mutex<State>,
    reply_gate: Mutex<Option<Arc<Notify>>>,
}

pub fn persona(id: i64, name: &str) -> Persona {
    Persona {
        id,
        name: name.to_string(),
        avatar: None,
        age: Some(30),
        location: String::new(),
        description: String::new(),
        education: String::new(),
        tech_skills: String::new(),
        soft_skills: String::new(),
        strenghts: String::new(),
        weaknesses: String::new(),
        goals: String::new(),
        hobbies: String::new(),
        personality: String::new(),
    }
}

/// Store already signed in as the fake's default user.
pub fn signed_in() -> SessionStore {
    let store = SessionStore::in_memory();
    store
        .set(Session {
            token: "token-ana".to_string(),
            user_id: USER_ID,
            username: "ana".to_string(),
        })
        .expect("in-memory session");
    store
}

fn not_found(detail: &str) -> ApiError {
    ApiError::RequestFailed {
        status: 404,
        reason: detail.to_string(),
    }
}

fn apply_update(persona: &mut Persona, update: &PersonaUpdate) {
    fn set(slot: &mut String, value: &Option<String>) {
        if let Some(v) = value {
            *slot = v.clone();
        }
    }
    set(&mut persona.name, &update.name);
    if update.age.is_some() {
        persona.age = update.age;
    }
    set(&mut persona.location, &update.location);
    set(&mut persona.description, &update.description);
    set(&mut persona.education, &update.education);
    set(&mut persona.tech_skills, &update.tech_skills);
    set(&mut persona.soft_skills, &update.soft_skills);
    set(&mut persona.strenghts, &update.strenghts);
    set(&mut persona.weaknesses, &update.weaknesses);
    set(&mut persona.goals, &update.goals);
    set(&mut persona.hobbies, &update.hobbies);
    set(&mut persona.personality, &update.personality);
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        let state = State {
            users: vec![User {
                id: USER_ID,
                username: "ana".to_string(),
                password: "Secret123".to_string(),
            }],
            reply: "Olá!".to_string(),
            ..State::default()
        };
        Self {
            state: Mutex::new(state),
            reply_gate: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Record a call; fails with `Unauthorized` once the token has been revoked.
    fn record(&self, call: String, authenticated: bool) -> Result<MutexGuard<'_, State>, ApiError> {
        let mut state = self.lock();
        state.requests.push(call);
        if authenticated && state.unauthorized {
            return Err(ApiError::Unauthorized);
        }
        Ok(state)
    }

    pub fn with_persona(self, id: i64, name: &str) -> Self {
        self.lock().personas.push(persona(id, name));
        self
    }

    pub fn with_conversation(
        self,
        session_id: &str,
        persona: &str,
        created_at: Option<&str>,
        messages: Vec<Message>,
    ) -> Self {
        self.lock().rows.push(Row {
            interviewer_id: USER_ID,
            conversation: Conversation {
                session_id: session_id.to_string(),
                persona: persona.to_string(),
                created_at: created_at.map(String::from),
                messages,
            },
        });
        self
    }

    /// Add a conversation after construction, as another client would.
    pub fn add_conversation(&self, session_id: &str, persona: &str, messages: Vec<Message>) {
        self.lock().rows.push(Row {
            interviewer_id: USER_ID,
            conversation: Conversation {
                session_id: session_id.to_string(),
                persona: persona.to_string(),
                created_at: None,
                messages,
            },
        });
    }

    pub fn with_reply(self, reply: &str) -> Self {
        self.lock().reply = reply.to_string();
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Every later authenticated call answers 401.
    pub fn revoke_token(&self) {
        self.lock().unauthorized = true;
    }

    pub fn fail_respond(&self, fail: bool) {
        self.lock().fail_respond = fail;
    }

    /// Conversation listing answers 500.
    pub fn fail_list_conversations(&self, fail: bool) {
        self.lock().fail_list = fail;
    }

    /// Conversation listing answers 500 once any conversation has been deleted.
    pub fn fail_list_after_delete(&self, fail: bool) {
        self.lock().fail_list_after_delete = fail;
    }

    pub fn answer_new_chats_in(&self, session_id: &str) {
        self.lock().new_chats_in = Some(session_id.to_string());
    }

    /// Every later `respond` waits for one `notify_one` on the returned handle.
    pub fn hold_replies(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.reply_gate.lock().unwrap_or_else(|p| p.into_inner()) = Some(gate.clone());
        gate
    }

    pub fn fail_delete_persona(&self, fail: bool) {
        self.lock().fail_delete_persona = fail;
    }

    pub fn fail_delete_conversation(&self, session_id: &str) {
        self.lock().fail_delete_sessions.insert(session_id.to_string());
    }

    pub fn calls(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.lock()
            .rows
            .iter()
            .map(|r| r.conversation.session_id.clone())
            .collect()
    }

    pub fn persona_names(&self) -> Vec<String> {
        self.lock().personas.iter().map(|p| p.name.clone()).collect()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let state = self.record(format!("login {}", username), false)?;
        let user = state
            .users
            .iter()
            .find(|u| u.username == username && u.password == password)
            .ok_or_else(|| ApiError::RequestFailed {
                status: 401,
                reason: "Incorrect username or password".to_string(),
            })?;
        Ok(LoginResponse {
            access_token: format!("token-{}", user.username),
            token_type: Some("bearer".to_string()),
            username: Some(user.username.clone()),
            id: Some(user.id),
            expires_in: Some(1800),
        })
    }

    async fn register(&self, request: &RegisterRequest) -> Result<RegisteredUser, ApiError> {
        let mut state = self.record(format!("register {}", request.username), false)?;
        if state.users.iter().any(|u| u.username == request.username) {
            return Err(ApiError::RequestFailed {
                status: 400,
                reason: "Username already registered".to_string(),
            });
        }
        let id = state.users.len() as i64 + 1;
        state.users.push(User {
            id,
            username: request.username.clone(),
            password: request.password.clone(),
        });
        Ok(RegisteredUser {
            id: Some(id),
            username: request.username.clone(),
            email: request.email.clone(),
            full_name: request.full_name.clone(),
            created_at: None,
        })
    }

    async fn list_conversations(&self, interviewer_id: i64) -> Result<Vec<Conversation>, ApiError> {
        let state = self.record(format!("list_conversations {}", interviewer_id), true)?;
        if state.fail_list || (state.fail_list_after_delete && state.deleted_any) {
            return Err(ApiError::RequestFailed {
                status: 500,
                reason: "Internal Server Error".to_string(),
            });
        }
        let rows: Vec<Conversation> = state
            .rows
            .iter()
            .filter(|r| r.interviewer_id == interviewer_id)
            .map(|r| r.conversation.clone())
            .collect();
        if rows.is_empty() {
            return Err(not_found("No conversations for this interviewer"));
        }
        Ok(rows)
    }

    async fn get_conversation(&self, session_id: &str) -> Result<Conversation, ApiError> {
        let state = self.record(format!("get_conversation {}", session_id), true)?;
        state
            .rows
            .iter()
            .find(|r| r.conversation.session_id == session_id)
            .map(|r| r.conversation.clone())
            .ok_or_else(|| not_found("Conversation not found"))
    }

    async fn delete_conversation(&self, session_id: &str) -> Result<DeleteOutcome, ApiError> {
        let mut state = self.record(format!("delete_conversation {}", session_id), true)?;
        if state.fail_delete_sessions.contains(session_id) {
            return Err(ApiError::RequestFailed {
                status: 500,
                reason: "Internal Server Error".to_string(),
            });
        }
        let before = state.rows.len();
        state.rows.retain(|r| r.conversation.session_id != session_id);
        if state.rows.len() == before {
            return Err(not_found("Conversation not found"));
        }
        state.deleted_any = true;
        Ok(DeleteOutcome {
            success: true,
            body: None,
        })
    }

    async fn respond(&self, request: &ChatRequest) -> Result<ChatReply, ApiError> {
        let gate = self.reply_gate.lock().unwrap_or_else(|p| p.into_inner()).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let mut state = self.record(
            format!(
                "respond {} {}",
                request.persona,
                request.session_id.as_deref().unwrap_or("<new>")
            ),
            true,
        )?;
        if state.fail_respond {
            return Err(ApiError::RequestFailed {
                status: 500,
                reason: "LLM unavailable".to_string(),
            });
        }
        let Some(user_msg) = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::api::Role::User)
            .cloned()
        else {
            return Err(ApiError::RequestFailed {
                status: 400,
                reason: "Missing user message".to_string(),
            });
        };
        state.next_session += 1;
        let n = state.next_session;
        let session_id = request
            .session_id
            .clone()
            .or_else(|| state.new_chats_in.clone())
            .unwrap_or_else(|| format!("session-{}", n));
        let created_at = format!("2030-01-01T00:{:02}:00", n % 60);
        let reply = Message::assistant(state.reply.clone());

        let existing = state
            .rows
            .iter_mut()
            .find(|r| r.conversation.session_id == session_id);
        let conversation = match existing {
            Some(row) => {
                row.conversation.messages.push(user_msg);
                row.conversation.messages.push(reply);
                row.conversation.created_at = Some(created_at);
                row.conversation.clone()
            }
            None => {
                let conversation = Conversation {
                    session_id: session_id.clone(),
                    persona: request.persona.clone(),
                    created_at: Some(created_at),
                    messages: vec![
                        Message::system(format!("You are {}.", request.persona)),
                        user_msg,
                        reply,
                    ],
                };
                state.rows.push(Row {
                    interviewer_id: USER_ID,
                    conversation: conversation.clone(),
                });
                conversation
            }
        };
        Ok(ChatReply {
            reply: None,
            session_id: Some(conversation.session_id),
            persona: Some(conversation.persona),
            messages: conversation.messages,
        })
    }

    async fn list_personas(&self, query: &PersonaQuery) -> Result<PersonaPage, ApiError> {
        let state = self.record(format!("list_personas page={}", query.page), true)?;
        let limit = query.limit.max(1) as usize;
        let skip = (query.page.max(1) as usize - 1) * limit;
        let items: Vec<Persona> = state.personas.iter().skip(skip).take(limit).cloned().collect();
        let total = state.personas.len();
        Ok(PersonaPage {
            items,
            total: total as u64,
            page: query.page,
            limit: query.limit,
            has_next: skip + limit < total,
            has_prev: query.page > 1,
        })
    }

    async fn get_persona(&self, id: i64) -> Result<Persona, ApiError> {
        let state = self.record(format!("get_persona {}", id), true)?;
        state
            .personas
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| not_found("Persona not found"))
    }

    async fn create_persona(&self, new: &NewPersona) -> Result<Persona, ApiError> {
        let mut state = self.record(format!("create_persona {}", new.name), true)?;
        if state.personas.iter().any(|p| p.name == new.name) {
            return Err(ApiError::RequestFailed {
                status: 400,
                reason: "Persona already exists".to_string(),
            });
        }
        let id = state.personas.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        let mut created = persona(id, &new.name);
        created.age = Some(new.age);
        created.avatar = new.avatar.clone();
        created.description = new.description.clone();
        state.personas.push(created.clone());
        Ok(created)
    }

    async fn update_persona(&self, id: i64, update: &PersonaUpdate) -> Result<Persona, ApiError> {
        let mut state = self.record(format!("update_persona {}", id), true)?;
        let persona = state
            .personas
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| not_found("Persona not found"))?;
        apply_update(persona, update);
        Ok(persona.clone())
    }

    async fn delete_persona(&self, id: i64) -> Result<DeleteOutcome, ApiError> {
        let mut state = self.record(format!("delete_persona {}", id), true)?;
        if state.fail_delete_persona {
            return Err(ApiError::RequestFailed {
                status: 500,
                reason: "Internal Server Error".to_string(),
            });
        }
        let before = state.personas.len();
        state.personas.retain(|p| p.id != id);
        if state.personas.len() == before {
            return Err(not_found("Persona not found"));
        }
        Ok(DeleteOutcome {
            success: true,
            body: None,
        })
    }
}
