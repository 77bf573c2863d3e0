//! Chat screen controller.
//!
//! Owns the persona list, the conversation list, the current session id and the transcript, and
//! sequences backend calls on mount, on selection and after every mutation. Front-ends render a
//! [`ChatState`] snapshot and call the operations below; nothing here knows about a UI toolkit.
//!
//! The state sits behind an async mutex that is only held while a result is applied. Backend
//! calls run without it, so a slow reply never blocks selection, deletes or snapshots. Because
//! operations interleave, every apply step re-checks that the screen is still where the request
//! left it.

use crate::api::{
    ApiError, Backend, ChatReply, ChatRequest, Conversation, Message, NewPersona, Persona, PersonaQuery,
    PersonaUpdate,
};
use crate::config::DEFAULT_SEED_MESSAGE;
use crate::conversations::{self, ConversationSummary};
use crate::dialog::TOAST_TTL;
use crate::personas;
use crate::session::SessionStore;
use crate::transcript::Transcript;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Largest page the persona endpoint accepts.
const PERSONA_PAGE_LIMIT: u32 = 100;
const PERSONA_MAX_PAGES: u32 = 50;

/// Which panel the chat screen shows. Exactly one at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Panel {
    #[default]
    Loading,
    PersonaCreate,
    PersonaPicker,
    /// Seed message sent for `persona`, waiting for the new conversation to show up.
    CreatingChat { persona: String },
    ChatActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// One-line status shown above the chat screen. Errors stay until dismissed or replaced; success
/// notices expire on their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
    expires_at: Option<Instant>,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            text: text.into(),
            expires_at: Some(Instant::now() + TOAST_TTL),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            text: text.into(),
            expires_at: None,
        }
    }

    pub fn is_visible(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Everything a front-end needs to draw the chat screen.
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    pub panel: Panel,
    pub personas: Vec<Persona>,
    /// Newest first.
    pub conversations: Vec<ConversationSummary>,
    pub current_session: Option<String>,
    pub selected_persona: Option<String>,
    pub transcript: Transcript,
    pub notice: Option<Notice>,
    /// Set when the backend rejected the token; the session store has been cleared.
    pub login_required: bool,
}

impl ChatState {
    /// Summary row of the current conversation.
    pub fn current(&self) -> Option<&ConversationSummary> {
        let id = self.current_session.as_deref()?;
        conversations::find(&self.conversations, id)
    }

    /// The notice, unless it has expired.
    pub fn visible_notice(&self, now: Instant) -> Option<&Notice> {
        self.notice.as_ref().filter(|n| n.is_visible(now))
    }

    fn fail(&mut self, context: &str, err: &ApiError) {
        log::warn!("{}: {}", context, err);
        self.note_unauthorized(err);
        self.notice = Some(Notice::error(format!("{}: {}", context, err)));
    }

    fn note_unauthorized(&mut self, err: &ApiError) {
        if err.is_unauthorized() {
            self.login_required = true;
        }
    }

    fn creating_chat_for(&self, persona: &str) -> bool {
        matches!(&self.panel, Panel::CreatingChat { persona: p } if p == persona)
    }

    fn show_picker(&mut self) {
        self.current_session = None;
        self.selected_persona = None;
        self.transcript.clear();
        self.panel = Panel::PersonaPicker;
    }

    /// Switch to `session_id` before its messages arrive.
    fn open(&mut self, session_id: &str) {
        log::debug!("selecting conversation {}", session_id);
        if let Some(row) = conversations::find(&self.conversations, session_id) {
            self.selected_persona = Some(row.persona.clone());
        }
        self.current_session = Some(session_id.to_string());
        self.panel = Panel::ChatActive;
        self.transcript.follow(Some(session_id));
    }

    fn apply_detail(&mut self, session_id: &str, result: Result<Conversation, ApiError>) {
        if self.current_session.as_deref() != Some(session_id) {
            log::debug!("dropping detail for {}; no longer current", session_id);
            return;
        }
        match result {
            Ok(detail) => {
                if !detail.persona.is_empty() {
                    self.selected_persona = Some(detail.persona.clone());
                }
                self.transcript.sync(session_id, detail.messages);
            }
            Err(e) => self.fail("Could not load conversation", &e),
        }
    }

    /// After a delete: keep the current conversation if it survived, otherwise open the newest
    /// remaining one (returned so its detail can be fetched), or the picker when none remain.
    fn reselect(&mut self) -> Option<String> {
        let current = self.current_session.clone()?;
        if conversations::find(&self.conversations, &current).is_some() {
            return None;
        }
        match self.conversations.first().map(|c| c.session_id.clone()) {
            Some(first) => {
                self.open(&first);
                Some(first)
            }
            None => {
                self.show_picker();
                None
            }
        }
    }

    fn begin_send(&mut self, draft: &str) -> Option<PendingSend> {
        let text = draft.trim();
        if text.is_empty() {
            return None;
        }
        let session_id = self.current_session.clone()?;
        let persona = self
            .selected_persona
            .clone()
            .or_else(|| self.current().map(|c| c.persona.clone()))?;
        let message = Message::user(text);
        self.transcript.push(message.clone());
        self.transcript.begin_wait();
        Some(PendingSend {
            request: ChatRequest {
                persona,
                session_id: Some(session_id.clone()),
                messages: vec![message],
            },
            session_id,
        })
    }

    /// Put the reply (or a local failure bubble) under the message it answers, if that
    /// conversation is still on screen.
    fn apply_reply(&mut self, pending: &PendingSend, result: Result<ChatReply, ApiError>) -> SendOutcome {
        let on_screen = self.transcript.session_id() == Some(pending.session_id.as_str());
        if on_screen {
            self.transcript.end_wait();
        }
        match result {
            Ok(reply) => {
                let text = reply.assistant_text().map(String::from);
                if !on_screen {
                    log::debug!("reply for {} arrived off screen", pending.session_id);
                } else if let Some(ref t) = text {
                    self.transcript.push(Message::assistant(t.clone()));
                }
                SendOutcome::Replied(text)
            }
            Err(e) => {
                if on_screen {
                    self.transcript.push_failure(format!("Error: {}", e));
                }
                self.fail("Message not sent", &e);
                SendOutcome::Failed(e.to_string())
            }
        }
    }
}

/// A send whose optimistic part is already on screen.
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub session_id: String,
    pub request: ChatRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing to send (blank draft or no conversation open).
    Ignored,
    /// The assistant's answer, if the response carried one.
    Replied(Option<String>),
    Failed(String),
}

/// Result of deleting a persona and its conversations. Deletion is best effort; each failed step
/// is listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionReport {
    pub persona_id: i64,
    pub deleted_conversations: Vec<String>,
    /// Session id and reason for each conversation that could not be deleted.
    pub failed_conversations: Vec<(String, String)>,
    pub persona_error: Option<String>,
}

impl DeletionReport {
    pub fn is_complete(&self) -> bool {
        self.failed_conversations.is_empty() && self.persona_error.is_none()
    }

    pub fn summary(&self) -> String {
        if self.is_complete() {
            return "Persona deleted".to_string();
        }
        let mut parts = Vec::new();
        for (session, reason) in &self.failed_conversations {
            parts.push(format!("conversation {}: {}", session, reason));
        }
        if let Some(ref reason) = self.persona_error {
            parts.push(format!("persona: {}", reason));
        }
        format!("Persona deletion incomplete ({})", parts.join("; "))
    }
}

/// Cloneable handle; clones share one chat screen.
#[derive(Clone)]
pub struct ChatController {
    backend: Arc<dyn Backend>,
    session: SessionStore,
    seed_message: String,
    state: Arc<Mutex<ChatState>>,
}

impl ChatController {
    pub fn new(backend: Arc<dyn Backend>, session: SessionStore) -> Self {
        Self {
            backend,
            session,
            seed_message: DEFAULT_SEED_MESSAGE.to_string(),
            state: Arc::new(Mutex::new(ChatState::default())),
        }
    }

    /// Message sent to open a conversation with a persona.
    pub fn with_seed_message(mut self, seed: impl Into<String>) -> Self {
        self.seed_message = seed.into();
        self
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> ChatState {
        self.state.lock().await.clone()
    }

    /// Copy of the current state, unless an update is being applied right now.
    pub fn try_snapshot(&self) -> Option<ChatState> {
        self.state.try_lock().ok().map(|s| s.clone())
    }

    async fn update<R>(&self, f: impl FnOnce(&mut ChatState) -> R) -> R {
        f(&mut *self.state.lock().await)
    }

    pub async fn dismiss_notice(&self) {
        self.update(|s| s.notice = None).await;
    }

    async fn fetch_personas(&self) -> Result<Vec<Persona>, ApiError> {
        let mut query = PersonaQuery {
            limit: PERSONA_PAGE_LIMIT,
            ..PersonaQuery::default()
        };
        let mut all = Vec::new();
        loop {
            let page = self.backend.list_personas(&query).await?;
            let more = page.has_next && !page.items.is_empty();
            all.extend(page.items);
            if !more || query.page >= PERSONA_MAX_PAGES {
                break;
            }
            query.page += 1;
        }
        Ok(all)
    }

    /// Conversation rows of the signed-in interviewer, newest first. The backend answers 404 when
    /// there are none.
    async fn fetch_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        let user_id = self.session.user_id().ok_or(ApiError::Unauthorized)?;
        match self.backend.list_conversations(user_id).await {
            Ok(rows) => Ok(conversations::summarize(&rows)),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Reload the persona list, keeping the old one on failure.
    pub async fn refresh_personas(&self) {
        let result = self.fetch_personas().await;
        self.update(|s| match result {
            Ok(personas) => s.personas = personas,
            Err(e) => s.fail("Could not load personas", &e),
        })
        .await;
    }

    /// Reload the conversation list, keeping the old one on failure.
    pub async fn refresh_conversations(&self) {
        let result = self.fetch_conversations().await;
        self.update(|s| match result {
            Ok(rows) => s.conversations = rows,
            Err(e) => s.fail("Could not load conversations", &e),
        })
        .await;
    }

    /// Reload the conversation list after a delete. Any failure leaves an empty list.
    async fn reload_after_delete(&self) {
        let result = self.fetch_conversations().await;
        self.update(|s| {
            s.conversations = match result {
                Ok(rows) => rows,
                Err(e) => {
                    s.note_unauthorized(&e);
                    log::debug!("conversation refresh after delete failed: {}", e);
                    Vec::new()
                }
            }
        })
        .await;
    }

    async fn load_detail(&self, session_id: &str) {
        let result = self.backend.get_conversation(session_id).await;
        self.update(|s| s.apply_detail(session_id, result)).await;
    }

    async fn reselect(&self) {
        if let Some(next) = self.update(ChatState::reselect).await {
            self.load_detail(&next).await;
        }
    }

    /// Initial load: both lists at once, then open the newest conversation or the picker.
    pub async fn mount(&self) {
        self.update(|s| s.panel = Panel::Loading).await;
        let (personas, rows) = tokio::join!(self.fetch_personas(), self.fetch_conversations());
        let first = self
            .update(|s| {
                match personas {
                    Ok(personas) => s.personas = personas,
                    Err(e) => {
                        s.personas.clear();
                        s.fail("Could not load personas", &e);
                    }
                }
                match rows {
                    Ok(rows) => s.conversations = rows,
                    Err(e) => {
                        s.conversations.clear();
                        s.fail("Could not load conversations", &e);
                    }
                }
                log::debug!(
                    "mounted with {} personas and {} conversations",
                    s.personas.len(),
                    s.conversations.len()
                );
                match s.conversations.first().map(|c| c.session_id.clone()) {
                    Some(first) => {
                        s.open(&first);
                        Some(first)
                    }
                    None => {
                        s.show_picker();
                        None
                    }
                }
            })
            .await;
        if let Some(first) = first {
            self.load_detail(&first).await;
        }
    }

    /// Make `session_id` current and show its messages.
    pub async fn select_conversation(&self, session_id: &str) {
        self.update(|s| s.open(session_id)).await;
        self.load_detail(session_id).await;
    }

    pub async fn new_chat(&self) {
        self.update(|s| s.panel = Panel::PersonaPicker).await;
    }

    pub async fn open_persona_create(&self) {
        self.update(|s| s.panel = Panel::PersonaCreate).await;
    }

    pub async fn cancel_persona_create(&self) {
        self.update(|s| s.panel = Panel::PersonaPicker).await;
    }

    /// Open a new conversation with `persona` by sending the seed message without a session id,
    /// then find the conversation the backend created.
    pub async fn pick_persona(&self, persona: &str) {
        log::info!("starting a conversation with {}", persona);
        let before: HashSet<String> = self
            .update(|s| {
                s.panel = Panel::CreatingChat {
                    persona: persona.to_string(),
                };
                s.conversations.iter().map(|c| c.session_id.clone()).collect()
            })
            .await;
        let request = ChatRequest {
            persona: persona.to_string(),
            session_id: None,
            messages: vec![Message::user(self.seed_message.clone())],
        };
        if let Err(e) = self.backend.respond(&request).await {
            self.update(|s| {
                s.fail("Could not start a conversation", &e);
                if s.creating_chat_for(persona) {
                    s.panel = Panel::PersonaPicker;
                }
            })
            .await;
            return;
        }
        let rows = self.fetch_conversations().await;

        let opened = self
            .update(|s| {
                match rows {
                    Ok(rows) => s.conversations = rows,
                    Err(e) => s.fail("Could not load conversations", &e),
                }
                if !s.creating_chat_for(persona) {
                    log::debug!("left the new chat with {} before it opened", persona);
                    return None;
                }
                let created = conversations::newly_created(&before, &s.conversations, persona)
                    .or_else(|| conversations::most_recent_for_persona(&s.conversations, persona))
                    .map(|c| c.session_id.clone());
                match created {
                    Some(session_id) => {
                        s.selected_persona = Some(persona.to_string());
                        s.open(&session_id);
                        Some(session_id)
                    }
                    None => {
                        log::warn!("no conversation found for {} after seeding", persona);
                        s.notice = Some(Notice::error(format!(
                            "Could not find the new conversation with {}",
                            persona
                        )));
                        s.panel = Panel::PersonaPicker;
                        None
                    }
                }
            })
            .await;
        if let Some(session_id) = opened {
            self.load_detail(&session_id).await;
        }
    }

    /// Create a persona. On failure the create panel stays open and the error is returned for
    /// inline display.
    pub async fn submit_persona(&self, persona: &NewPersona) -> Result<Persona, ApiError> {
        match self.backend.create_persona(persona).await {
            Ok(created) => {
                log::info!("created persona {} ({})", created.name, created.id);
                self.update(|s| {
                    s.notice = Some(Notice::success(format!("Persona {} created", created.name)));
                    if s.panel == Panel::PersonaCreate {
                        s.panel = Panel::PersonaPicker;
                    }
                })
                .await;
                self.refresh_personas().await;
                Ok(created)
            }
            Err(e) => {
                log::warn!("persona creation failed: {}", e);
                self.update(|s| s.note_unauthorized(&e)).await;
                Err(e)
            }
        }
    }

    /// Change some fields of a persona, then reload the persona list.
    pub async fn update_persona(&self, id: i64, update: &PersonaUpdate) -> Result<Persona, ApiError> {
        match self.backend.update_persona(id, update).await {
            Ok(updated) => {
                log::info!("updated persona {} ({})", updated.name, updated.id);
                self.refresh_personas().await;
                Ok(updated)
            }
            Err(e) => {
                log::warn!("persona update failed: {}", e);
                self.update(|s| s.note_unauthorized(&e)).await;
                Err(e)
            }
        }
    }

    /// Optimistic half of a send: append the user message and show typing. Returns `None` when
    /// there is nothing to send.
    pub async fn begin_send(&self, draft: &str) -> Option<PendingSend> {
        self.update(|s| s.begin_send(draft)).await
    }

    /// Await the reply for a send started with [`Self::begin_send`]. Nothing is locked while the
    /// backend works.
    pub async fn finish_send(&self, pending: PendingSend) -> SendOutcome {
        let result = self.backend.respond(&pending.request).await;
        self.apply_reply(pending, result).await
    }

    /// Record the backend's answer to `pending`, then refresh the list and, if the conversation is
    /// still open, its messages.
    pub async fn apply_reply(&self, pending: PendingSend, result: Result<ChatReply, ApiError>) -> SendOutcome {
        let outcome = self.update(|s| s.apply_reply(&pending, result)).await;
        if let SendOutcome::Replied(_) = outcome {
            self.refresh_conversations().await;
            let still_open = self
                .update(|s| s.current_session.as_deref() == Some(pending.session_id.as_str()))
                .await;
            if still_open {
                self.load_detail(&pending.session_id).await;
            }
        }
        outcome
    }

    pub async fn send_message(&self, draft: &str) -> SendOutcome {
        match self.begin_send(draft).await {
            Some(pending) => self.finish_send(pending).await,
            None => SendOutcome::Ignored,
        }
    }

    /// Delete one conversation. The list is refetched whatever the outcome.
    pub async fn delete_conversation(&self, session_id: &str) -> Result<(), ApiError> {
        log::info!("deleting conversation {}", session_id);
        let result = self.backend.delete_conversation(session_id).await.map(|_| ());
        if let Err(ref e) = result {
            self.update(|s| s.fail("Could not delete conversation", e)).await;
        }
        self.reload_after_delete().await;
        self.reselect().await;
        result
    }

    /// Delete a persona together with its conversations.
    pub async fn delete_persona(&self, id: i64) -> DeletionReport {
        let mut report = DeletionReport {
            persona_id: id,
            ..DeletionReport::default()
        };
        let persona = self
            .update(|s| personas::find_by_id(&s.personas, id).cloned())
            .await;
        let rows = match self.fetch_conversations().await {
            Ok(rows) => {
                let kept = rows.clone();
                self.update(|s| s.conversations = kept).await;
                rows
            }
            Err(_) => self.update(|s| s.conversations.clone()).await,
        };
        let sessions = match persona {
            Some(ref p) => conversations::sessions_for_persona(&rows, |label| p.matches(label)),
            None => Vec::new(),
        };
        log::info!("deleting persona {} and {} conversations", id, sessions.len());

        let mut unauthorized = false;
        for session_id in sessions {
            match self.backend.delete_conversation(&session_id).await {
                Ok(_) => report.deleted_conversations.push(session_id),
                Err(e) => {
                    unauthorized |= e.is_unauthorized();
                    log::warn!("could not delete conversation {}: {}", session_id, e);
                    report.failed_conversations.push((session_id, e.to_string()));
                }
            }
        }
        if let Err(e) = self.backend.delete_persona(id).await {
            unauthorized |= e.is_unauthorized();
            log::warn!("could not delete persona {}: {}", id, e);
            report.persona_error = Some(e.to_string());
        }

        self.refresh_personas().await;
        self.reload_after_delete().await;
        self.update(|s| {
            if unauthorized {
                s.login_required = true;
            }
            if let Some(ref p) = persona {
                if report.persona_error.is_none() && s.selected_persona.as_deref() == Some(p.name.as_str()) {
                    s.selected_persona = None;
                }
            }
            s.notice = Some(if report.is_complete() {
                Notice::success(report.summary())
            } else {
                Notice::error(report.summary())
            });
        })
        .await;
        self.reselect().await;
        report
    }
}
