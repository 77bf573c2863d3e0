//! Conversation list view model.
//!
//! The rows themselves belong to the controller; the sidebar only owns the delete confirmation
//! and the "deleted" toast.

use crate::conversations::ConversationSummary;
use crate::dialog::{Confirm, Toast, ToastSlot};
use std::time::Instant;

const NO_MESSAGES: &str = "No messages";

#[derive(Debug, Default)]
pub struct Sidebar {
    confirm: Confirm<String>,
    toast: ToastSlot,
}

impl Sidebar {
    /// Preview text for a row.
    pub fn preview(row: &ConversationSummary) -> &str {
        row.last_message.as_deref().unwrap_or(NO_MESSAGES)
    }

    /// Secondary line: persona and creation time (minutes precision).
    pub fn caption(row: &ConversationSummary) -> String {
        match row.created {
            Some(ts) => format!("{} · {}", row.persona, ts.format("%Y-%m-%d %H:%M")),
            None => row.persona.clone(),
        }
    }

    pub fn is_selected(row: &ConversationSummary, current: Option<&str>) -> bool {
        current == Some(row.session_id.as_str())
    }

    /// Ask before deleting `session_id`.
    pub fn request_delete(&mut self, session_id: impl Into<String>) {
        self.confirm.request(session_id.into());
    }

    pub fn pending_delete(&self) -> Option<&str> {
        self.confirm.pending().map(String::as_str)
    }

    /// Accept the pending delete; the caller hands the returned id to the controller.
    pub fn confirm_delete(&mut self) -> Option<String> {
        self.confirm.confirm()
    }

    pub fn cancel_delete(&mut self) {
        self.confirm.cancel();
    }

    /// Record a successful delete.
    pub fn deleted(&mut self, now: Instant) {
        self.toast.show("Conversation deleted", now);
    }

    pub fn toast(&mut self, now: Instant) -> Option<&Toast> {
        self.toast.visible(now)
    }
}
