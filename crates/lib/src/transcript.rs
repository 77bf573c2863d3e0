//! Message buffer of the conversation on screen.
//!
//! The buffer follows one session id at a time. Switching sessions resets it; re-syncing the
//! same session leaves optimistic messages alone while a reply is still awaited.

use crate::api::{Message, Role};

/// One bubble in the chat window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    pub message: Message,
    /// Generated locally because a send failed; never came from the backend.
    pub failed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    session_id: Option<String>,
    bubbles: Vec<Bubble>,
    awaiting: usize,
}

impl Transcript {
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Messages shown to the user (system prompt hidden).
    pub fn visible(&self) -> impl Iterator<Item = &Bubble> {
        self.bubbles.iter().filter(|b| b.message.role != Role::System)
    }

    /// True while at least one reply is outstanding.
    pub fn is_typing(&self) -> bool {
        self.awaiting > 0
    }

    /// Follow `session_id`. Returns true (and clears the buffer) when it differs from the last one.
    pub fn follow(&mut self, session_id: Option<&str>) -> bool {
        if self.session_id.as_deref() == session_id {
            return false;
        }
        self.session_id = session_id.map(String::from);
        self.bubbles.clear();
        self.awaiting = 0;
        true
    }

    /// Replace the buffer with server messages for `session_id`, unless a reply for that same
    /// session is still outstanding. Returns whether the buffer was replaced.
    pub fn sync(&mut self, session_id: &str, messages: Vec<Message>) -> bool {
        let switched = self.follow(Some(session_id));
        if !switched && self.awaiting > 0 {
            return false;
        }
        self.bubbles = messages
            .into_iter()
            .map(|message| Bubble {
                message,
                failed: false,
            })
            .collect();
        true
    }

    pub fn push(&mut self, message: Message) {
        self.bubbles.push(Bubble {
            message,
            failed: false,
        });
    }

    /// Append a locally generated error where the assistant reply would have gone.
    pub fn push_failure(&mut self, text: impl Into<String>) {
        self.bubbles.push(Bubble {
            message: Message::assistant(text),
            failed: true,
        });
    }

    pub fn begin_wait(&mut self) {
        self.awaiting += 1;
    }

    pub fn end_wait(&mut self) {
        self.awaiting = self.awaiting.saturating_sub(1);
    }

    pub fn clear(&mut self) {
        self.session_id = None;
        self.bubbles.clear();
        self.awaiting = 0;
    }
}
