//! Confirmation prompts and transient toasts used by the sidebar and persona views.

use std::time::{Duration, Instant};

/// Default lifetime of a toast.
pub const TOAST_TTL: Duration = Duration::from_secs(3);

/// A pending "are you sure?" for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirm<T> {
    pending: Option<T>,
}

impl<T> Default for Confirm<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T: Clone> Confirm<T> {
    /// Ask for confirmation; replaces any earlier pending target.
    pub fn request(&mut self, target: T) {
        self.pending = Some(target);
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref()
    }

    /// Accept: returns the target and closes the prompt.
    pub fn confirm(&mut self) -> Option<T> {
        self.pending.take()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

/// Short-lived notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub text: String,
    shown_at: Instant,
}

impl Toast {
    pub fn new(text: impl Into<String>, now: Instant) -> Self {
        Self {
            text: text.into(),
            shown_at: now,
        }
    }

    pub fn is_visible(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.shown_at) < TOAST_TTL
    }
}

/// Slot holding at most one toast; expired toasts are dropped on read.
#[derive(Debug, Clone, Default)]
pub struct ToastSlot {
    current: Option<Toast>,
}

impl ToastSlot {
    pub fn show(&mut self, text: impl Into<String>, now: Instant) {
        self.current = Some(Toast::new(text, now));
    }

    pub fn visible(&mut self, now: Instant) -> Option<&Toast> {
        if self.current.as_ref().is_some_and(|t| !t.is_visible(now)) {
            self.current = None;
        }
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_flow() {
        let mut c = Confirm::default();
        assert!(c.pending().is_none());
        c.request("s1".to_string());
        c.request("s2".to_string());
        assert_eq!(c.pending().map(String::as_str), Some("s2"));
        assert_eq!(c.confirm().as_deref(), Some("s2"));
        assert!(c.confirm().is_none());

        c.request("s3".to_string());
        c.cancel();
        assert!(c.pending().is_none());
    }

    #[test]
    fn toast_expires() {
        let now = Instant::now();
        let mut slot = ToastSlot::default();
        slot.show("Conversation deleted", now);
        assert!(slot.visible(now + Duration::from_secs(1)).is_some());
        assert!(slot.visible(now + TOAST_TTL).is_none());
        assert!(slot.visible(now).is_none());
    }
}
