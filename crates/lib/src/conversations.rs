//! Conversation summaries and the recency rules the sidebar and controller share.
//!
//! Conversations are ordered by creation time, newest first. Timestamps are compared to the
//! second (`YYYY-MM-DDTHH:MM:SS` prefix, any fraction or offset ignored); rows whose timestamp
//! is missing or does not parse sort after every dated row, keeping their relative order.

use crate::api::{Conversation, Message, Role};
use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::collections::HashSet;

const PREVIEW_WORDS: usize = 5;

/// One row of the conversation list.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub session_id: String,
    pub persona: String,
    /// Raw timestamp as sent by the backend.
    pub created_at: Option<String>,
    pub created: Option<NaiveDateTime>,
    /// Cached last user/assistant message, shortened for display.
    pub last_message: Option<String>,
}

impl From<&Conversation> for ConversationSummary {
    fn from(c: &Conversation) -> Self {
        Self {
            session_id: c.session_id.clone(),
            persona: c.persona.clone(),
            created_at: c.created_at.clone(),
            created: c.created_at.as_deref().and_then(parse_created_at),
            last_message: preview(&c.messages),
        }
    }
}

impl From<Conversation> for ConversationSummary {
    fn from(c: Conversation) -> Self {
        Self::from(&c)
    }
}

/// Parse a backend timestamp to the second.
pub fn parse_created_at(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    let prefix = raw.get(..19)?;
    NaiveDateTime::parse_from_str(prefix, "%Y-%m-%dT%H:%M:%S").ok()
}

/// Newest first; undated last. Stable.
pub fn recency(a: &ConversationSummary, b: &ConversationSummary) -> Ordering {
    match (a.created, b.created) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn sort_by_recency(rows: &mut [ConversationSummary]) {
    rows.sort_by(recency);
}

/// Build the sorted sidebar rows from a fetched list. The backend stores one row per reply, so
/// only the newest row of each session is kept.
pub fn summarize(conversations: &[Conversation]) -> Vec<ConversationSummary> {
    let mut rows: Vec<ConversationSummary> =
        conversations.iter().map(ConversationSummary::from).collect();
    sort_by_recency(&mut rows);
    let mut seen = HashSet::new();
    rows.retain(|r| seen.insert(r.session_id.clone()));
    rows
}

/// Last user or assistant message, cut to its first few words.
pub fn preview(messages: &[Message]) -> Option<String> {
    let last = messages
        .iter()
        .rev()
        .find(|m| matches!(m.role, Role::User | Role::Assistant) && !m.content.trim().is_empty())?;
    let words: Vec<&str> = last.content.split_whitespace().collect();
    let mut text = words
        .iter()
        .take(PREVIEW_WORDS)
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    if words.len() > PREVIEW_WORDS {
        text.push_str(" ...");
    }
    Some(text)
}

pub fn find<'a>(rows: &'a [ConversationSummary], session_id: &str) -> Option<&'a ConversationSummary> {
    rows.iter().find(|c| c.session_id == session_id)
}

/// Most recent conversation belonging to `persona` (rows must already be sorted).
pub fn most_recent_for_persona<'a>(
    rows: &'a [ConversationSummary],
    persona: &str,
) -> Option<&'a ConversationSummary> {
    rows.iter().find(|c| c.persona == persona)
}

/// The conversation for `persona` that appears in `after` but not in `before`. When several do
/// (two chats opened in the same tick) the newest wins.
pub fn newly_created<'a>(
    before: &HashSet<String>,
    after: &'a [ConversationSummary],
    persona: &str,
) -> Option<&'a ConversationSummary> {
    after
        .iter()
        .find(|c| c.persona == persona && !before.contains(&c.session_id))
}

/// Session ids of every conversation held by `persona`.
pub fn sessions_for_persona(rows: &[ConversationSummary], matches: impl Fn(&str) -> bool) -> Vec<String> {
    rows.iter()
        .filter(|c| matches(&c.persona))
        .map(|c| c.session_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(session: &str, persona: &str, created_at: Option<&str>) -> ConversationSummary {
        ConversationSummary::from(Conversation {
            session_id: session.to_string(),
            persona: persona.to_string(),
            created_at: created_at.map(String::from),
            messages: Vec::new(),
        })
    }

    fn ids(rows: &[ConversationSummary]) -> Vec<&str> {
        rows.iter().map(|r| r.session_id.as_str()).collect()
    }

    #[test]
    fn parses_to_the_second() {
        let a = parse_created_at("2024-01-02T10:00:00.123456+00:00").unwrap();
        let b = parse_created_at("2024-01-02T10:00:00").unwrap();
        assert_eq!(a, b);
        assert!(parse_created_at("yesterday").is_none());
        assert!(parse_created_at("2024-01-02").is_none());
        assert!(parse_created_at("").is_none());
    }

    #[test]
    fn newest_first() {
        let mut rows = vec![
            row("s1", "rafael", Some("2024-01-01T10:00:00")),
            row("s2", "maria", Some("2024-01-02T10:00:00")),
        ];
        sort_by_recency(&mut rows);
        assert_eq!(ids(&rows), vec!["s2", "s1"]);
    }

    #[test]
    fn undated_rows_last_and_stable() {
        let mut rows = vec![
            row("a", "p", None),
            row("b", "p", Some("2024-01-01T10:00:00")),
            row("c", "p", Some("garbage")),
            row("d", "p", Some("2024-03-01T10:00:00")),
            row("e", "p", Some("2024-01-01T10:00:00.999")),
        ];
        sort_by_recency(&mut rows);
        assert_eq!(ids(&rows), vec!["d", "b", "e", "a", "c"]);
    }

    #[test]
    fn summarize_keeps_newest_row_per_session() {
        let convo = |session: &str, created_at: &str, text: &str| Conversation {
            session_id: session.to_string(),
            persona: "maria".to_string(),
            created_at: Some(created_at.to_string()),
            messages: vec![Message::assistant(text)],
        };
        let rows = summarize(&[
            convo("s1", "2024-01-01T10:00:00", "old"),
            convo("s2", "2024-01-01T11:00:00", "other"),
            convo("s1", "2024-01-01T12:00:00", "new"),
        ]);
        assert_eq!(ids(&rows), vec!["s1", "s2"]);
        assert_eq!(rows[0].last_message.as_deref(), Some("new"));
    }

    #[test]
    fn preview_takes_last_chat_message() {
        let messages = vec![
            Message::system("prompt"),
            Message::user("hello"),
            Message::assistant("one two three four five six seven"),
            Message::system("trailing"),
        ];
        assert_eq!(preview(&messages).as_deref(), Some("one two three four five ..."));
        assert_eq!(preview(&[Message::user("short reply")]).as_deref(), Some("short reply"));
        assert_eq!(preview(&[Message::system("only")]), None);
    }

    #[test]
    fn newly_created_ignores_existing_rows() {
        let before: HashSet<String> = ["s1".to_string()].into_iter().collect();
        let after = vec![
            row("s3", "rafael", Some("2024-01-03T10:00:00")),
            row("s2", "maria", Some("2024-01-02T10:00:00")),
            row("s1", "maria", Some("2024-01-01T10:00:00")),
        ];
        assert_eq!(newly_created(&before, &after, "maria").unwrap().session_id, "s2");
        let all: HashSet<String> = ["s1", "s2", "s3"].iter().map(|s| s.to_string()).collect();
        assert!(newly_created(&all, &after, "maria").is_none());
        assert_eq!(most_recent_for_persona(&after, "maria").unwrap().session_id, "s2");
    }

    #[test]
    fn sessions_for_persona_filters() {
        let rows = vec![row("s1", "maria", None), row("s2", "rafael", None), row("s3", "4", None)];
        assert_eq!(sessions_for_persona(&rows, |p| p == "maria" || p == "4"), vec!["s1", "s3"]);
    }
}
