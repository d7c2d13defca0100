//! Conversation turn storage
//!
//! Stores the append-only (speaker, text) history carried in the session context
//! and the per-turn record handed to the session store.

use crate::context::AgentKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a turn entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// A single entry in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    /// Agent that produced an assistant entry, `None` for direct answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentKind>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            agent: None,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>, agent: Option<AgentKind>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            agent,
            timestamp: Utc::now(),
        }
    }

    /// Rough token estimate used by the history window
    pub fn token_estimate(&self) -> usize {
        (self.text.len() + 3) / 4
    }
}

/// Append-only conversation history
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct TurnHistory {
    turns: Vec<Turn>,
}

impl TurnHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Turn> {
        self.turns.iter()
    }

    /// The `count` most recent entries, oldest first
    pub fn recent(&self, count: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(count);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Number of assistant entries produced by `agent`
    pub fn replies_from(&self, agent: AgentKind) -> usize {
        self.turns
            .iter()
            .filter(|t| t.speaker == Speaker::Assistant && t.agent == Some(agent))
            .count()
    }

    /// Whether any user turn satisfies `matches`. Assistant text is skipped.
    pub fn user_mentions(&self, matches: impl Fn(&str) -> bool) -> bool {
        self.turns
            .iter()
            .filter(|t| t.speaker == Speaker::User)
            .any(|t| matches(&t.text))
    }
}

/// One persisted turn: the user message and the combined reply.
/// `turn_id` makes saving idempotent under retry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnRecord {
    pub turn_id: Uuid,
    pub session_id: String,
    pub user_message: String,
    pub reply: String,
    /// Agents dispatched during the turn, in order
    pub agents: Vec<AgentKind>,
    pub optimization_triggered: bool,
    pub created_at: DateTime<Utc>,
}

impl TurnRecord {
    pub fn new(
        session_id: &str,
        user_message: &str,
        reply: &str,
        agents: Vec<AgentKind>,
        optimization_triggered: bool,
    ) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            user_message: user_message.to_string(),
            reply: reply.to_string(),
            agents,
            optimization_triggered,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_append_and_recent() {
        let mut history = TurnHistory::new();
        for i in 0..10 {
            history.push(Turn::user(format!("Question {}", i)));
        }

        assert_eq!(history.len(), 10);
        let recent = history.recent(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].text, "Question 7");
        assert_eq!(history.recent(50).len(), 10);
    }

    #[test]
    fn test_replies_from_agent() {
        let mut history = TurnHistory::new();
        history.push(Turn::user("hi"));
        history.push(Turn::assistant("Which currency?", Some(AgentKind::Currency)));
        history.push(Turn::user("not sure"));
        history.push(Turn::assistant("INR or USD?", Some(AgentKind::Currency)));

        assert_eq!(history.replies_from(AgentKind::Currency), 2);
        assert_eq!(history.replies_from(AgentKind::Geography), 0);
    }

    #[test]
    fn test_user_mentions_ignores_assistant_text() {
        let mut history = TurnHistory::new();
        let elss = |text: &str| text.to_lowercase().contains("elss");
        history.push(Turn::assistant("Do you want an ELSS fund?", None));
        assert!(!history.user_mentions(elss));

        history.push(Turn::user("Yes, I want ELSS for 80C"));
        assert!(history.user_mentions(elss));
    }

    #[test]
    fn test_history_serializes_as_array() {
        let mut history = TurnHistory::new();
        history.push(Turn::user("hello"));
        let json = serde_json::to_value(&history).unwrap();
        assert!(json.is_array());
    }
}
