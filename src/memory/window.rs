//! History window management
//!
//! Chooses which turns are sent to the language model so prompts stay bounded.

use crate::memory::store::{Turn, TurnHistory};
use tracing::debug;

/// Configuration for the prompt history window
#[derive(Debug, Clone)]
pub struct WindowConfig {
    /// Number of recent turns to include
    pub max_turns: usize,
    /// Approximate token budget for the included turns
    pub max_tokens: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            max_tokens: 8_000,
        }
    }
}

pub struct HistoryWindow {
    config: WindowConfig,
}

impl HistoryWindow {
    pub fn new() -> Self {
        Self {
            config: WindowConfig::default(),
        }
    }

    pub fn with_config(config: WindowConfig) -> Self {
        Self { config }
    }

    /// Recent turns within both the turn and token budgets, oldest first.
    pub fn select<'a>(&self, history: &'a TurnHistory) -> &'a [Turn] {
        let recent = history.recent(self.config.max_turns);

        let mut tokens = 0;
        let mut start = recent.len();
        for (idx, turn) in recent.iter().enumerate().rev() {
            tokens += turn.token_estimate();
            if tokens > self.config.max_tokens {
                break;
            }
            start = idx;
        }

        if start > 0 {
            debug!(
                dropped = start,
                kept = recent.len() - start,
                "History window trimmed to token budget"
            );
        }

        &recent[start..]
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_keeps_most_recent_turns() {
        let window = HistoryWindow::with_config(WindowConfig {
            max_turns: 4,
            max_tokens: 10_000,
        });
        let mut history = TurnHistory::new();
        for i in 0..15 {
            history.push(Turn::user(format!("Question {}", i)));
        }

        let selected = window.select(&history);
        assert_eq!(selected.len(), 4);
        assert_eq!(selected[3].text, "Question 14");
    }

    #[test]
    fn test_window_respects_token_budget() {
        let window = HistoryWindow::with_config(WindowConfig {
            max_turns: 20,
            max_tokens: 30,
        });
        let mut history = TurnHistory::new();
        for _ in 0..10 {
            history.push(Turn::user("x".repeat(40)));
        }

        // each turn is ~10 tokens
        assert_eq!(window.select(&history).len(), 3);
    }
}
