//! Message Classifier
//!
//! Classifies whole-message intents that change how the conversation moves:
//! - RerunOptimization: explicit request to optimize again ("rerun", "re-optimize")
//! - DefersToDefault: the user declines to choose or accepts the suggestion
//! - Other: everything else, handled by slot extraction

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageIntent {
    RerunOptimization,
    DefersToDefault,
    Other,
}

/// Static keyword lists, matched on word boundaries
const RERUN_KEYWORDS: &[&str] = &[
    "rerun", "re run", "re-run", "run again", "run it again",
    "reoptimize", "re-optimize", "re optimize", "reoptimise", "re-optimise",
    "optimize again", "optimise again", "recalculate", "recompute", "redo",
    "try again", "retry",
];

const DEFER_KEYWORDS: &[&str] = &[
    // declining to choose
    "no preference", "don't care", "dont care", "doesn't matter", "does not matter",
    "not sure", "no idea", "skip", "whatever", "anything", "any is fine",
    // accepting a suggestion
    "default", "defaults", "you decide", "up to you", "your call", "you choose",
    "sounds good", "that's fine", "thats fine", "fine", "ok", "okay",
    "go ahead", "recommended", "whatever you suggest",
];

/// Message classifier
pub struct MessageClassifier;

impl MessageClassifier {
    pub fn classify(message: &str) -> MessageIntent {
        let normalized = normalize(message);

        if RERUN_KEYWORDS.iter().any(|kw| contains_phrase(&normalized, kw)) {
            MessageIntent::RerunOptimization
        } else if DEFER_KEYWORDS.iter().any(|kw| contains_phrase(&normalized, kw)) {
            MessageIntent::DefersToDefault
        } else {
            MessageIntent::Other
        }
    }

    pub fn requests_rerun(message: &str) -> bool {
        Self::classify(message) == MessageIntent::RerunOptimization
    }

    pub fn defers_to_default(message: &str) -> bool {
        Self::classify(message) == MessageIntent::DefersToDefault
    }
}

/// Lowercase, punctuation to spaces (apostrophes and hyphens kept), padded
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect();
    format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Word-boundary phrase match on normalized text
pub fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    normalized.contains(&format!(" {} ", phrase))
}
