//! Error types for the portfolio advisor

use thiserror::Error;

/// Result type alias for advisor operations
pub type Result<T> = std::result::Result<T, AdvisorError>;

#[derive(Error, Debug)]
pub enum AdvisorError {

    // =============================
    // Conversation-level (recoverable)
    // =============================

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Ambiguous input: {0}")]
    AmbiguousInput(String),

    #[error("Catalog exhausted: {0}")]
    CatalogExhausted(String),

    #[error("Optimization infeasible: {0}")]
    OptimizationInfeasible(String),

    #[error("Optimization timed out after {0} seconds")]
    OptimizationTimeout(u64),

    // =============================
    // Programming errors (fatal)
    // =============================

    #[error("Ownership violation: agent {agent} attempted to write {field}")]
    OwnershipViolation { agent: String, field: String },

    #[error("Internal error: {0}")]
    Internal(String),

    // =============================
    // Collaborators
    // =============================

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Catalog error: {0}")]
    CatalogError(String),

    #[error("State persistence error: {0}")]
    StateError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AdvisorError {
    /// Programming errors that must reach the host unchanged.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AdvisorError::OwnershipViolation { .. } | AdvisorError::Internal(_)
        )
    }

    /// Conditions the conversation absorbs as a reply to the user.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            AdvisorError::Validation(_)
                | AdvisorError::AmbiguousInput(_)
                | AdvisorError::CatalogExhausted(_)
                | AdvisorError::OptimizationInfeasible(_)
                | AdvisorError::OptimizationTimeout(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdvisorError::OptimizationTimeout(_)
                | AdvisorError::LlmError(_)
                | AdvisorError::DatabaseError(_)
                | AdvisorError::HttpError(_)
        )
    }

    /// Text shown to the user when the error is absorbed into a turn.
    pub fn user_message(&self) -> String {
        match self {
            AdvisorError::Validation(detail) => {
                format!("I can't run the optimization yet: {}", detail)
            }
            AdvisorError::AmbiguousInput(detail) => detail.clone(),
            AdvisorError::CatalogExhausted(detail) => {
                format!("The fund catalog could not supply enough funds: {}", detail)
            }
            AdvisorError::OptimizationInfeasible(reason) => format!(
                "The optimization failed: {}. Try adjusting your allocation or fund choices.",
                reason
            ),
            AdvisorError::OptimizationTimeout(secs) => format!(
                "The optimization did not finish within {} seconds. Say \"rerun\" to try again.",
                secs
            ),
            other => format!("Something went wrong: {}", other),
        }
    }
}
