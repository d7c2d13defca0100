//! Fund Portfolio Advisor
//!
//! A conversational advisor that builds a mutual-fund portfolio:
//! - Routes every message by which profile fields are still missing
//! - Six specialized agents, each writing only the fields it owns
//! - Language-model output treated as untrusted input and validated by tools
//! - Constrained optimizer with a per-risk-bucket objective fallback chain
//! - Session snapshots and turns persisted per session, optimizations audited
//!
//! TURN LOOP:
//! ROUTE → DISPATCH → APPLY PATCH → AUTO-ADVANCE? → PERSIST

pub mod agents;
pub mod api;
pub mod audit;
pub mod catalog;
pub mod classifier;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod llm;
pub mod memory;
pub mod models;
pub mod optimizer;
pub mod slots;
pub mod state;
pub mod tools;
pub mod validation;

pub use error::Result;

// Re-export common types
pub use classifier::{MessageClassifier, MessageIntent};
pub use context::{AgentKind, Context, ContextPatch};
pub use coordinator::{ChatResponse, Coordinator};
pub use models::*;
