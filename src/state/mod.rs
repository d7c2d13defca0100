//! Session persistence
//!
//! Stores the latest context snapshot per session plus the log of turns.
//! In-memory by default; Postgres when a database URL is configured.

pub mod postgres;

use crate::config::AdvisorConfig;
use crate::context::Context;
use crate::memory::TurnRecord;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub use postgres::PgSessionStore;

/// Persistence collaborator, keyed by session id
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<Context>>;

    /// Replace the snapshot and append `turn`. Saving the same turn twice
    /// leaves a single copy in the log.
    async fn save(&self, session_id: &str, context: &Context, turn: &TurnRecord) -> Result<()>;

    async fn clear(&self, session_id: &str) -> Result<()>;

    /// Turns in the order they were saved
    async fn turns(&self, session_id: &str) -> Result<Vec<TurnRecord>>;
}

#[derive(Default)]
struct SessionEntry {
    context: Option<Context>,
    turns: Vec<TurnRecord>,
}

/// In-memory session store for development and tests
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<Context>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).and_then(|e| e.context.clone()))
    }

    async fn save(&self, session_id: &str, context: &Context, turn: &TurnRecord) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(session_id.to_string()).or_default();

        entry.context = Some(context.clone());
        if !entry.turns.iter().any(|t| t.turn_id == turn.turn_id) {
            entry.turns.push(turn.clone());
        }
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
        Ok(())
    }

    async fn turns(&self, session_id: &str) -> Result<Vec<TurnRecord>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .map(|e| e.turns.clone())
            .unwrap_or_default())
    }
}

/// Postgres when `database_url` is set and the pool can be created,
/// otherwise in-memory.
pub fn build_session_store(config: &AdvisorConfig) -> Arc<dyn SessionStore> {
    if let Some(url) = &config.database_url {
        match PgSessionStore::connect_lazy(url) {
            Ok(store) => {
                info!("Session store backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres session store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Session store backend: in-memory");
    Arc::new(InMemorySessionStore::new())
}
