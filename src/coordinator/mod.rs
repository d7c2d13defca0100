//! Coordinator - routes each message to the agent whose field is missing
//!
//! ROUTE → DISPATCH → APPLY PATCH → AUTO-ADVANCE? → PERSIST → AUDIT
//!
//! The coordinator is the only writer of the context. Agents hand back
//! patches; ownership is checked when they are applied.

pub mod routing;

pub use routing::{next_pending, route, Route};

use crate::agents::{create_default_agents, AgentSet};
use crate::audit::{AuditEntry, OptimizationAudit, OptimizationRecord};
use crate::catalog::InMemoryCatalog;
use crate::config::AdvisorConfig;
use crate::context::{AgentKind, Context};
use crate::error::AdvisorError;
use crate::llm::{GeminiClient, LanguageModel, LlmRequest, LlmResponse, OfflineLanguageModel};
use crate::memory::{HistoryWindow, Turn, TurnRecord, WindowConfig};
use crate::models::PortfolioAllocation;
use crate::state::{build_session_store, SessionStore};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Input-free agents that may run after the first dispatch of a turn
const MAX_AUTO_ADVANCE: usize = 2;

const DIRECT_PROMPT: &str = "You are a friendly mutual fund portfolio advisor. The investor's portfolio \
has already been built and optimized. Answer their question briefly using only the facts below. \
If they want a new optimization, tell them to say \"rerun\".";

/// Everything one call to `step` produced
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Agents dispatched, in order; empty for a direct answer
    pub agents: Vec<AgentKind>,
    pub reply: String,
    pub context: Context,
    pub optimization_triggered: bool,
    /// An optimization result was written during this turn
    pub new_allocation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    /// Last agent that acted, `None` for a direct answer
    pub agent: Option<AgentKind>,
    pub reply: String,
    pub optimization_triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolio: Option<PortfolioAllocation>,
}

struct Dispatched {
    reply: String,
    done: bool,
}

pub struct Coordinator {
    agents: AgentSet,
    store: Arc<dyn SessionStore>,
    llm: Arc<dyn LanguageModel>,
    audit: Arc<OptimizationAudit>,
    window: HistoryWindow,
}

impl Coordinator {
    pub fn new(
        agents: AgentSet,
        store: Arc<dyn SessionStore>,
        llm: Arc<dyn LanguageModel>,
        audit: Arc<OptimizationAudit>,
        window: HistoryWindow,
    ) -> Self {
        Self {
            agents,
            store,
            llm,
            audit,
            window,
        }
    }

    /// Wire the default collaborators from configuration: Gemini when a key
    /// is set, Postgres when a database URL is set, the seeded catalog.
    pub fn from_config(config: &AdvisorConfig) -> Result<Self> {
        let llm: Arc<dyn LanguageModel> = match &config.gemini_api_key {
            Some(key) => Arc::new(GeminiClient::new(key.clone(), config.gemini_model.clone())?),
            None => {
                info!("No GEMINI_API_KEY set, using deterministic parsing only");
                Arc::new(OfflineLanguageModel)
            }
        };
        let catalog = Arc::new(InMemoryCatalog::seeded());
        let agents = create_default_agents(llm.clone(), catalog, config);
        let window = HistoryWindow::with_config(WindowConfig {
            max_turns: config.history_window,
            ..WindowConfig::default()
        });

        Ok(Self::new(
            agents,
            build_session_store(config),
            llm,
            Arc::new(OptimizationAudit::new()),
            window,
        ))
    }


    /// Run one turn against `context` without touching the store.
    ///
    /// User-facing agent errors become the reply; fatal errors propagate.
    pub async fn step(&self, mut context: Context, message: &str) -> Result<TurnOutcome> {
        let route = route(&context, message);
        info!(session_id = %context.session_id, route = ?route, "Routing decision");

        let mut agents = Vec::new();
        let mut replies = Vec::new();
        let mut new_allocation = false;

        match route {
            Route::Direct => replies.push(self.answer_directly(&context, message).await),
            Route::Dispatch(first) => {
                let mut next = Some(first);
                let mut input = message;

                while let Some(kind) = next {
                    agents.push(kind);
                    let dispatched = self.dispatch(kind, &mut context, input).await?;
                    replies.push(dispatched.reply);

                    if !dispatched.done {
                        break;
                    }
                    if kind == AgentKind::Optimization {
                        new_allocation = true;
                    }

                    // agents that need no input run now instead of waiting for another message
                    next = next_pending(&context).filter(|k| {
                        k.is_input_free() && !agents.contains(k) && agents.len() <= MAX_AUTO_ADVANCE
                    });
                    if let Some(k) = next {
                        debug!(session_id = %context.session_id, agent = %k, "Auto-advancing");
                    }
                    input = "";
                }
            }
        }

        let reply = replies.join("\n\n");
        context.turn_history.push(Turn::user(message));
        context
            .turn_history
            .push(Turn::assistant(reply.clone(), agents.last().copied()));

        Ok(TurnOutcome {
            optimization_triggered: agents.contains(&AgentKind::Optimization),
            agents,
            reply,
            context,
            new_allocation,
        })
    }

    async fn dispatch(
        &self,
        kind: AgentKind,
        context: &mut Context,
        message: &str,
    ) -> Result<Dispatched> {
        let agent = self.agents.get(kind)?;

        match agent.handle(context, message).await {
            Ok(result) => {
                let fields = context.apply(kind, result.patch)?;
                info!(
                    session_id = %context.session_id,
                    agent = %kind,
                    done = result.done,
                    fields = ?fields,
                    "Agent handled message"
                );
                Ok(Dispatched {
                    reply: result.reply,
                    done: result.done,
                })
            }
            Err(e) if e.is_user_facing() => {
                warn!(session_id = %context.session_id, agent = %kind, error = %e, "Agent failed");
                Ok(Dispatched {
                    reply: e.user_message(),
                    done: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn answer_directly(&self, context: &Context, message: &str) -> String {
        let request = LlmRequest::new(
            format!("{}\n\n{}", DIRECT_PROMPT, context.summary()),
            message,
        )
        .with_history(self.window.select(&context.turn_history));

        match self.llm.complete(&request).await {
            Ok(LlmResponse::Reply(text)) if !text.trim().is_empty() => text,
            Ok(_) => static_summary(context),
            Err(e) => {
                debug!(session_id = %context.session_id, error = %e, "Direct answer falling back to summary");
                static_summary(context)
            }
        }
    }

    /// Load (or start) the session, run one turn and persist it
    pub async fn chat(&self, session_id: &str, message: &str) -> Result<ChatResponse> {
        let context = self
            .store
            .load(session_id)
            .await?
            .unwrap_or_else(|| Context::new(session_id));

        let outcome = self.step(context, message).await?;
        let turn = TurnRecord::new(
            session_id,
            message,
            &outcome.reply,
            outcome.agents.clone(),
            outcome.optimization_triggered,
        );
        self.persist(session_id, &outcome.context, &turn).await?;

        let portfolio = if outcome.new_allocation {
            self.record_audit(&outcome.context).await?;
            outcome.context.optimization_result.clone()
        } else {
            None
        };

        Ok(ChatResponse {
            session_id: session_id.to_string(),
            agent: outcome.agents.last().copied(),
            reply: outcome.reply,
            optimization_triggered: outcome.optimization_triggered,
            portfolio,
        })
    }

    /// Run the optimization for an existing session outside the chat flow.
    /// A context that fails validation comes back as `Validation`.
    pub async fn optimize(&self, session_id: &str) -> Result<PortfolioAllocation> {
        let mut context = self
            .store
            .load(session_id)
            .await?
            .ok_or_else(|| AdvisorError::SessionNotFound(session_id.to_string()))?;

        let agent = self.agents.get(AgentKind::Optimization)?;
        let result = agent.handle(&context, "").await?;
        if !result.done {
            return Err(AdvisorError::Validation(result.reply));
        }

        context.apply(AgentKind::Optimization, result.patch)?;
        context
            .turn_history
            .push(Turn::assistant(result.reply.clone(), Some(AgentKind::Optimization)));

        let turn = TurnRecord::new(session_id, "", &result.reply, vec![AgentKind::Optimization], true);
        self.persist(session_id, &context, &turn).await?;
        self.record_audit(&context).await?;

        context
            .optimization_result
            .ok_or_else(|| AdvisorError::Internal("optimization finished without a result".to_string()))
    }

    pub async fn reset(&self, session_id: &str) -> Result<()> {
        info!(session_id = %session_id, "Session reset");
        self.store.clear(session_id).await
    }

    /// Stored context, or an empty one for an unknown session
    pub async fn payload(&self, session_id: &str) -> Result<Context> {
        Ok(self
            .store
            .load(session_id)
            .await?
            .unwrap_or_else(|| Context::new(session_id)))
    }

    /// Optimizations recorded for the session, oldest first, each checked
    /// against the session's stored inputs
    pub async fn audit_trail(&self, session_id: &str) -> Result<Vec<AuditEntry>> {
        let context = self.payload(session_id).await?;
        let mut entries = Vec::new();
        for record in self.audit.list_for_session(session_id).await? {
            let matches_current_context = self.audit.verify_integrity(record.id, &context).await?;
            entries.push(AuditEntry {
                record,
                matches_current_context,
            });
        }
        Ok(entries)
    }

    pub async fn turns(&self, session_id: &str) -> Result<Vec<TurnRecord>> {
        self.store.turns(session_id).await
    }

    /// Save, retrying once. The turn id makes the retry safe.
    async fn persist(&self, session_id: &str, context: &Context, turn: &TurnRecord) -> Result<()> {
        match self.store.save(session_id, context, turn).await {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(session_id = %session_id, error = %first, "Session save failed, retrying once");
                self.store.save(session_id, context, turn).await
            }
        }
    }

    async fn record_audit(&self, context: &Context) -> Result<()> {
        if let Some(record) = OptimizationRecord::from_context(context) {
            let id = self.audit.record(record).await?;
            info!(session_id = %context.session_id, audit_id = %id, "Optimization recorded");
        }
        Ok(())
    }
}

fn static_summary(context: &Context) -> String {
    format!(
        "Here is where things stand:\n{}\n\nSay \"rerun\" if you'd like me to optimize again.",
        context.summary()
    )
}
