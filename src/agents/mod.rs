//! Specialized agents
//!
//! Each agent owns a slice of the context and turns one user message into a
//! reply plus a candidate patch. Deterministic parsing runs first; the
//! language model is only asked when parsing finds nothing, and whatever it
//! returns goes through the same tool validation.

pub mod currency;
pub mod fund_selection;
pub mod geography;
pub mod optimization;
pub mod risk;
pub mod sub_risk;

pub use currency::CurrencyAgent;
pub use fund_selection::FundSelectionAgent;
pub use geography::GeographyAgent;
pub use optimization::OptimizationAgent;
pub use risk::RiskAssessmentAgent;
pub use sub_risk::SubRiskAgent;

use crate::catalog::FundCatalog;
use crate::config::AdvisorConfig;
use crate::context::{AgentKind, Context, ContextPatch};
use crate::error::AdvisorError;
use crate::llm::{LanguageModel, LlmRequest, LlmResponse};
use crate::memory::{HistoryWindow, WindowConfig};
use crate::tools::ToolRegistry;
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// What an agent hands back to the coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResult {
    pub reply: String,
    pub patch: ContextPatch,
    /// The agent's slice of the context is complete
    pub done: bool,
    pub next_hint: Option<AgentKind>,
}

impl AgentResult {
    pub fn completed(
        reply: impl Into<String>,
        patch: ContextPatch,
        next_hint: Option<AgentKind>,
    ) -> Self {
        Self {
            reply: reply.into(),
            patch,
            done: true,
            next_hint,
        }
    }

    /// Reply only: a question back to the user, nothing written
    pub fn follow_up(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            patch: ContextPatch::empty(),
            done: false,
            next_hint: None,
        }
    }
}

#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    fn kind(&self) -> AgentKind;

    async fn handle(&self, context: &Context, message: &str) -> Result<AgentResult>;
}

/// Agents by kind
pub struct AgentSet {
    agents: HashMap<AgentKind, Arc<dyn Agent>>,
}

impl AgentSet {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.kind(), agent);
    }

    pub fn get(&self, kind: AgentKind) -> Result<Arc<dyn Agent>> {
        self.agents
            .get(&kind)
            .cloned()
            .ok_or_else(|| AdvisorError::Internal(format!("no agent registered for {}", kind)))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentSet {
    fn default() -> Self {
        Self::new()
    }
}

/// All six agents wired to the given collaborators
pub fn create_default_agents(
    llm: Arc<dyn LanguageModel>,
    catalog: Arc<dyn FundCatalog>,
    config: &AdvisorConfig,
) -> AgentSet {
    let extractor = Arc::new(SlotExtractor::new(
        llm,
        HistoryWindow::with_config(WindowConfig {
            max_turns: config.history_window,
            ..WindowConfig::default()
        }),
    ));

    let mut agents = AgentSet::new();
    agents.register(Arc::new(CurrencyAgent::new(extractor.clone())));
    agents.register(Arc::new(GeographyAgent::new(extractor.clone())));
    agents.register(Arc::new(RiskAssessmentAgent::new(extractor.clone())));
    agents.register(Arc::new(SubRiskAgent::new(extractor)));
    agents.register(Arc::new(FundSelectionAgent::new(catalog.clone())));
    agents.register(Arc::new(OptimizationAgent::new(
        catalog,
        config.solver,
        config.optimization_timeout,
    )));
    agents
}

//
// ================= Language-model extraction =================
//

/// Result of asking the language model about a message
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Arguments for one of the agent's own tools, not yet validated
    ToolCall { name: String, arguments: Value },
    /// The model answered in prose, usually a clarifying question
    Reply(String),
    Nothing,
}

pub struct SlotExtractor {
    llm: Arc<dyn LanguageModel>,
    window: HistoryWindow,
}

impl SlotExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>, window: HistoryWindow) -> Self {
        Self { llm, window }
    }

    /// Offer the agent's tools to the model. Model failures and calls to
    /// tools outside `tools` come back as `Nothing`.
    pub async fn extract(
        &self,
        agent: AgentKind,
        instructions: &str,
        context: &Context,
        message: &str,
        tools: &ToolRegistry,
    ) -> Extraction {
        if message.trim().is_empty() {
            return Extraction::Nothing;
        }

        let request = LlmRequest::new(system_prompt(instructions, context), message)
            .with_history(self.window.select(&context.turn_history))
            .with_tools(tools.schemas());

        match self.llm.complete(&request).await {
            Ok(LlmResponse::ToolCall { name, arguments }) if tools.get(&name).is_some() => {
                debug!(agent = %agent, tool = %name, "Language model requested tool");
                Extraction::ToolCall { name, arguments }
            }
            Ok(LlmResponse::ToolCall { name, .. }) => {
                warn!(agent = %agent, tool = %name, "Language model requested a tool this agent does not own");
                Extraction::Nothing
            }
            Ok(LlmResponse::Reply(text)) if !text.trim().is_empty() => Extraction::Reply(text),
            Ok(LlmResponse::Reply(_)) => Extraction::Nothing,
            Err(e) => {
                debug!(agent = %agent, model = %self.llm.name(), error = %e, "Language model unavailable");
                Extraction::Nothing
            }
        }
    }
}

fn system_prompt(instructions: &str, context: &Context) -> String {
    format!(
        "You are a friendly mutual fund portfolio advisor. Keep replies short.\n\n\
         What is known about the investor so far:\n{}\n\n\
         {}\n\
         If the investor's message contains the answer, call the tool with it. \
         Otherwise reply with one short clarifying question. Never invent values.",
        context.summary(),
        instructions
    )
}

/// Append tool notes to a reply
pub(crate) fn with_notes(reply: String, notes: &[String]) -> String {
    if notes.is_empty() {
        reply
    } else {
        format!("{}\n\n{}", notes.join(" "), reply)
    }
}

/// User-facing text for a recoverable tool error, as a sentence
pub(crate) fn sentence(error: &AdvisorError) -> String {
    let text = error.user_message();
    let mut chars = text.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    };
    if capitalized.ends_with('.') {
        capitalized
    } else {
        format!("{}.", capitalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLanguageModel;
    use crate::tools::SetCurrencyTool;
    use serde_json::json;

    fn extractor(responses: Vec<LlmResponse>) -> (SlotExtractor, Arc<ScriptedLanguageModel>) {
        let model = Arc::new(ScriptedLanguageModel::new(responses));
        (SlotExtractor::new(model.clone(), HistoryWindow::new()), model)
    }

    #[tokio::test]
    async fn test_extractor_passes_own_tool_calls() {
        let (extractor, model) = extractor(vec![LlmResponse::ToolCall {
            name: "set_currency".into(),
            arguments: json!({"currency": "INR"}),
        }]);
        let tools = ToolRegistry::new().with_tool(Arc::new(SetCurrencyTool));

        let result = extractor
            .extract(AgentKind::Currency, "ask", &Context::new("s"), "rupee please", &tools)
            .await;

        assert!(matches!(result, Extraction::ToolCall { ref name, .. } if name == "set_currency"));
        let request = &model.requests()[0];
        assert_eq!(request.tools.len(), 1);
        assert!(request.system_prompt.contains("currency: unset"));
    }

    #[tokio::test]
    async fn test_extractor_drops_foreign_tools_and_failures() {
        let (extractor, _) = extractor(vec![LlmResponse::ToolCall {
            name: "set_risk_profile".into(),
            arguments: json!({}),
        }]);
        let tools = ToolRegistry::new().with_tool(Arc::new(SetCurrencyTool));
        let context = Context::new("s");

        let first = extractor.extract(AgentKind::Currency, "", &context, "hi", &tools).await;
        assert_eq!(first, Extraction::Nothing);
        // script exhausted
        let second = extractor.extract(AgentKind::Currency, "", &context, "hi", &tools).await;
        assert_eq!(second, Extraction::Nothing);
    }

    #[test]
    fn test_sentence_formatting() {
        let error = AdvisorError::AmbiguousInput("no markets were named".into());
        assert_eq!(sentence(&error), "No markets were named.");
    }
}
