//! Geography agent: markets for USD portfolios

use super::{risk, sentence, with_notes, Agent, AgentResult, Extraction, SlotExtractor};
use crate::classifier::MessageClassifier;
use crate::context::{AgentKind, Context};
use crate::error::AdvisorError;
use crate::models::{Currency, Geography, GeographyAllocation};
use crate::slots;
use crate::tools::{SetGeographyTool, ToolRegistry};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

const INSTRUCTIONS: &str = "Find out which markets the USD investor wants: any of USA, India, Japan, Europe, UK, China, \
in the order they mention them, with percentages only if they give them. Call set_geography when at least one market is named.";

pub const MARKETS_QUESTION: &str = "Which markets would you like to invest in? You can pick any of USA, India, Japan, \
Europe, UK and China, and add percentages if you like (for example \"60% USA, 40% India\").";

const DEFAULT_MARKET: Geography = Geography::Usa;

pub struct GeographyAgent {
    extractor: Arc<SlotExtractor>,
    tools: ToolRegistry,
}

impl GeographyAgent {
    pub fn new(extractor: Arc<SlotExtractor>) -> Self {
        Self {
            extractor,
            tools: ToolRegistry::new().with_tool(Arc::new(SetGeographyTool)),
        }
    }

    fn default_arguments() -> Value {
        json!({ "geographies": [{ "name": DEFAULT_MARKET.to_string() }] })
    }
}

#[async_trait::async_trait]
impl Agent for GeographyAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Geography
    }

    async fn handle(&self, context: &Context, message: &str) -> Result<AgentResult> {
        if context.currency != Some(Currency::Usd) {
            return Err(AdvisorError::Internal(
                "geography agent dispatched without a USD portfolio".to_string(),
            ));
        }

        // the currency reply asked once already; after one more miss we default
        let already_asked = context.turn_history.replies_from(self.kind()) > 0;
        let mentions = slots::extract_geographies(message);

        let (arguments, defaulted) = if !mentions.is_empty() {
            let list: Vec<Value> = mentions
                .iter()
                .map(|m| json!({ "name": m.geography.to_string(), "percent": m.percent }))
                .collect();
            (json!({ "geographies": list }), false)
        } else if MessageClassifier::defers_to_default(message) {
            (Self::default_arguments(), true)
        } else {
            match self
                .extractor
                .extract(self.kind(), INSTRUCTIONS, context, message, &self.tools)
                .await
            {
                Extraction::ToolCall { arguments, .. } => (arguments, false),
                _ if already_asked => (Self::default_arguments(), true),
                Extraction::Reply(text) => return Ok(AgentResult::follow_up(text)),
                Extraction::Nothing => {
                    return Ok(AgentResult::follow_up(format!(
                        "I didn't catch which markets you'd like. {}",
                        MARKETS_QUESTION
                    )))
                }
            }
        };

        let outcome = match self.tools.invoke("set_geography", context, &arguments) {
            Ok(outcome) => outcome,
            Err(e) if e.is_user_facing() => {
                return Ok(AgentResult::follow_up(format!("{} {}", sentence(&e), MARKETS_QUESTION)))
            }
            Err(e) => return Err(e),
        };

        let allocations = outcome.patch.geography_constraints.clone().unwrap_or_default();
        info!(
            session_id = %context.session_id,
            markets = ?allocations.iter().map(|a| a.geography).collect::<Vec<_>>(),
            defaulted,
            "Markets chosen"
        );

        let opening = if defaulted {
            format!("No problem, I'll focus on the {} market.", DEFAULT_MARKET)
        } else {
            format!("Got it: {}.", describe(&allocations))
        };

        Ok(AgentResult::completed(
            with_notes(format!("{}\n\n{}", opening, risk::SCENARIO_QUESTION), &outcome.notes),
            outcome.patch,
            Some(AgentKind::RiskAssessment),
        ))
    }
}

fn describe(allocations: &[GeographyAllocation]) -> String {
    allocations
        .iter()
        .map(|a| format!("{} {:.0}%", a.geography, a.share * 100.0))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::OfflineLanguageModel;
    use crate::memory::{HistoryWindow, Turn};

    fn agent() -> GeographyAgent {
        GeographyAgent::new(Arc::new(SlotExtractor::new(
            Arc::new(OfflineLanguageModel),
            HistoryWindow::new(),
        )))
    }

    fn usd_context() -> Context {
        let mut context = Context::new("s");
        context.currency = Some(Currency::Usd);
        context
    }

    #[tokio::test]
    async fn test_usa_and_india() {
        let result = agent().handle(&usd_context(), "USA and India").await.unwrap();
        let geographies = result.patch.geography_constraints.unwrap();

        assert_eq!(geographies.len(), 2);
        assert_eq!(geographies[0].geography, Geography::Usa);
        assert_eq!(geographies[1].geography, Geography::India);
        assert_eq!(result.next_hint, Some(AgentKind::RiskAssessment));
        assert!(result.reply.contains("USA 50%, India 50%"));
    }

    #[tokio::test]
    async fn test_decline_defaults_to_usa() {
        let result = agent().handle(&usd_context(), "no preference").await.unwrap();
        let geographies = result.patch.geography_constraints.unwrap();

        assert_eq!(geographies.len(), 1);
        assert_eq!(geographies[0].geography, Geography::Usa);
        assert_eq!(geographies[0].share, 1.0);
    }

    #[tokio::test]
    async fn test_unclear_answer_asks_once_then_defaults() {
        let mut context = usd_context();
        let first = agent().handle(&context, "hmm, what do you think?").await.unwrap();
        assert!(!first.done);
        assert!(first.patch.is_empty());

        context.turn_history.push(Turn::user("hmm, what do you think?"));
        context
            .turn_history
            .push(Turn::assistant(first.reply, Some(AgentKind::Geography)));

        let second = agent().handle(&context, "still thinking").await.unwrap();
        assert!(second.done);
        assert_eq!(second.patch.geography_constraints.unwrap()[0].geography, Geography::Usa);
    }

    #[tokio::test]
    async fn test_inr_context_is_a_programming_error() {
        let mut context = Context::new("s");
        context.currency = Some(Currency::Inr);
        let result = agent().handle(&context, "USA").await;
        assert!(matches!(result, Err(AdvisorError::Internal(_))));
    }
}
