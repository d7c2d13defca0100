//! Currency agent: INR or USD

use super::{geography, risk, sentence, with_notes, Agent, AgentResult, Extraction, SlotExtractor};
use crate::context::{AgentKind, Context};
use crate::error::AdvisorError;
use crate::models::Currency;
use crate::slots;
use crate::tools::{SetCurrencyTool, ToolRegistry};
use crate::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const INSTRUCTIONS: &str = "Find out whether the investor wants to invest in Indian Rupees (INR, Indian mutual funds) \
or US Dollars (USD, funds across global markets). Call set_currency only when the choice is clear.";

pub const CURRENCY_QUESTION: &str = "Would you like to invest in Indian Rupees (INR) or US Dollars (USD)? \
INR portfolios hold Indian mutual funds; USD portfolios can hold funds from the USA, India, Japan, Europe, the UK and China.";

pub struct CurrencyAgent {
    extractor: Arc<SlotExtractor>,
    tools: ToolRegistry,
}

impl CurrencyAgent {
    pub fn new(extractor: Arc<SlotExtractor>) -> Self {
        Self {
            extractor,
            tools: ToolRegistry::new().with_tool(Arc::new(SetCurrencyTool)),
        }
    }
}

#[async_trait::async_trait]
impl Agent for CurrencyAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Currency
    }

    async fn handle(&self, context: &Context, message: &str) -> Result<AgentResult> {
        let (name, arguments) = match slots::extract_currency(message) {
            Some(currency) => ("set_currency".to_string(), json!({ "currency": currency.to_string() })),
            None => match self
                .extractor
                .extract(self.kind(), INSTRUCTIONS, context, message, &self.tools)
                .await
            {
                Extraction::ToolCall { name, arguments } => (name, arguments),
                Extraction::Reply(text) => return Ok(AgentResult::follow_up(text)),
                Extraction::Nothing => return Ok(AgentResult::follow_up(CURRENCY_QUESTION)),
            },
        };

        let outcome = match self.tools.invoke(&name, context, &arguments) {
            Ok(outcome) => outcome,
            Err(e) if e.is_user_facing() => {
                return Ok(AgentResult::follow_up(format!("{} {}", sentence(&e), CURRENCY_QUESTION)))
            }
            Err(e) => return Err(e),
        };

        let currency = outcome
            .patch
            .currency
            .ok_or_else(|| AdvisorError::Internal("set_currency produced no currency".to_string()))?;
        info!(session_id = %context.session_id, currency = %currency, "Currency chosen");

        let (reply, next) = match currency {
            Currency::Inr => (
                format!(
                    "Great, we'll build an INR portfolio of Indian mutual funds.\n\n{}",
                    risk::SCENARIO_QUESTION
                ),
                AgentKind::RiskAssessment,
            ),
            Currency::Usd => (
                format!("Great, a USD portfolio it is.\n\n{}", geography::MARKETS_QUESTION),
                AgentKind::Geography,
            ),
        };

        Ok(AgentResult::completed(
            with_notes(reply, &outcome.notes),
            outcome.patch,
            Some(next),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmResponse, OfflineLanguageModel, ScriptedLanguageModel};
    use crate::memory::HistoryWindow;

    fn offline_agent() -> CurrencyAgent {
        CurrencyAgent::new(Arc::new(SlotExtractor::new(
            Arc::new(OfflineLanguageModel),
            HistoryWindow::new(),
        )))
    }

    #[tokio::test]
    async fn test_growth_message_asks_for_currency() {
        let result = offline_agent()
            .handle(&Context::new("s"), "I want to invest for growth")
            .await
            .unwrap();

        assert!(!result.done);
        assert!(result.patch.is_empty());
        assert_eq!(result.reply, CURRENCY_QUESTION);
    }

    #[tokio::test]
    async fn test_usd_moves_to_geography() {
        let result = offline_agent()
            .handle(&Context::new("s"), "dollars please")
            .await
            .unwrap();

        assert!(result.done);
        assert_eq!(result.patch.currency, Some(Currency::Usd));
        assert_eq!(result.next_hint, Some(AgentKind::Geography));
        assert!(result.reply.contains("Which markets"));
    }

    #[tokio::test]
    async fn test_invalid_model_arguments_are_not_trusted() {
        let model = Arc::new(ScriptedLanguageModel::new(vec![LlmResponse::ToolCall {
            name: "set_currency".into(),
            arguments: json!({"currency": "GBP"}),
        }]));
        let agent = CurrencyAgent::new(Arc::new(SlotExtractor::new(model, HistoryWindow::new())));

        let result = agent.handle(&Context::new("s"), "pounds sterling").await.unwrap();
        assert!(!result.done);
        assert!(result.patch.is_empty());
    }

    #[tokio::test]
    async fn test_model_resolves_indirect_answer() {
        let model = Arc::new(ScriptedLanguageModel::new(vec![LlmResponse::ToolCall {
            name: "set_currency".into(),
            arguments: json!({"currency": "INR"}),
        }]));
        let agent = CurrencyAgent::new(Arc::new(SlotExtractor::new(model, HistoryWindow::new())));

        let result = agent
            .handle(&Context::new("s"), "I live in Mumbai and earn locally")
            .await
            .unwrap();
        assert_eq!(result.patch.currency, Some(Currency::Inr));
        assert_eq!(result.next_hint, Some(AgentKind::RiskAssessment));
    }
}
