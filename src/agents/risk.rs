//! Risk assessment agent
//!
//! The bucket is inferred from a market-fall scenario, never asked directly.

use super::{sentence, sub_risk, with_notes, Agent, AgentResult, Extraction, SlotExtractor};
use crate::context::{AgentKind, Context};
use crate::error::AdvisorError;
use crate::models::Currency;
use crate::slots;
use crate::tools::{SetRiskProfileTool, ToolRegistry};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

const INSTRUCTIONS: &str = "The investor was asked what they would do if their portfolio fell 30% in a month: \
(A) sell, (B) hold, or (C) buy more, or what the largest drop they could tolerate is. \
Call set_risk_profile with max_drop_pct and/or scenario_choice taken from their answer. \
Set tax_saving only if they ask for tax-saving (ELSS / 80C) funds.";

pub const SCENARIO_QUESTION: &str = "Imagine your portfolio fell 30% in a single month. Would you \
(A) sell to avoid further losses, (B) hold and wait for a recovery, or (C) buy more while prices are low? \
You can also tell me the largest drop you could live with, for example \"20%\".";

pub struct RiskAssessmentAgent {
    extractor: Arc<SlotExtractor>,
    tools: ToolRegistry,
}

impl RiskAssessmentAgent {
    pub fn new(extractor: Arc<SlotExtractor>) -> Self {
        Self {
            extractor,
            tools: ToolRegistry::new().with_tool(Arc::new(SetRiskProfileTool)),
        }
    }
}

/// INR investors who mentioned tax saving anywhere in the conversation
fn wants_tax_saving(context: &Context, message: &str) -> bool {
    context.currency == Some(Currency::Inr)
        && (slots::mentions_tax_saving(message)
            || context.turn_history.user_mentions(slots::mentions_tax_saving))
}

#[async_trait::async_trait]
impl Agent for RiskAssessmentAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::RiskAssessment
    }

    async fn handle(&self, context: &Context, message: &str) -> Result<AgentResult> {
        let tax_saving = wants_tax_saving(context, message);
        let drop_pct = slots::extract_percent(message);
        let choice = slots::extract_scenario_choice(message);

        let mut arguments = if drop_pct.is_some() || choice.is_some() {
            json!({ "max_drop_pct": drop_pct, "scenario_choice": choice })
        } else {
            match self
                .extractor
                .extract(self.kind(), INSTRUCTIONS, context, message, &self.tools)
                .await
            {
                Extraction::ToolCall { arguments, .. } => arguments,
                Extraction::Reply(text) => return Ok(AgentResult::follow_up(text)),
                Extraction::Nothing => {
                    return Ok(AgentResult::follow_up(format!(
                        "I couldn't tell how you'd react from that. {}",
                        SCENARIO_QUESTION
                    )))
                }
            }
        };
        if tax_saving {
            if let Value::Object(map) = &mut arguments {
                map.insert("tax_saving".to_string(), Value::Bool(true));
            }
        }

        let outcome = match self.tools.invoke("set_risk_profile", context, &arguments) {
            Ok(outcome) => outcome,
            Err(e) if e.is_user_facing() => {
                return Ok(AgentResult::follow_up(format!("{} {}", sentence(&e), SCENARIO_QUESTION)))
            }
            Err(e) => return Err(e),
        };

        let bucket = outcome
            .patch
            .risk_bucket
            .ok_or_else(|| AdvisorError::Internal("set_risk_profile produced no bucket".to_string()))?;
        let counts = outcome.patch.fund_count_targets.clone().unwrap_or_default();
        let split = outcome.patch.asset_split.clone().unwrap_or_default();
        info!(
            session_id = %context.session_id,
            bucket = %bucket,
            drop_pct = ?drop_pct,
            choice = ?choice,
            tax_saving,
            "Risk bucket inferred"
        );

        let total: u32 = counts.values().sum();
        let count_text: Vec<String> = counts
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(category, n)| format!("{} {}", n, category))
            .collect();
        let split_text: Vec<String> = split
            .iter()
            .map(|(class, w)| format!("{} {:.0}%", class, w * 100.0))
            .collect();

        let reply = format!(
            "Thanks. That puts you in the {} risk bucket. I'll build a portfolio of {} funds ({}) \
             with a target split of {}.\n\n{}",
            bucket,
            total,
            count_text.join(", "),
            split_text.join(", "),
            sub_risk::refinement_question(bucket)
        );

        Ok(AgentResult::completed(
            with_notes(reply, &outcome.notes),
            outcome.patch,
            Some(AgentKind::SubRisk),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::OfflineLanguageModel;
    use crate::memory::{HistoryWindow, Turn};
    use crate::models::{AssetClass, FundCategory, RiskBucket};

    fn agent() -> RiskAssessmentAgent {
        RiskAssessmentAgent::new(Arc::new(SlotExtractor::new(
            Arc::new(OfflineLanguageModel),
            HistoryWindow::new(),
        )))
    }

    fn context(currency: Currency) -> Context {
        let mut context = Context::new("s");
        context.currency = Some(currency);
        context
    }

    #[tokio::test]
    async fn test_scenario_answers_map_to_buckets() {
        let cases = vec![
            ("A", RiskBucket::Low),
            ("I'd hold", RiskBucket::Medium),
            ("buy more!", RiskBucket::High),
            ("I could handle a 10% drop", RiskBucket::Low),
            ("maybe 45%", RiskBucket::High),
        ];

        for (message, expected) in cases {
            let result = agent().handle(&context(Currency::Usd), message).await.unwrap();
            assert_eq!(result.patch.risk_bucket, Some(expected), "{}", message);
            assert!(result.patch.fund_count_targets.is_some());
            assert!(result.patch.asset_split.is_some());
        }
    }

    #[tokio::test]
    async fn test_high_bucket_favours_mid_and_small_caps() {
        let result = agent().handle(&context(Currency::Usd), "C").await.unwrap();
        let counts = result.patch.fund_count_targets.unwrap();

        assert_eq!(counts[&FundCategory::MidCap], 3);
        assert_eq!(counts[&FundCategory::SmallCap], 3);
        assert_eq!(counts[&FundCategory::Debt], 1);
        assert_eq!(result.next_hint, Some(AgentKind::SubRisk));
        assert!(result.reply.contains("HIGH"));
    }

    #[tokio::test]
    async fn test_tax_saving_from_earlier_turn() {
        let mut inr = context(Currency::Inr);
        inr.turn_history.push(Turn::user("rupees, and I want to save tax under 80C"));

        let result = agent().handle(&inr, "B").await.unwrap();
        let split = result.patch.asset_split.unwrap();
        assert!((split[&AssetClass::TaxSaver] - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_unclear_answer_repeats_scenario() {
        let result = agent().handle(&context(Currency::Usd), "not sure what you mean").await.unwrap();
        assert!(!result.done);
        assert!(result.patch.is_empty());
        assert!(result.reply.contains(SCENARIO_QUESTION));
    }
}
