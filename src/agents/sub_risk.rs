//! Sub-risk refinement agent
//!
//! At most one follow-up question; after that the bucket medians are used.

use super::{sentence, with_notes, Agent, AgentResult, Extraction, SlotExtractor};
use crate::classifier::MessageClassifier;
use crate::context::{AgentKind, Context};
use crate::error::AdvisorError;
use crate::models::RiskBucket;
use crate::slots;
use crate::tools::{RefineSubRiskTool, ToolRegistry};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

const INSTRUCTIONS: &str = "The investor may fine-tune risk inside their bucket. Extract a target yearly volatility \
and/or a maximum drawdown in percent, or a position in the range (LOW, MEDIUM, HIGH). If they are happy with the \
defaults call refine_sub_risk with accept_defaults=true.";

/// Question asked once the bucket is known
pub fn refinement_question(bucket: RiskBucket) -> String {
    let (vol_low, vol_high) = bucket.volatility_bounds();
    let (dd_low, dd_high) = bucket.drawdown_bounds();
    format!(
        "Would you like to fine-tune your risk? For a {} profile, yearly volatility usually ranges from \
         {:.0}% to {:.0}% and the worst fall from {:.0}% to {:.0}%. Give me a target (for example \
         \"volatility {:.0}%\"), choose the lower end, middle or upper end, or say \"use defaults\".",
        bucket,
        vol_low,
        vol_high,
        dd_low,
        dd_high,
        (vol_low + vol_high) / 2.0
    )
}

pub struct SubRiskAgent {
    extractor: Arc<SlotExtractor>,
    tools: ToolRegistry,
}

impl SubRiskAgent {
    pub fn new(extractor: Arc<SlotExtractor>) -> Self {
        Self {
            extractor,
            tools: ToolRegistry::new().with_tool(Arc::new(RefineSubRiskTool)),
        }
    }
}

#[async_trait::async_trait]
impl Agent for SubRiskAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::SubRisk
    }

    async fn handle(&self, context: &Context, message: &str) -> Result<AgentResult> {
        let bucket = context.risk_bucket.ok_or_else(|| {
            AdvisorError::Internal("sub-risk agent dispatched before the risk bucket".to_string())
        })?;
        let follow_up_used = context.turn_history.replies_from(self.kind()) > 0;
        let defaults = json!({ "accept_defaults": true });

        let mention = slots::extract_sub_risk(message);
        let (arguments, defaulted): (Value, bool) = if !mention.is_empty() {
            (
                json!({
                    "level": mention.level,
                    "target_volatility_pct": mention.target_volatility_pct,
                    "target_drawdown_pct": mention.target_drawdown_pct,
                }),
                false,
            )
        } else if MessageClassifier::defers_to_default(message) {
            (defaults, true)
        } else {
            match self
                .extractor
                .extract(self.kind(), INSTRUCTIONS, context, message, &self.tools)
                .await
            {
                Extraction::ToolCall { arguments, .. } => (arguments, false),
                _ if follow_up_used => (defaults, true),
                Extraction::Reply(text) => return Ok(AgentResult::follow_up(text)),
                Extraction::Nothing => {
                    return Ok(AgentResult::follow_up(format!(
                        "Sorry, I didn't follow. {}",
                        refinement_question(bucket)
                    )))
                }
            }
        };

        let outcome = match self.tools.invoke("refine_sub_risk", context, &arguments) {
            Ok(outcome) => outcome,
            Err(e) if e.is_user_facing() && !follow_up_used => {
                return Ok(AgentResult::follow_up(format!(
                    "{} {}",
                    sentence(&e),
                    refinement_question(bucket)
                )))
            }
            Err(e) if e.is_user_facing() => {
                let medians = json!({ "accept_defaults": true });
                self.tools.invoke("refine_sub_risk", context, &medians)?
            }
            Err(e) => return Err(e),
        };

        let targets = outcome.patch.sub_risk_targets.ok_or_else(|| {
            AdvisorError::Internal("refine_sub_risk produced no targets".to_string())
        })?;
        info!(
            session_id = %context.session_id,
            level = ?targets.level,
            volatility = targets.target_volatility_pct,
            drawdown = targets.target_drawdown_pct,
            defaulted,
            "Risk targets set"
        );

        let opening = if defaulted {
            "I'll use the middle of your range."
        } else {
            "Thanks."
        };
        let reply = format!(
            "{} Targets: about {:.0}% yearly volatility and a worst fall of about {:.1}%. Now picking your funds.",
            opening, targets.target_volatility_pct, targets.target_drawdown_pct
        );

        Ok(AgentResult::completed(
            with_notes(reply, &outcome.notes),
            outcome.patch,
            Some(AgentKind::FundSelection),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::OfflineLanguageModel;
    use crate::memory::{HistoryWindow, Turn};
    use crate::models::{Currency, SubRiskLevel};

    fn agent() -> SubRiskAgent {
        SubRiskAgent::new(Arc::new(SlotExtractor::new(
            Arc::new(OfflineLanguageModel),
            HistoryWindow::new(),
        )))
    }

    fn context(bucket: RiskBucket) -> Context {
        let mut context = Context::new("s");
        context.currency = Some(Currency::Inr);
        context.risk_bucket = Some(bucket);
        context
    }

    #[tokio::test]
    async fn test_defaults_write_bucket_medians() {
        let result = agent().handle(&context(RiskBucket::High), "use defaults").await.unwrap();
        let targets = result.patch.sub_risk_targets.unwrap();

        assert_eq!(targets, RiskBucket::High.median_targets());
        assert_eq!(result.next_hint, Some(AgentKind::FundSelection));
    }

    #[tokio::test]
    async fn test_out_of_range_target_is_clamped() {
        let result = agent()
            .handle(&context(RiskBucket::Low), "volatility 35%")
            .await
            .unwrap();
        let targets = result.patch.sub_risk_targets.unwrap();

        assert_eq!(targets.target_volatility_pct, 20.0);
        assert!(result.reply.contains("outside the LOW range"));
    }

    #[tokio::test]
    async fn test_level_words() {
        let result = agent()
            .handle(&context(RiskBucket::Medium), "the lower end please")
            .await
            .unwrap();
        let targets = result.patch.sub_risk_targets.unwrap();
        assert_eq!(targets.level, SubRiskLevel::Low);
        assert_eq!(targets.target_volatility_pct, 20.0);
    }

    #[tokio::test]
    async fn test_single_follow_up_then_defaults() {
        let mut context = context(RiskBucket::Medium);
        let first = agent().handle(&context, "hmm").await.unwrap();
        assert!(!first.done);

        context.turn_history.push(Turn::user("hmm"));
        context
            .turn_history
            .push(Turn::assistant(first.reply, Some(AgentKind::SubRisk)));

        let second = agent().handle(&context, "no clue really").await.unwrap();
        assert!(second.done);
        assert_eq!(
            second.patch.sub_risk_targets.unwrap(),
            RiskBucket::Medium.median_targets()
        );
    }
}
