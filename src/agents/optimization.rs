//! Optimization agent
//!
//! Validates the context, then runs the engine off the async runtime under a
//! timeout. Nothing is written unless a full allocation comes back.

use super::{Agent, AgentResult};
use crate::catalog::FundCatalog;
use crate::context::{AgentKind, Context, ContextPatch};
use crate::error::AdvisorError;
use crate::models::{FundRecord, PortfolioAllocation};
use crate::optimizer::{optimize_for_bucket, Constraints, OptimizationProblem, SolverSettings};
use crate::validation::{create_default_validator, ContextValidator, ValidationInput};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct OptimizationAgent {
    catalog: Arc<dyn FundCatalog>,
    settings: SolverSettings,
    timeout: Duration,
    validator: ContextValidator,
}

impl OptimizationAgent {
    pub fn new(catalog: Arc<dyn FundCatalog>, settings: SolverSettings, timeout: Duration) -> Self {
        Self {
            catalog,
            settings,
            timeout,
            validator: create_default_validator(),
        }
    }

    /// Resolve the selected funds and run every validation rule.
    /// Fails with `Validation` naming each problem found.
    pub async fn prepare(&self, context: &Context) -> Result<Vec<FundRecord>> {
        let mut funds = Vec::with_capacity(context.selected_funds.len());
        let mut unresolved = Vec::new();
        for id in &context.selected_funds {
            match self.catalog.get(id).await? {
                Some(fund) => funds.push(fund),
                None => unresolved.push(id.clone()),
            }
        }

        self.validator
            .validate(&ValidationInput {
                context,
                funds: &funds,
                unresolved: &unresolved,
            })
            .into_result()?;

        Ok(funds)
    }

    async fn solve(
        &self,
        context: &Context,
        funds: Vec<FundRecord>,
    ) -> Result<PortfolioAllocation> {
        let bucket = context
            .risk_bucket
            .ok_or_else(|| AdvisorError::Internal("validated context lost its risk bucket".to_string()))?;
        let problem = OptimizationProblem::new(funds)?;
        let constraints = Constraints::new(problem.funds.len(), context.asset_split.clone());
        let settings = self.settings;

        let started = Instant::now();
        // A timed-out solve keeps running until its iteration caps stop it;
        // its result is dropped with the task handle.
        let task = tokio::task::spawn_blocking(move || {
            optimize_for_bucket(&problem, &constraints, bucket, &settings)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => {
                warn!(
                    session_id = %context.session_id,
                    timeout_secs = self.timeout.as_secs(),
                    "Optimization timed out"
                );
                Err(AdvisorError::OptimizationTimeout(self.timeout.as_secs()))
            }
            Ok(Err(join_error)) => Err(AdvisorError::Internal(format!(
                "optimization task failed: {}",
                join_error
            ))),
            Ok(Ok(result)) => {
                info!(
                    session_id = %context.session_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    ok = result.is_ok(),
                    "Optimization finished"
                );
                result
            }
        }
    }
}

#[async_trait::async_trait]
impl Agent for OptimizationAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Optimization
    }

    async fn handle(&self, context: &Context, _message: &str) -> Result<AgentResult> {
        let funds = match self.prepare(context).await {
            Ok(funds) => funds,
            Err(e @ AdvisorError::Validation(_)) => {
                info!(session_id = %context.session_id, reason = %e, "Optimization blocked by validation");
                return Ok(AgentResult::follow_up(e.user_message()));
            }
            Err(e) => return Err(e),
        };
        let names: HashMap<String, (String, String)> = funds
            .iter()
            .map(|f| (f.id.clone(), (f.name.clone(), f.category.to_string())))
            .collect();

        let allocation = self.solve(context, funds).await?;
        let reply = render(&allocation, &names, context);

        Ok(AgentResult::completed(
            reply,
            ContextPatch {
                optimization_result: Some(allocation),
                ..ContextPatch::default()
            },
            None,
        ))
    }
}

fn render(
    allocation: &PortfolioAllocation,
    names: &HashMap<String, (String, String)>,
    context: &Context,
) -> String {
    let mut out = format!("### Your optimized portfolio ({})\n\n", allocation.objective);
    out.push_str("| Fund | Category | Weight |\n");
    out.push_str("|------|----------|--------|\n");

    for entry in allocation.weights.iter().filter(|w| w.weight > 0.0) {
        let (name, category) = names
            .get(&entry.fund_id)
            .cloned()
            .unwrap_or_else(|| (entry.fund_id.clone(), String::new()));
        out.push_str(&format!("| {} | {} | {:.1}% |\n", name, category, entry.weight * 100.0));
    }

    let volatility_pct = allocation.volatility * 100.0;
    out.push_str(&format!(
        "\nExpected return {:.2}% a year, volatility {:.2}%.",
        allocation.expected_return * 100.0,
        volatility_pct
    ));

    if let Some(targets) = &context.sub_risk_targets {
        out.push_str(&describe_volatility(volatility_pct, targets.target_volatility_pct));
    }

    out.push_str(" Say \"rerun\" any time to optimize again.");
    out
}

/// Within half a point over the target reads as "close to", not "within"
fn describe_volatility(volatility_pct: f64, target_pct: f64) -> String {
    if volatility_pct <= target_pct {
        format!(" That is within your {:.0}% volatility target.", target_pct)
    } else if volatility_pct <= target_pct + 0.5 {
        format!(" That is close to your {:.0}% volatility target.", target_pct)
    } else {
        format!(
            " That is above your {:.0}% volatility target; the asset split sets most of the risk.",
            target_pct
        )
    }
}
