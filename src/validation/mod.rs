//! Pre-optimization validation
//!
//! Rules-based checks that the context is complete and internally consistent
//! before the optimization engine is invoked. Deterministic and synchronous.

use crate::error::AdvisorError;
use crate::models::{AssetClass, Currency, FundRecord};
use crate::context::Context;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

/// Allowed drift of the asset split total from 1
pub const SPLIT_TOLERANCE: f64 = 1e-6;

/// What the rules look at: the context and its selected funds as resolved
/// against the catalog
pub struct ValidationInput<'a> {
    pub context: &'a Context,
    pub funds: &'a [FundRecord],
    /// Selected ids the catalog does not know
    pub unresolved: &'a [String],
}

/// Trait for validation rules
pub trait ContextRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, input: &ValidationInput<'_>) -> RuleOutcome;
}

pub struct RuleOutcome {
    pub passed: bool,
    pub details: String,
}

impl RuleOutcome {
    fn pass() -> Self {
        Self {
            passed: true,
            details: "ok".to_string(),
        }
    }

    fn fail(details: impl Into<String>) -> Self {
        Self {
            passed: false,
            details: details.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleCheck {
    pub rule_name: String,
    pub passed: bool,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub checks: Vec<RuleCheck>,
    pub issues: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl ValidationReport {
    /// `Validation` error listing every failed rule
    pub fn into_result(self) -> Result<()> {
        if self.passed {
            Ok(())
        } else {
            Err(AdvisorError::Validation(self.issues.join("; ")))
        }
    }
}

/// Validator that runs every rule, never stopping at the first failure
pub struct ContextValidator {
    rules: Vec<Box<dyn ContextRule>>,
}

impl ContextValidator {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn ContextRule>) {
        self.rules.push(rule);
    }

    pub fn validate(&self, input: &ValidationInput<'_>) -> ValidationReport {
        let mut checks = Vec::with_capacity(self.rules.len());
        let mut issues = Vec::new();

        for rule in &self.rules {
            let outcome = rule.check(input);
            if !outcome.passed {
                issues.push(outcome.details.clone());
            }
            checks.push(RuleCheck {
                rule_name: rule.name().to_string(),
                passed: outcome.passed,
                details: outcome.details,
            });
        }

        let passed = issues.is_empty();
        info!(
            session_id = %input.context.session_id,
            rule_count = self.rules.len(),
            passed,
            "Context validation completed"
        );

        ValidationReport {
            passed,
            checks,
            issues,
            checked_at: Utc::now(),
        }
    }
}

impl Default for ContextValidator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn create_default_validator() -> ContextValidator {
    let mut validator = ContextValidator::new();
    validator.add_rule(Box::new(RequiredFieldsRule));
    validator.add_rule(Box::new(AssetSplitSumRule));
    validator.add_rule(Box::new(AssetSplitClassesRule));
    validator.add_rule(Box::new(FundsResolvableRule));
    validator.add_rule(Box::new(FundMarketRule));
    validator
}

//
// ========== Rules ==========
//

pub struct RequiredFieldsRule;

impl ContextRule for RequiredFieldsRule {
    fn name(&self) -> &'static str {
        "required_fields"
    }

    fn check(&self, input: &ValidationInput<'_>) -> RuleOutcome {
        let context = input.context;
        let mut missing = Vec::new();

        if context.currency.is_none() {
            missing.push("currency");
        }
        if context.currency == Some(Currency::Usd) && context.geography_constraints.is_empty() {
            missing.push("geography preferences");
        }
        if context.risk_bucket.is_none() {
            missing.push("risk profile");
        }
        if context.sub_risk_targets.is_none() {
            missing.push("risk targets");
        }
        if context.asset_split.is_empty() {
            missing.push("asset split");
        }
        if context.selected_funds.is_empty() {
            missing.push("selected funds");
        }

        if missing.is_empty() {
            RuleOutcome::pass()
        } else {
            RuleOutcome::fail(format!("missing {}", missing.join(", ")))
        }
    }
}

pub struct AssetSplitSumRule;

impl ContextRule for AssetSplitSumRule {
    fn name(&self) -> &'static str {
        "asset_split_sum"
    }

    fn check(&self, input: &ValidationInput<'_>) -> RuleOutcome {
        let split = &input.context.asset_split;
        if split.is_empty() {
            return RuleOutcome::pass();
        }
        if let Some((class, weight)) = split.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return RuleOutcome::fail(format!(
                "asset_split has an invalid {} weight of {}",
                class, weight
            ));
        }

        let total: f64 = split.values().sum();
        if (total - 1.0).abs() > SPLIT_TOLERANCE {
            RuleOutcome::fail(format!(
                "asset_split sums to {:.4} instead of 1.0",
                total
            ))
        } else {
            RuleOutcome::pass()
        }
    }
}

/// Every class in the split must be held by at least one selected fund
pub struct AssetSplitClassesRule;

impl ContextRule for AssetSplitClassesRule {
    fn name(&self) -> &'static str {
        "asset_split_classes"
    }

    fn check(&self, input: &ValidationInput<'_>) -> RuleOutcome {
        if input.funds.is_empty() {
            return RuleOutcome::pass();
        }
        let present: BTreeSet<AssetClass> = input.funds.iter().map(|f| f.asset_class()).collect();
        let orphaned: Vec<String> = input
            .context
            .asset_split
            .keys()
            .filter(|class| !present.contains(class))
            .map(|class| class.to_string())
            .collect();

        if orphaned.is_empty() {
            RuleOutcome::pass()
        } else {
            RuleOutcome::fail(format!(
                "asset_split targets {} but no selected fund is in that class",
                orphaned.join(", ")
            ))
        }
    }
}

pub struct FundsResolvableRule;

impl ContextRule for FundsResolvableRule {
    fn name(&self) -> &'static str {
        "funds_resolvable"
    }

    fn check(&self, input: &ValidationInput<'_>) -> RuleOutcome {
        if input.unresolved.is_empty() {
            RuleOutcome::pass()
        } else {
            RuleOutcome::fail(format!(
                "selected funds not found in the catalog: {}",
                input.unresolved.join(", ")
            ))
        }
    }
}

/// Funds must match the portfolio currency and allowed markets
pub struct FundMarketRule;

impl ContextRule for FundMarketRule {
    fn name(&self) -> &'static str {
        "fund_market"
    }

    fn check(&self, input: &ValidationInput<'_>) -> RuleOutcome {
        let Some(currency) = input.context.currency else {
            return RuleOutcome::pass();
        };
        let allowed: Vec<_> = input
            .context
            .effective_geographies()
            .iter()
            .map(|g| g.geography)
            .collect();

        let stray: Vec<&str> = input
            .funds
            .iter()
            .filter(|f| f.currency != currency || !allowed.contains(&f.geography))
            .map(|f| f.id.as_str())
            .collect();

        if stray.is_empty() {
            RuleOutcome::pass()
        } else {
            RuleOutcome::fail(format!(
                "funds outside the chosen currency or markets: {}",
                stray.join(", ")
            ))
        }
    }
}
