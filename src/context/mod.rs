//! Session context and patch application
//!
//! The context is the single mutable record for one conversation. Agents never
//! write to it; they return a `ContextPatch` which the coordinator applies here
//! after checking field ownership. A patch can only set values, never clear
//! them, so completeness predicates stay satisfied once met.

use crate::error::AdvisorError;
use crate::memory::TurnHistory;
use crate::models::{
    AssetSplit, Currency, FundCounts, Geography, GeographyAllocation, PortfolioAllocation,
    RiskBucket, SubRiskTargets,
};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

const SHARE_TOLERANCE: f64 = 1e-6;

//
// ================= Agents & Ownership =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Currency,
    Geography,
    RiskAssessment,
    SubRisk,
    FundSelection,
    Optimization,
}

impl AgentKind {
    /// Fields this agent is allowed to write
    pub fn owned_fields(&self) -> &'static [ContextField] {
        match self {
            AgentKind::Currency => &[ContextField::Currency],
            AgentKind::Geography => &[ContextField::GeographyConstraints],
            AgentKind::RiskAssessment => &[
                ContextField::RiskBucket,
                ContextField::FundCountTargets,
                ContextField::AssetSplit,
            ],
            AgentKind::SubRisk => &[ContextField::SubRiskTargets],
            AgentKind::FundSelection => &[ContextField::SelectedFunds, ContextField::AssetSplit],
            AgentKind::Optimization => &[ContextField::OptimizationResult],
        }
    }

    pub fn owns(&self, field: ContextField) -> bool {
        self.owned_fields().contains(&field)
    }

    /// Agents that need no user input and may run back-to-back in one turn
    pub fn is_input_free(&self) -> bool {
        matches!(self, AgentKind::FundSelection | AgentKind::Optimization)
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AgentKind::Currency => "currency",
            AgentKind::Geography => "geography",
            AgentKind::RiskAssessment => "risk_assessment",
            AgentKind::SubRisk => "sub_risk",
            AgentKind::FundSelection => "fund_selection",
            AgentKind::Optimization => "optimization",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContextField {
    Currency,
    GeographyConstraints,
    RiskBucket,
    SubRiskTargets,
    FundCountTargets,
    AssetSplit,
    SelectedFunds,
    OptimizationResult,
}

impl fmt::Display for ContextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContextField::Currency => "currency",
            ContextField::GeographyConstraints => "geography_constraints",
            ContextField::RiskBucket => "risk_bucket",
            ContextField::SubRiskTargets => "sub_risk_targets",
            ContextField::FundCountTargets => "fund_count_targets",
            ContextField::AssetSplit => "asset_split",
            ContextField::SelectedFunds => "selected_funds",
            ContextField::OptimizationResult => "optimization_result",
        };
        write!(f, "{}", label)
    }
}

//
// ================= Patch =================
//

/// Proposed field updates. `None` means "leave unchanged"; there is no way to
/// express clearing a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geography_constraints: Option<Vec<GeographyAllocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_bucket: Option<RiskBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_risk_targets: Option<SubRiskTargets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fund_count_targets: Option<FundCounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_split: Option<AssetSplit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_funds: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization_result: Option<PortfolioAllocation>,
}

impl ContextPatch {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> Vec<ContextField> {
        let mut fields = Vec::new();
        if self.currency.is_some() {
            fields.push(ContextField::Currency);
        }
        if self.geography_constraints.is_some() {
            fields.push(ContextField::GeographyConstraints);
        }
        if self.risk_bucket.is_some() {
            fields.push(ContextField::RiskBucket);
        }
        if self.sub_risk_targets.is_some() {
            fields.push(ContextField::SubRiskTargets);
        }
        if self.fund_count_targets.is_some() {
            fields.push(ContextField::FundCountTargets);
        }
        if self.asset_split.is_some() {
            fields.push(ContextField::AssetSplit);
        }
        if self.selected_funds.is_some() {
            fields.push(ContextField::SelectedFunds);
        }
        if self.optimization_result.is_some() {
            fields.push(ContextField::OptimizationResult);
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

//
// ================= Context =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Context {
    pub session_id: String,
    #[serde(default)]
    pub currency: Option<Currency>,
    /// Preference order is insertion order
    #[serde(default)]
    pub geography_constraints: Vec<GeographyAllocation>,
    #[serde(default)]
    pub risk_bucket: Option<RiskBucket>,
    #[serde(default)]
    pub sub_risk_targets: Option<SubRiskTargets>,
    #[serde(default)]
    pub fund_count_targets: FundCounts,
    #[serde(default)]
    pub asset_split: AssetSplit,
    #[serde(default)]
    pub selected_funds: Vec<String>,
    #[serde(default)]
    pub optimization_result: Option<PortfolioAllocation>,
    #[serde(default)]
    pub turn_history: TurnHistory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Context {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            currency: None,
            geography_constraints: Vec::new(),
            risk_bucket: None,
            sub_risk_targets: None,
            fund_count_targets: FundCounts::new(),
            asset_split: AssetSplit::new(),
            selected_funds: Vec::new(),
            optimization_result: None,
            turn_history: TurnHistory::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Geographies funds may be drawn from. INR is always India only.
    pub fn effective_geographies(&self) -> Vec<GeographyAllocation> {
        match self.currency {
            Some(Currency::Inr) => vec![GeographyAllocation {
                geography: Geography::India,
                share: 1.0,
            }],
            _ => self.geography_constraints.clone(),
        }
    }

    /// Whether `field` currently satisfies its completeness predicate
    pub fn is_set(&self, field: ContextField) -> bool {
        match field {
            ContextField::Currency => self.currency.is_some(),
            ContextField::GeographyConstraints => !self.geography_constraints.is_empty(),
            ContextField::RiskBucket => self.risk_bucket.is_some(),
            ContextField::SubRiskTargets => self.sub_risk_targets.is_some(),
            ContextField::FundCountTargets => !self.fund_count_targets.is_empty(),
            ContextField::AssetSplit => !self.asset_split.is_empty(),
            ContextField::SelectedFunds => !self.selected_funds.is_empty(),
            ContextField::OptimizationResult => self.optimization_result.is_some(),
        }
    }

    /// Apply a patch on behalf of `agent`. Every field is checked before any
    /// is written, so a rejected patch leaves the context untouched.
    ///
    /// Ownership violations and patches that would break a structural
    /// invariant are programming errors and come back as fatal errors.
    pub fn apply(&mut self, agent: AgentKind, patch: ContextPatch) -> Result<Vec<ContextField>> {
        let fields = patch.fields();

        for field in &fields {
            if !agent.owns(*field) {
                return Err(AdvisorError::OwnershipViolation {
                    agent: agent.to_string(),
                    field: field.to_string(),
                });
            }
        }

        self.check_patch(&patch)?;

        if let Some(currency) = patch.currency {
            self.currency = Some(currency);
        }
        if let Some(geographies) = patch.geography_constraints {
            self.geography_constraints = geographies;
        }
        if let Some(bucket) = patch.risk_bucket {
            self.risk_bucket = Some(bucket);
        }
        if let Some(targets) = patch.sub_risk_targets {
            self.sub_risk_targets = Some(targets);
        }
        if let Some(counts) = patch.fund_count_targets {
            self.fund_count_targets = counts;
        }
        if let Some(split) = patch.asset_split {
            self.asset_split = split;
        }
        if let Some(funds) = patch.selected_funds {
            self.selected_funds = funds;
        }
        if let Some(result) = patch.optimization_result {
            self.optimization_result = Some(result);
        }

        if !fields.is_empty() {
            self.updated_at = Utc::now();
            debug!(
                session_id = %self.session_id,
                agent = %agent,
                fields = ?fields,
                "Context patch applied"
            );
        }

        Ok(fields)
    }

    fn check_patch(&self, patch: &ContextPatch) -> Result<()> {
        let currency = patch.currency.or(self.currency);

        if let Some(geographies) = &patch.geography_constraints {
            if currency != Some(Currency::Usd) {
                return Err(AdvisorError::Internal(
                    "geography constraints are only writable under USD".to_string(),
                ));
            }
            if geographies.is_empty() {
                return Err(AdvisorError::Internal(
                    "patch would clear geography_constraints".to_string(),
                ));
            }
            let total: f64 = geographies.iter().map(|g| g.share).sum();
            if (total - 1.0).abs() > SHARE_TOLERANCE || geographies.iter().any(|g| g.share < 0.0) {
                return Err(AdvisorError::Internal(format!(
                    "geography shares must be non-negative and sum to 1, got {:.6}",
                    total
                )));
            }
        }

        if matches!(&patch.fund_count_targets, Some(c) if c.is_empty()) {
            return Err(AdvisorError::Internal(
                "patch would clear fund_count_targets".to_string(),
            ));
        }
        if matches!(&patch.asset_split, Some(s) if s.is_empty()) {
            return Err(AdvisorError::Internal(
                "patch would clear asset_split".to_string(),
            ));
        }
        if matches!(&patch.selected_funds, Some(f) if f.is_empty()) {
            return Err(AdvisorError::Internal(
                "patch would clear selected_funds".to_string(),
            ));
        }

        Ok(())
    }

    /// Compact description used in language-model prompts and direct answers
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "currency: {}",
            self.currency
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unset".into())
        ));

        let geographies = self.effective_geographies();
        if !geographies.is_empty() {
            let list: Vec<String> = geographies
                .iter()
                .map(|g| format!("{} {:.0}%", g.geography, g.share * 100.0))
                .collect();
            lines.push(format!("geographies: {}", list.join(", ")));
        }

        if let Some(bucket) = self.risk_bucket {
            lines.push(format!("risk bucket: {}", bucket));
        }
        if let Some(targets) = &self.sub_risk_targets {
            lines.push(format!(
                "targets: volatility {:.1}%, drawdown {:.1}%",
                targets.target_volatility_pct, targets.target_drawdown_pct
            ));
        }
        if !self.asset_split.is_empty() {
            let split: Vec<String> = self
                .asset_split
                .iter()
                .map(|(class, w)| format!("{} {:.0}%", class, w * 100.0))
                .collect();
            lines.push(format!("asset split: {}", split.join(", ")));
        }
        if !self.selected_funds.is_empty() {
            lines.push(format!("selected funds: {}", self.selected_funds.len()));
        }
        if let Some(result) = &self.optimization_result {
            lines.push(format!(
                "optimized with {}: expected return {:.2}%, volatility {:.2}%",
                result.objective,
                result.expected_return * 100.0,
                result.volatility * 100.0
            ));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetClass, FundCategory};
    use std::collections::BTreeMap;

    fn usd_context() -> Context {
        let mut ctx = Context::new("s1");
        ctx.apply(
            AgentKind::Currency,
            ContextPatch {
                currency: Some(Currency::Usd),
                ..Default::default()
            },
        )
        .unwrap();
        ctx
    }

    #[test]
    fn test_ownership_violation_is_fatal() {
        let mut ctx = Context::new("s1");
        let patch = ContextPatch {
            risk_bucket: Some(RiskBucket::High),
            ..Default::default()
        };

        let err = ctx.apply(AgentKind::Currency, patch).unwrap_err();
        assert!(matches!(err, AdvisorError::OwnershipViolation { .. }));
        assert!(err.is_fatal());
        assert!(ctx.risk_bucket.is_none());
    }

    #[test]
    fn test_rejected_patch_is_atomic() {
        let mut ctx = usd_context();
        let patch = ContextPatch {
            risk_bucket: Some(RiskBucket::Low),
            fund_count_targets: Some(BTreeMap::new()),
            ..Default::default()
        };

        assert!(ctx.apply(AgentKind::RiskAssessment, patch).is_err());
        assert!(ctx.risk_bucket.is_none());
    }

    #[test]
    fn test_geography_requires_usd() {
        let mut ctx = Context::new("s1");
        ctx.apply(
            AgentKind::Currency,
            ContextPatch {
                currency: Some(Currency::Inr),
                ..Default::default()
            },
        )
        .unwrap();

        let patch = ContextPatch {
            geography_constraints: Some(vec![GeographyAllocation {
                geography: Geography::Usa,
                share: 1.0,
            }]),
            ..Default::default()
        };
        assert!(ctx.apply(AgentKind::Geography, patch).unwrap_err().is_fatal());
        assert_eq!(ctx.effective_geographies()[0].geography, Geography::India);
    }

    #[test]
    fn test_patch_cannot_clear_fields() {
        let mut ctx = usd_context();
        let patch = ContextPatch {
            geography_constraints: Some(vec![]),
            ..Default::default()
        };
        assert!(ctx.apply(AgentKind::Geography, patch).is_err());

        let patch = ContextPatch {
            selected_funds: Some(vec![]),
            ..Default::default()
        };
        assert!(ctx.apply(AgentKind::FundSelection, patch).is_err());
    }

    #[test]
    fn test_apply_sets_owned_fields() {
        let mut ctx = usd_context();
        let patch = ContextPatch {
            risk_bucket: Some(RiskBucket::High),
            fund_count_targets: Some(RiskBucket::High.default_fund_counts(false)),
            asset_split: Some(RiskBucket::High.default_asset_split(false)),
            ..Default::default()
        };

        let fields = ctx.apply(AgentKind::RiskAssessment, patch).unwrap();
        assert_eq!(fields.len(), 3);
        assert!(ctx.is_set(ContextField::RiskBucket));
        assert_eq!(ctx.fund_count_targets[&FundCategory::SmallCap], 3);
        assert_eq!(ctx.asset_split[&AssetClass::Equity], 0.75);
    }

    #[test]
    fn test_context_round_trips_through_json() {
        let ctx = usd_context();
        let json = serde_json::to_string(&ctx).unwrap();
        let restored: Context = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, ctx);
    }
}
