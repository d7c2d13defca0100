//! Fund selection agent
//!
//! Splits each category's fund count across the allowed markets by share,
//! fills the slots from the catalog and moves any shortfall to other markets.
//! Only funds returned by the catalog are ever selected.

use super::{Agent, AgentResult};
use crate::catalog::{FundCatalog, FundQuery, Ranking};
use crate::context::{AgentKind, Context, ContextPatch};
use crate::error::AdvisorError;
use crate::models::{AssetClass, AssetSplit, FundCategory, FundRecord, GeographyAllocation};
use crate::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Slack so that shares like 0.6 * 5 floor to 3, not 2
const SHARE_EPSILON: f64 = 1e-9;

pub struct FundSelectionAgent {
    catalog: Arc<dyn FundCatalog>,
}

impl FundSelectionAgent {
    pub fn new(catalog: Arc<dyn FundCatalog>) -> Self {
        Self { catalog }
    }
}

/// Slots per market: floor of count times share, remainder to the first market
pub fn split_count(count: usize, geographies: &[GeographyAllocation]) -> Vec<usize> {
    let mut slots: Vec<usize> = geographies
        .iter()
        .map(|g| (count as f64 * g.share + SHARE_EPSILON).floor() as usize)
        .collect();
    let assigned: usize = slots.iter().sum();
    if let Some(first) = slots.first_mut() {
        *first += count.saturating_sub(assigned);
    }
    slots
}

/// Keep the split's classes that the selection actually holds, renormalized.
/// Falls back to equal weights if none of them are held.
pub fn restrict_split(split: &AssetSplit, funds: &[FundRecord]) -> AssetSplit {
    let present: BTreeSet<AssetClass> = funds.iter().map(|f| f.asset_class()).collect();
    let kept: AssetSplit = split
        .iter()
        .filter(|(class, w)| present.contains(class) && **w > 0.0)
        .map(|(class, w)| (*class, *w))
        .collect();

    let total: f64 = kept.values().sum();
    if total > 0.0 {
        kept.into_iter().map(|(class, w)| (class, w / total)).collect()
    } else {
        let share = 1.0 / present.len().max(1) as f64;
        present.into_iter().map(|class| (class, share)).collect()
    }
}

#[async_trait::async_trait]
impl Agent for FundSelectionAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::FundSelection
    }

    async fn handle(&self, context: &Context, _message: &str) -> Result<AgentResult> {
        let (Some(currency), Some(bucket)) = (context.currency, context.risk_bucket) else {
            return Err(AdvisorError::Internal(
                "fund selection dispatched before currency and risk bucket".to_string(),
            ));
        };
        let geographies = context.effective_geographies();
        if geographies.is_empty() {
            return Err(AdvisorError::Internal(
                "fund selection dispatched without markets".to_string(),
            ));
        }

        let counts = if context.fund_count_targets.is_empty() {
            bucket.default_fund_counts(false)
        } else {
            context.fund_count_targets.clone()
        };
        let ranking = Ranking::for_bucket(bucket);

        let mut chosen: Vec<FundRecord> = Vec::new();
        let mut notes: Vec<String> = Vec::new();

        for (category, count) in counts.iter().filter(|(_, n)| **n > 0) {
            let count = *count as usize;
            let mut shortfall = 0;
            let mut short_markets = Vec::new();

            for (allocation, slots) in geographies.iter().zip(split_count(count, &geographies)) {
                if slots == 0 {
                    continue;
                }
                let found = self
                    .lookup(currency, *category, allocation, slots, ranking, &chosen)
                    .await?;
                if found.len() < slots {
                    shortfall += slots - found.len();
                    short_markets.push(allocation.geography.to_string());
                }
                chosen.extend(found);
            }

            if shortfall == 0 {
                continue;
            }

            let mut substitutes = Vec::new();
            for allocation in &geographies {
                if shortfall == 0 {
                    break;
                }
                let found = self
                    .lookup(currency, *category, allocation, shortfall, ranking, &chosen)
                    .await?;
                shortfall -= found.len();
                substitutes.extend(found.iter().map(|f| format!("{} ({})", f.name, f.geography)));
                chosen.extend(found);
            }

            warn!(
                session_id = %context.session_id,
                category = %category,
                markets = ?short_markets,
                substituted = substitutes.len(),
                unfilled = shortfall,
                "Catalog shortfall"
            );
            notes.push(describe_shortfall(*category, &short_markets, &substitutes, shortfall));
        }

        if chosen.is_empty() {
            return Err(AdvisorError::CatalogExhausted(format!(
                "no {} funds are available for your markets",
                currency
            )));
        }

        let base_split = if context.asset_split.is_empty() {
            let tax_saving = counts.get(&FundCategory::TaxSaver).is_some_and(|n| *n > 0);
            bucket.default_asset_split(tax_saving)
        } else {
            context.asset_split.clone()
        };
        let split = restrict_split(&base_split, &chosen);
        if !same_split(&base_split, &split) {
            warn!(
                session_id = %context.session_id,
                planned = ?base_split,
                revised = ?split,
                "Asset split revised to the classes the catalog could fill"
            );
            notes.push(format!(
                "Because of that, your target mix changes from {} to {}.",
                describe_split(&base_split),
                describe_split(&split)
            ));
        }

        info!(
            session_id = %context.session_id,
            funds = chosen.len(),
            ranking = ?ranking,
            "Funds selected"
        );

        let mut reply = format!("I've picked {} funds for you:\n", chosen.len());
        for fund in &chosen {
            reply.push_str(&format!(
                "- {} ({}, {}, expected return {:.1}%, volatility {:.1}%)\n",
                fund.name,
                fund.category,
                fund.geography,
                fund.expected_return_pct,
                fund.volatility_pct
            ));
        }
        if !notes.is_empty() {
            reply.push('\n');
            reply.push_str(&notes.join("\n"));
            reply.push('\n');
        }

        let patch = ContextPatch {
            selected_funds: Some(chosen.iter().map(|f| f.id.clone()).collect()),
            asset_split: Some(split),
            ..ContextPatch::default()
        };

        Ok(AgentResult::completed(
            reply.trim_end().to_string(),
            patch,
            Some(AgentKind::Optimization),
        ))
    }
}

impl FundSelectionAgent {
    async fn lookup(
        &self,
        currency: crate::models::Currency,
        category: FundCategory,
        allocation: &GeographyAllocation,
        count: usize,
        ranking: Ranking,
        chosen: &[FundRecord],
    ) -> Result<Vec<FundRecord>> {
        self.catalog
            .lookup(&FundQuery {
                currency,
                category,
                geography: allocation.geography,
                count,
                ranking,
                exclude: chosen.iter().map(|f| f.id.clone()).collect(),
            })
            .await
    }
}

fn same_split(a: &AssetSplit, b: &AssetSplit) -> bool {
    let classes: BTreeSet<&AssetClass> = a.keys().chain(b.keys()).collect();
    classes.into_iter().all(|class| {
        let left = a.get(class).copied().unwrap_or(0.0);
        let right = b.get(class).copied().unwrap_or(0.0);
        (left - right).abs() < 1e-9
    })
}

/// "55% equity, 25% debt, 20% balanced"
pub fn describe_split(split: &AssetSplit) -> String {
    split
        .iter()
        .filter(|(_, w)| **w > 0.0)
        .map(|(class, w)| format!("{:.0}% {}", w * 100.0, class))
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_shortfall(
    category: FundCategory,
    short_markets: &[String],
    substitutes: &[String],
    unfilled: usize,
) -> String {
    let mut note = format!(
        "There weren't enough {} funds in {}",
        category,
        short_markets.join(" and ")
    );
    if substitutes.is_empty() {
        note.push('.');
    } else {
        note.push_str(&format!(", so I used {} instead.", substitutes.join(", ")));
    }
    if unfilled > 0 {
        note.push_str(&format!(
            " The catalog has {} fewer {} fund{} than planned.",
            unfilled,
            category,
            if unfilled == 1 { "" } else { "s" }
        ));
    }
    note
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::models::{Currency, Geography, RiskBucket};

    fn allocation(geography: Geography, share: f64) -> GeographyAllocation {
        GeographyAllocation { geography, share }
    }

    fn agent() -> FundSelectionAgent {
        FundSelectionAgent::new(Arc::new(InMemoryCatalog::seeded()))
    }

    fn context(
        currency: Currency,
        bucket: RiskBucket,
        geographies: Vec<GeographyAllocation>,
    ) -> Context {
        let mut context = Context::new("s");
        context.currency = Some(currency);
        context.geography_constraints = geographies;
        context.risk_bucket = Some(bucket);
        context.sub_risk_targets = Some(bucket.median_targets());
        context.fund_count_targets = bucket.default_fund_counts(false);
        context.asset_split = bucket.default_asset_split(false);
        context
    }

    #[test]
    fn test_split_count_remainder_to_first() {
        let two = vec![allocation(Geography::Usa, 0.5), allocation(Geography::India, 0.5)];
        assert_eq!(split_count(3, &two), vec![2, 1]);

        let three = vec![
            allocation(Geography::Usa, 1.0 / 3.0),
            allocation(Geography::Japan, 1.0 / 3.0),
            allocation(Geography::Europe, 1.0 / 3.0),
        ];
        assert_eq!(split_count(2, &three), vec![2, 0, 0]);
        assert_eq!(split_count(3, &three), vec![1, 1, 1]);

        let weighted = vec![allocation(Geography::Usa, 0.6), allocation(Geography::India, 0.4)];
        assert_eq!(split_count(5, &weighted), vec![3, 2]);
    }

    #[test]
    fn test_restrict_split_renormalizes() {
        let funds: Vec<FundRecord> = crate::catalog::seed::seed_funds()
            .into_iter()
            .filter(|f| f.currency == Currency::Inr && f.category == FundCategory::LargeCap)
            .take(2)
            .collect();
        let split = RiskBucket::Medium.default_asset_split(false);

        let restricted = restrict_split(&split, &funds);
        assert_eq!(restricted.len(), 1);
        assert!((restricted[&AssetClass::Equity] - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_inr_selection_fills_every_slot() {
        let context = context(Currency::Inr, RiskBucket::High, Vec::new());
        let result = agent().handle(&context, "").await.unwrap();
        let funds = result.patch.selected_funds.unwrap();

        assert_eq!(funds.len(), 10);
        let unique: BTreeSet<&String> = funds.iter().collect();
        assert_eq!(unique.len(), 10);
        assert!(funds.iter().all(|id| id.starts_with("inr-")));
        assert_eq!(result.next_hint, Some(AgentKind::Optimization));

        let split = result.patch.asset_split.unwrap();
        assert!((split.values().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_shortfall_is_redistributed_and_reported() {
        // China has only a couple of funds, so most slots move to the USA
        let geographies = vec![allocation(Geography::China, 0.5), allocation(Geography::Usa, 0.5)];
        let context = context(Currency::Usd, RiskBucket::Medium, geographies);
        let catalog = InMemoryCatalog::seeded();

        let result = agent().handle(&context, "").await.unwrap();
        let ids = result.patch.selected_funds.unwrap();

        assert_eq!(ids.len(), 10);
        for id in &ids {
            let fund = catalog.get(id).await.unwrap().expect("selected fund must exist in catalog");
            assert!(matches!(fund.geography, Geography::China | Geography::Usa));
        }
        assert!(result.reply.contains("There weren't enough"));
    }

    #[tokio::test]
    async fn test_revised_split_is_named_in_reply() {
        // China only lists equity funds in USD, so debt and balanced drop out
        let geographies = vec![allocation(Geography::China, 1.0)];
        let context = context(Currency::Usd, RiskBucket::Medium, geographies);
        let planned = describe_split(&context.asset_split);

        let result = agent().handle(&context, "").await.unwrap();
        let split = result.patch.asset_split.unwrap();

        assert!(!same_split(&split, &context.asset_split));
        assert!(result.reply.contains("your target mix changes"));
        assert!(result.reply.contains(&planned));
        assert!(result.reply.contains(&describe_split(&split)));
    }

    #[tokio::test]
    async fn test_unchanged_split_is_not_mentioned() {
        let context = context(Currency::Inr, RiskBucket::High, Vec::new());
        let result = agent().handle(&context, "").await.unwrap();

        assert!(same_split(result.patch.asset_split.as_ref().unwrap(), &context.asset_split));
        assert!(!result.reply.contains("target mix"));
    }

    #[test]
    fn test_describe_split_skips_empty_classes() {
        let split: AssetSplit = [
            (AssetClass::Equity, 0.55),
            (AssetClass::Debt, 0.25),
            (AssetClass::Balanced, 0.2),
            (AssetClass::TaxSaver, 0.0),
        ]
        .into_iter()
        .collect();
        assert_eq!(describe_split(&split), "55% equity, 25% debt, 20% balanced");
    }

    #[tokio::test]
    async fn test_empty_catalog_is_exhausted() {
        let agent = FundSelectionAgent::new(Arc::new(InMemoryCatalog::new(Vec::new())));
        let context = context(Currency::Inr, RiskBucket::Low, Vec::new());

        let result = agent.handle(&context, "").await;
        assert!(matches!(result, Err(AdvisorError::CatalogExhausted(_))));
    }
}
