//! Fund catalog
//!
//! Read-only source of fund records. Fund selection only ever picks ids this
//! catalog returned.

pub mod covariance;
pub mod seed;

use crate::models::{Currency, FundCategory, FundRecord, Geography, RiskBucket};
use crate::Result;
use std::cmp::Ordering;
use tracing::debug;

/// Ordering applied to catalog matches before truncation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ranking {
    HighestReturn,
    LowestVolatility,
    /// Closest to the category's median return
    NearMedianReturn,
}

impl Ranking {
    pub fn for_bucket(bucket: RiskBucket) -> Self {
        match bucket {
            RiskBucket::High => Ranking::HighestReturn,
            RiskBucket::Medium => Ranking::NearMedianReturn,
            RiskBucket::Low => Ranking::LowestVolatility,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FundQuery {
    pub currency: Currency,
    pub category: FundCategory,
    pub geography: Geography,
    pub count: usize,
    pub ranking: Ranking,
    /// Ids already chosen, never returned again
    pub exclude: Vec<String>,
}

/// Trait for fund catalog backends
#[async_trait::async_trait]
pub trait FundCatalog: Send + Sync {
    /// Up to `count` funds matching the query, best ranked first
    async fn lookup(&self, query: &FundQuery) -> Result<Vec<FundRecord>>;

    async fn get(&self, fund_id: &str) -> Result<Option<FundRecord>>;
}

/// In-memory catalog over a fixed fund list
pub struct InMemoryCatalog {
    funds: Vec<FundRecord>,
}

impl InMemoryCatalog {
    pub fn new(funds: Vec<FundRecord>) -> Self {
        Self { funds }
    }

    /// Catalog over the built-in seed universe
    pub fn seeded() -> Self {
        Self::new(seed::seed_funds())
    }

    pub fn len(&self) -> usize {
        self.funds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funds.is_empty()
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::seeded()
    }
}

#[async_trait::async_trait]
impl FundCatalog for InMemoryCatalog {
    async fn lookup(&self, query: &FundQuery) -> Result<Vec<FundRecord>> {
        let matching: Vec<&FundRecord> = self
            .funds
            .iter()
            .filter(|f| {
                f.currency == query.currency
                    && f.category == query.category
                    && f.geography == query.geography
            })
            .collect();

        let median = median_return(&matching);

        let mut candidates: Vec<&FundRecord> = matching
            .into_iter()
            .filter(|f| !query.exclude.contains(&f.id))
            .collect();

        candidates.sort_by(|a, b| rank(query.ranking, median, a, b));
        candidates.truncate(query.count);

        debug!(
            category = %query.category,
            geography = %query.geography,
            requested = query.count,
            returned = candidates.len(),
            "Catalog lookup"
        );

        Ok(candidates.into_iter().cloned().collect())
    }

    async fn get(&self, fund_id: &str) -> Result<Option<FundRecord>> {
        Ok(self.funds.iter().find(|f| f.id == fund_id).cloned())
    }
}

fn median_return(funds: &[&FundRecord]) -> f64 {
    if funds.is_empty() {
        return 0.0;
    }
    let mut returns: Vec<f64> = funds.iter().map(|f| f.expected_return_pct).collect();
    returns.sort_by(|a, b| a.total_cmp(b));

    let mid = returns.len() / 2;
    if returns.len() % 2 == 0 {
        (returns[mid - 1] + returns[mid]) / 2.0
    } else {
        returns[mid]
    }
}

fn rank(ranking: Ranking, median: f64, a: &FundRecord, b: &FundRecord) -> Ordering {
    let primary = match ranking {
        Ranking::HighestReturn => b.expected_return_pct.total_cmp(&a.expected_return_pct),
        Ranking::LowestVolatility => a.volatility_pct.total_cmp(&b.volatility_pct),
        Ranking::NearMedianReturn => (a.expected_return_pct - median)
            .abs()
            .total_cmp(&(b.expected_return_pct - median).abs()),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}
