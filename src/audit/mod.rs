//! Optimization audit trail
//!
//! Every successful optimization is recorded with a hash of the inputs that
//! produced it, so a record can later be checked against a context.

use crate::context::Context;
use crate::models::{
    AssetSplit, Currency, FundWeight, GeographyAllocation, Objective, RiskBucket, SubRiskTargets,
};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizationRecord {
    pub id: Uuid,
    pub session_id: String,
    pub objective: Objective,
    pub weights: Vec<FundWeight>,
    pub context_hash: String,
    pub created_at: DateTime<Utc>,
}

impl OptimizationRecord {
    /// Build a record from a context that holds an optimization result
    pub fn from_context(context: &Context) -> Option<Self> {
        let result = context.optimization_result.as_ref()?;
        Some(Self {
            id: Uuid::new_v4(),
            session_id: context.session_id.clone(),
            objective: result.objective,
            weights: result.weights.clone(),
            context_hash: compute_context_hash(context),
            created_at: Utc::now(),
        })
    }
}

/// A record and whether the session's current inputs still hash to it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    #[serde(flatten)]
    pub record: OptimizationRecord,
    pub matches_current_context: bool,
}

/// Inputs that determine an optimization; history and timestamps excluded
#[derive(Serialize)]
struct Fingerprint<'a> {
    currency: &'a Option<Currency>,
    geographies: Vec<GeographyAllocation>,
    risk_bucket: &'a Option<RiskBucket>,
    sub_risk_targets: &'a Option<SubRiskTargets>,
    asset_split: &'a AssetSplit,
    selected_funds: &'a [String],
}

pub struct OptimizationAudit {
    records: Arc<RwLock<HashMap<Uuid, OptimizationRecord>>>,
}

impl OptimizationAudit {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn record(&self, record: OptimizationRecord) -> Result<Uuid> {
        let id = record.id;
        let mut records = self.records.write().await;
        records.insert(id, record);
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<OptimizationRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&id).cloned())
    }

    /// Records for one session, oldest first
    pub async fn list_for_session(&self, session_id: &str) -> Result<Vec<OptimizationRecord>> {
        let records = self.records.read().await;

        let mut items: Vec<OptimizationRecord> = records
            .values()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        items.sort_by_key(|r| r.created_at);

        Ok(items)
    }

    /// Whether `context` still hashes to what record `id` was computed from
    pub async fn verify_integrity(&self, id: Uuid, context: &Context) -> Result<bool> {
        Ok(self
            .get(id)
            .await?
            .is_some_and(|r| r.context_hash == compute_context_hash(context)))
    }
}

impl Default for OptimizationAudit {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 over the optimization inputs of `context`, hex encoded
pub fn compute_context_hash(context: &Context) -> String {
    let fingerprint = Fingerprint {
        currency: &context.currency,
        geographies: context.effective_geographies(),
        risk_bucket: &context.risk_bucket,
        sub_risk_targets: &context.sub_risk_targets,
        asset_split: &context.asset_split,
        selected_funds: &context.selected_funds,
    };

    let mut hasher = Sha256::new();
    if serde_json::to_writer(&mut HashWriter(&mut hasher), &fingerprint).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Lets serde_json stream straight into the hasher
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Turn;
    use crate::models::PortfolioAllocation;

    fn optimized_context(session_id: &str) -> Context {
        let mut context = Context::new(session_id);
        context.currency = Some(Currency::Inr);
        context.risk_bucket = Some(RiskBucket::Low);
        context.selected_funds = vec!["inr-hdfc-corp-bond".to_string()];
        context.optimization_result = Some(PortfolioAllocation {
            objective: Objective::MinVolatility,
            weights: vec![FundWeight {
                fund_id: "inr-hdfc-corp-bond".to_string(),
                weight: 1.0,
            }],
            expected_return: 0.07,
            volatility: 0.03,
        });
        context
    }

    #[test]
    fn test_hash_ignores_history_but_not_inputs() {
        let context = optimized_context("s1");
        let hash = compute_context_hash(&context);
        assert_eq!(hash.len(), 64);

        let mut chatted = context.clone();
        chatted.turn_history.push(Turn::user("thanks!"));
        assert_eq!(compute_context_hash(&chatted), hash);

        let mut changed = context.clone();
        changed.risk_bucket = Some(RiskBucket::High);
        assert_ne!(compute_context_hash(&changed), hash);
    }

    #[tokio::test]
    async fn test_record_and_verify() {
        let audit = OptimizationAudit::new();
        let context = optimized_context("s1");
        let record = OptimizationRecord::from_context(&context).unwrap();
        let id = audit.record(record).await.unwrap();

        assert!(audit.verify_integrity(id, &context).await.unwrap());

        let mut drifted = context.clone();
        drifted.selected_funds.push("inr-sbi-corp-bond".to_string());
        assert!(!audit.verify_integrity(id, &drifted).await.unwrap());
        assert!(!audit.verify_integrity(Uuid::new_v4(), &context).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_is_per_session() {
        let audit = OptimizationAudit::new();
        for session in ["a", "a", "b"] {
            let record = OptimizationRecord::from_context(&optimized_context(session)).unwrap();
            audit.record(record).await.unwrap();
        }

        assert_eq!(audit.list_for_session("a").await.unwrap().len(), 2);
        assert_eq!(audit.list_for_session("b").await.unwrap().len(), 1);
        assert!(audit.list_for_session("c").await.unwrap().is_empty());
    }

    #[test]
    fn test_no_record_without_result() {
        assert!(OptimizationRecord::from_context(&Context::new("s1")).is_none());
    }
}
