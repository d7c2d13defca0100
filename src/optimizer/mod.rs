//! Constrained portfolio optimization engine
//!
//! Pure and synchronous: no conversation awareness, no I/O. Given the same
//! funds, constraints and objective the result is bit-for-bit identical, since
//! every solver starts from the insertion-ordered equal-weight point and does
//! nothing randomised.

pub mod objective;
pub mod projection;
pub mod risk_parity;
pub mod spg;

use crate::catalog::covariance::covariance_matrix;
use crate::error::AdvisorError;
use crate::models::{
    AssetClass, AssetSplit, FundRecord, FundWeight, Objective, PortfolioAllocation, RiskBucket,
};
use crate::Result;
use objective::{dot, quad_form, ObjectiveFunction};
use projection::FeasibleSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Solver thresholds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SolverSettings {
    /// Stationarity tolerance for gradient objectives and dispersion
    /// tolerance for risk parity
    pub tolerance: f64,
    pub max_iterations: usize,
    pub risk_parity_max_iterations: usize,
    pub risk_free_rate: f64,
    /// Post-solve weights below this are zeroed
    pub min_weight: f64,
    /// Allowed drift of class sums and of the total from their targets
    pub equality_tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 5000,
            risk_parity_max_iterations: 500,
            risk_free_rate: 0.03,
            min_weight: 1e-4,
            equality_tolerance: 1e-6,
        }
    }
}

/// Per-fund bounds plus asset-class equality targets
#[derive(Debug, Clone, PartialEq)]
pub struct Constraints {
    pub bounds: Vec<(f64, f64)>,
    pub class_targets: AssetSplit,
}

impl Constraints {
    /// Default bounds `[0, 1]` for `fund_count` funds
    pub fn new(fund_count: usize, class_targets: AssetSplit) -> Self {
        Self {
            bounds: vec![(0.0, 1.0); fund_count],
            class_targets,
        }
    }
}

/// Funds with their return vector and covariance, in selection order
#[derive(Debug, Clone)]
pub struct OptimizationProblem {
    pub funds: Vec<FundRecord>,
    pub expected_returns: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
}

impl OptimizationProblem {
    pub fn new(funds: Vec<FundRecord>) -> Result<Self> {
        if funds.is_empty() {
            return Err(AdvisorError::Validation(
                "no funds selected for optimization".to_string(),
            ));
        }
        let expected_returns = funds.iter().map(|f| f.expected_return_pct / 100.0).collect();
        let covariance = covariance_matrix(&funds);
        Ok(Self {
            funds,
            expected_returns,
            covariance,
        })
    }
}

/// Candidate objectives per risk bucket, tried in order
pub fn objectives_for(bucket: RiskBucket) -> &'static [Objective] {
    match bucket {
        RiskBucket::High => &[Objective::MaxReturn, Objective::MaxAlpha, Objective::MaxSharpe],
        RiskBucket::Medium => &[Objective::MaxSharpe, Objective::RiskParity],
        RiskBucket::Low => &[Objective::MinVolatility, Objective::RiskParity],
    }
}

/// Try the bucket's objectives in order and return the first that converges.
pub fn optimize_for_bucket(
    problem: &OptimizationProblem,
    constraints: &Constraints,
    bucket: RiskBucket,
    settings: &SolverSettings,
) -> Result<PortfolioAllocation> {
    first_converged(objectives_for(bucket), |objective| {
        optimize(problem, constraints, objective, settings)
    })
}

/// Walk `objectives` until one solves. Only `OptimizationInfeasible` moves on
/// to the next objective; any other error stops the chain.
fn first_converged<F>(objectives: &[Objective], mut solve: F) -> Result<PortfolioAllocation>
where
    F: FnMut(Objective) -> Result<PortfolioAllocation>,
{
    let mut failures = Vec::new();

    for objective in objectives {
        match solve(*objective) {
            Ok(allocation) => return Ok(allocation),
            Err(AdvisorError::OptimizationInfeasible(reason)) => {
                warn!(objective = ?objective, reason = %reason, "Objective did not converge, trying next");
                failures.push(format!("{}: {}", objective, reason));
            }
            Err(other) => return Err(other),
        }
    }

    Err(AdvisorError::OptimizationInfeasible(failures.join("; ")))
}

/// Solve a single objective. Fails with `OptimizationInfeasible` when the
/// constraints admit no portfolio or the solver does not converge.
pub fn optimize(
    problem: &OptimizationProblem,
    constraints: &Constraints,
    objective: Objective,
    settings: &SolverSettings,
) -> Result<PortfolioAllocation> {
    let n = problem.funds.len();
    if constraints.bounds.len() != n {
        return Err(AdvisorError::Internal(format!(
            "{} bounds for {} funds",
            constraints.bounds.len(),
            n
        )));
    }

    let set = FeasibleSet::build(
        &problem.funds,
        &constraints.bounds,
        &constraints.class_targets,
        settings.equality_tolerance,
    )?;

    let outcome = match objective {
        Objective::RiskParity => risk_parity::solve(
            &problem.covariance,
            &set,
            settings.tolerance,
            settings.risk_parity_max_iterations,
        ),
        _ => {
            let function = ObjectiveFunction::new(
                objective,
                &problem.expected_returns,
                &problem.covariance,
                settings.risk_free_rate,
            );
            spg::minimize(
                &function,
                &set,
                set.initial_point(),
                settings.tolerance,
                settings.max_iterations,
            )
        }
    };

    debug!(
        objective = ?objective,
        iterations = outcome.iterations,
        converged = outcome.converged,
        "Solver finished"
    );

    if !outcome.converged {
        return Err(AdvisorError::OptimizationInfeasible(format!(
            "{} did not converge within {} iterations",
            objective, outcome.iterations
        )));
    }

    let weights = post_process(&set, outcome.weights, settings.min_weight);
    verify(problem, &set, &weights, settings)?;

    let expected_return = dot(&problem.expected_returns, &weights);
    let volatility = quad_form(&problem.covariance, &weights).max(0.0).sqrt();

    info!(
        objective = ?objective,
        funds = n,
        expected_return,
        volatility,
        "Optimization converged"
    );

    Ok(PortfolioAllocation {
        objective,
        weights: problem
            .funds
            .iter()
            .zip(&weights)
            .map(|(fund, w)| FundWeight {
                fund_id: fund.id.clone(),
                weight: *w,
            })
            .collect(),
        expected_return,
        volatility,
    })
}

/// Clip to bounds and restore group budgets, zero dust weights, then
/// renormalise so the total is exactly one.
fn post_process(set: &FeasibleSet, mut weights: Vec<f64>, min_weight: f64) -> Vec<f64> {
    set.project(&mut weights);

    for group in &set.groups {
        let largest = group
            .members
            .iter()
            .copied()
            .max_by(|&a, &b| weights[a].total_cmp(&weights[b]).then_with(|| b.cmp(&a)));

        let dust: Vec<usize> = group
            .members
            .iter()
            .copied()
            .filter(|&i| {
                Some(i) != largest && weights[i] < min_weight && set.bounds[i].0 <= 0.0
            })
            .collect();
        if dust.is_empty() {
            continue;
        }

        let support: Vec<usize> = group
            .members
            .iter()
            .copied()
            .filter(|i| !dust.contains(i))
            .collect();
        let capacity: f64 = support.iter().map(|&i| set.bounds[i].1).sum();
        if capacity < group.budget {
            continue;
        }

        for &i in &dust {
            weights[i] = 0.0;
        }
        set.project_group(group, &support, &mut weights);
    }

    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        for w in weights.iter_mut() {
            *w /= total;
        }
    }
    weights
}

fn verify(
    problem: &OptimizationProblem,
    set: &FeasibleSet,
    weights: &[f64],
    settings: &SolverSettings,
) -> Result<()> {
    let tolerance = settings.equality_tolerance;

    let total: f64 = weights.iter().sum();
    if (total - 1.0).abs() > tolerance {
        return Err(AdvisorError::OptimizationInfeasible(format!(
            "weights sum to {:.8}",
            total
        )));
    }

    for (i, w) in weights.iter().enumerate() {
        let (lower, upper) = set.bounds[i];
        if !w.is_finite() || *w < lower - tolerance || *w > upper + tolerance {
            return Err(AdvisorError::OptimizationInfeasible(format!(
                "weight {:.6} for {} is outside [{}, {}]",
                w, problem.funds[i].id, lower, upper
            )));
        }
    }

    let by_class = class_weights(&problem.funds, weights);
    for group in &set.groups {
        if let Some(class) = group.class {
            let actual = by_class.get(&class).copied().unwrap_or(0.0);
            if (actual - group.budget).abs() > tolerance {
                return Err(AdvisorError::OptimizationInfeasible(format!(
                    "{} weight {:.6} misses its target {:.6}",
                    class, actual, group.budget
                )));
            }
        }
    }

    Ok(())
}

/// Aggregate weight per asset class
pub fn class_weights(funds: &[FundRecord], weights: &[f64]) -> BTreeMap<AssetClass, f64> {
    let mut totals = BTreeMap::new();
    for (fund, w) in funds.iter().zip(weights) {
        *totals.entry(fund.asset_class()).or_insert(0.0) += w;
    }
    totals
}
