//! Feasible set for allocation weights
//!
//! Funds are partitioned into groups: one per targeted asset class plus a free
//! group for everything else. Each group has a weight budget, so the feasible
//! set is a product of capped simplices
//! `{ l_i <= w_i <= u_i, sum(w_group) = budget }` and projects exactly.

use crate::error::AdvisorError;
use crate::models::{AssetClass, AssetSplit, FundRecord};
use crate::Result;

const BISECTION_ROUNDS: usize = 200;

#[derive(Debug, Clone)]
pub struct Group {
    /// `None` for the free group
    pub class: Option<AssetClass>,
    /// Indices into the fund vector, in fund order
    pub members: Vec<usize>,
    pub budget: f64,
}

#[derive(Debug, Clone)]
pub struct FeasibleSet {
    pub groups: Vec<Group>,
    pub bounds: Vec<(f64, f64)>,
}

impl FeasibleSet {
    /// Partition `funds` by the class targets. Targets are rescaled to sum to
    /// exactly one when they cover every fund (they are within `tolerance`
    /// of one when validated).
    pub fn build(
        funds: &[FundRecord],
        bounds: &[(f64, f64)],
        targets: &AssetSplit,
        tolerance: f64,
    ) -> Result<Self> {
        if funds.is_empty() {
            return Err(AdvisorError::OptimizationInfeasible(
                "no funds to allocate".to_string(),
            ));
        }
        if bounds.len() != funds.len() {
            return Err(AdvisorError::Internal(format!(
                "{} bounds supplied for {} funds",
                bounds.len(),
                funds.len()
            )));
        }
        for (i, (lower, upper)) in bounds.iter().enumerate() {
            if lower > upper || *upper < 0.0 {
                return Err(AdvisorError::OptimizationInfeasible(format!(
                    "fund {} has empty bounds [{}, {}]",
                    funds[i].id, lower, upper
                )));
            }
        }

        let target_total: f64 = targets.values().sum();
        let mut groups = Vec::new();
        let mut free = Vec::new();

        for (i, fund) in funds.iter().enumerate() {
            if !targets.contains_key(&fund.asset_class()) {
                free.push(i);
            }
        }

        let covers_all = free.is_empty();
        if covers_all && (target_total - 1.0).abs() > tolerance {
            return Err(AdvisorError::OptimizationInfeasible(format!(
                "asset class targets sum to {:.6} instead of 1",
                target_total
            )));
        }
        if target_total > 1.0 + tolerance {
            return Err(AdvisorError::OptimizationInfeasible(format!(
                "asset class targets sum to {:.6}, more than the whole portfolio",
                target_total
            )));
        }
        let scale = if covers_all { 1.0 / target_total } else { 1.0 };

        for (class, target) in targets {
            if *target < 0.0 {
                return Err(AdvisorError::OptimizationInfeasible(format!(
                    "negative target for {}",
                    class
                )));
            }
            let members: Vec<usize> = funds
                .iter()
                .enumerate()
                .filter(|(_, f)| f.asset_class() == *class)
                .map(|(i, _)| i)
                .collect();

            if members.is_empty() {
                if *target > tolerance {
                    return Err(AdvisorError::OptimizationInfeasible(format!(
                        "asset allocation constraints cannot be satisfied with the selected funds: no {} funds for a {:.0}% target",
                        class,
                        target * 100.0
                    )));
                }
                continue;
            }

            groups.push(Group {
                class: Some(*class),
                members,
                budget: target * scale,
            });
        }

        if !free.is_empty() {
            groups.push(Group {
                class: None,
                members: free,
                budget: (1.0 - target_total).max(0.0),
            });
        }

        for group in &groups {
            let min: f64 = group.members.iter().map(|&i| bounds[i].0.max(0.0)).sum();
            let max: f64 = group.members.iter().map(|&i| bounds[i].1).sum();
            if group.budget < min - tolerance || group.budget > max + tolerance {
                let label = group
                    .class
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unconstrained".to_string());
                return Err(AdvisorError::OptimizationInfeasible(format!(
                    "asset allocation constraints cannot be satisfied with the selected funds: {} needs {:.1}% but its funds allow {:.1}%..{:.1}%",
                    label,
                    group.budget * 100.0,
                    min * 100.0,
                    max * 100.0
                )));
            }
        }

        Ok(Self {
            groups,
            bounds: bounds.iter().map(|&(l, u)| (l.max(0.0), u)).collect(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.bounds.len()
    }

    /// Euclidean projection of `point` onto the set, in place
    pub fn project(&self, point: &mut [f64]) {
        for group in &self.groups {
            self.project_group(group, &group.members, point);
        }
    }

    /// Project only `members` of a group onto its budget; other coordinates
    /// of the group are left as they are.
    pub fn project_group(&self, group: &Group, members: &[usize], point: &mut [f64]) {
        let values: Vec<f64> = members.iter().map(|&i| point[i]).collect();
        let bounds: Vec<(f64, f64)> = members.iter().map(|&i| self.bounds[i]).collect();
        let projected = project_capped_simplex(&values, &bounds, group.budget);
        for (k, &i) in members.iter().enumerate() {
            point[i] = projected[k];
        }
    }

    /// Equal weights inside each group, projected onto the bounds
    pub fn initial_point(&self) -> Vec<f64> {
        let mut point = vec![0.0; self.dimension()];
        for group in &self.groups {
            let share = group.budget / group.members.len() as f64;
            for &i in &group.members {
                point[i] = share;
            }
        }
        self.project(&mut point);
        point
    }
}

/// Project `y` onto `{ l <= x <= u, sum(x) = budget }` by bisecting the
/// shift `lambda` in `x_i = clamp(y_i - lambda, l_i, u_i)`.
pub fn project_capped_simplex(y: &[f64], bounds: &[(f64, f64)], budget: f64) -> Vec<f64> {
    if y.is_empty() {
        return Vec::new();
    }

    let place = |lambda: f64| -> Vec<f64> {
        y.iter()
            .zip(bounds)
            .map(|(v, (l, u))| (v - lambda).clamp(*l, *u))
            .collect()
    };

    let mut lo = y
        .iter()
        .zip(bounds)
        .map(|(v, (_, u))| v - u)
        .fold(f64::INFINITY, f64::min);
    let mut hi = y
        .iter()
        .zip(bounds)
        .map(|(v, (l, _))| v - l)
        .fold(f64::NEG_INFINITY, f64::max);

    for _ in 0..BISECTION_ROUNDS {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        let total: f64 = place(mid).iter().sum();
        if total > budget {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let mut x = place(0.5 * (lo + hi));

    // spread the bisection residual over coordinates strictly inside their bounds
    let residual = budget - x.iter().sum::<f64>();
    let interior: Vec<usize> = (0..x.len())
        .filter(|&i| x[i] > bounds[i].0 && x[i] < bounds[i].1)
        .collect();
    if !interior.is_empty() && residual != 0.0 {
        let step = residual / interior.len() as f64;
        for i in interior {
            x[i] = (x[i] + step).clamp(bounds[i].0, bounds[i].1);
        }
    }

    x
}
