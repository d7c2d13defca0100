//! Risk parity as a fixed point
//!
//! Risk contributions `w_i * (Sigma w)_i` are equalised within each budget
//! group (asset-class targets fix how much weight each group carries). The
//! damped update `w_i <- sqrt(w_i / (Sigma w)_i)`, rescaled to the group
//! budget, has equal contributions as its fixed point.

use super::objective::mat_vec;
use super::projection::FeasibleSet;
use super::spg::SolveOutcome;
use tracing::trace;

const MIN_MARGINAL: f64 = 1e-18;

pub fn solve(
    cov: &[Vec<f64>],
    set: &FeasibleSet,
    tolerance: f64,
    max_iterations: usize,
) -> SolveOutcome {
    let mut w = set.initial_point();

    for iteration in 0..max_iterations {
        let marginal = mat_vec(cov, &w);
        let dispersion = contribution_dispersion(set, &w, &marginal);
        if dispersion <= tolerance {
            trace!(iteration, dispersion, "Risk parity converged");
            return SolveOutcome {
                weights: w,
                iterations: iteration,
                converged: true,
            };
        }

        let mut next = w.clone();
        for group in &set.groups {
            if group.budget <= 0.0 {
                continue;
            }
            let mut total = 0.0;
            for &i in &group.members {
                let m = marginal[i].max(MIN_MARGINAL);
                next[i] = (w[i] / m).sqrt();
                total += next[i];
            }
            if total > 0.0 {
                for &i in &group.members {
                    next[i] *= group.budget / total;
                }
            }
        }
        set.project(&mut next);
        w = next;
    }

    let marginal = mat_vec(cov, &w);
    let converged = contribution_dispersion(set, &w, &marginal) <= tolerance;
    SolveOutcome {
        weights: w,
        iterations: max_iterations,
        converged,
    }
}

/// Largest relative spread `(max - min) / mean` of risk contributions
/// inside any group with a positive budget
pub fn contribution_dispersion(set: &FeasibleSet, w: &[f64], marginal: &[f64]) -> f64 {
    let mut worst: f64 = 0.0;
    for group in &set.groups {
        if group.budget <= 0.0 || group.members.len() < 2 {
            continue;
        }
        let contributions: Vec<f64> = group.members.iter().map(|&i| w[i] * marginal[i]).collect();
        let mean = contributions.iter().sum::<f64>() / contributions.len() as f64;
        if mean <= 0.0 {
            return f64::INFINITY;
        }
        let max = contributions.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = contributions.iter().cloned().fold(f64::INFINITY, f64::min);
        worst = worst.max((max - min) / mean);
    }
    worst
}
