//! Spectral projected gradient solver
//!
//! Barzilai-Borwein step lengths with Armijo backtracking along the projected
//! direction. Iterates stay feasible because the set is convex and every step
//! is a convex combination of feasible points.

use super::objective::{dot, ObjectiveFunction};
use super::projection::FeasibleSet;
use tracing::trace;

const ARMIJO_SLOPE: f64 = 1e-4;
const MIN_STEP: f64 = 1e-8;
const MAX_STEP: f64 = 1e3;
const MIN_BACKTRACK: f64 = 1e-12;
/// Objective decrease below this is treated as round-off when backtracking
const ROUNDOFF: f64 = 1e-13;

#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub weights: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimise `objective` over `set` starting from `start`.
/// Converged when the projected-gradient step `||P(w - g) - w||_inf`
/// falls to `tolerance`.
pub fn minimize(
    objective: &ObjectiveFunction,
    set: &FeasibleSet,
    start: Vec<f64>,
    tolerance: f64,
    max_iterations: usize,
) -> SolveOutcome {
    let n = start.len();
    let mut w = start;
    let mut g = vec![0.0; n];
    objective.gradient(&w, &mut g);
    let mut f = objective.value(&w);

    let mut step = {
        let residual = stationarity(set, &w, &g);
        if residual > 0.0 {
            (1.0 / residual).clamp(MIN_STEP, MAX_STEP)
        } else {
            1.0
        }
    };

    for iteration in 0..max_iterations {
        let residual = stationarity(set, &w, &g);
        if residual <= tolerance {
            trace!(objective = ?objective.kind(), iteration, residual, "SPG converged");
            return SolveOutcome {
                weights: w,
                iterations: iteration,
                converged: true,
            };
        }

        // spectral direction d = P(w - step * g) - w
        let mut trial: Vec<f64> = w.iter().zip(&g).map(|(x, gi)| x - step * gi).collect();
        set.project(&mut trial);
        let direction: Vec<f64> = trial.iter().zip(&w).map(|(t, x)| t - x).collect();
        let slope = dot(&g, &direction);

        let mut lambda = 1.0;
        let mut next: Vec<f64>;
        let mut f_next;
        loop {
            next = w.iter().zip(&direction).map(|(x, d)| x + lambda * d).collect();
            f_next = objective.value(&next);
            let slack = ROUNDOFF * (1.0 + f.abs());
            if f_next <= f + ARMIJO_SLOPE * lambda * slope + slack {
                break;
            }
            lambda *= 0.5;
            if lambda < MIN_BACKTRACK {
                trace!(objective = ?objective.kind(), iteration, "SPG line search stalled");
                return SolveOutcome {
                    weights: w,
                    iterations: iteration,
                    converged: false,
                };
            }
        }

        let mut g_next = vec![0.0; n];
        objective.gradient(&next, &mut g_next);

        let s: Vec<f64> = next.iter().zip(&w).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_next.iter().zip(&g).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        step = if sy <= 0.0 {
            MAX_STEP
        } else {
            (dot(&s, &s) / sy).clamp(MIN_STEP, MAX_STEP)
        };

        w = next;
        g = g_next;
        f = f_next;
    }

    let converged = stationarity(set, &w, &g) <= tolerance;
    SolveOutcome {
        weights: w,
        iterations: max_iterations,
        converged,
    }
}

/// `||P(w - g) - w||_inf`, zero exactly at a stationary point
pub fn stationarity(set: &FeasibleSet, w: &[f64], g: &[f64]) -> f64 {
    let mut stepped: Vec<f64> = w.iter().zip(g).map(|(x, gi)| x - gi).collect();
    set.project(&mut stepped);
    stepped
        .iter()
        .zip(w)
        .map(|(p, x)| (p - x).abs())
        .fold(0.0, f64::max)
}
