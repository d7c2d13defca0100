//! Objective functions over the weight vector
//!
//! Every objective is expressed as a quantity to minimise; maximisation
//! objectives are negated. Risk parity has no objective here and is solved as
//! a fixed point in `risk_parity`.

use crate::models::Objective;

const MIN_VARIANCE: f64 = 1e-18;

pub struct ObjectiveFunction<'a> {
    kind: Objective,
    mu: &'a [f64],
    cov: &'a [Vec<f64>],
    risk_free_rate: f64,
    /// Gradient of the linear alpha objective, precomputed
    alpha_direction: Vec<f64>,
}

impl<'a> ObjectiveFunction<'a> {
    pub fn new(kind: Objective, mu: &'a [f64], cov: &'a [Vec<f64>], risk_free_rate: f64) -> Self {
        let alpha_direction = if kind == Objective::MaxAlpha {
            alpha_direction(mu, cov, risk_free_rate)
        } else {
            Vec::new()
        };

        Self {
            kind,
            mu,
            cov,
            risk_free_rate,
            alpha_direction,
        }
    }

    pub fn kind(&self) -> Objective {
        self.kind
    }

    pub fn value(&self, w: &[f64]) -> f64 {
        match self.kind {
            Objective::MaxReturn => -dot(self.mu, w),
            Objective::MaxAlpha => -dot(&self.alpha_direction, w),
            Objective::MinVolatility => quad_form(self.cov, w),
            Objective::MaxSharpe => {
                let variance = quad_form(self.cov, w).max(MIN_VARIANCE);
                -(dot(self.mu, w) - self.risk_free_rate) / variance.sqrt()
            }
            // not a minimisation problem; value is the risk-contribution spread
            Objective::RiskParity => 0.0,
        }
    }

    pub fn gradient(&self, w: &[f64], out: &mut [f64]) {
        match self.kind {
            Objective::MaxReturn => {
                for (o, m) in out.iter_mut().zip(self.mu) {
                    *o = -m;
                }
            }
            Objective::MaxAlpha => {
                for (o, a) in out.iter_mut().zip(&self.alpha_direction) {
                    *o = -a;
                }
            }
            Objective::MinVolatility => {
                let sigma_w = mat_vec(self.cov, w);
                for (o, s) in out.iter_mut().zip(sigma_w) {
                    *o = 2.0 * s;
                }
            }
            Objective::MaxSharpe => {
                let sigma_w = mat_vec(self.cov, w);
                let variance = dot(w, &sigma_w).max(MIN_VARIANCE);
                let sd = variance.sqrt();
                let excess = dot(self.mu, w) - self.risk_free_rate;
                for i in 0..out.len() {
                    out[i] = -(self.mu[i] / sd - excess * sigma_w[i] / (variance * sd));
                }
            }
            Objective::RiskParity => out.iter_mut().for_each(|o| *o = 0.0),
        }
    }
}

/// Jensen's alpha against the equal-weight benchmark of the candidate funds,
/// alpha(w) = mu.w - rf - beta(w) (mu_b - rf) with beta(w) = w' Sigma b / b' Sigma b.
/// With weights summing to one this is linear in w with the direction below.
fn alpha_direction(mu: &[f64], cov: &[Vec<f64>], risk_free_rate: f64) -> Vec<f64> {
    let n = mu.len();
    let benchmark = vec![1.0 / n as f64; n];
    let sigma_b = mat_vec(cov, &benchmark);
    let var_b = dot(&benchmark, &sigma_b).max(MIN_VARIANCE);
    let mu_b = dot(mu, &benchmark);

    mu.iter()
        .zip(&sigma_b)
        .map(|(m, s)| m - s / var_b * (mu_b - risk_free_rate))
        .collect()
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter().map(|row| dot(row, v)).collect()
}

pub fn quad_form(m: &[Vec<f64>], v: &[f64]) -> f64 {
    dot(v, &mat_vec(m, v))
}
