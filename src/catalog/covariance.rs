//! Synthetic covariance between catalog funds
//!
//! Correlation comes from a market factor, an asset-class factor and a
//! geography factor. Each fund's squared loadings sum to less than one and the
//! remainder is idiosyncratic, so the matrix is positive semi-definite.

use crate::models::{AssetClass, FundRecord};

/// (market, asset class, geography) loadings
fn loadings(class: AssetClass) -> (f64, f64, f64) {
    match class {
        AssetClass::Equity | AssetClass::TaxSaver => (0.6, 0.5, 0.4),
        AssetClass::Debt => (0.1, 0.6, 0.4),
        AssetClass::Balanced => (0.45, 0.5, 0.4),
    }
}

pub fn correlation(a: &FundRecord, b: &FundRecord) -> f64 {
    if a.id == b.id {
        return 1.0;
    }

    let (ma, ca, ga) = loadings(a.asset_class());
    let (mb, cb, gb) = loadings(b.asset_class());

    let mut rho = ma * mb;
    if a.asset_class() == b.asset_class() {
        rho += ca * cb;
    }
    if a.geography == b.geography {
        rho += ga * gb;
    }
    rho
}

/// Annualised covariance matrix in fraction units, rows in `funds` order
pub fn covariance_matrix(funds: &[FundRecord]) -> Vec<Vec<f64>> {
    funds
        .iter()
        .map(|a| {
            let sigma_a = a.volatility_pct / 100.0;
            funds
                .iter()
                .map(|b| correlation(a, b) * sigma_a * (b.volatility_pct / 100.0))
                .collect()
        })
        .collect()
}
