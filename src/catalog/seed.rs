//! Seed fund universe for the in-memory catalog

use crate::models::{Currency, FundCategory, FundRecord, Geography, RiskTag};

use Currency::{Inr, Usd};
use FundCategory::{Balanced, Debt, LargeCap, MidCap, SmallCap, TaxSaver};
use Geography::{China, Europe, India, Japan, Uk, Usa};

type SeedRow = (&'static str, &'static str, Currency, FundCategory, Geography, f64, f64);

/// (id, name, currency, category, geography, return %, volatility %)
const SEED_FUNDS: &[SeedRow] = &[
    // ===== INR / India =====
    ("inr-hdfc-top-100", "HDFC Top 100 Fund", Inr, LargeCap, India, 14.2, 18.5),
    ("inr-icici-bluechip", "ICICI Prudential Bluechip Fund", Inr, LargeCap, India, 13.9, 17.8),
    ("inr-sbi-bluechip", "SBI Bluechip Fund", Inr, LargeCap, India, 14.5, 19.2),
    ("inr-axis-bluechip", "Axis Bluechip Fund", Inr, LargeCap, India, 14.0, 18.0),
    ("inr-hdfc-midcap", "HDFC Mid-Cap Opportunities Fund", Inr, MidCap, India, 16.8, 22.5),
    ("inr-sbi-magnum-midcap", "SBI Magnum Midcap Fund", Inr, MidCap, India, 17.2, 23.1),
    ("inr-kotak-emerging", "Kotak Emerging Equity Fund", Inr, MidCap, India, 16.5, 21.8),
    ("inr-dsp-midcap", "DSP Midcap Fund", Inr, MidCap, India, 17.0, 22.9),
    ("inr-nippon-smallcap", "Nippon India Small Cap Fund", Inr, SmallCap, India, 19.5, 28.5),
    ("inr-hdfc-smallcap", "HDFC Small Cap Fund", Inr, SmallCap, India, 20.1, 29.2),
    ("inr-sbi-smallcap", "SBI Small Cap Fund", Inr, SmallCap, India, 19.0, 27.8),
    ("inr-axis-smallcap", "Axis Small Cap Fund", Inr, SmallCap, India, 19.8, 28.9),
    ("inr-hdfc-corp-bond", "HDFC Corporate Bond Fund", Inr, Debt, India, 7.5, 4.2),
    ("inr-icici-corp-bond", "ICICI Prudential Corporate Bond Fund", Inr, Debt, India, 7.8, 4.5),
    ("inr-sbi-corp-bond", "SBI Corporate Bond Fund", Inr, Debt, India, 7.3, 4.0),
    ("inr-axis-corp-debt", "Axis Corporate Debt Fund", Inr, Debt, India, 7.6, 4.3),
    ("inr-hdfc-balanced-adv", "HDFC Balanced Advantage Fund", Inr, Balanced, India, 11.8, 12.5),
    ("inr-icici-balanced-adv", "ICICI Prudential Balanced Advantage Fund", Inr, Balanced, India, 12.0, 13.0),
    ("inr-sbi-balanced-adv", "SBI Balanced Advantage Fund", Inr, Balanced, India, 11.9, 12.8),
    ("inr-axis-balanced-adv", "Axis Balanced Advantage Fund", Inr, Balanced, India, 11.7, 12.6),
    ("inr-hdfc-taxsaver", "HDFC TaxSaver Fund", Inr, TaxSaver, India, 15.5, 20.5),
    ("inr-icici-tax-plan", "ICICI Prudential Tax Plan", Inr, TaxSaver, India, 15.8, 21.0),
    ("inr-sbi-long-term-equity", "SBI Long Term Equity Fund", Inr, TaxSaver, India, 15.6, 20.8),
    ("inr-axis-long-term-equity", "Axis Long Term Equity Fund", Inr, TaxSaver, India, 15.4, 20.3),
    // ===== USD / USA =====
    ("usd-vanguard-sp500", "Vanguard S&P 500 Index Fund", Usd, LargeCap, Usa, 12.5, 16.5),
    ("usd-fidelity-500", "Fidelity 500 Index Fund", Usd, LargeCap, Usa, 12.7, 16.8),
    ("usd-schwab-total-market", "Schwab Total Stock Market Index", Usd, LargeCap, Usa, 12.6, 17.0),
    ("usd-vanguard-midcap", "Vanguard Mid-Cap Index Fund", Usd, MidCap, Usa, 14.2, 19.5),
    ("usd-fidelity-midcap", "Fidelity Mid Cap Index Fund", Usd, MidCap, Usa, 14.4, 19.8),
    ("usd-vanguard-smallcap", "Vanguard Small-Cap Index Fund", Usd, SmallCap, Usa, 16.8, 24.5),
    ("usd-fidelity-smallcap", "Fidelity Small Cap Index Fund", Usd, SmallCap, Usa, 17.0, 24.8),
    ("usd-vanguard-total-bond", "Vanguard Total Bond Market Index", Usd, Debt, Usa, 4.2, 3.5),
    ("usd-fidelity-us-bond", "Fidelity U.S. Bond Index Fund", Usd, Debt, Usa, 4.3, 3.6),
    ("usd-vanguard-balanced", "Vanguard Balanced Index Fund", Usd, Balanced, Usa, 9.5, 10.5),
    ("usd-fidelity-balanced", "Fidelity Balanced Fund", Usd, Balanced, Usa, 9.7, 10.8),
    // ===== USD / Japan =====
    ("usd-nikko-japan-equity", "Nikko AM Japan Equity Fund", Usd, LargeCap, Japan, 8.5, 18.5),
    ("usd-nomura-japan-equity", "Nomura Japan Equity Fund", Usd, LargeCap, Japan, 8.7, 18.8),
    ("usd-daiwa-japan-midcap", "Daiwa Japan Mid-Cap Fund", Usd, MidCap, Japan, 10.2, 21.5),
    ("usd-nomura-japan-bond", "Nomura Japan Bond Fund", Usd, Debt, Japan, 1.5, 2.8),
    ("usd-mitsubishi-balanced", "Mitsubishi Balanced Fund", Usd, Balanced, Japan, 6.5, 11.5),
    // ===== USD / India =====
    ("usd-franklin-india-bluechip", "Franklin India Bluechip Fund (USD)", Usd, LargeCap, India, 13.5, 19.5),
    ("usd-templeton-india-growth", "Templeton India Growth Fund (USD)", Usd, LargeCap, India, 13.7, 19.8),
    ("usd-franklin-india-midcap", "Franklin India Mid-Cap Fund (USD)", Usd, MidCap, India, 16.2, 23.5),
    ("usd-franklin-india-bond", "Franklin India Corporate Bond Fund (USD)", Usd, Debt, India, 7.2, 4.5),
    ("usd-templeton-india-balanced", "Templeton India Balanced Fund (USD)", Usd, Balanced, India, 11.5, 13.5),
    // ===== USD / Europe, UK, China =====
    ("usd-europe-stoxx-600", "iShares Core Europe Equity Fund", Usd, LargeCap, Europe, 8.9, 17.2),
    ("usd-europe-midcap", "Europe Mid-Cap Opportunities Fund", Usd, MidCap, Europe, 9.8, 19.6),
    ("usd-europe-aggregate-bond", "Europe Aggregate Bond Fund", Usd, Debt, Europe, 2.6, 4.1),
    ("usd-europe-balanced", "Europe Multi-Asset Balanced Fund", Usd, Balanced, Europe, 6.2, 10.4),
    ("usd-uk-ftse-100", "UK FTSE 100 Index Fund", Usd, LargeCap, Uk, 7.8, 15.9),
    ("usd-uk-gilt", "UK Gilt Fund", Usd, Debt, Uk, 3.1, 5.2),
    ("usd-china-large-cap", "China Large-Cap Equity Fund", Usd, LargeCap, China, 9.5, 24.0),
    ("usd-china-growth-midcap", "China Growth Mid-Cap Fund", Usd, MidCap, China, 11.4, 27.5),
];

fn risk_tag_for(volatility_pct: f64) -> RiskTag {
    if volatility_pct < 8.0 {
        RiskTag::Low
    } else if volatility_pct < 20.0 {
        RiskTag::Medium
    } else {
        RiskTag::High
    }
}

/// Build the seed universe in table order
pub fn seed_funds() -> Vec<FundRecord> {
    SEED_FUNDS
        .iter()
        .map(|&(id, name, currency, category, geography, ret, vol)| FundRecord {
            id: id.to_string(),
            name: name.to_string(),
            currency,
            category,
            geography,
            expected_return_pct: ret,
            volatility_pct: vol,
            risk_tag: risk_tag_for(vol),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_seed_ids_are_unique() {
        let funds = seed_funds();
        let ids: HashSet<_> = funds.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids.len(), funds.len());
    }

    #[test]
    fn test_inr_funds_are_indian() {
        assert!(seed_funds()
            .iter()
            .filter(|f| f.currency == Currency::Inr)
            .all(|f| f.geography == Geography::India));
    }

    #[test]
    fn test_risk_tags() {
        assert_eq!(risk_tag_for(4.2), RiskTag::Low);
        assert_eq!(risk_tag_for(12.5), RiskTag::Medium);
        assert_eq!(risk_tag_for(28.5), RiskTag::High);
    }
}
