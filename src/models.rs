//! Core data models for the portfolio advisor

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Target weight fraction per asset class
pub type AssetSplit = BTreeMap<AssetClass, f64>;

/// Number of funds to select per category
pub type FundCounts = BTreeMap<FundCategory, u32>;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Inr,
    Usd,
}

impl Currency {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "INR" | "RUPEE" | "RUPEES" => Some(Currency::Inr),
            "USD" | "DOLLAR" | "DOLLARS" => Some(Currency::Usd),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Inr => write!(f, "INR"),
            Currency::Usd => write!(f, "USD"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Geography {
    Usa,
    India,
    Japan,
    Europe,
    Uk,
    China,
}

impl Geography {
    pub const ALL: [Geography; 6] = [
        Geography::Usa,
        Geography::India,
        Geography::Japan,
        Geography::Europe,
        Geography::Uk,
        Geography::China,
    ];

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "USA" | "US" | "UNITED STATES" | "AMERICA" => Some(Geography::Usa),
            "INDIA" => Some(Geography::India),
            "JAPAN" => Some(Geography::Japan),
            "EUROPE" | "EU" => Some(Geography::Europe),
            "UK" | "UNITED KINGDOM" | "BRITAIN" => Some(Geography::Uk),
            "CHINA" => Some(Geography::China),
            _ => None,
        }
    }
}

impl fmt::Display for Geography {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Geography::Usa => "USA",
            Geography::India => "India",
            Geography::Japan => "Japan",
            Geography::Europe => "Europe",
            Geography::Uk => "UK",
            Geography::China => "China",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskBucket {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubRiskLevel {
    Low,
    Medium,
    High,
}

/// Risk label carried by catalog funds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTag {
    Low,
    Medium,
    High,
}

impl RiskBucket {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" | "conservative" => Some(RiskBucket::Low),
            "medium" | "moderate" | "balanced" => Some(RiskBucket::Medium),
            "high" | "aggressive" => Some(RiskBucket::High),
            _ => None,
        }
    }

    /// Default fund counts (ten funds). With the tax-saver supplement five
    /// slots go to tax-saver funds and every other category keeps one.
    pub fn default_fund_counts(&self, tax_saving: bool) -> FundCounts {
        use FundCategory::*;

        if tax_saving {
            return BTreeMap::from([
                (Debt, 1),
                (LargeCap, 1),
                (MidCap, 1),
                (SmallCap, 1),
                (Balanced, 1),
                (TaxSaver, 5),
            ]);
        }

        let counts: [(FundCategory, u32); 5] = match self {
            RiskBucket::Low => [(Debt, 3), (LargeCap, 3), (MidCap, 2), (SmallCap, 1), (Balanced, 1)],
            RiskBucket::Medium => [(Debt, 2), (LargeCap, 2), (MidCap, 2), (SmallCap, 2), (Balanced, 2)],
            RiskBucket::High => [(Debt, 1), (LargeCap, 2), (MidCap, 3), (SmallCap, 3), (Balanced, 1)],
        };
        counts.into_iter().collect()
    }

    pub fn default_asset_split(&self, tax_saving: bool) -> AssetSplit {
        let (debt, equity, balanced) = match self {
            RiskBucket::Low => (0.40, 0.40, 0.20),
            RiskBucket::Medium => (0.25, 0.55, 0.20),
            RiskBucket::High => (0.10, 0.75, 0.15),
        };

        let scale = if tax_saving { 0.5 } else { 1.0 };
        let mut split = BTreeMap::from([
            (AssetClass::Debt, debt * scale),
            (AssetClass::Equity, equity * scale),
            (AssetClass::Balanced, balanced * scale),
        ]);
        if tax_saving {
            split.insert(AssetClass::TaxSaver, 0.5);
        }
        split
    }

    /// Annualised volatility band in percent
    pub fn volatility_bounds(&self) -> (f64, f64) {
        match self {
            RiskBucket::Low => (10.0, 20.0),
            RiskBucket::Medium => (20.0, 30.0),
            RiskBucket::High => (30.0, 50.0),
        }
    }

    /// Tolerable peak-to-trough drawdown band in percent
    pub fn drawdown_bounds(&self) -> (f64, f64) {
        match self {
            RiskBucket::Low => (5.0, 15.0),
            RiskBucket::Medium => (15.0, 30.0),
            RiskBucket::High => (30.0, 50.0),
        }
    }

    pub fn volatility_target(&self, level: SubRiskLevel) -> f64 {
        let (low, high) = self.volatility_bounds();
        match level {
            SubRiskLevel::Low => low,
            SubRiskLevel::Medium => (low + high) / 2.0,
            SubRiskLevel::High => high,
        }
    }

    pub fn drawdown_target(&self, level: SubRiskLevel) -> f64 {
        let (low, high) = self.drawdown_bounds();
        match level {
            SubRiskLevel::Low => low,
            SubRiskLevel::Medium => (low + high) / 2.0,
            SubRiskLevel::High => high,
        }
    }

    /// Bucket-median refinement used when the user accepts defaults.
    pub fn median_targets(&self) -> SubRiskTargets {
        SubRiskTargets {
            level: SubRiskLevel::Medium,
            target_volatility_pct: self.volatility_target(SubRiskLevel::Medium),
            target_drawdown_pct: self.drawdown_target(SubRiskLevel::Medium),
        }
    }
}

impl fmt::Display for RiskBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskBucket::Low => write!(f, "LOW"),
            RiskBucket::Medium => write!(f, "MEDIUM"),
            RiskBucket::High => write!(f, "HIGH"),
        }
    }
}

impl SubRiskLevel {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" | "lower" => Some(SubRiskLevel::Low),
            "medium" | "middle" | "mid" => Some(SubRiskLevel::Medium),
            "high" | "higher" | "upper" => Some(SubRiskLevel::High),
            _ => None,
        }
    }
}

impl fmt::Display for SubRiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubRiskLevel::Low => write!(f, "lower end"),
            SubRiskLevel::Medium => write!(f, "middle"),
            SubRiskLevel::High => write!(f, "upper end"),
        }
    }
}

//
// ================= Funds =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FundCategory {
    Debt,
    LargeCap,
    MidCap,
    SmallCap,
    Balanced,
    TaxSaver,
}

impl FundCategory {
    pub fn asset_class(&self) -> AssetClass {
        match self {
            FundCategory::Debt => AssetClass::Debt,
            FundCategory::LargeCap | FundCategory::MidCap | FundCategory::SmallCap => {
                AssetClass::Equity
            }
            FundCategory::Balanced => AssetClass::Balanced,
            FundCategory::TaxSaver => AssetClass::TaxSaver,
        }
    }
}

impl fmt::Display for FundCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FundCategory::Debt => "debt",
            FundCategory::LargeCap => "large cap",
            FundCategory::MidCap => "mid cap",
            FundCategory::SmallCap => "small cap",
            FundCategory::Balanced => "balanced",
            FundCategory::TaxSaver => "tax saver",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Debt,
    Balanced,
    TaxSaver,
}

impl AssetClass {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "equity" | "equities" | "stocks" => Some(AssetClass::Equity),
            "debt" | "bonds" | "bond" => Some(AssetClass::Debt),
            "balanced" | "hybrid" => Some(AssetClass::Balanced),
            "tax_saver" | "elss" => Some(AssetClass::TaxSaver),
            _ => None,
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AssetClass::Equity => "equity",
            AssetClass::Debt => "debt",
            AssetClass::Balanced => "balanced",
            AssetClass::TaxSaver => "tax_saver",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FundRecord {
    pub id: String,
    pub name: String,
    pub currency: Currency,
    pub category: FundCategory,
    pub geography: Geography,
    /// Annual expected return in percent
    pub expected_return_pct: f64,
    /// Annualised volatility in percent
    pub volatility_pct: f64,
    pub risk_tag: RiskTag,
}

impl FundRecord {
    pub fn asset_class(&self) -> AssetClass {
        self.category.asset_class()
    }
}

//
// ================= Preferences =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeographyAllocation {
    pub geography: Geography,
    /// Fraction of the fund slots, shares sum to 1
    pub share: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SubRiskTargets {
    pub level: SubRiskLevel,
    pub target_volatility_pct: f64,
    pub target_drawdown_pct: f64,
}

//
// ================= Optimization =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    MaxReturn,
    MaxAlpha,
    MaxSharpe,
    MinVolatility,
    RiskParity,
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Objective::MaxReturn => "maximum expected return",
            Objective::MaxAlpha => "maximum alpha",
            Objective::MaxSharpe => "maximum Sharpe ratio",
            Objective::MinVolatility => "minimum volatility",
            Objective::RiskParity => "risk parity",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FundWeight {
    pub fund_id: String,
    pub weight: f64,
}

/// Outcome of a successful optimization run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioAllocation {
    pub objective: Objective,
    /// One entry per selected fund, zero weights included, in selection order
    pub weights: Vec<FundWeight>,
    /// Portfolio expected return as a fraction
    pub expected_return: f64,
    /// Portfolio volatility as a fraction
    pub volatility: f64,
}

impl PortfolioAllocation {
    pub fn weight_of(&self, fund_id: &str) -> Option<f64> {
        self.weights
            .iter()
            .find(|w| w.fund_id == fund_id)
            .map(|w| w.weight)
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().map(|w| w.weight).sum()
    }
}
