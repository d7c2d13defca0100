//! Investor profile tools: currency, geography, risk bucket, sub-risk targets

use super::{bool_arg, number_arg, string_arg, Tool, ToolOutcome};
use crate::context::{Context, ContextPatch};
use crate::error::AdvisorError;
use crate::models::{
    Currency, Geography, GeographyAllocation, RiskBucket, SubRiskLevel, SubRiskTargets,
};
use crate::slots::{bucket_for_drop, ScenarioChoice};
use crate::Result;
use serde_json::{json, Value};

//
// ===== Currency =====
//

pub struct SetCurrencyTool;

impl Tool for SetCurrencyTool {
    fn name(&self) -> &'static str {
        "set_currency"
    }

    fn description(&self) -> &'static str {
        "Record the currency the investor wants to invest in: INR (Indian funds) or USD (global funds)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "currency": {"type": "string", "enum": ["INR", "USD"]}
            },
            "required": ["currency"]
        })
    }

    fn execute(&self, _context: &Context, arguments: &Value) -> Result<ToolOutcome> {
        let currency = string_arg(arguments, "currency")
            .and_then(Currency::from_label)
            .ok_or_else(|| {
                AdvisorError::AmbiguousInput("currency must be INR or USD".to_string())
            })?;

        Ok(ToolOutcome::new(ContextPatch {
            currency: Some(currency),
            ..ContextPatch::default()
        }))
    }
}

//
// ===== Geography =====
//

pub struct SetGeographyTool;

impl Tool for SetGeographyTool {
    fn name(&self) -> &'static str {
        "set_geography"
    }

    fn description(&self) -> &'static str {
        "Record the markets a USD investor wants exposure to, in order of preference, with optional percentages."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "geographies": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string", "enum": ["USA", "India", "Japan", "Europe", "UK", "China"]},
                            "percent": {"type": "number"}
                        },
                        "required": ["name"]
                    }
                }
            },
            "required": ["geographies"]
        })
    }

    fn execute(&self, context: &Context, arguments: &Value) -> Result<ToolOutcome> {
        if context.currency != Some(Currency::Usd) {
            return Err(AdvisorError::Validation(
                "market preferences only apply to USD portfolios".to_string(),
            ));
        }

        let entries = arguments
            .get("geographies")
            .and_then(Value::as_array)
            .filter(|list| !list.is_empty())
            .ok_or_else(|| {
                AdvisorError::AmbiguousInput("no markets were named".to_string())
            })?;

        let mut requested: Vec<(Geography, Option<f64>)> = Vec::new();
        for entry in entries {
            let label = string_arg(entry, "name").unwrap_or_default();
            let geography = Geography::from_label(label).ok_or_else(|| {
                AdvisorError::AmbiguousInput(format!(
                    "'{}' is not a market I can invest in; choose from USA, India, Japan, Europe, UK or China",
                    label
                ))
            })?;
            let percent = number_arg(entry, "percent")?;
            if matches!(percent, Some(p) if p < 0.0) {
                return Err(AdvisorError::AmbiguousInput(
                    "market percentages cannot be negative".to_string(),
                ));
            }
            if !requested.iter().any(|(g, _)| *g == geography) {
                requested.push((geography, percent));
            }
        }

        let (allocations, note) = normalize_shares(&requested)?;
        let mut outcome = ToolOutcome::new(ContextPatch {
            geography_constraints: Some(allocations),
            ..ContextPatch::default()
        });
        if let Some(note) = note {
            outcome = outcome.with_note(note);
        }
        Ok(outcome)
    }
}

/// Convert stated percentages to shares summing to one. Markets without a
/// percentage split whatever the stated ones leave; with none stated the
/// split is equal.
fn normalize_shares(
    requested: &[(Geography, Option<f64>)],
) -> Result<(Vec<GeographyAllocation>, Option<String>)> {
    let stated: f64 = requested.iter().filter_map(|(_, p)| *p).sum();
    let unstated = requested.iter().filter(|(_, p)| p.is_none()).count();
    let mut note = None;

    let percents: Vec<f64> = if unstated == requested.len() {
        vec![100.0 / requested.len() as f64; requested.len()]
    } else if unstated == 0 {
        if stated <= 0.0 {
            return Err(AdvisorError::AmbiguousInput(
                "market percentages must add up to more than zero".to_string(),
            ));
        }
        if (stated - 100.0).abs() > 1e-9 {
            note = Some(format!(
                "Your percentages added up to {:.0}%, so I scaled them to 100%.",
                stated
            ));
        }
        requested.iter().map(|(_, p)| p.unwrap_or(0.0)).collect()
    } else {
        let remaining = 100.0 - stated;
        if remaining <= 0.0 {
            return Err(AdvisorError::AmbiguousInput(format!(
                "the percentages you gave already add up to {:.0}%, leaving nothing for the other markets",
                stated
            )));
        }
        let each = remaining / unstated as f64;
        requested.iter().map(|(_, p)| p.unwrap_or(each)).collect()
    };

    let total: f64 = percents.iter().sum();
    let allocations = requested
        .iter()
        .zip(percents)
        .map(|((geography, _), percent)| GeographyAllocation {
            geography: *geography,
            share: percent / total,
        })
        .collect();

    Ok((allocations, note))
}

//
// ===== Risk profile =====
//

pub struct SetRiskProfileTool;

impl Tool for SetRiskProfileTool {
    fn name(&self) -> &'static str {
        "set_risk_profile"
    }

    fn description(&self) -> &'static str {
        "Infer the risk bucket from the investor's answer to the market-fall scenario: the largest drop they could tolerate, or whether they would sell, hold or buy more."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "max_drop_pct": {"type": "number", "description": "Largest tolerable portfolio fall in percent"},
                "scenario_choice": {"type": "string", "enum": ["sell", "hold", "buy_more"]},
                "risk_bucket": {"type": "string", "enum": ["LOW", "MEDIUM", "HIGH"]},
                "tax_saving": {"type": "boolean", "description": "Investor wants tax-saving (ELSS) funds"}
            }
        })
    }

    fn execute(&self, context: &Context, arguments: &Value) -> Result<ToolOutcome> {
        let drop_pct = number_arg(arguments, "max_drop_pct")?;
        if matches!(drop_pct, Some(p) if !(0.0..=100.0).contains(&p)) {
            return Err(AdvisorError::AmbiguousInput(
                "a tolerable drop must be between 0% and 100%".to_string(),
            ));
        }
        let choice: Option<ScenarioChoice> = string_arg(arguments, "scenario_choice")
            .and_then(|s| serde_json::from_value(Value::String(s.to_lowercase())).ok());
        let stated = string_arg(arguments, "risk_bucket").and_then(RiskBucket::from_label);

        let mut notes = Vec::new();
        let bucket = match (drop_pct, choice) {
            (Some(pct), choice) => {
                let bucket = bucket_for_drop(pct);
                if let Some(choice) = choice.filter(|c| c.bucket() != bucket) {
                    notes.push(format!(
                        "Your answer suggested {} but a {:.0}% tolerable drop points to {}, so I went with the number.",
                        choice.bucket(),
                        pct,
                        bucket
                    ));
                }
                bucket
            }
            (None, Some(choice)) => choice.bucket(),
            (None, None) => stated.ok_or_else(|| {
                AdvisorError::AmbiguousInput(
                    "no drop tolerance or scenario answer was given".to_string(),
                )
            })?,
        };

        let wants_tax_saving = bool_arg(arguments, "tax_saving");
        let tax_saving = wants_tax_saving && context.currency == Some(Currency::Inr);
        if wants_tax_saving && !tax_saving {
            notes.push("Tax-saver (ELSS) funds are only available for INR portfolios.".to_string());
        }

        Ok(ToolOutcome {
            patch: ContextPatch {
                risk_bucket: Some(bucket),
                fund_count_targets: Some(bucket.default_fund_counts(tax_saving)),
                asset_split: Some(bucket.default_asset_split(tax_saving)),
                ..ContextPatch::default()
            },
            notes,
        })
    }
}

//
// ===== Sub-risk refinement =====
//

pub struct RefineSubRiskTool;

impl Tool for RefineSubRiskTool {
    fn name(&self) -> &'static str {
        "refine_sub_risk"
    }

    fn description(&self) -> &'static str {
        "Fine-tune risk within the bucket: a target volatility and/or maximum drawdown in percent, a position in the range (LOW, MEDIUM, HIGH), or accept the defaults."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "level": {"type": "string", "enum": ["LOW", "MEDIUM", "HIGH"]},
                "target_volatility_pct": {"type": "number"},
                "target_drawdown_pct": {"type": "number"},
                "accept_defaults": {"type": "boolean"}
            }
        })
    }

    fn execute(&self, context: &Context, arguments: &Value) -> Result<ToolOutcome> {
        let bucket = context.risk_bucket.ok_or_else(|| {
            AdvisorError::Validation("the risk profile has not been assessed yet".to_string())
        })?;

        if bool_arg(arguments, "accept_defaults") {
            return Ok(ToolOutcome::new(ContextPatch {
                sub_risk_targets: Some(bucket.median_targets()),
                ..ContextPatch::default()
            }));
        }

        let level = string_arg(arguments, "level").and_then(SubRiskLevel::from_label);
        let volatility = number_arg(arguments, "target_volatility_pct")?;
        let drawdown = number_arg(arguments, "target_drawdown_pct")?;

        if level.is_none() && volatility.is_none() && drawdown.is_none() {
            return Err(AdvisorError::AmbiguousInput(
                "no volatility, drawdown or range position was given".to_string(),
            ));
        }
        if volatility.into_iter().chain(drawdown).any(|v| v < 0.0) {
            return Err(AdvisorError::AmbiguousInput(
                "targets cannot be negative".to_string(),
            ));
        }

        let mut notes = Vec::new();
        let volatility = volatility.map(|v| {
            clamp_reported(v, bucket.volatility_bounds(), "volatility", bucket, &mut notes)
        });
        let drawdown = drawdown.map(|v| {
            clamp_reported(v, bucket.drawdown_bounds(), "drawdown", bucket, &mut notes)
        });

        let level = level
            .or_else(|| volatility.map(|v| level_within(v, bucket.volatility_bounds())))
            .or_else(|| drawdown.map(|v| level_within(v, bucket.drawdown_bounds())))
            .unwrap_or(SubRiskLevel::Medium);

        let targets = SubRiskTargets {
            level,
            target_volatility_pct: volatility.unwrap_or_else(|| bucket.volatility_target(level)),
            target_drawdown_pct: drawdown.unwrap_or_else(|| bucket.drawdown_target(level)),
        };

        Ok(ToolOutcome {
            patch: ContextPatch {
                sub_risk_targets: Some(targets),
                ..ContextPatch::default()
            },
            notes,
        })
    }
}

fn clamp_reported(
    value: f64,
    (low, high): (f64, f64),
    label: &str,
    bucket: RiskBucket,
    notes: &mut Vec<String>,
) -> f64 {
    let clamped = value.clamp(low, high);
    if clamped != value {
        notes.push(format!(
            "A {:.0}% {} is outside the {} range of {:.0} to {:.0}%, so I set it to {:.0}%.",
            value, label, bucket, low, high, clamped
        ));
    }
    clamped
}

/// Thirds of the bucket range
fn level_within(value: f64, (low, high): (f64, f64)) -> SubRiskLevel {
    let position = (value - low) / (high - low);
    if position < 1.0 / 3.0 {
        SubRiskLevel::Low
    } else if position > 2.0 / 3.0 {
        SubRiskLevel::High
    } else {
        SubRiskLevel::Medium
    }
}
