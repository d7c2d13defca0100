//! Runtime configuration loaded from the environment
//!
//! Binaries call `dotenv().ok()` first so a local `.env` file is honoured.

use crate::error::AdvisorError;
use crate::optimizer::SolverSettings;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_OPTIMIZATION_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    /// Absent key means the offline language model is used
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    /// Absent URL means sessions live in memory
    pub database_url: Option<String>,
    pub port: u16,
    pub optimization_timeout: Duration,
    pub solver: SolverSettings,
    /// Number of recent turns sent to the language model
    pub history_window: usize,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            database_url: None,
            port: DEFAULT_PORT,
            optimization_timeout: Duration::from_secs(DEFAULT_OPTIMIZATION_TIMEOUT_SECS),
            solver: SolverSettings::default(),
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

impl AdvisorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let timeout_secs: u64 = parse_or(&lookup, "OPTIMIZATION_TIMEOUT_SECS", DEFAULT_OPTIMIZATION_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(AdvisorError::ConfigError(
                "OPTIMIZATION_TIMEOUT_SECS must be positive".to_string(),
            ));
        }

        let solver = SolverSettings {
            tolerance: parse_or(&lookup, "SOLVER_TOLERANCE", defaults.solver.tolerance)?,
            max_iterations: parse_or(&lookup, "SOLVER_MAX_ITERATIONS", defaults.solver.max_iterations)?,
            risk_parity_max_iterations: parse_or(
                &lookup,
                "RISK_PARITY_MAX_ITERATIONS",
                defaults.solver.risk_parity_max_iterations,
            )?,
            risk_free_rate: parse_or(&lookup, "RISK_FREE_RATE", defaults.solver.risk_free_rate)?,
            min_weight: parse_or(&lookup, "MIN_WEIGHT", defaults.solver.min_weight)?,
            ..defaults.solver
        };

        if solver.tolerance.is_nan() || solver.tolerance <= 0.0 || solver.max_iterations == 0 {
            return Err(AdvisorError::ConfigError(
                "solver tolerance and iteration cap must be positive".to_string(),
            ));
        }

        Ok(Self {
            gemini_api_key: non_empty("GEMINI_API_KEY"),
            gemini_model: non_empty("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            database_url: non_empty("DATABASE_URL").or_else(|| non_empty("POSTGRES_URL")),
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            optimization_timeout: Duration::from_secs(timeout_secs),
            solver,
            history_window: parse_or(&lookup, "HISTORY_WINDOW", DEFAULT_HISTORY_WINDOW)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse::<T>().map_err(|_| {
            AdvisorError::ConfigError(format!("{} has an invalid value: {:?}", key, raw))
        }),
        _ => Ok(default),
    }
}
