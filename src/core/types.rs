use serde::Serialize;

use super::error::{EngineError, EngineResult};

pub const DEFAULT_SIMULATION_COUNT: u32 = 1000;
pub const MAX_MONTHS: u32 = 1200;
pub const MAX_ANNUAL_RETURN_RATE: f64 = 10.0;
pub const MAX_ANNUAL_VOLATILITY: f64 = 5.0;
pub const MAX_SIMULATIONS: u32 = 100_000;

/// One balance per month index `0..=months`; index 0 is the principal.
pub type ProjectionPath = Vec<f64>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionInput {
    pub principal: f64,
    pub monthly_contribution: f64,
    pub months: u32,
    pub annual_return_rate: f64,
    pub annual_volatility: f64,
    pub target_amount: f64,
    pub simulation_count: u32,
}

impl Default for ProjectionInput {
    fn default() -> Self {
        Self {
            principal: 0.0,
            monthly_contribution: 0.0,
            months: 0,
            annual_return_rate: 0.0,
            annual_volatility: 0.0,
            target_amount: 0.0,
            simulation_count: DEFAULT_SIMULATION_COUNT,
        }
    }
}

impl ProjectionInput {
    pub fn validate(&self) -> EngineResult<()> {
        non_negative("principal", self.principal)?;
        non_negative("monthly_contribution", self.monthly_contribution)?;
        non_negative("target_amount", self.target_amount)?;

        if self.months > MAX_MONTHS {
            return Err(EngineError::invalid(
                "months",
                format!("must be <= {MAX_MONTHS}, got {}", self.months),
            ));
        }

        validate_rate(self.annual_return_rate)?;

        non_negative("annual_volatility", self.annual_volatility)?;
        if self.annual_volatility > MAX_ANNUAL_VOLATILITY {
            return Err(EngineError::invalid(
                "annual_volatility",
                format!(
                    "must be <= {MAX_ANNUAL_VOLATILITY}, got {}",
                    self.annual_volatility
                ),
            ));
        }

        if self.simulation_count == 0 {
            return Err(EngineError::invalid("simulation_count", "must be >= 1"));
        }
        if self.simulation_count > MAX_SIMULATIONS {
            return Err(EngineError::invalid(
                "simulation_count",
                format!("must be <= {MAX_SIMULATIONS}, got {}", self.simulation_count),
            ));
        }
        Ok(())
    }

    pub fn with_risk_profile(mut self, profile: RiskProfile) -> Self {
        let (rate, vol) = profile.parameters();
        self.annual_return_rate = rate;
        self.annual_volatility = vol;
        self
    }
}

fn non_negative(name: &'static str, value: f64) -> EngineResult<()> {
    if !value.is_finite() {
        return Err(EngineError::invalid(name, "must be finite"));
    }
    if value < 0.0 {
        return Err(EngineError::invalid(name, format!("must be >= 0, got {value}")));
    }
    Ok(())
}

fn validate_rate(rate: f64) -> EngineResult<()> {
    if !rate.is_finite() {
        return Err(EngineError::invalid("annual_return_rate", "must be finite"));
    }
    if rate <= -1.0 || rate > MAX_ANNUAL_RETURN_RATE {
        return Err(EngineError::invalid(
            "annual_return_rate",
            format!("must be in (-1, {MAX_ANNUAL_RETURN_RATE}], got {rate}"),
        ));
    }
    Ok(())
}

pub(crate) fn validate_inflation(rate: f64) -> EngineResult<()> {
    if !rate.is_finite() || rate <= -1.0 || rate > MAX_ANNUAL_RETURN_RATE {
        return Err(EngineError::invalid(
            "inflation_rate",
            format!("must be finite and in (-1, {MAX_ANNUAL_RETURN_RATE}], got {rate}"),
        ));
    }
    Ok(())
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskProfile {
    Conservative,
    Moderate,
    Aggressive,
}

impl RiskProfile {
    /// `(annual_return_rate, annual_volatility)`.
    pub fn parameters(self) -> (f64, f64) {
        match self {
            RiskProfile::Conservative => (0.05, 0.08),
            RiskProfile::Moderate => (0.07, 0.15),
            RiskProfile::Aggressive => (0.09, 0.22),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ProjectionModel {
    Compounding { inflation_rate: f64 },
    MonteCarlo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Deterministic(ProjectionPath),
    Stochastic(ProjectionResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BandPoint {
    pub month: u32,
    pub p10: f64,
    pub median: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    pub median_path: ProjectionPath,
    pub p10_path: ProjectionPath,
    pub p90_path: ProjectionPath,
    pub final_outcomes: Vec<f64>,
}

impl ProjectionResult {
    pub fn is_empty(&self) -> bool {
        self.final_outcomes.is_empty()
    }

    pub fn simulation_count(&self) -> usize {
        self.final_outcomes.len()
    }

    pub fn success_probability(&self, target: f64) -> f64 {
        if self.final_outcomes.is_empty() {
            return 0.0;
        }
        let hits = self
            .final_outcomes
            .iter()
            .filter(|&&balance| balance >= target)
            .count();
        100.0 * hits as f64 / self.final_outcomes.len() as f64
    }

    /// 95% binomial half-width of the success probability, in percentage points.
    pub fn success_ci_half_width(&self, target: f64) -> f64 {
        let n = self.final_outcomes.len();
        if n == 0 {
            return 0.0;
        }
        let p = (self.success_probability(target) / 100.0).clamp(0.0, 1.0);
        100.0 * 1.96 * (p * (1.0 - p) / n as f64).sqrt()
    }

    pub fn yearly_bands(&self) -> Vec<BandPoint> {
        let len = self
            .median_path
            .len()
            .min(self.p10_path.len())
            .min(self.p90_path.len());
        if len == 0 {
            return Vec::new();
        }

        let last = len - 1;
        let mut months: Vec<usize> = (0..=last).step_by(12).collect();
        if last % 12 != 0 {
            months.push(last);
        }

        months
            .into_iter()
            .map(|idx| BandPoint {
                month: idx as u32,
                p10: self.p10_path[idx],
                median: self.median_path[idx],
                p90: self.p90_path[idx],
            })
            .collect()
    }
}
