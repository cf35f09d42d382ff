use std::fmt;

use serde::Serialize;

use super::types::{ProjectionInput, ProjectionResult};

/// Headline numbers of a Monte Carlo run, phrased for the advice generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSummary {
    pub target_amount: f64,
    pub months: u32,
    pub monthly_contribution: f64,
    pub success_probability: f64,
    pub median_final: f64,
    pub p10_final: f64,
    pub p90_final: f64,
}

impl GoalSummary {
    pub fn from_result(input: &ProjectionInput, result: &ProjectionResult) -> Self {
        Self {
            target_amount: input.target_amount,
            months: input.months,
            monthly_contribution: input.monthly_contribution,
            success_probability: result.success_probability(input.target_amount),
            median_final: result.median_path.last().copied().unwrap_or(0.0),
            p10_final: result.p10_path.last().copied().unwrap_or(0.0),
            p90_final: result.p90_path.last().copied().unwrap_or(0.0),
        }
    }

    pub fn shortfall(&self) -> f64 {
        (self.target_amount - self.median_final).max(0.0)
    }
}

impl fmt::Display for GoalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Saving {:.2} a month for {} months toward a target of {:.2} succeeds in {:.1}% of \
             simulated markets. Median outcome {:.2}; pessimistic (p10) {:.2}; optimistic (p90) {:.2}.",
            self.monthly_contribution,
            self.months,
            self.target_amount,
            self.success_probability,
            self.median_final,
            self.p10_final,
            self.p90_final,
        )?;
        let shortfall = self.shortfall();
        if shortfall > 0.0 {
            write!(f, " The median outcome falls short by {shortfall:.2}.")?;
        }
        Ok(())
    }
}
