use log::debug;
use rayon::prelude::*;

use super::aggregate::analyze;
use super::error::{EngineError, EngineResult};
use super::rng::{RandomSource, Rng};
use super::types::{
    Projection, ProjectionInput, ProjectionModel, ProjectionPath, ProjectionResult,
    validate_inflation,
};

pub fn project(
    principal: f64,
    monthly_contribution: f64,
    months: u32,
    annual_return_rate: f64,
    inflation_rate: f64,
) -> ProjectionPath {
    let monthly_rate = annual_return_rate / 12.0;
    let mut contribution = monthly_contribution;
    let mut balance = principal.max(0.0);

    let mut path = Vec::with_capacity(months as usize + 1);
    path.push(balance);
    for month in 1..=months {
        if month > 1 && (month - 1) % 12 == 0 {
            contribution *= 1.0 + inflation_rate;
        }
        balance = ((balance + contribution) * (1.0 + monthly_rate)).max(0.0);
        path.push(balance);
    }
    path
}

pub fn simulate<R: RandomSource + ?Sized>(
    input: &ProjectionInput,
    rng: &mut R,
) -> Vec<ProjectionPath> {
    if let Some(paths) = degenerate_paths(input) {
        return paths;
    }
    let model = ReturnModel::from_input(input);
    (0..input.simulation_count)
        .map(|_| simulate_path(input, &model, rng))
        .collect()
}

/// Like [`simulate`], but every path gets its own generator derived from
/// `(seed, path_index)`, so results do not depend on evaluation order.
pub fn simulate_with_seed(input: &ProjectionInput, seed: u64) -> Vec<ProjectionPath> {
    if let Some(paths) = degenerate_paths(input) {
        return paths;
    }
    let model = ReturnModel::from_input(input);
    (0..input.simulation_count)
        .map(|idx| simulate_path(input, &model, &mut Rng::for_path(seed, idx)))
        .collect()
}

pub fn par_simulate_with_seed(input: &ProjectionInput, seed: u64) -> Vec<ProjectionPath> {
    if let Some(paths) = degenerate_paths(input) {
        return paths;
    }
    let model = ReturnModel::from_input(input);
    (0..input.simulation_count)
        .into_par_iter()
        .map(|idx| simulate_path(input, &model, &mut Rng::for_path(seed, idx)))
        .collect()
}

pub fn run_projection<R: RandomSource + ?Sized>(
    input: &ProjectionInput,
    model: ProjectionModel,
    rng: &mut R,
) -> EngineResult<Projection> {
    input.validate()?;

    match model {
        ProjectionModel::Compounding { inflation_rate } => {
            validate_inflation(inflation_rate)?;
            debug!(
                "compounding projection: months={} rate={} inflation={}",
                input.months, input.annual_return_rate, inflation_rate
            );
            let path = project(
                input.principal,
                input.monthly_contribution,
                input.months,
                input.annual_return_rate,
                inflation_rate,
            );
            ensure_finite(std::slice::from_ref(&path))?;
            Ok(Projection::Deterministic(path))
        }
        ProjectionModel::MonteCarlo => {
            debug!(
                "monte carlo projection: months={} rate={} vol={} simulations={}",
                input.months,
                input.annual_return_rate,
                input.annual_volatility,
                input.simulation_count
            );
            let paths = simulate(input, rng);
            ensure_finite(&paths)?;
            Ok(Projection::Stochastic(analyze(&paths)))
        }
    }
}

pub fn run_monte_carlo(
    input: &ProjectionInput,
    seed: u64,
    parallel: bool,
) -> EngineResult<ProjectionResult> {
    input.validate()?;
    let paths = if parallel {
        par_simulate_with_seed(input, seed)
    } else {
        simulate_with_seed(input, seed)
    };
    debug!(
        "simulated {} paths over {} months (parallel={parallel})",
        paths.len(),
        input.months
    );
    ensure_finite(&paths)?;
    Ok(analyze(&paths))
}

pub fn checked_project(
    principal: f64,
    monthly_contribution: f64,
    months: u32,
    annual_return_rate: f64,
    inflation_rate: f64,
) -> EngineResult<ProjectionPath> {
    ProjectionInput {
        principal,
        monthly_contribution,
        months,
        annual_return_rate,
        ..ProjectionInput::default()
    }
    .validate()?;
    validate_inflation(inflation_rate)?;
    let path = project(
        principal,
        monthly_contribution,
        months,
        annual_return_rate,
        inflation_rate,
    );
    ensure_finite(std::slice::from_ref(&path))?;
    Ok(path)
}

// Valid inputs can still compound past `f64::MAX` at the extreme corners.
pub(crate) fn ensure_finite(paths: &[ProjectionPath]) -> EngineResult<()> {
    for (path, balances) in paths.iter().enumerate() {
        if let Some(month) = balances.iter().position(|b| !b.is_finite()) {
            return Err(EngineError::NonFiniteBalance { path, month });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct ReturnModel {
    drift: f64,
    vol_monthly: f64,
}

impl ReturnModel {
    fn from_input(input: &ProjectionInput) -> Self {
        let mean_monthly = input.annual_return_rate / 12.0;
        let vol_monthly = input.annual_volatility / 12.0_f64.sqrt();
        Self {
            drift: mean_monthly - 0.5 * vol_monthly * vol_monthly,
            vol_monthly,
        }
    }

    fn sample(&self, z: f64) -> f64 {
        (self.drift + self.vol_monthly * z).exp() - 1.0
    }
}

fn degenerate_paths(input: &ProjectionInput) -> Option<Vec<ProjectionPath>> {
    let count = input.simulation_count as usize;
    if input.months == 0 {
        return Some(vec![vec![input.principal.max(0.0)]; count]);
    }
    // Zero volatility falls back to the compounding projector, which adds the
    // contribution before growth. Any positive volatility uses the log-normal
    // step, so results move slightly as volatility leaves zero.
    if input.annual_volatility == 0.0 {
        let path = project(
            input.principal,
            input.monthly_contribution,
            input.months,
            input.annual_return_rate,
            0.0,
        );
        return Some(vec![path; count]);
    }
    None
}

fn simulate_path<R: RandomSource + ?Sized>(
    input: &ProjectionInput,
    model: &ReturnModel,
    rng: &mut R,
) -> ProjectionPath {
    let mut balance = input.principal.max(0.0);
    let mut path = Vec::with_capacity(input.months as usize + 1);
    path.push(balance);
    for _ in 0..input.months {
        let monthly_return = model.sample(rng.standard_normal());
        balance = (balance * (1.0 + monthly_return) + input.monthly_contribution).max(0.0);
        path.push(balance);
    }
    path
}
