mod aggregate;
mod engine;
mod error;
mod rng;
mod solver;
mod summary;
mod types;

pub use aggregate::analyze;
pub use engine::{
    checked_project, par_simulate_with_seed, project, run_monte_carlo, run_projection, simulate,
    simulate_with_seed,
};
pub use error::{EngineError, EngineResult};
pub use rng::{RandomSource, Rng, derive_seed};
pub use solver::{
    GoalSolveConfig, GoalSolveIteration, GoalSolveResult, GoalType, MAX_SOLVE_ITERATIONS,
    solve_goal,
};
pub use summary::GoalSummary;
pub use types::{
    BandPoint, DEFAULT_SIMULATION_COUNT, MAX_ANNUAL_RETURN_RATE, MAX_ANNUAL_VOLATILITY,
    MAX_MONTHS, MAX_SIMULATIONS, Projection, ProjectionInput, ProjectionModel, ProjectionPath,
    ProjectionResult, RiskProfile,
};
