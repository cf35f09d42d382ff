use log::{debug, info};
use serde::Serialize;

use super::aggregate::analyze;
use super::engine::{ensure_finite, simulate_with_seed};
use super::error::{EngineError, EngineResult};
use super::types::{MAX_SIMULATIONS, ProjectionInput};

pub const MAX_SOLVE_ITERATIONS: u32 = 200;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoalType {
    RequiredContribution,
    RequiredPrincipal,
}

#[derive(Debug, Clone, Copy)]
pub struct GoalSolveConfig {
    pub goal_type: GoalType,
    /// Required success probability, in percent.
    pub target_success_probability: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub simulations_per_iteration: u32,
    pub final_simulations: u32,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_value: f64,
    pub success_probability: f64,
    pub success_ci_half_width: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveResult {
    pub goal_type: GoalType,
    pub target_amount: f64,
    pub target_success_probability: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub solved_value: Option<f64>,
    pub achieved_success_probability: Option<f64>,
    pub achieved_success_ci_half_width: Option<f64>,
    pub iterations: Vec<GoalSolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

/// Bisects on the goal's free variable.
///
/// Every evaluation reuses the same seed, so each path sees the same return
/// draws and success can only rise as the candidate grows.
pub fn solve_goal(
    input: &ProjectionInput,
    config: GoalSolveConfig,
) -> EngineResult<GoalSolveResult> {
    input.validate()?;
    validate_config(config)?;

    let mut iterations = Vec::new();
    let low_eval = evaluate_candidate(input, config, config.search_min)?;
    let high_eval = evaluate_candidate(input, config, config.search_max)?;

    let mut solved_value = None;
    let mut converged = false;
    let feasible;
    let message;

    if low_eval.success_probability + 1e-12 >= config.target_success_probability {
        solved_value = Some(config.search_min);
        converged = true;
        feasible = true;
        message = "Already meets target at the lower search bound.".to_string();
    } else if high_eval.success_probability + 1e-12 < config.target_success_probability {
        feasible = false;
        message = format!(
            "No feasible {} found within the search bounds.",
            goal_label(config.goal_type)
        );
    } else {
        let mut lo = config.search_min;
        let mut hi = config.search_max;
        let mut it = 0;
        while it < config.max_iterations {
            it += 1;
            let mid = (lo + hi) * 0.5;
            let eval = evaluate_candidate(input, config, mid)?;
            debug!(
                "solve iteration {it}: [{lo}, {hi}] candidate={mid} success={}",
                eval.success_probability
            );
            iterations.push(GoalSolveIteration {
                iteration: it,
                lower_bound: lo,
                upper_bound: hi,
                candidate_value: mid,
                success_probability: eval.success_probability,
                success_ci_half_width: eval.success_ci_half_width,
            });

            if eval.success_probability + 1e-12 >= config.target_success_probability {
                hi = mid;
            } else {
                lo = mid;
            }

            if (hi - lo).abs() <= config.tolerance {
                converged = true;
                break;
            }
        }
        solved_value = Some(hi);
        feasible = true;
        message = if converged {
            format!("Solved {}.", goal_label(config.goal_type))
        } else {
            "Reached max iterations before tolerance was met; returning best estimate."
                .to_string()
        };
    }

    let mut achieved_success_probability = None;
    let mut achieved_success_ci_half_width = None;
    if let Some(value) = solved_value {
        let final_eval = evaluate_candidate(
            input,
            GoalSolveConfig {
                simulations_per_iteration: config.final_simulations,
                ..config
            },
            value,
        )?;
        achieved_success_probability = Some(final_eval.success_probability);
        achieved_success_ci_half_width = Some(final_eval.success_ci_half_width);
    }

    info!(
        "goal solve finished: feasible={feasible} converged={converged} value={solved_value:?}"
    );

    Ok(GoalSolveResult {
        goal_type: config.goal_type,
        target_amount: input.target_amount,
        target_success_probability: config.target_success_probability,
        search_min: config.search_min,
        search_max: config.search_max,
        tolerance: config.tolerance,
        solved_value,
        achieved_success_probability,
        achieved_success_ci_half_width,
        iterations,
        converged,
        feasible,
        message,
    })
}

fn goal_label(goal_type: GoalType) -> &'static str {
    match goal_type {
        GoalType::RequiredContribution => "monthly contribution",
        GoalType::RequiredPrincipal => "starting principal",
    }
}

#[derive(Debug, Clone, Copy)]
struct CandidateEval {
    success_probability: f64,
    success_ci_half_width: f64,
}

fn evaluate_candidate(
    base_input: &ProjectionInput,
    config: GoalSolveConfig,
    candidate_value: f64,
) -> EngineResult<CandidateEval> {
    let mut input = base_input.clone();
    input.simulation_count = config.simulations_per_iteration.max(1);

    match config.goal_type {
        GoalType::RequiredContribution => input.monthly_contribution = candidate_value.max(0.0),
        GoalType::RequiredPrincipal => input.principal = candidate_value.max(0.0),
    }

    let paths = simulate_with_seed(&input, config.seed);
    ensure_finite(&paths)?;
    let result = analyze(&paths);
    Ok(CandidateEval {
        success_probability: result.success_probability(input.target_amount),
        success_ci_half_width: result.success_ci_half_width(input.target_amount),
    })
}

fn validate_config(config: GoalSolveConfig) -> EngineResult<()> {
    let invalid = |msg: &str| -> EngineResult<()> {
        Err(EngineError::InvalidSolveConfig(msg.to_string()))
    };

    if !(0.0..=100.0).contains(&config.target_success_probability) {
        return invalid("target_success_probability must be between 0 and 100");
    }
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return invalid("search bounds must be finite");
    }
    if config.search_min < 0.0 {
        return invalid("search_min must be >= 0");
    }
    if config.search_max <= config.search_min {
        return invalid("search_max must be greater than search_min");
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return invalid("tolerance must be > 0");
    }
    if config.max_iterations == 0 || config.max_iterations > MAX_SOLVE_ITERATIONS {
        return invalid(&format!(
            "max_iterations must be between 1 and {MAX_SOLVE_ITERATIONS}"
        ));
    }
    let simulations = 1..=MAX_SIMULATIONS;
    if !simulations.contains(&config.simulations_per_iteration) {
        return invalid(&format!(
            "simulations_per_iteration must be between 1 and {MAX_SIMULATIONS}"
        ));
    }
    if !simulations.contains(&config.final_simulations) {
        return invalid(&format!(
            "final_simulations must be between 1 and {MAX_SIMULATIONS}"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn deterministic_input() -> ProjectionInput {
        ProjectionInput {
            principal: 0.0,
            monthly_contribution: 0.0,
            months: 10,
            annual_return_rate: 0.0,
            annual_volatility: 0.0,
            target_amount: 1_000.0,
            simulation_count: 1,
        }
    }

    fn config(goal_type: GoalType, search_max: f64) -> GoalSolveConfig {
        GoalSolveConfig {
            goal_type,
            target_success_probability: 100.0,
            search_min: 0.0,
            search_max,
            tolerance: 0.5,
            max_iterations: 32,
            simulations_per_iteration: 1,
            final_simulations: 1,
            seed: 7,
        }
    }

    #[test]
    fn required_contribution_solver_finds_deterministic_solution() {
        // Ten months at zero growth: 100 a month reaches 1,000 exactly.
        let input = deterministic_input();
        let config = config(GoalType::RequiredContribution, 500.0);

        let result = solve_goal(&input, config).expect("must solve");
        assert!(result.feasible);
        assert!(result.converged);
        assert_close(
            result.solved_value.expect("value expected"),
            100.0,
            config.tolerance,
        );
        assert_close(
            result.achieved_success_probability.expect("probability expected"),
            100.0,
            1e-9,
        );
        assert!(!result.iterations.is_empty());
    }

    #[test]
    fn required_principal_solver_finds_deterministic_solution() {
        let mut input = deterministic_input();
        input.monthly_contribution = 50.0;
        let config = config(GoalType::RequiredPrincipal, 2_000.0);

        let result = solve_goal(&input, config).expect("must solve");
        assert!(result.feasible);
        assert_close(
            result.solved_value.expect("value expected"),
            500.0,
            config.tolerance,
        );
    }

    #[test]
    fn solver_reports_infeasible_when_bounds_too_low() {
        let input = deterministic_input();
        let config = config(GoalType::RequiredContribution, 50.0);

        let result = solve_goal(&input, config).expect("must return result");
        assert!(!result.feasible);
        assert!(result.solved_value.is_none());
        assert!(result.achieved_success_probability.is_none());
        assert!(result.message.contains("monthly contribution"));
    }

    #[test]
    fn solver_short_circuits_when_lower_bound_already_meets_target() {
        let mut input = deterministic_input();
        input.principal = 5_000.0;
        let config = config(GoalType::RequiredContribution, 500.0);

        let result = solve_goal(&input, config).expect("must solve");
        assert_eq!(result.solved_value, Some(0.0));
        assert!(result.iterations.is_empty());
    }

    #[test]
    fn stochastic_solution_meets_requested_probability() {
        let input = ProjectionInput {
            principal: 10_000.0,
            monthly_contribution: 0.0,
            months: 60,
            annual_return_rate: 0.06,
            annual_volatility: 0.15,
            target_amount: 50_000.0,
            simulation_count: 200,
        };
        let config = GoalSolveConfig {
            goal_type: GoalType::RequiredContribution,
            target_success_probability: 80.0,
            search_min: 0.0,
            search_max: 2_000.0,
            tolerance: 1.0,
            max_iterations: 40,
            simulations_per_iteration: 200,
            final_simulations: 200,
            seed: 11,
        };

        let result = solve_goal(&input, config).expect("must solve");
        assert!(result.feasible);
        assert!(result.converged);
        // Same seed and simulation count, so the final evaluation replays the search.
        assert!(result.achieved_success_probability.expect("probability") >= 80.0);
        for pair in result.iterations.windows(2) {
            let previous = pair[0].upper_bound - pair[0].lower_bound;
            let current = pair[1].upper_bound - pair[1].lower_bound;
            assert!(current < previous);
        }
    }

    #[test]
    fn solver_rejects_invalid_config() {
        let input = deterministic_input();

        let mut bad = config(GoalType::RequiredContribution, 100.0);
        bad.target_success_probability = 120.0;
        assert!(matches!(
            solve_goal(&input, bad),
            Err(EngineError::InvalidSolveConfig(_))
        ));

        let mut bad = config(GoalType::RequiredContribution, 100.0);
        bad.search_max = 0.0;
        assert!(solve_goal(&input, bad).is_err());

        let mut bad = config(GoalType::RequiredContribution, 100.0);
        bad.tolerance = 0.0;
        assert!(solve_goal(&input, bad).is_err());

        let mut bad = config(GoalType::RequiredContribution, 100.0);
        bad.simulations_per_iteration = 0;
        assert!(solve_goal(&input, bad).is_err());
    }

    #[test]
    fn solver_rejects_oversized_iteration_and_simulation_counts() {
        let input = deterministic_input();
        let rejected = |bad: GoalSolveConfig| {
            matches!(
                solve_goal(&input, bad),
                Err(EngineError::InvalidSolveConfig(_))
            )
        };

        let mut bad = config(GoalType::RequiredContribution, 500.0);
        bad.max_iterations = u32::MAX;
        assert!(rejected(bad));

        let mut bad = config(GoalType::RequiredContribution, 500.0);
        bad.max_iterations = MAX_SOLVE_ITERATIONS + 1;
        assert!(rejected(bad));

        let mut bad = config(GoalType::RequiredContribution, 500.0);
        bad.simulations_per_iteration = u32::MAX;
        assert!(rejected(bad));

        let mut bad = config(GoalType::RequiredContribution, 500.0);
        bad.final_simulations = MAX_SIMULATIONS + 1;
        assert!(rejected(bad));

        let mut capped = config(GoalType::RequiredContribution, 500.0);
        capped.max_iterations = MAX_SOLVE_ITERATIONS;
        capped.tolerance = f64::MIN_POSITIVE;
        let result = solve_goal(&input, capped).expect("must run to the cap");
        assert!(result.iterations.len() <= MAX_SOLVE_ITERATIONS as usize);
    }

    #[test]
    fn solver_reports_overflowing_candidates() {
        let input = ProjectionInput {
            months: 1_200,
            annual_return_rate: 0.5,
            ..deterministic_input()
        };
        let config = config(GoalType::RequiredContribution, 1e300);
        assert!(matches!(
            solve_goal(&input, config),
            Err(EngineError::NonFiniteBalance { .. })
        ));
    }
}
