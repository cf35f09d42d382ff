use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    BandPoint, GoalSolveConfig, GoalSolveResult, GoalSummary, GoalType, Projection,
    ProjectionInput, ProjectionModel, ProjectionPath, ProjectionResult, RiskProfile, Rng, analyze,
    run_monte_carlo, run_projection, solve_goal,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliModel {
    Compounding,
    MonteCarlo,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliRiskProfile {
    Conservative,
    Moderate,
    Aggressive,
}

impl From<CliRiskProfile> for RiskProfile {
    fn from(value: CliRiskProfile) -> Self {
        match value {
            CliRiskProfile::Conservative => RiskProfile::Conservative,
            CliRiskProfile::Moderate => RiskProfile::Moderate,
            CliRiskProfile::Aggressive => RiskProfile::Aggressive,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliGoalType {
    RequiredContribution,
    RequiredPrincipal,
}

impl From<CliGoalType> for GoalType {
    fn from(value: CliGoalType) -> Self {
        match value {
            CliGoalType::RequiredContribution => GoalType::RequiredContribution,
            CliGoalType::RequiredPrincipal => GoalType::RequiredPrincipal,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiModel {
    #[serde(alias = "compound", alias = "deterministic")]
    Compounding,
    #[serde(alias = "monteCarlo", alias = "monte_carlo", alias = "stochastic")]
    MonteCarlo,
}

impl From<ApiModel> for CliModel {
    fn from(value: ApiModel) -> Self {
        match value {
            ApiModel::Compounding => CliModel::Compounding,
            ApiModel::MonteCarlo => CliModel::MonteCarlo,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiRiskProfile {
    Conservative,
    #[serde(alias = "balanced")]
    Moderate,
    #[serde(alias = "growth")]
    Aggressive,
}

impl From<ApiRiskProfile> for CliRiskProfile {
    fn from(value: ApiRiskProfile) -> Self {
        match value {
            ApiRiskProfile::Conservative => CliRiskProfile::Conservative,
            ApiRiskProfile::Moderate => CliRiskProfile::Moderate,
            ApiRiskProfile::Aggressive => CliRiskProfile::Aggressive,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiGoalType {
    #[serde(alias = "requiredContribution", alias = "contribution")]
    RequiredContribution,
    #[serde(alias = "requiredPrincipal", alias = "principal")]
    RequiredPrincipal,
}

impl From<ApiGoalType> for CliGoalType {
    fn from(value: ApiGoalType) -> Self {
        match value {
            ApiGoalType::RequiredContribution => CliGoalType::RequiredContribution,
            ApiGoalType::RequiredPrincipal => CliGoalType::RequiredPrincipal,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ResponseModel {
    Compounding,
    MonteCarlo,
}

impl From<ProjectionModel> for ResponseModel {
    fn from(value: ProjectionModel) -> Self {
        match value {
            ProjectionModel::Compounding { .. } => ResponseModel::Compounding,
            ProjectionModel::MonteCarlo => ResponseModel::MonteCarlo,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GoalPayload {
    principal: Option<f64>,
    monthly_contribution: Option<f64>,
    months: Option<i64>,
    annual_return: Option<f64>,
    annual_volatility: Option<f64>,
    inflation: Option<f64>,
    target_amount: Option<f64>,
    target_inflation: Option<f64>,
    simulations: Option<i64>,
    seed: Option<u64>,
    model: Option<ApiModel>,
    risk_profile: Option<ApiRiskProfile>,
    parallel: Option<bool>,

    goal_type: Option<ApiGoalType>,
    success_target: Option<f64>,
    search_min: Option<f64>,
    search_max: Option<f64>,
    tolerance: Option<f64>,
    max_iterations: Option<u32>,
    solve_simulations: Option<i64>,
}

#[derive(Parser, Debug)]
#[command(
    name = "goalsim",
    about = "Goal projection: fixed-rate compounding and Monte Carlo success probability"
)]
struct Cli {
    #[arg(long, help = "Starting balance")]
    principal: f64,
    #[arg(long, help = "Amount added every month")]
    monthly_contribution: f64,
    #[arg(long, allow_negative_numbers = true, help = "Projection horizon in months")]
    months: i64,
    #[arg(long, help = "Goal amount used to score success")]
    target_amount: f64,
    #[arg(
        long,
        default_value_t = 7.0,
        allow_negative_numbers = true,
        help = "Expected annual return in percent, e.g. 7"
    )]
    annual_return: f64,
    #[arg(
        long,
        default_value_t = 15.0,
        allow_negative_numbers = true,
        help = "Annual return volatility in percent (Monte Carlo only)"
    )]
    annual_volatility: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        allow_negative_numbers = true,
        help = "Yearly contribution escalation in percent (compounding only)"
    )]
    inflation: f64,
    #[arg(
        long,
        help = "Inflate the target by this annual percent over the horizon before scoring"
    )]
    target_inflation: Option<f64>,
    #[arg(long, default_value_t = 1000, allow_negative_numbers = true)]
    simulations: i64,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, value_enum, default_value_t = CliModel::MonteCarlo)]
    model: CliModel,
    #[arg(
        long,
        value_enum,
        help = "Preset return/volatility; overrides --annual-return and --annual-volatility"
    )]
    risk_profile: Option<CliRiskProfile>,
    #[arg(long, default_value_t = false, help = "Simulate paths on all cores")]
    parallel: bool,

    #[arg(long, value_enum, help = "Solve for the value that meets --success-target")]
    goal_type: Option<CliGoalType>,
    #[arg(
        long,
        default_value_t = 80.0,
        help = "Required success probability in percent when solving"
    )]
    success_target: f64,
    #[arg(long, default_value_t = 0.0)]
    search_min: f64,
    #[arg(long, help = "Upper search bound; defaults to the target amount")]
    search_max: Option<f64>,
    #[arg(long, default_value_t = 1.0)]
    tolerance: f64,
    #[arg(long, default_value_t = 40)]
    max_iterations: u32,
    #[arg(
        long,
        default_value_t = 500,
        allow_negative_numbers = true,
        help = "Simulations per solver evaluation"
    )]
    solve_simulations: i64,
}

#[derive(Debug, Clone)]
struct ApiRequest {
    input: ProjectionInput,
    model: ProjectionModel,
    nominal_target_amount: f64,
    seed: u64,
    parallel: bool,
    solve: Option<GoalSolveConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    model: ResponseModel,
    input: ProjectionInput,
    inflation_rate: f64,
    seed: u64,
    nominal_target_amount: f64,
    target_amount: f64,
    success_probability: f64,
    success_ci_half_width: f64,
    deterministic_path: Option<ProjectionPath>,
    result: Option<ProjectionResult>,
    yearly_bands: Vec<BandPoint>,
    summary: Option<GoalSummary>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn run_cli() -> Result<(), String> {
    let cli = Cli::parse();
    let request = build_request(cli)?;
    let serialized = match request.solve {
        Some(_) => serde_json::to_string_pretty(&execute_solve(&request)?),
        None => serde_json::to_string_pretty(&execute_projection(&request)?),
    };
    let json = serialized.map_err(|e| format!("failed to serialize response: {e}"))?;
    println!("{json}");
    Ok(())
}

fn build_request(cli: Cli) -> Result<ApiRequest, String> {
    if cli.months < 0 {
        return Err("--months must be >= 0".to_string());
    }
    let months = u32::try_from(cli.months).map_err(|_| "--months is too large".to_string())?;

    if cli.simulations < 1 {
        return Err("--simulations must be >= 1".to_string());
    }
    let simulation_count =
        u32::try_from(cli.simulations).map_err(|_| "--simulations is too large".to_string())?;

    if !cli.annual_volatility.is_finite() || cli.annual_volatility < 0.0 {
        return Err("--annual-volatility must be >= 0".to_string());
    }

    if !cli.inflation.is_finite() || cli.inflation <= -100.0 {
        return Err("--inflation must be > -100".to_string());
    }

    if !cli.target_amount.is_finite() || cli.target_amount < 0.0 {
        return Err("--target-amount must be >= 0".to_string());
    }

    let target_amount = match cli.target_inflation {
        Some(rate) if !rate.is_finite() || rate <= -100.0 => {
            return Err("--target-inflation must be > -100".to_string());
        }
        Some(rate) => inflate_target(cli.target_amount, rate / 100.0, months),
        None => cli.target_amount,
    };

    let mut input = ProjectionInput {
        principal: cli.principal,
        monthly_contribution: cli.monthly_contribution,
        months,
        annual_return_rate: cli.annual_return / 100.0,
        annual_volatility: cli.annual_volatility / 100.0,
        target_amount,
        simulation_count,
    };
    if let Some(profile) = cli.risk_profile {
        input = input.with_risk_profile(profile.into());
    }
    input.validate().map_err(|e| e.to_string())?;

    let model = match cli.model {
        CliModel::Compounding => ProjectionModel::Compounding {
            inflation_rate: cli.inflation / 100.0,
        },
        CliModel::MonteCarlo => ProjectionModel::MonteCarlo,
    };

    let solve = match cli.goal_type {
        None => None,
        Some(goal_type) => {
            if cli.solve_simulations < 1 {
                return Err("--solve-simulations must be >= 1".to_string());
            }
            let simulations = u32::try_from(cli.solve_simulations)
                .map_err(|_| "--solve-simulations is too large".to_string())?;
            Some(GoalSolveConfig {
                goal_type: goal_type.into(),
                target_success_probability: cli.success_target,
                search_min: cli.search_min,
                search_max: cli.search_max.unwrap_or(target_amount),
                tolerance: cli.tolerance,
                max_iterations: cli.max_iterations,
                simulations_per_iteration: simulations,
                final_simulations: simulations,
                seed: cli.seed,
            })
        }
    };

    Ok(ApiRequest {
        input,
        model,
        nominal_target_amount: cli.target_amount,
        seed: cli.seed,
        parallel: cli.parallel,
        solve,
    })
}

/// Target grown by `annual_rate` over the horizon, for goals stated in today's money.
fn inflate_target(target: f64, annual_rate: f64, months: u32) -> f64 {
    target * (1.0 + annual_rate).powf(months as f64 / 12.0)
}

fn execute_projection(request: &ApiRequest) -> Result<ProjectResponse, String> {
    let input = &request.input;
    let target = input.target_amount;

    let (deterministic_path, result) = match request.model {
        ProjectionModel::Compounding { .. } => {
            let mut rng = Rng::new(request.seed);
            match run_projection(input, request.model, &mut rng).map_err(|e| e.to_string())? {
                Projection::Deterministic(path) => (Some(path), None),
                Projection::Stochastic(result) => (None, Some(result)),
            }
        }
        ProjectionModel::MonteCarlo => {
            let result =
                run_monte_carlo(input, request.seed, request.parallel).map_err(|e| e.to_string())?;
            (None, Some(result))
        }
    };

    let (success_probability, success_ci_half_width, yearly_bands, summary) =
        match (&deterministic_path, &result) {
            (_, Some(result)) => (
                result.success_probability(target),
                result.success_ci_half_width(target),
                result.yearly_bands(),
                Some(GoalSummary::from_result(input, result)),
            ),
            (Some(path), None) => {
                let single = analyze(std::slice::from_ref(path));
                (single.success_probability(target), 0.0, single.yearly_bands(), None)
            }
            (None, None) => (0.0, 0.0, Vec::new(), None),
        };

    let inflation_rate = match request.model {
        ProjectionModel::Compounding { inflation_rate } => inflation_rate,
        ProjectionModel::MonteCarlo => 0.0,
    };

    Ok(ProjectResponse {
        model: request.model.into(),
        input: input.clone(),
        inflation_rate,
        seed: request.seed,
        nominal_target_amount: request.nominal_target_amount,
        target_amount: target,
        success_probability,
        success_ci_half_width,
        deterministic_path,
        result,
        yearly_bands,
        summary,
    })
}

fn execute_solve(request: &ApiRequest) -> Result<GoalSolveResult, String> {
    let config = request
        .solve
        .ok_or_else(|| "goal type is required to solve".to_string())?;
    solve_goal(&request.input, config).map_err(|e| e.to_string())
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .route("/api/solve", get(solve_get_handler).post(solve_post_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!("goal projection API listening on http://{addr}");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_get_handler(Query(payload): Query<GoalPayload>) -> Response {
    project_handler_impl(payload).await
}

async fn project_post_handler(Json(payload): Json<GoalPayload>) -> Response {
    project_handler_impl(payload).await
}

async fn solve_get_handler(Query(payload): Query<GoalPayload>) -> Response {
    solve_handler_impl(payload).await
}

async fn solve_post_handler(Json(payload): Json<GoalPayload>) -> Response {
    solve_handler_impl(payload).await
}

async fn project_handler_impl(payload: GoalPayload) -> Response {
    let request = match api_request_from_payload(payload, false) {
        Ok(request) => request,
        Err(msg) => {
            warn!("rejected projection request: {msg}");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };
    match execute_projection(&request) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn solve_handler_impl(payload: GoalPayload) -> Response {
    let request = match api_request_from_payload(payload, true) {
        Ok(request) => request,
        Err(msg) => {
            warn!("rejected solve request: {msg}");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };
    match execute_solve(&request) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str, solving: bool) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<GoalPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload, solving)
}

fn api_request_from_payload(payload: GoalPayload, solving: bool) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.principal {
        cli.principal = v;
    }
    if let Some(v) = payload.monthly_contribution {
        cli.monthly_contribution = v;
    }
    if let Some(v) = payload.months {
        cli.months = v;
    }
    if let Some(v) = payload.annual_return {
        cli.annual_return = v;
    }
    if let Some(v) = payload.annual_volatility {
        cli.annual_volatility = v;
    }
    if let Some(v) = payload.inflation {
        cli.inflation = v;
    }
    if let Some(v) = payload.target_amount {
        cli.target_amount = v;
    }
    if payload.target_inflation.is_some() {
        cli.target_inflation = payload.target_inflation;
    }
    if let Some(v) = payload.simulations {
        cli.simulations = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }
    if let Some(v) = payload.model {
        cli.model = v.into();
    }
    if let Some(v) = payload.risk_profile {
        cli.risk_profile = Some(v.into());
    }
    if let Some(v) = payload.parallel {
        cli.parallel = v;
    }

    if solving {
        cli.goal_type = Some(
            payload
                .goal_type
                .map(Into::into)
                .unwrap_or(CliGoalType::RequiredContribution),
        );
    }
    if let Some(v) = payload.success_target {
        cli.success_target = v;
    }
    if let Some(v) = payload.search_min {
        cli.search_min = v;
    }
    if payload.search_max.is_some() {
        cli.search_max = payload.search_max;
    }
    if let Some(v) = payload.tolerance {
        cli.tolerance = v;
    }
    if let Some(v) = payload.max_iterations {
        cli.max_iterations = v;
    }
    if let Some(v) = payload.solve_simulations {
        cli.solve_simulations = v;
    }

    build_request(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        principal: 5_000.0,
        monthly_contribution: 500.0,
        months: 120,
        target_amount: 100_000.0,
        annual_return: 7.0,
        annual_volatility: 15.0,
        inflation: 0.0,
        target_inflation: None,
        simulations: 1_000,
        seed: 42,
        model: CliModel::MonteCarlo,
        risk_profile: None,
        parallel: true,
        goal_type: None,
        success_target: 80.0,
        search_min: 0.0,
        search_max: None,
        tolerance: 1.0,
        max_iterations: 40,
        solve_simulations: 500,
    }
}
