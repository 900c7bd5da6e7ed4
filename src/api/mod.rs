use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::core::{
    AllocationSet, Comparison, GoalPath, InvalidInputError, LocalSimulator, ProjectionInput,
    ProjectionResult, RiskTolerance, SimulationEnvelope, SimulationRequest, SimulationResult,
    SweepBase, SweepDriver, SweepField, SweepOutcome, SweepReport, alternative_paths, compare,
    normalize, preset_for, project, run_simulation, validate_request,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("sweep {generation} was superseded by sweep {latest}")]
    Superseded { generation: u64, latest: u64 },
    #[error("{0}")]
    Internal(String),
}

impl From<InvalidInputError> for ApiError {
    fn from(err: InvalidInputError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid API JSON payload: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Superseded { .. } => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::debug!(%status, "request rejected: {self}");
        error_response(status, &self.to_string())
    }
}

#[derive(Clone)]
pub struct AppState {
    whatif: Arc<SweepDriver<LocalSimulator>>,
    annual_rate_percent: f64,
}

impl AppState {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            whatif: Arc::new(
                SweepDriver::new(LocalSimulator).with_candidate_timeout(config.candidate_timeout()),
            ),
            annual_rate_percent: config.annual_rate_percent,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    service: &'static str,
    status: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CompareRequest {
    scenarios: Vec<SimulationRequest>,
}

#[derive(Debug, Serialize)]
struct CompareResponse {
    success: bool,
    scenarios: Vec<SimulationResult>,
    comparison: Comparison,
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OptimizeRequest {
    risk_tolerance: RiskTolerance,
    time_horizon: u32,
    initial_investment: f64,
    monthly_contribution: f64,
}

impl Default for OptimizeRequest {
    fn default() -> Self {
        Self {
            risk_tolerance: RiskTolerance::Moderate,
            time_horizon: 10,
            initial_investment: 10_000.0,
            monthly_contribution: 500.0,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OptimizeResponse {
    success: bool,
    optimal_allocation: AllocationSet,
    projected_result: SimulationResult,
    risk_level: RiskTolerance,
    rationale: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WhatIfRequest {
    #[serde(flatten)]
    base: SimulationRequest,
    parameter: SweepField,
    #[serde(default)]
    candidates: Option<Vec<f64>>,
    /// Sweeps sharing an id supersede each other; anonymous sweeps never do.
    #[serde(default)]
    sweep_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WhatIfResponse {
    success: bool,
    #[serde(flatten)]
    report: SweepReport,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoalRequest {
    initial_capital: f64,
    monthly_contribution: f64,
    #[serde(default)]
    annual_rate_percent: Option<f64>,
    duration_years: u32,
    target_amount: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoalResponse {
    success: bool,
    #[serde(flatten)]
    result: ProjectionResult,
    alternative_paths: Vec<GoalPath>,
}

#[derive(Debug, Serialize)]
struct NormalizeResponse {
    success: bool,
    allocations: AllocationSet,
    total: f64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/simulator/health", get(health_handler))
        .route("/api/simulator/run", post(run_handler))
        .route("/api/simulator/compare", post(compare_handler))
        .route("/api/simulator/optimize", post(optimize_handler))
        .route("/api/simulator/whatif", post(whatif_handler))
        .route("/api/goals/project", post(goal_handler))
        .route("/api/allocations/normalize", post(normalize_handler))
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_http_server(config: &ServiceConfig) -> std::io::Result<()> {
    let addr = config.addr();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("FinAgent simulator API listening on http://{addr}");
    serve(listener, AppState::new(config)).await
}

pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

async fn health_handler() -> Response {
    json_response(
        StatusCode::OK,
        HealthResponse {
            service: "Investment Simulator API",
            status: "UP",
        },
    )
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn run_handler(
    payload: Result<Json<SimulationRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let envelope = blocking(move || run_envelope(&request)).await?;
    Ok(json_response(StatusCode::OK, envelope))
}

async fn compare_handler(
    payload: Result<Json<CompareRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    Ok(json_response(
        StatusCode::OK,
        blocking(move || compare_scenarios(request)).await?,
    ))
}

async fn optimize_handler(
    payload: Result<Json<OptimizeRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    Ok(json_response(
        StatusCode::OK,
        blocking(move || optimize(request)).await?,
    ))
}

async fn whatif_handler(
    State(state): State<AppState>,
    payload: Result<Json<WhatIfRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    validate_request(&request.base)?;

    let candidates = request
        .candidates
        .unwrap_or_else(|| request.parameter.default_candidates().to_vec());
    let base = sweep_base(request.base, state.annual_rate_percent);

    let sweep_id = request.sweep_id.as_deref();
    match state
        .whatif
        .run(sweep_id, &base, request.parameter, &candidates)
        .await
    {
        SweepOutcome::Current(report) => Ok(json_response(
            StatusCode::OK,
            WhatIfResponse {
                success: true,
                report,
            },
        )),
        SweepOutcome::Superseded { generation, latest } => {
            Err(ApiError::Superseded { generation, latest })
        }
    }
}

async fn goal_handler(
    State(state): State<AppState>,
    payload: Result<Json<GoalRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    Ok(json_response(
        StatusCode::OK,
        goal_projection(request, state.annual_rate_percent)?,
    ))
}

async fn normalize_handler(
    payload: Result<Json<AllocationSet>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(weights) = payload?;
    let allocations = normalize(&weights);
    Ok(json_response(
        StatusCode::OK,
        NormalizeResponse {
            success: true,
            total: allocations.total(),
            allocations,
        },
    ))
}

/// Simulations are CPU-bound, so they run off the async worker threads.
async fn blocking<T, F>(job: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job).await.map_err(|e| {
        tracing::error!("simulation task failed: {e}");
        ApiError::Internal("simulation task failed".to_string())
    })?
}

fn run_envelope(request: &SimulationRequest) -> Result<SimulationEnvelope, ApiError> {
    let result = run_simulation(request)?;
    Ok(SimulationEnvelope {
        success: true,
        result: Some(result),
        error: None,
    })
}

fn compare_scenarios(request: CompareRequest) -> Result<CompareResponse, ApiError> {
    if request.scenarios.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one scenario is required".to_string(),
        ));
    }
    let scenarios = request
        .scenarios
        .iter()
        .map(run_simulation)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CompareResponse {
        success: true,
        comparison: compare(&scenarios),
        scenarios,
    })
}

fn optimize(request: OptimizeRequest) -> Result<OptimizeResponse, ApiError> {
    let preset = preset_for(request.risk_tolerance);
    let simulation = SimulationRequest {
        initial_investment: request.initial_investment,
        monthly_contribution: request.monthly_contribution,
        time_horizon: request.time_horizon,
        asset_allocations: preset.allocation.clone(),
        ..SimulationRequest::default()
    };
    Ok(OptimizeResponse {
        success: true,
        projected_result: run_simulation(&simulation)?,
        optimal_allocation: preset.allocation,
        risk_level: request.risk_tolerance,
        rationale: preset.rationale,
    })
}

fn goal_projection(request: GoalRequest, default_rate: f64) -> Result<GoalResponse, ApiError> {
    let input = ProjectionInput {
        initial_capital: request.initial_capital,
        monthly_contribution: request.monthly_contribution,
        annual_rate_percent: request.annual_rate_percent.unwrap_or(default_rate),
        duration_years: request.duration_years,
    };
    Ok(GoalResponse {
        success: true,
        result: project(&input, request.target_amount)?,
        alternative_paths: alternative_paths(&input, request.target_amount)?,
    })
}

fn sweep_base(template: SimulationRequest, annual_rate_percent: f64) -> SweepBase {
    SweepBase::new(
        ProjectionInput {
            initial_capital: template.initial_investment,
            monthly_contribution: template.monthly_contribution,
            annual_rate_percent,
            duration_years: template.time_horizon,
        },
        template,
    )
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
            success: false,
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GoalPlan, SimulationMode};

    fn assert_approx(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn run_envelope_serializes_camel_case_result() {
        let request: SimulationRequest = serde_json::from_str(
            r#"{
              "initialInvestment": 10000,
              "monthlyContribution": 500,
              "timeHorizon": 10,
              "assetAllocations": {"stocks": 50, "bonds": 30, "reits": 10, "cash": 10},
              "includeInflation": true,
              "inflationRate": 3.0,
              "includeRebalancing": true,
              "rebalancingFrequency": 12,
              "simulationMode": "simple"
            }"#,
        )
        .expect("json should parse");

        let envelope = run_envelope(&request).expect("valid request");
        let json = serde_json::to_string(&envelope).expect("response should serialize");
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"finalValue\""));
        assert!(json.contains("\"yearlyProjections\""));
        assert!(json.contains("\"portfolioValue\""));
        assert!(json.contains("\"realValue\""));
        assert!(json.contains("\"probabilityOfSuccess\":null"));
        assert!(json.contains("\"simulationMode\":\"simple\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn run_envelope_rejects_incomplete_allocation() {
        let request = SimulationRequest {
            asset_allocations: AllocationSet::from_pairs([("stocks", 50.0)]),
            ..SimulationRequest::default()
        };
        let err = run_envelope(&request).expect_err("must reject");
        assert!(err.to_string().contains("sum to 100%"));
    }

    #[test]
    fn compare_requires_scenarios_and_summarises_them() {
        assert!(compare_scenarios(CompareRequest::default()).is_err());

        let request: CompareRequest = serde_json::from_str(
            r#"{"scenarios": [{"timeHorizon": 5}, {"timeHorizon": 20}]}"#,
        )
        .expect("json should parse");
        let response = compare_scenarios(request).expect("valid scenarios");
        assert_eq!(response.scenarios.len(), 2);
        assert_eq!(response.comparison.total_scenarios, 2);
        assert_approx(
            response.comparison.max_final_value,
            response.scenarios[1].final_value,
            1e-9,
        );
    }

    #[test]
    fn optimize_uses_risk_preset() {
        let request: OptimizeRequest =
            serde_json::from_str(r#"{"riskTolerance": "aggressive", "timeHorizon": 15}"#)
                .expect("json should parse");
        let response = optimize(request).expect("preset is valid");
        assert_eq!(response.risk_level, RiskTolerance::Aggressive);
        assert_eq!(response.optimal_allocation.get("stocks"), Some(60.0));
        assert_eq!(response.projected_result.yearly_projections.len(), 15);
        assert_eq!(response.projected_result.simulation_mode, SimulationMode::Simple);
    }

    #[test]
    fn goal_projection_defaults_the_rate() {
        let request: GoalRequest = serde_json::from_str(
            r#"{"initialCapital": 10000, "monthlyContribution": 500, "durationYears": 10, "targetAmount": 1000000}"#,
        )
        .expect("json should parse");
        let response = goal_projection(request, 8.0).expect("valid input");
        assert_approx(response.result.projected_value, 113_669.419_936, 1e-3);
        assert_eq!(response.alternative_paths[0].plan, GoalPlan::Aggressive);
        assert_eq!(response.alternative_paths[0].years, 5);

        let json = serde_json::to_string(&response).expect("serializes");
        assert!(json.contains("\"projectedValue\""));
        assert!(json.contains("\"alternativePaths\""));
        assert!(json.contains("\"onTrack\":false"));
    }

    #[test]
    fn goal_projection_rejects_zero_duration() {
        let request = GoalRequest {
            initial_capital: 1.0,
            monthly_contribution: 1.0,
            annual_rate_percent: None,
            duration_years: 0,
            target_amount: 10.0,
        };
        let err = goal_projection(request, 8.0).expect_err("must reject");
        assert!(err.to_string().contains("durationYears"));
    }

    #[test]
    fn whatif_request_accepts_ui_parameter_names() {
        let request: WhatIfRequest = serde_json::from_str(
            r#"{"parameter": "timeHorizon", "initialInvestment": 2500, "monthlyContribution": 100}"#,
        )
        .expect("json should parse");
        assert_eq!(request.parameter, SweepField::DurationYears);
        assert!(request.candidates.is_none());
        assert!(request.sweep_id.is_none());
        assert_approx(request.base.initial_investment, 2_500.0, 1e-12);
        assert_eq!(request.base.time_horizon, 10);

        let base = sweep_base(request.base, 8.0);
        assert_eq!(base.input.duration_years, 10);
        assert_approx(base.input.monthly_contribution, 100.0, 1e-12);
    }

    #[test]
    fn superseded_sweeps_map_to_conflict() {
        let response = ApiError::Superseded {
            generation: 1,
            latest: 2,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );
    }

    #[test]
    fn whatif_request_carries_sweep_id() {
        let request: WhatIfRequest = serde_json::from_str(
            r#"{"parameter": "monthlyContribution", "candidates": [100, 200], "sweepId": "tab-1"}"#,
        )
        .expect("json should parse");
        assert_eq!(request.sweep_id.as_deref(), Some("tab-1"));
        assert_eq!(request.candidates, Some(vec![100.0, 200.0]));
    }
}
