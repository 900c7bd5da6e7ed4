use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinSet;

use super::error::{InvalidInputError, RemoteCallError, millis};
use super::projection::project;
use super::simulation::{run_simulation, weighted_return};
use super::types::{
    AllocationSet, FailedCandidate, ProjectionInput, SimulationRequest, SimulationResult,
    SweepField, SweepPoint, SweepReport, SweepSummary,
};

/// The fixed inputs of a sweep. `template` carries the simulation settings
/// that the closed-form projection has no notion of (allocation, inflation,
/// rebalancing, mode).
#[derive(Debug, Clone, PartialEq)]
pub struct SweepBase {
    pub input: ProjectionInput,
    pub template: SimulationRequest,
}

impl SweepBase {
    pub fn new(input: ProjectionInput, template: SimulationRequest) -> Self {
        Self { input, template }
    }

    /// Derives one candidate scenario with only `field` replaced.
    pub fn scenario_for(&self, field: SweepField, value: f64) -> Result<Scenario, InvalidInputError> {
        if !value.is_finite() {
            return Err(InvalidInputError::NotFinite {
                field: "candidate",
            });
        }

        let mut input = self.input;
        let mut request = self.template.clone();
        request.initial_investment = input.initial_capital;
        request.monthly_contribution = input.monthly_contribution;
        request.time_horizon = input.duration_years;

        match field {
            SweepField::InitialCapital => {
                input.initial_capital = value;
                request.initial_investment = value;
            }
            SweepField::MonthlyContribution => {
                input.monthly_contribution = value;
                request.monthly_contribution = value;
            }
            SweepField::DurationYears => {
                if value < 1.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
                    return Err(InvalidInputError::NotPositive {
                        field: "durationYears",
                    });
                }
                input.duration_years = value as u32;
                request.time_horizon = value as u32;
            }
            SweepField::StockAllocationPercent => {
                if !(0.0..=100.0).contains(&value) {
                    return Err(InvalidInputError::AllocationTotal { total: value });
                }
                request.asset_allocations = AllocationSet::from_pairs([
                    ("stocks", value),
                    ("bonds", 100.0 - value),
                    ("reits", 0.0),
                    ("cash", 0.0),
                ]);
            }
        }

        Ok(Scenario { input, request })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub input: ProjectionInput,
    pub request: SimulationRequest,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioOutcome {
    pub final_value: f64,
    pub total_returns: f64,
    pub total_contributions: f64,
}

impl From<&SimulationResult> for ScenarioOutcome {
    fn from(result: &SimulationResult) -> Self {
        Self {
            final_value: result.final_value,
            total_returns: result.total_returns,
            total_contributions: result.total_contributions,
        }
    }
}

pub trait ScenarioEvaluator: Send + Sync + 'static {
    fn evaluate(
        &self,
        scenario: Scenario,
    ) -> impl Future<Output = Result<ScenarioOutcome, RemoteCallError>> + Send;
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RateSource {
    /// Use `ProjectionInput::annual_rate_percent` as given.
    Fixed,
    /// Replace the rate with the allocation's expected return, so a stock
    /// allocation sweep moves the closed-form result.
    AllocationWeighted,
}

#[derive(Copy, Clone, Debug)]
pub struct ClosedFormEvaluator {
    pub rate: RateSource,
}

impl ScenarioEvaluator for ClosedFormEvaluator {
    async fn evaluate(&self, scenario: Scenario) -> Result<ScenarioOutcome, RemoteCallError> {
        let mut input = scenario.input;
        if self.rate == RateSource::AllocationWeighted {
            input.annual_rate_percent = weighted_return(&scenario.request.asset_allocations);
        }
        let projection = project(&input, 0.0)?;
        let total_contributions =
            input.initial_capital + input.monthly_contribution * input.months() as f64;
        Ok(ScenarioOutcome {
            final_value: projection.projected_value,
            total_returns: projection.projected_value - total_contributions,
            total_contributions,
        })
    }
}

/// Runs the full simulation engine in-process.
#[derive(Copy, Clone, Debug, Default)]
pub struct LocalSimulator;

impl ScenarioEvaluator for LocalSimulator {
    async fn evaluate(&self, scenario: Scenario) -> Result<ScenarioOutcome, RemoteCallError> {
        let result = tokio::task::spawn_blocking(move || run_simulation(&scenario.request))
            .await
            .map_err(|e| RemoteCallError::TaskFailed(e.to_string()))??;
        Ok(ScenarioOutcome::from(&result))
    }
}

/// Evaluates every candidate concurrently and returns the points in candidate
/// order. Failed candidates are left out of `points` and listed in
/// `failed_candidates`; the summary covers the surviving points only.
pub async fn sweep<E: ScenarioEvaluator>(
    base: &SweepBase,
    field: SweepField,
    candidates: &[f64],
    evaluator: Arc<E>,
    candidate_timeout: Option<Duration>,
) -> SweepReport {
    let mut failures: Vec<(usize, FailedCandidate)> = Vec::new();
    let mut pending = vec![false; candidates.len()];
    let mut tasks = JoinSet::new();

    for (index, &value) in candidates.iter().enumerate() {
        let scenario = match base.scenario_for(field, value) {
            Ok(scenario) => scenario,
            Err(err) => {
                failures.push((index, failed(value, &RemoteCallError::from(err))));
                continue;
            }
        };
        pending[index] = true;
        let evaluator = Arc::clone(&evaluator);
        tasks.spawn(async move {
            let outcome = match candidate_timeout {
                Some(limit) => tokio::time::timeout(limit, evaluator.evaluate(scenario))
                    .await
                    .unwrap_or(Err(RemoteCallError::Timeout {
                        millis: millis(limit),
                    })),
                None => evaluator.evaluate(scenario).await,
            };
            (index, outcome)
        });
    }

    let mut points: Vec<(usize, SweepPoint)> = Vec::with_capacity(candidates.len());
    while let Some(joined) = tasks.join_next().await {
        let (index, outcome) = match joined {
            Ok(done) => done,
            Err(err) => {
                tracing::error!("sweep candidate task failed: {err}");
                continue;
            }
        };
        pending[index] = false;
        let value = candidates[index];
        match outcome {
            Ok(outcome) => points.push((
                index,
                SweepPoint {
                    varied_value: value,
                    final_value: outcome.final_value,
                    total_returns: outcome.total_returns,
                    total_contributions: outcome.total_contributions,
                },
            )),
            Err(err) => {
                tracing::warn!(?field, value, "sweep candidate failed: {err}");
                failures.push((index, failed(value, &err)));
            }
        }
    }

    for (index, _) in pending.iter().enumerate().filter(|(_, still)| **still) {
        failures.push((
            index,
            FailedCandidate {
                varied_value: candidates[index],
                reason: "evaluation task aborted".to_string(),
            },
        ));
    }

    points.sort_by_key(|(index, _)| *index);
    failures.sort_by_key(|(index, _)| *index);
    let points: Vec<SweepPoint> = points.into_iter().map(|(_, point)| point).collect();

    tracing::debug!(
        ?field,
        evaluated = points.len(),
        failed = failures.len(),
        "sweep finished"
    );

    SweepReport {
        generation: 0,
        field,
        summary: summarize(&points),
        points,
        failed_candidates: failures.into_iter().map(|(_, failure)| failure).collect(),
    }
}

pub fn summarize(points: &[SweepPoint]) -> Option<SweepSummary> {
    if points.is_empty() {
        return None;
    }
    let best = points.iter().map(|p| p.final_value).fold(f64::NEG_INFINITY, f64::max);
    let worst = points.iter().map(|p| p.final_value).fold(f64::INFINITY, f64::min);
    let average = points.iter().map(|p| p.final_value).sum::<f64>() / points.len() as f64;
    Some(SweepSummary {
        best,
        average,
        variance: best - worst,
    })
}

fn failed(value: f64, err: &RemoteCallError) -> FailedCandidate {
    FailedCandidate {
        varied_value: value,
        reason: err.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SweepOutcome {
    Current(SweepReport),
    /// A newer sweep started before this one finished; its result must not
    /// replace the newer one.
    Superseded { generation: u64, latest: u64 },
}

/// Stamps sweeps with increasing generations so late finishers can be
/// discarded.
#[derive(Debug, Default)]
pub struct SweepTracker {
    latest: AtomicU64,
}

impl SweepTracker {
    pub fn begin(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.latest() == generation
    }
}

/// Runs sweeps for many callers. Supersession is tracked per sweep id, so
/// only a newer sweep under the same id can discard an older one.
pub struct SweepDriver<E> {
    evaluator: Arc<E>,
    candidate_timeout: Option<Duration>,
    trackers: Mutex<HashMap<String, Arc<SweepTracker>>>,
}

impl<E: ScenarioEvaluator> SweepDriver<E> {
    pub fn new(evaluator: E) -> Self {
        Self {
            evaluator: Arc::new(evaluator),
            candidate_timeout: None,
            trackers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_candidate_timeout(mut self, limit: Duration) -> Self {
        self.candidate_timeout = Some(limit);
        self
    }

    /// Without a `sweep_id` the sweep is always current and reports
    /// generation 0.
    pub async fn run(
        &self,
        sweep_id: Option<&str>,
        base: &SweepBase,
        field: SweepField,
        candidates: &[f64],
    ) -> SweepOutcome {
        let claim = sweep_id.map(|id| {
            let tracker = self.tracker_for(id);
            let generation = tracker.begin();
            (tracker, generation)
        });

        let mut report = sweep(
            base,
            field,
            candidates,
            Arc::clone(&self.evaluator),
            self.candidate_timeout,
        )
        .await;

        if let Some((tracker, generation)) = claim {
            if !tracker.is_current(generation) {
                let latest = tracker.latest();
                tracing::info!(?sweep_id, generation, latest, "discarding superseded sweep");
                return SweepOutcome::Superseded { generation, latest };
            }
            report.generation = generation;
        }
        SweepOutcome::Current(report)
    }

    fn tracker_for(&self, sweep_id: &str) -> Arc<SweepTracker> {
        let mut trackers = self
            .trackers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(trackers.entry(sweep_id.to_string()).or_default())
    }
}
