mod allocation;
mod error;
mod projection;
mod simulation;
mod sweep;
mod types;

pub use allocation::{AllocationPreset, RiskTolerance, ensure_complete, normalize, preset_for};
pub use error::{InvalidInputError, RemoteCallError};
pub use projection::{alternative_paths, project};
pub use simulation::{compare, run_simulation, validate_request};
pub use sweep::{
    ClosedFormEvaluator, LocalSimulator, RateSource, Scenario, ScenarioEvaluator, ScenarioOutcome,
    SweepBase, SweepDriver, SweepOutcome, SweepTracker, summarize, sweep,
};
pub use types::{
    AllocationSet, Comparison, DEFAULT_ANNUAL_RATE_PERCENT, FailedCandidate, GoalPath, GoalPlan,
    ProjectionInput, ProjectionResult, SimulationEnvelope, SimulationMode, SimulationRequest,
    SimulationResult, SimulationStatistics, SweepField, SweepPoint, SweepReport, SweepSummary,
    YearlyProjection,
};
