use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use finagent::client::RemoteSimulator;
use finagent::config::{RemoteConfig, ServiceConfig};
use finagent::core::{
    AllocationSet, ClosedFormEvaluator, DEFAULT_ANNUAL_RATE_PERCENT, LocalSimulator,
    ProjectionInput, RateSource, ScenarioEvaluator, SimulationMode, SimulationRequest, SweepBase,
    SweepField, SweepReport, alternative_paths, normalize, project, sweep,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliSweepField {
    InitialCapital,
    MonthlyContribution,
    DurationYears,
    StockAllocationPercent,
}

impl From<CliSweepField> for SweepField {
    fn from(value: CliSweepField) -> Self {
        match value {
            CliSweepField::InitialCapital => SweepField::InitialCapital,
            CliSweepField::MonthlyContribution => SweepField::MonthlyContribution,
            CliSweepField::DurationYears => SweepField::DurationYears,
            CliSweepField::StockAllocationPercent => SweepField::StockAllocationPercent,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliSimulationMode {
    Simple,
    MonteCarlo,
    Optimistic,
    Pessimistic,
    /// Closed-form annuity projection instead of the simulation engine
    ClosedForm,
}

#[derive(Parser, Debug)]
#[command(
    name = "finagent",
    about = "Goal projections, what-if sweeps and portfolio simulation for FinAgent"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP simulation API
    Serve {
        #[command(flatten)]
        service: ServiceConfig,
    },
    /// Project a savings goal with the annuity formula
    Project {
        #[arg(long)]
        initial_capital: f64,
        #[arg(long)]
        monthly_contribution: f64,
        #[arg(long, default_value_t = DEFAULT_ANNUAL_RATE_PERCENT)]
        annual_rate_percent: f64,
        #[arg(long)]
        duration_years: u32,
        #[arg(long)]
        target_amount: f64,
    },
    /// Rescale weights such as `stocks=33 bonds=33 cash=33` to sum to 100
    Normalize {
        #[arg(required = true, value_parser = parse_weight)]
        weights: Vec<(String, f64)>,
    },
    /// Vary one input across candidate values and compare outcomes
    Sweep {
        #[arg(long, value_enum)]
        field: CliSweepField,
        #[arg(long, value_delimiter = ',', help = "Candidate values; defaults to the field's preset")]
        candidates: Option<Vec<f64>>,
        #[arg(long, default_value_t = 10_000.0)]
        initial_capital: f64,
        #[arg(long, default_value_t = 500.0)]
        monthly_contribution: f64,
        #[arg(long, default_value_t = 10)]
        duration_years: u32,
        #[arg(long, default_value_t = DEFAULT_ANNUAL_RATE_PERCENT)]
        annual_rate_percent: f64,
        #[arg(long, value_enum, default_value_t = CliSimulationMode::Simple)]
        mode: CliSimulationMode,
        #[arg(long, help = "Monte Carlo seed")]
        seed: Option<u64>,
        #[command(flatten)]
        remote: RemoteConfig,
    },
}

fn parse_weight(raw: &str) -> Result<(String, f64), String> {
    let (name, weight) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=WEIGHT, got `{raw}`"))?;
    let weight = weight
        .parse::<f64>()
        .map_err(|e| format!("invalid weight for {name}: {e}"))?;
    if name.is_empty() {
        return Err(format!("missing asset name in `{raw}`"));
    }
    Ok((name.to_string(), weight))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectOutput {
    #[serde(flatten)]
    result: finagent::core::ProjectionResult,
    alternative_paths: Vec<finagent::core::GoalPath>,
}

#[tokio::main]
async fn main() {
    finagent::logging::init_tracing();
    let cli = Cli::parse();
    if let Err(e) = run(cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Serve { service } => {
            service.validate()?;
            finagent::api::run_http_server(&service)
                .await
                .map_err(|e| format!("Server error: {e}"))
        }
        Command::Project {
            initial_capital,
            monthly_contribution,
            annual_rate_percent,
            duration_years,
            target_amount,
        } => {
            let input = ProjectionInput {
                initial_capital,
                monthly_contribution,
                annual_rate_percent,
                duration_years,
            };
            let output = ProjectOutput {
                result: project(&input, target_amount).map_err(|e| e.to_string())?,
                alternative_paths: alternative_paths(&input, target_amount)
                    .map_err(|e| e.to_string())?,
            };
            print_json(&output)
        }
        Command::Normalize { weights } => print_json(&normalize(&AllocationSet::from_pairs(weights))),
        Command::Sweep {
            field,
            candidates,
            initial_capital,
            monthly_contribution,
            duration_years,
            annual_rate_percent,
            mode,
            seed,
            remote,
        } => {
            remote.validate()?;
            let field = SweepField::from(field);
            let candidates = candidates.unwrap_or_else(|| field.default_candidates().to_vec());
            let template = SimulationRequest {
                initial_investment: initial_capital,
                monthly_contribution,
                time_horizon: duration_years,
                simulation_mode: match mode {
                    CliSimulationMode::MonteCarlo => SimulationMode::MonteCarlo,
                    CliSimulationMode::Optimistic => SimulationMode::Optimistic,
                    CliSimulationMode::Pessimistic => SimulationMode::Pessimistic,
                    CliSimulationMode::Simple | CliSimulationMode::ClosedForm => {
                        SimulationMode::Simple
                    }
                },
                seed,
                ..SimulationRequest::default()
            };
            let base = SweepBase::new(
                ProjectionInput {
                    initial_capital,
                    monthly_contribution,
                    annual_rate_percent,
                    duration_years,
                },
                template,
            );

            let report = match (&remote.simulator_url, mode) {
                (Some(url), _) => {
                    let simulator = RemoteSimulator::new(url, remote.request_timeout())
                        .map_err(|e| e.to_string())?;
                    run_sweep(simulator, &base, field, &candidates, &remote).await
                }
                (None, CliSimulationMode::ClosedForm) => {
                    let rate = if field == SweepField::StockAllocationPercent {
                        RateSource::AllocationWeighted
                    } else {
                        RateSource::Fixed
                    };
                    run_sweep(ClosedFormEvaluator { rate }, &base, field, &candidates, &remote).await
                }
                (None, _) => run_sweep(LocalSimulator, &base, field, &candidates, &remote).await,
            };
            print_json(&report)
        }
    }
}

async fn run_sweep<E: ScenarioEvaluator>(
    evaluator: E,
    base: &SweepBase,
    field: SweepField,
    candidates: &[f64],
    remote: &RemoteConfig,
) -> SweepReport {
    let report = sweep(
        base,
        field,
        candidates,
        Arc::new(evaluator),
        Some(remote.request_timeout()),
    )
    .await;
    if !report.failed_candidates.is_empty() {
        tracing::warn!(
            failed = report.failed_candidates.len(),
            "some sweep candidates could not be evaluated"
        );
    }
    report
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}
