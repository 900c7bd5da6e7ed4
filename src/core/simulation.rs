use std::f64::consts::PI;

use super::allocation::ensure_complete;
use super::error::{InvalidInputError, non_negative};
use super::types::{
    AllocationSet, Comparison, SimulationMode, SimulationRequest, SimulationResult,
    SimulationStatistics, YearlyProjection,
};

const MONTE_CARLO_PATHS: u32 = 1_000;
const DEFAULT_SEED: u64 = 42;
const RISK_FREE_RATE_PERCENT: f64 = 3.0;

#[derive(Debug, Clone, Copy)]
struct AssetProfile {
    expected_return: f64,
    volatility: f64,
}

/// Long-run annual return and volatility assumptions, in percent.
fn asset_profile(asset: &str) -> AssetProfile {
    let (expected_return, volatility) = match asset.to_ascii_lowercase().as_str() {
        "stocks" => (10.0, 18.0),
        "bonds" => (5.0, 6.0),
        "reits" => (8.0, 15.0),
        "crypto" => (25.0, 80.0),
        "cash" => (3.0, 0.5),
        "commodities" => (6.0, 20.0),
        "international" => (9.0, 22.0),
        _ => (7.0, 15.0),
    };
    AssetProfile {
        expected_return,
        volatility,
    }
}

#[derive(Debug, Clone, Copy)]
struct CaseMultipliers {
    return_scale: f64,
    best_case: f64,
    worst_case: f64,
}

#[derive(Debug)]
struct PathOutcome {
    final_value: f64,
    total_contributions: f64,
    final_real_value: f64,
    projections: Vec<YearlyProjection>,
    breakdown: AllocationSet,
}

pub fn run_simulation(request: &SimulationRequest) -> Result<SimulationResult, InvalidInputError> {
    validate_request(request)?;

    let result = match request.simulation_mode {
        SimulationMode::Simple => run_deterministic(
            request,
            CaseMultipliers {
                return_scale: 1.0,
                best_case: 1.5,
                worst_case: 0.7,
            },
        ),
        SimulationMode::Optimistic => run_deterministic(
            request,
            CaseMultipliers {
                return_scale: 1.3,
                best_case: 1.2,
                worst_case: 0.9,
            },
        ),
        SimulationMode::Pessimistic => run_deterministic(
            request,
            CaseMultipliers {
                return_scale: 0.6,
                best_case: 1.1,
                worst_case: 0.8,
            },
        ),
        SimulationMode::MonteCarlo => run_monte_carlo(request),
    };
    Ok(result)
}

pub fn compare(results: &[SimulationResult]) -> Comparison {
    if results.is_empty() {
        return Comparison {
            max_final_value: 0.0,
            min_final_value: 0.0,
            average_final_value: 0.0,
            total_scenarios: 0,
        };
    }

    let finals = results.iter().map(|r| r.final_value);
    let max_final_value = finals.clone().fold(f64::NEG_INFINITY, f64::max);
    let min_final_value = finals.clone().fold(f64::INFINITY, f64::min);
    let average_final_value = finals.sum::<f64>() / results.len() as f64;
    Comparison {
        max_final_value,
        min_final_value,
        average_final_value,
        total_scenarios: results.len(),
    }
}

pub fn validate_request(request: &SimulationRequest) -> Result<(), InvalidInputError> {
    non_negative("initialInvestment", request.initial_investment)?;
    non_negative("monthlyContribution", request.monthly_contribution)?;
    if request.time_horizon == 0 {
        return Err(InvalidInputError::NotPositive {
            field: "timeHorizon",
        });
    }
    if request.include_inflation {
        non_negative("inflationRate", request.inflation_rate)?;
    }
    ensure_complete(&request.asset_allocations)
}

fn run_deterministic(request: &SimulationRequest, case: CaseMultipliers) -> SimulationResult {
    let path = run_path(request, true, |asset| {
        asset_profile(asset).expected_return / 100.0 * case.return_scale
    });

    let expected_return = weighted_return(&request.asset_allocations) * case.return_scale;
    let volatility = portfolio_volatility(&request.asset_allocations);
    let statistics = SimulationStatistics {
        best_case_value: path.final_value * case.best_case,
        worst_case_value: path.final_value * case.worst_case,
        median_value: path.final_value,
        standard_deviation: volatility,
        sharpe_ratio: (volatility > 0.0)
            .then(|| (expected_return - RISK_FREE_RATE_PERCENT) / volatility),
        max_drawdown: Some(volatility * 2.0),
        probability_of_success: None,
    };

    SimulationResult {
        final_value: path.final_value,
        total_contributions: path.total_contributions,
        total_returns: path.final_value - path.total_contributions,
        real_return_after_inflation: path.final_real_value - path.total_contributions,
        average_annual_return: expected_return,
        yearly_projections: path.projections,
        final_asset_breakdown: path.breakdown,
        statistics: Some(statistics),
        simulation_mode: request.simulation_mode,
    }
}

fn run_monte_carlo(request: &SimulationRequest) -> SimulationResult {
    let base_seed = request.seed.unwrap_or(DEFAULT_SEED);
    let mut finals = Vec::with_capacity(MONTE_CARLO_PATHS as usize);
    for path_id in 0..MONTE_CARLO_PATHS {
        let mut rng = Rng::new(derive_seed(base_seed, path_id));
        let path = run_path(request, false, |asset| {
            let profile = asset_profile(asset);
            (profile.expected_return + profile.volatility * rng.standard_normal()) / 100.0
        });
        finals.push(path.final_value);
    }

    let expected = run_path(request, true, |asset| {
        asset_profile(asset).expected_return / 100.0
    });

    let n = finals.len() as f64;
    let mean = finals.iter().sum::<f64>() / n;
    let variance = finals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let doubled = request.initial_investment * 2.0;
    let successes = finals.iter().filter(|v| **v >= doubled).count();

    let worst_case_value = percentile(&mut finals, 5.0);
    let median_value = percentile(&mut finals, 50.0);
    let best_case_value = percentile(&mut finals, 95.0);

    let statistics = SimulationStatistics {
        best_case_value,
        worst_case_value,
        median_value,
        standard_deviation: variance.sqrt(),
        sharpe_ratio: None,
        max_drawdown: None,
        probability_of_success: Some(successes as f64 / n * 100.0),
    };

    let deflator = inflation_deflator(request, request.time_horizon);
    SimulationResult {
        final_value: median_value,
        total_contributions: expected.total_contributions,
        total_returns: median_value - expected.total_contributions,
        real_return_after_inflation: median_value / deflator - expected.total_contributions,
        average_annual_return: weighted_return(&request.asset_allocations),
        yearly_projections: expected.projections,
        final_asset_breakdown: expected.breakdown,
        statistics: Some(statistics),
        simulation_mode: SimulationMode::MonteCarlo,
    }
}

/// One year-by-year path. Contributions land at the start of each year and
/// are split by target weight; `annual_return` yields a fractional return per
/// asset per year.
fn run_path<F>(request: &SimulationRequest, record: bool, mut annual_return: F) -> PathOutcome
where
    F: FnMut(&str) -> f64,
{
    let targets = &request.asset_allocations;
    let mut assets = AllocationSet::from_pairs(
        targets
            .iter()
            .map(|(name, weight)| (name, request.initial_investment * weight / 100.0)),
    );
    let rebalance_every = (request.rebalancing_frequency / 12).max(1);
    let yearly_contribution = request.monthly_contribution * 12.0;

    let mut total_contributions = request.initial_investment;
    let mut projections = Vec::with_capacity(if record { request.time_horizon as usize } else { 0 });
    let mut portfolio_value = request.initial_investment;

    for year in 1..=request.time_horizon {
        total_contributions += yearly_contribution;
        for ((_, value), (_, weight)) in assets.entries_mut().zip(targets.iter()) {
            *value += yearly_contribution * weight / 100.0;
        }

        for (name, value) in assets.entries_mut() {
            *value = (*value * (1.0 + annual_return(name))).max(0.0);
        }

        portfolio_value = assets.total();
        if request.include_rebalancing && year % rebalance_every == 0 {
            for ((_, value), (_, weight)) in assets.entries_mut().zip(targets.iter()) {
                *value = portfolio_value * weight / 100.0;
            }
        }

        if record {
            projections.push(YearlyProjection {
                year,
                portfolio_value,
                contributions: total_contributions,
                returns: portfolio_value - total_contributions,
                real_value: Some(portfolio_value / inflation_deflator(request, year)),
                asset_values: assets.clone(),
            });
        }
    }

    PathOutcome {
        final_value: portfolio_value,
        total_contributions,
        final_real_value: portfolio_value / inflation_deflator(request, request.time_horizon),
        projections,
        breakdown: assets,
    }
}

fn inflation_deflator(request: &SimulationRequest, year: u32) -> f64 {
    if !request.include_inflation {
        return 1.0;
    }
    (1.0 + request.inflation_rate / 100.0).powf(year as f64)
}

pub(crate) fn weighted_return(allocations: &AllocationSet) -> f64 {
    allocations
        .iter()
        .map(|(name, weight)| weight / 100.0 * asset_profile(name).expected_return)
        .sum()
}

fn portfolio_volatility(allocations: &AllocationSet) -> f64 {
    allocations
        .iter()
        .map(|(name, weight)| (weight / 100.0 * asset_profile(name).volatility).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn derive_seed(base_seed: u64, path_id: u32) -> u64 {
    splitmix64(base_seed ^ ((path_id as u64) << 17))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

struct Rng {
    state: u64,
    cached_normal: Option<f64>,
}

impl Rng {
    fn new(seed: u64) -> Self {
        let state = if seed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            seed
        };
        Self {
            state,
            cached_normal: None,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        let v = self.next_u64() >> 11;
        ((v as f64) + 0.5) / DENOM
    }

    fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.cached_normal.take() {
            return z;
        }

        let u1 = self.next_f64().max(1e-12);
        let u2 = self.next_f64();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;

        self.cached_normal = Some(r * theta.sin());
        r * theta.cos()
    }
}

fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn balanced_request() -> SimulationRequest {
        SimulationRequest {
            initial_investment: 10_000.0,
            monthly_contribution: 500.0,
            time_horizon: 10,
            asset_allocations: AllocationSet::from_pairs([
                ("stocks", 50.0),
                ("bonds", 30.0),
                ("reits", 10.0),
                ("cash", 10.0),
            ]),
            include_inflation: true,
            inflation_rate: 3.0,
            include_rebalancing: true,
            rebalancing_frequency: 12,
            simulation_mode: SimulationMode::Simple,
            seed: Some(7),
        }
    }

    #[test]
    fn single_asset_without_contributions_compounds_annually() {
        let request = SimulationRequest {
            monthly_contribution: 0.0,
            asset_allocations: AllocationSet::from_pairs([("stocks", 100.0)]),
            include_inflation: false,
            ..balanced_request()
        };
        let result = run_simulation(&request).expect("valid request");

        assert_close(result.final_value, 10_000.0 * 1.1_f64.powi(10), 1e-6);
        assert_close(result.total_contributions, 10_000.0, 1e-9);
        assert_close(result.average_annual_return, 10.0, 1e-12);
        assert_close(result.real_return_after_inflation, result.total_returns, 1e-6);
    }

    #[test]
    fn yearly_projections_track_contributions() {
        let result = run_simulation(&balanced_request()).expect("valid request");
        assert_eq!(result.yearly_projections.len(), 10);

        let first = &result.yearly_projections[0];
        assert_eq!(first.year, 1);
        assert_close(first.contributions, 16_000.0, 1e-9);

        let last = result.yearly_projections.last().expect("ten years");
        assert_close(last.portfolio_value, result.final_value, 1e-9);
        assert_close(last.contributions, 10_000.0 + 500.0 * 12.0 * 10.0, 1e-9);
        let real = last.real_value.expect("real value recorded");
        assert_close(real, result.final_value / 1.03_f64.powi(10), 1e-6);
    }

    #[test]
    fn rebalancing_restores_target_weights() {
        let result = run_simulation(&balanced_request()).expect("valid request");
        let breakdown = &result.final_asset_breakdown;
        assert_close(breakdown.get("stocks").expect("stocks"), result.final_value * 0.5, 1e-6);
        assert_close(breakdown.get("cash").expect("cash"), result.final_value * 0.1, 1e-6);
    }

    #[test]
    fn sub_annual_rebalancing_frequency_rebalances_yearly() {
        let request = SimulationRequest {
            rebalancing_frequency: 6,
            ..balanced_request()
        };
        let yearly = run_simulation(&balanced_request()).expect("valid request");
        let result = run_simulation(&request).expect("valid request");
        assert_close(result.final_value, yearly.final_value, 1e-9);
    }

    #[test]
    fn scenario_modes_are_ordered_by_return_assumption() {
        let final_for = |mode| {
            run_simulation(&SimulationRequest {
                simulation_mode: mode,
                ..balanced_request()
            })
            .expect("valid request")
        };
        let pessimistic = final_for(SimulationMode::Pessimistic);
        let simple = final_for(SimulationMode::Simple);
        let optimistic = final_for(SimulationMode::Optimistic);

        assert!(pessimistic.final_value < simple.final_value);
        assert!(simple.final_value < optimistic.final_value);
        assert_eq!(optimistic.simulation_mode, SimulationMode::Optimistic);

        let stats = pessimistic.statistics.expect("statistics");
        assert_close(stats.worst_case_value, pessimistic.final_value * 0.8, 1e-6);
        assert_close(stats.best_case_value, pessimistic.final_value * 1.1, 1e-6);
    }

    #[test]
    fn monte_carlo_is_reproducible_for_a_seed() {
        let request = SimulationRequest {
            simulation_mode: SimulationMode::MonteCarlo,
            ..balanced_request()
        };
        let a = run_simulation(&request).expect("valid request");
        let b = run_simulation(&request).expect("valid request");
        assert_eq!(a, b);

        let stats = a.statistics.expect("statistics");
        assert!(stats.worst_case_value <= stats.median_value);
        assert!(stats.median_value <= stats.best_case_value);
        assert_close(a.final_value, stats.median_value, 1e-12);
        let probability = stats.probability_of_success.expect("probability");
        assert!((0.0..=100.0).contains(&probability));
        assert_eq!(a.yearly_projections.len(), 10);
    }

    #[test]
    fn monte_carlo_cash_portfolio_stays_near_expected_path() {
        let request = SimulationRequest {
            monthly_contribution: 0.0,
            asset_allocations: AllocationSet::from_pairs([("cash", 100.0)]),
            simulation_mode: SimulationMode::MonteCarlo,
            ..balanced_request()
        };
        let result = run_simulation(&request).expect("valid request");
        let expected = 10_000.0 * 1.03_f64.powi(10);
        assert!((result.final_value - expected).abs() / expected < 0.02);
    }

    #[test]
    fn rejects_invalid_requests() {
        let bad_total = SimulationRequest {
            asset_allocations: AllocationSet::from_pairs([("stocks", 70.0)]),
            ..balanced_request()
        };
        assert!(matches!(
            run_simulation(&bad_total),
            Err(InvalidInputError::AllocationTotal { .. })
        ));

        let no_horizon = SimulationRequest {
            time_horizon: 0,
            ..balanced_request()
        };
        assert!(run_simulation(&no_horizon).is_err());

        let negative = SimulationRequest {
            initial_investment: -1.0,
            ..balanced_request()
        };
        assert!(run_simulation(&negative).is_err());
    }

    #[test]
    fn compare_summarises_final_values() {
        let results: Vec<SimulationResult> = [5.0, 10.0, 20.0]
            .into_iter()
            .map(|final_value| SimulationResult {
                final_value,
                ..SimulationResult::default()
            })
            .collect();
        let comparison = compare(&results);
        assert_close(comparison.max_final_value, 20.0, 1e-12);
        assert_close(comparison.min_final_value, 5.0, 1e-12);
        assert_close(comparison.average_final_value, 35.0 / 3.0, 1e-12);
        assert_eq!(comparison.total_scenarios, 3);
        assert_eq!(compare(&[]).total_scenarios, 0);
    }

    #[test]
    fn request_defaults_apply_to_missing_fields() {
        let request: SimulationRequest =
            serde_json::from_str(r#"{"simulationMode": "monte-carlo", "timeHorizon": 20}"#)
                .expect("valid json");
        assert_eq!(request.simulation_mode, SimulationMode::MonteCarlo);
        assert_eq!(request.time_horizon, 20);
        assert_close(request.initial_investment, 10_000.0, 1e-12);
        assert_eq!(request.rebalancing_frequency, 12);
        assert_eq!(request.asset_allocations.first_key(), Some("stocks"));
    }

    #[test]
    fn percentile_interpolates_like_sorted_rank() {
        let mut values = vec![4.0, 1.0, 3.0, 2.0, 5.0];
        assert_close(percentile(&mut values, 50.0), 3.0, 1e-12);
        assert_close(percentile(&mut values, 25.0), 2.0, 1e-12);
        assert_close(percentile(&mut [], 50.0), 0.0, 1e-12);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(24))]

        #[test]
        fn prop_deterministic_modes_are_finite_and_non_negative(
            initial in 0u32..1_000_000,
            monthly in 0u32..10_000,
            horizon in 1u32..61,
            stocks in 0u32..101
        ) {
            let request = SimulationRequest {
                initial_investment: initial as f64,
                monthly_contribution: monthly as f64,
                time_horizon: horizon,
                asset_allocations: AllocationSet::from_pairs([
                    ("stocks", stocks as f64),
                    ("bonds", 100.0 - stocks as f64),
                ]),
                ..balanced_request()
            };
            let result = run_simulation(&request).expect("valid request");
            prop_assert!(result.final_value.is_finite());
            prop_assert!(result.final_value >= 0.0);
            prop_assert!(result.final_value + 1e-6 >= result.total_contributions);
        }
    }
}
