use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const DEFAULT_ANNUAL_RATE_PERCENT: f64 = 8.0;

/// Asset-class weights keyed by name. Iteration order is insertion order and
/// survives a JSON round trip, since the normalizer credits its rounding
/// remainder to the first key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationSet {
    entries: Vec<(String, f64)>,
}

impl AllocationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, f64)>) -> Self {
        let mut set = Self::new();
        for (name, weight) in pairs {
            set.insert(name, weight);
        }
        set
    }

    /// Replaces the weight in place when the key exists, otherwise appends.
    pub fn insert(&mut self, name: impl Into<String>, weight: f64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = weight,
            None => self.entries.push((name, weight)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, weight)| *weight)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(key, weight)| (key.as_str(), *weight))
    }

    pub fn first_key(&self) -> Option<&str> {
        self.entries.first().map(|(key, _)| key.as_str())
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, weight)| weight).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn weights_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        self.entries.iter_mut().map(|(_, weight)| weight)
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = (&str, &mut f64)> {
        self.entries
            .iter_mut()
            .map(|(key, weight)| (key.as_str(), weight))
    }
}

impl Serialize for AllocationSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, weight) in &self.entries {
            map.serialize_entry(key, weight)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AllocationSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AllocationVisitor;

        impl<'de> Visitor<'de> for AllocationVisitor {
            type Value = AllocationSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of asset class to percentage weight")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut set = AllocationSet::new();
                while let Some((key, weight)) = access.next_entry::<String, f64>()? {
                    set.insert(key, weight);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(AllocationVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionInput {
    pub initial_capital: f64,
    pub monthly_contribution: f64,
    #[serde(default = "default_annual_rate")]
    pub annual_rate_percent: f64,
    pub duration_years: u32,
}

fn default_annual_rate() -> f64 {
    DEFAULT_ANNUAL_RATE_PERCENT
}

impl ProjectionInput {
    pub fn months(&self) -> u32 {
        self.duration_years.saturating_mul(12)
    }

    pub fn monthly_rate(&self) -> f64 {
        self.annual_rate_percent / 12.0 / 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    pub projected_value: f64,
    pub future_value_of_initial: f64,
    pub future_value_of_contributions: f64,
    pub required_monthly_contribution: f64,
    pub shortfall: f64,
    pub on_track: bool,
    pub percent_to_goal: f64,
    pub display_percent_to_goal: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum GoalPlan {
    Aggressive,
    Moderate,
    Conservative,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalPath {
    pub plan: GoalPlan,
    pub years: u32,
    pub required_monthly_contribution: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SweepField {
    #[serde(alias = "initialInvestment")]
    InitialCapital,
    MonthlyContribution,
    #[serde(alias = "timeHorizon")]
    DurationYears,
    #[serde(alias = "allocations")]
    StockAllocationPercent,
}

impl SweepField {
    pub fn default_candidates(self) -> &'static [f64] {
        match self {
            SweepField::InitialCapital => &[5_000.0, 10_000.0, 25_000.0, 50_000.0, 100_000.0, 250_000.0],
            SweepField::MonthlyContribution => &[250.0, 500.0, 1_000.0, 2_000.0, 3_000.0, 5_000.0],
            SweepField::DurationYears => &[5.0, 10.0, 15.0, 20.0, 25.0, 30.0],
            SweepField::StockAllocationPercent => &[30.0, 40.0, 50.0, 60.0, 70.0, 80.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepPoint {
    pub varied_value: f64,
    pub final_value: f64,
    pub total_returns: f64,
    pub total_contributions: f64,
}

/// `variance` is the max-min spread of final values, not a statistical
/// variance; the name is part of the published response shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub best: f64,
    pub average: f64,
    pub variance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedCandidate {
    pub varied_value: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub generation: u64,
    pub field: SweepField,
    pub points: Vec<SweepPoint>,
    pub summary: Option<SweepSummary>,
    pub failed_candidates: Vec<FailedCandidate>,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimulationMode {
    #[default]
    Simple,
    #[serde(alias = "monteCarlo", alias = "monte_carlo")]
    MonteCarlo,
    Optimistic,
    Pessimistic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationRequest {
    pub initial_investment: f64,
    pub monthly_contribution: f64,
    pub time_horizon: u32,
    pub asset_allocations: AllocationSet,
    pub include_inflation: bool,
    pub inflation_rate: f64,
    pub include_rebalancing: bool,
    pub rebalancing_frequency: u32,
    pub simulation_mode: SimulationMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SimulationRequest {
    fn default() -> Self {
        Self {
            initial_investment: 10_000.0,
            monthly_contribution: 0.0,
            time_horizon: 10,
            asset_allocations: AllocationSet::from_pairs([
                ("stocks", 60.0),
                ("bonds", 30.0),
                ("cash", 10.0),
            ]),
            include_inflation: true,
            inflation_rate: 3.0,
            include_rebalancing: true,
            rebalancing_frequency: 12,
            simulation_mode: SimulationMode::Simple,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct YearlyProjection {
    pub year: u32,
    pub portfolio_value: f64,
    pub contributions: f64,
    pub returns: f64,
    pub real_value: Option<f64>,
    pub asset_values: AllocationSet,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationStatistics {
    pub best_case_value: f64,
    pub worst_case_value: f64,
    pub median_value: f64,
    pub standard_deviation: f64,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub probability_of_success: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationResult {
    pub final_value: f64,
    pub total_contributions: f64,
    pub total_returns: f64,
    pub real_return_after_inflation: f64,
    pub average_annual_return: f64,
    pub yearly_projections: Vec<YearlyProjection>,
    pub final_asset_breakdown: AllocationSet,
    pub statistics: Option<SimulationStatistics>,
    pub simulation_mode: SimulationMode,
}

/// `{ success, result }` on success, `{ success: false, error }` otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SimulationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub max_final_value: f64,
    pub min_final_value: f64,
    pub average_final_value: f64,
    pub total_scenarios: usize,
}
