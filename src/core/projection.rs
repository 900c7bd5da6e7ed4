use super::error::{InvalidInputError, non_negative};
use super::types::{GoalPath, GoalPlan, ProjectionInput, ProjectionResult};

pub fn project(input: &ProjectionInput, target_amount: f64) -> Result<ProjectionResult, InvalidInputError> {
    validate_input(input)?;
    non_negative("targetAmount", target_amount)?;

    let monthly_rate = input.monthly_rate();
    let months = input.months() as f64;
    let growth = growth_factor(monthly_rate, months);

    let future_value_of_initial = input.initial_capital * growth;
    let future_value_of_contributions =
        input.monthly_contribution * annuity_factor(monthly_rate, months);
    let projected_value = future_value_of_initial + future_value_of_contributions;

    let required_monthly_contribution =
        required_contribution(target_amount - future_value_of_initial, monthly_rate, months);
    let shortfall = target_amount - projected_value;

    // A zero target is met by any non-negative projection.
    let percent_to_goal = if target_amount == 0.0 {
        100.0
    } else {
        projected_value / target_amount * 100.0
    };

    Ok(ProjectionResult {
        projected_value,
        future_value_of_initial,
        future_value_of_contributions,
        required_monthly_contribution,
        shortfall,
        on_track: shortfall <= 0.0,
        percent_to_goal,
        display_percent_to_goal: percent_to_goal.clamp(0.0, 100.0),
    })
}

/// Required contribution for a shorter, equal, and longer horizon around
/// `input.duration_years`.
pub fn alternative_paths(
    input: &ProjectionInput,
    target_amount: f64,
) -> Result<Vec<GoalPath>, InvalidInputError> {
    validate_input(input)?;
    non_negative("targetAmount", target_amount)?;

    let years = input.duration_years;
    let plans = [
        (GoalPlan::Aggressive, years.saturating_sub(5).max(5)),
        (GoalPlan::Moderate, years),
        (GoalPlan::Conservative, years.saturating_add(5)),
    ];

    let monthly_rate = input.monthly_rate();
    Ok(plans
        .into_iter()
        .map(|(plan, years)| {
            let months = years as f64 * 12.0;
            let future_value_of_initial = input.initial_capital * growth_factor(monthly_rate, months);
            GoalPath {
                plan,
                years,
                required_monthly_contribution: required_contribution(
                    target_amount - future_value_of_initial,
                    monthly_rate,
                    months,
                ),
            }
        })
        .collect())
}

pub(crate) fn validate_input(input: &ProjectionInput) -> Result<(), InvalidInputError> {
    non_negative("initialCapital", input.initial_capital)?;
    non_negative("monthlyContribution", input.monthly_contribution)?;
    if input.duration_years == 0 {
        return Err(InvalidInputError::NotPositive {
            field: "durationYears",
        });
    }
    if !input.annual_rate_percent.is_finite() {
        return Err(InvalidInputError::NotFinite {
            field: "annualRatePercent",
        });
    }
    if input.annual_rate_percent <= -100.0 {
        return Err(InvalidInputError::RateTooLow);
    }
    Ok(())
}

fn growth_factor(monthly_rate: f64, months: f64) -> f64 {
    (1.0 + monthly_rate).powf(months)
}

/// `((1 + r)^n - 1) / r`, falling back to `n` when the rate is too small for
/// the growth term to be distinguished from 1.
fn annuity_factor(monthly_rate: f64, months: f64) -> f64 {
    let growth_minus_one = (months * monthly_rate.ln_1p()).exp_m1();
    if growth_minus_one == 0.0 || monthly_rate.abs() < f64::EPSILON {
        months
    } else {
        growth_minus_one / monthly_rate
    }
}

fn required_contribution(remaining_needed: f64, monthly_rate: f64, months: f64) -> f64 {
    (remaining_needed / annuity_factor(monthly_rate, months)).max(0.0)
}
