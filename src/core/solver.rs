use serde::Deserialize;
use tracing::{debug, info, trace};

use super::engine::ContributionPhase;
use super::error::EngineError;
use super::types::{ContributionInputs, MAX_PROJECTION_YEARS, SearchField, SearchOutcome};

pub const DEFAULT_MAX_ITERATIONS: u32 = 200;
pub const DEFAULT_SEED: f64 = 0.001;
pub const DEFAULT_GROWTH_FACTOR: f64 = 100.0;

/// Relative slack allowed before a decreasing objective is reported.
const MONOTONIC_SLACK: f64 = 1e-9;

/// Limits for [`solve_monotone`]. `max_iterations` counts objective
/// evaluations across both the bound discovery and the bisection.
///
/// With an `upper_limit` the bound discovery never evaluates above it, and a
/// goal still unmet at the limit is a domain error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchBudget {
    pub max_iterations: u32,
    pub seed: f64,
    pub growth_factor: f64,
    pub upper_limit: Option<f64>,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed: DEFAULT_SEED,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            upper_limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Solution {
    pub value: f64,
    pub iterations: u32,
}

/// Contribution-phase parameters with one field left for the search to fill.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub goal: f64,
    pub field: Option<SearchField>,
    pub inputs: ContributionInputs,
}

/// Finds the non-negative `x` with `objective(x) == goal`, reported with
/// `decimals` decimal places.
///
/// `objective` must be non-decreasing in `x`. The upper bound is found by
/// growing `budget.seed` geometrically, then `[0, high]` is bisected until both
/// ends round to the same value or the midpoint stops moving. In the latter
/// case the rounded upper end is returned, so the answer always meets `goal`.
pub fn solve_monotone<F>(
    mut objective: F,
    goal: f64,
    decimals: u32,
    budget: SearchBudget,
) -> Result<Solution, EngineError>
where
    F: FnMut(f64) -> Result<f64, EngineError>,
{
    validate_budget(goal, budget)?;

    let floor = evaluate(&mut objective, 0.0)?;
    if floor >= goal {
        return Ok(Solution {
            value: 0.0,
            iterations: 0,
        });
    }

    let mut iterations = 0;
    let mut low = 0.0;
    let mut f_low = floor;
    let mut high = clamp_to_limit(budget.seed, budget.upper_limit);
    let mut previous = floor;
    let mut f_high;
    loop {
        if iterations >= budget.max_iterations {
            return Err(EngineError::NonConvergence {
                iterations,
                low,
                high,
            });
        }
        iterations += 1;
        f_high = evaluate(&mut objective, high)?;
        ensure_increasing(high, previous, f_high)?;
        trace!(candidate = high, value = f_high, "bound discovery");
        if f_high >= goal {
            break;
        }
        if let Some(limit) = budget.upper_limit {
            if high >= limit {
                return Err(EngineError::domain(format!(
                    "goal {goal} is not reached at the upper limit {limit} (best {f_high})"
                )));
            }
        }
        previous = f_high;
        high = clamp_to_limit(high * budget.growth_factor, budget.upper_limit);
    }
    debug!(high, iterations, "upper bound found");

    loop {
        if round_to(low, decimals) == round_to(high, decimals) {
            return Ok(Solution {
                value: round_to(high, decimals),
                iterations,
            });
        }
        let mid = low + (high - low) / 2.0;
        if mid == low || mid == high {
            return Ok(Solution {
                value: round_to(high, decimals),
                iterations,
            });
        }
        if iterations >= budget.max_iterations {
            return Err(EngineError::NonConvergence {
                iterations,
                low,
                high,
            });
        }
        iterations += 1;

        let value = evaluate(&mut objective, mid)?;
        ensure_increasing(mid, f_low, value)?;
        ensure_increasing(high, value, f_high)?;
        trace!(low, mid, high, value, "bisection");
        if value > goal {
            high = mid;
            f_high = value;
        } else if value < goal {
            low = mid;
            f_low = value;
        } else {
            return Ok(Solution {
                value: round_to(mid, decimals),
                iterations,
            });
        }
    }
}

/// Solves for the designated field so the contribution phase's after-inflation
/// value reaches `request.goal`. The caller's inputs are never modified.
pub fn search_parameter(
    request: &SearchRequest,
    budget: SearchBudget,
) -> Result<SearchOutcome, EngineError> {
    let Some(field) = request.field else {
        return Err(EngineError::invalid("no search field was designated"));
    };
    if !request.goal.is_finite() || request.goal < 0.0 {
        return Err(EngineError::invalid("goal must be a finite value >= 0"));
    }
    request.inputs.validate()?;

    debug!(goal = request.goal, field = field.name(), "starting parameter search");
    for (name, value) in request.inputs.describe() {
        debug!(name, value, "search input");
    }

    let budget = match field {
        SearchField::Years => SearchBudget {
            upper_limit: Some(
                budget
                    .upper_limit
                    .map_or(MAX_PROJECTION_YEARS as f64, |limit| {
                        limit.min(MAX_PROJECTION_YEARS as f64)
                    }),
            ),
            ..budget
        },
        _ => budget,
    };

    let mut candidate = request.inputs.clone();
    let solution = solve_monotone(
        |x| {
            set_field(&mut candidate, field, x)?;
            Ok(ContributionPhase::run(&candidate)?.after_inflation())
        },
        request.goal,
        field.decimals(),
        budget,
    )?;

    set_field(&mut candidate, field, solution.value)?;
    let achieved = ContributionPhase::run(&candidate)?.after_inflation();
    info!(
        field = field.name(),
        value = solution.value,
        achieved,
        iterations = solution.iterations,
        "parameter search converged"
    );
    Ok(SearchOutcome {
        field,
        goal: request.goal,
        value: solution.value,
        achieved_after_inflation: achieved,
        iterations: solution.iterations,
    })
}

/// Years are evaluated at the nearest whole year; anything past
/// [`MAX_PROJECTION_YEARS`] is a domain error.
fn set_field(
    inputs: &mut ContributionInputs,
    field: SearchField,
    value: f64,
) -> Result<(), EngineError> {
    match field {
        SearchField::CurrentlySaved => inputs.currently_saved = value,
        SearchField::YearlyContribution => inputs.yearly_contribution = value,
        SearchField::ContributionGrowthRate => inputs.contribution_growth_rate = value,
        SearchField::InterestRate => inputs.interest_rate = value,
        SearchField::Years => {
            let years = value.round();
            if years > MAX_PROJECTION_YEARS as f64 {
                return Err(EngineError::domain(format!(
                    "years candidate {years} exceeds the {MAX_PROJECTION_YEARS} year horizon"
                )));
            }
            inputs.years = years as u32;
        }
    }
    Ok(())
}

fn clamp_to_limit(candidate: f64, upper_limit: Option<f64>) -> f64 {
    upper_limit.map_or(candidate, |limit| candidate.min(limit))
}

fn evaluate<F>(objective: &mut F, candidate: f64) -> Result<f64, EngineError>
where
    F: FnMut(f64) -> Result<f64, EngineError>,
{
    let value = objective(candidate)?;
    if value.is_nan() {
        return Err(EngineError::domain(format!(
            "objective is undefined at candidate {candidate}"
        )));
    }
    Ok(value)
}

fn ensure_increasing(candidate: f64, previous: f64, current: f64) -> Result<(), EngineError> {
    let slack = MONOTONIC_SLACK * previous.abs().max(1.0);
    if current < previous - slack {
        return Err(EngineError::NonMonotonic {
            candidate,
            previous,
            current,
        });
    }
    Ok(())
}

fn validate_budget(goal: f64, budget: SearchBudget) -> Result<(), EngineError> {
    if !goal.is_finite() {
        return Err(EngineError::invalid("goal must be finite"));
    }
    if budget.max_iterations == 0 {
        return Err(EngineError::invalid("max_iterations must be > 0"));
    }
    if !budget.seed.is_finite() || budget.seed <= 0.0 {
        return Err(EngineError::invalid("seed must be > 0"));
    }
    if !budget.growth_factor.is_finite() || budget.growth_factor <= 1.0 {
        return Err(EngineError::invalid("growth_factor must be > 1"));
    }
    if let Some(limit) = budget.upper_limit {
        if !limit.is_finite() || limit <= 0.0 {
            return Err(EngineError::invalid("upper_limit must be a finite value > 0"));
        }
    }
    Ok(())
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assume, proptest};

    fn after_inflation(inputs: &ContributionInputs) -> f64 {
        ContributionPhase::run(inputs)
            .expect("valid inputs")
            .after_inflation()
    }

    fn request(field: SearchField, goal: f64, inputs: ContributionInputs) -> SearchRequest {
        SearchRequest {
            goal,
            field: Some(field),
            inputs,
        }
    }

    #[test]
    fn solve_monotone_finds_square_root() {
        let solution = solve_monotone(|x| Ok(x * x), 2.0, 3, SearchBudget::default())
            .expect("must converge");
        assert_eq!(solution.value, 1.414);
        assert!(solution.iterations < DEFAULT_MAX_ITERATIONS);
    }

    #[test]
    fn solve_monotone_returns_zero_when_goal_already_met() {
        let solution = solve_monotone(|x| Ok(10.0 + x), 5.0, 0, SearchBudget::default())
            .expect("must converge");
        assert_eq!(solution.value, 0.0);
        assert_eq!(solution.iterations, 0);
    }

    #[test]
    fn solve_monotone_reports_decreasing_objective() {
        let err = solve_monotone(|x| Ok(-x), 1.0, 0, SearchBudget::default())
            .expect_err("must reject decreasing objective");
        assert!(matches!(err, EngineError::NonMonotonic { .. }));
    }

    #[test]
    fn solve_monotone_reports_nan_objective() {
        let err = solve_monotone(
            |x| Ok(if x > 0.0 { f64::NAN } else { 0.0 }),
            1.0,
            0,
            SearchBudget::default(),
        )
        .expect_err("must reject NaN");
        assert!(matches!(err, EngineError::Domain(_)));
    }

    #[test]
    fn solve_monotone_stops_at_iteration_cap() {
        let budget = SearchBudget {
            max_iterations: 5,
            ..SearchBudget::default()
        };
        let err = solve_monotone(|_| Ok(0.0), 1.0, 0, budget).expect_err("goal unreachable");
        assert!(matches!(
            err,
            EngineError::NonConvergence {
                iterations: 5,
                low,
                ..
            } if low == 0.0
        ));
    }

    #[test]
    fn solve_monotone_rejects_bad_budget() {
        let budget = SearchBudget {
            growth_factor: 1.0,
            ..SearchBudget::default()
        };
        assert!(matches!(
            solve_monotone(|x| Ok(x), 1.0, 0, budget),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn search_without_field_is_invalid_configuration() {
        let req = SearchRequest {
            goal: 250_000.0,
            field: None,
            inputs: ContributionInputs::default(),
        };
        let err = search_parameter(&req, SearchBudget::default()).expect_err("no field");
        assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    }

    #[test]
    fn search_currently_saved_round_trips() {
        let inputs = ContributionInputs {
            yearly_contribution: 0.0,
            ..ContributionInputs::default()
        };
        let req = request(SearchField::CurrentlySaved, 250_000.0, inputs.clone());
        let outcome = search_parameter(&req, SearchBudget::default()).expect("must converge");

        let exact = 250_000.0 * (1.03f64 / 1.06).powi(30);
        assert!((outcome.value - exact).abs() <= 0.5);
        assert!((outcome.achieved_after_inflation - 250_000.0).abs() < 2.0);
        assert_eq!(req.inputs, inputs);
    }

    #[test]
    fn search_yearly_contribution_brackets_goal() {
        let inputs = ContributionInputs {
            currently_saved: 10_000.0,
            interest_rate: 0.06,
            inflation_rate: 0.03,
            years: 30,
            contribute_monthly: true,
            ..ContributionInputs::default()
        };
        let goal = 1_000_000.0;
        let outcome = search_parameter(
            &request(SearchField::YearlyContribution, goal, inputs.clone()),
            SearchBudget::default(),
        )
        .expect("must converge");

        let below = after_inflation(&ContributionInputs {
            yearly_contribution: outcome.value - 1.0,
            ..inputs.clone()
        });
        let above = after_inflation(&ContributionInputs {
            yearly_contribution: outcome.value + 1.0,
            ..inputs
        });
        assert!(below < goal && goal < above, "{below} < {goal} < {above}");
        assert_eq!(outcome.value, outcome.value.round());
    }

    #[test]
    fn search_years_returns_first_year_meeting_goal() {
        let inputs = ContributionInputs {
            currently_saved: 0.0,
            yearly_contribution: 10_000.0,
            interest_rate: 0.05,
            inflation_rate: 0.02,
            ..ContributionInputs::default()
        };
        let goal = 300_000.0;
        let outcome = search_parameter(
            &request(SearchField::Years, goal, inputs.clone()),
            SearchBudget::default(),
        )
        .expect("must converge");

        let years = outcome.value as u32;
        assert!(years >= 1);
        let at = after_inflation(&ContributionInputs {
            years,
            ..inputs.clone()
        });
        let before = after_inflation(&ContributionInputs {
            years: years - 1,
            ..inputs
        });
        assert!(at >= goal, "{at} >= {goal}");
        assert!(before < goal, "{before} < {goal}");
    }

    #[test]
    fn search_interest_rate_uses_three_decimals() {
        let inputs = ContributionInputs {
            currently_saved: 100_000.0,
            yearly_contribution: 0.0,
            inflation_rate: 0.0,
            years: 10,
            ..ContributionInputs::default()
        };
        let outcome = search_parameter(
            &request(SearchField::InterestRate, 200_000.0, inputs),
            SearchBudget::default(),
        )
        .expect("must converge");
        // 2^(1/10) - 1 = 0.07177
        assert_eq!(outcome.value, 0.072);
    }

    #[test]
    fn solve_monotone_respects_upper_limit() {
        let budget = SearchBudget {
            upper_limit: Some(3.0),
            ..SearchBudget::default()
        };
        let solution = solve_monotone(|x| Ok(x), 2.5, 1, budget).expect("must converge");
        assert_eq!(solution.value, 2.5);

        let mut evaluated = Vec::new();
        let err = solve_monotone(
            |x| {
                evaluated.push(x);
                Ok(x)
            },
            5.0,
            1,
            budget,
        )
        .expect_err("goal above the limit");
        assert!(matches!(err, EngineError::Domain(_)));
        assert_eq!(evaluated.last(), Some(&3.0));
        assert!(evaluated.iter().all(|&x| x <= 3.0));
    }

    #[test]
    fn years_candidate_past_horizon_is_a_domain_error() {
        let mut inputs = ContributionInputs::default();
        assert!(set_field(&mut inputs, SearchField::Years, 200.4).is_ok());
        assert_eq!(inputs.years, 200);
        assert!(matches!(
            set_field(&mut inputs, SearchField::Years, 200.6),
            Err(EngineError::Domain(_))
        ));
        assert_eq!(inputs.years, 200);
    }

    #[test]
    fn search_years_beyond_horizon_is_a_domain_error() {
        let inputs = ContributionInputs {
            currently_saved: 0.0,
            yearly_contribution: 1.0,
            interest_rate: 0.0,
            inflation_rate: 0.0,
            ..ContributionInputs::default()
        };
        let err = search_parameter(
            &request(SearchField::Years, 1_000.0, inputs),
            SearchBudget::default(),
        )
        .expect_err("goal unreachable within the horizon");
        assert!(matches!(err, EngineError::Domain(_)), "{err:?}");
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(24))]

        #[test]
        fn contribution_search_round_trips(
            saved in 0.0f64..200_000.0,
            rate in 0.0f64..0.12,
            inflation in 0.0f64..0.05,
            years in 1u32..45,
            goal in 10_000.0f64..3_000_000.0,
        ) {
            let inputs = ContributionInputs {
                currently_saved: saved,
                yearly_contribution: 0.0,
                contribution_growth_rate: 0.0,
                interest_rate: rate,
                inflation_rate: inflation,
                years,
                contribute_monthly: false,
            };
            prop_assume!(after_inflation(&inputs) < goal - 1.0);

            let outcome = search_parameter(
                &request(SearchField::YearlyContribution, goal, inputs.clone()),
                SearchBudget::default(),
            ).expect("must converge");

            let below = after_inflation(&ContributionInputs {
                yearly_contribution: (outcome.value - 1.0).max(0.0),
                ..inputs.clone()
            });
            let above = after_inflation(&ContributionInputs {
                yearly_contribution: outcome.value + 1.0,
                ..inputs
            });
            prop_assert!(below <= goal && goal <= above);
        }
    }
}
