use tracing::debug;

use super::accrual::{contribution_accrual, distribution_accrual};
use super::error::EngineError;
use super::format::format_currency;
use super::types::{
    AccountProjection, ContributionInputs, DistributionInputs, DrawdownInputs, LifetimeInputs,
    LifetimeProjection, Scenario, ScenarioOutcome, ValueSeries,
};

/// `(scenario, interest_rate, inflation_rate)` used by [`compare_scenarios`].
pub const SCENARIO_RATES: [(Scenario, f64, f64); 3] = [
    (Scenario::Worst, 0.04, 0.05),
    (Scenario::Likely, 0.06, 0.0325),
    (Scenario::Best, 0.08, 0.02),
];

/// Cash flow applied during a single year.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    /// No cash flow; a positive rate earns interest, a non-positive one leaves
    /// the value unchanged.
    Hold,
    Contribution {
        amount: f64,
    },
    /// `withdrawal` is the net spending need; `secondary_income` is pre-tax
    /// income that covers part of it.
    Distribution {
        withdrawal: f64,
        secondary_income: f64,
        tax_rate: f64,
    },
}

/// One year of account growth.
#[derive(Debug, Clone, Copy)]
pub struct YearTransition {
    pub start_value: f64,
    pub interest_rate: f64,
    pub inflation_rate: f64,
    pub phase: Phase,
    pub monthly_accrual: bool,
}

impl YearTransition {
    pub fn before_inflation(&self) -> Result<f64, EngineError> {
        let rate = self.interest_rate;
        match self.phase {
            Phase::Hold => {
                let growth = if rate > 0.0 { 1.0 + rate } else { 1.0 };
                Ok(self.start_value * growth)
            }
            Phase::Contribution { amount } => {
                let accrual = if self.monthly_accrual {
                    contribution_accrual(amount, rate)
                } else {
                    0.0
                };
                Ok(self.start_value * (1.0 + rate) + amount + accrual)
            }
            Phase::Distribution {
                withdrawal,
                secondary_income,
                tax_rate,
            } => {
                let taken = effective_withdrawal(withdrawal, secondary_income, tax_rate)?;
                let accrual = if self.monthly_accrual {
                    distribution_accrual(taken, rate)
                } else {
                    0.0
                };
                let end = (self.start_value - taken) * (1.0 + rate) + accrual;
                if !end.is_finite() {
                    return Err(EngineError::domain(format!(
                        "distribution year produced a non-finite value from start {}",
                        self.start_value
                    )));
                }
                Ok(end)
            }
        }
    }

    /// Year-end value in purchasing power at the start of the year.
    pub fn after_inflation(&self) -> Result<f64, EngineError> {
        Ok(self.before_inflation()? / (1.0 + self.inflation_rate))
    }
}

/// Gross amount to take from the account so that, after tax and after the
/// taxed secondary income, `gross_need` is left to spend.
///
/// A secondary income larger than the need yields a negative amount, so the
/// after-tax surplus is paid into the account.
pub fn effective_withdrawal(
    gross_need: f64,
    secondary_income: f64,
    tax_rate: f64,
) -> Result<f64, EngineError> {
    if !(0.0..1.0).contains(&tax_rate) {
        return Err(EngineError::domain(format!(
            "tax rate must be in [0, 1), got {tax_rate}"
        )));
    }
    let keep = 1.0 - tax_rate;
    let remaining_need = gross_need - secondary_income * keep;
    Ok(remaining_need / keep)
}

#[derive(Debug, Clone)]
pub struct ContributionPhase {
    series: ValueSeries,
    inflation_rate: f64,
}

impl ContributionPhase {
    pub fn run(inputs: &ContributionInputs) -> Result<Self, EngineError> {
        Self::run_labelled(inputs, 0)
    }

    fn run_labelled(inputs: &ContributionInputs, label: u32) -> Result<Self, EngineError> {
        inputs.validate()?;
        let mut series = ValueSeries::starting_at(label, inputs.currently_saved);
        let mut value = inputs.currently_saved;
        for year in 1..=inputs.years {
            let growth = (1.0 + inputs.contribution_growth_rate).powi(year as i32 - 1);
            let amount = inputs.yearly_contribution * growth;
            value = YearTransition {
                start_value: value,
                interest_rate: inputs.interest_rate,
                inflation_rate: inputs.inflation_rate,
                phase: Phase::Contribution { amount },
                monthly_accrual: inputs.contribute_monthly,
            }
            .before_inflation()?;
            series.push(value);
        }
        debug!(
            years = inputs.years,
            final_value = value,
            "contribution phase complete"
        );
        Ok(Self {
            series,
            inflation_rate: inputs.inflation_rate,
        })
    }

    pub fn series(&self) -> &ValueSeries {
        &self.series
    }

    pub fn into_series(self) -> ValueSeries {
        self.series
    }

    pub fn last(&self) -> f64 {
        self.series.last()
    }

    pub fn after_inflation(&self) -> f64 {
        deflate(self.series.last(), self.inflation_rate, self.series.years())
    }
}

#[derive(Debug, Clone)]
pub struct DistributionPhase {
    series: ValueSeries,
    inflation_rate: f64,
}

impl DistributionPhase {
    pub fn run(inputs: &DistributionInputs) -> Result<Self, EngineError> {
        Self::run_labelled(inputs, 0)
    }

    fn run_labelled(inputs: &DistributionInputs, label: u32) -> Result<Self, EngineError> {
        inputs.validate()?;
        let mut series = ValueSeries::starting_at(label, inputs.starting_value);
        let mut value = inputs.starting_value;
        for year in 1..=inputs.years {
            let indexation = (1.0 + inputs.inflation_rate).powi(year as i32 - 1);
            value = YearTransition {
                start_value: value,
                interest_rate: inputs.interest_rate,
                inflation_rate: inputs.inflation_rate,
                phase: Phase::Distribution {
                    withdrawal: inputs.yearly_withdrawal * indexation,
                    secondary_income: inputs.secondary_income * indexation,
                    tax_rate: inputs.tax_rate,
                },
                monthly_accrual: inputs.withdraw_monthly,
            }
            .before_inflation()?;
            series.push(value);
        }
        debug!(
            years = inputs.years,
            final_value = value,
            "distribution phase complete"
        );
        Ok(Self {
            series,
            inflation_rate: inputs.inflation_rate,
        })
    }

    pub fn series(&self) -> &ValueSeries {
        &self.series
    }

    pub fn last(&self) -> f64 {
        self.series.last()
    }

    pub fn after_inflation(&self) -> f64 {
        deflate(self.series.last(), self.inflation_rate, self.series.years())
    }
}

pub fn run_lifetime(inputs: &LifetimeInputs) -> Result<LifetimeProjection, EngineError> {
    inputs.validate()?;
    let accumulation =
        ContributionPhase::run_labelled(&inputs.contribution_inputs(), inputs.age_now)?;
    let retirement = DistributionPhase::run_labelled(
        &inputs.distribution_inputs(accumulation.last()),
        inputs.age_retire,
    )?;

    let mut series = accumulation.into_series();
    series.append(retirement.series());
    debug!(
        age_now = inputs.age_now,
        age_retire = inputs.age_retire,
        age_die = inputs.age_die,
        final_value = series.last(),
        "lifetime projection complete"
    );
    Ok(LifetimeProjection {
        series,
        retirement_age: inputs.age_retire,
        inflation_rate: inputs.inflation_rate,
    })
}

/// Draws every account down independently at the same initial rate.
pub fn run_drawdown(inputs: &DrawdownInputs) -> Result<Vec<AccountProjection>, EngineError> {
    inputs.validate()?;
    inputs
        .accounts
        .iter()
        .map(|account| {
            let initial_withdrawal = account.balance * inputs.withdrawal_rate;
            let phase = DistributionPhase::run(&DistributionInputs {
                starting_value: account.balance,
                yearly_withdrawal: initial_withdrawal,
                secondary_income: 0.0,
                tax_rate: 0.0,
                interest_rate: inputs.interest_rate,
                inflation_rate: inputs.inflation_rate,
                years: inputs.years,
                withdraw_monthly: true,
            })?;
            Ok(AccountProjection {
                name: account.name.clone(),
                initial_withdrawal,
                final_value: phase.last(),
                final_value_after_inflation: phase.after_inflation(),
                points: phase.series().points(),
            })
        })
        .collect()
}

/// Reruns the lifetime projection under each of [`SCENARIO_RATES`].
pub fn compare_scenarios(base: &LifetimeInputs) -> Result<Vec<ScenarioOutcome>, EngineError> {
    SCENARIO_RATES
        .iter()
        .map(|&(scenario, interest_rate, inflation_rate)| {
            let inputs = LifetimeInputs {
                interest_rate,
                inflation_rate,
                ..base.clone()
            };
            let projection = run_lifetime(&inputs)?;
            let final_value = projection.after_inflation();
            Ok(ScenarioOutcome {
                scenario,
                interest_rate,
                inflation_rate,
                final_value,
                final_value_formatted: format_currency(final_value),
            })
        })
        .collect()
}

fn deflate(value: f64, inflation_rate: f64, years: u32) -> f64 {
    value / (1.0 + inflation_rate).powi(years as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::AccountBalance;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn round2(value: f64) -> f64 {
        (value * 100.0).round() / 100.0
    }

    fn year(phase: Phase) -> YearTransition {
        YearTransition {
            start_value: 100.0,
            interest_rate: 0.0,
            inflation_rate: 0.0,
            phase,
            monthly_accrual: true,
        }
    }

    #[test]
    fn contribution_year_adds_contribution() {
        let t = year(Phase::Contribution { amount: 10.0 });
        assert_eq!(t.before_inflation().expect("valid year"), 110.0);
    }

    #[test]
    fn distribution_year_removes_withdrawal() {
        let t = year(Phase::Distribution {
            withdrawal: 10.0,
            secondary_income: 0.0,
            tax_rate: 0.0,
        });
        assert_eq!(t.before_inflation().expect("valid year"), 90.0);
    }

    #[test]
    fn hold_year_after_inflation_loses_purchasing_power() {
        let mut t = year(Phase::Hold);
        t.inflation_rate = 0.1;
        assert_eq!(round2(t.after_inflation().expect("valid year")), 90.91);
    }

    #[test]
    fn contribution_year_after_inflation() {
        let mut t = year(Phase::Contribution { amount: 10.0 });
        t.inflation_rate = 0.1;
        assert_eq!(round2(t.after_inflation().expect("valid year")), 100.0);
    }

    #[test]
    fn contribution_year_includes_monthly_accrual_only_when_requested() {
        let mut t = YearTransition {
            start_value: 1_000.0,
            interest_rate: 0.1,
            inflation_rate: 0.0,
            phase: Phase::Contribution { amount: 12.0 },
            monthly_accrual: false,
        };
        assert_approx(t.before_inflation().expect("valid year"), 1_112.0);
        t.monthly_accrual = true;
        assert_approx(t.before_inflation().expect("valid year"), 1_112.65);
    }

    #[test]
    fn distribution_year_grosses_up_for_tax_after_secondary_income() {
        let t = YearTransition {
            start_value: 1_000.0,
            interest_rate: 0.0,
            inflation_rate: 0.0,
            phase: Phase::Distribution {
                withdrawal: 100.0,
                secondary_income: 40.0,
                tax_rate: 0.2,
            },
            monthly_accrual: true,
        };
        // (100 - 40 * 0.8) / 0.8 = 85
        assert_approx(t.before_inflation().expect("valid year"), 915.0);

        let with_interest = YearTransition {
            interest_rate: 0.1,
            ..t
        };
        let expected = (1_000.0 - 85.0) * 1.1 + distribution_accrual(85.0, 0.1);
        assert_approx(with_interest.before_inflation().expect("valid year"), expected);
    }

    #[test]
    fn secondary_income_above_need_is_paid_into_the_account() {
        let taken = effective_withdrawal(10_000.0, 50_000.0, 0.25).expect("valid tax rate");
        // (10_000 - 50_000 * 0.75) / 0.75
        assert_approx_tol(taken, -36_666.666_666_666_67, 1e-6);

        let t = year(Phase::Distribution {
            withdrawal: 10.0,
            secondary_income: 50.0,
            tax_rate: 0.0,
        });
        assert_approx(t.before_inflation().expect("valid year"), 140.0);
    }

    #[test]
    fn hold_year_ignores_non_positive_rates() {
        let mut t = year(Phase::Hold);
        t.interest_rate = -0.1;
        assert_eq!(t.before_inflation().expect("valid year"), 100.0);
        t.interest_rate = 0.1;
        assert_approx(t.before_inflation().expect("valid year"), 110.0);
    }

    #[test]
    fn full_tax_rate_is_a_domain_error() {
        let t = year(Phase::Distribution {
            withdrawal: 10.0,
            secondary_income: 1.0,
            tax_rate: 1.0,
        });
        assert!(matches!(t.before_inflation(), Err(EngineError::Domain(_))));
        assert!(matches!(
            effective_withdrawal(10.0, 0.0, -0.1),
            Err(EngineError::Domain(_))
        ));
    }

    #[test]
    fn zero_years_yields_only_the_starting_value() {
        let phase = ContributionPhase::run(&ContributionInputs {
            currently_saved: 12_345.67,
            yearly_contribution: 1_000.0,
            years: 0,
            ..ContributionInputs::default()
        })
        .expect("valid inputs");
        assert_eq!(phase.series().values().len(), 1);
        assert_eq!(phase.last(), 12_345.67);
        assert_eq!(phase.after_inflation(), 12_345.67);

        let phase = DistributionPhase::run(&DistributionInputs {
            starting_value: 500.0,
            yearly_withdrawal: 50.0,
            secondary_income: 0.0,
            tax_rate: 0.0,
            interest_rate: 0.05,
            inflation_rate: 0.02,
            years: 0,
            withdraw_monthly: true,
        })
        .expect("valid inputs");
        assert_eq!(phase.series().values(), &[500.0]);
    }

    #[test]
    fn contribution_phase_grows_contributions_from_the_second_year() {
        let phase = ContributionPhase::run(&ContributionInputs {
            currently_saved: 0.0,
            yearly_contribution: 100.0,
            contribution_growth_rate: 0.1,
            interest_rate: 0.0,
            inflation_rate: 0.0,
            years: 3,
            contribute_monthly: false,
        })
        .expect("valid inputs");
        let values = phase.series().values();
        assert_eq!(values[0], 0.0);
        assert_approx(values[1], 100.0);
        assert_approx(values[2], 210.0);
        assert_approx(values[3], 331.0);
    }

    #[test]
    fn contribution_phase_after_inflation_divides_once_at_the_end() {
        let phase = ContributionPhase::run(&ContributionInputs {
            currently_saved: 1_000.0,
            yearly_contribution: 0.0,
            interest_rate: 0.05,
            inflation_rate: 0.05,
            years: 10,
            ..ContributionInputs::default()
        })
        .expect("valid inputs");
        assert_approx_tol(phase.last(), 1_000.0 * 1.05f64.powi(10), 1e-6);
        assert_approx_tol(phase.after_inflation(), 1_000.0, 1e-6);
    }

    #[test]
    fn distribution_phase_indexes_withdrawal_after_first_year() {
        let phase = DistributionPhase::run(&DistributionInputs {
            starting_value: 1_000.0,
            yearly_withdrawal: 100.0,
            secondary_income: 0.0,
            tax_rate: 0.0,
            interest_rate: 0.0,
            inflation_rate: 0.1,
            years: 2,
            withdraw_monthly: true,
        })
        .expect("valid inputs");
        let values = phase.series().values();
        assert_approx(values[1], 900.0);
        assert_approx(values[2], 790.0);
    }

    #[test]
    fn distribution_phase_with_monthly_withdrawals_beats_lump_sum() {
        let base = DistributionInputs {
            starting_value: 1_000_000.0,
            yearly_withdrawal: 60_000.0,
            secondary_income: 0.0,
            tax_rate: 0.0,
            interest_rate: 0.05,
            inflation_rate: 0.02,
            years: 20,
            withdraw_monthly: false,
        };
        let lump = DistributionPhase::run(&base).expect("valid inputs");
        let monthly = DistributionPhase::run(&DistributionInputs {
            withdraw_monthly: true,
            ..base
        })
        .expect("valid inputs");
        assert!(monthly.last() > lump.last());
    }

    #[test]
    fn lifetime_projection_spans_all_ages() {
        let inputs = LifetimeInputs {
            currently_saved: 40_000.0,
            yearly_contribution: 20_000.0,
            yearly_distribution: 74_000.0,
            distribution_tax_rate: 0.15,
            monthly_secondary_income: 3_000.0,
            interest_rate: 0.06,
            inflation_rate: 0.0325,
            age_now: 36,
            age_retire: 65,
            age_die: 95,
            ..LifetimeInputs::default()
        };
        let projection = run_lifetime(&inputs).expect("valid inputs");
        assert_eq!(projection.series.values().len(), (95 - 36 + 1) as usize);
        assert_eq!(projection.series.first(), 40_000.0);
        assert_eq!(projection.series.first_label(), 36);
        let points = projection.series.real_points(inputs.inflation_rate);
        assert_eq!(points.first().map(|p| p.age), Some(36));
        assert_eq!(points.last().map(|p| p.age), Some(95));

        let accumulated = ContributionPhase::run(&inputs.contribution_inputs())
            .expect("valid inputs")
            .last();
        assert_approx_tol(projection.value_at_retirement(), accumulated, 1e-6);
    }

    #[test]
    fn lifetime_projection_rejects_unordered_ages() {
        let inputs = LifetimeInputs {
            age_now: 40,
            age_retire: 35,
            ..LifetimeInputs::default()
        };
        let err = run_lifetime(&inputs).expect_err("must reject ages");
        assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    }

    #[test]
    fn drawdown_projects_each_account_separately() {
        let inputs = DrawdownInputs {
            accounts: vec![
                AccountBalance {
                    name: "taxable".to_string(),
                    balance: 3_000_000.0,
                },
                AccountBalance {
                    name: "nontaxable".to_string(),
                    balance: 1_000_000.0,
                },
            ],
            withdrawal_rate: 0.04,
            interest_rate: 0.0,
            inflation_rate: 0.0,
            years: 10,
        };
        let accounts = run_drawdown(&inputs).expect("valid inputs");
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].name, "taxable");
        assert_approx(accounts[0].initial_withdrawal, 120_000.0);
        assert_approx_tol(accounts[0].final_value, 1_800_000.0, 1e-6);
        assert_approx_tol(accounts[1].final_value, 600_000.0, 1e-6);
        assert_eq!(accounts[1].points.len(), 11);
    }

    #[test]
    fn scenarios_are_ordered_worst_to_best() {
        let base = LifetimeInputs {
            currently_saved: 40_000.0,
            yearly_contribution: 20_000.0,
            yearly_distribution: 74_000.0,
            distribution_tax_rate: 0.15,
            monthly_secondary_income: 3_000.0,
            age_now: 36,
            age_retire: 70,
            age_die: 92,
            ..LifetimeInputs::default()
        };
        let outcomes = compare_scenarios(&base).expect("valid inputs");
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].scenario, Scenario::Worst);
        assert!(outcomes[0].final_value < outcomes[1].final_value);
        assert!(outcomes[1].final_value < outcomes[2].final_value);
        assert!(outcomes[2].final_value_formatted.starts_with('$'));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn contribution_series_is_non_decreasing(
            saved in 0.0f64..1_000_000.0,
            contribution in 0.0f64..100_000.0,
            growth in 0.0f64..0.1,
            rate in 0.0f64..0.2,
            inflation in 0.0f64..0.1,
            years in 0u32..60,
            monthly in proptest::bool::ANY,
        ) {
            let phase = ContributionPhase::run(&ContributionInputs {
                currently_saved: saved,
                yearly_contribution: contribution,
                contribution_growth_rate: growth,
                interest_rate: rate,
                inflation_rate: inflation,
                years,
                contribute_monthly: monthly,
            }).expect("valid inputs");
            let values = phase.series().values();
            prop_assert!(values.len() == years as usize + 1);
            prop_assert!(values[0] == saved);
            for pair in values.windows(2) {
                prop_assert!(pair[1] >= pair[0]);
            }
        }
    }
}
