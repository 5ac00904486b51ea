use serde::{Deserialize, Serialize};

use super::error::EngineError;

pub const DEFAULT_CURRENTLY_SAVED: f64 = 0.0;
pub const DEFAULT_YEARLY_CONTRIBUTION: f64 = 0.0;
pub const DEFAULT_CONTRIBUTION_GROWTH_RATE: f64 = 0.0;
pub const DEFAULT_INTEREST_RATE: f64 = 0.06;
pub const DEFAULT_INFLATION_RATE: f64 = 0.03;
pub const DEFAULT_YEARS: u32 = 30;
pub const DEFAULT_GOAL: f64 = 250_000.0;

pub const DEFAULT_LIFETIME_CURRENTLY_SAVED: f64 = 80_000.0;
pub const DEFAULT_LIFETIME_YEARLY_CONTRIBUTION: f64 = 15_000.0;
pub const DEFAULT_LIFETIME_INFLATION_RATE: f64 = 0.0325;
pub const DEFAULT_YEARLY_DISTRIBUTION: f64 = 100_000.0;
pub const DEFAULT_DISTRIBUTION_TAX_RATE: f64 = 0.25;
pub const DEFAULT_MONTHLY_SECONDARY_INCOME: f64 = 1_000.0;
pub const DEFAULT_AGE_NOW: u32 = 25;
pub const DEFAULT_AGE_RETIRE: u32 = 65;
pub const DEFAULT_AGE_DIE: u32 = 90;

pub const DEFAULT_WITHDRAWAL_RATE: f64 = 0.04;
pub const DEFAULT_DRAWDOWN_INTEREST_RATE: f64 = 0.04;

/// Longest horizon any single phase may project.
pub const MAX_PROJECTION_YEARS: u32 = 200;

/// Inputs for an accumulation run.
///
/// Rates are decimals (0.06 for 6%). Year `k` (1-based) contributes
/// `yearly_contribution * (1 + contribution_growth_rate)^(k-1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionInputs {
    pub currently_saved: f64,
    pub yearly_contribution: f64,
    pub contribution_growth_rate: f64,
    pub interest_rate: f64,
    pub inflation_rate: f64,
    pub years: u32,
    pub contribute_monthly: bool,
}

impl Default for ContributionInputs {
    fn default() -> Self {
        Self {
            currently_saved: DEFAULT_CURRENTLY_SAVED,
            yearly_contribution: DEFAULT_YEARLY_CONTRIBUTION,
            contribution_growth_rate: DEFAULT_CONTRIBUTION_GROWTH_RATE,
            interest_rate: DEFAULT_INTEREST_RATE,
            inflation_rate: DEFAULT_INFLATION_RATE,
            years: DEFAULT_YEARS,
            contribute_monthly: false,
        }
    }
}

impl ContributionInputs {
    pub fn validate(&self) -> Result<(), EngineError> {
        check_finite(self.describe())?;
        if self.currently_saved < 0.0 {
            return Err(EngineError::invalid("currently_saved must be >= 0"));
        }
        check_rate("interest_rate", self.interest_rate)?;
        check_rate("inflation_rate", self.inflation_rate)?;
        check_rate("contribution_growth_rate", self.contribution_growth_rate)?;
        check_years(self.years)
    }

    /// Name/value pairs for logging.
    pub fn describe(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("currently_saved", self.currently_saved),
            ("yearly_contribution", self.yearly_contribution),
            ("contribution_growth_rate", self.contribution_growth_rate),
            ("interest_rate", self.interest_rate),
            ("inflation_rate", self.inflation_rate),
            ("years", self.years as f64),
        ]
    }
}

/// Inputs for a withdrawal run.
///
/// `yearly_withdrawal` is the net amount the owner wants to spend in the first
/// year; `secondary_income` is a yearly pre-tax income (pension, social
/// security) that covers part of it. Both are indexed to inflation after year 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionInputs {
    pub starting_value: f64,
    pub yearly_withdrawal: f64,
    pub secondary_income: f64,
    pub tax_rate: f64,
    pub interest_rate: f64,
    pub inflation_rate: f64,
    pub years: u32,
    pub withdraw_monthly: bool,
}

impl DistributionInputs {
    pub fn validate(&self) -> Result<(), EngineError> {
        check_finite([
            ("starting_value", self.starting_value),
            ("yearly_withdrawal", self.yearly_withdrawal),
            ("secondary_income", self.secondary_income),
            ("tax_rate", self.tax_rate),
            ("interest_rate", self.interest_rate),
            ("inflation_rate", self.inflation_rate),
        ])?;
        if self.yearly_withdrawal < 0.0 || self.secondary_income < 0.0 {
            return Err(EngineError::invalid(
                "yearly_withdrawal and secondary_income must be >= 0",
            ));
        }
        check_tax_rate(self.tax_rate)?;
        check_rate("interest_rate", self.interest_rate)?;
        check_rate("inflation_rate", self.inflation_rate)?;
        check_years(self.years)
    }
}

/// Age-driven plan: save from `age_now` until `age_retire`, then draw down
/// until `age_die`. Money amounts for the retirement phase are in today's
/// currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifetimeInputs {
    pub currently_saved: f64,
    pub yearly_contribution: f64,
    pub contribution_growth_rate: f64,
    pub yearly_distribution: f64,
    pub distribution_tax_rate: f64,
    pub monthly_secondary_income: f64,
    pub interest_rate: f64,
    pub inflation_rate: f64,
    pub age_now: u32,
    pub age_retire: u32,
    pub age_die: u32,
    pub contribute_monthly: bool,
    pub withdraw_monthly: bool,
}

impl Default for LifetimeInputs {
    fn default() -> Self {
        Self {
            currently_saved: DEFAULT_LIFETIME_CURRENTLY_SAVED,
            yearly_contribution: DEFAULT_LIFETIME_YEARLY_CONTRIBUTION,
            contribution_growth_rate: DEFAULT_CONTRIBUTION_GROWTH_RATE,
            yearly_distribution: DEFAULT_YEARLY_DISTRIBUTION,
            distribution_tax_rate: DEFAULT_DISTRIBUTION_TAX_RATE,
            monthly_secondary_income: DEFAULT_MONTHLY_SECONDARY_INCOME,
            interest_rate: DEFAULT_INTEREST_RATE,
            inflation_rate: DEFAULT_LIFETIME_INFLATION_RATE,
            age_now: DEFAULT_AGE_NOW,
            age_retire: DEFAULT_AGE_RETIRE,
            age_die: DEFAULT_AGE_DIE,
            contribute_monthly: true,
            withdraw_monthly: true,
        }
    }
}

impl LifetimeInputs {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.age_now < self.age_retire && self.age_retire < self.age_die) {
            return Err(EngineError::invalid(format!(
                "ages must satisfy age_now < age_retire < age_die (got {} / {} / {})",
                self.age_now, self.age_retire, self.age_die
            )));
        }
        check_years(self.age_die - self.age_now)?;
        if self.monthly_secondary_income < 0.0 {
            return Err(EngineError::invalid("monthly_secondary_income must be >= 0"));
        }
        self.contribution_inputs().validate()?;
        check_tax_rate(self.distribution_tax_rate)
    }

    pub fn accumulation_years(&self) -> u32 {
        self.age_retire - self.age_now
    }

    pub fn retirement_years(&self) -> u32 {
        self.age_die - self.age_retire
    }

    pub fn contribution_inputs(&self) -> ContributionInputs {
        ContributionInputs {
            currently_saved: self.currently_saved,
            yearly_contribution: self.yearly_contribution,
            contribution_growth_rate: self.contribution_growth_rate,
            interest_rate: self.interest_rate,
            inflation_rate: self.inflation_rate,
            years: self.accumulation_years(),
            contribute_monthly: self.contribute_monthly,
        }
    }

    /// Withdrawal parameters for the retirement phase, with today's-money
    /// amounts carried forward to the first retirement year.
    pub fn distribution_inputs(&self, starting_value: f64) -> DistributionInputs {
        let carry = (1.0 + self.inflation_rate).powi(self.accumulation_years() as i32);
        DistributionInputs {
            starting_value,
            yearly_withdrawal: self.yearly_distribution * carry,
            secondary_income: self.monthly_secondary_income * 12.0 * carry,
            tax_rate: self.distribution_tax_rate,
            interest_rate: self.interest_rate,
            inflation_rate: self.inflation_rate,
            years: self.retirement_years(),
            withdraw_monthly: self.withdraw_monthly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub name: String,
    pub balance: f64,
}

/// Several accounts drawn down in parallel at a fixed initial withdrawal rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawdownInputs {
    pub accounts: Vec<AccountBalance>,
    pub withdrawal_rate: f64,
    pub interest_rate: f64,
    pub inflation_rate: f64,
    pub years: u32,
}

impl Default for DrawdownInputs {
    fn default() -> Self {
        Self {
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
            withdrawal_rate: DEFAULT_WITHDRAWAL_RATE,
            interest_rate: DEFAULT_DRAWDOWN_INTEREST_RATE,
            inflation_rate: DEFAULT_INFLATION_RATE,
            years: DEFAULT_YEARS,
        }
    }
}

impl DrawdownInputs {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.accounts.is_empty() {
            return Err(EngineError::invalid("at least one account is required"));
        }
        for account in &self.accounts {
            if !account.balance.is_finite() || account.balance < 0.0 {
                return Err(EngineError::invalid(format!(
                    "account '{}' balance must be a finite value >= 0",
                    account.name
                )));
            }
        }
        check_finite([
            ("withdrawal_rate", self.withdrawal_rate),
            ("interest_rate", self.interest_rate),
            ("inflation_rate", self.inflation_rate),
        ])?;
        if !(0.0..=1.0).contains(&self.withdrawal_rate) {
            return Err(EngineError::invalid("withdrawal_rate must be between 0 and 1"));
        }
        check_rate("interest_rate", self.interest_rate)?;
        check_rate("inflation_rate", self.inflation_rate)?;
        check_years(self.years)
    }
}

/// Account value at the end of each year; index 0 holds the starting value.
///
/// Offsets are contiguous, and `label` maps offset 0 to a year number or an
/// age for output.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSeries {
    label: u32,
    values: Vec<f64>,
}

impl ValueSeries {
    pub fn starting_at(label: u32, starting_value: f64) -> Self {
        Self {
            label,
            values: vec![starting_value],
        }
    }

    pub fn push(&mut self, value: f64) {
        self.values.push(value);
    }

    /// Appends `next`, whose starting value must be this series' final value.
    pub fn append(&mut self, next: &ValueSeries) {
        debug_assert_eq!(next.label, self.label + self.years());
        self.values.extend_from_slice(&next.values[1..]);
    }

    pub fn years(&self) -> u32 {
        (self.values.len() - 1) as u32
    }

    pub fn first_label(&self) -> u32 {
        self.label
    }

    pub fn get(&self, offset: u32) -> Option<f64> {
        self.values.get(offset as usize).copied()
    }

    pub fn first(&self) -> f64 {
        self.values[0]
    }

    pub fn last(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(offset, &value)| (self.label + offset as u32, value))
    }

    /// Nominal chart points truncated to whole currency units.
    pub fn points(&self) -> Vec<SeriesPoint> {
        self.iter()
            .map(|(age, value)| SeriesPoint::truncated(age, value))
            .collect()
    }

    /// Chart points expressed in today's currency: offset `k` is divided by
    /// `(1 + inflation_rate)^k` before truncation.
    pub fn real_points(&self, inflation_rate: f64) -> Vec<SeriesPoint> {
        self.values
            .iter()
            .enumerate()
            .map(|(offset, &value)| {
                let deflator = (1.0 + inflation_rate).powi(offset as i32);
                SeriesPoint::truncated(self.label + offset as u32, value / deflator)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeriesPoint {
    pub age: u32,
    pub amount: i64,
}

impl SeriesPoint {
    fn truncated(age: u32, value: f64) -> Self {
        Self {
            age,
            amount: value.trunc() as i64,
        }
    }
}

/// The one input the parameter search is allowed to vary.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchField {
    #[serde(alias = "currentlySaved", alias = "currently_saved")]
    CurrentlySaved,
    #[serde(alias = "yearlyContribution", alias = "yearly_contribution")]
    YearlyContribution,
    #[serde(alias = "contributionGrowthRate", alias = "contribution_growth_rate")]
    ContributionGrowthRate,
    #[serde(alias = "interestRate", alias = "interest_rate")]
    InterestRate,
    Years,
}

impl SearchField {
    /// Decimal places the solved value is reported with.
    pub fn decimals(self) -> u32 {
        match self {
            SearchField::CurrentlySaved | SearchField::YearlyContribution | SearchField::Years => 0,
            SearchField::ContributionGrowthRate | SearchField::InterestRate => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SearchField::CurrentlySaved => "currently_saved",
            SearchField::YearlyContribution => "yearly_contribution",
            SearchField::ContributionGrowthRate => "contribution_growth_rate",
            SearchField::InterestRate => "interest_rate",
            SearchField::Years => "years",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub field: SearchField,
    pub goal: f64,
    pub value: f64,
    pub achieved_after_inflation: f64,
    pub iterations: u32,
}

#[derive(Debug, Clone)]
pub struct LifetimeProjection {
    pub series: ValueSeries,
    pub retirement_age: u32,
    pub inflation_rate: f64,
}

impl LifetimeProjection {
    pub fn last(&self) -> f64 {
        self.series.last()
    }

    pub fn after_inflation(&self) -> f64 {
        self.series.last() / (1.0 + self.inflation_rate).powi(self.series.years() as i32)
    }

    pub fn value_at_retirement(&self) -> f64 {
        self.series
            .get(self.retirement_age - self.series.first_label())
            .unwrap_or_else(|| self.series.last())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProjection {
    pub name: String,
    pub initial_withdrawal: f64,
    pub final_value: f64,
    pub final_value_after_inflation: f64,
    pub points: Vec<SeriesPoint>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    Worst,
    Likely,
    Best,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioOutcome {
    pub scenario: Scenario,
    pub interest_rate: f64,
    pub inflation_rate: f64,
    pub final_value: f64,
    pub final_value_formatted: String,
}

fn check_finite<'a>(
    fields: impl IntoIterator<Item = (&'a str, f64)>,
) -> Result<(), EngineError> {
    for (name, value) in fields {
        if !value.is_finite() {
            return Err(EngineError::invalid(format!("{name} must be finite")));
        }
    }
    Ok(())
}

fn check_rate(name: &str, rate: f64) -> Result<(), EngineError> {
    if rate <= -1.0 {
        return Err(EngineError::invalid(format!("{name} must be > -1")));
    }
    Ok(())
}

fn check_tax_rate(tax_rate: f64) -> Result<(), EngineError> {
    if !(0.0..1.0).contains(&tax_rate) {
        return Err(EngineError::domain(format!(
            "tax rate must be in [0, 1), got {tax_rate}"
        )));
    }
    Ok(())
}

fn check_years(years: u32) -> Result<(), EngineError> {
    if years > MAX_PROJECTION_YEARS {
        return Err(EngineError::invalid(format!(
            "projection horizon must be <= {MAX_PROJECTION_YEARS} years"
        )));
    }
    Ok(())
}
