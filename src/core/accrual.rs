//! Interest earned by cash flows spread evenly across the twelve months of a
//! year, as opposed to a single lump sum at the start or end of the year.

pub const MONTHS_PER_YEAR: usize = 12;

/// Per-month interest for one year; index 0 is January.
pub type AccrualSchedule = [f64; MONTHS_PER_YEAR];

/// Interest earned by level monthly deposits of `yearly_contribution / 12`.
///
/// Deposits land at the start of each month, so the January deposit earns a
/// full year of interest and the December deposit earns one month.
pub fn contribution_schedule(yearly_contribution: f64, annual_rate: f64) -> AccrualSchedule {
    let monthly_contribution = yearly_contribution / MONTHS_PER_YEAR as f64;
    let mut schedule = [0.0; MONTHS_PER_YEAR];
    for (idx, slot) in schedule.iter_mut().enumerate() {
        let month = idx + 1;
        let months_invested = (MONTHS_PER_YEAR + 1 - month) as f64;
        *slot = monthly_contribution * annual_rate * (months_invested / MONTHS_PER_YEAR as f64);
    }
    schedule
}

/// Interest earned by the not-yet-withdrawn part of a yearly distribution
/// taken in level monthly slices from a monthly compounding balance.
///
/// Each month's slice is removed before that month's interest is credited,
/// so December contributes nothing.
pub fn distribution_schedule(yearly_distribution: f64, annual_rate: f64) -> AccrualSchedule {
    let monthly_distribution = yearly_distribution / MONTHS_PER_YEAR as f64;
    let monthly_rate = annual_rate / MONTHS_PER_YEAR as f64;
    let mut remaining = yearly_distribution;
    let mut schedule = [0.0; MONTHS_PER_YEAR];
    for slot in schedule.iter_mut() {
        remaining -= monthly_distribution;
        *slot = remaining * monthly_rate;
    }
    schedule
}

pub fn contribution_accrual(yearly_contribution: f64, annual_rate: f64) -> f64 {
    contribution_schedule(yearly_contribution, annual_rate)
        .iter()
        .sum()
}

pub fn distribution_accrual(yearly_distribution: f64, annual_rate: f64) -> f64 {
    distribution_schedule(yearly_distribution, annual_rate)
        .iter()
        .sum()
}
