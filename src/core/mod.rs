mod accrual;
mod engine;
mod error;
mod format;
mod solver;
mod types;

pub use accrual::{
    AccrualSchedule, contribution_accrual, contribution_schedule, distribution_accrual,
    distribution_schedule,
};
pub use engine::{
    ContributionPhase, DistributionPhase, Phase, SCENARIO_RATES, YearTransition,
    compare_scenarios, effective_withdrawal, run_drawdown, run_lifetime,
};
pub use error::EngineError;
pub use format::format_currency;
pub use solver::{
    DEFAULT_GROWTH_FACTOR, DEFAULT_MAX_ITERATIONS, DEFAULT_SEED, SearchBudget, SearchRequest,
    Solution, search_parameter, solve_monotone,
};
pub use types::*;
