pub mod cli;

use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{ArgAction, Args, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    AccountBalance, AccountProjection, ContributionInputs, DEFAULT_AGE_DIE, DEFAULT_AGE_NOW,
    DEFAULT_AGE_RETIRE, DEFAULT_CONTRIBUTION_GROWTH_RATE, DEFAULT_CURRENTLY_SAVED,
    DEFAULT_DISTRIBUTION_TAX_RATE, DEFAULT_DRAWDOWN_INTEREST_RATE, DEFAULT_GOAL,
    DEFAULT_INFLATION_RATE, DEFAULT_INTEREST_RATE, DEFAULT_LIFETIME_CURRENTLY_SAVED,
    DEFAULT_LIFETIME_INFLATION_RATE, DEFAULT_LIFETIME_YEARLY_CONTRIBUTION, DEFAULT_MAX_ITERATIONS,
    DEFAULT_MONTHLY_SECONDARY_INCOME, DEFAULT_WITHDRAWAL_RATE, DEFAULT_YEARLY_CONTRIBUTION,
    DEFAULT_YEARLY_DISTRIBUTION, DEFAULT_YEARS, DrawdownInputs, EngineError, LifetimeInputs,
    LifetimeProjection, ScenarioOutcome, SearchBudget, SearchField, SearchOutcome, SearchRequest,
    SeriesPoint, compare_scenarios, format_currency, run_drawdown, run_lifetime,
    search_parameter,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliSearchField {
    CurrentlySaved,
    YearlyContribution,
    ContributionGrowthRate,
    InterestRate,
    Years,
}

impl From<CliSearchField> for SearchField {
    fn from(value: CliSearchField) -> Self {
        match value {
            CliSearchField::CurrentlySaved => SearchField::CurrentlySaved,
            CliSearchField::YearlyContribution => SearchField::YearlyContribution,
            CliSearchField::ContributionGrowthRate => SearchField::ContributionGrowthRate,
            CliSearchField::InterestRate => SearchField::InterestRate,
            CliSearchField::Years => SearchField::Years,
        }
    }
}

/// Lifetime plan flags; rates are decimals (0.06 for 6%).
#[derive(Args, Debug, Clone)]
pub struct LifetimeArgs {
    #[arg(long, default_value_t = DEFAULT_LIFETIME_CURRENTLY_SAVED)]
    pub currently_saved: f64,
    #[arg(long, default_value_t = DEFAULT_LIFETIME_YEARLY_CONTRIBUTION)]
    pub yearly_contribution: f64,
    #[arg(
        long,
        default_value_t = DEFAULT_CONTRIBUTION_GROWTH_RATE,
        help = "Annual growth of the yearly contribution, e.g. 0.02 for pay rises"
    )]
    pub contribution_growth_rate: f64,
    #[arg(
        long,
        default_value_t = DEFAULT_YEARLY_DISTRIBUTION,
        help = "Yearly spending in retirement, in today's money"
    )]
    pub yearly_distribution: f64,
    #[arg(
        long,
        default_value_t = DEFAULT_DISTRIBUTION_TAX_RATE,
        help = "Tax rate applied to withdrawals and secondary income"
    )]
    pub distribution_tax_rate: f64,
    #[arg(
        long,
        default_value_t = DEFAULT_MONTHLY_SECONDARY_INCOME,
        help = "Monthly pre-tax income in retirement (pension, social security), in today's money"
    )]
    pub monthly_secondary_income: f64,
    #[arg(long, default_value_t = DEFAULT_INTEREST_RATE)]
    pub interest_rate: f64,
    #[arg(long, default_value_t = DEFAULT_LIFETIME_INFLATION_RATE)]
    pub inflation_rate: f64,
    #[arg(long, default_value_t = DEFAULT_AGE_NOW)]
    pub age_now: u32,
    #[arg(long, default_value_t = DEFAULT_AGE_RETIRE)]
    pub age_retire: u32,
    #[arg(long, default_value_t = DEFAULT_AGE_DIE)]
    pub age_die: u32,
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub contribute_monthly: bool,
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub withdraw_monthly: bool,
}

impl Default for LifetimeArgs {
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

/// Search flags. Leaving out `--field` is reported as a configuration error.
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    #[arg(long, default_value_t = DEFAULT_GOAL, help = "Target value in today's money")]
    pub goal: f64,
    #[arg(long, value_enum, help = "Input to solve for")]
    pub field: Option<CliSearchField>,
    #[arg(long, default_value_t = DEFAULT_CURRENTLY_SAVED)]
    pub currently_saved: f64,
    #[arg(long, default_value_t = DEFAULT_YEARLY_CONTRIBUTION)]
    pub yearly_contribution: f64,
    #[arg(long, default_value_t = DEFAULT_CONTRIBUTION_GROWTH_RATE)]
    pub contribution_growth_rate: f64,
    #[arg(long, default_value_t = DEFAULT_INTEREST_RATE)]
    pub interest_rate: f64,
    #[arg(long, default_value_t = DEFAULT_INFLATION_RATE)]
    pub inflation_rate: f64,
    #[arg(long, default_value_t = DEFAULT_YEARS)]
    pub years: u32,
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub contribute_monthly: bool,
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_ITERATIONS,
        help = "Objective evaluations allowed before giving up"
    )]
    pub max_iterations: u32,
}

impl Default for SearchArgs {
    fn default() -> Self {
        Self {
            goal: DEFAULT_GOAL,
            field: None,
            currently_saved: DEFAULT_CURRENTLY_SAVED,
            yearly_contribution: DEFAULT_YEARLY_CONTRIBUTION,
            contribution_growth_rate: DEFAULT_CONTRIBUTION_GROWTH_RATE,
            interest_rate: DEFAULT_INTEREST_RATE,
            inflation_rate: DEFAULT_INFLATION_RATE,
            years: DEFAULT_YEARS,
            contribute_monthly: false,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DrawdownArgs {
    #[arg(
        long = "account",
        value_parser = parse_account,
        help = "Account as NAME=BALANCE; repeat for several accounts"
    )]
    pub accounts: Vec<AccountBalance>,
    #[arg(long, default_value_t = DEFAULT_WITHDRAWAL_RATE)]
    pub withdrawal_rate: f64,
    #[arg(long, default_value_t = DEFAULT_DRAWDOWN_INTEREST_RATE)]
    pub interest_rate: f64,
    #[arg(long, default_value_t = DEFAULT_INFLATION_RATE)]
    pub inflation_rate: f64,
    #[arg(long, default_value_t = DEFAULT_YEARS)]
    pub years: u32,
}

impl Default for DrawdownArgs {
    fn default() -> Self {
        let defaults = DrawdownInputs::default();
        Self {
            accounts: Vec::new(),
            withdrawal_rate: defaults.withdrawal_rate,
            interest_rate: defaults.interest_rate,
            inflation_rate: defaults.inflation_rate,
            years: defaults.years,
        }
    }
}

fn parse_account(raw: &str) -> Result<AccountBalance, String> {
    let (name, balance) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=BALANCE, got '{raw}'"))?;
    let balance = balance
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid balance for account '{name}': {e}"))?;
    Ok(AccountBalance {
        name: name.trim().to_string(),
        balance,
    })
}

pub fn build_lifetime_inputs(args: LifetimeArgs) -> Result<LifetimeInputs, String> {
    let inputs = LifetimeInputs {
        currently_saved: args.currently_saved,
        yearly_contribution: args.yearly_contribution,
        contribution_growth_rate: args.contribution_growth_rate,
        yearly_distribution: args.yearly_distribution,
        distribution_tax_rate: args.distribution_tax_rate,
        monthly_secondary_income: args.monthly_secondary_income,
        interest_rate: args.interest_rate,
        inflation_rate: args.inflation_rate,
        age_now: args.age_now,
        age_retire: args.age_retire,
        age_die: args.age_die,
        contribute_monthly: args.contribute_monthly,
        withdraw_monthly: args.withdraw_monthly,
    };
    inputs.validate().map_err(|e| e.to_string())?;
    Ok(inputs)
}

pub fn build_search_request(args: SearchArgs) -> Result<(SearchRequest, SearchBudget), String> {
    if args.max_iterations == 0 {
        return Err("--max-iterations must be > 0".to_string());
    }
    let request = SearchRequest {
        goal: args.goal,
        field: args.field.map(SearchField::from),
        inputs: ContributionInputs {
            currently_saved: args.currently_saved,
            yearly_contribution: args.yearly_contribution,
            contribution_growth_rate: args.contribution_growth_rate,
            interest_rate: args.interest_rate,
            inflation_rate: args.inflation_rate,
            years: args.years,
            contribute_monthly: args.contribute_monthly,
        },
    };
    let budget = SearchBudget {
        max_iterations: args.max_iterations,
        ..SearchBudget::default()
    };
    Ok((request, budget))
}

pub fn build_drawdown_inputs(args: DrawdownArgs) -> Result<DrawdownInputs, String> {
    let accounts = if args.accounts.is_empty() {
        DrawdownInputs::default().accounts
    } else {
        args.accounts
    };
    let inputs = DrawdownInputs {
        accounts,
        withdrawal_rate: args.withdrawal_rate,
        interest_rate: args.interest_rate,
        inflation_rate: args.inflation_rate,
        years: args.years,
    };
    inputs.validate().map_err(|e| e.to_string())?;
    Ok(inputs)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    currently_saved: Option<f64>,
    yearly_contribution: Option<f64>,
    contribution_growth: Option<f64>,
    yearly_distribution: Option<f64>,
    distribution_tax_rate: Option<f64>,
    monthly_secondary_income: Option<f64>,
    #[serde(alias = "apr")]
    interest_rate: Option<f64>,
    inflation_rate: Option<f64>,
    age_now: Option<u32>,
    age_retire: Option<u32>,
    age_die: Option<u32>,
    contribute_monthly: Option<bool>,
    withdraw_monthly: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SearchPayload {
    goal: Option<f64>,
    field: Option<SearchField>,
    currently_saved: Option<f64>,
    yearly_contribution: Option<f64>,
    contribution_growth: Option<f64>,
    interest_rate: Option<f64>,
    inflation_rate: Option<f64>,
    years: Option<u32>,
    contribute_monthly: Option<bool>,
    max_iterations: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DrawdownPayload {
    accounts: Option<Vec<AccountBalance>>,
    withdrawal_rate: Option<f64>,
    interest_rate: Option<f64>,
    inflation_rate: Option<f64>,
    years: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateResponse {
    pub age_now: u32,
    pub retirement_age: u32,
    pub age_die: u32,
    pub points: Vec<SeriesPoint>,
    pub nominal_points: Vec<SeriesPoint>,
    pub value_at_retirement: f64,
    pub final_value: f64,
    pub final_value_after_inflation: f64,
    pub final_value_formatted: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(flatten)]
    outcome: SearchOutcome,
    value_formatted: String,
}

#[derive(Debug, Serialize)]
struct CompareResponse {
    scenarios: Vec<ScenarioOutcome>,
}

#[derive(Debug, Serialize)]
struct DrawdownResponse {
    accounts: Vec<AccountProjection>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn build_simulate_response(
    inputs: &LifetimeInputs,
    projection: &LifetimeProjection,
) -> SimulateResponse {
    let final_value_after_inflation = projection.after_inflation();
    SimulateResponse {
        age_now: inputs.age_now,
        retirement_age: projection.retirement_age,
        age_die: inputs.age_die,
        points: projection.series.real_points(inputs.inflation_rate),
        nominal_points: projection.series.points(),
        value_at_retirement: projection.value_at_retirement(),
        final_value: projection.last(),
        final_value_after_inflation,
        final_value_formatted: format_currency(final_value_after_inflation),
    }
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/search", post(search_handler))
        .route("/api/compare", post(compare_handler))
        .route("/api/drawdown", post(drawdown_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "projection HTTP API listening");
    println!("Local access: http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let inputs = match lifetime_inputs_from_payload(payload) {
        Ok(inputs) => inputs,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match run_lifetime(&inputs) {
        Ok(projection) => json_response(
            StatusCode::OK,
            build_simulate_response(&inputs, &projection),
        ),
        Err(err) => engine_error_response(&err),
    }
}

async fn search_handler(Json(payload): Json<SearchPayload>) -> Response {
    let (request, budget) = match search_request_from_payload(payload) {
        Ok(parts) => parts,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match search_parameter(&request, budget) {
        Ok(outcome) => {
            let value_formatted = match outcome.field.decimals() {
                0 if outcome.field != SearchField::Years => format_currency(outcome.value),
                decimals => format!("{:.*}", decimals as usize, outcome.value),
            };
            json_response(
                StatusCode::OK,
                SearchResponse {
                    outcome,
                    value_formatted,
                },
            )
        }
        Err(err) => engine_error_response(&err),
    }
}

async fn compare_handler(Json(payload): Json<SimulatePayload>) -> Response {
    let inputs = match lifetime_inputs_from_payload(payload) {
        Ok(inputs) => inputs,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match compare_scenarios(&inputs) {
        Ok(scenarios) => json_response(StatusCode::OK, CompareResponse { scenarios }),
        Err(err) => engine_error_response(&err),
    }
}

async fn drawdown_handler(Json(payload): Json<DrawdownPayload>) -> Response {
    let inputs = match drawdown_inputs_from_payload(payload) {
        Ok(inputs) => inputs,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match run_drawdown(&inputs) {
        Ok(accounts) => json_response(StatusCode::OK, DrawdownResponse { accounts }),
        Err(err) => engine_error_response(&err),
    }
}

fn engine_error_response(err: &EngineError) -> Response {
    let status = if err.is_input_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    warn!(%err, status = status.as_u16(), "request failed");
    error_response(status, &err.to_string())
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn lifetime_inputs_from_payload(payload: SimulatePayload) -> Result<LifetimeInputs, String> {
    let mut args = LifetimeArgs::default();

    if let Some(v) = payload.currently_saved {
        args.currently_saved = v;
    }
    if let Some(v) = payload.yearly_contribution {
        args.yearly_contribution = v;
    }
    if let Some(v) = payload.contribution_growth {
        args.contribution_growth_rate = v;
    }
    if let Some(v) = payload.yearly_distribution {
        args.yearly_distribution = v;
    }
    if let Some(v) = payload.distribution_tax_rate {
        args.distribution_tax_rate = v;
    }
    if let Some(v) = payload.monthly_secondary_income {
        args.monthly_secondary_income = v;
    }
    if let Some(v) = payload.interest_rate {
        args.interest_rate = v;
    }
    if let Some(v) = payload.inflation_rate {
        args.inflation_rate = v;
    }
    if let Some(v) = payload.age_now {
        args.age_now = v;
    }
    if let Some(v) = payload.age_retire {
        args.age_retire = v;
    }
    if let Some(v) = payload.age_die {
        args.age_die = v;
    }
    if let Some(v) = payload.contribute_monthly {
        args.contribute_monthly = v;
    }
    if let Some(v) = payload.withdraw_monthly {
        args.withdraw_monthly = v;
    }

    build_lifetime_inputs(args)
}

fn search_request_from_payload(
    payload: SearchPayload,
) -> Result<(SearchRequest, SearchBudget), String> {
    let mut args = SearchArgs::default();

    if let Some(v) = payload.goal {
        args.goal = v;
    }
    if let Some(v) = payload.currently_saved {
        args.currently_saved = v;
    }
    if let Some(v) = payload.yearly_contribution {
        args.yearly_contribution = v;
    }
    if let Some(v) = payload.contribution_growth {
        args.contribution_growth_rate = v;
    }
    if let Some(v) = payload.interest_rate {
        args.interest_rate = v;
    }
    if let Some(v) = payload.inflation_rate {
        args.inflation_rate = v;
    }
    if let Some(v) = payload.years {
        args.years = v;
    }
    if let Some(v) = payload.contribute_monthly {
        args.contribute_monthly = v;
    }
    if let Some(v) = payload.max_iterations {
        args.max_iterations = v;
    }

    let (mut request, budget) = build_search_request(args)?;
    request.field = payload.field;
    Ok((request, budget))
}

fn drawdown_inputs_from_payload(payload: DrawdownPayload) -> Result<DrawdownInputs, String> {
    let mut args = DrawdownArgs::default();

    if let Some(v) = payload.accounts {
        args.accounts = v;
    }
    if let Some(v) = payload.withdrawal_rate {
        args.withdrawal_rate = v;
    }
    if let Some(v) = payload.interest_rate {
        args.interest_rate = v;
    }
    if let Some(v) = payload.inflation_rate {
        args.inflation_rate = v;
    }
    if let Some(v) = payload.years {
        args.years = v;
    }

    build_drawdown_inputs(args)
}
