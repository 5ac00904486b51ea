use clap::{Parser, Subcommand};
use tracing::info;

use super::{
    DrawdownArgs, LifetimeArgs, SearchArgs, build_drawdown_inputs, build_lifetime_inputs,
    build_search_request, build_simulate_response, run_http_server,
};
use crate::core::{
    AccountProjection, ScenarioOutcome, SearchOutcome, SearchField, compare_scenarios,
    format_currency, run_drawdown, run_lifetime, search_parameter,
};

#[derive(Parser, Debug)]
#[command(
    name = "nestegg",
    about = "Deterministic retirement savings projections and goal search"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "info",
        help = "Log level for the nestegg target; RUST_LOG overrides it"
    )]
    pub log_level: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Project savings from today until death.
    Simulate(LifetimeArgs),
    /// Solve for one contribution input so the goal is met after inflation.
    Search(SearchArgs),
    /// Final value after inflation under worst, likely and best rates.
    Compare(LifetimeArgs),
    /// Draw several accounts down at a fixed initial withdrawal rate.
    Drawdown(DrawdownArgs),
}

pub async fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Serve { port } => run_http_server(port)
            .await
            .map_err(|e| format!("Server error: {e}")),
        Command::Simulate(args) => {
            let inputs = build_lifetime_inputs(args)?;
            let projection = run_lifetime(&inputs).map_err(|e| e.to_string())?;
            let response = build_simulate_response(&inputs, &projection);
            println!("{}", render_simulation(&response));
            Ok(())
        }
        Command::Search(args) => {
            let (request, budget) = build_search_request(args)?;
            let outcome = search_parameter(&request, budget).map_err(|e| e.to_string())?;
            println!("{}", render_search(&outcome));
            Ok(())
        }
        Command::Compare(args) => {
            let inputs = build_lifetime_inputs(args)?;
            let outcomes = compare_scenarios(&inputs).map_err(|e| e.to_string())?;
            println!("{}", render_scenarios(&outcomes));
            Ok(())
        }
        Command::Drawdown(args) => {
            let inputs = build_drawdown_inputs(args)?;
            info!(accounts = inputs.accounts.len(), "running drawdown");
            let accounts = run_drawdown(&inputs).map_err(|e| e.to_string())?;
            println!("{}", render_drawdown(&accounts));
            Ok(())
        }
    }
}

fn render_simulation(response: &super::SimulateResponse) -> String {
    let mut out = String::new();
    out.push_str("age  value (today's money)\n");
    for point in &response.points {
        let marker = if point.age == response.retirement_age {
            "  <- retire"
        } else {
            ""
        };
        out.push_str(&format!(
            "{:>3}  {:>15}{marker}\n",
            point.age,
            format_currency(point.amount as f64)
        ));
    }
    out.push_str(&format!(
        "\nValue at retirement: {}\nFinal value: {} ({} after inflation)",
        format_currency(response.value_at_retirement),
        format_currency(response.final_value),
        response.final_value_formatted
    ));
    out
}

fn render_search(outcome: &SearchOutcome) -> String {
    let value = match outcome.field {
        SearchField::CurrentlySaved | SearchField::YearlyContribution => {
            format_currency(outcome.value)
        }
        SearchField::Years => format!("{} years", outcome.value),
        SearchField::ContributionGrowthRate | SearchField::InterestRate => {
            format!("{:.1}%", outcome.value * 100.0)
        }
    };
    format!(
        "{} = {value}\nGoal {} reached with {} after inflation ({} evaluations)",
        outcome.field.name(),
        format_currency(outcome.goal),
        format_currency(outcome.achieved_after_inflation),
        outcome.iterations
    )
}

fn render_scenarios(outcomes: &[ScenarioOutcome]) -> String {
    outcomes
        .iter()
        .map(|o| {
            format!(
                "{:<7} interest {:>5.2}%  inflation {:>5.2}%  {}",
                format!("{:?}", o.scenario).to_lowercase(),
                o.interest_rate * 100.0,
                o.inflation_rate * 100.0,
                o.final_value_formatted
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_drawdown(accounts: &[AccountProjection]) -> String {
    accounts
        .iter()
        .map(|a| {
            format!(
                "{}: withdraw {} in year one, ends at {} ({} after inflation)",
                a.name,
                format_currency(a.initial_withdrawal),
                format_currency(a.final_value),
                format_currency(a.final_value_after_inflation)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
