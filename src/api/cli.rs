use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::info;

use super::{AssumptionOverrides, ServerState, build_plan_response, run_http_server};
use crate::core::{
    Child, CostTable, PlanError, PlanRequest, PlanningAssumptions, format_usd, render_summary,
};

#[derive(Parser, Debug)]
#[command(
    name = "eduplan",
    about = "Education funding planner (projected tuition + lump sum, annual and hybrid savings)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the planning page and JSON API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Compute a plan and print it
    Plan(PlanArgs),
    /// List study destinations and their base annual cost
    Destinations {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    #[arg(long, help = "JSON cost table replacing the built-in destinations")]
    pub cost_table: Option<PathBuf>,
    #[arg(long, help = "JSON planning assumptions; omitted fields keep their defaults")]
    pub assumptions: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct AssumptionArgs {
    #[arg(long, help = "Expected annual investment return in percent, e.g. 15")]
    pub return_rate: Option<f64>,
    #[arg(long, help = "Annual tuition cost growth in percent, e.g. 10")]
    pub cost_growth: Option<f64>,
    #[arg(long, help = "Number of study years to fund")]
    pub study_years: Option<u32>,
    #[arg(long, help = "Nominal university entry age")]
    pub university_age: Option<u32>,
    #[arg(long, help = "Years before entry by which funds must be ready")]
    pub safety_buffer: Option<u32>,
}

impl From<&AssumptionArgs> for AssumptionOverrides {
    fn from(value: &AssumptionArgs) -> Self {
        Self {
            return_rate: value.return_rate,
            cost_growth: value.cost_growth,
            study_years: value.study_years,
            university_age: value.university_age,
            safety_buffer: value.safety_buffer,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[arg(
        long = "age",
        help = "Child age in years; repeat for each child (defaults to one child aged 6)"
    )]
    pub ages: Vec<u32>,
    #[arg(long = "name", help = "Child name, paired with --age by position")]
    pub names: Vec<String>,
    #[arg(long, default_value = "United States")]
    pub country: String,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Initial investment made today under the hybrid strategy (USD)"
    )]
    pub hybrid_initial: f64,
    #[arg(long, help = "Print the full plan as JSON")]
    pub json: bool,
    #[arg(long, help = "Write the planning summary to this file")]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub config: ConfigArgs,
    #[command(flatten)]
    pub overrides: AssumptionArgs,
}

pub async fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Serve { port, config } => {
            let state = load_state(&config).map_err(|e| e.to_string())?;
            run_http_server(port, state)
                .await
                .map_err(|e| format!("Server error: {e}"))
        }
        Command::Plan(args) => {
            let output = run_plan_command(&args)?;
            print!("{output}");
            Ok(())
        }
        Command::Destinations { config } => {
            let state = load_state(&config).map_err(|e| e.to_string())?;
            print!("{}", render_destinations(&state.costs));
            Ok(())
        }
    }
}

fn load_state(config: &ConfigArgs) -> Result<ServerState, PlanError> {
    let assumptions = match &config.assumptions {
        Some(path) => {
            info!("loading assumptions from {}", path.display());
            PlanningAssumptions::from_json_file(path)?
        }
        None => PlanningAssumptions::default(),
    };
    let costs = match &config.cost_table {
        Some(path) => {
            info!("loading cost table from {}", path.display());
            CostTable::from_json_file(path)?
        }
        None => CostTable::default(),
    };
    Ok(ServerState { assumptions, costs })
}

fn build_plan_request(args: &PlanArgs) -> PlanRequest {
    let mut request = PlanRequest {
        country: args.country.clone(),
        hybrid_initial: args.hybrid_initial,
        ..PlanRequest::default()
    };
    if !args.ages.is_empty() {
        request.children = args
            .ages
            .iter()
            .enumerate()
            .map(|(idx, &age)| Child::new(age, args.names.get(idx).cloned().unwrap_or_default()))
            .collect();
    }
    request
}

/// Runs the `plan` subcommand and returns what should be printed.
pub fn run_plan_command(args: &PlanArgs) -> Result<String, String> {
    let state = load_state(&args.config).map_err(|e| e.to_string())?;
    let assumptions = AssumptionOverrides::from(&args.overrides).apply(state.assumptions);
    let request = build_plan_request(args);
    let response =
        build_plan_response(&assumptions, &state.costs, &request).map_err(|e| e.to_string())?;

    let summary = render_summary(&response.outcome);
    if let Some(path) = &args.output {
        fs::write(path, &summary)
            .map_err(|e| PlanError::io(format!("writing {}", path.display()), e).to_string())?;
        info!("summary written to {}", path.display());
    }

    if args.json {
        serde_json::to_string_pretty(&response)
            .map(|json| format!("{json}\n"))
            .map_err(|e| format!("Failed to encode plan: {e}"))
    } else {
        Ok(summary)
    }
}

fn render_destinations(costs: &CostTable) -> String {
    let mut out = format!("Base annual tuition (USD {}):\n", costs.reference_year);
    for dest in &costs.destinations {
        let cost = format_usd(dest.annual_cost.round().max(0.0) as u64);
        out.push_str(&format!("  {:<16} {cost:>14}\n", dest.name));
    }
    out
}
