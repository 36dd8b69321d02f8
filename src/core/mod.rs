mod engine;
mod error;
mod summary;
mod types;

pub use engine::{
    accumulation_schedule, fund_child, project_future_cost, required_annual_contribution,
    required_hybrid_annual_top_up, required_lump_sum, run_plan,
};
pub use error::{PlanError, PlanResult};
pub use summary::{SUMMARY_FILE_NAME, format_usd, render_summary};
pub use types::{
    Child, ChildFunding, CostTable, Destination, DestinationCost, FundingResult, MAX_CHILDREN,
    PlanOutcome, PlanRequest, PlanningAssumptions, ScheduleYear,
};
