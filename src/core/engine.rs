use log::debug;

use super::error::{PlanError, PlanResult};
use super::summary::format_usd;
use super::types::{
    ChildFunding, CostTable, Destination, FundingResult, MAX_CHILDREN, PlanOutcome, PlanRequest,
    PlanningAssumptions, ScheduleYear,
};

/// Largest whole-USD figure a plan may report. Keeps family totals exact in `f64`.
const MAX_PLANNABLE_USD: u64 = 1_000_000_000_000_000;

/// Total tuition for all study years, starting `n` years from now, in future dollars.
pub fn project_future_cost(
    assumptions: &PlanningAssumptions,
    age: u32,
    destination: Destination<'_>,
) -> u64 {
    let Some(n) = assumptions.horizon_years(age) else {
        return 0;
    };

    let total: f64 = (0..assumptions.study_years)
        .map(|year_index| {
            destination.annual_cost * growth_factor(assumptions.cost_growth_rate, n + year_index)
        })
        .sum();
    round_usd(total)
}

/// One-time amount invested today that grows to `future_cost` by the readiness age.
pub fn required_lump_sum(assumptions: &PlanningAssumptions, future_cost: u64, age: u32) -> u64 {
    let Some(n) = assumptions.horizon_years(age) else {
        return 0;
    };
    round_usd(future_cost as f64 / growth_factor(assumptions.return_rate, n))
}

/// Level end-of-year deposit that accumulates to `future_cost` by the readiness age.
pub fn required_annual_contribution(
    assumptions: &PlanningAssumptions,
    future_cost: u64,
    age: u32,
) -> u64 {
    let Some(n) = assumptions.horizon_years(age) else {
        return 0;
    };
    round_usd(sinking_fund_payment(
        assumptions.return_rate,
        future_cost as f64,
        n,
    ))
}

/// Annual top-up still needed after investing `hybrid_initial` today.
pub fn required_hybrid_annual_top_up(
    assumptions: &PlanningAssumptions,
    future_cost: u64,
    age: u32,
    hybrid_initial: f64,
) -> u64 {
    let Some(n) = assumptions.horizon_years(age) else {
        return 0;
    };

    let fv_initial = hybrid_initial * growth_factor(assumptions.return_rate, n);
    let remaining = (future_cost as f64 - fv_initial).max(0.0);
    if remaining == 0.0 {
        return 0;
    }
    round_usd(sinking_fund_payment(assumptions.return_rate, remaining, n))
}

pub fn fund_child(
    assumptions: &PlanningAssumptions,
    age: u32,
    destination: Destination<'_>,
    hybrid_initial: f64,
) -> FundingResult {
    let total_future_cost = project_future_cost(assumptions, age, destination);
    FundingResult {
        total_future_cost,
        required_lump_sum: required_lump_sum(assumptions, total_future_cost, age),
        required_annual_contribution: required_annual_contribution(
            assumptions,
            total_future_cost,
            age,
        ),
        required_hybrid_annual_top_up: required_hybrid_annual_top_up(
            assumptions,
            total_future_cost,
            age,
            hybrid_initial,
        ),
    }
}

/// Year-by-year balances of the lump-sum, annual and hybrid strategies up to the readiness age.
///
/// Deposits land at the end of each year after that year's growth, matching the
/// ordinary annuity the contribution formulas assume. Empty once the horizon has passed.
pub fn accumulation_schedule(
    assumptions: &PlanningAssumptions,
    age: u32,
    destination: Destination<'_>,
    hybrid_initial: f64,
) -> Vec<ScheduleYear> {
    let Some(n) = assumptions.horizon_years(age) else {
        return Vec::new();
    };

    let funding = fund_child(assumptions, age, destination, hybrid_initial);
    let growth = 1.0 + assumptions.return_rate;
    let annual_deposit = funding.required_annual_contribution as f64;
    let hybrid_deposit = funding.required_hybrid_annual_top_up as f64;

    let mut lump_sum_balance = funding.required_lump_sum as f64;
    let mut annual_balance = 0.0;
    let mut hybrid_balance = hybrid_initial;
    let mut years = Vec::with_capacity(n as usize);
    for year in 1..=n {
        lump_sum_balance *= growth;
        annual_balance = annual_balance * growth + annual_deposit;
        hybrid_balance = hybrid_balance * growth + hybrid_deposit;
        years.push(ScheduleYear {
            year,
            age: age + year,
            lump_sum_balance,
            annual_balance,
            hybrid_balance,
        });
    }
    years
}

/// Validates a request against the assumptions and cost table, then funds every child.
///
/// The family total is the componentwise sum of the per-child results; every child
/// shares the destination and the hybrid initial lump.
pub fn run_plan(
    assumptions: &PlanningAssumptions,
    costs: &CostTable,
    request: &PlanRequest,
) -> PlanResult<PlanOutcome> {
    assumptions.validate()?;
    validate_request(assumptions, request)?;
    let destination = costs.lookup(&request.country)?;

    let children: Vec<ChildFunding> = request
        .children
        .iter()
        .enumerate()
        .map(|(idx, child)| ChildFunding {
            display_name: child.display_name(idx),
            age: child.age,
            horizon_years: assumptions.horizon_years(child.age).unwrap_or(0),
            result: fund_child(assumptions, child.age, destination, request.hybrid_initial),
        })
        .collect();
    let total: FundingResult = children.iter().map(|c| c.result).sum();
    ensure_plannable(&total)?;

    let schedule = request
        .children
        .first()
        .map(|child| {
            accumulation_schedule(assumptions, child.age, destination, request.hybrid_initial)
        })
        .unwrap_or_default();

    debug!(
        "planned {} child(ren) for {}: {:?}",
        children.len(),
        destination.name,
        total
    );

    Ok(PlanOutcome {
        country: destination.name.to_string(),
        target_readiness_age: assumptions.target_readiness_age(),
        safety_buffer_years: assumptions.safety_buffer_years,
        hybrid_initial: request.hybrid_initial,
        children,
        total,
        schedule,
    })
}

fn validate_request(assumptions: &PlanningAssumptions, request: &PlanRequest) -> PlanResult<()> {
    if request.children.len() > MAX_CHILDREN {
        return Err(PlanError::TooManyChildren {
            count: request.children.len(),
            max: MAX_CHILDREN,
        });
    }

    let max_age = assumptions.max_child_age();
    if let Some(child) = request.children.iter().find(|c| c.age > max_age) {
        return Err(PlanError::AgeOutOfRange {
            age: i64::from(child.age),
            max: max_age,
        });
    }

    if !request.hybrid_initial.is_finite() || request.hybrid_initial < 0.0 {
        return Err(PlanError::InvalidHybridInitial(request.hybrid_initial));
    }
    Ok(())
}

fn ensure_plannable(total: &FundingResult) -> PlanResult<()> {
    let largest = [
        total.total_future_cost,
        total.required_lump_sum,
        total.required_annual_contribution,
        total.required_hybrid_annual_top_up,
    ]
    .into_iter()
    .max()
    .unwrap_or(0);
    if largest > MAX_PLANNABLE_USD {
        return Err(PlanError::InvalidAssumption(format!(
            "funding figures exceed {} under these assumptions",
            format_usd(MAX_PLANNABLE_USD)
        )));
    }
    Ok(())
}

fn growth_factor(rate: f64, years: u32) -> f64 {
    (1.0 + rate).powf(f64::from(years))
}

fn sinking_fund_payment(rate: f64, target: f64, years: u32) -> f64 {
    if rate.abs() < 1e-12 {
        return target / f64::from(years.max(1));
    }
    target * rate / (growth_factor(rate, years) - 1.0)
}

/// Non-positive and NaN amounts become 0; anything past `u64::MAX` saturates.
fn round_usd(amount: f64) -> u64 {
    if amount.is_nan() || amount <= 0.0 {
        0
    } else {
        amount.round() as u64
    }
}
