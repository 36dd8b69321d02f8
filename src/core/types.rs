use std::fs;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{PlanError, PlanResult};

/// Largest number of children a single plan accepts.
pub const MAX_CHILDREN: usize = 5;

/// Upper bound on any single rate assumption (100% a year).
pub const MAX_RATE: f64 = 1.0;
pub const MAX_STUDY_YEARS: u32 = 10;
pub const MAX_ENTRY_AGE: u32 = 100;

/// Process-wide planning assumptions. Rates are fractions (0.15 = 15%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlanningAssumptions {
    pub return_rate: f64,
    pub cost_growth_rate: f64,
    pub study_years: u32,
    pub university_entry_age: u32,
    pub safety_buffer_years: u32,
}

impl Default for PlanningAssumptions {
    fn default() -> Self {
        Self {
            return_rate: 0.15,
            cost_growth_rate: 0.10,
            study_years: 4,
            university_entry_age: 18,
            safety_buffer_years: 2,
        }
    }
}

impl PlanningAssumptions {
    /// Age by which the funds must be fully accumulated.
    pub fn target_readiness_age(&self) -> u32 {
        self.university_entry_age
            .saturating_sub(self.safety_buffer_years)
    }

    pub fn max_child_age(&self) -> u32 {
        self.university_entry_age.saturating_sub(1)
    }

    /// Years left to invest for a child of `age`, or `None` once the readiness age is reached.
    pub fn horizon_years(&self, age: u32) -> Option<u32> {
        let target = self.target_readiness_age();
        (age < target).then(|| target - age)
    }

    pub fn validate(&self) -> PlanResult<()> {
        for (name, rate) in [
            ("returnRate", self.return_rate),
            ("costGrowthRate", self.cost_growth_rate),
        ] {
            if !rate.is_finite() || rate <= -1.0 || rate > MAX_RATE {
                return Err(PlanError::InvalidAssumption(format!(
                    "{name} must be > -100% and <= 100%"
                )));
            }
        }
        if !(1..=MAX_STUDY_YEARS).contains(&self.study_years) {
            return Err(PlanError::InvalidAssumption(format!(
                "studyYears must be between 1 and {MAX_STUDY_YEARS}"
            )));
        }
        if !(1..=MAX_ENTRY_AGE).contains(&self.university_entry_age) {
            return Err(PlanError::InvalidAssumption(format!(
                "universityEntryAge must be between 1 and {MAX_ENTRY_AGE}"
            )));
        }
        if self.safety_buffer_years > self.university_entry_age {
            return Err(PlanError::InvalidAssumption(
                "safetyBufferYears must be <= universityEntryAge".to_string(),
            ));
        }
        Ok(())
    }

    /// Loads an assumption set from a JSON file; omitted fields keep their defaults.
    pub fn from_json_file(path: &Path) -> PlanResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| PlanError::io(format!("reading {}", path.display()), e))?;
        let assumptions: Self = serde_json::from_str(&raw)?;
        assumptions.validate()?;
        Ok(assumptions)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationCost {
    pub name: String,
    /// Present-value annual tuition in USD as of the table's reference year.
    pub annual_cost: f64,
}

/// Study destinations and their base annual tuition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostTable {
    pub reference_year: u32,
    pub destinations: Vec<DestinationCost>,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            reference_year: 2025,
            destinations: Vec::new(),
        }
        .with_destination("Indonesia", 12_000.0)
        .with_destination("China", 18_700.0)
        .with_destination("Singapore", 49_000.0)
        .with_destination("Australia", 52_000.0)
        .with_destination("United States", 75_625.0)
    }
}

/// A destination resolved against a [`CostTable`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Destination<'a> {
    pub name: &'a str,
    pub annual_cost: f64,
}

impl CostTable {
    pub fn with_destination(mut self, name: impl Into<String>, annual_cost: f64) -> Self {
        self.destinations.push(DestinationCost {
            name: name.into(),
            annual_cost,
        });
        self
    }

    /// Exact name match first, then a case-insensitive one.
    pub fn lookup(&self, name: &str) -> PlanResult<Destination<'_>> {
        let name = name.trim();
        self.destinations
            .iter()
            .find(|d| d.name == name)
            .or_else(|| {
                self.destinations
                    .iter()
                    .find(|d| d.name.eq_ignore_ascii_case(name))
            })
            .map(|d| Destination {
                name: &d.name,
                annual_cost: d.annual_cost,
            })
            .ok_or_else(|| PlanError::UnknownCountry(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.destinations.iter().map(|d| d.name.as_str())
    }

    pub fn validate(&self) -> PlanResult<()> {
        if self.destinations.is_empty() {
            return Err(PlanError::InvalidCostTable(
                "at least one destination is required".to_string(),
            ));
        }
        for (idx, dest) in self.destinations.iter().enumerate() {
            if dest.name.trim().is_empty() {
                return Err(PlanError::InvalidCostTable(format!(
                    "destination #{} has an empty name",
                    idx + 1
                )));
            }
            if !dest.annual_cost.is_finite() || dest.annual_cost < 0.0 {
                return Err(PlanError::InvalidCostTable(format!(
                    "{} must have a finite annual cost >= 0",
                    dest.name
                )));
            }
            if self.destinations[..idx]
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(&dest.name))
            {
                return Err(PlanError::InvalidCostTable(format!(
                    "{} is listed more than once",
                    dest.name
                )));
            }
        }
        Ok(())
    }

    pub fn from_json_file(path: &Path) -> PlanResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| PlanError::io(format!("reading {}", path.display()), e))?;
        let table: Self = serde_json::from_str(&raw)?;
        table.validate()?;
        Ok(table)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
    pub age: u32,
    #[serde(default)]
    pub name: String,
}

impl Child {
    pub fn new(age: u32, name: impl Into<String>) -> Self {
        Self {
            age,
            name: name.into(),
        }
    }

    /// The entered name, or `Child {n}` for the zero-based `index`.
    pub fn display_name(&self, index: usize) -> String {
        let name = self.name.trim();
        if name.is_empty() {
            format!("Child {}", index + 1)
        } else {
            name.to_string()
        }
    }
}

/// Whole-USD funding figures for one child or a whole family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingResult {
    pub total_future_cost: u64,
    pub required_lump_sum: u64,
    pub required_annual_contribution: u64,
    pub required_hybrid_annual_top_up: u64,
}

impl Add for FundingResult {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for FundingResult {
    fn add_assign(&mut self, rhs: Self) {
        self.total_future_cost = self.total_future_cost.saturating_add(rhs.total_future_cost);
        self.required_lump_sum = self.required_lump_sum.saturating_add(rhs.required_lump_sum);
        self.required_annual_contribution = self
            .required_annual_contribution
            .saturating_add(rhs.required_annual_contribution);
        self.required_hybrid_annual_top_up = self
            .required_hybrid_annual_top_up
            .saturating_add(rhs.required_hybrid_annual_top_up);
    }
}

impl Sum for FundingResult {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildFunding {
    pub display_name: String,
    pub age: u32,
    pub horizon_years: u32,
    #[serde(flatten)]
    pub result: FundingResult,
}

/// End-of-year balances of the three strategies for one child.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleYear {
    pub year: u32,
    pub age: u32,
    pub lump_sum_balance: f64,
    pub annual_balance: f64,
    pub hybrid_balance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    pub children: Vec<Child>,
    pub country: String,
    pub hybrid_initial: f64,
}

impl Default for PlanRequest {
    fn default() -> Self {
        Self {
            children: vec![Child::new(6, "")],
            country: "United States".to_string(),
            hybrid_initial: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOutcome {
    pub country: String,
    pub target_readiness_age: u32,
    pub safety_buffer_years: u32,
    pub hybrid_initial: f64,
    pub children: Vec<ChildFunding>,
    pub total: FundingResult,
    /// Accumulation schedule of the first child; empty when there is none to show.
    pub schedule: Vec<ScheduleYear>,
}
