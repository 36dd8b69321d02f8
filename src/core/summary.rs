use super::types::PlanOutcome;

pub const SUMMARY_FILE_NAME: &str = "Education_Planning_Summary.txt";

/// Formats a whole-dollar amount with thousands separators, e.g. `USD 1,234,567`.
pub fn format_usd(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("USD {grouped}")
}

/// Renders the downloadable planning summary for a computed plan.
pub fn render_summary(outcome: &PlanOutcome) -> String {
    let total = &outcome.total;
    let mut lines = vec![
        "Education Planning Summary".to_string(),
        String::new(),
        format!(
            "Funds are planned to be ready {} years before university entry to reduce market risk.",
            outcome.safety_buffer_years
        ),
        String::new(),
        format!("Country of Education: {}", outcome.country),
        String::new(),
        "Children Information:".to_string(),
    ];
    lines.extend(
        outcome
            .children
            .iter()
            .map(|child| format!("- {}, Age: {}", child.display_name, child.age)),
    );
    lines.extend([
        String::new(),
        "Investment Summary:".to_string(),
        format!(
            "Total Education Cost: {}",
            format_usd(total.total_future_cost)
        ),
        format!("One-Time Investment: {}", format_usd(total.required_lump_sum)),
        format!(
            "Annual Investment: {} / year",
            format_usd(total.required_annual_contribution)
        ),
        format!(
            "Hybrid Strategy: Initial {}, Additional {} / year",
            format_usd(outcome.hybrid_initial.round().max(0.0) as u64),
            format_usd(total.required_hybrid_annual_top_up)
        ),
        String::new(),
        "This simulation is for planning purposes only and does not guarantee future investment returns."
            .to_string(),
    ]);

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
