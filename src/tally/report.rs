//! Human-readable dumps of the tally.

use clap::ValueEnum;

use super::TallyState;

/// Layout of the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReportFormat {
    /// Totals as pretty-printed JSON.
    Json,
    /// Totals with a per-month breakdown for each user.
    #[default]
    Monthly,
}

/// Renders the report in the requested format.
pub fn render(state: &TallyState, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Json => render_json(state),
        ReportFormat::Monthly => Ok(render_monthly(state)),
    }
}

/// Renders the per-user totals as pretty JSON.
pub fn render_json(state: &TallyState) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&state.totals)
}

/// Renders each user's total followed by their monthly subtotals.
#[must_use]
pub fn render_monthly(state: &TallyState) -> String {
    if state.totals.is_empty() {
        return "No push-ups recorded yet.\n".to_owned();
    }

    let width = state.totals.keys().map(|u| u.chars().count()).max().unwrap_or(0);
    let mut lines = Vec::new();

    for (user, total) in &state.totals {
        lines.push(format!("{user:<width$}  {total:>8}"));
        if let Some(months) = state.monthly.get(user) {
            lines.extend(months.iter().map(|(month, count)| format!("  {month}  {count:>8}")));
        }
    }

    lines.push(format!("{:<width$}  {:>8}", "TOTAL", state.grand_total()));
    lines.push(String::new());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TallyState {
        let mut state = TallyState::default();
        state.totals.insert("alice".to_owned(), 30);
        state.totals.insert("bob".to_owned(), 5);
        let alice = state.monthly.entry("alice".to_owned()).or_default();
        alice.insert("2024-02".to_owned(), 20);
        alice.insert("2024-01".to_owned(), 10);
        state
    }

    #[test]
    fn test_render_json() {
        let json = render_json(&sample()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["alice"], 30);
        assert_eq!(parsed["bob"], 5);
    }

    #[test]
    fn test_render_monthly_orders_months() {
        let text = render_monthly(&sample());
        let jan = text.find("2024-01").unwrap();
        let feb = text.find("2024-02").unwrap();
        assert!(jan < feb);
        assert!(text.lines().next().unwrap().starts_with("alice"));
        assert!(text.lines().last().unwrap().contains("35"));
    }

    #[test]
    fn test_render_monthly_layout() {
        let text = render_monthly(&sample());
        assert_eq!(
            text,
            concat!(
                "alice        30\n",
                "  2024-01        10\n",
                "  2024-02        20\n",
                "bob           5\n",
                "TOTAL        35\n",
            )
        );
    }

    #[test]
    fn test_render_monthly_empty() {
        assert_eq!(render_monthly(&TallyState::default()), "No push-ups recorded yet.\n");
    }
}
