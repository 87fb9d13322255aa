//! Console output formatter for scenario results

use colored::Colorize;
use serde_json::json;
use ward_application::{AgentSnapshot, ScenarioOutcome, ScenarioSnapshot};
use ward_domain::AnalysisReport;

/// Formats scenario results for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    /// Format the end-of-scenario summary
    pub fn format(outcome: &ScenarioOutcome, analysis: Option<&AnalysisReport>) -> String {
        let mut output = String::new();

        output.push_str(&Self::header(&format!("Scenario {} complete", outcome.scenario)));
        output.push('\n');

        output.push_str(&format!(
            "{} {} admitted, {} discharged\n",
            "Patients:".cyan().bold(),
            outcome.patients_admitted,
            outcome.patients_exited
        ));
        output.push_str(&format!(
            "{} {} completed",
            "Steps:".cyan().bold(),
            outcome.steps_completed
        ));
        if outcome.forced_steps > 0 {
            output.push_str(&format!(
                " ({})",
                format!("{} forced", outcome.forced_steps).yellow()
            ));
        }
        output.push('\n');
        output.push_str(&format!(
            "{} {} run",
            "Commands:".cyan().bold(),
            outcome.actions
        ));
        if outcome.abandoned_actions > 0 {
            output.push_str(&format!(
                " ({})",
                format!("{} abandoned", outcome.abandoned_actions).red()
            ));
        }
        output.push('\n');
        output.push_str(&format!(
            "{} {:.1} time-units\n",
            "Duration:".cyan().bold(),
            outcome.elapsed_units
        ));

        if let Some(report) = analysis {
            output.push_str(&Self::section_header("Planner analysis"));
            if report.saved {
                for (label, path) in [("chart", &report.chart_path), ("data", &report.data_path)] {
                    if let Some(path) = path {
                        output.push_str(&format!("  {} {}\n", format!("{}:", label).dimmed(), path));
                    }
                }
            } else {
                output.push_str(&format!(
                    "  {} {}\n",
                    "not saved:".yellow(),
                    report.reason.as_deref().unwrap_or("unknown reason")
                ));
            }
        }

        output.push_str(&Self::footer());
        output
    }

    /// Format as JSON
    pub fn format_json(outcome: &ScenarioOutcome, analysis: Option<&AnalysisReport>) -> String {
        serde_json::to_string_pretty(&json!({
            "outcome": outcome,
            "analysis": analysis,
        }))
        .unwrap_or_else(|_| "{}".to_string())
    }

    /// Format a point-in-time view of the ward (agents, then patients)
    pub fn format_snapshot(snapshot: &ScenarioSnapshot) -> String {
        let mut output = Self::section_header(&format!(
            "Scenario {}{}",
            snapshot.scenario,
            if snapshot.finalized { " (finalized)" } else { "" }
        ));

        for agent in &snapshot.agents {
            output.push_str(&Self::agent_line(agent));
            output.push('\n');
        }

        if snapshot.patients.is_empty() {
            output.push_str(&format!("  {}\n", "no patients in the ward".dimmed()));
        }
        for view in &snapshot.patients {
            let patient = &view.patient;
            let holder = view
                .held_by
                .map(|role| format!(" with {}", role))
                .unwrap_or_default();
            output.push_str(&format!(
                "  patient {:<3} {:<10} step {}/{} at {}{}\n",
                patient.id,
                patient.state().as_str(),
                patient.current_step(),
                patient.pathway().len(),
                patient.location().unwrap_or("-"),
                holder
            ));
        }
        output
    }

    fn agent_line(agent: &AgentSnapshot) -> String {
        let mut line = format!(
            "  {:<6} {:<9} at {}",
            agent.role.as_str().bold(),
            agent.state.as_str(),
            agent.location.as_deref().unwrap_or("-")
        );
        if let Some(patient) = agent.holding {
            line.push_str(&format!(", holding patient {}", patient));
        }
        if agent.queued > 0 {
            line.push_str(&format!(", {} queued", agent.queued));
        }
        line
    }

    fn header(title: &str) -> String {
        let line = "=".repeat(60);
        format!("{}\n{:^60}\n{}", line.cyan(), title.bold(), line.cyan())
    }

    fn section_header(title: &str) -> String {
        format!("\n{}\n{}\n", title.cyan().bold(), "-".repeat(40))
    }

    fn footer() -> String {
        format!("\n{}\n", "=".repeat(60).cyan())
    }
}
