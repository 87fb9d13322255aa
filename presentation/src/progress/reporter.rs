//! Progress reporting for scenario execution

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use ward_application::{
    ActionOutcome, DispatchSummary, ScenarioOutcome, ScenarioProgress, StepCause,
};
use ward_domain::{AgentRole, Command, PatientId, StepCompletion};

/// Reports scenario progress with a live patients-discharged bar
pub struct ProgressReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:.bold.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }

    fn slot(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Print a line above the bar (or plainly when no bar is active).
    fn line(&self, text: String) {
        match self.slot().as_ref() {
            Some(bar) => bar.println(text),
            None => println!("{}", text),
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioProgress for ProgressReporter {
    fn on_status(&self, message: &str) {
        self.line(format!("{} {}", "!".yellow().bold(), message));
    }

    fn on_dispatch(&self, summary: &DispatchSummary) {
        let bar = ProgressBar::new(summary.patients as u64);
        bar.set_style(Self::bar_style());
        bar.set_prefix(format!("Scenario {}", summary.scenario));
        bar.set_message(format!(
            "nurse {} / doctor {} commands",
            summary.nurse_commands, summary.doctor_commands
        ));
        bar.enable_steady_tick(Duration::from_millis(120));

        if let Some(previous) = self.slot().replace(bar) {
            previous.finish_and_clear();
        }
    }

    fn on_action_complete(&self, role: AgentRole, command: &Command, outcome: ActionOutcome) {
        if outcome == ActionOutcome::Abandoned {
            self.line(format!(
                "  {} {} {} abandoned",
                "x".red(),
                role,
                ConsoleLabel(command)
            ));
        }
    }

    fn on_step_complete(&self, patient: PatientId, completion: &StepCompletion, cause: StepCause) {
        let mark = if cause.is_forced() {
            format!("{} ({})", "~".yellow(), cause.as_str())
        } else {
            "v".green().to_string()
        };
        self.line(format!(
            "  {} patient {} finished step {}",
            mark,
            patient,
            completion.completed_step + 1
        ));
    }

    fn on_patient_exit(&self, patient: PatientId, remaining: usize) {
        if let Some(bar) = self.slot().as_ref() {
            bar.inc(1);
            bar.set_message(format!("patient {} left, {} still in the ward", patient, remaining));
        }
    }

    fn on_finalized(&self, outcome: &ScenarioOutcome) {
        if let Some(bar) = self.slot().take() {
            bar.finish_with_message(format!(
                "{} in {:.1} units",
                "complete!".green(),
                outcome.elapsed_units
            ));
        }
    }
}

/// Simple text-based progress (no fancy UI)
pub struct SimpleProgress;

impl ScenarioProgress for SimpleProgress {
    fn on_status(&self, message: &str) {
        println!("{} {}", "!".yellow().bold(), message);
    }

    fn on_dispatch(&self, summary: &DispatchSummary) {
        println!(
            "{} {} ({} patients, {} nurse / {} doctor commands)",
            "->".cyan(),
            format!("Scenario {}", summary.scenario).bold(),
            summary.patients,
            summary.nurse_commands,
            summary.doctor_commands
        );
    }

    fn on_action_complete(&self, role: AgentRole, command: &Command, outcome: ActionOutcome) {
        let mark = match outcome {
            ActionOutcome::Completed | ActionOutcome::Assisted => "v".green(),
            ActionOutcome::Skipped => "-".dimmed(),
            ActionOutcome::Abandoned => "x".red(),
        };
        println!("  {} {:<6} {} {}", mark, role, ConsoleLabel(command), outcome.as_str());
    }

    fn on_patient_exit(&self, patient: PatientId, remaining: usize) {
        println!("  {} patient {} left ({} remaining)", "<-".cyan(), patient, remaining);
    }

    fn on_finalized(&self, _outcome: &ScenarioOutcome) {
        println!();
    }
}

/// `ESCORT 2 -> TRIAGE` style rendering of a command.
pub struct ConsoleLabel<'a>(pub &'a Command);

impl std::fmt::Display for ConsoleLabel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let command = self.0;
        write!(f, "{}", command.action)?;
        if let Some(patient) = command.patient_id {
            write!(f, " {}", patient)?;
        }
        if let Some(target) = &command.target {
            write!(f, " -> {}", target)?;
        }
        if let Some(duration) = command.duration {
            write!(f, " ({}u)", duration)?;
        }
        Ok(())
    }
}
