use crate::audit::{ReconciliationOutcome, RunReport, StepOutcome, StepState};
use crate::runner::RunObserver;
use crate::ui::icons::{CHECK, CLOCK, CROSS, LEDGER, RETRY, ROCKET, SKIP, SPARKLE, WARN};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;
use waypoint_common::{DeployError, Identity, MigrationStep};

/// Terminal UI for a migration run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Steps bar: how many pending steps have been recorded
/// - Step spinner: the step currently compiling or deploying
pub struct RunUI {
    multi: MultiProgress,
    steps_bar: ProgressBar,
    step_spinner: ProgressBar,
    verbose: bool,
}

impl RunUI {
    pub fn new(verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let steps_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let steps_bar = multi.add(ProgressBar::new(0));
        steps_bar.set_style(steps_style);
        steps_bar.set_prefix("Steps");

        let spinner_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let step_spinner = multi.add(ProgressBar::new_spinner());
        step_spinner.set_style(spinner_style);
        step_spinner.set_prefix(" Step");

        Self {
            multi,
            steps_bar,
            step_spinner,
            verbose,
        }
    }

    /// Print a line above the bars, falling back to stderr.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Stop all bars and print the run summary.
    pub fn finish(&self, report: &RunReport) {
        self.step_spinner.finish_and_clear();
        match &report.error {
            None => {
                self.steps_bar.finish_with_message(format!(
                    "{} {} step(s) applied to {}",
                    SPARKLE,
                    style(report.applied_count()).green().bold(),
                    style(&report.environment).cyan()
                ));
            }
            Some(error) => {
                self.steps_bar.abandon_with_message(format!(
                    "{} {}",
                    CROSS,
                    style(&error.kind).red().bold()
                ));
            }
        }
    }
}

impl RunObserver for RunUI {
    fn run_planned(&self, environment: &str, steps: &[&MigrationStep]) {
        self.steps_bar.set_length(steps.len() as u64);
        if steps.is_empty() {
            self.steps_bar
                .set_message(format!("{} is up to date", style(environment).cyan()));
        } else {
            self.steps_bar.set_message(format!(
                "applying to {}",
                style(environment).cyan()
            ));
        }
    }

    fn step_started(&self, step: &MigrationStep, identity: &Identity) {
        self.step_spinner.set_message(format!(
            "{} {} {} {}",
            ROCKET,
            style(step.sequence).yellow(),
            step.name,
            style(format!("({} as {})", step.artifact_ref, identity)).dim()
        ));
        self.step_spinner
            .enable_steady_tick(Duration::from_millis(100));
        if self.verbose {
            self.print_line(format!(
                "    {} {} {}",
                style("→").dim(),
                style(format!("step {}", step.sequence)).dim(),
                style(&step.artifact_ref).dim()
            ));
        }
    }

    fn step_retrying(&self, step: &MigrationStep, attempt: u32, error: &DeployError, delay: Duration) {
        self.print_line(format!(
            "    {} step {} attempt {} failed: {} {}",
            RETRY,
            step.sequence,
            attempt,
            style(error).yellow(),
            style(format!("(retrying in {:.1}s)", delay.as_secs_f64())).dim()
        ));
    }

    fn step_finished(&self, outcome: &StepOutcome) {
        let elapsed = outcome
            .duration_secs()
            .map(|s| format!(" {}{:.1}s", CLOCK, s))
            .unwrap_or_default();
        match outcome.state {
            StepState::Recorded => {
                self.steps_bar.inc(1);
                self.print_line(format!(
                    "{} {} {} {}{}",
                    CHECK,
                    style(outcome.sequence).yellow(),
                    outcome.name,
                    style(outcome.result_ref.as_deref().unwrap_or_default()).green(),
                    style(elapsed).dim()
                ));
            }
            StepState::Deployed => {
                self.print_line(format!(
                    "{} {} {} deployed at {} but not recorded: {}",
                    WARN,
                    style(outcome.sequence).yellow(),
                    outcome.name,
                    style(outcome.result_ref.as_deref().unwrap_or_default()).bold(),
                    style(outcome.error.as_deref().unwrap_or_default()).red()
                ));
            }
            _ => {
                self.print_line(format!(
                    "{} {} {}: {}",
                    CROSS,
                    style(outcome.sequence).yellow(),
                    outcome.name,
                    style(outcome.error.as_deref().unwrap_or("failed")).red()
                ));
            }
        }
    }

    fn reconciled(&self, outcome: &ReconciliationOutcome) {
        let line = match outcome {
            ReconciliationOutcome::Adopted {
                sequence,
                name,
                result_ref,
            } => format!(
                "{} adopted earlier deployment of {} {} at {}",
                LEDGER,
                style(sequence).yellow(),
                name,
                style(result_ref).green()
            ),
            ReconciliationOutcome::Discarded { sequence, name } => format!(
                "{} earlier deployment of {} {} not found; deploying again",
                RETRY,
                style(sequence).yellow(),
                name
            ),
            ReconciliationOutcome::Stale { sequence, name } => format!(
                "{} cleared stale journal for {} {}",
                SKIP,
                style(sequence).yellow(),
                name
            ),
        };
        self.print_line(line);
    }
}
