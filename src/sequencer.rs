//! Ordered, timed, halt-on-first-failure execution of named steps.

use crate::{
    console,
    error::{Error, Result},
    metrics::{PLANS_TOTAL, STEP_DURATION},
};
use std::{
    io::Write,
    path::PathBuf,
    time::{Duration, Instant},
};

pub type StepAction<'a> = Box<dyn FnMut() -> Result<()> + 'a>;

/// A named unit of work.
pub struct Step<'a> {
    pub title: String,
    pub description: String,
    pub duration_hint: String,
    action: StepAction<'a>,
}

impl<'a> Step<'a> {
    pub fn new(title: impl Into<String>, action: impl FnMut() -> Result<()> + 'a) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            duration_hint: String::new(),
            action: Box::new(action),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn duration_hint(mut self, hint: impl Into<String>) -> Self {
        self.duration_hint = hint.into();
        self
    }
}

/// Steps plus the lines printed once all of them succeed.
pub struct Plan<'a> {
    pub title: String,
    pub steps: Vec<Step<'a>>,
    pub closing: Vec<String>,
}

impl<'a> Plan<'a> {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            steps: Vec::new(),
            closing: Vec::new(),
        }
    }

    #[must_use]
    pub fn step(mut self, step: Step<'a>) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn closing(mut self, lines: Vec<String>) -> Self {
        self.closing = lines;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Running,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStatus {
    InProgress,
    Succeeded,
    Failed,
    Cancelled,
}

impl PlanStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepRecord {
    pub index: usize,
    pub title: String,
    pub state: StepState,
    pub elapsed: Duration,
    pub error: Option<String>,
    pub log: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PlanReport {
    pub title: String,
    pub status: PlanStatus,
    pub records: Vec<StepRecord>,
    pub total: Duration,
}

impl PlanReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == PlanStatus::Succeeded
    }

    #[must_use]
    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.records.iter().find(|r| r.state == StepState::Failed)
    }

    /// Sum of the individually measured step times.
    #[must_use]
    pub fn steps_elapsed(&self) -> Duration {
        self.records.iter().map(|r| r.elapsed).sum()
    }

    /// Convert into a `Result` for callers that propagate with `?`.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` or `PlanFailed` unless every step completed
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            PlanStatus::Succeeded => Ok(self),
            PlanStatus::Cancelled => Err(Error::Cancelled),
            PlanStatus::InProgress | PlanStatus::Failed => Err(Error::PlanFailed {
                step: self
                    .failed_step()
                    .map_or_else(|| self.title.clone(), |r| r.title.clone()),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Cancel,
}

/// Asked once, after the plan is shown and before any step runs.
pub trait Confirm {
    fn confirm(&mut self, plan: &Plan<'_>) -> Decision;
}

/// Never asks.
pub struct AutoConfirm;

impl Confirm for AutoConfirm {
    fn confirm(&mut self, _plan: &Plan<'_>) -> Decision {
        Decision::Proceed
    }
}

/// Interactive yes/no prompt; an interrupt counts as no.
pub struct PromptConfirm;

impl Confirm for PromptConfirm {
    fn confirm(&mut self, plan: &Plan<'_>) -> Decision {
        let answer = dialoguer::Confirm::new()
            .with_prompt(format!("Proceed with {}?", plan.title.to_lowercase()))
            .default(true)
            .interact();

        match answer {
            Ok(true) => Decision::Proceed,
            Ok(false) | Err(_) => Decision::Cancel,
        }
    }
}

fn write_plan_table(plan: &Plan<'_>, out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "{}", console::info(&format!("{} Plan", plan.title)))?;
    for (i, step) in plan.steps.iter().enumerate() {
        write!(out, "  {}. {:<24}", i + 1, step.title)?;
        if !step.description.is_empty() {
            write!(out, " {}", step.description)?;
        }
        if !step.duration_hint.is_empty() {
            write!(out, " ({})", step.duration_hint)?;
        }
        writeln!(out)?;
    }
    writeln!(out)
}

/// Show, confirm and run `plan`, halting at the first failing step.
///
/// Banners written to `out` use fixed prefixes (`Step i/n`, `✓ Step i
/// complete`, `✗ Step i FAILED`) that the job monitor parses.
///
/// # Errors
///
/// Only write failures on `out` are errors; step failures and cancellation
/// are reported through [`PlanReport::status`].
pub fn execute_plan(
    mut plan: Plan<'_>,
    confirm: &mut dyn Confirm,
    out: &mut dyn Write,
) -> Result<PlanReport> {
    let total_steps = plan.steps.len();
    let mut report = PlanReport {
        title: plan.title.clone(),
        status: PlanStatus::InProgress,
        records: plan
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| StepRecord {
                index: i + 1,
                title: step.title.clone(),
                state: StepState::Pending,
                elapsed: Duration::ZERO,
                error: None,
                log: None,
            })
            .collect(),
        total: Duration::ZERO,
    };

    write_plan_table(&plan, out)?;

    if confirm.confirm(&plan) == Decision::Cancel {
        writeln!(
            out,
            "{}",
            console::warning(&format!("{} cancelled by user", plan.title))
        )?;
        report.status = PlanStatus::Cancelled;
        PLANS_TOTAL.with_label_values(&[report.status.as_str()]).inc();
        return Ok(report);
    }

    let started = Instant::now();

    for (step, record) in plan.steps.iter_mut().zip(report.records.iter_mut()) {
        let index = record.index;
        record.state = StepState::Running;
        writeln!(out)?;
        writeln!(
            out,
            "{}",
            console::header(&format!("Step {index}/{total_steps}: {}", step.title))
        )?;
        out.flush()?;

        let step_started = Instant::now();
        let result = (step.action)();
        record.elapsed = step_started.elapsed();

        STEP_DURATION
            .with_label_values(&[step.title.as_str()])
            .observe(record.elapsed.as_secs_f64());

        match result {
            Ok(()) => {
                record.state = StepState::Complete;
                writeln!(
                    out,
                    "{}",
                    console::success(&format!(
                        "Step {index} complete: {} ({})",
                        step.title,
                        console::elapsed(record.elapsed)
                    ))
                )?;
            }
            Err(err) => {
                tracing::error!(step = %step.title, error = %err, "step failed");
                record.state = StepState::Failed;
                record.error = Some(err.to_string());
                record.log = err.log_path().cloned();
                writeln!(
                    out,
                    "{}",
                    console::failure(&format!(
                        "Step {index} FAILED: {} ({})",
                        step.title,
                        console::elapsed(record.elapsed)
                    ))
                )?;
                writeln!(out, "{}", console::error_report(&err))?;
                writeln!(
                    out,
                    "{} stopped at step {index}; remaining steps were not run.",
                    plan.title
                )?;
                report.status = PlanStatus::Failed;
                break;
            }
        }
    }

    report.total = started.elapsed();

    if report.status == PlanStatus::InProgress {
        report.status = PlanStatus::Succeeded;
        writeln!(out)?;
        writeln!(
            out,
            "{}",
            console::success(&format!("{} Complete", plan.title))
        )?;
        writeln!(out, "Total time: {}", console::elapsed(report.total))?;
        for line in &plan.closing {
            writeln!(out, "{line}")?;
        }
    }

    PLANS_TOTAL.with_label_values(&[report.status.as_str()]).inc();
    out.flush()?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use std::cell::Cell;

    struct Decline;

    impl Confirm for Decline {
        fn confirm(&mut self, _plan: &Plan<'_>) -> Decision {
            Decision::Cancel
        }
    }

    #[test]
    fn test_cancel_runs_nothing() {
        let ran = Cell::new(false);
        let plan = Plan::new("Installation").step(Step::new("System Readiness", || {
            ran.set(true);
            Ok(())
        }));
        let mut out = Vec::new();
        let report = execute_plan(plan, &mut Decline, &mut out).unwrap();

        assert_eq!(report.status, PlanStatus::Cancelled);
        assert!(!ran.get());
        assert_eq!(report.records.first().unwrap().state, StepState::Pending);
        assert!(String::from_utf8(out).unwrap().contains("Installation cancelled by user"));
        assert!(matches!(report.into_result(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_all_steps_succeed() {
        let count = Cell::new(0);
        let plan = Plan::new("Installation")
            .step(Step::new("one", || {
                count.set(count.get() + 1);
                Ok(())
            }))
            .step(Step::new("two", || {
                count.set(count.get() + 1);
                std::thread::sleep(Duration::from_millis(20));
                Ok(())
            }))
            .closing(vec!["sqlplus / as sysdba".to_string()]);
        let mut out = Vec::new();
        let report = execute_plan(plan, &mut AutoConfirm, &mut out).unwrap();

        assert!(report.succeeded());
        assert_eq!(count.get(), 2);
        assert!(report.total >= report.steps_elapsed());
        assert!(report.records.iter().all(|r| r.state == StepState::Complete));

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Step 1/2: one"));
        assert!(text.contains("Step 2 complete: two"));
        assert!(text.contains("Installation Complete"));
        assert!(text.contains("sqlplus / as sysdba"));
    }

    #[test]
    fn test_failure_records_log_and_stops() {
        let plan = Plan::new("Installation")
            .step(Step::new("Database Creation", || {
                Err(Error::ToolFailed {
                    tool: "dbca".to_string(),
                    exit_code: 1,
                    excerpt: vec!["[FATAL] [DBT-06103] The port (1521) is already in use.".to_string()],
                    log: Some(PathBuf::from("/var/log/oracledba/dbca.log")),
                })
            }))
            .step(Step::new("never", || panic!("must not run")));
        let mut out = Vec::new();
        let report = execute_plan(plan, &mut AutoConfirm, &mut out).unwrap();

        assert_eq!(report.status, PlanStatus::Failed);
        let failed = report.failed_step().unwrap();
        assert_eq!(failed.index, 1);
        assert_eq!(failed.log, Some(PathBuf::from("/var/log/oracledba/dbca.log")));
        assert_eq!(report.records.get(1).unwrap().state, StepState::Pending);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Step 1 FAILED: Database Creation"));
        assert!(text.contains("DBT-06103"));
        assert!(!text.contains("Installation Complete"));
    }
}
