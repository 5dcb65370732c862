//! Run report: outcome counts and the command-line summary

use crate::logging::{LiveTestCaseResult, Status};
use std::time::Duration;

/// Outcome of one case in a run
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    pub query: String,
    pub status: Status,
    pub result: LiveTestCaseResult,
}

/// Counts per final status
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub passed: usize,
    pub warned: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }
}

/// Complete run report
#[derive(Debug)]
pub struct RunReport {
    outcomes: Vec<CaseOutcome>,
    duration: Duration,
    counts: StatusCounts,
}

impl RunReport {
    pub fn new(outcomes: Vec<CaseOutcome>, duration: Duration) -> Self {
        let mut counts = StatusCounts {
            total: outcomes.len(),
            ..Default::default()
        };
        for outcome in &outcomes {
            match outcome.status {
                Status::Pass => counts.passed += 1,
                Status::Warn => counts.warned += 1,
                Status::Skip => counts.skipped += 1,
                Status::Fail | Status::Running => counts.failed += 1,
            }
        }
        Self {
            outcomes,
            duration,
            counts,
        }
    }

    pub fn total(&self) -> usize {
        self.counts.total
    }

    pub fn passed(&self) -> usize {
        self.counts.passed
    }

    pub fn warned(&self) -> usize {
        self.counts.warned
    }

    pub fn skipped(&self) -> usize {
        self.counts.skipped
    }

    pub fn failed(&self) -> usize {
        self.counts.failed
    }

    pub fn counts(&self) -> StatusCounts {
        self.counts
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn outcomes(&self) -> &[CaseOutcome] {
        &self.outcomes
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseOutcome> {
        self.with_status(Status::Fail)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &CaseOutcome> {
        self.with_status(Status::Warn)
    }

    fn with_status(&self, status: Status) -> impl Iterator<Item = &CaseOutcome> {
        self.outcomes.iter().filter(move |o| o.status == status)
    }

    /// Process exit code for the run
    pub fn exit_code(&self) -> i32 {
        if self.counts.failed > 0 { 1 } else { 0 }
    }

    /// One count line: right-aligned count, total and percentage
    fn count_line(&self, x: usize) -> String {
        let total = self.counts.total;
        let width = total.to_string().len();
        let pct = if total == 0 {
            0.0
        } else {
            100.0 * x as f64 / total as f64
        };
        format!("{:>width$} / {} = {:>6.2}%", x, total, pct, width = width)
    }

    /// The summary block printed at the end of a run
    pub fn summary(&self) -> String {
        format!(
            "** Summary **\n\
             Passed  w/o warnings = {}\n\
             Passed with warnings = {}\n\
             Skipped              = {}\n\
             Failed               = {}\n\
             ({:.2?})",
            self.count_line(self.counts.passed),
            self.count_line(self.counts.warned),
            self.count_line(self.counts.skipped),
            self.count_line(self.counts.failed),
            self.duration
        )
    }
}
