//! Per-case recorder
//!
//! A recorder collects the log of one case (or subcase) and tracks the worst
//! severity seen so far. Stack locations are kept only for the highest
//! severity, and at most `MAX_LOG_STACKS` of them.

use super::result::{LiveTestCaseResult, LogMessage, Status};
use serde::{Deserialize, Serialize};
use std::panic::Location;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

const MAX_LOG_STACKS: usize = 2;
const MIN_SEVERITY_FOR_STACK: LogSeverity = LogSeverity::Warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum LogSeverity {
    Pass,
    Skip,
    Warn,
    ExpectFailed,
    ValidationFailed,
    ThrewException,
}

impl LogSeverity {
    fn status(self) -> Status {
        match self {
            Self::Pass => Status::Pass,
            Self::Skip => Status::Skip,
            Self::Warn => Status::Warn,
            _ => Status::Fail,
        }
    }
}

/// Expected outcome of a case, from an expectations file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expectation {
    Pass,
    Fail,
    Skip,
}

/// Flags for [`TestCaseRecorder::log`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    pub is_error: bool,
    pub important: bool,
}

/// Shared handle to a result owned by the `Logger`
#[derive(Debug, Clone, Default)]
pub struct ResultHandle(Arc<Mutex<LiveTestCaseResult>>);

impl ResultHandle {
    fn lock(&self) -> MutexGuard<'_, LiveTestCaseResult> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> LiveTestCaseResult {
        self.lock().clone()
    }

    pub fn status(&self) -> Status {
        self.lock().status
    }

    pub(crate) fn reset(&self) {
        *self.lock() = LiveTestCaseResult::default();
    }
}

#[derive(Debug)]
struct RecorderState {
    final_status: LogSeverity,
    hide_stacks_below: LogSeverity,
    lines_at_current_severity: usize,
    logs: Vec<LogMessage>,
    finished: bool,
}

#[derive(Debug)]
struct RecorderInner {
    result: ResultHandle,
    debugging: bool,
    start: Instant,
    state: Mutex<RecorderState>,
}

/// Writes one case's outcome into its live result.
///
/// Cloning yields another handle to the same recorder.
#[derive(Debug, Clone)]
pub struct TestCaseRecorder {
    inner: Arc<RecorderInner>,
}

impl TestCaseRecorder {
    pub(crate) fn new(result: ResultHandle, debugging: bool) -> Self {
        Self {
            inner: Arc::new(RecorderInner {
                result,
                debugging,
                start: Instant::now(),
                state: Mutex::new(RecorderState {
                    final_status: LogSeverity::Pass,
                    hide_stacks_below: MIN_SEVERITY_FOR_STACK,
                    lines_at_current_severity: 0,
                    logs: Vec::new(),
                    finished: false,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, RecorderState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn debugging(&self) -> bool {
        self.inner.debugging
    }

    /// Kept only in debug mode
    #[track_caller]
    pub fn debug(&self, message: impl Into<String>) {
        if !self.inner.debugging {
            return;
        }
        self.log_impl(LogSeverity::Pass, "DEBUG", message.into(), Some(caller()), false);
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>) {
        self.log_impl(LogSeverity::Pass, "INFO", message.into(), Some(caller()), false);
    }

    /// Generic entry point: an error counts as a failed expectation
    #[track_caller]
    pub fn log(&self, message: impl Into<String>, options: LogOptions) {
        let (level, name) = if options.is_error {
            (LogSeverity::ExpectFailed, "EXPECTATION FAILED")
        } else {
            (LogSeverity::Pass, "INFO")
        };
        self.log_impl(level, name, message.into(), Some(caller()), options.important);
    }

    pub fn skipped(&self, reason: impl Into<String>) {
        self.log_impl(LogSeverity::Skip, "SKIP", reason.into(), None, false);
    }

    #[track_caller]
    pub fn warn(&self, message: impl Into<String>) {
        self.log_impl(LogSeverity::Warn, "WARN", message.into(), Some(caller()), false);
    }

    #[track_caller]
    pub fn expectation_failed(&self, message: impl Into<String>) {
        self.log_impl(
            LogSeverity::ExpectFailed,
            "EXPECTATION FAILED",
            message.into(),
            Some(caller()),
            false,
        );
    }

    /// A test body gave up with an explicit failure
    pub fn failed(&self, message: impl Into<String>) {
        self.log_impl(LogSeverity::ExpectFailed, "FAIL", message.into(), None, true);
    }

    #[track_caller]
    pub fn validation_failed(&self, message: impl Into<String>) {
        self.log_impl(
            LogSeverity::ValidationFailed,
            "VALIDATION FAILED",
            message.into(),
            Some(caller()),
            false,
        );
    }

    /// An unexpected error or panic escaped the test body
    pub fn threw(&self, message: impl Into<String>) {
        self.log_impl(LogSeverity::ThrewException, "EXCEPTION", message.into(), None, true);
    }

    /// Status the case would finish with right now
    pub fn current_status(&self) -> Status {
        self.state().final_status.status()
    }

    /// Fold in the outcome of a subcase recorded elsewhere
    pub fn absorb(&self, status: Status) {
        let level = match status {
            Status::Running | Status::Pass => LogSeverity::Pass,
            Status::Skip => LogSeverity::Skip,
            Status::Warn => LogSeverity::Warn,
            Status::Fail => LogSeverity::ExpectFailed,
        };
        let mut state = self.state();
        if level > state.final_status {
            state.final_status = level;
        }
    }

    /// Reinterpret the outcome against an expectation: an expected failure
    /// passes, and a pass (or warn) becomes an unexpected pass.
    pub fn apply_expectation(&self, expectation: Expectation) {
        if expectation != Expectation::Fail {
            return;
        }
        let status = self.current_status();
        if matches!(status, Status::Pass | Status::Warn) {
            self.log_impl(
                LogSeverity::ExpectFailed,
                "EXPECTATION FAILED",
                "unexpected pass".to_string(),
                None,
                true,
            );
        } else if status == Status::Fail {
            let mut state = self.state();
            state.final_status = LogSeverity::Pass;
            state.logs.push(LogMessage::new("INFO", "failed as expected"));
        }
    }

    /// Write status, timing and logs into the live result. Returns the final
    /// status. Only the first call has any effect.
    pub fn finish(&self) -> Status {
        let mut state = self.state();
        let status = state.final_status.status();
        if state.finished {
            return status;
        }
        state.finished = true;

        let elapsed_ms = self.inner.start.elapsed().as_secs_f64() * 1000.0;
        let mut result = self.inner.result.lock();
        result.status = status;
        result.timems = (elapsed_ms * 1000.0).ceil() / 1000.0;
        result.logs = std::mem::take(&mut state.logs);
        status
    }

    fn log_impl(
        &self,
        level: LogSeverity,
        name: &str,
        message: String,
        stack: Option<String>,
        important: bool,
    ) {
        let mut message = LogMessage::new(name, message).with_important(important);
        if let Some(stack) = stack {
            message = message.with_stack(stack);
        }

        let mut state = self.state();
        if state.finished {
            log::warn!("log after finish() dropped: {}", message);
            return;
        }
        if level > state.final_status {
            state.final_status = level;
        }

        if level > state.hide_stacks_below {
            state.lines_at_current_severity = 0;
            state.hide_stacks_below = level;
            for earlier in state.logs.iter_mut() {
                earlier.set_stack_hidden("below max severity");
            }
        }
        if level == state.hide_stacks_below {
            state.lines_at_current_severity += 1;
        } else if level < MIN_SEVERITY_FOR_STACK {
            message.set_stack_hidden("");
        } else if level < state.hide_stacks_below {
            message.set_stack_hidden("below max severity");
        }
        if state.lines_at_current_severity > MAX_LOG_STACKS {
            message.set_stack_hidden(format!("only {} shown", MAX_LOG_STACKS));
        }

        state.logs.push(message);
    }
}

#[track_caller]
fn caller() -> String {
    Location::caller().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(debugging: bool) -> (TestCaseRecorder, ResultHandle) {
        let handle = ResultHandle::default();
        (TestCaseRecorder::new(handle.clone(), debugging), handle)
    }

    #[test]
    fn test_worst_severity_wins() {
        let (rec, handle) = recorder(false);
        rec.info("hello");
        assert_eq!(rec.current_status(), Status::Pass);
        rec.warn("w1");
        rec.warn("w2");
        assert_eq!(rec.current_status(), Status::Warn);
        rec.expectation_failed("boom");
        rec.warn("w3");
        assert_eq!(rec.finish(), Status::Fail);

        let result = handle.snapshot();
        assert_eq!(result.status, Status::Fail);
        assert_eq!(result.logs.len(), 5);
        assert!(result.timems >= 0.0);
    }

    #[test]
    fn test_skip_is_below_warn() {
        let (rec, _) = recorder(false);
        rec.skipped("no adapter");
        assert_eq!(rec.current_status(), Status::Skip);
        rec.warn("w");
        assert_eq!(rec.current_status(), Status::Warn);
    }

    #[test]
    fn test_debug_only_when_debugging() {
        let (rec, handle) = recorder(false);
        rec.debug("hidden");
        rec.finish();
        assert!(handle.snapshot().logs.is_empty());

        let (rec, handle) = recorder(true);
        rec.debug("shown");
        rec.finish();
        assert_eq!(handle.snapshot().logs.len(), 1);
    }

    #[test]
    fn test_stacks_only_at_max_severity() {
        let (rec, handle) = recorder(false);
        rec.warn("w");
        rec.expectation_failed("f1");
        rec.expectation_failed("f2");
        rec.expectation_failed("f3");
        rec.finish();
        let logs = handle.snapshot().logs;
        assert_eq!(logs[0].stack_hidden.as_deref(), Some("below max severity"));
        assert_eq!(logs[1].stack_hidden, None);
        assert_eq!(logs[2].stack_hidden, None);
        assert_eq!(logs[3].stack_hidden.as_deref(), Some("only 2 shown"));
        assert!(logs[1].stack.as_deref().is_some_and(|s| s.contains("recorder.rs")));
    }

    #[test]
    fn test_expected_failure() {
        let (rec, _) = recorder(false);
        rec.expectation_failed("known bug");
        rec.apply_expectation(Expectation::Fail);
        assert_eq!(rec.finish(), Status::Pass);

        let (rec, handle) = recorder(false);
        rec.apply_expectation(Expectation::Fail);
        assert_eq!(rec.finish(), Status::Fail);
        assert!(handle.snapshot().logs[0].message.contains("unexpected pass"));
    }

    #[test]
    fn test_absorb_and_finish_once() {
        let (rec, handle) = recorder(false);
        rec.absorb(Status::Warn);
        rec.absorb(Status::Pass);
        assert_eq!(rec.finish(), Status::Warn);
        rec.expectation_failed("late");
        assert_eq!(rec.finish(), Status::Warn);
        assert_eq!(handle.status(), Status::Warn);
    }

    #[test]
    fn test_log_options() {
        let (rec, handle) = recorder(false);
        rec.log("note", LogOptions { is_error: false, important: true });
        assert_eq!(rec.current_status(), Status::Pass);
        rec.log("bad", LogOptions { is_error: true, important: false });
        rec.finish();
        let logs = handle.snapshot().logs;
        assert!(logs[0].important);
        assert_eq!(handle.status(), Status::Fail);
    }
}
