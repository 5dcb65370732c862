//! Result records and log messages

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a recorded case
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Recording started, not finished yet
    Running,
    Pass,
    Skip,
    Warn,
    Fail,
}

impl Status {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Pass => "pass",
            Self::Skip => "skip",
            Self::Warn => "warn",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged message
#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    /// Kind of entry, e.g. `WARN` or `EXPECTATION FAILED`
    pub name: String,
    pub message: String,
    /// Where the message was logged from, if known
    pub stack: Option<String>,
    /// Set when the stack is not shown; holds the reason (may be empty)
    pub stack_hidden: Option<String>,
    pub important: bool,
}

impl LogMessage {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
            stack_hidden: None,
            important: false,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_important(mut self, important: bool) -> Self {
        self.important = important;
        self
    }

    pub fn set_stack_hidden(&mut self, reason: impl Into<String>) {
        self.stack_hidden = Some(reason.into());
    }

    /// Text form, as written to the results JSON
    pub fn render(&self, include_stack: bool) -> String {
        let mut s = if self.message.is_empty() {
            self.name.clone()
        } else {
            format!("{}: {}", self.name, self.message)
        };
        if !include_stack {
            return s;
        }
        match (&self.stack, &self.stack_hidden) {
            (Some(_), Some(reason)) if !reason.is_empty() => {
                s.push_str(&format!("\n  at (elided: {})", reason));
            }
            (Some(_), Some(_)) => {}
            (Some(stack), None) => {
                s.push_str("\n  at ");
                s.push_str(stack);
            }
            (None, _) => {}
        }
        s
    }
}

impl fmt::Display for LogMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}

/// Mutable result of one case (or subcase), owned by the `Logger`
#[derive(Debug, Clone, PartialEq)]
pub struct LiveTestCaseResult {
    pub status: Status,
    /// Elapsed milliseconds, rounded up to the microsecond
    pub timems: f64,
    pub logs: Vec<LogMessage>,
}

impl Default for LiveTestCaseResult {
    fn default() -> Self {
        Self {
            status: Status::Running,
            timems: 0.0,
            logs: Vec::new(),
        }
    }
}

/// Serialized shape of a result inside the results JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResultJson {
    pub status: Status,
    pub timems: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
}

impl TestCaseResultJson {
    pub fn from_live(result: &LiveTestCaseResult, include_stacks: bool) -> Self {
        Self {
            status: result.status,
            timems: result.timems,
            logs: result.logs.iter().map(|l| l.render(include_stacks)).collect(),
        }
    }
}
