//! Per-case fixture handed to test bodies

use crate::logging::TestCaseRecorder;
use crate::params::{CaseParams, ParamValue};
use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

/// Early exit from a test body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaseError {
    /// The case can't run here; recorded as `skip`
    #[error("skipped: {0}")]
    Skip(String),
    /// The case failed; recorded as `fail`
    #[error("{0}")]
    Fail(String),
}

impl CaseError {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip(reason.into())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

/// Outcome of a test body
pub type CaseResult = Result<(), CaseError>;

/// Value produced by a test's shared per-case setup
pub type SharedState = Arc<dyn Any + Send + Sync>;

/// What a test body sees: its params, a recorder, and the shared setup
/// value when the test has one.
///
/// A fresh fixture is created for every case (or subcase) run.
pub struct Fixture {
    params: CaseParams,
    rec: TestCaseRecorder,
    shared: Option<SharedState>,
}

impl Fixture {
    pub(crate) fn new(params: CaseParams, rec: TestCaseRecorder, shared: Option<SharedState>) -> Self {
        Self { params, rec, shared }
    }

    /// All params of this run, private ones and subcase params included
    pub fn params(&self) -> &CaseParams {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    pub fn recorder(&self) -> &TestCaseRecorder {
        &self.rec
    }

    /// The shared setup value, if there is one of type `T`
    pub fn shared<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.shared.as_deref()?.downcast_ref::<T>()
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<String>) {
        self.rec.debug(message);
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>) {
        self.rec.info(message);
    }

    #[track_caller]
    pub fn warn(&self, message: impl Into<String>) {
        self.rec.warn(message);
    }

    /// Record a failure and keep going
    #[track_caller]
    pub fn fail(&self, message: impl Into<String>) {
        self.rec.expectation_failed(message);
    }

    /// Record a failure unless `cond` holds. Returns `cond`.
    #[track_caller]
    pub fn expect(&self, cond: bool, message: impl Into<String>) -> bool {
        if cond {
            if self.rec.debugging() {
                self.rec.debug(format!("expect OK: {}", message.into()));
            }
        } else {
            self.rec.expectation_failed(message);
        }
        cond
    }

    /// Convenience for `return t.skip("reason")` in a test body
    pub fn skip(&self, reason: impl Into<String>) -> CaseResult {
        Err(CaseError::skip(reason))
    }
}
