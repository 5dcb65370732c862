//! Test groups and runnable cases
//!
//! A spec file builds one `TestGroup`. Each `Test` in it declares a
//! parameter space, an optional shared setup for its subcases, and a test
//! function:
//!
//! ```
//! use cts_harness::framework::TestGroup;
//!
//! let mut g = TestGroup::new();
//! g.test("map,size")
//!     .desc("mapping buffers of various sizes")
//!     .params(|u| u.combine("size", [12, 524288]).combine("mappable", [false, true]))
//!     .test_fn(|t| async move {
//!         t.expect(t.param("size").is_some(), "size is set");
//!         Ok(())
//!     });
//! assert_eq!(g.len(), 1);
//! ```

use super::expectations::{CaseExpectation, expectation_for, subcase_expectation_for};
use super::fixture::{CaseError, CaseResult, Fixture, SharedState};
use crate::logging::{Expectation, Logger, Status, TestCaseRecorder};
use crate::params::{CaseParams, ParamsBuilder};
use crate::query::{PATH_SEPARATOR, TestQuery, is_valid_query_part};
use crate::utils::{CaseExecutionError, QueryError};
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Default cap on subcases running at once
pub const DEFAULT_MAX_SUBCASES_IN_FLIGHT: usize = 100;

/// A test body
pub type TestFn = Arc<dyn Fn(Fixture) -> BoxFuture<'static, CaseResult> + Send + Sync>;
/// Setup run once per case before its subcases
pub type SetupFn =
    Arc<dyn Fn(CaseParams) -> BoxFuture<'static, Result<SharedState, CaseError>> + Send + Sync>;
/// Called periodically while cases run
pub type Heartbeat = Arc<dyn Fn() + Send + Sync>;

/// One declared test
pub struct Test {
    path: Vec<String>,
    description: String,
    params: ParamsBuilder,
    setup: Option<SetupFn>,
    func: Option<TestFn>,
}

impl Test {
    fn new(path: Vec<String>) -> Self {
        Self {
            path,
            description: String::new(),
            params: ParamsBuilder::new(),
            setup: None,
            func: None,
        }
    }

    pub fn desc(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = description.into();
        self
    }

    /// Define the parameter space, starting from an empty builder
    pub fn params(&mut self, f: impl FnOnce(ParamsBuilder) -> ParamsBuilder) -> &mut Self {
        let builder = std::mem::take(&mut self.params);
        self.params = f(builder);
        self
    }

    /// Shared setup, run once per case. Its value is available to every
    /// subcase through [`Fixture::shared`].
    pub fn before_all_subcases<F, Fut, T>(&mut self, f: F) -> &mut Self
    where
        F: Fn(CaseParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, CaseError>> + Send + 'static,
        T: Any + Send + Sync,
    {
        self.setup = Some(Arc::new(move |params| {
            let fut = f(params);
            async move { fut.await.map(|value| Arc::new(value) as SharedState) }.boxed()
        }));
        self
    }

    pub fn test_fn<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Fixture) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CaseResult> + Send + 'static,
    {
        self.func = Some(Arc::new(move |t| f(t).boxed()));
        self
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn params_builder(&self) -> &ParamsBuilder {
        &self.params
    }

    pub fn has_test_fn(&self) -> bool {
        self.func.is_some()
    }

    pub fn has_subcases(&self) -> bool {
        self.params.has_subcases()
    }

    /// Case params in declaration order
    pub fn iterate_cases(&self) -> impl Iterator<Item = CaseParams> + '_ {
        self.params.iterate_cases()
    }

    /// Subcase-local params of one case, if the test has subcases
    pub fn iterate_subcases<'a>(
        &'a self,
        case: &CaseParams,
    ) -> Option<Box<dyn Iterator<Item = CaseParams> + 'a>> {
        self.params.iterate_subcases(case)
    }
}

/// The tests of one spec file, in declaration order
#[derive(Default)]
pub struct TestGroup {
    tests: Vec<Test>,
    seen: HashSet<String>,
    errors: Vec<String>,
}

impl TestGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a test. `name` is a test path with `,`-separated segments.
    pub fn test(&mut self, name: &str) -> &mut Test {
        let path: Vec<String> = name.split(PATH_SEPARATOR).map(str::to_string).collect();
        if let Some(bad) = path.iter().find(|p| !is_valid_query_part(p)) {
            self.errors.push(format!(
                "invalid test name part `{}` in `{}`; must match [a-zA-Z0-9_]+",
                bad, name
            ));
        }
        if !self.seen.insert(name.to_string()) {
            self.errors.push(format!("duplicate test name: {}", name));
        }
        self.tests.push(Test::new(path));
        let last = self.tests.len() - 1;
        &mut self.tests[last]
    }

    pub fn tests(&self) -> &[Test] {
        &self.tests
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Everything wrong with how the group was declared
    pub fn definition_errors(&self) -> Vec<String> {
        let mut errors = self.errors.clone();
        for test in &self.tests {
            for e in test.params.definition_errors() {
                errors.push(format!("{}: {}", test.path.join(","), e));
            }
        }
        errors
    }
}

/// Everything a case needs from the surrounding run
#[derive(Clone)]
pub struct RunContext {
    pub logger: Logger,
    pub expectations: Arc<[CaseExpectation]>,
    /// Global cap on subcases in flight
    pub subcase_limiter: Arc<Semaphore>,
    /// Watchdog for each body (and setup) invocation
    pub body_timeout: Option<Duration>,
    pub heartbeat: Option<Heartbeat>,
}

impl RunContext {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            expectations: Arc::from(Vec::new()),
            subcase_limiter: Arc::new(Semaphore::new(DEFAULT_MAX_SUBCASES_IN_FLIGHT)),
            body_timeout: None,
            heartbeat: None,
        }
    }

    pub fn with_expectations(mut self, expectations: Vec<CaseExpectation>) -> Self {
        self.expectations = Arc::from(expectations);
        self
    }

    pub fn with_max_subcases_in_flight(mut self, max: usize) -> Self {
        self.subcase_limiter = Arc::new(Semaphore::new(max.max(1)));
        self
    }

    pub fn with_body_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.body_timeout = timeout;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    pub fn beat(&self) {
        if let Some(heartbeat) = &self.heartbeat {
            (heartbeat.as_ref())();
        }
    }
}

/// Why a body (or setup) did not complete normally
#[derive(Debug)]
enum Abort {
    Skip(String),
    Fail(String),
    Panic(String),
    Timeout(Duration),
}

impl Abort {
    fn record(&self, rec: &TestCaseRecorder) {
        match self {
            Self::Skip(reason) => rec.skipped(reason.clone()),
            Self::Fail(message) => rec.failed(message.clone()),
            Self::Panic(message) => rec.threw(format!("panicked: {}", message)),
            Self::Timeout(d) => rec.threw(format!("timed out after {} ms", d.as_millis())),
        }
    }
}

async fn guarded<T>(
    fut: BoxFuture<'static, Result<T, CaseError>>,
    timeout: Option<Duration>,
) -> Result<T, Abort> {
    let caught = AssertUnwindSafe(fut).catch_unwind();
    let outcome = match timeout {
        Some(d) => match tokio::time::timeout(d, caught).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(Abort::Timeout(d)),
        },
        None => caught.await,
    };
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(CaseError::Skip(reason))) => Err(Abort::Skip(reason)),
        Ok(Err(CaseError::Fail(message))) => Err(Abort::Fail(message)),
        Err(payload) => Err(Abort::Panic(CaseExecutionError::from_panic(payload).message)),
    }
}

async fn run_body(
    func: TestFn,
    params: CaseParams,
    rec: TestCaseRecorder,
    shared: Option<SharedState>,
    expectation: Option<Expectation>,
    timeout: Option<Duration>,
) -> Status {
    if expectation == Some(Expectation::Skip) {
        rec.skipped("skipped by expectations");
        return rec.finish();
    }
    let t = Fixture::new(params, rec.clone(), shared);
    if let Err(abort) = guarded((func.as_ref())(t), timeout).await {
        abort.record(&rec);
    }
    if let Some(expectation) = expectation {
        rec.apply_expectation(expectation);
    }
    rec.finish()
}

/// One runnable case: a test plus one case-level param assignment
#[derive(Clone)]
pub struct RunCase {
    group: Arc<TestGroup>,
    test: usize,
    params: CaseParams,
    query: TestQuery,
    /// Subcases to run; empty means all of them
    subcase_filters: Vec<CaseParams>,
}

impl std::fmt::Debug for RunCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCase")
            .field("query", &self.query)
            .field("subcase_filters", &self.subcase_filters)
            .finish_non_exhaustive()
    }
}

impl RunCase {
    pub(crate) fn new(
        group: Arc<TestGroup>,
        test: usize,
        suite: &str,
        file: &[String],
        params: CaseParams,
    ) -> Result<Self, QueryError> {
        let path = group.tests[test].path.clone();
        let query = TestQuery::single_case(suite, file.iter().cloned(), path, params.clone())?;
        Ok(Self {
            group,
            test,
            params,
            query,
            subcase_filters: Vec::new(),
        })
    }

    /// Only run subcases matching `filter`
    pub(crate) fn with_subcase_filter(mut self, filter: CaseParams) -> Self {
        self.subcase_filters.push(filter);
        self
    }

    /// Also run the subcases `other` selects. Both must be the same case.
    pub(crate) fn widen_selection(&mut self, other: &RunCase) {
        if self.subcase_filters.is_empty() || other.subcase_filters.is_empty() {
            self.subcase_filters.clear();
            return;
        }
        for f in &other.subcase_filters {
            if !self.subcase_filters.contains(f) {
                self.subcase_filters.push(f.clone());
            }
        }
    }

    pub fn query(&self) -> &TestQuery {
        &self.query
    }

    /// Case params, private ones included
    pub fn params(&self) -> &CaseParams {
        &self.params
    }

    pub fn test(&self) -> &Test {
        &self.group.tests[self.test]
    }

    /// Partial subcase params selecting which subcases run. Empty when
    /// every subcase runs.
    pub fn subcase_filters(&self) -> &[CaseParams] {
        &self.subcase_filters
    }

    fn selects_subcase(&self, sub: &CaseParams) -> bool {
        self.subcase_filters.is_empty() || self.subcase_filters.iter().any(|f| sub.matches_partial(f))
    }

    fn subcase_query(&self, params: &CaseParams) -> Result<TestQuery, QueryError> {
        TestQuery::single_case(
            self.query.suite(),
            self.query.group().iter().cloned(),
            self.query.test().iter().cloned(),
            params.clone(),
        )
    }

    /// Run the case, recording it (and each of its subcases) in the logger.
    /// Returns the case's final status.
    ///
    /// An expectation covering the whole case is applied to the case record
    /// after its subcases are folded in; subcases only see expectations that
    /// name them.
    pub async fn run(&self, ctx: &RunContext) -> Status {
        let test = self.test();
        let (rec, _) = ctx.logger.record(self.query.to_string());
        let expectation = expectation_for(&self.query, &ctx.expectations);
        if expectation == Some(Expectation::Skip) {
            rec.skipped("skipped by expectations");
            return rec.finish();
        }
        let Some(func) = test.func.clone() else {
            rec.threw("test has no test function");
            return rec.finish();
        };

        let subcases: Option<Vec<CaseParams>> = test
            .iterate_subcases(&self.params)
            .map(|it| it.filter(|sub| self.selects_subcase(sub)).collect());
        match subcases {
            None => {
                let _permit = ctx.subcase_limiter.clone().acquire_owned().await.ok();
                run_body(func, self.params.clone(), rec.clone(), None, expectation, ctx.body_timeout)
                    .await
            }
            Some(subcases) => {
                if subcases.is_empty() {
                    rec.warn("no subcases matched the query");
                }
                self.run_subcases(test, func, subcases, &rec, ctx).await;
                if let Some(expectation) = expectation {
                    rec.apply_expectation(expectation);
                }
                rec.finish()
            }
        }
    }

    async fn run_subcases(
        &self,
        test: &Test,
        func: TestFn,
        subcases: Vec<CaseParams>,
        case_rec: &TestCaseRecorder,
        ctx: &RunContext,
    ) {
        let shared = match &test.setup {
            None => None,
            Some(setup) => match guarded((setup.as_ref())(self.params.clone()), ctx.body_timeout).await {
                Ok(value) => Some(value),
                Err(abort) => {
                    log::debug!("shared setup of {} did not complete: {:?}", self.query, abort);
                    abort.record(case_rec);
                    for sub in &subcases {
                        let full = self.params.merged(sub);
                        match self.subcase_query(&full) {
                            Ok(query) => {
                                let (sub_rec, _) = ctx.logger.record(query.to_string());
                                abort.record(&sub_rec);
                                sub_rec.finish();
                            }
                            Err(e) => case_rec.threw(e.to_string()),
                        }
                    }
                    return;
                }
            },
        };

        let mut pending = FuturesUnordered::new();
        for sub in subcases {
            ctx.beat();
            // Admission in iteration order; finished subcases free their permits
            let permit = loop {
                tokio::select! {
                    biased;
                    permit = ctx.subcase_limiter.clone().acquire_owned() => break permit.ok(),
                    Some(status) = pending.next(), if !pending.is_empty() => case_rec.absorb(status),
                }
            };

            let full = self.params.merged(&sub);
            let query = match self.subcase_query(&full) {
                Ok(query) => query,
                Err(e) => {
                    case_rec.threw(e.to_string());
                    continue;
                }
            };
            let (sub_rec, _) = ctx.logger.record(query.to_string());
            let expectation = subcase_expectation_for(&self.query, &query, &ctx.expectations);
            let body = run_body(
                func.clone(),
                full,
                sub_rec,
                shared.clone(),
                expectation,
                ctx.body_timeout,
            );
            pending.push(async move {
                let status = body.await;
                drop(permit);
                status
            });
        }
        while let Some(status) = pending.next().await {
            case_rec.absorb(status);
        }
    }
}
