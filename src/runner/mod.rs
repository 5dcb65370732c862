//! Runner: executes the leaves selected by a list of queries

mod report;
mod validate;

pub use report::{CaseOutcome, RunReport, StatusCounts};
pub use validate::{
    CaseCountReport, DEFAULT_MAX_QUERY_LENGTH, ValidateOptions, ValidationReport, validate_suite,
};

use crate::framework::{
    CaseExpectation, DEFAULT_MAX_SUBCASES_IN_FLIGHT, Heartbeat, RunCase, RunContext, TestFileLoader,
};
use crate::tree::TestTreeLeaf;
use crate::logging::{Logger, LoggerOptions};
use crate::query::TestQuery;
use crate::tree::load_tree;
use crate::utils::crc32::crc32;
use crate::utils::{QueryError, Result};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// One of `count` disjoint slices of a run, selected by spec file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    pub index: u32,
    pub count: u32,
}

impl Shard {
    /// Whether the spec file containing `query` belongs to this shard
    pub fn contains(&self, query: &TestQuery) -> bool {
        let file = format!("{}:{}:*", query.suite(), query.group().join(","));
        crc32(file.as_bytes()) % self.count == self.index
    }
}

impl FromStr for Shard {
    type Err = QueryError;

    /// `index/count`, e.g. `0/4`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bad = || QueryError::Invalid(format!("shard must be `index/count` with index < count: {}", s));
        let (index, count) = s.split_once('/').ok_or_else(bad)?;
        let index: u32 = index.trim().parse().map_err(|_| bad())?;
        let count: u32 = count.trim().parse().map_err(|_| bad())?;
        if count == 0 || index >= count {
            return Err(bad());
        }
        Ok(Self { index, count })
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.count)
    }
}

/// A case to run, or a leaf that only records its load error
enum Selected<'a> {
    Case(RunCase),
    Leaf(&'a TestTreeLeaf),
}

/// Configuration for the runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Global cap on subcases running at once
    pub max_subcases_in_flight: usize,
    /// Keep debug-level messages in case logs
    pub debug: bool,
    /// Print every case as it finishes
    pub verbose: bool,
    /// Watchdog per test body invocation
    pub case_timeout_ms: Option<u64>,
    pub shard: Option<Shard>,
    pub expectations: Vec<CaseExpectation>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_subcases_in_flight: DEFAULT_MAX_SUBCASES_IN_FLIGHT,
            debug: false,
            verbose: false,
            case_timeout_ms: None,
            shard: None,
            expectations: Vec::new(),
        }
    }
}

/// Runs the cases selected by queries and collects their results
pub struct CtsRunner {
    config: RunnerConfig,
    logger: Logger,
    heartbeat: Option<Heartbeat>,
}

impl CtsRunner {
    pub fn new(config: RunnerConfig) -> Self {
        let logger = Logger::new(LoggerOptions {
            debug: config.debug,
            ..Default::default()
        });
        Self {
            config,
            logger,
            heartbeat: None,
        }
    }

    /// Called after every case and subcase
    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Results of everything run so far
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    fn context(&self) -> RunContext {
        let mut ctx = RunContext::new(self.logger.clone())
            .with_expectations(self.config.expectations.clone())
            .with_max_subcases_in_flight(self.config.max_subcases_in_flight)
            .with_body_timeout(self.config.case_timeout_ms.map(Duration::from_millis));
        if let Some(heartbeat) = &self.heartbeat {
            ctx = ctx.with_heartbeat(heartbeat.clone());
        }
        ctx
    }

    /// Run every case selected by `queries`, one case at a time.
    ///
    /// A case selected by more than one query runs once. When the queries
    /// select different subcases of a case, the case runs the union of
    /// them; a query selecting the whole case selects every subcase.
    pub async fn run_queries<L>(&self, loader: &L, queries: &[TestQuery]) -> Result<RunReport>
    where
        L: TestFileLoader + ?Sized,
    {
        let ctx = self.context();
        let start = Instant::now();

        let mut trees = Vec::with_capacity(queries.len());
        for query in queries {
            let tree = load_tree(loader, query, &[]).await?;
            log::debug!("{}: {} cases", query, tree.iterate_leaves().count());
            trees.push(tree);
        }

        let mut selected: Vec<Selected<'_>> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for leaf in trees.iter().flat_map(|t| t.iterate_leaves()) {
            if self.config.shard.is_some_and(|shard| !shard.contains(leaf.query())) {
                continue;
            }
            let name = leaf.query().to_string();
            match (index.get(&name).copied(), leaf.run_case()) {
                (Some(i), Some(case)) => {
                    log::debug!("{} selected again", name);
                    if let Selected::Case(existing) = &mut selected[i] {
                        existing.widen_selection(case);
                    }
                }
                (Some(_), None) => log::debug!("{} already selected", name),
                (None, case) => {
                    index.insert(name, selected.len());
                    selected.push(match case {
                        Some(case) => Selected::Case(case.clone()),
                        None => Selected::Leaf(leaf),
                    });
                }
            }
        }

        let mut outcomes = Vec::with_capacity(selected.len());
        for entry in &selected {
            let (name, status) = match entry {
                Selected::Case(case) => (case.query().to_string(), case.run(&ctx).await),
                Selected::Leaf(leaf) => (leaf.query().to_string(), leaf.run(&ctx).await),
            };
            ctx.beat();
            if self.config.verbose {
                log::info!("{} - {}", name, status);
            }
            let result = self.logger.get(&name).unwrap_or_default();
            outcomes.push(CaseOutcome {
                query: name,
                status,
                result,
            });
        }

        let report = RunReport::new(outcomes, start.elapsed());
        log::info!(
            "ran {} cases: {} passed, {} failed in {:?}",
            report.total(),
            report.passed(),
            report.failed(),
            report.duration()
        );
        Ok(report)
    }
}
