//! Structural validation of a suite
//!
//! Imports every spec file of a suite and checks what can be checked without
//! running anything: test functions, case identities, query lengths, and
//! optionally the suite's listing metadata.

use crate::framework::{ListingEntry, Test, TestFileLoader};
use crate::params::CaseParams;
use crate::query::TestQuery;
use crate::utils::{HarnessError, Result, ValidationError};
use std::collections::{BTreeSet, HashSet};
use std::fmt::Write;

/// Longest allowed case query, encoded
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 375;

#[derive(Debug, Clone)]
pub struct ValidateOptions {
    pub max_query_length: usize,
    /// Compare tests against the suite's listing metadata
    pub print_metadata_warnings: bool,
    pub print_case_count_report: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            max_query_length: DEFAULT_MAX_QUERY_LENGTH,
            print_metadata_warnings: false,
            print_case_count_report: false,
        }
    }
}

/// Case counts of one spec file. A case without subcases counts as one
/// subcase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseCountReport {
    pub file: String,
    pub tests: usize,
    pub cases: usize,
    pub subcases: usize,
}

/// Everything validation found in one suite
#[derive(Debug)]
pub struct ValidationReport {
    pub suite: String,
    pub errors: Vec<HarnessError>,
    pub warnings: Vec<String>,
    pub case_counts: Vec<CaseCountReport>,
}

impl ValidationReport {
    fn new(suite: &str) -> Self {
        Self {
            suite: suite.to_string(),
            errors: Vec::new(),
            warnings: Vec::new(),
            case_counts: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> std::result::Result<Self, ValidationError> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(ValidationError::Failed(self.errors.len()))
        }
    }

    fn error(&mut self, err: impl Into<HarnessError>) {
        let err = err.into();
        log::error!("{}", err);
        self.errors.push(err);
    }

    fn warn(&mut self, message: String) {
        log::warn!("{}", message);
        self.warnings.push(message);
    }

    /// Per-file counts as an aligned table
    pub fn case_count_table(&self) -> String {
        let width = self
            .case_counts
            .iter()
            .map(|c| c.file.len())
            .max()
            .unwrap_or(0);
        let mut out = String::new();
        let _ = writeln!(out, "{:<width$} {:>6} {:>8} {:>9}", "file", "tests", "cases", "subcases");
        let (mut tests, mut cases, mut subcases) = (0, 0, 0);
        for c in &self.case_counts {
            let _ = writeln!(out, "{:<width$} {:>6} {:>8} {:>9}", c.file, c.tests, c.cases, c.subcases);
            tests += c.tests;
            cases += c.cases;
            subcases += c.subcases;
        }
        let _ = write!(out, "{:<width$} {:>6} {:>8} {:>9}", "total", tests, cases, subcases);
        out
    }
}

struct TestChecker<'a> {
    opts: &'a ValidateOptions,
    report: &'a mut ValidationReport,
    test_queries: &'a mut BTreeSet<String>,
}

impl TestChecker<'_> {
    fn check_length(&mut self, query: &str) {
        if query.len() > self.opts.max_query_length {
            self.report.error(ValidationError::QueryTooLong {
                query: query.to_string(),
                length: query.len(),
                limit: self.opts.max_query_length,
            });
        }
    }

    /// Name of one case (or subcase) of `test`, or an error in the report
    fn case_name(&mut self, test_query: &TestQuery, params: &CaseParams) -> Option<String> {
        match TestQuery::single_case(
            test_query.suite(),
            test_query.group().iter().cloned(),
            test_query.test().iter().cloned(),
            params.clone(),
        ) {
            Ok(q) => Some(q.to_string()),
            Err(e) => {
                self.report.error(ValidationError::InvalidCase {
                    test: test_query.to_string(),
                    message: e.to_string(),
                });
                None
            }
        }
    }

    /// Returns (cases, subcases)
    fn check_test(&mut self, suite: &str, file: &[String], test: &Test) -> (usize, usize) {
        let test_query =
            match TestQuery::multi_case(suite, file.iter().cloned(), test.path().iter().cloned(), CaseParams::new()) {
                Ok(q) => q,
                Err(e) => {
                    self.report.error(e);
                    return (0, 0);
                }
            };
        self.test_queries.insert(test_query.to_string());
        if !test.has_test_fn() {
            self.report
                .error(ValidationError::MissingTestFunction(test_query.to_string()));
        }

        let (mut cases, mut subcases) = (0, 0);
        let mut seen_cases = HashSet::new();
        for case in test.iterate_cases() {
            cases += 1;
            if let Some(name) = self.case_name(&test_query, &case) {
                self.check_length(&name);
                if !seen_cases.insert(name.clone()) {
                    self.report.error(ValidationError::DuplicateCase(name));
                }
            }

            let Some(subs) = test.iterate_subcases(&case) else {
                subcases += 1;
                continue;
            };
            let mut seen_subcases = HashSet::new();
            for sub in subs {
                subcases += 1;
                let Some(name) = self.case_name(&test_query, &case.merged(&sub)) else {
                    continue;
                };
                self.check_length(&name);
                if !seen_subcases.insert(name.clone()) {
                    self.report.error(ValidationError::DuplicateCase(name));
                }
            }
        }
        if cases == 0 {
            self.report.error(ValidationError::NoCases(test_query.to_string()));
        }
        (cases, subcases)
    }
}

/// Validate every spec file of `suite`.
///
/// Problems with individual files or tests are collected in the report;
/// only a missing suite is an `Err`.
pub async fn validate_suite<L>(loader: &L, suite: &str, opts: &ValidateOptions) -> Result<ValidationReport>
where
    L: TestFileLoader + ?Sized,
{
    let mut report = ValidationReport::new(suite);
    let mut test_queries = BTreeSet::new();

    for entry in loader.listing(suite).await? {
        let ListingEntry::Spec { path } = entry else {
            continue;
        };
        let spec = match loader.import_spec(suite, &path).await {
            Ok(spec) => spec,
            Err(e) => {
                report.error(e);
                continue;
            }
        };
        let file = match TestQuery::multi_test(suite, path.iter().cloned(), Vec::<String>::new()) {
            Ok(q) => q.to_string(),
            Err(e) => {
                report.error(e);
                continue;
            }
        };
        if spec.g.is_empty() {
            report.warn(format!("{}: file has no tests", file));
        }

        let mut counts = CaseCountReport {
            file,
            tests: spec.g.len(),
            cases: 0,
            subcases: 0,
        };
        let mut checker = TestChecker {
            opts,
            report: &mut report,
            test_queries: &mut test_queries,
        };
        for test in spec.g.tests() {
            let (cases, subcases) = checker.check_test(suite, &path, test);
            counts.cases += cases;
            counts.subcases += subcases;
        }
        report.case_counts.push(counts);
    }

    if opts.print_metadata_warnings {
        check_metadata(loader, suite, &test_queries, &mut report).await;
    }
    log::debug!(
        "validated {}: {} files, {} errors, {} warnings",
        suite,
        report.case_counts.len(),
        report.errors.len(),
        report.warnings.len()
    );
    Ok(report)
}

async fn check_metadata<L>(loader: &L, suite: &str, tests: &BTreeSet<String>, report: &mut ValidationReport)
where
    L: TestFileLoader + ?Sized,
{
    let Some(meta) = loader.listing_meta(suite).await else {
        report.warn(format!("{}: no listing metadata", suite));
        return;
    };
    for test in tests {
        match meta.get(test) {
            None => report.warn(format!("{}: missing from listing metadata", test)),
            Some(m) if m.subcase_ms.is_none_or(|ms| ms <= 0.0) => {
                report.warn(format!("{}: subcaseMS is missing or zero", test))
            }
            Some(_) => {}
        }
    }
    for stale in meta.keys().filter(|k| !tests.contains(*k)) {
        report.warn(format!("{}: listing metadata entry has no matching test", stale));
    }
}
