//! Expectation overrides loaded from an external file
//!
//! The file is a JSON array of `{"query": "...", "expectation": "fail" | "skip"}`
//! entries. An entry applies to every case its query contains.

use crate::logging::Expectation;
use crate::query::{QueryOrdering, TestQuery, compare_queries};
use crate::utils::{HarnessError, Result};
use serde::Deserialize;
use std::path::Path;

/// One expectation override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseExpectation {
    pub query: TestQuery,
    pub expectation: Expectation,
}

#[derive(Debug, Deserialize)]
struct RawExpectation {
    query: String,
    expectation: Expectation,
}

/// Parse an expectations file's contents
pub fn parse_expectations(json: &str) -> Result<Vec<CaseExpectation>> {
    let raw: Vec<RawExpectation> = serde_json::from_str(json)?;
    raw.into_iter()
        .map(|e| {
            Ok(CaseExpectation {
                query: TestQuery::parse(&e.query)?,
                expectation: e.expectation,
            })
        })
        .collect()
}

/// Read and parse an expectations file
pub fn load_expectations(path: &Path) -> Result<Vec<CaseExpectation>> {
    let json = std::fs::read_to_string(path).map_err(|e| {
        HarnessError::Other(format!("cannot read expectations {}: {}", path.display(), e))
    })?;
    parse_expectations(&json)
}

fn covers(expectation: &CaseExpectation, query: &TestQuery) -> bool {
    matches!(
        compare_queries(&expectation.query, query),
        QueryOrdering::Equal | QueryOrdering::StrictSuperset
    )
}

fn lookup<'a>(
    query: &TestQuery,
    expectations: impl IntoIterator<Item = &'a CaseExpectation>,
) -> Option<Expectation> {
    let mut found = None;
    for e in expectations {
        if !covers(e, query) {
            continue;
        }
        match e.expectation {
            Expectation::Skip => return Some(Expectation::Skip),
            Expectation::Fail => found = Some(Expectation::Fail),
            Expectation::Pass => found = found.or(Some(Expectation::Pass)),
        }
    }
    found
}

/// The expectation that applies to `query`, if any. `skip` wins over `fail`.
pub fn expectation_for(query: &TestQuery, expectations: &[CaseExpectation]) -> Option<Expectation> {
    lookup(query, expectations)
}

/// The expectation for one subcase of `case`. Entries covering the whole
/// case belong to the case record, so only entries narrower than the case
/// are considered.
pub fn subcase_expectation_for(
    case: &TestQuery,
    subcase: &TestQuery,
    expectations: &[CaseExpectation],
) -> Option<Expectation> {
    lookup(subcase, expectations.iter().filter(|e| !covers(e, case)))
}
