//! Integration tests for the CTS harness
//!
//! These tests drive the public API end to end: declaring suites, loading
//! trees from queries, running them, and reading the results JSON.

use async_trait::async_trait;
use cts_harness::case_params;
use cts_harness::framework::{
    ListingEntry, SpecFile, SuiteRegistry, TestFileLoader, parse_expectations,
};
use cts_harness::logging::{ResultsJson, Status};
use cts_harness::params::{CaseParams, ParamValue};
use cts_harness::query::{RESERVED_PARAM_STRINGS, TestQuery};
use cts_harness::runner::{CtsRunner, RunnerConfig};
use cts_harness::tree::load_tree;
use cts_harness::utils::{ListingError, SpecLoadError};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Mutex;

fn leaf_names(tree: &cts_harness::tree::TestTree) -> Vec<String> {
    tree.iterate_leaves().map(|l| l.query().to_string()).collect()
}

/// Wraps a registry and remembers which files were imported
struct CountingLoader {
    inner: SuiteRegistry,
    imported: Mutex<Vec<String>>,
}

#[async_trait]
impl TestFileLoader for CountingLoader {
    async fn listing(&self, suite: &str) -> Result<Vec<ListingEntry>, ListingError> {
        self.inner.listing(suite).await
    }

    async fn import_spec(&self, suite: &str, path: &[String]) -> Result<SpecFile, SpecLoadError> {
        if let Ok(mut imported) = self.imported.lock() {
            imported.push(path.join(","));
        }
        self.inner.import_spec(suite, path).await
    }
}

fn pruning_suite() -> SuiteRegistry {
    let mut r = SuiteRegistry::new();
    for path in ["a,b", "a,c", "b"] {
        r.add_spec("suite", path, "", |g| {
            g.test("t").test_fn(|_| async { Ok(()) });
        });
    }
    r
}

#[tokio::test]
async fn test_tree_prunes_unmatched_files() {
    let loader = CountingLoader {
        inner: pruning_suite(),
        imported: Mutex::new(Vec::new()),
    };
    let tree = load_tree(&loader, &TestQuery::parse("suite:a,*").unwrap(), &[])
        .await
        .unwrap();
    assert_eq!(leaf_names(&tree), vec!["suite:a,b:t:", "suite:a,c:t:"]);
    assert_eq!(*loader.imported.lock().unwrap(), vec!["a,b", "a,c"]);
}

fn single_case_suite() -> SuiteRegistry {
    let mut r = SuiteRegistry::new();
    r.add_spec("s", "f", "", |g| {
        g.test("t")
            .params(|u| u.combine("x", [1, 2]))
            .test_fn(|t| async move {
                if t.param("x") == Some(&ParamValue::from(2)) {
                    t.fail("x is two");
                }
                Ok(())
            });
    });
    r
}

#[tokio::test]
async fn test_single_case_scenario() {
    let runner = CtsRunner::new(RunnerConfig::default());
    let report = runner
        .run_queries(&single_case_suite(), &[TestQuery::parse("s:f:t:x=1").unwrap()])
        .await
        .unwrap();
    assert_eq!(report.total(), 1);
    assert_eq!(report.outcomes()[0].query, "s:f:t:x=1");
    assert_eq!(report.outcomes()[0].status, Status::Pass);
}

#[tokio::test]
async fn test_results_json_shape() {
    let runner = CtsRunner::new(RunnerConfig::default());
    runner
        .run_queries(&single_case_suite(), &[TestQuery::parse("s:f:*").unwrap()])
        .await
        .unwrap();
    let first = runner.logger().as_json().unwrap();
    assert_eq!(first, runner.logger().as_json().unwrap());

    let parsed: ResultsJson = serde_json::from_str(&first).unwrap();
    let statuses: Vec<(&str, Status)> = parsed
        .results
        .iter()
        .map(|(name, r)| (name.as_str(), r.status))
        .collect();
    assert_eq!(
        statuses,
        vec![("s:f:t:x=1", Status::Pass), ("s:f:t:x=2", Status::Fail)]
    );
    assert!(parsed.results[1].1.logs[0].starts_with("EXPECTATION FAILED: x is two"));
}

#[tokio::test]
async fn test_expectations_file_marks_known_failures() {
    let expectations = parse_expectations(r#"[{"query": "s:f:t:x=2", "expectation": "fail"}]"#).unwrap();
    let config = RunnerConfig {
        expectations,
        ..Default::default()
    };
    let report = CtsRunner::new(config)
        .run_queries(&single_case_suite(), &[TestQuery::parse("s:f:*").unwrap()])
        .await
        .unwrap();
    assert_eq!(report.failed(), 0);
    assert_eq!(report.exit_code(), 0);
}

fn subcase_suite() -> SuiteRegistry {
    let mut r = SuiteRegistry::new();
    r.add_spec("s", "sub", "", |g| {
        g.test("t")
            .params(|u| u.combine("c", [0, 1]).begin_subcases().combine("i", 0..8))
            .test_fn(|t| async move {
                let i = t.param("i").and_then(|v| v.as_i64()).unwrap_or_default();
                tokio::task::yield_now().await;
                if i == 5 {
                    t.warn("five");
                }
                if i == 6 {
                    panic!("six");
                }
                Ok(())
            });
    });
    r
}

#[tokio::test]
async fn test_subcase_results_do_not_depend_on_concurrency() {
    let mut runs = Vec::new();
    for limit in [1, 3, 100] {
        let config = RunnerConfig {
            max_subcases_in_flight: limit,
            ..Default::default()
        };
        let runner = CtsRunner::new(config);
        runner
            .run_queries(&subcase_suite(), &[TestQuery::parse("s:sub:*").unwrap()])
            .await
            .unwrap();
        let mut results: Vec<(String, Status)> = runner
            .logger()
            .results()
            .into_iter()
            .map(|(name, r)| (name, r.status))
            .collect();
        results.sort();
        runs.push(results);
    }
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0], runs[2]);
    assert!(runs[0].contains(&("s:sub:t:c=0".to_string(), Status::Fail)));
    assert!(runs[0].contains(&("s:sub:t:c=1;i=5".to_string(), Status::Warn)));
}

#[tokio::test]
async fn test_overlapping_subcase_queries_run_the_union() {
    let runner = CtsRunner::new(RunnerConfig::default());
    let queries: Vec<TestQuery> = ["s:sub:t:c=0;i=1", "s:sub:t:c=0;i=6", "s:sub:t:c=0;i=1"]
        .iter()
        .map(|q| TestQuery::parse(q).unwrap())
        .collect();
    let report = runner.run_queries(&subcase_suite(), &queries).await.unwrap();
    assert_eq!(report.total(), 1);
    assert_eq!(report.failed(), 1);
    let mut names: Vec<String> = runner.logger().results().into_iter().map(|(name, _)| name).collect();
    names.sort();
    assert_eq!(names, vec!["s:sub:t:c=0", "s:sub:t:c=0;i=1", "s:sub:t:c=0;i=6"]);
}

#[tokio::test]
async fn test_case_expectations_cover_subcased_cases() {
    let expectations = parse_expectations(
        r#"[
            {"query": "s:sub:t:c=0", "expectation": "fail"},
            {"query": "s:sub:t:c=1", "expectation": "fail"}
        ]"#,
    )
    .unwrap();
    let runner = CtsRunner::new(RunnerConfig {
        expectations,
        ..Default::default()
    });
    let report = runner
        .run_queries(&subcase_suite(), &[TestQuery::parse("s:sub:*").unwrap()])
        .await
        .unwrap();
    assert_eq!(report.total(), 2);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.exit_code(), 0);
    // the failing subcase itself keeps its status
    let panicked = runner.logger().get("s:sub:t:c=0;i=6").unwrap();
    assert_eq!(panicked.status, Status::Fail);
}

#[tokio::test]
async fn test_builtin_suite_lists() {
    let registry = cts_harness::suites::builtin_registry();
    let tree = load_tree(&registry, &TestQuery::parse("unittests:*").unwrap(), &[])
        .await
        .unwrap();
    assert!(tree.counts().tests >= 6);
    assert!(tree.to_string().contains("unittests:crc32:vector:"));
}

fn part() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,5}"
}

fn param_value() -> impl Strategy<Value = ParamValue> {
    prop_oneof![
        (-1000i64..1000).prop_map(ParamValue::from),
        any::<bool>().prop_map(ParamValue::from),
        "[a-z:;=*%,\"é ]{0,6}".prop_map(ParamValue::from),
        prop::sample::select(RESERVED_PARAM_STRINGS.to_vec()).prop_map(ParamValue::from),
        Just(ParamValue::Null),
        Just(ParamValue::Undefined),
    ]
}

/// Whether a generated value survives a trip through a query string
fn representable(value: &ParamValue) -> bool {
    match value {
        ParamValue::String(s) => {
            !RESERVED_PARAM_STRINGS.contains(&s.as_str()) && !s.contains(['=', ';', '*'])
        }
        _ => true,
    }
}

fn case_params_strategy() -> impl Strategy<Value = CaseParams> {
    prop::collection::btree_map("[a-z][a-z0-9]{0,3}", param_value(), 0..4)
        .prop_map(|m| m.into_iter().collect())
}

proptest! {
    #[test]
    fn test_query_parsing_doesnt_crash(s in "\\PC*") {
        let _ = TestQuery::parse(&s);
    }

    #[test]
    fn test_single_case_roundtrip(
        suite in part(),
        group in prop::collection::vec(part(), 1..4),
        test in prop::collection::vec(part(), 1..3),
        params in case_params_strategy(),
    ) {
        let ok = params.iter().all(|(_, v)| representable(v));
        match TestQuery::single_case(suite, group, test, params) {
            Ok(q) => {
                prop_assert!(ok, "accepted {}", q);
                let parsed = TestQuery::parse(&q.to_string()).unwrap();
                prop_assert_eq!(&parsed, &q);
                prop_assert_eq!(parsed.to_string(), q.to_string());
            }
            Err(e) => prop_assert!(!ok, "rejected a representable case: {}", e),
        }
    }

    #[test]
    fn test_multi_case_roundtrip(
        group in prop::collection::vec(part(), 1..3),
        test in prop::collection::vec(part(), 1..3),
        params in case_params_strategy(),
    ) {
        let ok = params.iter().all(|(_, v)| representable(v));
        match TestQuery::multi_case("s", group, test, params) {
            Ok(q) => {
                prop_assert!(ok, "accepted {}", q);
                prop_assert_eq!(TestQuery::parse(&q.to_string()).unwrap(), q);
            }
            Err(e) => prop_assert!(!ok, "rejected a representable case: {}", e),
        }
    }

    #[test]
    fn test_case_count_is_product(n in 1usize..6, m in 1usize..6) {
        let mut r = SuiteRegistry::new();
        r.add_spec("s", "f", "", move |g| {
            g.test("t")
                .params(|u| u.combine("x", 0..n as i64).combine("y", 0..m as i64))
                .test_fn(|_| async { Ok(()) });
        });
        let query = TestQuery::parse("s:f:t:*").unwrap();
        let tree = tokio_test::block_on(load_tree(&r, &query, &[])).unwrap();
        prop_assert_eq!(tree.iterate_leaves().count(), n * m);
        let x1 = case_params! { "x" => 1 };
        let narrowed = TestQuery::multi_case("s", ["f"], ["t"], x1).unwrap();
        if n > 1 {
            let tree = tokio_test::block_on(load_tree(&r, &narrowed, &[])).unwrap();
            prop_assert_eq!(tree.iterate_leaves().count(), m);
        }
    }
}
