//! `unittests`: the harness checking itself through its own runner

use crate::framework::{CaseError, SuiteRegistry};
use crate::logging::{Logger, LoggerOptions, ResultsJson, Status};
use crate::params::{CaseParams, ParamsBuilder};
use crate::query::{QueryOrdering, TestQuery, compare_queries};
use crate::utils::crc32::{crc32, to_hex_string};

const SUITE: &str = "unittests";

const ROUNDTRIP_QUERIES: [&str; 9] = [
    "s:*",
    "s:a,*",
    "s:a,b:*",
    "s:a:t,*",
    "s:a:t:*",
    "s:a:t:x=1;*",
    "s:a:t:",
    "s:a:t:x=1;y=\"str\"",
    "s:a:t:x=[1,2]",
];

pub(super) fn register(r: &mut SuiteRegistry) {
    r.add_readme(SUITE, "", "Unit tests for the test harness itself.")
        .add_spec(SUITE, "params_builder", "Param combinators.", |g| {
            g.test("combine")
                .desc("Cartesian product sizes and order.")
                .params(|u| u.combine("n", [0, 1, 2, 3]))
                .test_fn(|t| async move {
                    let n = t.param("n").and_then(|v| v.as_i64()).unwrap_or_default() as usize;
                    let cases: Vec<CaseParams> = ParamsBuilder::new()
                        .combine("x", 0..n as i64)
                        .combine("y", ["a", "b"])
                        .iterate_cases()
                        .collect();
                    t.expect(cases.len() == n * 2, format!("expected {} cases, got {}", n * 2, cases.len()));
                    if let Some(first) = cases.first() {
                        t.expect(first.to_string() == "x=0;y=\"a\"", format!("first case was {}", first));
                    }
                    Ok(())
                });
            g.test("filter")
                .params(|u| u.combine("keep_odd", [false, true]))
                .test_fn(|t| async move {
                    let keep_odd = t.param("keep_odd").and_then(|v| v.as_bool()).unwrap_or_default();
                    let count = ParamsBuilder::new()
                        .combine("x", 0..10)
                        .filter(move |p| p.get("x").and_then(|v| v.as_i64()).is_some_and(|x| (x % 2 == 1) == keep_odd))
                        .iterate_cases()
                        .count();
                    t.expect(count == 5, format!("expected 5 cases, got {}", count));
                    Ok(())
                });
            g.test("subcases")
                .desc("Each subcase sees its case params plus its own.")
                .params(|u| u.combine("w", [1, 2]).begin_subcases().combine("h", [1, 2, 3]))
                .test_fn(|t| async move {
                    let w = t.param("w").and_then(|v| v.as_i64());
                    let h = t.param("h").and_then(|v| v.as_i64());
                    t.expect(matches!(w, Some(1 | 2)), "w out of range");
                    t.expect(matches!(h, Some(1..=3)), "h out of range");
                    Ok(())
                });
        })
        .add_spec(SUITE, "query", "Query parsing and ordering.", |g| {
            g.test("roundtrip")
                .params(|u| u.combine("i", 0..ROUNDTRIP_QUERIES.len() as i64))
                .test_fn(|t| async move {
                    let i = t.param("i").and_then(|v| v.as_i64()).unwrap_or_default() as usize;
                    let Some(q) = ROUNDTRIP_QUERIES.get(i) else {
                        return Err(CaseError::fail(format!("no query #{}", i)));
                    };
                    let parsed = TestQuery::parse(q).map_err(|e| CaseError::fail(e.to_string()))?;
                    let again = TestQuery::parse(&parsed.to_string()).map_err(|e| CaseError::fail(e.to_string()))?;
                    t.expect(parsed == again, format!("{} did not round-trip", q));
                    Ok(())
                });
            g.test("ordering").test_fn(|t| async move {
                let q = |s: &str| TestQuery::parse(s).map_err(|e| CaseError::fail(e.to_string()));
                let cases = [
                    ("s:*", "s:a,*", QueryOrdering::StrictSuperset),
                    ("s:a:t:x=1", "s:a:t:*", QueryOrdering::StrictSubset),
                    ("s:a:t:x=1;y=2", "s:a:t:y=2;x=1", QueryOrdering::Equal),
                    ("s:a,*", "s:b,*", QueryOrdering::Unordered),
                ];
                for (a, b, expected) in cases {
                    let actual = compare_queries(&q(a)?, &q(b)?);
                    t.expect(actual == expected, format!("{} vs {}: {:?}", a, b, actual));
                }
                Ok(())
            });
        })
        .add_spec(SUITE, "crc32", "CRC-32 checksum.", |g| {
            g.test("vector").test_fn(|t| async move {
                let sum = crc32(b"hello world");
                t.expect(sum == 0x0d4a_1185, format!("crc32 was {}", to_hex_string(sum)));
                t.expect(to_hex_string(sum) == "0d4a1185", "hex formatting");
                Ok(())
            });
        })
        .add_spec(SUITE, "logger", "Result log JSON.", |g| {
            g.test("json_roundtrip").test_fn(|t| async move {
                let logger = Logger::new(LoggerOptions::default());
                let (rec, _) = logger.record("s:a:t:");
                rec.warn("w");
                rec.finish();
                let json = logger.as_json().map_err(|e| CaseError::fail(e.to_string()))?;
                let parsed: ResultsJson = serde_json::from_str(&json).map_err(|e| CaseError::fail(e.to_string()))?;
                t.expect(parsed.results.len() == 1, "one result");
                t.expect(
                    parsed.results.first().is_some_and(|(_, r)| r.status == Status::Warn),
                    "status survives",
                );
                Ok(())
            });
        });
}
