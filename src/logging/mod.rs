//! Result logging
//!
//! The `Logger` owns the results of a run, keyed by case query string, in the
//! order cases started recording. Each `record()` call hands out a
//! `TestCaseRecorder` that writes into one of those results.

mod recorder;
mod result;

pub use recorder::{Expectation, LogOptions, ResultHandle, TestCaseRecorder};
pub use result::{LiveTestCaseResult, LogMessage, Status, TestCaseResultJson};

use crate::utils::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Version stamp written to the results JSON
pub const LOG_FORMAT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logger configuration
#[derive(Debug, Clone, Default)]
pub struct LoggerOptions {
    /// Keep `debug` messages
    pub debug: bool,
    /// Leave stack locations out of the JSON, for snapshots that compare
    /// across runs
    pub elide_stacks: bool,
    /// Device description written as `defaultDevice`
    pub default_device: Option<String>,
}

/// Shape of the results JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsJson {
    pub version: String,
    #[serde(rename = "defaultDevice", default, skip_serializing_if = "Option::is_none")]
    pub default_device: Option<String>,
    pub results: Vec<(String, TestCaseResultJson)>,
}

#[derive(Debug, Default)]
struct ResultMap {
    order: Vec<(String, ResultHandle)>,
    index: HashMap<String, usize>,
}

#[derive(Debug, Default)]
struct LoggerInner {
    options: LoggerOptions,
    results: Mutex<ResultMap>,
}

/// Process-wide result map. Clones share the same results.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Logger {
    pub fn new(options: LoggerOptions) -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                options,
                results: Mutex::new(ResultMap::default()),
            }),
        }
    }

    pub fn options(&self) -> &LoggerOptions {
        &self.inner.options
    }

    fn results_map(&self) -> MutexGuard<'_, ResultMap> {
        self.inner.results.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start recording a case. The timer starts now.
    ///
    /// Recording a name that was already recorded resets its result in place.
    pub fn record(&self, name: impl Into<String>) -> (TestCaseRecorder, ResultHandle) {
        let name = name.into();
        let handle = {
            let mut map = self.results_map();
            match map.index.get(&name).copied() {
                Some(i) => {
                    log::warn!("{} recorded more than once; previous result replaced", name);
                    let handle = map.order[i].1.clone();
                    handle.reset();
                    handle
                }
                None => {
                    let handle = ResultHandle::default();
                    let i = map.order.len();
                    map.order.push((name.clone(), handle.clone()));
                    map.index.insert(name, i);
                    handle
                }
            }
        };
        let recorder = TestCaseRecorder::new(handle.clone(), self.inner.options.debug);
        (recorder, handle)
    }

    pub fn len(&self) -> usize {
        self.results_map().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, name: &str) -> Option<LiveTestCaseResult> {
        let map = self.results_map();
        map.index.get(name).map(|&i| map.order[i].1.snapshot())
    }

    /// Snapshot of every result, in recording order
    pub fn results(&self) -> Vec<(String, LiveTestCaseResult)> {
        self.results_map()
            .order
            .iter()
            .map(|(name, handle)| (name.clone(), handle.snapshot()))
            .collect()
    }

    pub fn to_results_json(&self) -> ResultsJson {
        let include_stacks = !self.inner.options.elide_stacks;
        ResultsJson {
            version: LOG_FORMAT_VERSION.to_string(),
            default_device: self.inner.options.default_device.clone(),
            results: self
                .results()
                .iter()
                .map(|(name, r)| (name.clone(), TestCaseResultJson::from_live(r, include_stacks)))
                .collect(),
        }
    }

    /// Pretty-printed results JSON. Byte-identical across calls as long as no
    /// result changes in between.
    pub fn as_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_results_json())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_keeps_insertion_order() {
        let logger = Logger::default();
        for name in ["s:b:t:", "s:a:t:", "s:c:t:"] {
            let (rec, _) = logger.record(name);
            rec.finish();
        }
        let names: Vec<String> = logger.results().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["s:b:t:", "s:a:t:", "s:c:t:"]);
    }

    #[test]
    fn test_live_result_is_running_until_finish() {
        let logger = Logger::default();
        let (rec, handle) = logger.record("s:a:t:");
        assert_eq!(handle.status(), Status::Running);
        assert_eq!(logger.get("s:a:t:").map(|r| r.status), Some(Status::Running));
        rec.warn("hmm");
        rec.finish();
        assert_eq!(logger.get("s:a:t:").map(|r| r.status), Some(Status::Warn));
    }

    #[test]
    fn test_json_is_idempotent() {
        let logger = Logger::new(LoggerOptions {
            default_device: Some("null".to_string()),
            ..Default::default()
        });
        let (rec, _) = logger.record("s:a:t:x=1");
        rec.finish();
        let first = logger.as_json().unwrap();
        let second = logger.as_json().unwrap();
        assert_eq!(first, second);

        let parsed: ResultsJson = serde_json::from_str(&first).unwrap();
        assert_eq!(parsed.version, LOG_FORMAT_VERSION);
        assert_eq!(parsed.default_device.as_deref(), Some("null"));
        assert_eq!(parsed.results[0].0, "s:a:t:x=1");
        assert_eq!(parsed.results[0].1.status, Status::Pass);
    }

    #[test]
    fn test_elide_stacks() {
        let logger = Logger::new(LoggerOptions {
            elide_stacks: true,
            ..Default::default()
        });
        let (rec, _) = logger.record("s:a:t:");
        rec.expectation_failed("bad");
        rec.finish();
        let json = logger.to_results_json();
        assert_eq!(json.results[0].1.logs, vec!["EXPECTATION FAILED: bad"]);
    }

    #[test]
    fn test_rerecord_replaces_in_place() {
        let logger = Logger::default();
        let (rec, _) = logger.record("s:a:t:");
        rec.expectation_failed("first run");
        rec.finish();
        logger.record("s:b:t:").0.finish();
        let (rec, _) = logger.record("s:a:t:");
        rec.finish();
        assert_eq!(logger.len(), 2);
        assert_eq!(logger.results()[0].1.status, Status::Pass);
    }
}
