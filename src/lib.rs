//! # cts-harness - Conformance Test Suite harness
//!
//! Declares tests as parameterized groups, addresses them with a compact
//! query language, builds a filtered case tree from a query, and runs the
//! selected cases while recording a structured log per case.
//!
//! ## Architecture
//!
//! The harness is organized into the following modules:
//!
//! - **query**: Query parsing, formatting, encoding and ordering
//! - **params**: Parameter values and parameter-space combinatorics
//! - **logging**: Per-case recorders and the results JSON
//! - **framework**: Test groups, fixtures, case execution and loaders
//! - **tree**: Case tree construction and iteration
//! - **runner**: Running queries, reports and suite validation
//! - **suites**: Built-in suites
//! - **utils**: Shared utilities and error types
//!
//! ```
//! use cts_harness::query::TestQuery;
//!
//! let q = TestQuery::parse("suite:a,b:t:x=1;*").unwrap();
//! assert_eq!(q.to_string(), "suite:a,b:t:x=1;*");
//! ```

pub mod framework;
pub mod logging;
pub mod params;
pub mod query;
pub mod runner;
pub mod suites;
pub mod tree;
pub mod utils;

// Re-export main types for convenience
pub use framework::{Fixture, SuiteRegistry, TestGroup};
pub use query::TestQuery;
pub use runner::{CtsRunner, RunnerConfig};
pub use utils::error::{HarnessError, Result};

/// Harness version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "cts-harness";
