//! Error types for the CTS harness

use thiserror::Error;

/// Main error type for harness operations
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Malformed query string or invalid query construction
    #[error(transparent)]
    Query(#[from] QueryError),
    /// Suite or group resolution failure
    #[error(transparent)]
    Listing(#[from] ListingError),
    /// A spec file failed to import
    #[error(transparent)]
    SpecLoad(#[from] SpecLoadError),
    /// Structural problems found by validation
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// Query parsing and construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The query string could not be parsed
    #[error("query syntax error: {message}\n  on: {query}")]
    Syntax { message: String, query: String },
    /// A query was constructed from invalid parts
    #[error("invalid query: {0}")]
    Invalid(String),
}

impl QueryError {
    pub fn syntax(message: impl Into<String>, query: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
            query: query.into(),
        }
    }
}

/// Listing resolution errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListingError {
    /// The loader has no suite with this name
    #[error("suite not found: {0}")]
    SuiteNotFound(String),
    /// No listing entry or case matched the query
    #[error("query `{0}` does not match any cases")]
    NoMatch(String),
}

/// Error raised while importing a single spec file
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to load {suite}:{path}: {message}")]
pub struct SpecLoadError {
    pub suite: String,
    pub path: String,
    pub message: String,
}

impl SpecLoadError {
    pub fn new(suite: impl Into<String>, path: &[String], message: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            path: path.join(","),
            message: message.into(),
        }
    }
}

/// Structural problems detected while validating a suite
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Two cases of one test share the same identity
    #[error("duplicate case query: {0}")]
    DuplicateCase(String),
    /// A test was declared without a test function
    #[error("test has no test function: {0}")]
    MissingTestFunction(String),
    /// A test's params produce no cases
    #[error("test has no cases: {0}")]
    NoCases(String),
    /// A case query string is longer than allowed
    #[error("case query is {length} characters long (limit {limit}): {query}")]
    QueryTooLong {
        query: String,
        length: usize,
        limit: usize,
    },
    /// A case's params can't be written as a query
    #[error("invalid case in {test}: {message}")]
    InvalidCase { test: String, message: String },
    /// Validation found errors; details were reported separately
    #[error("validation failed with {0} error(s)")]
    Failed(usize),
}

/// Uncaught fault inside a test body (a panic)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CaseExecutionError {
    pub message: String,
}

impl CaseExecutionError {
    /// Build from a panic payload as returned by `catch_unwind`
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "test panicked with a non-string payload".to_string()
        };
        Self { message }
    }
}

/// Convenience Result type for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;
