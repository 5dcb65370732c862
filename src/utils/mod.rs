//! Shared utilities and error types

pub mod crc32;
pub mod error;

pub use error::{
    CaseExecutionError, HarnessError, ListingError, QueryError, Result, SpecLoadError,
    ValidationError,
};
