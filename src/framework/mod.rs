//! Test declaration and execution
//!
//! Spec files declare tests in a [`TestGroup`]; a loader hands the groups to
//! the tree builder; each leaf of the tree is a [`RunCase`] that runs its test
//! function through a [`Fixture`].

mod expectations;
mod fixture;
mod loader;
mod test_group;

pub use expectations::{
    CaseExpectation, expectation_for, load_expectations, parse_expectations, subcase_expectation_for,
};
pub use fixture::{CaseError, CaseResult, Fixture, SharedState};
pub use loader::{ListingEntry, ListingMeta, SpecFile, SuiteRegistry, TestFileLoader, TestMeta};
pub use test_group::{
    DEFAULT_MAX_SUBCASES_IN_FLIGHT, Heartbeat, RunCase, RunContext, SetupFn, Test, TestFn,
    TestGroup,
};

#[cfg(test)]
pub use loader::MockTestFileLoader;
