//! Suites compiled into the `cts` binary

mod unittests;

use crate::framework::SuiteRegistry;

/// Registry with every built-in suite
pub fn builtin_registry() -> SuiteRegistry {
    let mut registry = SuiteRegistry::new();
    unittests::register(&mut registry);
    registry
}
