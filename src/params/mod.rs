//! Case parameters and parameter-space combinatorics
//!
//! `CaseParams` is one concrete parameter assignment. `ParamsBuilder`
//! describes how a test's parameter space is expanded into those assignments.

mod builder;
mod value;

pub use builder::ParamsBuilder;
pub use value::ParamValue;

use std::fmt;

/// Prefix marking a parameter as private (visible to the test body, excluded
/// from case identity).
pub const PRIVATE_PARAM_PREFIX: char = '_';

/// Whether a parameter key takes part in case identity
pub fn param_key_is_public(key: &str) -> bool {
    !key.starts_with(PRIVATE_PARAM_PREFIX)
}

/// An ordered mapping from parameter name to value.
///
/// Insertion order is kept (it determines how a case query is written), but
/// equality ignores it.
#[derive(Debug, Clone, Default)]
pub struct CaseParams {
    entries: Vec<(String, ParamValue)>,
}

impl CaseParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Option<ParamValue> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Only the parameters that take part in case identity
    pub fn public_params(&self) -> CaseParams {
        self.entries
            .iter()
            .filter(|(k, _)| param_key_is_public(k))
            .cloned()
            .collect()
    }

    /// A copy with one more entry appended
    pub(crate) fn extended(&self, key: &str, value: ParamValue) -> CaseParams {
        let mut out = self.clone();
        out.insert(key, value);
        out
    }

    /// A copy with all of `other`'s entries appended after ours
    pub fn merged(&self, other: &CaseParams) -> CaseParams {
        let mut out = self.clone();
        for (k, v) in other.iter() {
            out.insert(k, v.clone());
        }
        out
    }

    /// A copy without the given keys
    pub fn without_keys<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> CaseParams {
        let drop: Vec<&str> = keys.into_iter().collect();
        self.entries
            .iter()
            .filter(|(k, _)| !drop.contains(&k.as_str()))
            .cloned()
            .collect()
    }

    /// True if every key of `partial` is present here with an equal value
    pub fn matches_partial(&self, partial: &CaseParams) -> bool {
        partial
            .iter()
            .all(|(k, v)| self.get(k).is_some_and(|mine| mine == v))
    }

    /// Entries sorted by key, for order-independent comparison
    pub(crate) fn sorted_entries(&self) -> Vec<(&str, &ParamValue)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

impl PartialEq for CaseParams {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.matches_partial(other)
    }
}

impl Eq for CaseParams {}

impl FromIterator<(String, ParamValue)> for CaseParams {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        let mut params = CaseParams::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

impl fmt::Display for CaseParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::query::stringify_params(self))
    }
}

/// Build a `CaseParams` from `key => value` pairs.
///
/// ```
/// use cts_harness::case_params;
/// let p = case_params! { "size" => 12, "mappable" => true };
/// assert_eq!(p.len(), 2);
/// ```
#[macro_export]
macro_rules! case_params {
    () => {
        $crate::params::CaseParams::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut params = $crate::params::CaseParams::new();
        $( params.insert($key, $value); )+
        params
    }};
}
