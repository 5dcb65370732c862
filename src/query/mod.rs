//! Test queries
//!
//! A query addresses a suite, a subtree of spec files, a subtree of tests, a
//! subtree of cases, or one single case:
//!
//! | level        | example                    |
//! |--------------|----------------------------|
//! | `MultiSuite` | `webgpu:*`                 |
//! | `MultiGroup` | `webgpu:api,buffer,*`      |
//! | `MultiTest`  | `webgpu:api,buffer:map,*`  |
//! | `MultiCase`  | `webgpu:api,buffer:map:size=12;*` |
//! | `SingleCase` | `webgpu:api,buffer:map:size=12;mappable=true` |
//!
//! Every multi-level query means "the whole subtree from here". That meaning
//! comes from the level alone: a multi-level query always serializes with a
//! trailing `*`, and parsing requires one, so there is exactly one
//! representation per subtree.

mod compare;
mod encode;
mod parse;

pub use compare::{QueryOrdering, compare_public_params, compare_queries};
pub use encode::{
    BAD_PARAM_VALUE_CHARS, RESERVED_PARAM_STRINGS, check_public_param_value,
    decode_uri_component, encode_uri_component_selectively, parse_param_value,
    stringify_param_value, stringify_params, stringify_single_param,
};
pub use parse::parse_query;

use crate::params::{CaseParams, param_key_is_public};
use crate::utils::QueryError;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Separates suite, group, test and params
pub const BIG_SEPARATOR: char = ':';
/// Separates group path segments and test path segments
pub const PATH_SEPARATOR: char = ',';
/// Separates `key=value` parameter parts
pub const PARAM_SEPARATOR: char = ';';
/// Separates a parameter key from its value
pub const PARAM_KV_SEPARATOR: char = '=';
/// Marks the end of a multi-level query
pub const WILDCARD: char = '*';

/// Whether `s` may be used as a path segment or parameter key
pub fn is_valid_query_part(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// How much of the hierarchy a query pins down
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryLevel {
    MultiSuite,
    MultiGroup,
    MultiTest,
    MultiCase,
    SingleCase,
}

impl QueryLevel {
    /// 1 = group level, 2 = test level, 3 = case level, 4 = single case
    pub fn depth(&self) -> u8 {
        match self {
            Self::MultiSuite | Self::MultiGroup => 1,
            Self::MultiTest => 2,
            Self::MultiCase => 3,
            Self::SingleCase => 4,
        }
    }

    pub fn is_multi(&self) -> bool {
        !matches!(self, Self::SingleCase)
    }
}

/// An immutable, validated query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestQuery {
    level: QueryLevel,
    suite: String,
    group: Vec<String>,
    test: Vec<String>,
    params: CaseParams,
}

fn to_path<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

fn check_parts(what: &str, parts: &[String]) -> Result<(), QueryError> {
    match parts.iter().find(|p| !is_valid_query_part(p)) {
        Some(bad) => Err(QueryError::Invalid(format!(
            "invalid {} part `{}`; must match [a-zA-Z0-9_]+",
            what, bad
        ))),
        None => Ok(()),
    }
}

impl TestQuery {
    fn build(
        level: QueryLevel,
        suite: String,
        group: Vec<String>,
        test: Vec<String>,
        params: CaseParams,
    ) -> Result<Self, QueryError> {
        if !is_valid_query_part(&suite) {
            return Err(QueryError::Invalid(format!("invalid suite name `{}`", suite)));
        }
        check_parts("group", &group)?;
        check_parts("test", &test)?;
        for (key, value) in params.iter() {
            if !is_valid_query_part(key) {
                return Err(QueryError::Invalid(format!("invalid param key `{}`", key)));
            }
            if param_key_is_public(key) {
                check_public_param_value(value)
                    .map_err(|e| QueryError::Invalid(format!("param `{}`: {}", key, e)))?;
            }
        }
        if level >= QueryLevel::MultiTest && group.is_empty() {
            return Err(QueryError::Invalid(
                "a test-level query needs a non-empty group path".to_string(),
            ));
        }
        if level >= QueryLevel::MultiCase && test.is_empty() {
            return Err(QueryError::Invalid(
                "a case-level query needs a non-empty test path".to_string(),
            ));
        }
        Ok(Self {
            level,
            suite,
            group,
            test,
            params: params.public_params(),
        })
    }

    /// `suite:*`
    pub fn multi_suite(suite: impl Into<String>) -> Result<Self, QueryError> {
        Self::build(
            QueryLevel::MultiSuite,
            suite.into(),
            Vec::new(),
            Vec::new(),
            CaseParams::new(),
        )
    }

    /// `suite:a,b,*`. An empty group is the same subtree as `suite:*`.
    pub fn multi_group<I, S>(suite: impl Into<String>, group: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let group = to_path(group);
        let level = if group.is_empty() {
            QueryLevel::MultiSuite
        } else {
            QueryLevel::MultiGroup
        };
        Self::build(level, suite.into(), group, Vec::new(), CaseParams::new())
    }

    /// `suite:a,b:*` or `suite:a,b:t,*`
    pub fn multi_test<I, S, J, T>(
        suite: impl Into<String>,
        group: I,
        test: J,
    ) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::build(
            QueryLevel::MultiTest,
            suite.into(),
            to_path(group),
            to_path(test),
            CaseParams::new(),
        )
    }

    /// `suite:a:t:*` or `suite:a:t:x=1;*`
    pub fn multi_case<I, S, J, T>(
        suite: impl Into<String>,
        group: I,
        test: J,
        params: CaseParams,
    ) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::build(
            QueryLevel::MultiCase,
            suite.into(),
            to_path(group),
            to_path(test),
            params,
        )
    }

    /// `suite:a:t:` or `suite:a:t:x=1;y=2`. Private params are dropped.
    pub fn single_case<I, S, J, T>(
        suite: impl Into<String>,
        group: I,
        test: J,
        params: CaseParams,
    ) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::build(
            QueryLevel::SingleCase,
            suite.into(),
            to_path(group),
            to_path(test),
            params,
        )
    }

    pub fn parse(s: &str) -> Result<Self, QueryError> {
        parse_query(s)
    }

    pub fn level(&self) -> QueryLevel {
        self.level
    }

    pub fn suite(&self) -> &str {
        &self.suite
    }

    pub fn group(&self) -> &[String] {
        &self.group
    }

    /// Test path; empty for group-level queries
    pub fn test(&self) -> &[String] {
        &self.test
    }

    /// Case params; empty for queries above case level
    pub fn params(&self) -> &CaseParams {
        &self.params
    }

    pub fn has_test(&self) -> bool {
        self.level >= QueryLevel::MultiTest
    }

    pub fn has_params(&self) -> bool {
        self.level >= QueryLevel::MultiCase
    }

    /// The query string before percent-encoding
    pub fn to_unencoded_string(&self) -> String {
        let mut s = self.suite.clone();
        s.push(BIG_SEPARATOR);
        let group = self.group.join(&PATH_SEPARATOR.to_string());
        let test = self.test.join(&PATH_SEPARATOR.to_string());
        let params = stringify_params(&self.params);
        match self.level {
            QueryLevel::MultiSuite => s.push(WILDCARD),
            QueryLevel::MultiGroup => {
                s.push_str(&group);
                s.push(PATH_SEPARATOR);
                s.push(WILDCARD);
            }
            QueryLevel::MultiTest => {
                s.push_str(&group);
                s.push(BIG_SEPARATOR);
                if !test.is_empty() {
                    s.push_str(&test);
                    s.push(PATH_SEPARATOR);
                }
                s.push(WILDCARD);
            }
            QueryLevel::MultiCase => {
                s.push_str(&group);
                s.push(BIG_SEPARATOR);
                s.push_str(&test);
                s.push(BIG_SEPARATOR);
                if !params.is_empty() {
                    s.push_str(&params);
                    s.push(PARAM_SEPARATOR);
                }
                s.push(WILDCARD);
            }
            QueryLevel::SingleCase => {
                s.push_str(&group);
                s.push(BIG_SEPARATOR);
                s.push_str(&test);
                s.push(BIG_SEPARATOR);
                s.push_str(&params);
            }
        }
        s
    }
}

impl fmt::Display for TestQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_uri_component_selectively(&self.to_unencoded_string()))
    }
}

impl FromStr for TestQuery {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_query(s)
    }
}

impl Ord for TestQuery {
    fn cmp(&self, other: &Self) -> Ordering {
        self.suite
            .cmp(&other.suite)
            .then_with(|| self.group.cmp(&other.group))
            .then_with(|| self.test.cmp(&other.test))
            .then_with(|| self.level.cmp(&other.level))
            .then_with(|| {
                let a = self.params.sorted_entries();
                let b = other.params.sorted_entries();
                let a = a.iter().map(|(k, v)| (*k, stringify_param_value(v)));
                let b = b.iter().map(|(k, v)| (*k, stringify_param_value(v)));
                a.cmp(b)
            })
    }
}

impl PartialOrd for TestQuery {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
