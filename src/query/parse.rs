//! Query string parsing

use super::{
    BIG_SEPARATOR, PARAM_KV_SEPARATOR, PARAM_SEPARATOR, PATH_SEPARATOR, QueryLevel, TestQuery,
    WILDCARD, decode_uri_component, is_valid_query_part, parse_param_value,
};
use crate::params::{CaseParams, param_key_is_public};
use crate::utils::QueryError;

/// Parse a (possibly percent-encoded) query string
pub fn parse_query(s: &str) -> Result<TestQuery, QueryError> {
    parse_query_impl(s).map_err(|message| QueryError::syntax(message, s))
}

fn parse_query_impl(s: &str) -> Result<TestQuery, String> {
    let decoded = decode_uri_component(s)?;

    // suite, group, test, params (params may themselves contain ':')
    let big_parts: Vec<&str> = decoded.splitn(4, BIG_SEPARATOR).collect();
    if big_parts.len() < 2 {
        return Err(format!("query must have at least one '{}'", BIG_SEPARATOR));
    }
    let suite = big_parts[0];
    if suite.is_empty() {
        return Err("query must specify a suite".to_string());
    }

    let (group, group_has_wildcard) = parse_big_part(big_parts[1], PATH_SEPARATOR)?;
    if big_parts.len() == 2 {
        if !group_has_wildcard {
            return Err(format!(
                "group-level query without wildcard {w}. Did you want a group-level query \
                 (append {p}{w}) or a test-level query (append {b}{w})?",
                w = WILDCARD,
                p = PATH_SEPARATOR,
                b = BIG_SEPARATOR
            ));
        }
        return TestQuery::multi_group(suite, group).map_err(|e| e.to_string());
    }
    if group_has_wildcard {
        return Err(format!("wildcard {} must be at the end of the query string", WILDCARD));
    }
    if group.is_empty() {
        return Err("group part of a test-level query was empty (::)".to_string());
    }

    let (test, test_has_wildcard) = parse_big_part(big_parts[2], PATH_SEPARATOR)?;
    if big_parts.len() == 3 {
        if !test_has_wildcard {
            return Err(format!(
                "test-level query without wildcard {w}. Did you want a test-level query \
                 (append {p}{w}) or a case-level query (append {b}{w})?",
                w = WILDCARD,
                p = PATH_SEPARATOR,
                b = BIG_SEPARATOR
            ));
        }
        return TestQuery::multi_test(suite, group, test).map_err(|e| e.to_string());
    }
    if test_has_wildcard {
        return Err(format!("wildcard {} must be at the end of the query string", WILDCARD));
    }
    if test.is_empty() {
        return Err("test part of a case-level query was empty (::)".to_string());
    }

    let (param_parts, params_have_wildcard) = parse_big_part(big_parts[3], PARAM_SEPARATOR)?;
    let mut params = CaseParams::new();
    for part in &param_parts {
        let (k, v) = parse_single_param(part)?;
        if params.contains_key(&k) {
            return Err(format!("duplicate param key `{}`", k));
        }
        params.insert(k, v);
    }

    let level = if params_have_wildcard {
        QueryLevel::MultiCase
    } else {
        QueryLevel::SingleCase
    };
    match level {
        QueryLevel::MultiCase => TestQuery::multi_case(suite, group, test, params),
        _ => TestQuery::single_case(suite, group, test, params),
    }
    .map_err(|e| e.to_string())
}

/// Split one `:`-delimited section. Returns the parts and whether the section
/// ended in a complete wildcard part (which is removed).
fn parse_big_part(s: &str, separator: char) -> Result<(Vec<String>, bool), String> {
    if s.is_empty() {
        return Ok((Vec::new(), false));
    }
    let mut parts: Vec<String> = s.split(separator).map(str::to_string).collect();
    let last = parts.len() - 1;
    let ends_with_wildcard = parts[last] == WILDCARD.to_string();
    for (i, part) in parts.iter().enumerate() {
        if part.contains(WILDCARD) && !(i == last && ends_with_wildcard) {
            return Err(format!(
                "wildcard {w} must be the complete last part of a path \
                 (e.g. suite{b}a{p}b{p}{w} or suite{b}a{p}b{b}c{p}{w})",
                w = WILDCARD,
                b = BIG_SEPARATOR,
                p = PATH_SEPARATOR
            ));
        }
    }
    if ends_with_wildcard {
        parts.pop();
    }
    Ok((parts, ends_with_wildcard))
}

fn parse_single_param(s: &str) -> Result<(String, crate::params::ParamValue), String> {
    if s.is_empty() {
        return Err("param in a query must not be blank (is there a trailing separator?)".to_string());
    }
    let Some((k, v)) = s.split_once(PARAM_KV_SEPARATOR) else {
        return Err(format!("param in a query must be of form key{}value", PARAM_KV_SEPARATOR));
    };
    if !is_valid_query_part(k) {
        return Err(format!("param key `{}` must match [a-zA-Z0-9_]+", k));
    }
    if !param_key_is_public(k) {
        return Err(format!("param `{}` in a query must not be private (start with _)", k));
    }
    Ok((k.to_string(), parse_param_value(v)?))
}
