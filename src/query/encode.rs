//! Query string encoding
//!
//! Parameter values are written as JSON. Values JSON cannot carry are written
//! as reserved sentinel strings. The whole query is then percent-encoded,
//! except for the characters the query syntax itself uses, so query strings
//! stay legible in URLs and on the command line.

use super::{PARAM_KV_SEPARATOR, PARAM_SEPARATOR};
use crate::params::{CaseParams, ParamValue};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde_json::Value;
use std::borrow::Cow;

const UNDEFINED_SENTINEL: &str = "_undef_";
const NAN_SENTINEL: &str = "_nan_";
const POS_INF_SENTINEL: &str = "_posinf_";
const NEG_INF_SENTINEL: &str = "_neginf_";
const NEG_ZERO_SENTINEL: &str = "_negzero_";

/// Strings that can't be used as string parameter values
pub const RESERVED_PARAM_STRINGS: [&str; 5] = [
    UNDEFINED_SENTINEL,
    NAN_SENTINEL,
    POS_INF_SENTINEL,
    NEG_INF_SENTINEL,
    NEG_ZERO_SENTINEL,
];

/// Characters a stringified parameter value must not contain
pub const BAD_PARAM_VALUE_CHARS: [char; 3] = ['=', ';', '*'];

// Largest integer an f64 represents exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// `encodeURIComponent`'s unreserved set, plus the query syntax characters
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'"')
    .remove(b',')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'[')
    .remove(b']');

/// Percent-encode, leaving the query syntax characters readable
pub fn encode_uri_component_selectively(s: &str) -> String {
    utf8_percent_encode(s, QUERY_ENCODE_SET).to_string()
}

/// Undo percent-encoding. Fails if the decoded bytes are not UTF-8.
pub fn decode_uri_component(s: &str) -> Result<Cow<'_, str>, String> {
    percent_decode_str(s)
        .decode_utf8()
        .map_err(|e| format!("invalid percent-encoding: {}", e))
}

fn number_to_json(n: f64) -> Value {
    if n.is_nan() {
        Value::from(NAN_SENTINEL)
    } else if n == f64::INFINITY {
        Value::from(POS_INF_SENTINEL)
    } else if n == f64::NEG_INFINITY {
        Value::from(NEG_INF_SENTINEL)
    } else if n == 0.0 && n.is_sign_negative() {
        Value::from(NEG_ZERO_SENTINEL)
    } else if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

/// JSON representation of a parameter value
pub fn param_value_to_json(value: &ParamValue) -> Value {
    match value {
        ParamValue::Undefined => Value::from(UNDEFINED_SENTINEL),
        ParamValue::Null => Value::Null,
        ParamValue::Bool(b) => Value::Bool(*b),
        ParamValue::Number(n) => number_to_json(*n),
        ParamValue::String(s) => Value::String(s.clone()),
        ParamValue::Array(items) => Value::Array(items.iter().map(param_value_to_json).collect()),
    }
}

/// Inverse of [`param_value_to_json`]
pub fn param_value_from_json(value: Value) -> Result<ParamValue, String> {
    Ok(match value {
        Value::Null => ParamValue::Null,
        Value::Bool(b) => ParamValue::Bool(b),
        Value::Number(n) => match n.as_f64() {
            Some(f) => ParamValue::Number(f),
            None => return Err(format!("number {} is not representable", n)),
        },
        Value::String(s) => match s.as_str() {
            UNDEFINED_SENTINEL => ParamValue::Undefined,
            NAN_SENTINEL => ParamValue::Number(f64::NAN),
            POS_INF_SENTINEL => ParamValue::Number(f64::INFINITY),
            NEG_INF_SENTINEL => ParamValue::Number(f64::NEG_INFINITY),
            NEG_ZERO_SENTINEL => ParamValue::Number(-0.0),
            _ => ParamValue::String(s),
        },
        Value::Array(items) => ParamValue::Array(
            items
                .into_iter()
                .map(param_value_from_json)
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(_) => return Err("objects are not allowed as parameter values".to_string()),
    })
}

/// Canonical (unencoded) string form of a parameter value
pub fn stringify_param_value(value: &ParamValue) -> String {
    param_value_to_json(value).to_string()
}

/// Parse the value half of a `key=value` query part
pub fn parse_param_value(s: &str) -> Result<ParamValue, String> {
    if let Some(c) = s.chars().find(|c| BAD_PARAM_VALUE_CHARS.contains(c)) {
        return Err(format!("param value must not contain '{}' - was {}", c, s));
    }
    let json: Value = serde_json::from_str(s).map_err(|e| format!("invalid JSON `{}`: {}", s, e))?;
    param_value_from_json(json)
}

/// `key=value`
pub fn stringify_single_param(key: &str, value: &ParamValue) -> String {
    format!("{}{}{}", key, PARAM_KV_SEPARATOR, stringify_param_value(value))
}

/// `k1=v1;k2=v2` over the public params, in insertion order
pub fn stringify_params(params: &CaseParams) -> String {
    params
        .public_params()
        .iter()
        .map(|(k, v)| stringify_single_param(k, v))
        .collect::<Vec<_>>()
        .join(&PARAM_SEPARATOR.to_string())
}

/// Why a value can't be used as a public parameter value, if it can't
pub fn check_public_param_value(value: &ParamValue) -> Result<(), String> {
    match value {
        ParamValue::String(s) if RESERVED_PARAM_STRINGS.contains(&s.as_str()) => {
            Err(format!("string value `{}` is reserved", s))
        }
        ParamValue::Array(items) => items.iter().try_for_each(check_public_param_value),
        _ => {
            let s = stringify_param_value(value);
            match s.chars().find(|c| BAD_PARAM_VALUE_CHARS.contains(c)) {
                Some(c) => Err(format!("value {} contains '{}'", s, c)),
                None => Ok(()),
            }
        }
    }
}
