//! Parameter values
//!
//! A `ParamValue` is anything that can appear on the right-hand side of
//! `key=value` in a case query: JSON scalars, arrays of them, and an explicit
//! `Undefined` (JSON has no such value, so it travels as a sentinel string).

use std::fmt;

/// A single parameter value
#[derive(Debug, Clone)]
pub enum ParamValue {
    /// Absent value, distinct from `Null`
    Undefined,
    /// JSON `null`
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ParamValue>),
}

impl ParamValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The value as an integer, if it is a number with no fractional part
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ParamValue]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Human-readable type name, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
        }
    }
}

/// Numbers compare like `Object.is`: NaN equals NaN, and 0 differs from -0.
fn numbers_equal(a: f64, b: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    a == b && a.is_sign_negative() == b.is_sign_negative()
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => numbers_equal(*a, *b),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ParamValue {}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::query::stringify_param_value(self))
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ParamValue {
                fn from(n: $t) -> Self {
                    Self::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64);

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ParamValue>, const N: usize> From<[T; N]> for ParamValue {
    fn from(v: [T; N]) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Undefined, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_equality_is_object_is() {
        assert_eq!(ParamValue::Number(f64::NAN), ParamValue::Number(f64::NAN));
        assert_ne!(ParamValue::Number(0.0), ParamValue::Number(-0.0));
        assert_eq!(ParamValue::from(12), ParamValue::Number(12.0));
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(ParamValue::from(None::<u32>), ParamValue::Undefined);
        assert_eq!(ParamValue::from(Some(true)), ParamValue::Bool(true));
        assert_eq!(
            ParamValue::from([1, 2]),
            ParamValue::Array(vec![ParamValue::Number(1.0), ParamValue::Number(2.0)])
        );
        assert_eq!(ParamValue::from("rgba8unorm").as_str(), Some("rgba8unorm"));
    }

    #[test]
    fn test_as_i64_rejects_fractions() {
        assert_eq!(ParamValue::Number(524288.0).as_i64(), Some(524288));
        assert_eq!(ParamValue::Number(0.5).as_i64(), None);
        assert_eq!(ParamValue::Bool(true).as_i64(), None);
    }

    #[test]
    fn test_display_is_json() {
        assert_eq!(ParamValue::from(vec![1, 2]).to_string(), "[1,2]");
        assert_eq!(ParamValue::Undefined.to_string(), "\"_undef_\"");
    }
}
