//! Typing and coercion of raw values into rule values.

use crate::ast::ScalarValue;
use crate::error::{CompileError, Result};
use crate::rule::Operator;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Textual form every date/time value is normalised to.
pub const CANONICAL_DATE_TIME: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Literal,
    Numeric,
    DateTime,
    Object,
}

/// A value ready to be placed in a rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    Literal(String),
    Integer(i64),
    Float(f64),
    /// Canonical `%Y-%m-%dT%H:%M:%S` text.
    DateTime(String),
    /// Reference to another object, usually a URI.
    Object(String),
    /// An open range bound.
    Null,
}

impl TypedValue {
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            TypedValue::Literal(_) => Some(ValueType::Literal),
            TypedValue::Integer(_) | TypedValue::Float(_) => Some(ValueType::Numeric),
            TypedValue::DateTime(_) => Some(ValueType::DateTime),
            TypedValue::Object(_) => Some(ValueType::Object),
            TypedValue::Null => None,
        }
    }

    /// Object references are assigned rather than compared.
    pub fn operator_hint(&self) -> Option<Operator> {
        match self {
            TypedValue::Object(_) => Some(Operator::SetTo),
            _ => None,
        }
    }

    pub fn date_time(dt: &NaiveDateTime) -> Self {
        TypedValue::DateTime(dt.format(CANONICAL_DATE_TIME).to_string())
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Literal(s) | TypedValue::DateTime(s) | TypedValue::Object(s) => write!(f, "{s}"),
            TypedValue::Integer(n) => write!(f, "{n}"),
            TypedValue::Float(x) => write!(f, "{x}"),
            TypedValue::Null => write!(f, "*"),
        }
    }
}

/// A string looks like a reference when it holds an unescaped `:` or `#`
/// anywhere but the first position.
pub fn looks_like_reference(s: &str) -> bool {
    let mut previous = None;
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (c == ':' || c == '#') && previous != Some('\\') {
            return true;
        }
        previous = Some(c);
    }
    false
}

/// Tags a raw value purely from its shape.
pub fn typify(field: &str, value: &ScalarValue) -> Result<TypedValue> {
    match value {
        ScalarValue::String(s) if looks_like_reference(s) => Ok(TypedValue::Object(s.clone())),
        ScalarValue::String(s) => Ok(TypedValue::Literal(s.clone())),
        ScalarValue::Boolean(b) => Ok(TypedValue::Literal(b.to_string())),
        ScalarValue::Integer(n) => Ok(TypedValue::Integer(*n)),
        ScalarValue::Float(x) if x.is_finite() => Ok(TypedValue::Float(*x)),
        ScalarValue::Date(dt) => Ok(TypedValue::date_time(dt)),
        // Null only exists as an open range bound, which never reaches here.
        ScalarValue::Float(_) | ScalarValue::Null | ScalarValue::List(_) => Err(CompileError::UnsupportedValue {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

/// The externally configured date pattern, in chrono `strftime` syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateFormat {
    pub pattern: String,
}

impl Default for DateFormat {
    fn default() -> Self {
        Self { pattern: "%Y-%m-%d".to_string() }
    }
}

impl DateFormat {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self { pattern: pattern.into() }
    }

    /// Parses `text` as a date/time; date-only patterns yield midnight.
    pub fn parse(&self, text: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
        NaiveDateTime::parse_from_str(text, &self.pattern).or_else(|_| {
            NaiveDate::parse_from_str(text, &self.pattern).map(|d| d.and_time(NaiveTime::MIN))
        })
    }

    pub fn format(&self, dt: &NaiveDateTime) -> String {
        dt.format(&self.pattern).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> ScalarValue {
        ScalarValue::String(v.to_string())
    }

    #[test]
    fn test_reference_heuristic() {
        assert!(looks_like_reference("http://example.org/x"));
        assert!(looks_like_reference("doc#section"));
        assert!(!looks_like_reference("#tag"));
        assert!(!looks_like_reference(":leading"));
        assert!(!looks_like_reference(r"a\:b"));
        assert!(!looks_like_reference("plain"));
    }

    #[test]
    fn test_typify_shapes() {
        assert_eq!(typify("f", &s("Bob")).unwrap(), TypedValue::Literal("Bob".to_string()));
        assert_eq!(typify("f", &s("urn:x")).unwrap(), TypedValue::Object("urn:x".to_string()));
        assert_eq!(
            typify("f", &ScalarValue::Boolean(true)).unwrap(),
            TypedValue::Literal("true".to_string())
        );
        assert_eq!(typify("f", &ScalarValue::Integer(7)).unwrap(), TypedValue::Integer(7));
        assert_eq!(typify("f", &ScalarValue::Float(1.5)).unwrap(), TypedValue::Float(1.5));
    }

    #[test]
    fn test_typify_rejects_null_and_non_finite() {
        for value in [ScalarValue::Null, ScalarValue::Float(f64::NAN), ScalarValue::Float(f64::INFINITY)] {
            let err = typify("f", &value).unwrap_err();
            assert!(matches!(err, CompileError::UnsupportedValue { .. }), "{value} should be rejected");
        }
    }

    #[test]
    fn test_typify_date_is_canonical() {
        let dt = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap().and_hms_opt(3, 4, 5).unwrap();
        assert_eq!(
            typify("f", &ScalarValue::Date(dt)).unwrap(),
            TypedValue::DateTime("2020-01-02T03:04:05".to_string())
        );
    }

    #[test]
    fn test_typify_rejects_nested_lists() {
        let err = typify("tags", &ScalarValue::List(vec![s("a")])).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedValue { ref field, .. } if field == "tags"));
    }

    #[test]
    fn test_date_format_date_only() {
        let format = DateFormat::default();
        let dt = format.parse("2020-12-31").unwrap();
        assert_eq!(dt, NaiveDate::from_ymd_opt(2020, 12, 31).unwrap().and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(format.format(&dt), "2020-12-31");
        assert!(format.parse("yesterday").is_err());
    }

    #[test]
    fn test_date_format_with_time() {
        let format = DateFormat::new("%d/%m/%Y %H:%M");
        let dt = format.parse("31/12/2020 10:30").unwrap();
        assert_eq!(TypedValue::date_time(&dt), TypedValue::DateTime("2020-12-31T10:30:00".to_string()));
    }

    #[test]
    fn test_value_types() {
        assert_eq!(TypedValue::Float(1.0).value_type(), Some(ValueType::Numeric));
        assert_eq!(TypedValue::Null.value_type(), None);
        assert_eq!(TypedValue::Object("a:b".into()).operator_hint(), Some(Operator::SetTo));
        assert_eq!(TypedValue::Literal("a".into()).operator_hint(), None);
    }
}
