//! Typed output values and `dataType`-driven coercion.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDateTime};
use thiserror::Error;

/// A decoded output argument. The UPnP scalar families collapse onto six
/// native shapes; the owning service's state table decides which applies.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
}

impl ActionValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ActionValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ActionValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ActionValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ActionValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ActionValue::Bytes(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("cannot read '{value}' as UPnP type '{data_type}'")]
pub struct CoerceError {
    pub data_type: String,
    pub value: String,
}

/// Coerces `text` according to a state variable's `dataType`. Unknown
/// types and unparseable values both fail; the dispatcher turns that into
/// its coercion error with the argument name attached.
pub fn coerce_value(data_type: &str, text: &str) -> Result<ActionValue, CoerceError> {
    let fail = || CoerceError {
        data_type: data_type.to_string(),
        value: text.to_string(),
    };
    let text = text.trim();
    match data_type.to_ascii_lowercase().as_str() {
        "ui1" | "ui2" | "ui4" | "i1" | "i2" | "i4" | "int" => {
            text.parse::<i64>().map(ActionValue::Int).map_err(|_| fail())
        }
        "r4" | "r8" | "number" | "fixed.14.4" | "float" => {
            text.parse::<f64>().map(ActionValue::Float).map_err(|_| fail())
        }
        "char" | "string" | "uuid" => Ok(ActionValue::Text(text.to_string())),
        "boolean" => match text.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(ActionValue::Bool(true)),
            "0" | "false" | "no" => Ok(ActionValue::Bool(false)),
            _ => Err(fail()),
        },
        "bin.base64" => STANDARD.decode(text).map(ActionValue::Bytes).map_err(|_| fail()),
        "datetime" | "datetime.tz" => parse_datetime(text).ok_or_else(fail),
        _ => Err(fail()),
    }
}

fn parse_datetime(text: &str) -> Option<ActionValue> {
    // RFC 3339 first; devices with clocks and time zones use it.
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(ActionValue::DateTime(dt.naive_local()));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ActionValue::DateTime(dt));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    #[test]
    fn integer_family_coerces_to_i64() {
        for data_type in ["ui1", "ui2", "ui4", "i1", "i2", "i4", "int"] {
            assert_eq!(coerce_value(data_type, "42").unwrap(), ActionValue::Int(42));
        }
    }

    #[test]
    fn negative_integers_parse() {
        assert_eq!(coerce_value("i2", "-7").unwrap(), ActionValue::Int(-7));
    }

    #[test]
    fn float_family_coerces_to_f64() {
        for data_type in ["r4", "r8", "number", "fixed.14.4", "float"] {
            assert_eq!(
                coerce_value(data_type, "3.5").unwrap(),
                ActionValue::Float(3.5)
            );
        }
    }

    #[test]
    fn string_family_keeps_text() {
        assert_eq!(
            coerce_value("string", "hello").unwrap(),
            ActionValue::Text("hello".into())
        );
        assert_eq!(
            coerce_value("uuid", "abc-123").unwrap(),
            ActionValue::Text("abc-123".into())
        );
        assert_eq!(coerce_value("string", "").unwrap(), ActionValue::Text(String::new()));
    }

    #[test]
    fn boolean_accepts_every_spelled_form() {
        for text in ["1", "true", "yes", "TRUE", "Yes"] {
            assert_eq!(coerce_value("boolean", text).unwrap(), ActionValue::Bool(true));
        }
        for text in ["0", "false", "no", "False", "NO"] {
            assert_eq!(coerce_value("boolean", text).unwrap(), ActionValue::Bool(false));
        }
        assert!(coerce_value("boolean", "2").is_err());
    }

    #[test]
    fn base64_decodes_to_bytes() {
        assert_eq!(
            coerce_value("bin.base64", "aGVsbG8=").unwrap(),
            ActionValue::Bytes(b"hello".to_vec())
        );
        assert!(coerce_value("bin.base64", "not base64!!").is_err());
    }

    #[test]
    fn datetime_accepts_iso8601_with_and_without_offset() {
        let expected: NaiveDateTime = NaiveDate::from_ymd_opt(2026, 8, 2)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(
            coerce_value("dateTime", "2026-08-02T10:30:00").unwrap(),
            ActionValue::DateTime(expected)
        );
        assert_eq!(
            coerce_value("dateTime", "2026-08-02T10:30:00+02:00").unwrap(),
            ActionValue::DateTime(expected)
        );
        assert!(coerce_value("dateTime", "last tuesday").is_err());
    }

    #[test]
    fn unknown_types_and_bad_values_fail() {
        assert!(coerce_value("gizmo", "1").is_err());
        assert!(coerce_value("ui2", "forty-two").is_err());
        let err = coerce_value("ui2", "forty-two").unwrap_err();
        assert_eq!(err.data_type, "ui2");
        assert_eq!(err.value, "forty-two");
    }
}
