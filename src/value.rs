//! Declared types and the coercion table shared by request and response paths.
//!
//! Every value sent to or received from an action passes through
//! [`to_wire`] or [`from_wire`], keyed by the type its argument declares in
//! the service state table.

use crate::error::{FritzError, Result};
use crate::xml::{Tree, looks_like_document};
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, SecondsFormat, TimeZone};
use log::debug;
use serde_json::json;
use std::collections::HashMap;

/// How a declared type is represented in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Integer,
    Text,
    Boolean,
    DateTime,
    Passthrough,
}

define_data_types! {
    I1 = "i1" => Integer,
    I2 = "i2" => Integer,
    I4 = "i4" => Integer,
    I8 = "i8" => Integer,
    Ui1 = "ui1" => Integer,
    Ui2 = "ui2" => Integer,
    Ui4 = "ui4" => Integer,
    Ui8 = "ui8" => Integer,
    Int = "int" => Integer,
    String = "string" => Text,
    Uuid = "uuid" => Text,
    Char = "char" => Text,
    Boolean = "boolean" => Boolean,
    DateTime = "dateTime" => DateTime,
    Date = "date" => DateTime,
}

/// A typed argument or result value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    DateTime(DateTime<FixedOffset>),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the value of a key in an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Converts to a JSON value. Date-times become RFC 3339 strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(n) => json!(n),
            Value::Bool(b) => json!(b),
            Value::Str(s) => json!(s),
            Value::DateTime(dt) => json!(dt.to_rfc3339()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n.into())
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Value::Int(n.into())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Value {
    fn from(dt: DateTime<Tz>) -> Self {
        Value::DateTime(dt.fixed_offset())
    }
}

/// Converts a caller-supplied value to its wire text for the declared type.
pub fn to_wire(argument: &str, value: &Value, data_type: &DataType) -> Result<String> {
    let invalid = |reason: &str| FritzError::InvalidArgument {
        argument: argument.to_string(),
        reason: format!("{} (declared {})", reason, data_type),
    };

    match data_type.family() {
        TypeFamily::Integer => match value {
            Value::Int(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(u8::from(*b).to_string()),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(|n| n.to_string())
                .map_err(|_| invalid("not an integer")),
            _ => Err(invalid("not an integer")),
        },
        TypeFamily::Boolean => match value {
            Value::Bool(b) => Ok(u8::from(*b).to_string()),
            Value::Int(n) => Ok(u8::from(*n != 0).to_string()),
            Value::Str(s) => Ok(u8::from(is_true(s)).to_string()),
            _ => Err(invalid("not a boolean")),
        },
        TypeFamily::DateTime => match value {
            Value::DateTime(dt) => Ok(dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
            other => passthrough(other).ok_or_else(|| invalid("not a date-time")),
        },
        TypeFamily::Text | TypeFamily::Passthrough => {
            passthrough(value).ok_or_else(|| invalid("structured value"))
        }
    }
}

fn is_true(text: &str) -> bool {
    let text = text.trim();
    text == "1" || text.eq_ignore_ascii_case("true")
}

/// Converts wire text to a typed value. Text that cannot be read as the
/// declared type is returned unchanged as a string.
pub fn from_wire(text: &str, data_type: &DataType) -> Value {
    match data_type.family() {
        TypeFamily::Integer => text
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or_else(|_| Value::Str(text.to_string())),
        TypeFamily::Boolean => Value::Bool(is_true(text)),
        TypeFamily::DateTime => {
            parse_date_time(text).map_or_else(|| Value::Str(text.to_string()), Value::DateTime)
        }
        TypeFamily::Text | TypeFamily::Passthrough => Value::Str(text.to_string()),
    }
}

/// Coerces a response node recursively. Leaves are typed by their own key
/// in `types`; keys without a declared type stay strings.
pub fn coerce_tree(tree: &Tree, types: &HashMap<String, DataType>) -> Value {
    match tree {
        Tree::Scalar(s) => Value::Str(s.clone()),
        Tree::Array(items) => Value::Array(items.iter().map(|t| coerce_tree(t, types)).collect()),
        Tree::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, node)| {
                    let value = match node {
                        Tree::Scalar(s) => match types.get(key) {
                            Some(data_type) => from_wire(s, data_type),
                            None => {
                                debug!("No data type found for: {}", key);
                                Value::Str(s.clone())
                            }
                        },
                        Tree::Array(items) if items.iter().all(|i| matches!(i, Tree::Scalar(_))) => {
                            Value::Array(
                                items
                                    .iter()
                                    .map(|i| match (i, types.get(key)) {
                                        (Tree::Scalar(s), Some(t)) => from_wire(s, t),
                                        (other, _) => coerce_tree(other, types),
                                    })
                                    .collect(),
                            )
                        }
                        other => coerce_tree(other, types),
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
    }
}

/// Coerces the value found for an output argument. Text carrying an
/// embedded XML document is parsed and typed recursively.
pub fn coerce_output(
    node: &Tree,
    data_type: Option<&DataType>,
    types: &HashMap<String, DataType>,
) -> Value {
    match node {
        Tree::Scalar(text) if looks_like_document(text) => match Tree::parse(text) {
            Ok(doc) => coerce_tree(&doc, types),
            Err(e) => {
                debug!("Embedded document did not parse ({}), keeping text", e);
                scalar(text, data_type)
            }
        },
        Tree::Scalar(text) => scalar(text, data_type),
        other => coerce_tree(other, types),
    }
}

fn scalar(text: &str, data_type: Option<&DataType>) -> Value {
    match data_type {
        Some(t) => from_wire(text, t),
        None => Value::Str(text.to_string()),
    }
}

fn passthrough(value: &Value) -> Option<String> {
    match value {
        Value::Int(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Str(s) => Some(s.clone()),
        Value::DateTime(dt) => Some(dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn parse_date_time(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    // Without an offset the appliance reports its local time
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).single())
        .map(|dt| dt.fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_table() {
        assert_eq!(DataType::from("ui2"), DataType::Ui2);
        assert_eq!(DataType::from("ui2").family(), TypeFamily::Integer);
        assert_eq!(DataType::from("uuid").family(), TypeFamily::Text);
        assert_eq!(DataType::from("dateTime").family(), TypeFamily::DateTime);
        let unknown = DataType::from("bin.base64");
        assert_eq!(unknown.family(), TypeFamily::Passthrough);
        assert_eq!(unknown.as_str(), "bin.base64");
    }

    #[test]
    fn test_integer_round_trip() {
        for n in [0i64, 1, -42, 65535, 4_294_967_295, i64::MIN] {
            let wire = to_wire("NewValue", &Value::Int(n), &DataType::I8).unwrap();
            assert_eq!(from_wire(&wire, &DataType::I8), Value::Int(n));
        }
        assert_eq!(
            to_wire("NewPort", &Value::from("443"), &DataType::Ui2).unwrap(),
            "443"
        );
    }

    #[test]
    fn test_integer_rejects_text() {
        let err = to_wire("NewPort", &Value::from("https"), &DataType::Ui2).unwrap_err();
        assert!(matches!(err, FritzError::InvalidArgument { ref argument, .. } if argument == "NewPort"));
        assert_eq!(from_wire("n/a", &DataType::Ui4), Value::Str("n/a".to_string()));
    }

    #[test]
    fn test_boolean_coercion() {
        assert_eq!(to_wire("NewEnable", &Value::Bool(true), &DataType::Boolean).unwrap(), "1");
        assert_eq!(to_wire("NewEnable", &Value::Bool(false), &DataType::Boolean).unwrap(), "0");
        assert_eq!(to_wire("NewEnable", &Value::Int(1), &DataType::Boolean).unwrap(), "1");
        assert_eq!(to_wire("NewEnable", &Value::from("0"), &DataType::Boolean).unwrap(), "0");
        assert_eq!(from_wire("1", &DataType::Boolean), Value::Bool(true));
        assert_eq!(from_wire("0", &DataType::Boolean), Value::Bool(false));
    }

    #[test]
    fn test_boolean_text_input() {
        for text in ["true", "True", "TRUE", " 1 "] {
            assert_eq!(to_wire("NewEnable", &Value::from(text), &DataType::Boolean).unwrap(), "1");
            assert_eq!(from_wire(text, &DataType::Boolean), Value::Bool(true));
        }
        for text in ["false", "0", "yes", ""] {
            assert_eq!(to_wire("NewEnable", &Value::from(text), &DataType::Boolean).unwrap(), "0");
        }
    }

    #[test]
    fn test_date_time_coercion() {
        let value = from_wire("2025-03-01T10:15:30+01:00", &DataType::DateTime);
        let Value::DateTime(dt) = &value else {
            panic!("expected date-time, got {:?}", value);
        };
        assert_eq!(dt.to_rfc3339(), "2025-03-01T10:15:30+01:00");
        assert_eq!(
            to_wire("NewTime", &value, &DataType::DateTime).unwrap(),
            "2025-03-01T10:15:30+01:00"
        );
        assert!(matches!(from_wire("2025-03-01T10:15:30", &DataType::DateTime), Value::DateTime(_)));
        assert_eq!(from_wire("never", &DataType::DateTime), Value::Str("never".to_string()));
    }

    #[test]
    fn test_unknown_type_passes_through() {
        let t = DataType::from("bin.hex");
        assert_eq!(from_wire("00ff", &t), Value::Str("00ff".to_string()));
        assert_eq!(to_wire("NewData", &Value::from("00ff"), &t).unwrap(), "00ff");
    }

    #[test]
    fn test_coerce_embedded_document() {
        let mut types = HashMap::new();
        types.insert("Index".to_string(), DataType::Ui2);
        types.insert("Enable".to_string(), DataType::Boolean);
        let node = Tree::Scalar(
            "<List><Item><Index>0</Index><Enable>1</Enable><Name>Mobil</Name></Item>\
             <Item><Index>1</Index><Enable>0</Enable><Name>Büro</Name></Item></List>"
                .to_string(),
        );
        let value = coerce_output(&node, Some(&DataType::String), &types);
        let items = match value.get("List").and_then(|l| l.get("Item")) {
            Some(Value::Array(items)) => items.clone(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(items[1].get("Index"), Some(&Value::Int(1)));
        assert_eq!(items[1].get("Enable"), Some(&Value::Bool(false)));
        assert_eq!(items[0].get("Name"), Some(&Value::from("Mobil")));
    }

    #[test]
    fn test_to_json() {
        let value = Value::Object(vec![
            ("NewEnable".to_string(), Value::Bool(true)),
            ("NewChannel".to_string(), Value::Int(6)),
        ]);
        assert_eq!(value.to_json(), json!({"NewEnable": true, "NewChannel": 6}));
    }
}
