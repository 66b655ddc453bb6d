use std::fmt;

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Visitor},
};
use thiserror::Error;

use crate::schema::Type;

/// Single row of a table. The value at index `p` belongs to the column whose position is `p`.
pub type Row = Vec<Value>;

/// Wrapper for every value that can be stored in a table or used as a literal in a query.
///
/// Literals arrive untyped (as JSON), and their type is decided once, at ingestion:
/// - a number without a fractional part (that fits into `i64`) becomes [`Value::Integer`],
/// - a string becomes [`Value::Text`],
/// - everything else is rejected.
///
/// On disk values are stored untagged, i.e. as plain JSON numbers and strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Integer(i64),
    Text(String),
}

/// Error returned when an untyped literal cannot be turned into a [`Value`].
#[derive(Error, Debug)]
#[error("unsupported literal: {0}")]
pub struct ValueError(#[from] serde_json::Error);

impl Value {
    /// Returns the [`Type`] of the column that can hold this value.
    pub fn ty(&self) -> Type {
        match self {
            Value::Integer(_) => Type::Integer,
            Value::Text(_) => Type::String,
        }
    }

    /// Ingests untyped JSON literal.
    /// Can fail if literal is neither a string nor a number without a fractional part.
    pub fn from_json(literal: serde_json::Value) -> Result<Self, ValueError> {
        Ok(Value::deserialize(literal)?)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Integer(_) => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{i}"),
            Value::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a string or a number without a fractional part")
    }

    fn visit_i64<E>(self, v: i64) -> Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Integer(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Value, E>
    where
        E: de::Error,
    {
        i64::try_from(v)
            .map(Value::Integer)
            .map_err(|_| E::custom(format!("integer {v} is out of range")))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Value, E>
    where
        E: de::Error,
    {
        // `i64::MAX as f64` rounds up to 2^63, which is already out of range.
        let in_range = v >= i64::MIN as f64 && v < i64::MAX as f64;
        match v.is_finite() && v.trunc() == v && in_range {
            true => Ok(Value::Integer(v as i64)),
            false => Err(E::invalid_value(de::Unexpected::Float(v), &self)),
        }
    }

    fn visit_str<E>(self, v: &str) -> Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Text(v.into()))
    }

    fn visit_string<E>(self, v: String) -> Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Text(v))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_integer_literals() {
        assert_eq!(Value::from_json(json!(42)).unwrap(), Value::Integer(42));
        assert_eq!(Value::from_json(json!(-7)).unwrap(), Value::Integer(-7));
        // numbers without fractional part are integers, no matter how they were written
        assert_eq!(Value::from_json(json!(3.0)).unwrap(), Value::Integer(3));
        let parsed: Value = serde_json::from_str("1e3").unwrap();
        assert_eq!(parsed, Value::Integer(1000));
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(
            Value::from_json(json!("Earth")).unwrap(),
            Value::Text("Earth".into())
        );
        // numeric-looking strings stay strings
        assert_eq!(Value::from_json(json!("1")).unwrap().ty(), Type::String);
    }

    #[test]
    fn test_unsupported_literals() {
        assert!(Value::from_json(json!(1.5)).is_err());
        assert!(Value::from_json(json!(true)).is_err());
        assert!(Value::from_json(json!(null)).is_err());
        assert!(Value::from_json(json!([1])).is_err());
        assert!(Value::from_json(json!({"a": 1})).is_err());
        assert!(Value::from_json(json!(u64::MAX)).is_err());
    }

    #[test]
    fn test_row_is_stored_as_plain_json() {
        let row: Row = vec![Value::Integer(1), Value::Text("Mercury".into())];
        let encoded = serde_json::to_string(&row).unwrap();
        assert_eq!(encoded, r#"[1,"Mercury"]"#);

        let decoded: Row = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn test_value_type() {
        assert_eq!(Value::from(5i64).ty(), Type::Integer);
        assert_eq!(Value::from("x").ty(), Type::String);
        assert_eq!(Value::from(5i64).as_integer(), Some(5));
        assert_eq!(Value::from("x").as_text(), Some("x"));
        assert_eq!(Value::from("x").as_integer(), None);
    }
}
