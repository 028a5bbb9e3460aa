use std::borrow::Cow;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// A value as exchanged with the remote server: filter operands on the way
/// out, record fields on the way back.
///
/// The variants mirror what JSON-RPC can carry. Odoo encodes "no value" as
/// `false`, so both [`Value::Null`] and `Value::Bool(false)` show up for
/// unset fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    /// Returns the type name used in error messages.
    pub fn type_name(&self) -> Cow<'_, str> {
        match self {
            Value::Null => Cow::Borrowed("null"),
            Value::Bool(_) => Cow::Borrowed("bool"),
            Value::Int(_) => Cow::Borrowed("int"),
            Value::Float(_) => Cow::Borrowed("float"),
            Value::String(_) => Cow::Borrowed("string"),
            Value::List(_) => Cow::Borrowed("list"),
            Value::Object(_) => Cow::Borrowed("object"),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// Scalars are everything that is neither a list nor an object.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::List(_) | Value::Object(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Reinterpret a string that spells a number as that number.
    ///
    /// Integers win over floats; anything else is returned unchanged.
    /// Lists are coerced element-wise.
    ///
    /// # Example
    /// ```rust
    /// use odootable_common::Value;
    ///
    /// assert_eq!(Value::from("42").coerce_numeric(), Value::Int(42));
    /// assert_eq!(Value::from("0.5").coerce_numeric(), Value::Float(0.5));
    /// assert_eq!(Value::from("draft").coerce_numeric(), Value::from("draft"));
    /// ```
    pub fn coerce_numeric(self) -> Value {
        match self {
            Value::String(s) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    Value::Int(i)
                } else if let Ok(f) = trimmed.parse::<f64>()
                    && f.is_finite()
                {
                    Value::Float(f)
                } else {
                    Value::String(s)
                }
            }
            Value::List(items) => Value::List(items.into_iter().map(Value::coerce_numeric).collect()),
            other => other,
        }
    }

    /// Textual form of the value for a table cell.
    ///
    /// `null` and `false` are Odoo's "unset" and render empty. A many2one
    /// pair `[id, "Name"]` renders as its display name; other lists are
    /// joined with `", "`.
    pub fn to_cell_text(&self) -> String {
        match self {
            Value::Null | Value::Bool(false) => String::new(),
            Value::Bool(true) => "True".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::List(items) => match items.as_slice() {
                [Value::Int(_), Value::String(name)] => name.clone(),
                _ => items
                    .iter()
                    .map(Value::to_cell_text)
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(", "),
            },
            Value::Object(_) => serde_json::Value::from(self).to_string(),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::List(items) => {
                let items: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Object(obj) => {
                let items: Vec<String> = obj
                    .iter()
                    .map(|(k, v)| format!("\"{}\": {}", k, v))
                    .collect();
                write!(f, "{{{}}}", items.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_json_conversion_preserves_shape() {
        let raw = json!([1, 2.5, "x", null, false, ["a", [3]], {"k": 1}]);
        let value = Value::from(raw.clone());

        match &value {
            Value::List(items) => {
                assert_eq!(items[0], Value::Int(1));
                assert_eq!(items[1], Value::Float(2.5));
                assert_eq!(items[3], Value::Null);
            }
            other => panic!("expected list, got {other:?}"),
        }
        assert_eq!(serde_json::Value::from(&value), raw);
    }

    #[test]
    fn test_cell_text_for_odoo_values() {
        assert_eq!(Value::Bool(false).to_cell_text(), "");
        assert_eq!(Value::Null.to_cell_text(), "");
        assert_eq!(Value::Bool(true).to_cell_text(), "True");
        assert_eq!(Value::Float(2.0).to_cell_text(), "2");
        assert_eq!(Value::Float(12.75).to_cell_text(), "12.75");

        let many2one = Value::List(vec![Value::Int(7), Value::from("Azure Interior")]);
        assert_eq!(many2one.to_cell_text(), "Azure Interior");

        let many2many = Value::from(vec![3i64, 4, 9]);
        assert_eq!(many2many.to_cell_text(), "3, 4, 9");
    }

    #[test]
    fn test_coerce_numeric_nested() {
        let value = Value::from(vec!["state", "=", "1"]).coerce_numeric();
        assert_eq!(
            value,
            Value::List(vec![Value::from("state"), Value::from("="), Value::Int(1)])
        );
    }
}
