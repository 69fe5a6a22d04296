use crate::DefinitionError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A parameter binding: named values flowing into or out of a node.
pub type Bindings = HashMap<String, Value>;

/// Dynamic value type for process parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(j) => Some(j),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short lowercase name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Json(_) => "json",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<serde_json::Value> for Value {
    fn from(j: serde_json::Value) -> Self {
        Value::Json(j)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

/// Declared kind of a process property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ValueKind {
    Boolean,
    Number,
    /// A number without a fractional part
    Integer,
    String,
    Bytes,
    Json,
    Object,
    Any,
}

impl ValueKind {
    /// Whether a single (non-collection) value belongs to this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueKind::Any, _) => true,
            (ValueKind::Boolean, Value::Bool(_)) => true,
            (ValueKind::Number, Value::Number(_)) => true,
            (ValueKind::Integer, Value::Number(n)) => n.is_finite() && n.fract() == 0.0,
            (ValueKind::String, Value::String(_)) => true,
            (ValueKind::Bytes, Value::Bytes(_)) => true,
            (ValueKind::Json, Value::Json(_)) => true,
            (ValueKind::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::Integer => "integer",
            ValueKind::String => "string",
            ValueKind::Bytes => "bytes",
            ValueKind::Json => "json",
            ValueKind::Object => "object",
            ValueKind::Any => "any",
        };
        f.write_str(name)
    }
}

impl FromStr for ValueKind {
    type Err = DefinitionError;

    /// Accepts the type names definition loaders commonly emit.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(ValueKind::Boolean),
            "number" | "double" | "float" | "decimal" => Ok(ValueKind::Number),
            "int" | "int32" | "int64" | "integer" | "long" => Ok(ValueKind::Integer),
            "string" | "str" | "text" => Ok(ValueKind::String),
            "bytes" | "binary" => Ok(ValueKind::Bytes),
            "json" => Ok(ValueKind::Json),
            "object" | "map" => Ok(ValueKind::Object),
            "any" => Ok(ValueKind::Any),
            _ => Err(DefinitionError::UnknownKind(s.to_string())),
        }
    }
}

impl TryFrom<String> for ValueKind {
    type Error = DefinitionError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_kind_rejects_fractions() {
        assert!(ValueKind::Integer.accepts(&Value::Number(3.0)));
        assert!(!ValueKind::Integer.accepts(&Value::Number(3.5)));
        assert!(ValueKind::Number.accepts(&Value::Number(3.5)));
    }

    #[test]
    fn null_only_matches_any() {
        assert!(ValueKind::Any.accepts(&Value::Null));
        assert!(!ValueKind::String.accepts(&Value::Null));
    }

    #[test]
    fn parses_loader_type_names() {
        assert_eq!("Int32".parse::<ValueKind>().unwrap(), ValueKind::Integer);
        assert_eq!("string".parse::<ValueKind>().unwrap(), ValueKind::String);
        assert_eq!("Boolean".parse::<ValueKind>().unwrap(), ValueKind::Boolean);
        assert!(matches!(
            "uuid".parse::<ValueKind>(),
            Err(DefinitionError::UnknownKind(_))
        ));
    }
}
