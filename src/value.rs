//! Dynamic values carried by trigger configuration documents.
//!
//! Registration requests arrive as untyped nested documents. `Value` is the
//! tagged representation used everywhere before (and around) the typed config
//! structs: narrowing accessors return a [`ValueError`] instead of panicking on
//! a type mismatch.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// String-keyed map of values with deterministic (sorted) key order.
pub type ValueMap = BTreeMap<String, Value>;

/// A dynamically typed configuration value.
///
/// Serializes as plain JSON, so a document round-trips unchanged through
/// `serde_json`.
///
/// # Examples
///
/// ```
/// use logevent::Value;
///
/// let v: Value = serde_json::from_str(r#"{"contracts": [], "n": 1}"#).unwrap();
/// let map = v.as_map().unwrap();
/// assert!(map["contracts"].is_list());
/// assert_eq!(map["n"].as_int().unwrap(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    /// Integers above `i64::MAX`.
    UInt(u64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(ValueMap),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    /// True for `Int` and `UInt`.
    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int(_) | Self::UInt(_))
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float(_))
    }

    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    pub const fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    pub const fn as_bool(&self) -> Result<bool, ValueError> {
        match self {
            Self::Bool(v) => Ok(*v),
            other => Err(other.wrong_type("bool")),
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    pub const fn as_int(&self) -> Result<i64, ValueError> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::UInt(v) if *v <= i64::MAX as u64 => Ok(*v as i64),
            other => Err(other.wrong_type("int")),
        }
    }

    /// Reads a number as `f64`; integers are widened.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Result<f64, ValueError> {
        match self {
            Self::Float(v) => Ok(*v),
            Self::Int(v) => Ok(*v as f64),
            Self::UInt(v) => Ok(*v as f64),
            other => Err(other.wrong_type("float")),
        }
    }

    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            Self::String(v) => Ok(v),
            other => Err(other.wrong_type("string")),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], ValueError> {
        match self {
            Self::List(v) => Ok(v),
            other => Err(other.wrong_type("list")),
        }
    }

    pub const fn as_map(&self) -> Result<&ValueMap, ValueError> {
        match self {
            Self::Map(v) => Ok(v),
            other => Err(other.wrong_type("map")),
        }
    }

    /// Consumes the value and returns the inner map.
    pub fn into_map(self) -> Result<ValueMap, ValueError> {
        match self {
            Self::Map(v) => Ok(v),
            other => Err(other.wrong_type("map")),
        }
    }

    /// Walks nested maps along `path`, returning `None` at the first missing
    /// key or non-map intermediate.
    #[must_use]
    pub fn lookup(&self, path: &[&str]) -> Option<&Value> {
        let mut current = self;
        for key in path {
            current = match current {
                Self::Map(m) => m.get(*key)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    const fn wrong_type(&self, expected: &'static str) -> ValueError {
        ValueError::WrongType {
            expected,
            actual: self.type_name(),
        }
    }

    /// Wraps any serializable value.
    pub fn wrap<T: Serialize + ?Sized>(value: &T) -> Result<Self, ValueError> {
        serde_json::to_value(value)
            .map(Self::from)
            .map_err(|e| ValueError::Conversion {
                message: e.to_string(),
            })
    }

    /// Deserializes this value into a typed struct.
    pub fn unwrap_to<T: DeserializeOwned>(&self) -> Result<T, ValueError> {
        serde_json::from_value(serde_json::Value::from(self.clone())).map_err(|e| {
            ValueError::Conversion {
                message: e.to_string(),
            }
        })
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", serde_json::Value::from(self.clone()))
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    n.as_f64().map_or(Self::Null, Self::Float)
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Int(i) => Self::from(i),
            Value::UInt(u) => Self::from(u),
            // Non-finite floats have no JSON form.
            Value::Float(f) => serde_json::Number::from_f64(f).map_or(Self::Null, Self::Number),
            Value::String(s) => Self::String(s),
            Value::List(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Map(map) => Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(Self::UInt(v), Self::Int)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<ValueMap> for Value {
    fn from(v: ValueMap) -> Self {
        Self::Map(v)
    }
}
