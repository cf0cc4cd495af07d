#![forbid(unsafe_code)]

//! Keys and small helpers over the `serde_json` value model.
//!
//! Object graphs are plain JSON trees: objects and arrays are containers that
//! can be intercepted, strings/numbers/booleans are primitives, and `null`
//! stands in for a void value.

use std::borrow::Cow;
use std::fmt;

use serde_json::Value;

/// Address of one member of a container.
///
/// Like property access on a dynamic object, an [`Index`](Key::Index) used on
/// a map resolves to the decimal field name, so `Key::Index(0)` and
/// `Key::Field("0".into())` name the same map entry.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Map field access: `{"key": value}`
    Field(String),
    /// Array element access: `[index]`
    Index(usize),
}

impl Key {
    #[inline]
    pub fn field(name: impl Into<String>) -> Self {
        Key::Field(name.into())
    }

    #[inline]
    pub fn index(i: usize) -> Self {
        Key::Index(i)
    }

    /// Field name used when this key addresses a map.
    pub fn as_field(&self) -> Cow<'_, str> {
        match self {
            Key::Field(name) => Cow::Borrowed(name),
            Key::Index(i) => Cow::Owned(i.to_string()),
        }
    }

    /// Element index used when this key addresses an array.
    ///
    /// Numeric field names are accepted, mirroring `arr["2"]`.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => Some(*i),
            Key::Field(name) => name.parse().ok(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => write!(f, ".{name}"),
            Key::Index(i) => write!(f, "[{i}]"),
        }
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Field(s)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Field(s.to_owned())
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::Field(s.clone())
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

/// Whether `value` is an interceptable container (object or array).
#[inline]
pub fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// Whether `value` is a primitive that must be boxed before observation.
#[inline]
pub fn is_primitive(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

pub(crate) fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
