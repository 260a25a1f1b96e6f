//! The data model the engine tracks.
//!
//! A [`Value`] is either a primitive, a [`Plain`] composite that nobody
//! observes yet, or an [`Observed`] composite owned by an observer. Whether a
//! composite is observed is decided by pattern matching on the variant; there
//! is no hidden marker to check for.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::observer::Observed;

/// One step of a route: an object property name or an array index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// Array position, composed as `parent[i]`.
    Index(usize),
    /// Object property, composed as `parent.name`.
    Name(Arc<str>),
}

impl Key {
    /// The index, if this is an array key.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => Some(*i),
            Key::Name(_) => None,
        }
    }

    /// The property name, if this is an object key.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Key::Name(name) => Some(name),
            Key::Index(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(i) => write!(f, "{i}"),
            Key::Name(name) => f.write_str(name),
        }
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(Arc::from(name))
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(Arc::from(name))
    }
}

impl From<Arc<str>> for Key {
    fn from(name: Arc<str>) -> Self {
        Key::Name(name)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

/// A composite that has not been attached to an observer.
#[derive(Clone, Debug, PartialEq)]
pub enum Plain {
    /// Insertion-ordered object.
    Object(IndexMap<Arc<str>, Value>),
    /// Array.
    Array(Vec<Value>),
}

/// A node of the data tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// Absent or explicitly null.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Number (IEEE-754 double).
    Number(f64),
    /// String.
    String(Arc<str>),
    /// Composite not yet observed.
    Plain(Plain),
    /// Composite owned by an observer. Compared by identity.
    Observed(Observed),
}

impl Value {
    /// Build a plain object from key/value pairs.
    pub fn object<K, V, I>(entries: I) -> Value
    where
        K: Into<Arc<str>>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Plain(Plain::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    /// Build a plain array from items.
    pub fn array<V, I>(items: I) -> Value
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::Plain(Plain::Array(items.into_iter().map(Into::into).collect()))
    }

    /// Objects and arrays, observed or not.
    pub fn is_composite(&self) -> bool {
        matches!(self, Value::Plain(_) | Value::Observed(_))
    }

    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The observer handle, if this value is observed.
    pub fn as_observed(&self) -> Option<&Observed> {
        match self {
            Value::Observed(ob) => Some(ob),
            _ => None,
        }
    }

    /// The number, if this is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Short name of the value's kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Plain(Plain::Object(_)) => "object",
            Value::Plain(Plain::Array(_)) => "array",
            Value::Observed(ob) if ob.is_array() => "array",
            Value::Observed(_) => "object",
        }
    }

    /// SameValueZero: `NaN` equals `NaN`, `+0` equals `-0`, composites compare
    /// by identity. Two plain composites are never the same value.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Observed(a), Value::Observed(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Untracked JSON snapshot of this value.
    ///
    /// Non-finite numbers become `null`, matching how JSON hosts serialize them.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Plain(Plain::Object(map)) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.to_string(), v.to_json())).collect(),
            ),
            Value::Plain(Plain::Array(items)) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Observed(ob) => ob.to_json(),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Value::Number(_) => serializer.serialize_unit(),
            Value::String(s) => serializer.serialize_str(s),
            Value::Plain(Plain::Object(map)) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(&**k, v)?;
                }
                out.end()
            }
            Value::Plain(Plain::Array(items)) => {
                let mut out = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    out.serialize_element(item)?;
                }
                out.end()
            }
            Value::Observed(ob) => ob.serialize(serializer),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(s)
    }
}

impl From<Observed> for Value {
    fn from(ob: Observed) -> Self {
        Value::Observed(ob)
    }
}

impl From<Plain> for Value {
    fn from(plain: Plain) -> Self {
        Value::Plain(plain)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(Arc::from(s)),
            serde_json::Value::Array(items) => {
                Value::Plain(Plain::Array(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(map) => Value::Plain(Plain::Object(
                map.into_iter()
                    .map(|(k, v)| (Arc::from(k), Value::from(v)))
                    .collect(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_value_zero_treats_nan_and_signed_zero_as_equal() {
        assert!(Value::from(f64::NAN).same_value_zero(&Value::from(f64::NAN)));
        assert!(Value::from(0.0).same_value_zero(&Value::from(-0.0)));
        assert!(!Value::from(1).same_value_zero(&Value::from("1")));
        assert!(!Value::Null.same_value_zero(&Value::Bool(false)));
    }

    #[test]
    fn plain_composites_are_never_the_same_value() {
        let a = Value::array([1, 2]);
        let b = a.clone();
        assert!(!a.same_value_zero(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn json_conversion_keeps_object_order() {
        let value = Value::from(json!({"z": 1, "a": [true, null, "s"]}));
        assert_eq!(value.kind_name(), "object");
        assert_eq!(value.to_json(), json!({"z": 1.0, "a": [true, null, "s"]}));
        match value {
            Value::Plain(Plain::Object(map)) => {
                let keys: Vec<&str> = map.keys().map(|k| &**k).collect();
                assert_eq!(keys, ["z", "a"]);
            }
            other => panic!("expected plain object, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_numbers_serialize_as_null() {
        let value = Value::array([Value::from(f64::INFINITY), Value::from(2.5)]);
        assert_eq!(serde_json::to_string(&value).unwrap(), "[null,2.5]");
        assert_eq!(value.to_json(), json!([null, 2.5]));
    }

    #[test]
    fn key_display_and_accessors() {
        assert_eq!(Key::from(3usize).to_string(), "3");
        assert_eq!(Key::from("name").as_name(), Some("name"));
        assert_eq!(Key::from("name").as_index(), None);
    }
}
