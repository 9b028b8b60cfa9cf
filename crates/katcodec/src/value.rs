//! Decoded object graph.
//!
//! [`Value`] is what every decode produces: a dynamically typed tree whose
//! composite variants mirror the builder node kinds (list, tuple, record,
//! map) and whose leaves are the scalars the built-in adapters decode.

use std::collections::BTreeMap;

pub type Map = BTreeMap<String, Value>;
pub type List = Vec<Value>;

/// A decoded value.
///
/// # Examples
///
/// ```
/// use katcodec::{Record, Value};
///
/// let mut user = Record::new("User");
/// user.insert("id", Value::Int(1));
/// user.insert("name", "kraity");
///
/// let v = Value::Record(user);
/// assert_eq!(v.get("id").and_then(Value::as_int), Some(1));
/// assert_eq!(v.get("name").and_then(Value::as_str), Some("kraity"));
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(List),
    Tuple(List),
    Record(Record),
    Map(Map),
}

/// A named record with its decoded fields.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    pub name: String,
    pub fields: Map,
}

impl Record {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Map::new(),
        }
    }

    /// Sets `field`, replacing any earlier value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<Map> for Value {
    fn from(v: Map) -> Self {
        Self::Map(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Self::Record(v)
    }
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record(..))
    }

    /// Returns `true` for lists and tuples.
    #[must_use]
    pub fn is_sequence(&self) -> bool {
        matches!(self, Self::List(..) | Self::Tuple(..))
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, and integers widened to floats.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of a list or tuple.
    #[must_use]
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) | Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Looks up a record field or map entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Record(record) => record.get(key),
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_variants() {
        assert!(Value::default().is_null());
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(7).as_float(), Some(7.0));
        assert_eq!(Value::from("kat").as_str(), Some("kat"));
        assert!(Value::Tuple(vec![Value::Null]).is_sequence());
        assert_eq!(Value::from(1).as_str(), None);
    }

    #[test]
    fn map_and_record_lookup() {
        let mut map = Map::new();
        map.insert("k".into(), Value::from(1));
        assert_eq!(Value::from(map).get("k"), Some(&Value::Int(1)));

        let mut record = Record::new("User");
        record.insert("name", "kraity");
        let v = Value::from(record);
        assert!(v.is_record());
        assert_eq!(v.get("name").and_then(Value::as_str), Some("kraity"));
        assert_eq!(v.get("missing"), None);
    }
}
