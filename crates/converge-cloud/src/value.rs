//! Attribute values and attribute maps
//!
//! Declared and observed state share one shape: an ordered map from
//! attribute name to a typed [`AttrValue`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Nested record, e.g. one server definition or one node label.
pub type Record = BTreeMap<String, AttrValue>;

const FLOAT_EPSILON: f64 = 1e-9;

/// A single typed attribute value
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Float(f64),
    /// Unordered set of scalars (bound flavors, ...)
    Set(BTreeSet<String>),
    /// Ordered list of nested records (servers, labels, ...)
    List(Vec<Record>),
}

impl AttrValue {
    pub fn str(value: impl Into<String>) -> Self {
        AttrValue::Str(value.into())
    }

    pub fn set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttrValue::Set(items.into_iter().map(Into::into).collect())
    }

    /// Whether this is the zero value of its kind
    pub fn is_zero(&self) -> bool {
        match self {
            AttrValue::Str(s) => s.is_empty(),
            AttrValue::Int(i) => *i == 0,
            AttrValue::Bool(b) => !b,
            AttrValue::Float(f) => f.abs() < FLOAT_EPSILON,
            AttrValue::Set(s) => s.is_empty(),
            AttrValue::List(l) => l.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttrValue::Float(f) => Some(*f),
            AttrValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            AttrValue::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Record]> {
        match self {
            AttrValue::List(l) => Some(l),
            _ => None,
        }
    }
}

impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttrValue::Str(a), AttrValue::Str(b)) => a == b,
            (AttrValue::Int(a), AttrValue::Int(b)) => a == b,
            (AttrValue::Bool(a), AttrValue::Bool(b)) => a == b,
            (AttrValue::Float(a), AttrValue::Float(b)) => (a - b).abs() < FLOAT_EPSILON,
            (AttrValue::Set(a), AttrValue::Set(b)) => a == b,
            (AttrValue::List(a), AttrValue::List(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => write!(f, "{:?}", s),
            AttrValue::Int(i) => write!(f, "{}", i),
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::Set(s) => {
                let items: Vec<&str> = s.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", items.join(", "))
            }
            AttrValue::List(l) => write!(f, "[{} records]", l.len()),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<Vec<Record>> for AttrValue {
    fn from(value: Vec<Record>) -> Self {
        AttrValue::List(value)
    }
}

/// Declared or observed state of one resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap {
    attributes: BTreeMap<String, AttrValue>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Insert only when `value` is present; absent means "unset"
    pub fn insert_opt<V: Into<AttrValue>>(&mut self, key: impl Into<String>, value: Option<V>) {
        if let Some(value) = value {
            self.insert(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.attributes.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    /// Value of `key` unless it is absent or zero
    pub fn get_set_value(&self, key: &str) -> Option<&AttrValue> {
        self.get(key).filter(|v| !v.is_zero())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get_set_value(key).is_some()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(AttrValue::as_str).filter(|s| !s.is_empty())
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(AttrValue::as_int)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(AttrValue::as_bool).unwrap_or(false)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(AttrValue::as_float)
    }

    pub fn get_set(&self, key: &str) -> BTreeSet<String> {
        self.get(key)
            .and_then(AttrValue::as_set)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_records(&self, key: &str) -> &[Record] {
        self.get(key).and_then(AttrValue::as_list).unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl FromIterator<(String, AttrValue)> for AttributeMap {
    fn from_iter<T: IntoIterator<Item = (String, AttrValue)>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

/// Read a string field out of a nested record
pub fn record_str<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(AttrValue::as_str)
        .filter(|s| !s.is_empty())
}

/// Read an integer field out of a nested record
pub fn record_int(record: &Record, key: &str) -> Option<i64> {
    record.get(key).and_then(AttrValue::as_int)
}
