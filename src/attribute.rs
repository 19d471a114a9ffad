//! Candidate records and attribute lookup used by filter matching.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A single attribute value on a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Text(String),
}

impl Scalar {
    /// Bytes used for equality and substring tests. Booleans use the LDAP
    /// Boolean syntax (`TRUE` / `FALSE`).
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Scalar::Bool(true) => b"TRUE".to_vec(),
            Scalar::Bool(false) => b"FALSE".to_vec(),
            Scalar::Integer(n) => n.to_string().into_bytes(),
            Scalar::Text(s) => s.as_bytes().to_vec(),
        }
    }

    /// Order this value against an assertion value. Integers compare
    /// numerically when the assertion also parses as an integer, everything
    /// else compares bytewise.
    pub fn compare(&self, assertion: &[u8]) -> Ordering {
        if let Scalar::Integer(n) = self {
            if let Some(other) = std::str::from_utf8(assertion)
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
            {
                return n.cmp(&other);
            }
        }
        self.to_bytes().as_slice().cmp(assertion)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(true) => f.write_str("TRUE"),
            Scalar::Bool(false) => f.write_str("FALSE"),
            Scalar::Integer(n) => write!(f, "{}", n),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Integer(n)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// What an attribute name resolves to: nothing (explicit null), one value,
/// or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    One(Scalar),
    Many(Vec<Scalar>),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

macro_rules! attribute_value_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for AttributeValue {
                fn from(v: $t) -> Self {
                    AttributeValue::One(v.into())
                }
            }

            impl From<Vec<$t>> for AttributeValue {
                fn from(v: Vec<$t>) -> Self {
                    AttributeValue::Many(v.into_iter().map(Into::into).collect())
                }
            }
        )*
    };
}

attribute_value_from!(&str, String, i64, bool);

impl From<Scalar> for AttributeValue {
    fn from(v: Scalar) -> Self {
        AttributeValue::One(v)
    }
}

impl From<Vec<Scalar>> for AttributeValue {
    fn from(v: Vec<Scalar>) -> Self {
        AttributeValue::Many(v)
    }
}

/// A candidate record: attribute name to value(s).
///
/// Keys are kept in a `BTreeMap`, so case-insensitive lookup scans keys in
/// sorted order and always picks the same key for a given record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    attrs: BTreeMap<String, AttributeValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attrs.insert(name.into(), value.into());
    }

    /// Builder-style `insert`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Look up an attribute. With `strict_case` only the exact key is tried;
    /// otherwise an exact hit wins and the first case-insensitive match is
    /// used as a fallback.
    pub fn get(&self, name: &str, strict_case: bool) -> Option<&AttributeValue> {
        if let Some(v) = self.attrs.get(name) {
            return Some(v);
        }
        if strict_case {
            return None;
        }
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Invalid YAML record")
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Invalid JSON record")
    }
}

impl<K: Into<String>, V: Into<AttributeValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Apply `predicate` to a resolved value. For multi-valued attributes the
/// result is "any element matches", or "every element matches" when
/// `all_match` is set. A null value never satisfies the predicate.
pub fn test_values<F>(predicate: F, value: &AttributeValue, all_match: bool) -> bool
where
    F: Fn(&Scalar) -> bool,
{
    match value {
        AttributeValue::Null => false,
        AttributeValue::One(v) => predicate(v),
        AttributeValue::Many(values) if all_match => values.iter().all(predicate),
        AttributeValue::Many(values) => values.iter().any(predicate),
    }
}
