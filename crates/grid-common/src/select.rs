//! Message selection criteria.
//!
//! A [`Criteria`] maps attribute names (e.g. `shortName`, `startStep`,
//! `level`) to a [`Criterion`]. A message matches when every named attribute
//! is defined on it and satisfies its criterion.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A scalar message attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttrValue {
    /// Numeric view, for integer/float comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    /// Equality that treats `Int(6)` and `Float(6.0)` as the same value.
    pub fn same_as(&self, other: &AttrValue) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for AttrValue {
    fn from(v: u32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

type PredicateFn = Arc<dyn Fn(&AttrValue) -> bool + Send + Sync>;

/// One attribute condition.
#[derive(Clone)]
pub enum Criterion {
    /// Attribute equals the value.
    Equals(AttrValue),
    /// Attribute equals any of the values.
    OneOf(Vec<AttrValue>),
    /// Attribute satisfies the predicate.
    Predicate(PredicateFn),
}

impl Criterion {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&AttrValue) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    pub fn matches(&self, value: &AttrValue) -> bool {
        match self {
            Self::Equals(expected) => value.same_as(expected),
            Self::OneOf(candidates) => candidates.iter().any(|c| value.same_as(c)),
            Self::Predicate(f) => f(value),
        }
    }
}

impl fmt::Debug for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(v) => f.debug_tuple("Equals").field(v).finish(),
            Self::OneOf(vs) => f.debug_tuple("OneOf").field(vs).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// A conjunction of attribute criteria.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    entries: BTreeMap<String, Criterion>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, criterion: Criterion) -> Self {
        self.entries.insert(key.into(), criterion);
        self
    }

    pub fn equals(self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.with(key, Criterion::Equals(value.into()))
    }

    pub fn one_of<V, I>(self, key: impl Into<String>, values: I) -> Self
    where
        V: Into<AttrValue>,
        I: IntoIterator<Item = V>,
    {
        self.with(
            key,
            Criterion::OneOf(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn predicate<F>(self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(&AttrValue) -> bool + Send + Sync + 'static,
    {
        self.with(key, Criterion::predicate(f))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evaluate against a message whose attributes are looked up by name.
    ///
    /// Undefined attributes never match.
    pub fn matches<F>(&self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<AttrValue>,
    {
        self.entries.iter().all(|(key, criterion)| match lookup(key) {
            Some(value) => criterion.matches(&value),
            None => false,
        })
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(k, c)| format!("{}={:?}", k, c))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn message() -> HashMap<String, AttrValue> {
        let mut attrs = HashMap::new();
        attrs.insert("shortName".to_string(), AttrValue::from("tp"));
        attrs.insert("startStep".to_string(), AttrValue::from(6i64));
        attrs.insert("level".to_string(), AttrValue::from(0.0));
        attrs
    }

    #[test]
    fn test_equals_and_one_of() {
        let attrs = message();
        let criteria = Criteria::new()
            .equals("shortName", "tp")
            .one_of("startStep", [0i64, 6, 12]);
        assert!(criteria.matches(|k| attrs.get(k).cloned()));

        let criteria = Criteria::new().one_of("shortName", ["2t", "10u"]);
        assert!(!criteria.matches(|k| attrs.get(k).cloned()));
    }

    #[test]
    fn test_predicate() {
        let attrs = message();
        let criteria = Criteria::new().predicate("startStep", |v| {
            v.as_f64().map(|s| s >= 6.0).unwrap_or(false)
        });
        assert!(criteria.matches(|k| attrs.get(k).cloned()));

        let criteria =
            Criteria::new().predicate("startStep", |v| v.as_f64().map(|s| s > 6.0).unwrap_or(false));
        assert!(!criteria.matches(|k| attrs.get(k).cloned()));
    }

    #[test]
    fn test_numeric_equality_across_kinds() {
        let attrs = message();
        let criteria = Criteria::new().equals("level", 0i64);
        assert!(criteria.matches(|k| attrs.get(k).cloned()));
    }

    #[test]
    fn test_undefined_attribute_never_matches() {
        let attrs = message();
        let criteria = Criteria::new().equals("perturbationNumber", 1i64);
        assert!(!criteria.matches(|k| attrs.get(k).cloned()));
    }
}
