//! Property values and query filters.

use serde::{Deserialize, Serialize};

/// A property value used in query filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null or missing property.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Real/float value.
    Real(f64),
    /// Text value.
    Text(String),
}

impl Value {
    /// Try to get the value as an i64.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(f) => Some(*f as i64),
            _ => None,
        }
    }

    /// Try to get the value as an f64.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get the value as a string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Check if the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Compare against a stored JSON property.
    ///
    /// Numbers compare by value regardless of integer/real representation;
    /// `Null` matches both an explicit null and a missing property.
    pub fn matches(&self, property: Option<&serde_json::Value>) -> bool {
        match (self, property) {
            (Value::Null, None) => true,
            (_, None) => false,
            (Value::Null, Some(p)) => p.is_null(),
            (Value::Bool(b), Some(p)) => p.as_bool() == Some(*b),
            (Value::Integer(i), Some(p)) => match p.as_i64() {
                Some(v) => v == *i,
                None => p.as_f64() == Some(*i as f64),
            },
            (Value::Real(f), Some(p)) => p.as_f64() == Some(*f),
            (Value::Text(s), Some(p)) => p.as_str() == Some(s.as_str()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// A conjunction of equality predicates on top-level entity properties.
///
/// An empty filter matches every entity of the queried kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    predicates: Vec<(String, Value)>,
}

impl Filter {
    /// Create a filter that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality predicate.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push((field.into(), value.into()));
        self
    }

    /// Check whether this filter has no predicates.
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Evaluate the filter against a stored entity document.
    pub fn matches(&self, data: &serde_json::Value) -> bool {
        self.predicates
            .iter()
            .all(|(field, value)| value.matches(data.get(field)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(3), Value::Integer(3));
        assert_eq!(Value::from("x"), Value::Text("x".into()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::Integer(4).as_real(), Some(4.0));
    }

    #[test]
    fn test_filter_matches() {
        let doc = json!({"needs_review_reindex": true, "num_reviews": 3, "doc_id": "d1"});

        assert!(Filter::new().matches(&doc));
        assert!(Filter::new().eq("needs_review_reindex", true).matches(&doc));
        assert!(!Filter::new().eq("needs_review_reindex", false).matches(&doc));
        assert!(Filter::new()
            .eq("num_reviews", 3)
            .eq("doc_id", "d1")
            .matches(&doc));
        assert!(!Filter::new().eq("doc_id", "d2").matches(&doc));
    }

    #[test]
    fn test_null_matches_missing() {
        let doc = json!({"custom": null});
        assert!(Filter::new().eq("custom", Value::Null).matches(&doc));
        assert!(Filter::new().eq("absent", Value::Null).matches(&doc));
        assert!(!Filter::new().eq("absent", 1).matches(&doc));
    }

    #[test]
    fn test_integer_matches_real_property() {
        let doc = json!({"price": 10.0});
        assert!(Filter::new().eq("price", 10).matches(&doc));
        assert!(Filter::new().eq("price", 10.0).matches(&doc));
    }
}
