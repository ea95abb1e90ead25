//! Product search documents.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Well-known document field names.
pub mod fields {
    /// Product name.
    pub const NAME: &str = "name";
    /// Free-text description.
    pub const DESCRIPTION: &str = "description";
    /// Category name.
    pub const CATEGORY: &str = "category";
    /// Rental price.
    pub const PRICE: &str = "price";
    /// Denormalized average rating.
    pub const RATING: &str = "rating";
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Numeric field.
    Number(f64),
    /// Text field.
    Text(String),
}

impl FieldValue {
    /// Numeric value, if this is a number field.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    /// Text value, if this is a text field.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// The searchable projection of one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDocument {
    /// Document id; products reference their document by this id.
    pub doc_id: String,
    /// Id of the product this document describes.
    pub pid: String,
    /// Indexed fields.
    pub fields: BTreeMap<String, FieldValue>,
}

impl ProductDocument {
    /// Create an empty document.
    pub fn new(doc_id: impl Into<String>, pid: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            pid: pid.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set_field(name, value);
        self
    }

    /// Set or replace a field.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Look up a field.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// The denormalized rating, if set.
    pub fn rating(&self) -> Option<f64> {
        self.field(fields::RATING).and_then(FieldValue::as_number)
    }

    /// Whether any text field contains `term`, ignoring case.
    pub fn matches_term(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.fields
            .values()
            .filter_map(FieldValue::as_text)
            .any(|text| text.to_lowercase().contains(&term))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_accessor() {
        let doc = ProductDocument::new("d1", "p1").with_field(fields::NAME, "Kayak");
        assert_eq!(doc.rating(), None);

        let doc = doc.with_field(fields::RATING, 3.5);
        assert_eq!(doc.rating(), Some(3.5));
    }

    #[test]
    fn test_matches_term() {
        let doc = ProductDocument::new("d1", "p1")
            .with_field(fields::NAME, "Inflatable Kayak")
            .with_field(fields::PRICE, 25.0);
        assert!(doc.matches_term("kayak"));
        assert!(!doc.matches_term("25"));
    }

    #[test]
    fn test_untagged_serialization() {
        let doc = ProductDocument::new("d1", "p1")
            .with_field(fields::NAME, "Tent")
            .with_field(fields::RATING, 4.0);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["fields"]["name"], "Tent");
        assert_eq!(json["fields"]["rating"], 4.0);

        let back: ProductDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }
}
