//! Entity keys and the `Entity` trait.

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Identity of a stored entity: its kind plus an id unique within that kind.
///
/// Every key is the root of its own entity group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key {
    kind: String,
    id: String,
}

impl Key {
    /// Create a key from a kind and id.
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create a key for an entity type.
    pub fn of<E: Entity>(id: impl Into<String>) -> Self {
        Self::new(E::KIND, id)
    }

    /// The entity kind.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The entity id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this key belongs to entity type `E`.
    pub fn is_kind<E: Entity>(&self) -> bool {
        self.kind == E::KIND
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A type that can be stored in the database.
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct Review { id: String, rating: i64 }
///
/// impl Entity for Review {
///     const KIND: &'static str = "Review";
///     fn id(&self) -> &str { &self.id }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Kind name used in keys.
    const KIND: &'static str;

    /// Id of this entity within its kind.
    fn id(&self) -> &str;

    /// Full key of this entity.
    fn key(&self) -> Key {
        Key::new(Self::KIND, self.id())
    }
}
