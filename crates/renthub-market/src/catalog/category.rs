//! Category tree for organizing listings.

use parking_lot::RwLock;
use renthub_db::{Entity, Filter};
use serde::{Deserialize, Serialize};

use crate::{MarketError, Marketplace};

/// Name of the category every other category descends from.
pub const ROOT_CATEGORY: &str = "root";

/// A stored category, keyed by its name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    /// Category name; also its id.
    pub name: String,
    /// Parent category name (None for the root).
    pub parent: Option<String>,
}

impl Entity for Category {
    const KIND: &'static str = "Category";

    fn id(&self) -> &str {
        &self.name
    }
}

impl Category {
    /// Check if this is a root category.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Input shape for building the category tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CategoryNode {
    /// Category name. Nodes without a name are skipped with their subtree.
    #[serde(default)]
    pub name: String,
    /// Child categories.
    #[serde(default)]
    pub children: Vec<CategoryNode>,
}

impl CategoryNode {
    /// A leaf node.
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// A node with children.
    pub fn branch(name: impl Into<String>, children: Vec<CategoryNode>) -> Self {
        Self {
            name: name.into(),
            children,
        }
    }

    /// The tree used when none is configured.
    pub fn default_tree() -> Self {
        Self::branch(
            ROOT_CATEGORY,
            vec![
                Self::leaf("tools"),
                Self::leaf("outdoor"),
                Self::leaf("electronics"),
                Self::leaf("vehicles"),
                Self::leaf("books"),
            ],
        )
    }
}

/// Cached `(id, label)` pairs of all non-root categories.
///
/// Filled on first use; must be invalidated whenever categories are
/// deleted or rebuilt. Every invalidation bumps a generation number, and a
/// value loaded under an older generation is not stored.
#[derive(Debug, Default)]
pub struct CategoryCache {
    state: RwLock<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    generation: u64,
    info: Option<Vec<(String, String)>>,
}

impl CategoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value, if loaded.
    pub fn get(&self) -> Option<Vec<(String, String)>> {
        self.state.read().info.clone()
    }

    /// Current generation; read it before loading a value to [`set`](Self::set).
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Store a value loaded at `generation`.
    ///
    /// Returns false, storing nothing, if the cache was invalidated since.
    pub fn set(&self, info: Vec<(String, String)>, generation: u64) -> bool {
        let mut state = self.state.write();
        if state.generation != generation {
            return false;
        }
        state.info = Some(info);
        true
    }

    /// Drop the cached value.
    pub fn invalidate(&self) {
        let mut state = self.state.write();
        state.generation += 1;
        state.info = None;
    }
}

impl Marketplace {
    /// Store the configured category tree if no categories exist yet.
    ///
    /// Returns the number of categories created.
    pub fn build_all_categories(&self) -> Result<usize, MarketError> {
        let existing = self
            .db()
            .query_page::<Category>(&Filter::new(), 1, None)?;
        if !existing.items.is_empty() {
            return Ok(0);
        }

        let mut created = Vec::new();
        collect_categories(self.category_tree(), None, &mut created);
        self.db().put_multi(&created)?;
        self.categories().invalidate();

        tracing::info!(categories = created.len(), "built category tree");
        Ok(created.len())
    }

    /// Delete every category and invalidate the cache.
    pub fn delete_categories(&self) -> Result<usize, MarketError> {
        let keys = self.db().query_keys::<Category>(Filter::new())?;
        let removed = self.db().delete_multi(&keys)?;
        self.categories().invalidate();
        tracing::info!(categories = removed, "deleted categories");
        Ok(removed)
    }

    /// `(id, label)` pairs of every category except the root.
    ///
    /// Builds the tree first if the store has none.
    pub fn category_info(&self) -> Result<Vec<(String, String)>, MarketError> {
        if let Some(info) = self.categories().get() {
            return Ok(info);
        }

        self.build_all_categories()?;
        let generation = self.categories().generation();
        let info: Vec<(String, String)> = self
            .db()
            .query::<Category>(Filter::new())
            .filter(|c| !matches!(c, Ok(c) if c.name == ROOT_CATEGORY))
            .map(|c| c.map(|c| (c.name.clone(), c.name)))
            .collect::<Result<_, _>>()?;

        if !self.categories().set(info.clone(), generation) {
            tracing::debug!("categories changed while loading; not caching");
        }
        Ok(info)
    }

    /// Whether `name` is a selectable category.
    pub fn is_known_category(&self, name: &str) -> Result<bool, MarketError> {
        Ok(self.category_info()?.iter().any(|(id, _)| id == name))
    }
}

fn collect_categories(node: &CategoryNode, parent: Option<&str>, out: &mut Vec<Category>) {
    if node.name.trim().is_empty() {
        tracing::warn!(parent = ?parent, "skipping category without a name");
        return;
    }
    out.push(Category {
        name: node.name.clone(),
        parent: parent.map(str::to_string),
    });
    for child in &node.children {
        collect_categories(child, Some(&node.name), out);
    }
}
