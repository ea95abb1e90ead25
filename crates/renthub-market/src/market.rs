//! The marketplace service handle.

use std::sync::Arc;

use renthub_db::Db;
use renthub_observability::RatingMetrics;
use renthub_search::{MemoryIndex, SearchIndex};
use renthub_tasks::TaskQueue;

use crate::catalog::{CategoryCache, CategoryNode};
use crate::{MarketConfig, MarketTask};

/// Entry point for every marketplace operation.
///
/// Bundles the entity store, the search index and the deferred task queue
/// with the configuration and caches that operations share. Cheap to share
/// behind an `Arc`; all methods take `&self`.
pub struct Marketplace {
    db: Arc<Db>,
    index: Arc<dyn SearchIndex>,
    tasks: Arc<TaskQueue<MarketTask>>,
    config: MarketConfig,
    metrics: Arc<RatingMetrics>,
    categories: CategoryCache,
    category_tree: CategoryNode,
}

impl Marketplace {
    /// Assemble a marketplace from its backing services.
    pub fn new(
        db: Arc<Db>,
        index: Arc<dyn SearchIndex>,
        tasks: Arc<TaskQueue<MarketTask>>,
        config: MarketConfig,
    ) -> Self {
        Self {
            db,
            index,
            tasks,
            config,
            metrics: Arc::new(RatingMetrics::new()),
            categories: CategoryCache::new(),
            category_tree: CategoryNode::default_tree(),
        }
    }

    /// A marketplace backed entirely by memory.
    pub fn in_memory(config: MarketConfig) -> Self {
        let db = Db::with_options(config.store.db_options());
        let tasks = TaskQueue::new(config.tasks.retry_policy());
        Self::new(
            Arc::new(db),
            Arc::new(MemoryIndex::new()),
            Arc::new(tasks),
            config,
        )
    }

    /// Use a different category tree for [`Marketplace::build_all_categories`].
    pub fn with_category_tree(mut self, tree: CategoryNode) -> Self {
        self.category_tree = tree;
        self.categories.invalidate();
        self
    }

    /// Share an existing metrics registry.
    pub fn with_metrics(mut self, metrics: Arc<RatingMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn db(&self) -> &Arc<Db> {
        &self.db
    }

    pub fn index(&self) -> &Arc<dyn SearchIndex> {
        &self.index
    }

    pub fn tasks(&self) -> &Arc<TaskQueue<MarketTask>> {
        &self.tasks
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<RatingMetrics> {
        &self.metrics
    }

    pub(crate) fn categories(&self) -> &CategoryCache {
        &self.categories
    }

    pub(crate) fn category_tree(&self) -> &CategoryNode {
        &self.category_tree
    }
}

impl std::fmt::Debug for Marketplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marketplace")
            .field("db", &self.db)
            .field("tasks", &self.tasks)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
