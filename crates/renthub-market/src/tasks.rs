//! Deferred marketplace tasks.

use renthub_tasks::RunReport;
use serde::{Deserialize, Serialize};

use crate::ids::ProductId;
use crate::{MarketError, Marketplace};

/// Work scheduled for later execution on the task queue.
///
/// Every task is safe to run more than once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketTask {
    /// Copy a product's average rating into its search document.
    ReindexProductRating { pid: ProductId },
    /// Delete all reviews of a deleted product.
    DeleteReviews { pid: ProductId },
    /// Remove a deleted product's search document.
    RemoveProductDoc { pid: ProductId },
    /// Wipe categories, products, reviews and the search index.
    DeleteAllData,
}

impl MarketTask {
    /// Short name for logs and listings.
    pub fn name(&self) -> &'static str {
        match self {
            MarketTask::ReindexProductRating { .. } => "reindex_product_rating",
            MarketTask::DeleteReviews { .. } => "delete_reviews",
            MarketTask::RemoveProductDoc { .. } => "remove_product_doc",
            MarketTask::DeleteAllData => "delete_all_data",
        }
    }
}

impl Marketplace {
    /// Execute one task.
    pub fn run_task(&self, task: &MarketTask) -> Result<(), MarketError> {
        tracing::debug!(task = task.name(), "running task");
        match task {
            MarketTask::ReindexProductRating { pid } => {
                self.reindex_product_rating(pid)?;
            }
            MarketTask::DeleteReviews { pid } => {
                self.delete_reviews(pid)?;
            }
            MarketTask::RemoveProductDoc { pid } => {
                self.remove_product_doc(pid)?;
            }
            MarketTask::DeleteAllData => {
                self.delete_all_data()?;
            }
        }
        Ok(())
    }

    /// Run every task that is currently due.
    pub fn run_pending_tasks(&self) -> RunReport {
        self.tasks().run_pending(|task| self.run_task(task))
    }
}
