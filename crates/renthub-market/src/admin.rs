//! Administrative bulk operations.

use renthub_db::Filter;
use serde::Serialize;

use crate::catalog::Product;
use crate::review::Review;
use crate::{MarketError, MarketTask, Marketplace};

/// What [`Marketplace::delete_all_data`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeleteSummary {
    pub categories: usize,
    pub reviews: usize,
    pub products: usize,
    pub documents: usize,
}

impl Marketplace {
    /// Delete all categories, reviews, products and search documents.
    ///
    /// Payment records and profiles are kept.
    pub fn delete_all_data(&self) -> Result<DeleteSummary, MarketError> {
        let categories = self.delete_categories()?;

        let review_keys = self.db().query_keys::<Review>(Filter::new())?;
        let reviews = self.db().delete_multi(&review_keys)?;

        let product_keys = self.db().query_keys::<Product>(Filter::new())?;
        let products = self.db().delete_multi(&product_keys)?;

        let documents = self.index().clear()?;

        let summary = DeleteSummary {
            categories,
            reviews,
            products,
            documents,
        };
        tracing::info!(?summary, "deleted all marketplace data");
        Ok(summary)
    }

    /// Schedule [`Marketplace::delete_all_data`] on the task queue.
    pub fn request_delete_all(&self) -> u64 {
        let id = self.tasks().enqueue(MarketTask::DeleteAllData);
        tracing::info!(task_id = id, "delete of all data requested");
        id
    }
}
