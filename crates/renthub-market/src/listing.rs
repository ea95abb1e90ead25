//! Creating, editing and removing listings.

use renthub_db::{Entity, TransactionOptions};
use renthub_search::ProductDocument;

use crate::catalog::{Product, ProductParams};
use crate::ids::{DocId, ProductId};
use crate::{MarketError, MarketTask, Marketplace};

impl Marketplace {
    /// Create a listing and its search document.
    ///
    /// The document is written first; a failure there leaves no entity
    /// behind.
    pub fn create_product(&self, params: ProductParams) -> Result<Product, MarketError> {
        let input = params.validate(&self.category_info()?)?;
        let pid = input.pid.clone().unwrap_or_else(ProductId::generate);
        if self.db().get::<Product>(pid.as_str())?.is_some() {
            return Err(MarketError::Validation(format!(
                "product {} already exists",
                pid
            )));
        }

        let description = input.description.clone();
        let product = Product::create(pid, DocId::generate(), input);

        self.index().put(product.to_document(&description, 0.0))?;
        self.db().put(&product)?;

        tracing::info!(product = %product.id, doc_id = %product.doc_id, category = %product.category, "product created");
        Ok(product)
    }

    /// Replace a listing's core fields and refresh its document.
    ///
    /// The document keeps its current rating. It is rewritten inside the
    /// transaction that marks the product dirty, so a rating reconcile
    /// running concurrently either forces a retry or comes after and writes
    /// the stored average again. In per-review mode that reconcile is
    /// enqueued with the update.
    pub fn update_product(
        &self,
        pid: &ProductId,
        params: ProductParams,
    ) -> Result<Product, MarketError> {
        let input = params.validate(&self.category_info()?)?;
        let description = input.description.clone();
        let batch = self.config().ratings.batch_update;
        let tasks = self.tasks();

        let product = self.db().run_in_transaction(
            TransactionOptions::single_group(),
            |tx| -> Result<Product, MarketError> {
                let mut product: Product = tx.get_required(pid.as_str())?;
                product.update_core(input.clone());

                let rating = self
                    .index()
                    .get(product.doc_id.as_str())?
                    .and_then(|doc| doc.rating())
                    .unwrap_or(product.avg_rating);
                self.index().put(product.to_document(&description, rating))?;

                product.needs_review_reindex = true;
                tx.put(&product)?;
                if !batch {
                    tasks.enqueue_transactional(
                        tx,
                        MarketTask::ReindexProductRating {
                            pid: product.id.clone(),
                        },
                    );
                }
                Ok(product)
            },
        )?;

        tracing::info!(product = %product.id, "product updated");
        Ok(product)
    }

    /// Delete a listing.
    ///
    /// The entity is removed in a transaction that also schedules removal
    /// of the product's reviews and search document; both run only if the
    /// deletion commits. Returns whether the product existed.
    pub fn delete_product(&self, pid: &ProductId) -> Result<bool, MarketError> {
        let tasks = self.tasks();
        let existed = self.db().run_in_transaction(
            TransactionOptions::single_group(),
            |tx| -> Result<bool, MarketError> {
                let Some(product) = tx.get::<Product>(pid.as_str())? else {
                    return Ok(false);
                };
                tx.delete(&product.key())?;
                tasks.enqueue_transactional(tx, MarketTask::DeleteReviews { pid: pid.clone() });
                tasks.enqueue_transactional(tx, MarketTask::RemoveProductDoc { pid: pid.clone() });
                Ok(true)
            },
        )?;

        if existed {
            tracing::info!(product = %pid, "product deleted");
        } else {
            tracing::warn!(product = %pid, "product to delete does not exist");
        }
        Ok(existed)
    }

    /// Look up a listing.
    pub fn product(&self, pid: &ProductId) -> Result<Option<Product>, MarketError> {
        Ok(self.db().get(pid.as_str())?)
    }

    /// Remove the search document describing `pid`, if any.
    pub fn remove_product_doc(&self, pid: &ProductId) -> Result<bool, MarketError> {
        let Some(document) = self.index().find_by_pid(pid.as_str())? else {
            return Ok(false);
        };
        let removed = self.index().remove(&document.doc_id)?;
        tracing::info!(product = %pid, doc_id = %document.doc_id, "product document removed");
        Ok(removed)
    }

    /// The search document for `pid`, if any.
    pub fn product_document(&self, pid: &ProductId) -> Result<Option<ProductDocument>, MarketError> {
        let Some(product) = self.product(pid)? else {
            return Ok(self.index().find_by_pid(pid.as_str())?);
        };
        Ok(self.index().get(product.doc_id.as_str())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MarketConfig;
    use renthub_search::fields;

    fn market() -> Marketplace {
        Marketplace::in_memory(MarketConfig::default())
    }

    fn params(name: &str) -> ProductParams {
        ProductParams {
            name: name.into(),
            description: "weekend rental".into(),
            category: "outdoor".into(),
            price: "40".into(),
            ..ProductParams::default()
        }
    }

    #[test]
    fn test_create_writes_entity_and_document() {
        let market = market();
        let product = market.create_product(params("Tent")).unwrap();

        let doc = market.product_document(&product.id).unwrap().unwrap();
        assert_eq!(doc.doc_id, product.doc_id.as_str());
        assert_eq!(doc.rating(), Some(0.0));
        assert_eq!(market.product(&product.id).unwrap(), Some(product));
    }

    #[test]
    fn test_create_rejects_duplicate_pid() {
        let market = market();
        let mut p = params("Tent");
        p.pid = Some("tent-1".into());
        market.create_product(p.clone()).unwrap();
        assert!(matches!(
            market.create_product(p),
            Err(MarketError::Validation(_))
        ));
    }

    #[test]
    fn test_update_preserves_rating() {
        let market = market();
        let product = market.create_product(params("Tent")).unwrap();
        market
            .submit_review(&product.id, "ann", 4, "dry and warm")
            .unwrap();
        market.run_pending_tasks();

        let mut p = params("Big Tent");
        p.price = "55".into();
        let updated = market.update_product(&product.id, p).unwrap();
        assert_eq!(updated.name, "Big Tent");
        assert_eq!(updated.avg_rating, 4.0);
        assert_eq!(updated.num_reviews, 1);

        let doc = market.product_document(&product.id).unwrap().unwrap();
        assert_eq!(doc.rating(), Some(4.0));
        assert_eq!(doc.field(fields::NAME).and_then(|v| v.as_text()), Some("Big Tent"));
    }

    #[test]
    fn test_update_schedules_rating_reconcile() {
        let market = market();
        let product = market.create_product(params("Tent")).unwrap();
        market.submit_review(&product.id, "ann", 3, "").unwrap();
        market.run_pending_tasks();

        let updated = market.update_product(&product.id, params("Tent XL")).unwrap();
        assert!(updated.needs_review_reindex);
        assert_eq!(
            market.tasks().pending()[0].task,
            MarketTask::ReindexProductRating {
                pid: product.id.clone()
            }
        );

        assert_eq!(market.run_pending_tasks().executed, 1);
        assert!(!market.product(&product.id).unwrap().unwrap().needs_review_reindex);
        assert!(market.audit_rating_index(false).unwrap().is_consistent());
    }

    #[test]
    fn test_update_in_batch_mode_leaves_product_dirty() {
        let market = Marketplace::in_memory(MarketConfig::default().with_batch_ratings(true));
        let product = market.create_product(params("Tent")).unwrap();

        let updated = market.update_product(&product.id, params("Tent XL")).unwrap();
        assert!(updated.needs_review_reindex);
        assert!(market.tasks().is_empty());

        assert_eq!(market.sweep_dirty_products().unwrap().reindexed, 1);
        assert!(market.audit_rating_index(false).unwrap().is_consistent());
    }

    #[test]
    fn test_update_missing_product() {
        let market = market();
        let err = market
            .update_product(&ProductId::new("nope"), params("Tent"))
            .unwrap_err();
        assert!(matches!(err, MarketError::MissingEntity { .. }));
    }

    #[test]
    fn test_delete_schedules_cleanup() {
        let market = market();
        let product = market.create_product(params("Tent")).unwrap();
        market.submit_review(&product.id, "ann", 5, "").unwrap();
        market.submit_review(&product.id, "bob", 3, "").unwrap();
        market.run_pending_tasks();

        assert!(market.delete_product(&product.id).unwrap());
        assert_eq!(market.tasks().len(), 2);
        assert!(market.product(&product.id).unwrap().is_none());

        let report = market.run_pending_tasks();
        assert_eq!(report.executed, 2);
        assert!(market.index().find_by_pid(product.id.as_str()).unwrap().is_none());
        assert!(market.product_reviews(&product.id).unwrap().is_empty());

        assert!(!market.delete_product(&product.id).unwrap());
        assert!(market.tasks().is_empty());
    }
}
