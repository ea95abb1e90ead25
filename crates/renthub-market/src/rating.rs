//! Rating aggregation and search index reconciliation.
//!
//! Folding a review into its product's average happens in one cross-group
//! transaction that also marks the product dirty. The search document's
//! rating then catches up in one of two ways, chosen by
//! `ratings.batch_update`:
//!
//! - per review: a [`MarketTask::ReindexProductRating`] task is enqueued as
//!   part of the same transaction and runs only if it commits;
//! - batched: nothing is scheduled and [`Marketplace::sweep_dirty_products`]
//!   later reindexes every dirty product with a single batch apply.
//!
//! Both paths clear the dirty flag before the index is written. If the
//! index write then fails the product is clean but stale; the sweep reports
//! this as [`MarketError::IndexReconciliationGap`], and
//! [`Marketplace::audit_rating_index`] finds and re-flags such products.

use renthub_db::{Filter, TransactionOptions};
use renthub_search::{fields, FieldValue, ProductDocument};
use serde::Serialize;

use crate::catalog::Product;
use crate::ids::{DocId, ProductId, ReviewId};
use crate::review::Review;
use crate::{MarketError, MarketTask, Marketplace};

/// Largest difference between a stored and an indexed rating considered equal.
pub const RATING_TOLERANCE: f64 = 1e-9;

type Cleared = Option<(Product, Option<ProductDocument>)>;

enum Fold {
    Counted(Product, Review),
    AlreadyCounted(Product, Review),
}

/// Result of reindexing one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexOutcome {
    /// The document now carries the product's rating.
    Reindexed,
    /// The product no longer exists; nothing to do.
    MissingProduct,
    /// The product has no search document.
    MissingDocument,
}

/// Summary of one dirty-product sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Products found with the dirty flag set.
    pub examined: usize,
    /// Documents written by the batch apply.
    pub reindexed: usize,
    /// Products already cleaned by someone else when their turn came.
    pub skipped: usize,
    /// Products whose flag was cleared but which have no document.
    pub missing_documents: usize,
    /// Products whose transaction failed; they stay dirty.
    pub failed: usize,
}

/// A product whose document rating disagrees with the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingDisagreement {
    pub pid: ProductId,
    pub doc_id: String,
    /// `avg_rating` in the store.
    pub stored: f64,
    /// Rating in the document, if the document has one.
    pub indexed: Option<f64>,
}

/// Summary of a store/index rating audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditReport {
    /// Products checked.
    pub examined: usize,
    /// Products still flagged dirty, expected to disagree until reindexed.
    pub in_flight: usize,
    /// Clean products without a search document.
    pub missing_documents: Vec<ProductId>,
    /// Clean products whose document rating is wrong.
    pub disagreements: Vec<RatingDisagreement>,
    /// Products re-flagged dirty by this audit.
    pub marked_dirty: usize,
}

impl AuditReport {
    /// Whether store and index agree everywhere they should.
    pub fn is_consistent(&self) -> bool {
        self.disagreements.is_empty() && self.missing_documents.is_empty()
    }
}

impl Marketplace {
    /// Fold a review's rating into its product's average, once.
    ///
    /// Returns the product and review as they stand after the call. Calling
    /// this again for an already counted review changes nothing. A missing
    /// review or product fails with [`MarketError::MissingEntity`].
    pub fn update_average_rating(
        &self,
        review_id: &ReviewId,
    ) -> Result<(Product, Review), MarketError> {
        let batch = self.config().ratings.batch_update;
        let tasks = self.tasks();

        let result = self
            .db()
            .run_in_transaction(TransactionOptions::cross_group(), |tx| -> Result<Fold, MarketError> {
                let mut review: Review = tx
                    .get(review_id.as_str())?
                    .ok_or_else(|| MarketError::missing::<Review>(review_id.as_str()))?;
                let mut product: Product = tx
                    .get(review.product_key.as_str())?
                    .ok_or_else(|| MarketError::missing::<Product>(review.product_key.as_str()))?;

                if review.rating_added {
                    return Ok(Fold::AlreadyCounted(product, review));
                }

                review.rating_added = true;
                product.fold_rating(review.rating);
                tx.put(&product)?;
                tx.put(&review)?;

                if !batch {
                    tasks.enqueue_transactional(
                        tx,
                        MarketTask::ReindexProductRating {
                            pid: product.id.clone(),
                        },
                    );
                }
                Ok(Fold::Counted(product, review))
            });

        match result {
            Ok(Fold::Counted(product, review)) => {
                self.metrics().record_rating_folded();
                tracing::info!(
                    product = %product.id,
                    review = %review.id,
                    rating = review.rating,
                    avg_rating = product.avg_rating,
                    num_reviews = product.num_reviews,
                    "rating folded"
                );
                Ok((product, review))
            }
            Ok(Fold::AlreadyCounted(product, review)) => {
                self.metrics().record_duplicate_delivery();
                tracing::debug!(review = %review.id, "rating already counted");
                Ok((product, review))
            }
            Err(e @ MarketError::MissingEntity { .. }) => {
                self.metrics().record_missing_entity();
                tracing::error!(review = %review_id, error = %e, "cannot update average rating");
                Err(e)
            }
            Err(e) => {
                tracing::warn!(review = %review_id, error = %e, "average rating update failed");
                Err(e)
            }
        }
    }

    /// Bring one product's document rating up to date.
    ///
    /// Clears the dirty flag in a transaction, then writes the current
    /// average into the document whether or not the flag was set, so a
    /// redelivered task repairs a document a failed earlier delivery missed.
    pub fn reindex_product_rating(&self, pid: &ProductId) -> Result<ReindexOutcome, MarketError> {
        let current = self
            .db()
            .run_in_transaction(
                TransactionOptions::single_group(),
                |tx| -> Result<Option<(DocId, f64)>, MarketError> {
                    let Some(mut product) = tx.get::<Product>(pid.as_str())? else {
                        return Ok(None);
                    };
                    if product.needs_review_reindex {
                        product.needs_review_reindex = false;
                        tx.put(&product)?;
                    }
                    Ok(Some((product.doc_id, product.avg_rating)))
                },
            )?;

        let Some((doc_id, avg_rating)) = current else {
            tracing::warn!(product = %pid, "product gone before its rating was reindexed");
            return Ok(ReindexOutcome::MissingProduct);
        };

        let updated =
            self.index()
                .update_field(doc_id.as_str(), fields::RATING, FieldValue::Number(avg_rating))?;
        if updated.is_none() {
            tracing::warn!(product = %pid, doc_id = %doc_id, "no search document to reindex");
            return Ok(ReindexOutcome::MissingDocument);
        }

        self.metrics().record_reindexed(1);
        tracing::debug!(product = %pid, avg_rating, "document rating reindexed");
        Ok(ReindexOutcome::Reindexed)
    }

    /// Reindex every dirty product with one batch apply.
    ///
    /// Each product's flag is cleared in its own transaction before the
    /// batch is applied. If the batch apply fails, the cleared products are
    /// returned in [`MarketError::IndexReconciliationGap`] and counted in
    /// the metrics; they are not re-flagged.
    pub fn sweep_dirty_products(&self) -> Result<SweepReport, MarketError> {
        let dirty = self
            .db()
            .query_keys::<Product>(Filter::new().eq("needs_review_reindex", true))?;

        let mut report = SweepReport {
            examined: dirty.len(),
            ..SweepReport::default()
        };
        let mut documents: Vec<ProductDocument> = Vec::new();

        for key in &dirty {
            let cleared = self
                .db()
                .run_in_transaction(TransactionOptions::single_group(), |tx| -> Result<Cleared, MarketError> {
                    let Some(mut product) = tx.get::<Product>(key.id())? else {
                        return Ok(None);
                    };
                    if !product.needs_review_reindex {
                        return Ok(None);
                    }
                    let document = self.index().get(product.doc_id.as_str())?;
                    product.needs_review_reindex = false;
                    tx.put(&product)?;
                    Ok(Some((product, document)))
                });

            match cleared {
                Ok(Some((product, Some(mut document)))) => {
                    document.set_field(fields::RATING, product.avg_rating);
                    documents.push(document);
                }
                Ok(Some((product, None))) => {
                    tracing::warn!(product = %product.id, doc_id = %product.doc_id, "dirty product has no search document");
                    report.missing_documents += 1;
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(product = %key.id(), error = %e, "could not clear dirty flag; leaving for next sweep");
                    report.failed += 1;
                }
            }
        }

        if !documents.is_empty() {
            let count = documents.len();
            let pids: Vec<String> = documents.iter().map(|d| d.pid.clone()).collect();

            if let Err(e) = self.index().batch_apply(documents) {
                self.metrics().record_reconciliation_gap(count as u64);
                tracing::error!(
                    products = count,
                    error = %e,
                    "batch apply failed after dirty flags were cleared; documents are stale"
                );
                return Err(MarketError::IndexReconciliationGap {
                    products: pids,
                    reason: e.to_string(),
                });
            }
            report.reindexed = count;
            self.metrics().record_reindexed(count as u64);
        }

        tracing::info!(
            examined = report.examined,
            reindexed = report.reindexed,
            skipped = report.skipped,
            missing_documents = report.missing_documents,
            failed = report.failed,
            "rating sweep finished"
        );
        Ok(report)
    }

    /// Compare every product's rating with its search document.
    ///
    /// Products still flagged dirty are counted as in flight and not
    /// compared. With `mark_dirty`, disagreeing products are flagged again
    /// so the next sweep repairs them.
    pub fn audit_rating_index(&self, mark_dirty: bool) -> Result<AuditReport, MarketError> {
        let mut report = AuditReport::default();

        for product in self.db().query::<Product>(Filter::new()) {
            let product = product?;
            report.examined += 1;

            if product.needs_review_reindex {
                report.in_flight += 1;
                continue;
            }

            match self.index().get(product.doc_id.as_str())? {
                None => report.missing_documents.push(product.id.clone()),
                Some(document) => {
                    let indexed = document.rating();
                    let agrees = indexed
                        .map(|r| (r - product.avg_rating).abs() <= RATING_TOLERANCE)
                        .unwrap_or(false);
                    if !agrees {
                        report.disagreements.push(RatingDisagreement {
                            pid: product.id.clone(),
                            doc_id: product.doc_id.to_string(),
                            stored: product.avg_rating,
                            indexed,
                        });
                    }
                }
            }
        }

        if !report.disagreements.is_empty() {
            self.metrics()
                .record_index_disagreements(report.disagreements.len() as u64);
            tracing::warn!(
                disagreements = report.disagreements.len(),
                "search index ratings out of sync"
            );
        }

        if mark_dirty {
            for disagreement in &report.disagreements {
                let flagged = self
                    .db()
                    .run_in_transaction(TransactionOptions::single_group(), |tx| -> Result<bool, MarketError> {
                        let Some(mut product) = tx.get::<Product>(disagreement.pid.as_str())?
                        else {
                            return Ok(false);
                        };
                        if product.needs_review_reindex {
                            return Ok(false);
                        }
                        product.needs_review_reindex = true;
                        tx.put(&product)?;
                        Ok(true)
                    })?;
                if flagged {
                    report.marked_dirty += 1;
                }
            }
        }

        Ok(report)
    }
}
