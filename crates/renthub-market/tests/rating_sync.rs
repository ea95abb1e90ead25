//! End-to-end tests of rating aggregation and search index reconciliation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use renthub_db::{Db, Entity, TransactionOptions};
use renthub_market::prelude::*;
use renthub_search::{FieldValue, MemoryIndex, ProductDocument, SearchError, SearchIndex};
use renthub_tasks::{RetryPolicy, TaskQueue};

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

type Interleaved = Box<dyn FnOnce() + Send>;

/// Index wrapper that records batch applies and can be told to fail them.
#[derive(Default)]
struct RecordingIndex {
    inner: MemoryIndex,
    fail_batches: AtomicBool,
    batches: Mutex<Vec<Vec<ProductDocument>>>,
    after_get: Mutex<Option<Interleaved>>,
}

impl RecordingIndex {
    /// Run `f` right after the next document read, before the reader sees it.
    fn after_next_get(&self, f: impl FnOnce() + Send + 'static) {
        *self.after_get.lock() = Some(Box::new(f));
    }

    fn fail_batches(&self, fail: bool) {
        self.fail_batches.store(fail, Ordering::SeqCst);
    }

    fn batches(&self) -> Vec<Vec<ProductDocument>> {
        self.batches.lock().clone()
    }
}

impl SearchIndex for RecordingIndex {
    fn get(&self, doc_id: &str) -> Result<Option<ProductDocument>, SearchError> {
        let document = self.inner.get(doc_id);
        let interleaved = self.after_get.lock().take();
        if let Some(f) = interleaved {
            f();
        }
        document
    }

    fn put(&self, document: ProductDocument) -> Result<(), SearchError> {
        self.inner.put(document)
    }

    fn update_field(
        &self,
        doc_id: &str,
        field: &str,
        value: FieldValue,
    ) -> Result<Option<ProductDocument>, SearchError> {
        self.inner.update_field(doc_id, field, value)
    }

    fn batch_apply(&self, documents: Vec<ProductDocument>) -> Result<(), SearchError> {
        self.batches.lock().push(documents.clone());
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(SearchError::Unavailable("index offline".to_string()));
        }
        self.inner.batch_apply(documents)
    }

    fn remove(&self, doc_id: &str) -> Result<bool, SearchError> {
        self.inner.remove(doc_id)
    }

    fn find_by_pid(&self, pid: &str) -> Result<Option<ProductDocument>, SearchError> {
        self.inner.find_by_pid(pid)
    }

    fn clear(&self) -> Result<usize, SearchError> {
        self.inner.clear()
    }

    fn len(&self) -> Result<usize, SearchError> {
        self.inner.len()
    }
}

fn setup(batch: bool) -> (Marketplace, Arc<RecordingIndex>) {
    setup_with_retries(batch, 10_000)
}

fn setup_with_retries(batch: bool, max_retries: u32) -> (Marketplace, Arc<RecordingIndex>) {
    init_tracing();
    let mut config = MarketConfig::default().with_batch_ratings(batch);
    config.store.max_retries = max_retries;

    let index = Arc::new(RecordingIndex::default());
    let market = Marketplace::new(
        Arc::new(Db::with_options(config.store.db_options())),
        index.clone(),
        Arc::new(TaskQueue::new(RetryPolicy::none())),
        config,
    );
    (market, index)
}

fn listing(market: &Marketplace, name: &str) -> Product {
    market
        .create_product(ProductParams {
            name: name.to_string(),
            category: "outdoor".to_string(),
            price: "20.00".to_string(),
            ..ProductParams::default()
        })
        .unwrap()
}

fn stored_review(market: &Marketplace, product: &Product, rating: i64) -> Review {
    let review = Review::new(product.id.clone(), "tester", rating, "");
    market.db().put(&review).unwrap();
    review
}

fn doc_rating(market: &Marketplace, product: &Product) -> Option<f64> {
    market
        .index()
        .get(product.doc_id.as_str())
        .unwrap()
        .and_then(|d| d.rating())
}

#[test]
fn test_worked_example() {
    let (market, _) = setup(false);
    let product = listing(&market, "Canoe");

    let mut averages = Vec::new();
    for rating in [4, 2, 5] {
        let (p, r) = market.submit_review(&product.id, "ann", rating, "").unwrap();
        assert!(r.rating_added);
        averages.push(p.avg_rating);
    }

    assert_eq!(averages[0], 4.0);
    assert_eq!(averages[1], 3.0);
    assert!((averages[2] - 3.6667).abs() < 1e-4);

    let stored = market.product(&product.id).unwrap().unwrap();
    assert_eq!(stored.num_reviews, 3);
    assert_eq!(market.product_reviews(&product.id).unwrap().len(), 3);
}

#[test]
fn test_update_is_idempotent() {
    let (market, _) = setup(false);
    let product = listing(&market, "Canoe");
    let review = stored_review(&market, &product, 4);

    let (first, _) = market.update_average_rating(&review.id).unwrap();
    let (second, again) = market.update_average_rating(&review.id).unwrap();

    assert_eq!(first.num_reviews, 1);
    assert_eq!(second.num_reviews, 1);
    assert_eq!(second.avg_rating, first.avg_rating);
    assert!(again.rating_added);
    assert_eq!(market.tasks().len(), 1);

    let metrics = market.metrics().snapshot();
    assert_eq!(metrics.ratings_folded, 1);
    assert_eq!(metrics.duplicate_deliveries, 1);
}

#[test]
fn test_num_reviews_counts_distinct_reviews() {
    let (market, _) = setup(true);
    let product = listing(&market, "Tent");

    let mut expected = 0;
    for rating in [1, 5, 3, 3, 2] {
        let review = stored_review(&market, &product, rating);
        for _ in 0..3 {
            market.update_average_rating(&review.id).unwrap();
        }
        expected += 1;
        let stored = market.product(&product.id).unwrap().unwrap();
        assert_eq!(stored.num_reviews, expected);
    }
}

#[test]
fn test_concurrent_updates_on_one_product() {
    const N: usize = 16;
    let (market, _) = setup(false);
    let product = listing(&market, "Kayak");
    let reviews: Vec<Review> = (0..N)
        .map(|i| stored_review(&market, &product, (i % 5 + 1) as i64))
        .collect();

    std::thread::scope(|s| {
        for review in &reviews {
            let market = &market;
            s.spawn(move || loop {
                match market.update_average_rating(&review.id) {
                    Ok(_) => break,
                    Err(e) if e.is_retryable() => continue,
                    Err(e) => panic!("unexpected error: {e}"),
                }
            });
        }
    });

    let stored = market.product(&product.id).unwrap().unwrap();
    assert_eq!(stored.num_reviews, N as u64);

    let expected = reviews.iter().map(|r| f64::from(r.rating)).sum::<f64>() / N as f64;
    assert!((stored.avg_rating - expected).abs() < 1e-9);
    assert_eq!(market.tasks().len(), N);
}

#[test]
fn test_per_review_mode_schedules_one_task_per_fold() {
    let (market, _) = setup(false);
    let product = listing(&market, "Canoe");

    market.submit_review(&product.id, "ann", 4, "").unwrap();
    market.submit_review(&product.id, "bob", 2, "").unwrap();
    assert_eq!(market.tasks().len(), 2);
    assert!(market.tasks().pending().iter().all(|t| t.task
        == MarketTask::ReindexProductRating {
            pid: product.id.clone()
        }));

    let report = market.run_pending_tasks();
    assert_eq!(report.executed, 2);

    let stored = market.product(&product.id).unwrap().unwrap();
    assert!(!stored.needs_review_reindex);
    assert_eq!(doc_rating(&market, &product), Some(3.0));
}

#[test]
fn test_batch_mode_leaves_products_dirty_until_swept() {
    let (market, index) = setup(true);
    let canoe = listing(&market, "Canoe");
    let tent = listing(&market, "Tent");
    let idle = listing(&market, "Bike");

    market.submit_review(&canoe.id, "ann", 5, "").unwrap();
    market.submit_review(&canoe.id, "bob", 4, "").unwrap();
    market.submit_review(&tent.id, "cat", 1, "").unwrap();
    assert!(market.tasks().is_empty());

    for product in [&canoe, &tent] {
        let stored = market.product(&product.id).unwrap().unwrap();
        assert!(stored.needs_review_reindex);
        assert_eq!(doc_rating(&market, product), Some(0.0));
    }

    let report = market.sweep_dirty_products().unwrap();
    assert_eq!(report.examined, 2);
    assert_eq!(report.reindexed, 2);

    let batches = index.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
    for product in [&canoe, &tent] {
        let stored = market.product(&product.id).unwrap().unwrap();
        assert!(!stored.needs_review_reindex);
        let entry = batches[0]
            .iter()
            .find(|d| d.pid == product.id.as_str())
            .unwrap();
        assert_eq!(entry.rating(), Some(stored.avg_rating));
        assert_eq!(doc_rating(&market, product), Some(stored.avg_rating));
    }
    assert_eq!(doc_rating(&market, &idle), Some(0.0));

    // Nothing dirty: no further batch applies.
    let report = market.sweep_dirty_products().unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(index.batches().len(), 1);
}

#[test]
fn test_missing_entities_are_reported() {
    let (market, _) = setup(false);
    let err = market
        .update_average_rating(&ReviewId::new("no-such-review"))
        .unwrap_err();
    assert!(matches!(err, MarketError::MissingEntity { ref kind, .. } if kind == Review::KIND));
    assert!(!err.is_retryable());

    let product = listing(&market, "Canoe");
    let orphan = stored_review(&market, &product, 3);
    market.db().delete(&product.key()).unwrap();
    let err = market.update_average_rating(&orphan.id).unwrap_err();
    assert!(matches!(err, MarketError::MissingEntity { ref kind, .. } if kind == Product::KIND));

    let missing = market
        .submit_review(&ProductId::new("gone"), "ann", 3, "")
        .unwrap_err();
    assert!(matches!(missing, MarketError::MissingEntity { .. }));

    assert_eq!(market.metrics().snapshot().missing_entities, 2);
    assert!(market.tasks().is_empty());
}

#[test]
fn test_failed_batch_apply_is_a_reconciliation_gap() {
    let (market, index) = setup(true);
    let canoe = listing(&market, "Canoe");
    market.submit_review(&canoe.id, "ann", 4, "").unwrap();

    index.fail_batches(true);
    let err = market.sweep_dirty_products().unwrap_err();
    let MarketError::IndexReconciliationGap { products, .. } = err else {
        panic!("expected a reconciliation gap, got {err}");
    };
    assert_eq!(products, vec![canoe.id.to_string()]);
    assert_eq!(market.metrics().snapshot().reconciliation_gaps, 1);

    // The flag is gone even though the document is stale.
    let stored = market.product(&canoe.id).unwrap().unwrap();
    assert!(!stored.needs_review_reindex);
    assert_eq!(doc_rating(&market, &canoe), Some(0.0));

    index.fail_batches(false);
    assert_eq!(market.sweep_dirty_products().unwrap().examined, 0);

    let audit = market.audit_rating_index(true).unwrap();
    assert_eq!(audit.disagreements.len(), 1);
    assert_eq!(audit.disagreements[0].stored, 4.0);
    assert_eq!(audit.disagreements[0].indexed, Some(0.0));
    assert_eq!(audit.marked_dirty, 1);

    let report = market.sweep_dirty_products().unwrap();
    assert_eq!(report.reindexed, 1);
    assert_eq!(doc_rating(&market, &canoe), Some(4.0));
    assert!(market.audit_rating_index(false).unwrap().is_consistent());
}

#[test]
fn test_reindex_task_is_safe_to_redeliver() {
    let (market, _) = setup(false);
    let product = listing(&market, "Canoe");
    market.submit_review(&product.id, "ann", 5, "").unwrap();

    assert_eq!(
        market.reindex_product_rating(&product.id).unwrap(),
        ReindexOutcome::Reindexed
    );
    // Second delivery of the same task finds the flag already clear.
    assert_eq!(
        market.reindex_product_rating(&product.id).unwrap(),
        ReindexOutcome::Reindexed
    );
    assert_eq!(doc_rating(&market, &product), Some(5.0));

    market.delete_product(&product.id).unwrap();
    assert_eq!(
        market.reindex_product_rating(&product.id).unwrap(),
        ReindexOutcome::MissingProduct
    );
}

#[test]
fn test_audit_skips_in_flight_products() {
    let (market, _) = setup(true);
    let product = listing(&market, "Canoe");
    market.submit_review(&product.id, "ann", 2, "").unwrap();

    let audit = market.audit_rating_index(false).unwrap();
    assert_eq!(audit.examined, 1);
    assert_eq!(audit.in_flight, 1);
    assert!(audit.is_consistent());
}

#[test]
fn test_pending_reindex_survives_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut config = MarketConfig::default();
    config.store.path = dir.path().join("store.json");
    config.search.path = dir.path().join("index.json");
    config.tasks.path = dir.path().join("tasks.json");

    let open = |config: &MarketConfig| {
        let db = Arc::new(Db::open(&config.store.path, config.store.db_options()).unwrap());
        let index = Arc::new(MemoryIndex::open(&config.search.path).unwrap());
        let tasks = Arc::new(
            TaskQueue::open(&config.tasks.path, config.tasks.retry_policy()).unwrap(),
        );
        let market = Marketplace::new(db.clone(), index.clone(), tasks.clone(), config.clone());
        (market, db, index, tasks)
    };

    let product_id = {
        let (market, db, index, tasks) = open(&config);
        let product = listing(&market, "Canoe");
        market.submit_review(&product.id, "ann", 3, "").unwrap();
        db.flush().unwrap();
        index.flush().unwrap();
        tasks.flush().unwrap();
        product.id
    };

    let (market, _, _, _) = open(&config);
    assert_eq!(market.tasks().len(), 1);
    assert_eq!(market.run_pending_tasks().executed, 1);

    let product = market.product(&product_id).unwrap().unwrap();
    assert_eq!(doc_rating(&market, &product), Some(3.0));
}

#[test]
fn test_listing_edit_racing_a_reindex_keeps_index_in_sync() {
    for batch in [true, false] {
        let (market, index) = setup(batch);
        let market = Arc::new(market);
        let product = listing(&market, "Canoe");
        market.submit_review(&product.id, "ann", 4, "").unwrap();

        // A reindex lands between the edit reading the document and writing it back.
        let racer = Arc::clone(&market);
        let pid = product.id.clone();
        index.after_next_get(move || {
            racer.reindex_product_rating(&pid).unwrap();
        });

        let updated = market
            .update_product(
                &product.id,
                ProductParams {
                    name: "Canoe XL".to_string(),
                    category: "outdoor".to_string(),
                    price: "25.00".to_string(),
                    ..ProductParams::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Canoe XL");
        assert!(market.product(&product.id).unwrap().unwrap().needs_review_reindex);

        if batch {
            market.sweep_dirty_products().unwrap();
        } else {
            market.run_pending_tasks();
        }

        let stored = market.product(&product.id).unwrap().unwrap();
        assert!(!stored.needs_review_reindex);
        assert_eq!(doc_rating(&market, &product), Some(4.0));
        assert!(market.audit_rating_index(false).unwrap().is_consistent());
    }
}

#[test]
fn test_update_gives_up_after_retry_budget() {
    let (market, _) = setup_with_retries(true, 0);
    let product = listing(&market, "Canoe");
    let stop = AtomicBool::new(false);

    let (conflicted, counted) = std::thread::scope(|s| {
        // Rewrites the product unchanged, bumping its version.
        s.spawn(|| {
            while !stop.load(Ordering::SeqCst) {
                let mut tx = market.db().begin(TransactionOptions::single_group());
                if let Ok(Some(current)) = tx.get::<Product>(product.id.as_str()) {
                    if tx.put(&current).is_ok() {
                        let _ = market.db().commit(tx);
                    }
                }
            }
        });

        let deadline = Instant::now() + Duration::from_secs(30);
        let mut counted = 0u64;
        let mut conflicted = None;
        while conflicted.is_none() && Instant::now() < deadline {
            let review = stored_review(&market, &product, 5);
            match market.update_average_rating(&review.id) {
                Ok(_) => counted += 1,
                Err(MarketError::TransactionConflict { attempts }) => {
                    assert_eq!(attempts, 1);
                    conflicted = Some(review);
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        stop.store(true, Ordering::SeqCst);
        (conflicted, counted)
    });

    let review = conflicted.expect("the product never changed under an update");
    let unchanged: Review = market.db().get(review.id.as_str()).unwrap().unwrap();
    assert!(!unchanged.rating_added);
    assert_eq!(market.product(&product.id).unwrap().unwrap().num_reviews, counted);

    // Without contention the same review is counted.
    let (after, again) = market.update_average_rating(&review.id).unwrap();
    assert!(again.rating_added);
    assert_eq!(after.num_reviews, counted + 1);
}

#[test]
fn test_fold_during_sweep_is_not_lost() {
    let (market, index) = setup(true);
    let market = Arc::new(market);
    let product = listing(&market, "Canoe");
    market.submit_review(&product.id, "ann", 4, "").unwrap();

    // A second review is folded after the sweep listed the product.
    let racer = Arc::clone(&market);
    let pid = product.id.clone();
    index.after_next_get(move || {
        racer.submit_review(&pid, "bob", 2, "").unwrap();
    });

    let report = market.sweep_dirty_products().unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.reindexed, 1);

    let stored = market.product(&product.id).unwrap().unwrap();
    assert_eq!(stored.num_reviews, 2);
    assert_eq!(stored.avg_rating, 3.0);
    assert!(!stored.needs_review_reindex);
    assert_eq!(doc_rating(&market, &product), Some(3.0));
    assert_eq!(index.batches()[0][0].rating(), Some(3.0));
    assert!(market.audit_rating_index(false).unwrap().is_consistent());
}

#[test]
fn test_sweep_over_product_without_document() {
    let (market, index) = setup(true);
    let product = listing(&market, "Canoe");
    market.submit_review(&product.id, "ann", 4, "").unwrap();
    assert!(market.index().remove(product.doc_id.as_str()).unwrap());

    let report = market.sweep_dirty_products().unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.missing_documents, 1);
    assert_eq!(report.reindexed, 0);
    assert!(index.batches().is_empty());

    let stored = market.product(&product.id).unwrap().unwrap();
    assert!(!stored.needs_review_reindex);

    let audit = market.audit_rating_index(false).unwrap();
    assert_eq!(audit.missing_documents, vec![product.id.clone()]);
    assert!(!audit.is_consistent());
}
