//! Rating synchronization counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Monitoring counters for the rating pipeline.
///
/// Counters only ever increase; read them with [`RatingMetrics::snapshot`].
#[derive(Debug, Default)]
pub struct RatingMetrics {
    ratings_folded: AtomicU64,
    duplicate_deliveries: AtomicU64,
    missing_entities: AtomicU64,
    products_reindexed: AtomicU64,
    reconciliation_gaps: AtomicU64,
    index_disagreements: AtomicU64,
}

/// Point-in-time copy of [`RatingMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingMetricsSnapshot {
    /// Reviews whose rating was folded into a product average.
    pub ratings_folded: u64,
    /// Rating updates that found the review already counted.
    pub duplicate_deliveries: u64,
    /// Rating updates that referenced a missing review or product.
    pub missing_entities: u64,
    /// Products whose document rating was refreshed.
    pub products_reindexed: u64,
    /// Products left stale because a batch apply failed after their flag
    /// was cleared.
    pub reconciliation_gaps: u64,
    /// Products found out of sync by the most recent audits, cumulative.
    pub index_disagreements: u64,
}

impl RatingMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rating_folded(&self) {
        self.ratings_folded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_delivery(&self) {
        self.duplicate_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_missing_entity(&self) {
        self.missing_entities.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reindexed(&self, products: u64) {
        self.products_reindexed.fetch_add(products, Ordering::Relaxed);
    }

    pub fn record_reconciliation_gap(&self, products: u64) {
        self.reconciliation_gaps.fetch_add(products, Ordering::Relaxed);
    }

    pub fn record_index_disagreements(&self, products: u64) {
        self.index_disagreements.fetch_add(products, Ordering::Relaxed);
    }

    /// Read all counters.
    pub fn snapshot(&self) -> RatingMetricsSnapshot {
        RatingMetricsSnapshot {
            ratings_folded: self.ratings_folded.load(Ordering::Relaxed),
            duplicate_deliveries: self.duplicate_deliveries.load(Ordering::Relaxed),
            missing_entities: self.missing_entities.load(Ordering::Relaxed),
            products_reindexed: self.products_reindexed.load(Ordering::Relaxed),
            reconciliation_gaps: self.reconciliation_gaps.load(Ordering::Relaxed),
            index_disagreements: self.index_disagreements.load(Ordering::Relaxed),
        }
    }
}

impl RatingMetricsSnapshot {
    /// Format as JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = RatingMetrics::new();
        metrics.record_rating_folded();
        metrics.record_rating_folded();
        metrics.record_duplicate_delivery();
        metrics.record_reconciliation_gap(3);
        metrics.record_reindexed(2);

        let snap = metrics.snapshot();
        assert_eq!(snap.ratings_folded, 2);
        assert_eq!(snap.duplicate_deliveries, 1);
        assert_eq!(snap.reconciliation_gaps, 3);
        assert_eq!(snap.products_reindexed, 2);
        assert_eq!(snap.missing_entities, 0);
    }

    #[test]
    fn test_snapshot_json() {
        let metrics = RatingMetrics::new();
        metrics.record_index_disagreements(4);
        let json: serde_json::Value = serde_json::from_str(&metrics.snapshot().to_json()).unwrap();
        assert_eq!(json["index_disagreements"], 4);
    }
}
