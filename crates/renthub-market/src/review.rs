//! Product reviews.

use chrono::{DateTime, Utc};
use renthub_db::{Entity, Filter};
use serde::{Deserialize, Serialize};

use crate::catalog::Product;
use crate::ids::{ProductId, ReviewId};
use crate::{MarketError, Marketplace};

/// Lowest accepted rating.
pub const MIN_RATING: u8 = 1;
/// Highest accepted rating.
pub const MAX_RATING: u8 = 5;

/// A buyer's review of a product.
///
/// The product reference never changes. `rating_added` flips from false to
/// true exactly once, when the rating is folded into the product average.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub id: ReviewId,
    pub product_key: ProductId,
    pub username: String,
    pub rating: u8,
    pub comment: String,
    pub active: bool,
    pub rating_added: bool,
    pub date_added: DateTime<Utc>,
}

impl Entity for Review {
    const KIND: &'static str = "Review";

    fn id(&self) -> &str {
        self.id.as_str()
    }
}

impl Review {
    /// Create an uncounted review, clamping the rating into range.
    pub fn new(
        product_key: ProductId,
        username: impl Into<String>,
        rating: i64,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            id: ReviewId::generate(),
            product_key,
            username: username.into(),
            rating: clamp_rating(rating),
            comment: comment.into(),
            active: true,
            rating_added: false,
            date_added: Utc::now(),
        }
    }
}

/// Clamp a submitted rating into `MIN_RATING..=MAX_RATING`.
pub fn clamp_rating(rating: i64) -> u8 {
    rating.clamp(i64::from(MIN_RATING), i64::from(MAX_RATING)) as u8
}

impl Marketplace {
    /// Store a review and fold its rating into the product.
    pub fn submit_review(
        &self,
        pid: &ProductId,
        username: &str,
        rating: i64,
        comment: &str,
    ) -> Result<(Product, Review), MarketError> {
        if self.db().get::<Product>(pid.as_str())?.is_none() {
            return Err(MarketError::missing::<Product>(pid.as_str()));
        }

        let review = Review::new(pid.clone(), username.trim(), rating, comment.trim());
        self.db().put(&review)?;
        tracing::debug!(review = %review.id, product = %pid, rating = review.rating, "review stored");

        self.update_average_rating(&review.id)
    }

    /// Active reviews whose rating has been counted.
    pub fn product_reviews(&self, pid: &ProductId) -> Result<Vec<Review>, MarketError> {
        let filter = Filter::new()
            .eq("active", true)
            .eq("rating_added", true)
            .eq("product_key", pid.as_str());
        let mut reviews = self
            .db()
            .query::<Review>(filter)
            .collect::<Result<Vec<_>, _>>()?;
        reviews.sort_by(|a, b| a.date_added.cmp(&b.date_added));
        Ok(reviews)
    }

    /// Delete every review of a product. Returns how many were removed.
    pub fn delete_reviews(&self, pid: &ProductId) -> Result<usize, MarketError> {
        if pid.is_empty() {
            return Ok(0);
        }
        let keys = self
            .db()
            .query_keys::<Review>(Filter::new().eq("product_key", pid.as_str()))?;
        let removed = self.db().delete_multi(&keys)?;
        tracing::info!(product = %pid, reviews = removed, "deleted reviews");
        Ok(removed)
    }
}
