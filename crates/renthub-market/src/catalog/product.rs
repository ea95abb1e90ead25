//! Product listings.

use chrono::NaiveDate;
use renthub_db::Entity;
use renthub_search::{fields, ProductDocument};
use serde::{Deserialize, Serialize};

use crate::ids::{DocId, ProductId, UserId};
use crate::money::{Currency, Money};
use crate::MarketError;

/// A rentable product listing.
///
/// `avg_rating`, `num_reviews` and `needs_review_reindex` belong to the
/// rating pipeline and are only changed inside its transactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    /// Product id.
    pub id: ProductId,
    /// Id of the search document describing this product.
    pub doc_id: DocId,
    /// Listing title.
    pub name: String,
    /// Category name.
    pub category: String,
    /// Rental price.
    pub price: Money,
    /// Owner of the listing.
    pub user_id: Option<UserId>,
    /// PayPal account receiving payments for this listing.
    pub paypal_account: Option<String>,
    /// Pick-up location.
    pub location: Option<String>,
    /// Contact phone number.
    pub phone_number: Option<String>,
    /// Street address.
    pub address: Option<String>,
    /// Image link.
    pub image_url: Option<String>,
    /// First day available.
    pub start_date: Option<NaiveDate>,
    /// Last day available.
    pub end_date: Option<NaiveDate>,
    /// Whether the listing is visible.
    pub active: bool,
    /// Mean rating over all counted reviews.
    pub avg_rating: f64,
    /// Number of counted reviews.
    pub num_reviews: u64,
    /// Set when `avg_rating` changed and the search document has not caught up.
    pub needs_review_reindex: bool,
}

impl Entity for Product {
    const KIND: &'static str = "Product";

    fn id(&self) -> &str {
        self.id.as_str()
    }
}

impl Product {
    /// Fold one more rating into the running mean.
    ///
    /// Marks the product as needing a document reindex.
    pub fn fold_rating(&mut self, rating: u8) {
        self.num_reviews += 1;
        self.avg_rating += (f64::from(rating) - self.avg_rating) / self.num_reviews as f64;
        self.needs_review_reindex = true;
    }

    /// Search document for the current listing data.
    pub fn to_document(&self, description: &str, rating: f64) -> ProductDocument {
        ProductDocument::new(self.doc_id.as_str(), self.id.as_str())
            .with_field(fields::NAME, self.name.as_str())
            .with_field(fields::DESCRIPTION, description)
            .with_field(fields::CATEGORY, self.category.as_str())
            .with_field(fields::PRICE, self.price.to_decimal())
            .with_field(fields::RATING, rating)
    }

    fn apply(&mut self, input: ProductInput) {
        self.name = input.name;
        self.category = input.category;
        self.price = input.price;
        self.user_id = input.user_id;
        self.paypal_account = input.paypal_account;
        self.location = input.location;
        self.phone_number = input.phone_number;
        self.address = input.address;
        self.image_url = input.image_url;
        self.start_date = input.start_date;
        self.end_date = input.end_date;
    }

    /// Build a new listing with zeroed rating fields.
    pub(crate) fn create(id: ProductId, doc_id: DocId, input: ProductInput) -> Self {
        let mut product = Self {
            id,
            doc_id,
            name: String::new(),
            category: String::new(),
            price: Money::zero(Currency::default()),
            user_id: None,
            paypal_account: None,
            location: None,
            phone_number: None,
            address: None,
            image_url: None,
            start_date: None,
            end_date: None,
            active: true,
            avg_rating: 0.0,
            num_reviews: 0,
            needs_review_reindex: false,
        };
        product.apply(input);
        product
    }

    /// Replace the listing fields, leaving rating state untouched.
    pub(crate) fn update_core(&mut self, input: ProductInput) {
        self.apply(input);
    }
}

/// Raw listing form, as submitted by a seller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductParams {
    /// Product id; generated when absent.
    pub pid: Option<String>,
    pub name: String,
    pub description: String,
    pub category: String,
    /// Decimal price, e.g. `"25.00"`.
    pub price: String,
    /// Price currency code; defaults to CAD.
    pub currency: Option<String>,
    pub user_id: Option<String>,
    pub paypal_account: Option<String>,
    pub location: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub image_url: Option<String>,
    /// `YYYY-MM-DD`.
    pub start_date: Option<String>,
    /// `YYYY-MM-DD`.
    pub end_date: Option<String>,
}

/// Listing data that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductInput {
    pub pid: Option<ProductId>,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: Money,
    pub user_id: Option<UserId>,
    pub paypal_account: Option<String>,
    pub location: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub image_url: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ProductParams {
    /// Validate against the selectable category ids.
    pub fn validate(self, categories: &[(String, String)]) -> Result<ProductInput, MarketError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(MarketError::Validation("product name is required".to_string()));
        }

        let category = self.category.trim().to_string();
        if !categories.iter().any(|(id, _)| *id == category) {
            return Err(MarketError::Validation(format!(
                "unknown category: {:?}",
                category
            )));
        }

        let currency = match self.currency.as_deref() {
            Some(code) => Currency::from_code(code)
                .ok_or_else(|| MarketError::Validation(format!("unknown currency: {}", code)))?,
            None => Currency::default(),
        };
        let price = Money::parse(&self.price, currency)?;
        if price.is_negative() {
            return Err(MarketError::Validation("price must not be negative".to_string()));
        }

        let start_date = parse_date(self.start_date.as_deref())?;
        let end_date = parse_date(self.end_date.as_deref())?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                return Err(MarketError::Validation(
                    "end date precedes start date".to_string(),
                ));
            }
        }

        Ok(ProductInput {
            pid: non_empty(self.pid).map(ProductId::from),
            name,
            description: self.description.trim().to_string(),
            category,
            price,
            user_id: non_empty(self.user_id).map(UserId::from),
            paypal_account: non_empty(self.paypal_account),
            location: non_empty(self.location),
            phone_number: non_empty(self.phone_number),
            address: non_empty(self.address),
            image_url: non_empty(self.image_url),
            start_date,
            end_date,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>, MarketError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| MarketError::Validation(format!("invalid date: {}", v))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories() -> Vec<(String, String)> {
        vec![("tools".into(), "tools".into())]
    }

    fn params() -> ProductParams {
        ProductParams {
            name: "Cordless drill".into(),
            category: "tools".into(),
            price: "15.50".into(),
            ..ProductParams::default()
        }
    }

    #[test]
    fn test_validate_ok() {
        let input = params().validate(&categories()).unwrap();
        assert_eq!(input.price, Money::new(1550, Currency::CAD));
        assert!(input.pid.is_none());
    }

    #[test]
    fn test_validate_rejects() {
        let cats = categories();
        assert!(ProductParams { name: " ".into(), ..params() }.validate(&cats).is_err());
        assert!(ProductParams { category: "boats".into(), ..params() }.validate(&cats).is_err());
        assert!(ProductParams { price: "-1".into(), ..params() }.validate(&cats).is_err());
        assert!(ProductParams { price: "cheap".into(), ..params() }.validate(&cats).is_err());
        assert!(ProductParams {
            start_date: Some("2016-04-20".into()),
            end_date: Some("2016-04-19".into()),
            ..params()
        }
        .validate(&cats)
        .is_err());
    }

    #[test]
    fn test_fold_rating_worked_example() {
        let input = params().validate(&categories()).unwrap();
        let mut product = Product::create(ProductId::new("p"), DocId::new("d"), input);

        product.fold_rating(4);
        assert_eq!(product.avg_rating, 4.0);
        product.fold_rating(2);
        assert_eq!(product.avg_rating, 3.0);
        product.fold_rating(5);
        assert!((product.avg_rating - 11.0 / 3.0).abs() < 1e-9);
        assert_eq!(product.num_reviews, 3);
        assert!(product.needs_review_reindex);
    }

    #[test]
    fn test_incremental_mean_matches_batch_mean() {
        let input = params().validate(&categories()).unwrap();
        let mut product = Product::create(ProductId::new("p"), DocId::new("d"), input);

        let mut sum = 0u64;
        for i in 0..10_000u64 {
            let rating = (i * 7 + i / 3) % 5 + 1;
            sum += rating;
            product.fold_rating(rating as u8);
            let expected = sum as f64 / (i + 1) as f64;
            assert!((product.avg_rating - expected).abs() < 1e-9);
        }
        assert_eq!(product.num_reviews, 10_000);
    }

    #[test]
    fn test_document_projection() {
        let input = params().validate(&categories()).unwrap();
        let product = Product::create(ProductId::new("p"), DocId::new("d"), input);
        let doc = product.to_document("18V", 2.5);
        assert_eq!(doc.doc_id, "d");
        assert_eq!(doc.pid, "p");
        assert_eq!(doc.rating(), Some(2.5));
        assert_eq!(doc.field(fields::PRICE).and_then(|v| v.as_number()), Some(15.5));
    }
}
