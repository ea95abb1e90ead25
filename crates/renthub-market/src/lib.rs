//! Rental marketplace domain types and logic for RentHub.
//!
//! - **Catalog**: category tree and product listings
//! - **Reviews & ratings**: review submission, incremental average ratings
//!   and their reconciliation into the search index
//! - **Payments**: PayPal IPN verification and payment records
//! - **Profiles** and **admin** bulk operations
//!
//! Every operation is a method on [`Marketplace`].
//!
//! # Example
//!
//! ```rust,ignore
//! use renthub_market::prelude::*;
//!
//! let market = Marketplace::in_memory(MarketConfig::default());
//! let product = market.create_product(ProductParams {
//!     name: "Canoe".into(),
//!     category: "outdoor".into(),
//!     price: "45.00".into(),
//!     ..ProductParams::default()
//! })?;
//!
//! let (product, _review) = market.submit_review(&product.id, "ann", 4, "Stable")?;
//! assert_eq!(product.avg_rating, 4.0);
//!
//! // Copy the new rating into the search index.
//! market.run_pending_tasks();
//! ```

pub mod admin;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ids;
pub mod money;
pub mod payment;
pub mod profile;
pub mod rating;
pub mod review;

mod listing;
mod market;
mod tasks;

pub use config::{MarketConfig, PaymentConfig};
pub use error::MarketError;
pub use ids::*;
pub use market::Marketplace;
pub use money::{Currency, Money};
pub use tasks::MarketTask;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::admin::DeleteSummary;
    pub use crate::catalog::{Category, CategoryNode, Product, ProductParams};
    pub use crate::config::MarketConfig;
    pub use crate::error::MarketError;
    pub use crate::ids::*;
    pub use crate::market::Marketplace;
    pub use crate::money::{Currency, Money};
    pub use crate::payment::{
        IpnMessage, IpnOutcome, PaymentRecord, PaymentVerifier, StaticVerifier,
        VerificationStatus,
    };
    pub use crate::profile::{ProfileParams, SaveOutcome, UserInfo};
    pub use crate::rating::{AuditReport, ReindexOutcome, SweepReport};
    pub use crate::review::Review;
    pub use crate::tasks::MarketTask;
}
