//! Product catalog module.
//!
//! Contains the category tree and product listings.

mod category;
mod product;

pub use category::{Category, CategoryCache, CategoryNode, ROOT_CATEGORY};
pub use product::{Product, ProductInput, ProductParams};
