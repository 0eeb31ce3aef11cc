//! Cache types for catalog responses.

use bazaar_core::{CategoryId, ProductId};

use crate::models::{Category, Product, ProductSpec};

/// Cache key for products, specs and categories.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Product(ProductId),
    Specs(ProductId),
    Products {
        category_id: Option<CategoryId>,
        skip: Option<u32>,
        limit: Option<u32>,
    },
    Categories,
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Product(Box<Product>),
    Specs(Vec<ProductSpec>),
    Products(Vec<Product>),
    Categories(Vec<Category>),
}
