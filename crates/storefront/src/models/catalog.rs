//! Catalog models: products, specifications and categories.

use bazaar_core::{CategoryId, Price, ProductId};
use serde::{Deserialize, Serialize};

/// A product as served by `GET /products/{id}`.
///
/// Cart lines keep a copy of this as their display snapshot; the price used at
/// checkout is the one captured here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    pub category_id: CategoryId,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub image_url: String,
}

impl Product {
    /// Whether any units are left in stock.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// A single name/value specification row of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub spec_name: String,
    pub spec_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

/// Admin create/update payload for `/products/with-specs`.
#[derive(Debug, Clone, Serialize)]
pub struct ProductInput {
    pub name: String,
    pub description: String,
    pub price: Price,
    pub category_id: CategoryId,
    pub stock: u32,
    pub image_url: String,
    pub specs: Vec<ProductSpec>,
}

impl ProductInput {
    /// Drop blank spec rows and number the rest in display order.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.specs
            .retain(|s| !s.spec_name.trim().is_empty() && !s.spec_value.trim().is_empty());
        for (idx, spec) in self.specs.iter_mut().enumerate() {
            spec.order = u32::try_from(idx).ok();
        }
        self
    }
}

/// Product listing filters for `GET /products`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ProductQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// Admin create/update payload for categories.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryInput {
    pub name: String,
}
