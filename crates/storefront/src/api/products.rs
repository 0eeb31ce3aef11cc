//! Catalog reads: products, specs and categories (cached).

use bazaar_core::ProductId;
use tracing::{debug, instrument};

use super::cache::{CacheKey, CacheValue};
use super::{ApiClient, ApiError, ApiRequest};
use crate::models::{Category, Product, ProductQuery, ProductSpec};

impl ApiClient {
    /// List products.
    ///
    /// Results are cached unless a search term is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn list_products(&self, query: &ProductQuery) -> Result<Vec<Product>, ApiError> {
        let cache_key = CacheKey::Products {
            category_id: query.category_id,
            skip: query.skip,
            limit: query.limit,
        };
        let cacheable = query.search.as_deref().is_none_or(|s| s.trim().is_empty());

        if cacheable
            && let Some(CacheValue::Products(products)) = self.cache().get(&cache_key).await
        {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let request = ApiRequest::get("products/").query(query)?;
        let products: Vec<Product> = self.send(request).await?.json()?;

        if cacheable {
            self.cache()
                .insert(cache_key, CacheValue::Products(products.clone()))
                .await;
        }

        Ok(products)
    }

    /// Get a product, served from the cache when possible.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the product does not exist.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: ProductId) -> Result<Product, ApiError> {
        if let Some(CacheValue::Product(product)) = self.cache().get(&CacheKey::Product(id)).await
        {
            debug!("Cache hit for product");
            return Ok(*product);
        }
        self.fetch_product(id).await
    }

    /// Get a product from the backend, bypassing (and then refreshing) the
    /// cache. Used for cart snapshots, whose prices end up in orders.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the product does not exist.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn fetch_product(&self, id: ProductId) -> Result<Product, ApiError> {
        let product: Product = self.get_json(&format!("products/{id}")).await?;
        self.cache()
            .insert(
                CacheKey::Product(id),
                CacheValue::Product(Box::new(product.clone())),
            )
            .await;
        Ok(product)
    }

    /// Characteristics of a product, in display order.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product_specs(&self, id: ProductId) -> Result<Vec<ProductSpec>, ApiError> {
        if let Some(CacheValue::Specs(specs)) = self.cache().get(&CacheKey::Specs(id)).await {
            debug!("Cache hit for product specs");
            return Ok(specs);
        }

        let mut specs: Vec<ProductSpec> = self.get_json(&format!("products/{id}/specs")).await?;
        specs.sort_by_key(|s| s.order.unwrap_or(u32::MAX));

        self.cache()
            .insert(CacheKey::Specs(id), CacheValue::Specs(specs.clone()))
            .await;
        Ok(specs)
    }

    /// All categories.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        if let Some(CacheValue::Categories(categories)) =
            self.cache().get(&CacheKey::Categories).await
        {
            debug!("Cache hit for categories");
            return Ok(categories);
        }

        let categories: Vec<Category> = self.get_json("categories/").await?;
        self.cache()
            .insert(
                CacheKey::Categories,
                CacheValue::Categories(categories.clone()),
            )
            .await;
        Ok(categories)
    }

    /// Drop every cached catalog entry.
    pub async fn invalidate_catalog_cache(&self) {
        self.cache().invalidate_all();
        self.cache().run_pending_tasks().await;
    }
}
