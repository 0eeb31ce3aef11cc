//! Back-office endpoints. The backend rejects these with 403 for
//! non-admin users.
//!
//! Catalog mutations drop the catalog cache so readers see the change
//! immediately.

use bazaar_core::{CategoryId, OrderId, OrderStatus, ProductId, UserId};
use serde::Serialize;
use tracing::instrument;

use super::{ApiClient, ApiError, ApiRequest};
use crate::models::{
    Category, CategoryInput, Order, OrderListQuery, OrderStatistics, OrderSummary, Product,
    ProductInput, RoleUpdate, User,
};

#[derive(Serialize)]
struct StatusParam {
    status: OrderStatus,
}

impl ApiClient {
    // =========================================================================
    // Catalog
    // =========================================================================

    /// Create a product together with its characteristics.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: ProductInput) -> Result<Product, ApiError> {
        let request = ApiRequest::post("products/with-specs").json(&input.normalized())?;
        let product = self.send(request).await?.json()?;
        self.invalidate_catalog_cache().await;
        Ok(product)
    }

    /// Replace a product and its characteristics.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the product does not exist.
    #[instrument(skip(self, input), fields(product_id = %id))]
    pub async fn update_product(
        &self,
        id: ProductId,
        input: ProductInput,
    ) -> Result<Product, ApiError> {
        let request =
            ApiRequest::put(format!("products/{id}/with-specs")).json(&input.normalized())?;
        let product = self.send(request).await?.json()?;
        self.invalidate_catalog_cache().await;
        Ok(product)
    }

    /// Delete a product.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the product does not exist.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete_product(&self, id: ProductId) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(format!("products/{id}")))
            .await?;
        self.invalidate_catalog_cache().await;
        Ok(())
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` if the name is taken.
    #[instrument(skip(self))]
    pub async fn create_category(&self, name: &str) -> Result<Category, ApiError> {
        let request = ApiRequest::post("categories/").json(&CategoryInput {
            name: name.trim().to_string(),
        })?;
        let category = self.send(request).await?.json()?;
        self.invalidate_catalog_cache().await;
        Ok(category)
    }

    /// Rename a category.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the category does not exist.
    #[instrument(skip(self), fields(category_id = %id))]
    pub async fn rename_category(&self, id: CategoryId, name: &str) -> Result<Category, ApiError> {
        let request = ApiRequest::put(format!("categories/{id}")).json(&CategoryInput {
            name: name.trim().to_string(),
        })?;
        let category = self.send(request).await?.json()?;
        self.invalidate_catalog_cache().await;
        Ok(category)
    }

    /// Delete a category.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the category does not exist.
    #[instrument(skip(self), fields(category_id = %id))]
    pub async fn delete_category(&self, id: CategoryId) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(format!("categories/{id}")))
            .await?;
        self.invalidate_catalog_cache().await;
        Ok(())
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// All orders, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Forbidden` for non-admin users.
    #[instrument(skip(self))]
    pub async fn admin_orders(&self, query: &OrderListQuery) -> Result<Vec<OrderSummary>, ApiError> {
        self.send(ApiRequest::get("orders/admin").query(query)?)
            .await?
            .json()
    }

    /// Any order by id.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for unknown ids.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn admin_order(&self, id: OrderId) -> Result<Order, ApiError> {
        self.get_json(&format!("orders/admin/{id}")).await
    }

    /// Move an order to a new status.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for unknown ids.
    #[instrument(skip(self), fields(order_id = %id, status = %status))]
    pub async fn set_order_status(&self, id: OrderId, status: OrderStatus) -> Result<(), ApiError> {
        let request =
            ApiRequest::put(format!("orders/admin/{id}/status")).query(&StatusParam { status })?;
        self.send(request).await?;
        Ok(())
    }

    /// Order counters and revenue.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Forbidden` for non-admin users.
    #[instrument(skip(self))]
    pub async fn order_statistics(&self) -> Result<OrderStatistics, ApiError> {
        self.get_json("orders/admin/statistics").await
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// All registered users.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Forbidden` for non-admin users.
    #[instrument(skip(self))]
    pub async fn users(&self) -> Result<Vec<User>, ApiError> {
        self.get_json("admin/users/").await
    }

    /// Grant or revoke admin rights.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for unknown ids.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn set_user_role(&self, id: UserId, is_admin: bool) -> Result<User, ApiError> {
        let request =
            ApiRequest::put(format!("admin/users/{id}/role")).json(&RoleUpdate { is_admin })?;
        self.send(request).await?.json()
    }

    /// Delete a user account.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for unknown ids.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn delete_user(&self, id: UserId) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(format!("admin/users/{id}")))
            .await?;
        Ok(())
    }
}
